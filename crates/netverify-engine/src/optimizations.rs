//! Pre-encoding analysis deciding which symbolic state each router needs.
//!
//! The pass runs once per encoding, before any variable is created. It never
//! changes which properties can be proved: everything it removes is either
//! unreachable for the queried destinations or provably redundant.

use std::collections::{BTreeMap, BTreeSet};

use netverify_ir::config::{BgpNeighbor, Configuration};
use netverify_ir::graph::{Graph, GraphEdge};
use netverify_ir::policy::{
    walk_statements, BooleanExpr, PolicyVisitor, Statement, StaticStatement,
    BGP_COMMON_FILTER_LIST_NAME,
};
use netverify_ir::prefix::Prefix;
use netverify_ir::protocol::{ProtocolMap, RoutingProtocol};
use tracing::debug;

use crate::settings::OptimizationSettings;

pub struct Optimizations<'g> {
    graph: &'g Graph,
    destinations: Vec<Prefix>,
    settings: OptimizationSettings,

    has_environment: bool,
    keep_local_pref: bool,
    keep_admin_dist: bool,
    keep_med: bool,
    protocols: BTreeMap<String, Vec<RoutingProtocol>>,
    slice_has_single_protocol: BTreeSet<String>,
    slice_can_keep_single_export_var: BTreeMap<String, ProtocolMap<bool>>,
    slice_can_combine_import_export_vars: BTreeMap<String, ProtocolMap<Vec<GraphEdge>>>,
    need_router_id_proto: BTreeMap<String, ProtocolMap<bool>>,
    need_router_id: BTreeSet<String>,
}

/// Records whether any policy statement assigns local preference or metric.
#[derive(Default)]
struct AttributeUsage {
    sets_local_pref: bool,
    sets_metric: bool,
}

impl PolicyVisitor for AttributeUsage {
    fn visit_set_local_preference(&mut self, _value: u32) {
        self.sets_local_pref = true;
    }

    fn visit_set_metric(&mut self, _value: u32) {
        self.sets_metric = true;
    }
}

impl<'g> Optimizations<'g> {
    /// Before [`Self::compute_optimizations`] every getter answers
    /// conservatively: keep all attributes, merge nothing.
    pub fn new(
        graph: &'g Graph,
        destinations: &[Prefix],
        settings: OptimizationSettings,
    ) -> Self {
        Self {
            graph,
            destinations: destinations.to_vec(),
            settings,
            has_environment: false,
            keep_local_pref: true,
            keep_admin_dist: true,
            keep_med: true,
            protocols: BTreeMap::new(),
            slice_has_single_protocol: BTreeSet::new(),
            slice_can_keep_single_export_var: BTreeMap::new(),
            slice_can_combine_import_export_vars: BTreeMap::new(),
            need_router_id_proto: BTreeMap::new(),
            need_router_id: BTreeSet::new(),
        }
    }

    pub fn compute_optimizations(&mut self) {
        self.has_environment = self.compute_has_environment();
        let usage = self.attribute_usage();
        self.keep_local_pref = !self.settings.enable_slicing || usage.sets_local_pref;
        // Metric assignments stand in for admin-distance changes.
        self.keep_admin_dist = !self.settings.enable_slicing || usage.sets_metric;
        // TODO: derive from MED usage in policies once MED assignments are modeled.
        self.keep_med = !self.settings.enable_slicing;
        self.protocols = self.init_protocols();
        self.compute_router_id_needed();
        self.compute_can_use_single_best();
        self.compute_can_merge_export_vars();
        self.compute_can_merge_import_export_vars();

        debug!(
            routers = self.protocols.len(),
            has_environment = self.has_environment,
            keep_local_pref = self.keep_local_pref,
            keep_admin_dist = self.keep_admin_dist,
            keep_med = self.keep_med,
            need_router_id = self.need_router_id.len(),
            single_protocol = self.slice_has_single_protocol.len(),
            "Optimizations computed"
        );
    }

    fn compute_has_environment(&self) -> bool {
        self.graph
            .edge_map()
            .values()
            .flatten()
            .any(|edge| edge.is_environment() && self.graph.bgp_neighbors().contains_key(edge))
    }

    fn attribute_usage(&self) -> AttributeUsage {
        let mut usage = AttributeUsage::default();
        for conf in self.graph.configurations().values() {
            for policy in conf.routing_policies.values() {
                walk_statements(&policy.statements, &mut usage);
            }
        }
        usage
    }

    fn init_protocols(&self) -> BTreeMap<String, Vec<RoutingProtocol>> {
        let mut out = BTreeMap::new();
        for (router, conf) in self.graph.configurations() {
            let mut protos = Vec::new();
            if conf.default_vrf.ospf_process.is_some() {
                protos.push(RoutingProtocol::Ospf);
            }
            if conf.default_vrf.bgp_process.is_some() {
                protos.push(RoutingProtocol::Bgp);
            }
            if self.need_to_model_connected(conf) {
                protos.push(RoutingProtocol::Connected);
            }
            if self.need_to_model_static(conf) {
                protos.push(RoutingProtocol::Static);
            }
            out.insert(router.clone(), protos);
        }
        out
    }

    fn need_to_model_connected(&self, conf: &Configuration) -> bool {
        !self.settings.enable_slicing
            || self.has_relevant_originated_route(conf, RoutingProtocol::Connected)
    }

    fn need_to_model_static(&self, conf: &Configuration) -> bool {
        if self.settings.enable_slicing {
            self.has_relevant_originated_route(conf, RoutingProtocol::Static)
        } else {
            !conf.default_vrf.static_routes.is_empty()
        }
    }

    fn compute_router_id_needed(&mut self) {
        self.need_router_id_proto.clear();
        self.need_router_id.clear();
        for (router, conf) in self.graph.configurations() {
            let mut map = ProtocolMap::new();
            let protos = self.protocols.get(router).map_or(&[][..], Vec::as_slice);
            for &proto in protos {
                let needed = !conf.is_multipath(proto);
                map.insert(proto, needed);
                if needed {
                    self.need_router_id.insert(router.clone());
                }
            }
            self.need_router_id_proto.insert(router.clone(), map);
        }
    }

    fn compute_can_use_single_best(&mut self) {
        self.slice_has_single_protocol = self
            .protocols
            .iter()
            .filter(|(_, protos)| protos.len() == 1)
            .map(|(router, _)| router.clone())
            .collect();
    }

    fn compute_can_merge_export_vars(&mut self) {
        self.slice_can_keep_single_export_var.clear();
        for (router, conf) in self.graph.configurations() {
            let mut map = ProtocolMap::new();
            for &proto in self.protocols_of(router) {
                let mergeable = match proto {
                    RoutingProtocol::Connected
                    | RoutingProtocol::Static
                    | RoutingProtocol::Ospf => self.settings.enable_export_merge,
                    RoutingProtocol::Bgp => {
                        let all_default = conf
                            .default_vrf
                            .bgp_process
                            .as_ref()
                            .map_or(true, |p| {
                                p.neighbors.iter().all(|n| is_default_bgp_export(conf, n))
                            });
                        all_default && self.settings.enable_export_merge
                    }
                };
                map.insert(proto, mergeable);
            }
            self.slice_can_keep_single_export_var.insert(router.clone(), map);
        }
    }

    fn compute_can_merge_import_export_vars(&mut self) {
        self.slice_can_combine_import_export_vars.clear();
        for (router, conf) in self.graph.configurations() {
            let mut map = ProtocolMap::new();
            for &proto in self.protocols_of(router) {
                let relevant_proto = match proto {
                    RoutingProtocol::Connected | RoutingProtocol::Static => false,
                    RoutingProtocol::Ospf | RoutingProtocol::Bgp => true,
                };
                let mut edges = Vec::new();
                if self.settings.enable_import_export_merge
                    && relevant_proto
                    && !self.has_relevant_originated_route(conf, proto)
                {
                    edges.extend(
                        self.graph
                            .edges(router)
                            .iter()
                            .filter(|e| self.has_export_variables(e, proto))
                            .cloned(),
                    );
                }
                map.insert(proto, edges);
            }
            self.slice_can_combine_import_export_vars
                .insert(router.clone(), map);
        }
    }

    /// True iff some prefix `conf` originates into `proto` overlaps a
    /// destination of this encoding.
    pub fn has_relevant_originated_route(
        &self,
        conf: &Configuration,
        proto: RoutingProtocol,
    ) -> bool {
        let originated = conf.originated_networks(proto);
        originated
            .iter()
            .any(|p1| self.destinations.iter().any(|p2| p1.overlaps(p2)))
    }

    /// The peer runs `proto` on the far interface, so it will have export
    /// variables for this edge.
    fn has_export_variables(&self, edge: &GraphEdge, proto: RoutingProtocol) -> bool {
        let (Some(peer), Some(end)) = (&edge.peer, &edge.end) else {
            return false;
        };
        if !self.protocols_of(peer).contains(&proto) {
            return false;
        }
        self.graph
            .configuration(peer)
            .is_some_and(|peer_conf| self.graph.is_interface_used(peer_conf, proto, end))
    }

    fn protocols_of(&self, router: &str) -> &[RoutingProtocol] {
        self.protocols.get(router).map_or(&[], Vec::as_slice)
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub fn destinations(&self) -> &[Prefix] {
        &self.destinations
    }

    pub fn settings(&self) -> OptimizationSettings {
        self.settings
    }

    pub fn has_environment(&self) -> bool {
        self.has_environment
    }

    pub fn keep_local_pref(&self) -> bool {
        self.keep_local_pref
    }

    pub fn keep_admin_dist(&self) -> bool {
        self.keep_admin_dist
    }

    pub fn keep_med(&self) -> bool {
        self.keep_med
    }

    /// Protocols modeled per router.
    pub fn protocols(&self) -> &BTreeMap<String, Vec<RoutingProtocol>> {
        &self.protocols
    }

    pub fn router_protocols(&self, router: &str) -> &[RoutingProtocol] {
        self.protocols_of(router)
    }

    pub fn need_router_id(&self) -> &BTreeSet<String> {
        &self.need_router_id
    }

    pub fn need_router_id_proto(&self) -> &BTreeMap<String, ProtocolMap<bool>> {
        &self.need_router_id_proto
    }

    pub fn needs_router_id(&self, router: &str, proto: RoutingProtocol) -> bool {
        self.need_router_id_proto
            .get(router)
            .and_then(|m| m.get(&proto))
            .copied()
            .unwrap_or(true)
    }

    pub fn slice_has_single_protocol(&self) -> &BTreeSet<String> {
        &self.slice_has_single_protocol
    }

    pub fn slice_can_keep_single_export_var(&self) -> &BTreeMap<String, ProtocolMap<bool>> {
        &self.slice_can_keep_single_export_var
    }

    pub fn can_keep_single_export_var(&self, router: &str, proto: RoutingProtocol) -> bool {
        self.slice_can_keep_single_export_var
            .get(router)
            .and_then(|m| m.get(&proto))
            .copied()
            .unwrap_or(false)
    }

    pub fn slice_can_combine_import_export_vars(
        &self,
    ) -> &BTreeMap<String, ProtocolMap<Vec<GraphEdge>>> {
        &self.slice_can_combine_import_export_vars
    }

    pub fn can_combine_import_export(
        &self,
        router: &str,
        proto: RoutingProtocol,
        edge: &GraphEdge,
    ) -> bool {
        self.slice_can_combine_import_export_vars
            .get(router)
            .and_then(|m| m.get(&proto))
            .is_some_and(|edges| edges.contains(edge))
    }
}

/// A neighbor exports by default when it has no export policy, or when the
/// policy only defers to the network-wide common BGP filter:
/// `if <call common> { accept } else { reject }`.
pub fn is_default_bgp_export(conf: &Configuration, neighbor: &BgpNeighbor) -> bool {
    let Some(name) = &neighbor.export_policy else {
        return true;
    };
    let Some(policy) = conf.policy(name) else {
        return false;
    };
    match policy.statements.as_slice() {
        [Statement::If {
            guard: BooleanExpr::Call(called),
            true_statements,
            false_statements,
        }] => match (true_statements.as_slice(), false_statements.as_slice()) {
            (
                [Statement::Static(StaticStatement::ExitAccept)],
                [Statement::Static(StaticStatement::ExitReject)],
            ) => called.contains(BGP_COMMON_FILTER_LIST_NAME),
            _ => false,
        },
        _ => false,
    }
}
