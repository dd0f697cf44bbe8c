//! Symbolic model of route selection and packet forwarding.
//!
//! An [`Encoder`] turns a [`Graph`] into SMT variables and constraints:
//! one [`SymbolicRecord`] per logical edge (a physical edge seen through one
//! protocol in one direction), a best route per router and protocol, and
//! control/data-plane forwarding booleans per edge. Properties are checked by
//! adding constraints to the encoder's context and calling
//! [`Encoder::verify`].

mod decisions;
mod logical_graph;
mod packet;
mod record;
mod transfer;

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use netverify_ir::config::{Configuration, Interface, DEFAULT_OSPF_COST};
use netverify_ir::graph::{Graph, GraphEdge};
use netverify_ir::prefix::Prefix;
use netverify_ir::protocol::{EdgeType, ProtocolMap, RoutingProtocol};
use netverify_smt::backends::smtlib_printer::context_to_script;
use netverify_smt::backends::z3_backend::Z3Solver;
use netverify_smt::context::{escape_component, ContextError, SmtContext};
use netverify_smt::solver::{SatResult, SmtSolver};
use netverify_smt::terms::SmtTerm;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::optimizations::Optimizations;
use crate::result::VerificationResult;
use crate::settings::EncoderSettings;

pub use decisions::SymbolicDecisions;
pub use logical_graph::{LogicalGraph, LogicalGraphEdge};
pub use packet::{PacketSummary, SymbolicPacket};
pub use record::{
    announcements_equal, better, RecordShape, SymbolicRecord, DEFAULT_LOCAL_PREF, DEFAULT_MED,
    DEFAULT_ROUTER_ID,
};
pub use transfer::{acl_permits, PolicyOutcome, PolicyTransfer, RouteAttributes, MAX_CALL_DEPTH};

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("router {router}: routing policy {policy} is not defined")]
    UnknownPolicy { router: String, policy: String },
    #[error("router {router}: policy calls nest too deeply at {policy}")]
    PolicyRecursion { router: String, policy: String },
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("solver error: {0}")]
    Solver(String),
    #[error("solver returned unknown: {0}")]
    SolverUnknown(String),
}

/// How a router exchanges routes of one protocol over one edge.
enum Peering<'g> {
    /// With a modeled router; holds the reverse edge.
    Internal(&'g GraphEdge),
    /// With an arbitrary external BGP speaker.
    Environment,
}

pub struct Encoder<'g> {
    id: usize,
    graph: &'g Graph,
    settings: EncoderSettings,
    optimizations: Optimizations<'g>,
    ctx: SmtContext,
    packet: SymbolicPacket,
    logical_graph: LogicalGraph,
    originations: BTreeMap<String, ProtocolMap<SymbolicRecord>>,
    decisions: SymbolicDecisions,
    incoming_acls: BTreeMap<GraphEdge, SmtTerm>,
    outgoing_acls: BTreeMap<GraphEdge, SmtTerm>,
}

impl<'g> Encoder<'g> {
    /// An encoder for packets destined to `destinations`, in a fresh context.
    pub fn new(
        graph: &'g Graph,
        destinations: &[Prefix],
        settings: EncoderSettings,
    ) -> Result<Self, EncoderError> {
        Self::with_context(SmtContext::new(), graph, destinations, settings)
    }

    /// An encoder appending to `ctx`. Its variables are prefixed with the
    /// next free encoder index of the context, so several encoders can share
    /// one query.
    pub fn with_context(
        mut ctx: SmtContext,
        graph: &'g Graph,
        destinations: &[Prefix],
        settings: EncoderSettings,
    ) -> Result<Self, EncoderError> {
        let id = ctx.register_encoder();
        let mut optimizations = Optimizations::new(graph, destinations, settings.optimizations);
        optimizations.compute_optimizations();
        let packet = SymbolicPacket::declare(&mut ctx, id)?;
        ctx.assert_term(SmtTerm::or(
            destinations.iter().map(|d| packet.dst_in(d)).collect(),
        ));
        Ok(Self {
            id,
            graph,
            settings,
            optimizations,
            ctx,
            packet,
            logical_graph: LogicalGraph::default(),
            originations: BTreeMap::new(),
            decisions: SymbolicDecisions::default(),
            incoming_acls: BTreeMap::new(),
            outgoing_acls: BTreeMap::new(),
        })
    }

    /// Build the whole model into the context.
    pub fn compute_encoding(&mut self) -> Result<(), EncoderError> {
        let started = Instant::now();
        info!(
            encoder = self.id,
            routers = self.graph.configurations().len(),
            destinations = self.optimizations.destinations().len(),
            "Building network encoding"
        );
        self.declare_exports()?;
        self.build_imports()?;
        self.build_originations();
        self.build_best()?;
        self.constrain_exports()?;
        self.build_acls();
        self.build_forwarding()?;
        info!(
            encoder = self.id,
            logical_edges = self
                .logical_graph
                .logical_edges()
                .values()
                .map(Vec::len)
                .sum::<usize>(),
            declarations = self.ctx.declarations().len(),
            assertions = self.ctx.assertions().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Encoding built"
        );
        Ok(())
    }

    /// Check the context with Z3. Unsatisfiable means no packet violates
    /// the asserted negation, i.e. the property holds.
    pub fn verify(&self) -> Result<VerificationResult, EncoderError> {
        let mut solver = Z3Solver::with_timeout_secs(self.settings.timeout_secs);
        self.verify_with(&mut solver)
    }

    pub fn verify_with<S: SmtSolver>(
        &self,
        solver: &mut S,
    ) -> Result<VerificationResult, EncoderError> {
        if let Some(path) = &self.settings.dump_smt {
            match std::fs::write(path, context_to_script(&self.ctx)) {
                Ok(()) => debug!(path = %path, "SMT-LIB2 script written"),
                Err(e) => warn!(path = %path, error = %e, "Could not write SMT-LIB2 script"),
            }
        }
        let started = Instant::now();
        let (sat, model) = self
            .ctx
            .solve(solver)
            .map_err(|e| EncoderError::Solver(e.to_string()))?;
        info!(
            encoder = self.id,
            result = ?sat,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Solver finished"
        );
        match sat {
            SatResult::Unsat => Ok(VerificationResult::verified()),
            SatResult::Sat => {
                let model = model.unwrap_or_default();
                let packet = self.packet.summarize(&model);
                Ok(VerificationResult::counterexample(&model, packet))
            }
            SatResult::Unknown(reason) => Err(EncoderError::SolverUnknown(reason)),
        }
    }

    /// Assert an additional constraint.
    pub fn add(&mut self, term: SmtTerm) {
        self.ctx.assert_term(term);
    }

    pub fn context(&self) -> &SmtContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut SmtContext {
        &mut self.ctx
    }

    /// Move the context out, e.g. to hand it to a second encoder.
    pub fn take_context(&mut self) -> SmtContext {
        std::mem::take(&mut self.ctx)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    pub fn optimizations(&self) -> &Optimizations<'g> {
        &self.optimizations
    }

    pub fn destinations(&self) -> &[Prefix] {
        self.optimizations.destinations()
    }

    pub fn symbolic_decisions(&self) -> &SymbolicDecisions {
        &self.decisions
    }

    pub fn logical_graph(&self) -> &LogicalGraph {
        &self.logical_graph
    }

    pub fn symbolic_packet(&self) -> &SymbolicPacket {
        &self.packet
    }

    /// Incoming ACL predicate per edge, keyed by the edge starting at the
    /// filtered interface. Edges without a filter are absent.
    pub fn incoming_acls(&self) -> &BTreeMap<GraphEdge, SmtTerm> {
        &self.incoming_acls
    }

    pub fn outgoing_acls(&self) -> &BTreeMap<GraphEdge, SmtTerm> {
        &self.outgoing_acls
    }

    /// The route `router` originates into `proto`, if it originates one
    /// relevant to the destinations.
    pub fn origination(&self, router: &str, proto: RoutingProtocol) -> Option<&SymbolicRecord> {
        self.originations.get(router)?.get(&proto)
    }

    /// Two records announce the same route. Local preference is not
    /// compared on BGP export edges; router ids only where they break ties.
    pub fn equal(
        &self,
        conf: &Configuration,
        proto: RoutingProtocol,
        a: &SymbolicRecord,
        b: &SymbolicRecord,
        lge: Option<&LogicalGraphEdge>,
    ) -> SmtTerm {
        let bgp_export = lge.is_some_and(|l| {
            l.protocol == RoutingProtocol::Bgp && l.edge_type == EdgeType::Export
        });
        announcements_equal(a, b, proto, !bgp_export, !conf.is_multipath(proto))
    }

    pub fn overlaps(&self, a: &Prefix, b: &Prefix) -> bool {
        a.overlaps(b)
    }

    pub fn originated_networks(&self, conf: &Configuration, proto: RoutingProtocol) -> Vec<Prefix> {
        conf.originated_networks(proto)
    }

    pub fn is_multipath(&self, conf: &Configuration, proto: RoutingProtocol) -> bool {
        conf.is_multipath(proto)
    }

    /// The packet is destined to one of `prefixes` that overlaps a
    /// destination of this encoding.
    pub fn relevant_origination(&self, prefixes: &[Prefix]) -> SmtTerm {
        SmtTerm::or(
            prefixes
                .iter()
                .filter(|p| self.is_relevant(p))
                .map(|p| self.packet.dst_in(p))
                .collect(),
        )
    }

    fn is_relevant(&self, prefix: &Prefix) -> bool {
        self.destinations()
            .iter()
            .any(|d| self.overlaps(prefix, d))
    }

    /// `<id>_<part>_<part>...`. Router, interface and peer names must be
    /// passed through [`escape_component`] first.
    fn var_name(&self, parts: &[&str]) -> String {
        let mut name = self.id.to_string();
        for part in parts {
            name.push('_');
            name.push_str(part);
        }
        name
    }

    fn record_shape(&self, router_id: bool) -> RecordShape {
        RecordShape {
            admin_dist: self.optimizations.keep_admin_dist(),
            local_pref: self.optimizations.keep_local_pref(),
            med: self.optimizations.keep_med(),
            router_id,
        }
    }

    /// A record with every modeled attribute at its protocol default.
    fn constant_record(
        &self,
        name: String,
        conf: &Configuration,
        proto: RoutingProtocol,
    ) -> SymbolicRecord {
        let shape = self.record_shape(self.optimizations.needs_router_id(&conf.hostname, proto));
        SymbolicRecord {
            admin_dist: shape
                .admin_dist
                .then(|| SmtTerm::int(proto.default_admin_distance())),
            local_pref: shape.local_pref.then(|| SmtTerm::int(DEFAULT_LOCAL_PREF)),
            med: shape.med.then(|| SmtTerm::int(DEFAULT_MED)),
            router_id: shape.router_id.then(|| SmtTerm::int(conf.router_id())),
            ..SymbolicRecord::absent(name)
        }
    }

    fn peering(
        &self,
        conf: &Configuration,
        proto: RoutingProtocol,
        edge: &GraphEdge,
    ) -> Option<Peering<'g>> {
        let graph = self.graph;
        match proto {
            RoutingProtocol::Connected | RoutingProtocol::Static => None,
            RoutingProtocol::Ospf => {
                if !graph.is_interface_used(conf, proto, &edge.start) {
                    return None;
                }
                let reverse = graph.other_end(edge)?;
                let peer_conf = graph.configuration(&reverse.router)?;
                let peer_runs = self
                    .optimizations
                    .router_protocols(&reverse.router)
                    .contains(&proto);
                (peer_runs && graph.is_interface_used(peer_conf, proto, &reverse.start))
                    .then_some(Peering::Internal(reverse))
            }
            RoutingProtocol::Bgp => {
                if !graph.bgp_neighbors().contains_key(edge) {
                    return None;
                }
                if edge.is_environment() {
                    return self
                        .optimizations
                        .has_environment()
                        .then_some(Peering::Environment);
                }
                let reverse = graph.other_end(edge)?;
                let peer_runs = self
                    .optimizations
                    .router_protocols(&reverse.router)
                    .contains(&proto);
                (peer_runs && graph.bgp_neighbors().contains_key(reverse))
                    .then_some(Peering::Internal(reverse))
            }
        }
    }

    fn declare_exports(&mut self) -> Result<(), EncoderError> {
        let graph = self.graph;
        for (router, conf) in graph.configurations() {
            let r = escape_component(router);
            for proto in self.optimizations.router_protocols(router).to_vec() {
                if !proto.is_adjacency_based() {
                    continue;
                }
                let single = self.optimizations.can_keep_single_export_var(router, proto);
                let shape = RecordShape {
                    admin_dist: false,
                    router_id: false,
                    ..self.record_shape(false)
                };
                let mut shared: Option<SymbolicRecord> = None;
                for edge in graph.edges(router) {
                    if self.peering(conf, proto, edge).is_none() {
                        continue;
                    }
                    let record = match shared.clone() {
                        Some(record) => record,
                        None => {
                            let name = if single {
                                self.var_name(&[proto.name(), &r, "SINGLE-EXPORT"])
                            } else {
                                let tag = self.edge_tag(edge);
                                self.var_name(&[proto.name(), &r, &tag, "EXPORT"])
                            };
                            let record = SymbolicRecord::declare(&mut self.ctx, name, shape)?;
                            if single {
                                shared = Some(record.clone());
                            }
                            record
                        }
                    };
                    self.logical_graph.push(LogicalGraphEdge {
                        edge: edge.clone(),
                        protocol: proto,
                        edge_type: EdgeType::Export,
                        record,
                    });
                }
            }
        }
        Ok(())
    }

    fn build_imports(&mut self) -> Result<(), EncoderError> {
        let graph = self.graph;
        for (router, conf) in graph.configurations() {
            for proto in self.optimizations.router_protocols(router).to_vec() {
                for edge in graph.edges(router) {
                    let record = match proto {
                        RoutingProtocol::Connected => self.connected_import(conf, edge),
                        RoutingProtocol::Static => self.static_import(conf, edge),
                        RoutingProtocol::Ospf | RoutingProtocol::Bgp => {
                            self.adjacency_import(conf, proto, edge)?
                        }
                    };
                    if let Some(record) = record {
                        self.logical_graph.push(LogicalGraphEdge {
                            edge: edge.clone(),
                            protocol: proto,
                            edge_type: EdgeType::Import,
                            record,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn connected_import(&self, conf: &Configuration, edge: &GraphEdge) -> Option<SymbolicRecord> {
        let proto = RoutingProtocol::Connected;
        if !self.graph.is_interface_used(conf, proto, &edge.start) {
            return None;
        }
        let subnet = self.graph.edge_prefix(edge)?;
        let name = self.var_name(&[
            proto.name(),
            &escape_component(&edge.router),
            &self.edge_tag(edge),
            "IMPORT",
        ]);
        Some(SymbolicRecord {
            permitted: self.packet.dst_in(&subnet),
            prefix_length: SmtTerm::int(i64::from(subnet.length())),
            ..self.constant_record(name, conf, proto)
        })
    }

    fn static_import(&self, conf: &Configuration, edge: &GraphEdge) -> Option<SymbolicRecord> {
        let proto = RoutingProtocol::Static;
        let networks = longest_first(
            self.graph
                .static_routes_for_edge(edge)
                .into_iter()
                .map(|route| route.network),
        );
        if networks.is_empty() {
            return None;
        }
        let name = self.var_name(&[
            proto.name(),
            &escape_component(&edge.router),
            &self.edge_tag(edge),
            "IMPORT",
        ]);
        Some(SymbolicRecord {
            permitted: SmtTerm::or(networks.iter().map(|n| self.packet.dst_in(n)).collect()),
            prefix_length: longest_match_length(&self.packet, &networks),
            ..self.constant_record(name, conf, proto)
        })
    }

    fn adjacency_import(
        &mut self,
        conf: &Configuration,
        proto: RoutingProtocol,
        edge: &GraphEdge,
    ) -> Result<Option<SymbolicRecord>, EncoderError> {
        let graph = self.graph;
        let router = &edge.router;
        let Some(peering) = self.peering(conf, proto, edge) else {
            return Ok(None);
        };
        let needs_router_id = self.optimizations.needs_router_id(router, proto);
        let (source, router_id, mergeable) = match peering {
            Peering::Internal(reverse) => {
                let Some(export) = self
                    .logical_graph
                    .find_edge(reverse, proto, EdgeType::Export)
                else {
                    return Ok(None);
                };
                let peer_id = graph
                    .configuration(&reverse.router)
                    .map_or(DEFAULT_ROUTER_ID, Configuration::router_id);
                (
                    export.record.clone(),
                    needs_router_id.then(|| SmtTerm::int(peer_id)),
                    self.optimizations.can_combine_import_export(router, proto, edge),
                )
            }
            Peering::Environment => {
                let name =
                    self.var_name(&["env", &escape_component(router), &self.edge_tag(edge)]);
                let shape = RecordShape {
                    admin_dist: false,
                    ..self.record_shape(needs_router_id)
                };
                let env = SymbolicRecord::declare(&mut self.ctx, name, shape)?;
                self.logical_graph.add_environment(edge.clone(), env.clone());
                let router_id = env.router_id.clone();
                (env, router_id, false)
            }
        };

        let shape = self.record_shape(false);
        let name = self.var_name(&[
            proto.name(),
            &escape_component(router),
            &self.edge_tag(edge),
            "IMPORT",
        ]);
        let admin_dist = shape
            .admin_dist
            .then(|| SmtTerm::int(proto.default_admin_distance()));
        let transformed = match proto {
            RoutingProtocol::Ospf => {
                let cost = graph
                    .interface(router, &edge.start)
                    .map_or(DEFAULT_OSPF_COST, Interface::ospf_cost);
                SymbolicRecord {
                    name,
                    metric: source.metric.clone().add(SmtTerm::int(i64::from(cost))),
                    admin_dist,
                    router_id,
                    ..source
                }
            }
            RoutingProtocol::Bgp => {
                let policy = graph
                    .bgp_neighbors()
                    .get(edge)
                    .and_then(|n| n.import_policy.as_deref());
                let transfer = PolicyTransfer {
                    conf,
                    protocol: proto,
                    packet: &self.packet,
                    prefix_length: &source.prefix_length,
                };
                let outcome = transfer.apply(
                    policy,
                    RouteAttributes {
                        local_pref: SmtTerm::int(DEFAULT_LOCAL_PREF),
                        metric: source.metric.clone(),
                    },
                )?;
                SymbolicRecord {
                    name,
                    permitted: SmtTerm::and(vec![source.permitted.clone(), outcome.accepted]),
                    prefix_length: source.prefix_length.clone(),
                    metric: outcome.attributes.metric,
                    admin_dist,
                    local_pref: shape.local_pref.then_some(outcome.attributes.local_pref),
                    med: shape.med.then(|| source.med_or_default()),
                    router_id,
                }
            }
            RoutingProtocol::Connected | RoutingProtocol::Static => return Ok(None),
        };

        if mergeable {
            return Ok(Some(transformed));
        }
        let mut fresh = SymbolicRecord::declare(&mut self.ctx, transformed.name.clone(), shape)?;
        self.ctx.assert_term(fresh.copies(&transformed, proto));
        fresh.router_id = transformed.router_id;
        Ok(Some(fresh))
    }

    fn build_originations(&mut self) {
        let graph = self.graph;
        for (router, conf) in graph.configurations() {
            for proto in self.optimizations.router_protocols(router).to_vec() {
                if !proto.is_adjacency_based() {
                    continue;
                }
                let networks = longest_first(
                    conf.originated_networks(proto)
                        .into_iter()
                        .filter(|n| self.is_relevant(n)),
                );
                if networks.is_empty() {
                    continue;
                }
                let name = self.var_name(&[proto.name(), &escape_component(router), "ORIGINATE"]);
                let record = SymbolicRecord {
                    permitted: self.relevant_origination(&networks),
                    prefix_length: longest_match_length(&self.packet, &networks),
                    ..self.constant_record(name, conf, proto)
                };
                self.originations
                    .entry(router.clone())
                    .or_default()
                    .insert(proto, record);
            }
        }
    }

    fn build_best(&mut self) -> Result<(), EncoderError> {
        let graph = self.graph;
        for router in graph.configurations().keys() {
            let r = escape_component(router);
            let protocols = self.optimizations.router_protocols(router).to_vec();
            let mut per_protocol = ProtocolMap::new();
            let mut candidate_choices = ProtocolMap::new();
            for &proto in &protocols {
                let mut candidates: Vec<(Option<GraphEdge>, SymbolicRecord)> = self
                    .logical_graph
                    .imports(router, proto)
                    .map(|lge| (Some(lge.edge.clone()), lge.record.clone()))
                    .collect();
                if let Some(origin) = self.origination(router, proto) {
                    candidates.push((None, origin.clone()));
                }
                let with_router_id = self.optimizations.needs_router_id(router, proto);
                let name = self.var_name(&["best", proto.name(), &r]);
                let shape = self.record_shape(with_router_id);
                let best = SymbolicRecord::declare(&mut self.ctx, name, shape)?;
                let names = candidates
                    .iter()
                    .map(|(edge, _)| match edge {
                        Some(e) => self.var_name(&["choice", proto.name(), &r, &self.edge_tag(e)]),
                        None => self.var_name(&["choice", proto.name(), &r, "origin"]),
                    })
                    .collect();
                let records: Vec<(RoutingProtocol, &SymbolicRecord)> =
                    candidates.iter().map(|(_, rec)| (proto, rec)).collect();
                let choices = select(&mut self.ctx, &best, &records, names, with_router_id)?;
                candidate_choices.insert(
                    proto,
                    candidates
                        .into_iter()
                        .map(|(edge, _)| edge)
                        .zip(choices)
                        .collect::<BTreeMap<_, _>>(),
                );
                per_protocol.insert(proto, best);
            }

            let mut overall_choices = ProtocolMap::new();
            let single = self.optimizations.slice_has_single_protocol().contains(router);
            let overall = match (protocols.as_slice(), per_protocol.values().next()) {
                ([], _) | (_, None) => SymbolicRecord::absent(self.var_name(&["best", &r])),
                ([only], Some(best)) if single => {
                    overall_choices.insert(*only, best.permitted.clone());
                    best.clone()
                }
                _ => {
                    let name = self.var_name(&["best", &r]);
                    let shape = self.record_shape(false);
                    let best = SymbolicRecord::declare(&mut self.ctx, name, shape)?;
                    let names = per_protocol
                        .keys()
                        .map(|p| self.var_name(&["choice", &r, p.name()]))
                        .collect();
                    let records: Vec<(RoutingProtocol, &SymbolicRecord)> =
                        per_protocol.iter().map(|(p, rec)| (*p, rec)).collect();
                    let choices = select(&mut self.ctx, &best, &records, names, false)?;
                    overall_choices.extend(per_protocol.keys().copied().zip(choices));
                    best
                }
            };
            debug!(
                encoder = self.id,
                router = %router,
                protocols = protocols.len(),
                "Route selection encoded"
            );
            self.decisions.best_neighbor.insert(router.clone(), overall);
            self.decisions
                .best_neighbor_per_protocol
                .insert(router.clone(), per_protocol);
            self.decisions
                .choice_variables
                .insert(router.clone(), overall_choices);
            self.decisions
                .candidate_choices
                .insert(router.clone(), candidate_choices);
        }
        Ok(())
    }

    /// Tie each export record to the protocol best through the export
    /// policy. A shared record follows the policy of its first edge.
    fn constrain_exports(&mut self) -> Result<(), EncoderError> {
        let graph = self.graph;
        for (router, conf) in graph.configurations() {
            let exports: Vec<LogicalGraphEdge> = self
                .logical_graph
                .router_edges(router)
                .iter()
                .filter(|lge| lge.edge_type == EdgeType::Export)
                .cloned()
                .collect();
            let mut constrained = BTreeSet::new();
            for lge in exports {
                if !constrained.insert(lge.record.name.clone()) {
                    continue;
                }
                let proto = lge.protocol;
                let Some(best) = self
                    .decisions
                    .best_neighbor_per_protocol(router, proto)
                    .cloned()
                else {
                    continue;
                };
                let (policy, metric) = match proto {
                    RoutingProtocol::Bgp => (
                        graph
                            .bgp_neighbors()
                            .get(&lge.edge)
                            .and_then(|n| n.export_policy.as_deref()),
                        best.metric.clone().add(SmtTerm::int(1)),
                    ),
                    RoutingProtocol::Ospf => (
                        conf.default_vrf
                            .ospf_process
                            .as_ref()
                            .and_then(|p| p.export_policy.as_deref()),
                        best.metric.clone(),
                    ),
                    RoutingProtocol::Connected | RoutingProtocol::Static => continue,
                };
                let transfer = PolicyTransfer {
                    conf,
                    protocol: proto,
                    packet: &self.packet,
                    prefix_length: &best.prefix_length,
                };
                let outcome = transfer.apply(
                    policy,
                    RouteAttributes {
                        local_pref: best.local_pref_or_default(),
                        metric,
                    },
                )?;
                let exported = SymbolicRecord {
                    name: lge.record.name.clone(),
                    permitted: SmtTerm::and(vec![best.permitted.clone(), outcome.accepted]),
                    prefix_length: best.prefix_length.clone(),
                    metric: outcome.attributes.metric,
                    admin_dist: None,
                    local_pref: Some(outcome.attributes.local_pref),
                    med: Some(best.med_or_default()),
                    router_id: None,
                };
                self.ctx.assert_term(lge.record.copies(&exported, proto));
            }
        }
        Ok(())
    }

    fn build_acls(&mut self) {
        let graph = self.graph;
        for (router, conf) in graph.configurations() {
            for edge in graph.edges(router) {
                let Some(iface) = conf.interface(&edge.start) else {
                    continue;
                };
                if let Some(name) = &iface.incoming_filter {
                    let acl = self.acl_term(conf, name);
                    self.incoming_acls.insert(edge.clone(), acl);
                }
                if let Some(name) = &iface.outgoing_filter {
                    let acl = self.acl_term(conf, name);
                    self.outgoing_acls.insert(edge.clone(), acl);
                }
            }
        }
    }

    fn acl_term(&self, conf: &Configuration, name: &str) -> SmtTerm {
        match conf.ip_access_lists.get(name) {
            Some(acl) => acl_permits(acl, &self.packet),
            None => {
                warn!(
                    router = %conf.hostname,
                    acl = %name,
                    "Access list is not defined; permitting all traffic"
                );
                SmtTerm::bool(true)
            }
        }
    }

    fn build_forwarding(&mut self) -> Result<(), EncoderError> {
        let graph = self.graph;
        for (router, conf) in graph.configurations() {
            let r = escape_component(router);
            let protocols = self.optimizations.router_protocols(router).to_vec();
            let mut control = BTreeMap::new();
            let mut data = BTreeMap::new();
            for edge in graph.edges(router) {
                let mut options = Vec::new();
                for &proto in &protocols {
                    let Some(lge) = self
                        .logical_graph
                        .find_edge(edge, proto, EdgeType::Import)
                    else {
                        continue;
                    };
                    let Some(overall) = self.decisions.choice_variable(router, proto) else {
                        continue;
                    };
                    let uses_edge = if conf.is_multipath(proto) {
                        let Some(best) = self.decisions.best_neighbor_per_protocol(router, proto)
                        else {
                            continue;
                        };
                        SmtTerm::and(vec![
                            lge.record.permitted.clone(),
                            better(best, proto, &lge.record, proto, false).not(),
                        ])
                    } else {
                        self.decisions
                            .candidate_choice(router, proto, Some(edge))
                            .cloned()
                            .unwrap_or_else(|| SmtTerm::bool(false))
                    };
                    options.push(SmtTerm::and(vec![overall.clone(), uses_edge]));
                }

                let tag = self.edge_tag(edge);
                let name = self.var_name(&["control-forwarding", &r, &tag]);
                let cfwd = self.ctx.declare_bool(name)?;
                self.ctx.assert_term(cfwd.clone().eq(SmtTerm::or(options)));

                let mut passes = vec![cfwd.clone()];
                if let Some(acl) = self.outgoing_acls.get(edge) {
                    passes.push(acl.clone());
                }
                if let Some(acl) = graph
                    .other_end(edge)
                    .and_then(|reverse| self.incoming_acls.get(reverse))
                {
                    passes.push(acl.clone());
                }
                let name = self.var_name(&["data-forwarding", &r, &tag]);
                let dfwd = self.ctx.declare_bool(name)?;
                self.ctx.assert_term(dfwd.clone().eq(SmtTerm::and(passes)));

                control.insert(edge.clone(), cfwd);
                data.insert(edge.clone(), dfwd);
            }
            self.decisions
                .control_forwarding
                .insert(router.clone(), control);
            self.decisions.data_forwarding.insert(router.clone(), data);
        }
        Ok(())
    }

    /// `<interface>-<peer>`, with `env` for the external side. When the
    /// peer is reached over more than one of its interfaces the far
    /// interface is appended.
    fn edge_tag(&self, edge: &GraphEdge) -> String {
        let peer = edge.peer.as_deref().map_or_else(|| "env".to_string(), escape_component);
        let mut tag = format!("{}-{peer}", escape_component(&edge.start));
        let parallel = self
            .graph
            .edges(&edge.router)
            .iter()
            .filter(|e| e.start == edge.start && e.peer == edge.peer)
            .count();
        if parallel > 1 {
            if let Some(end) = &edge.end {
                tag.push('-');
                tag.push_str(&escape_component(end));
            }
        }
        tag
    }
}

fn longest_first(networks: impl IntoIterator<Item = Prefix>) -> Vec<Prefix> {
    let mut networks: Vec<Prefix> = networks.into_iter().collect();
    networks.sort_by(|a, b| b.length().cmp(&a.length()).then(a.cmp(b)));
    networks.dedup();
    networks
}

/// Length of the longest network in `networks` (sorted longest first) that
/// contains the destination.
fn longest_match_length(packet: &SymbolicPacket, networks: &[Prefix]) -> SmtTerm {
    let Some((last, rest)) = networks.split_last() else {
        return SmtTerm::int(0);
    };
    rest.iter()
        .rev()
        .fold(SmtTerm::int(i64::from(last.length())), |acc, n| {
            SmtTerm::ite(packet.dst_in(n), SmtTerm::int(i64::from(n.length())), acc)
        })
}

/// Constrain `best` to a maximal permitted candidate and return one choice
/// variable per candidate, true for the candidate `best` copies.
fn select(
    ctx: &mut SmtContext,
    best: &SymbolicRecord,
    candidates: &[(RoutingProtocol, &SymbolicRecord)],
    choice_names: Vec<String>,
    with_router_id: bool,
) -> Result<Vec<SmtTerm>, ContextError> {
    ctx.assert_term(best.permitted.clone().eq(SmtTerm::or(
        candidates.iter().map(|(_, c)| c.permitted.clone()).collect(),
    )));
    let choices = choice_names
        .into_iter()
        .map(|name| ctx.declare_bool(name))
        .collect::<Result<Vec<_>, _>>()?;
    for (i, ((proto, cand), choice)) in candidates.iter().zip(&choices).enumerate() {
        let mut conditions = vec![cand.permitted.clone(), best.copies(cand, *proto)];
        for (j, (other_proto, other)) in candidates.iter().enumerate() {
            if i != j {
                conditions.push(
                    other
                        .permitted
                        .clone()
                        .implies(better(other, *other_proto, cand, *proto, with_router_id).not()),
                );
            }
        }
        ctx.assert_term(choice.clone().implies(SmtTerm::and(conditions)));
    }
    ctx.assert_term(best.permitted.clone().implies(SmtTerm::or(choices.clone())));
    for (i, a) in choices.iter().enumerate() {
        for b in &choices[i + 1..] {
            ctx.assert_term(SmtTerm::and(vec![a.clone(), b.clone()]).not());
        }
    }
    Ok(choices)
}
