//! Network-wide properties as satisfiability queries.
//!
//! Every check builds an encoding, asserts the negation of the property and
//! asks the solver for a counterexample. A result is `verified` when none
//! exists.

use std::collections::{BTreeMap, BTreeSet};

use netverify_ir::config::Configuration;
use netverify_ir::graph::{Graph, GraphEdge};
use netverify_ir::patterns::{compile_pattern, find_matching_edges, find_matching_nodes};
use netverify_ir::prefix::{Prefix, PrefixParseError};
use netverify_ir::protocol::{EdgeType, RoutingProtocol};
use netverify_smt::terms::SmtTerm;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::encoder::{Encoder, EncoderError};
use crate::property_adder::{all_equal, PropertyAdder};
use crate::result::VerificationResult;
use crate::settings::EncoderSettings;

#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("invalid name pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("invalid destination: {0}")]
    Destination(#[from] PrefixParseError),
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error("routers {first} and {second}: only one has an environment on interface {interface}")]
    EnvironmentMismatch {
        first: String,
        second: String,
        interface: String,
    },
    #[error("router {0} is not part of the network")]
    UnknownRouter(String),
    #[error("router {router} has no {protocol} {edge_type} edge on interface {interface}")]
    MissingLogicalEdge {
        router: String,
        protocol: RoutingProtocol,
        edge_type: EdgeType,
        interface: String,
    },
}

/// Data-plane edges used for one concrete packet.
#[derive(Debug, Clone, Serialize)]
pub struct ForwardingAnswer {
    pub result: VerificationResult,
    pub edges: BTreeSet<GraphEdge>,
}

/// One result per destination edge, keyed by the edge's display form.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ManyAnswer {
    pub results: BTreeMap<String, VerificationResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OneAnswer {
    pub result: VerificationResult,
}

#[derive(Debug, Clone, Serialize)]
pub enum ConsistencyAnswer {
    /// One result per consecutive router pair, keyed `r1<-->r2`.
    Compared(BTreeMap<String, VerificationResult>),
    /// Two routers do not have the same interfaces.
    Incomparable { first: String, second: String },
}

pub struct PropertyChecker<'g> {
    graph: &'g Graph,
    settings: EncoderSettings,
}

impl<'g> PropertyChecker<'g> {
    pub fn new(graph: &'g Graph, settings: EncoderSettings) -> Self {
        Self { graph, settings }
    }

    fn encoder(&self, destinations: &[Prefix]) -> Result<Encoder<'g>, PropertyError> {
        let mut enc = Encoder::new(self.graph, destinations, self.settings.clone())?;
        enc.compute_encoding()?;
        Ok(enc)
    }

    fn matching_nodes(&self, pattern: &str) -> Result<Vec<String>, PropertyError> {
        Ok(find_matching_nodes(self.graph, &compile_pattern(pattern)?))
    }

    /// Run `negate` once per edge matching `node`/`iface`, each time on a
    /// fresh encoding whose destination is the edge's subnet.
    fn per_destination<F>(
        &self,
        node: &str,
        iface: &str,
        mut negate: F,
    ) -> Result<ManyAnswer, PropertyError>
    where
        F: FnMut(&GraphEdge, &mut Encoder<'g>) -> Result<SmtTerm, EncoderError>,
    {
        let edges = find_matching_edges(
            self.graph,
            &compile_pattern(node)?,
            &compile_pattern(iface)?,
        );
        let mut answer = ManyAnswer::default();
        for ge in edges {
            let Some(destination) = self.graph.edge_prefix(&ge) else {
                warn!(edge = %ge, "Destination interface has no address; skipping");
                continue;
            };
            let mut enc = self.encoder(&[destination])?;
            let violation = negate(&ge, &mut enc)?;
            enc.add(violation);
            let result = enc.verify()?;
            info!(edge = %ge, verified = result.verified, "Destination checked");
            answer.results.insert(ge.to_string(), result);
        }
        Ok(answer)
    }

    /// The data-plane edges one packet to `destination` takes.
    pub fn compute_forwarding(
        &self,
        destination: &str,
    ) -> Result<ForwardingAnswer, PropertyError> {
        let prefix: Prefix = destination.parse()?;
        let enc = self.encoder(&[prefix])?;
        if !enc.logical_graph().environment_vars().is_empty() {
            warn!("Forwarding computed for only a single concrete environment");
        }
        let result = enc.verify()?;
        let mut edges = BTreeSet::new();
        if !result.verified {
            for fwd in enc.symbolic_decisions().data_forwarding_map().values() {
                for (edge, term) in fwd {
                    if result.is_true(term) {
                        edges.insert(edge.clone());
                    }
                }
            }
        }
        Ok(ForwardingAnswer { result, edges })
    }

    /// Every router matching `sources` delivers to every edge matching
    /// `node`/`iface`.
    pub fn compute_reachability(
        &self,
        node: &str,
        iface: &str,
        sources: &str,
    ) -> Result<ManyAnswer, PropertyError> {
        let sources = self.matching_nodes(sources)?;
        self.per_destination(node, iface, |ge, enc| {
            let reachable = PropertyAdder::new(enc).instrument_reachability(ge)?;
            Ok(SmtTerm::or(
                sources
                    .iter()
                    .filter_map(|r| reachable.get(r))
                    .map(|reach| reach.clone().not())
                    .collect(),
            ))
        })
    }

    /// No router without an external edge receives traffic it then drops.
    pub fn compute_black_hole(&self) -> Result<OneAnswer, PropertyError> {
        let graph = self.graph;
        let mut enc = self.encoder(&[Prefix::any()])?;
        let to_check: Vec<&String> = graph
            .edge_map()
            .iter()
            .filter(|(_, edges)| edges.iter().all(|e| !e.is_environment()))
            .map(|(router, _)| router)
            .collect();

        let decisions = enc.symbolic_decisions();
        let mut black_holes = Vec::new();
        for router in to_check {
            let does_not_forward = SmtTerm::and(
                graph
                    .edges(router)
                    .iter()
                    .map(|e| decisions.data_forwarding(router, e).not())
                    .collect(),
            );
            let mut forwarded_to = Vec::new();
            for neighbor in graph.neighbors().get(router).into_iter().flatten() {
                for edge in graph.edges(neighbor) {
                    if edge.peer.as_ref() == Some(router) {
                        forwarded_to.push(decisions.data_forwarding(neighbor, edge));
                    }
                }
            }
            black_holes.push(SmtTerm::and(vec![
                SmtTerm::or(forwarded_to),
                does_not_forward,
            ]));
        }
        enc.add(SmtTerm::or(black_holes));
        Ok(OneAnswer {
            result: enc.verify()?,
        })
    }

    /// Every source reaches the destination within `k` hops.
    pub fn compute_bounded_length(
        &self,
        node: &str,
        iface: &str,
        sources: &str,
        k: u32,
    ) -> Result<ManyAnswer, PropertyError> {
        let sources = self.matching_nodes(sources)?;
        self.per_destination(node, iface, |ge, enc| {
            let lengths = PropertyAdder::new(enc).instrument_path_length(ge)?;
            Ok(SmtTerm::or(
                sources
                    .iter()
                    .filter_map(|r| lengths.get(r))
                    .map(|len| len.clone().gt(SmtTerm::int(i64::from(k))))
                    .collect(),
            ))
        })
    }

    /// All sources are the same number of hops from the destination.
    pub fn compute_equal_length(
        &self,
        node: &str,
        iface: &str,
        sources: &str,
    ) -> Result<ManyAnswer, PropertyError> {
        let sources = self.matching_nodes(sources)?;
        self.per_destination(node, iface, |ge, enc| {
            let lengths = PropertyAdder::new(enc).instrument_path_length(ge)?;
            let terms: Vec<SmtTerm> = sources
                .iter()
                .filter_map(|r| lengths.get(r).cloned())
                .collect();
            Ok(all_equal(&terms).not())
        })
    }

    /// Neighbors matching `peers` of each source carry equal load toward the
    /// destination. `k` is accepted for compatibility and not used.
    pub fn compute_load_balance(
        &self,
        node: &str,
        iface: &str,
        sources: &str,
        peers: &str,
        k: u32,
    ) -> Result<ManyAnswer, PropertyError> {
        debug!(k, "Load balance threshold is not used");
        let sources = self.matching_nodes(sources)?;
        let peers = self.matching_nodes(peers)?;
        let mut peer_routers: BTreeMap<&String, Vec<&String>> = BTreeMap::new();
        for router in &sources {
            let neighbors = self.graph.neighbors().get(router);
            let adjacent = peers
                .iter()
                .filter(|p| neighbors.is_some_and(|n| n.contains(*p)))
                .collect();
            peer_routers.insert(router, adjacent);
        }
        self.per_destination(node, iface, |ge, enc| {
            let loads = PropertyAdder::new(enc).instrument_load(ge)?;
            let peer_loads: Vec<SmtTerm> = peer_routers
                .values()
                .flatten()
                .filter_map(|p| loads.get(*p).cloned())
                .collect();
            Ok(all_equal(&peer_loads).not())
        })
    }

    /// Consecutive routers matching `node` (in name order) behave alike:
    /// given equal environments and packets, they forward alike, export
    /// alike and filter incoming traffic alike. Destinations inside directly
    /// connected subnets are ignored.
    pub fn compute_local_consistency(
        &self,
        node: &str,
    ) -> Result<ConsistencyAnswer, PropertyError> {
        let routers = self.matching_nodes(node)?;
        info!(routers = ?routers, "Checking local consistency");
        let mut results = BTreeMap::new();
        for pair in routers.windows(2) {
            let (r1, r2) = (&pair[0], &pair[1]);
            let Some(result) = self.compare_routers(r1, r2)? else {
                warn!(first = %r1, second = %r2, "Routers have different interfaces");
                return Ok(ConsistencyAnswer::Incomparable {
                    first: r1.clone(),
                    second: r2.clone(),
                });
            };
            info!(first = %r1, second = %r2, verified = result.verified, "Routers compared");
            results.insert(format!("{r1}<-->{r2}"), result);
        }
        Ok(ConsistencyAnswer::Compared(results))
    }

    /// One local consistency query over `r1` and `r2`, each cut out of the
    /// network on its own. `None` when their interfaces differ.
    fn compare_routers(
        &self,
        r1: &str,
        r2: &str,
    ) -> Result<Option<VerificationResult>, PropertyError> {
        let any = compile_pattern(".*")?;
        let destination = [Prefix::any()];
        let configs = self.graph.configurations().values();
        let g1 = Graph::restricted(configs.clone(), &BTreeSet::from([r1.to_string()]));
        let g2 = Graph::restricted(configs, &BTreeSet::from([r2.to_string()]));
        let edges1 = find_matching_edges(&g1, &any, &any);
        let edges2 = find_matching_edges(&g2, &any, &any);
        let ifaces1: BTreeSet<&str> = edges1.iter().map(|e| e.start.as_str()).collect();
        let ifaces2: BTreeSet<&str> = edges2.iter().map(|e| e.start.as_str()).collect();
        if ifaces1 != ifaces2 {
            return Ok(None);
        }
        let conf1 = g1
            .configuration(r1)
            .ok_or_else(|| PropertyError::UnknownRouter(r1.to_string()))?;
        let conf2 = g2
            .configuration(r2)
            .ok_or_else(|| PropertyError::UnknownRouter(r2.to_string()))?;

        let mut e1 = Encoder::new(&g1, &destination, self.settings.clone())?;
        e1.compute_encoding()?;
        let mut e2 =
            Encoder::with_context(e1.take_context(), &g2, &destination, self.settings.clone())?;
        e2.compute_encoding()?;

        let mut equal_envs = Vec::new();
        let mut equal_outputs = Vec::new();
        let mut equal_acls = Vec::new();
        for lge1 in e1.logical_graph().router_edges(r1) {
            let interface = &lge1.edge.start;
            let lge2 = e2
                .logical_graph()
                .find(r2, lge1.protocol, interface, lge1.edge_type)
                .ok_or_else(|| PropertyError::MissingLogicalEdge {
                    router: r2.to_string(),
                    protocol: lge1.protocol,
                    edge_type: lge1.edge_type,
                    interface: interface.clone(),
                })?;
            match lge1.edge_type {
                EdgeType::Import => {
                    equal_acls
                        .push(incoming_acl(&e1, &lge1.edge).eq(incoming_acl(&e2, &lge2.edge)));
                    let (env1, env2) = if lge1.protocol == RoutingProtocol::Bgp {
                        (
                            e1.logical_graph().environment_record(&lge1.edge),
                            e2.logical_graph().environment_record(&lge2.edge),
                        )
                    } else {
                        (None, None)
                    };
                    match (env1, env2) {
                        (Some(v1), Some(v2)) => {
                            let same = e1.equal(conf1, lge1.protocol, v1, v2, Some(lge1));
                            equal_envs.push(same);
                        }
                        (None, None) => {}
                        _ => {
                            return Err(PropertyError::EnvironmentMismatch {
                                first: r1.to_string(),
                                second: r2.to_string(),
                                interface: interface.clone(),
                            });
                        }
                    }
                }
                EdgeType::Export => {
                    equal_outputs.push(e1.equal(
                        conf1,
                        lge1.protocol,
                        &lge1.record,
                        &lge2.record,
                        Some(lge1),
                    ));
                }
            }
        }

        let mut assumptions = equal_envs;
        assumptions.push(ignored_destinations(&e1, conf1));
        assumptions.push(ignored_destinations(&e2, conf2));
        assumptions.push(e1.symbolic_packet().mk_equal(e2.symbolic_packet()));

        let by_interface: BTreeMap<&str, &GraphEdge> =
            edges2.iter().map(|e| (e.start.as_str(), e)).collect();
        let mut required = Vec::new();
        for ge1 in &edges1 {
            let Some(ge2) = by_interface.get(ge1.start.as_str()) else {
                continue;
            };
            let fwd1 = e1.symbolic_decisions().data_forwarding(r1, ge1);
            let fwd2 = e2.symbolic_decisions().data_forwarding(r2, ge2);
            required.push(fwd1.eq(fwd2));
        }
        required.extend(equal_outputs);
        required.extend(equal_acls);

        e2.add(SmtTerm::and(assumptions));
        e2.add(SmtTerm::and(required).not());
        Ok(Some(e2.verify()?))
    }

    /// Wherever the destination is reachable, every edge the control plane
    /// forwards on also passes the data plane.
    pub fn compute_multipath_consistency(
        &self,
        node: &str,
        iface: &str,
    ) -> Result<ManyAnswer, PropertyError> {
        let graph = self.graph;
        self.per_destination(node, iface, |ge, enc| {
            let reachable = PropertyAdder::new(enc).instrument_reachability(ge)?;
            let decisions = enc.symbolic_decisions();
            Ok(SmtTerm::or(
                graph
                    .configurations()
                    .keys()
                    .filter_map(|router| {
                        let reach = reachable.get(router)?;
                        let dropped = graph
                            .edges(router)
                            .iter()
                            .map(|e| {
                                SmtTerm::and(vec![
                                    decisions.control_forwarding(router, e),
                                    decisions.data_forwarding(router, e).not(),
                                ])
                            })
                            .collect();
                        Some(SmtTerm::and(vec![reach.clone(), SmtTerm::or(dropped)]))
                    })
                    .collect(),
            ))
        })
    }

    /// No packet toward a statically routed prefix loops through a router
    /// that has static routes.
    pub fn compute_routing_loop(&self) -> Result<OneAnswer, PropertyError> {
        let graph = self.graph;
        let prefixes: Vec<Prefix> = graph
            .static_routes()
            .values()
            .flat_map(|by_iface| by_iface.values().flatten())
            .map(|route| route.network)
            .collect();
        let routers: Vec<&String> = graph
            .configurations()
            .iter()
            .filter(|(_, conf)| !conf.default_vrf.static_routes.is_empty())
            .map(|(router, _)| router)
            .collect();

        let mut enc = self.encoder(&prefixes)?;
        let mut adder = PropertyAdder::new(&mut enc);
        let loops: Vec<SmtTerm> = routers
            .into_iter()
            .map(|router| adder.instrument_loop(router))
            .collect::<Result<_, _>>()?;
        enc.add(SmtTerm::or(loops));
        Ok(OneAnswer {
            result: enc.verify()?,
        })
    }
}

fn incoming_acl(enc: &Encoder<'_>, edge: &GraphEdge) -> SmtTerm {
    enc.incoming_acls()
        .get(edge)
        .cloned()
        .unwrap_or_else(|| SmtTerm::bool(true))
}

/// The packet is not destined to a subnet the router is directly attached to.
fn ignored_destinations(enc: &Encoder<'_>, conf: &Configuration) -> SmtTerm {
    if !enc
        .optimizations()
        .router_protocols(&conf.hostname)
        .contains(&RoutingProtocol::Connected)
    {
        return SmtTerm::bool(true);
    }
    let prefixes = enc.originated_networks(conf, RoutingProtocol::Connected);
    enc.relevant_origination(&prefixes).not()
}

#[cfg(test)]
mod tests {
    use super::*;
    use netverify_ir::config::{Interface, StaticRoute};

    fn iface(name: &str, addr: &str) -> Interface {
        Interface::new(name, Some(addr.parse().expect("address")))
    }

    /// Two routers with the same interface names, both attached to `10.9.0.0/24`.
    fn twins() -> Graph {
        let mut b = Configuration::new("b");
        b.add_interface(iface("up", "172.16.0.1/30"));
        b.add_interface(iface("down", "10.9.0.1/24"));
        let mut c = Configuration::new("c");
        c.add_interface(iface("up", "172.16.1.1/30"));
        c.add_interface(iface("down", "10.9.0.2/24"));
        Graph::new([b, c])
    }

    #[test]
    fn invalid_patterns_are_reported() {
        let graph = twins();
        let checker = PropertyChecker::new(&graph, EncoderSettings::default());
        let err = checker.compute_reachability("b", "(", ".*").unwrap_err();
        assert!(matches!(err, PropertyError::Pattern(_)));
    }

    #[test]
    fn invalid_forwarding_destination_is_reported() {
        let graph = twins();
        let checker = PropertyChecker::new(&graph, EncoderSettings::default());
        let err = checker.compute_forwarding("10.9.0.0/33").unwrap_err();
        assert!(matches!(err, PropertyError::Destination(_)));
    }

    #[test]
    fn unmatched_destination_yields_no_results() {
        let graph = twins();
        let checker = PropertyChecker::new(&graph, EncoderSettings::default());
        let answer = checker.compute_reachability("nobody", ".*", ".*").unwrap();
        assert!(answer.results.is_empty());
    }

    #[test]
    fn destination_without_address_is_skipped() {
        let mut b = Configuration::new("b");
        b.add_interface(Interface::new("mgmt", None));
        let graph = Graph::new([b]);
        let checker = PropertyChecker::new(&graph, EncoderSettings::default());
        let answer = checker.compute_bounded_length("b", "mgmt", "b", 3).unwrap();
        assert!(answer.results.is_empty());
    }

    #[test]
    fn single_router_has_nothing_to_compare() {
        let graph = twins();
        let checker = PropertyChecker::new(&graph, EncoderSettings::default());
        match checker.compute_local_consistency("b").unwrap() {
            ConsistencyAnswer::Compared(results) => assert!(results.is_empty()),
            other => panic!("unexpected answer {other:?}"),
        }
    }

    #[test]
    fn routers_with_different_interfaces_are_incomparable() {
        let mut b = Configuration::new("b");
        b.add_interface(iface("up", "172.16.0.1/30"));
        let mut c = Configuration::new("c");
        c.add_interface(iface("uplink", "172.16.1.1/30"));
        let graph = Graph::new([b, c]);
        let checker = PropertyChecker::new(&graph, EncoderSettings::default());
        match checker.compute_local_consistency("b|c").unwrap() {
            ConsistencyAnswer::Incomparable { first, second } => {
                assert_eq!(first, "b");
                assert_eq!(second, "c");
            }
            other => panic!("unexpected answer {other:?}"),
        }
    }

    #[test]
    fn logical_edge_missing_on_second_router_is_an_error() {
        let mut b = Configuration::new("b");
        b.add_interface(iface("up", "172.16.0.1/30"));
        b.add_interface(iface("down", "10.9.0.1/24"));
        b.add_static_route(StaticRoute::via_interface(
            "10.7.0.0/16".parse().expect("prefix"),
            "up",
        ));
        let mut c = Configuration::new("c");
        c.add_interface(iface("up", "172.16.1.1/30"));
        c.add_interface(iface("down", "10.9.0.2/24"));
        let graph = Graph::new([b, c]);
        let checker = PropertyChecker::new(&graph, EncoderSettings::default());
        let err = checker.compute_local_consistency("b|c").unwrap_err();
        match err {
            PropertyError::MissingLogicalEdge {
                router,
                protocol,
                edge_type,
                interface,
            } => {
                assert_eq!(router, "c");
                assert_eq!(protocol, RoutingProtocol::Static);
                assert_eq!(edge_type, EdgeType::Import);
                assert_eq!(interface, "up");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn comparing_routers_outside_the_network_is_an_error() {
        let graph = twins();
        let checker = PropertyChecker::new(&graph, EncoderSettings::default());
        let err = checker.compare_routers("ghost", "phantom").unwrap_err();
        assert!(matches!(err, PropertyError::UnknownRouter(ref r) if r == "ghost"));
        assert!(checker.compare_routers("b", "phantom").unwrap().is_none());
    }

    #[test]
    fn answers_serialize_with_edge_keys() {
        let mut answer = ManyAnswer::default();
        answer
            .results
            .insert("d,lan --> _,_".into(), VerificationResult::verified());
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["results"]["d,lan --> _,_"]["verified"], true);
    }
}
