//! End-to-end property checks against Z3 on small static-routing topologies.

mod common;
use common::*;

use netverify_engine::property_checker::{ConsistencyAnswer, PropertyChecker};
use netverify_engine::result::VerificationResult;
use netverify_engine::settings::EncoderSettings;
use std::net::Ipv4Addr;

use netverify_ir::config::{BgpNeighbor, BgpProcess, Configuration};
use netverify_ir::graph::GraphEdge;
use netverify_ir::policy::{BooleanExpr, PrefixRange, RoutingPolicy, Statement};

const LAN_EDGE: &str = "d,lan --> _,_";

fn checker_for(graph: &netverify_ir::graph::Graph) -> PropertyChecker<'_> {
    init_tracing();
    PropertyChecker::new(graph, EncoderSettings::default())
}

fn edge(router: &str, start: &str, peer: Option<&str>, end: Option<&str>) -> GraphEdge {
    GraphEdge {
        router: router.into(),
        start: start.into(),
        peer: peer.map(Into::into),
        end: end.map(Into::into),
    }
}

#[test]
fn chain_reaches_lan_from_every_source() {
    let graph = network(static_chain());
    let answer = checker_for(&graph)
        .compute_reachability("d", "lan", "a|b")
        .unwrap();
    assert_eq!(answer.results.len(), 1);
    assert!(answer.results[LAN_EDGE].verified, "{}", answer.results[LAN_EDGE]);
}

#[test]
fn missing_transit_route_breaks_reachability() {
    let mut configs = static_chain();
    router(&mut configs, "b").default_vrf.static_routes.clear();
    let graph = network(configs);
    let answer = checker_for(&graph)
        .compute_reachability("d", "lan", "a")
        .unwrap();
    let result = &answer.results[LAN_EDGE];
    assert!(!result.verified);
    assert_eq!(result.bool_value("0_reachable_a"), Some(false));
    let packet = result.packet.as_ref().expect("counterexample packet");
    assert!(packet.dst_ip.starts_with("10.9.0."), "{}", packet.dst_ip);
}

#[test]
fn forwarding_follows_static_routes() {
    let graph = network(static_chain());
    let answer = checker_for(&graph).compute_forwarding(LAN).unwrap();
    assert!(!answer.result.verified);
    let expected = [
        edge("a", "right", Some("b"), Some("left")),
        edge("b", "right", Some("d"), Some("left")),
        edge("d", "lan", None, None),
    ];
    assert_eq!(answer.edges.into_iter().collect::<Vec<_>>(), expected);
}

#[test]
fn path_length_is_bounded_by_hop_count() {
    let graph = network(static_chain());
    let checker = checker_for(&graph);
    let within = checker
        .compute_bounded_length("d", "lan", "a|b", 2)
        .unwrap();
    assert!(within.results[LAN_EDGE].verified);

    let too_short = checker
        .compute_bounded_length("d", "lan", "a|b", 1)
        .unwrap();
    let result = &too_short.results[LAN_EDGE];
    assert!(!result.verified);
    assert_eq!(result.int_value("0_path-length_a"), Some(2));
}

#[test]
fn diamond_branches_have_equal_length() {
    let graph = network(static_diamond());
    let checker = checker_for(&graph);
    let branches = checker.compute_equal_length("d", "lan", "b|c").unwrap();
    assert!(branches.results[LAN_EDGE].verified);

    let mixed = checker.compute_equal_length("d", "lan", "a|b").unwrap();
    let result = &mixed.results[LAN_EDGE];
    assert!(!result.verified);
    assert_eq!(result.int_value("0_path-length_a"), Some(2));
    assert_eq!(result.int_value("0_path-length_b"), Some(1));
}

#[test]
fn ecmp_source_balances_load_over_both_branches() {
    let graph = network(static_diamond());
    let answer = checker_for(&graph)
        .compute_load_balance("d", "lan", "a", "b|c", 0)
        .unwrap();
    assert!(answer.results[LAN_EDGE].verified);
}

#[test]
fn single_path_source_unbalances_load() {
    let mut configs = static_diamond();
    router(&mut configs, "a")
        .default_vrf
        .static_routes
        .retain(|r| r.next_hop_interface.as_deref() == Some("b"));
    let graph = network(configs);
    let answer = checker_for(&graph)
        .compute_load_balance("d", "lan", "a", "b|c", 0)
        .unwrap();
    let result = &answer.results[LAN_EDGE];
    assert!(!result.verified);
    assert_eq!(result.int_value("0_load_b"), Some(2));
    assert_eq!(result.int_value("0_load_c"), Some(1));
}

#[test]
fn filtered_ecmp_branch_is_multipath_inconsistent() {
    let clean = network(static_diamond());
    let answer = checker_for(&clean)
        .compute_multipath_consistency("d", "lan")
        .unwrap();
    assert!(answer.results[LAN_EDGE].verified);

    let mut configs = static_diamond();
    let a = router(&mut configs, "a");
    a.add_access_list(deny_all("DROP"));
    if let Some(c) = a.interfaces.get_mut("c") {
        c.outgoing_filter = Some("DROP".into());
    }
    let filtered = network(configs);
    let answer = checker_for(&filtered)
        .compute_multipath_consistency("d", "lan")
        .unwrap();
    let result = &answer.results[LAN_EDGE];
    assert!(!result.verified);
    assert_eq!(result.bool_value("0_control-forwarding_a_c-c"), Some(true));
    assert_eq!(result.bool_value("0_data-forwarding_a_c-c"), Some(false));
}

#[test]
fn static_routes_pointing_at_each_other_loop() {
    let mut a = Configuration::new("a");
    a.add_interface(iface("right", "172.16.0.1/30"));
    static_via(&mut a, LAN, "right");
    let mut b = Configuration::new("b");
    b.add_interface(iface("left", "172.16.0.2/30"));
    static_via(&mut b, LAN, "left");
    let graph = network(vec![a, b]);
    let answer = checker_for(&graph).compute_routing_loop().unwrap();
    assert!(!answer.result.verified);
}

#[test]
fn chain_has_no_routing_loop() {
    let graph = network(static_chain());
    let answer = checker_for(&graph).compute_routing_loop().unwrap();
    assert!(answer.result.verified, "{}", answer.result);
}

#[test]
fn connected_only_pair_has_no_black_hole() {
    let mut a = Configuration::new("a");
    a.add_interface(iface("lan", "10.9.0.1/24"));
    a.add_interface(iface("right", "172.16.0.1/30"));
    let mut b = Configuration::new("b");
    b.add_interface(iface("left", "172.16.0.2/30"));
    let graph = network(vec![a.clone(), b.clone()]);
    assert!(checker_for(&graph).compute_black_hole().unwrap().result.verified);

    static_via(&mut a, "0.0.0.0/0", "right");
    let graph = network(vec![a, b]);
    let answer = checker_for(&graph).compute_black_hole().unwrap();
    assert!(!answer.result.verified);
}

#[test]
fn diamond_branches_are_locally_consistent() {
    let graph = network(static_diamond());
    match checker_for(&graph).compute_local_consistency("b|c").unwrap() {
        ConsistencyAnswer::Compared(results) => {
            assert_eq!(results.len(), 1);
            assert!(results["b<-->c"].verified, "{}", results["b<-->c"]);
        }
        other => panic!("unexpected answer {other:?}"),
    }
}

#[test]
fn differing_incoming_filter_breaks_local_consistency() {
    let mut configs = static_diamond();
    let c = router(&mut configs, "c");
    c.add_access_list(deny_destination("NO-LAN", LAN));
    if let Some(a) = c.interfaces.get_mut("a") {
        a.incoming_filter = Some("NO-LAN".into());
    }
    let graph = network(configs);
    match checker_for(&graph).compute_local_consistency("b|c").unwrap() {
        ConsistencyAnswer::Compared(results) => assert!(!results["b<-->c"].verified),
        other => panic!("unexpected answer {other:?}"),
    }
}

#[test]
fn router_without_egress_black_holes_default_traffic() {
    let mut a = Configuration::new("a");
    a.add_interface(iface("uplink", "203.0.113.1/30"));
    a.add_interface(iface("right", "172.16.0.1/30"));
    static_via(&mut a, "0.0.0.0/0", "uplink");
    let mut b = Configuration::new("b");
    b.add_interface(iface("left", "172.16.0.2/30"));
    static_via(&mut b, "0.0.0.0/0", "left");

    let graph = network(vec![a.clone(), b.clone()]);
    let answer = checker_for(&graph).compute_black_hole().unwrap();
    assert!(answer.result.verified, "{}", answer.result);

    a.interfaces.shift_remove("uplink");
    let graph = network(vec![a, b]);
    let answer = checker_for(&graph).compute_black_hole().unwrap();
    assert!(!answer.result.verified);
}

/// A BGP speaker with one external neighbor on `up`.
fn bgp_edge_router(name: &str, link: u8, export_policy: Option<RoutingPolicy>) -> Configuration {
    let mut conf = Configuration::new(name);
    conf.add_interface(iface("up", &format!("172.16.{link}.1/30")));
    let mut neighbor = BgpNeighbor::new(Ipv4Addr::new(172, 16, link, 2));
    if let Some(policy) = export_policy {
        neighbor.export_policy = Some(policy.name.clone());
        conf.add_policy(policy);
    }
    conf.default_vrf.bgp_process = Some(BgpProcess {
        router_id: Some(Ipv4Addr::new(1, 1, 1, link)),
        neighbors: vec![neighbor],
        ..BgpProcess::default()
    });
    conf
}

#[test]
fn identical_bgp_routers_are_locally_consistent() {
    let graph = network(vec![
        bgp_edge_router("b", 0, None),
        bgp_edge_router("c", 1, None),
    ]);
    match checker_for(&graph).compute_local_consistency("b|c").unwrap() {
        ConsistencyAnswer::Compared(results) => {
            assert!(results["b<-->c"].verified, "{}", results["b<-->c"]);
        }
        other => panic!("unexpected answer {other:?}"),
    }
}

#[test]
fn export_filter_on_one_router_breaks_local_consistency() {
    let filter = RoutingPolicy::new(
        "NO-LAN",
        vec![Statement::if_then_else(
            BooleanExpr::MatchPrefixSet(vec![PrefixRange::orlonger(prefix("10.9.0.0/16"))]),
            vec![Statement::reject()],
            vec![Statement::accept()],
        )],
    );
    let graph = network(vec![
        bgp_edge_router("b", 0, None),
        bgp_edge_router("c", 1, Some(filter)),
    ]);
    match checker_for(&graph).compute_local_consistency("b|c").unwrap() {
        ConsistencyAnswer::Compared(results) => {
            let result = &results["b<-->c"];
            assert!(!result.verified);
            let packet = result.packet.as_ref().expect("counterexample packet");
            assert!(packet.dst_ip.starts_with("10.9."), "{}", packet.dst_ip);
            // b announces the route upstream, c filters it.
            assert_eq!(export_permitted(result, "0_bgp_b_"), "true");
            assert_eq!(export_permitted(result, "1_bgp_c_"), "false");
        }
        other => panic!("unexpected answer {other:?}"),
    }
}

fn export_permitted<'a>(result: &'a VerificationResult, record_prefix: &str) -> &'a str {
    result
        .model
        .iter()
        .find(|(name, _)| name.starts_with(record_prefix) && name.ends_with("EXPORT_permitted"))
        .map(|(_, value)| value.as_str())
        .unwrap_or_else(|| panic!("no export record under {record_prefix}"))
}
