//! Proptest strategies for prefixes, routing policies and small networks.

use std::net::Ipv4Addr;

use proptest::prelude::*;

use crate::config::{BgpNeighbor, BgpProcess, Configuration, Interface, OspfProcess, StaticRoute};
use crate::policy::{BooleanExpr, PrefixRange, RoutingPolicy, Statement, StaticStatement};
use crate::prefix::{InterfaceAddress, Prefix};
use crate::protocol::RoutingProtocol;

/// Any IPv4 prefix.
pub fn arb_prefix() -> impl Strategy<Value = Prefix> {
    (any::<u32>(), 0u8..=32).prop_map(|(addr, len)| Prefix::new(Ipv4Addr::from(addr), len))
}

/// Prefixes inside `10.0.0.0/8`, so that generated sets overlap often.
pub fn arb_private_prefix() -> impl Strategy<Value = Prefix> {
    (0u32..=0x00ff_ffff, 8u8..=30)
        .prop_map(|(host, len)| Prefix::new(Ipv4Addr::from(0x0a00_0000 | host), len))
}

fn arb_static_statement() -> impl Strategy<Value = StaticStatement> {
    prop_oneof![
        Just(StaticStatement::ExitAccept),
        Just(StaticStatement::ExitReject),
        Just(StaticStatement::ReturnTrue),
        Just(StaticStatement::ReturnFalse),
    ]
}

fn arb_guard() -> impl Strategy<Value = BooleanExpr> {
    let leaf = prop_oneof![
        Just(BooleanExpr::True),
        Just(BooleanExpr::False),
        arb_private_prefix().prop_map(|p| BooleanExpr::MatchPrefixSet(vec![PrefixRange::orlonger(p)])),
        prop::sample::select(RoutingProtocol::ALL.to_vec()).prop_map(BooleanExpr::MatchProtocol),
    ];
    leaf.prop_recursive(3, 12, 3, |inner| {
        prop_oneof![
            inner.clone().prop_map(|e| BooleanExpr::Not(Box::new(e))),
            prop::collection::vec(inner.clone(), 1..3).prop_map(BooleanExpr::Conjunction),
            prop::collection::vec(inner, 1..3).prop_map(BooleanExpr::Disjunction),
        ]
    })
}

/// Statement lists up to three `If` levels deep.
pub fn arb_statements() -> impl Strategy<Value = Vec<Statement>> {
    let leaf = prop_oneof![
        (0u32..400).prop_map(Statement::SetLocalPreference),
        (0u32..100).prop_map(Statement::SetMetric),
        arb_static_statement().prop_map(Statement::Static),
    ];
    let stmt = leaf.prop_recursive(3, 16, 3, |inner| {
        (
            arb_guard(),
            prop::collection::vec(inner.clone(), 0..3),
            prop::collection::vec(inner, 0..3),
        )
            .prop_map(|(guard, t, f)| Statement::if_then_else(guard, t, f))
    });
    prop::collection::vec(stmt, 0..4)
}

pub fn arb_policy(name: &'static str) -> impl Strategy<Value = RoutingPolicy> {
    arb_statements().prop_map(move |statements| RoutingPolicy::new(name, statements))
}

/// Per-router knobs for [`arb_chain_network`].
#[derive(Debug, Clone)]
struct RouterShape {
    ospf: bool,
    ospf_multipath: bool,
    bgp: bool,
    bgp_multipath: bool,
    default_route: bool,
    export_policy: Option<Vec<Statement>>,
}

fn arb_router_shape() -> impl Strategy<Value = RouterShape> {
    (
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        proptest::option::of(arb_statements()),
    )
        .prop_map(
            |(ospf, ospf_multipath, bgp, bgp_multipath, default_route, export_policy)| {
                RouterShape {
                    ospf,
                    ospf_multipath,
                    bgp,
                    bgp_multipath,
                    default_route,
                    export_policy,
                }
            },
        )
}

/// A chain `r0 - r1 - ... - r(n-1)` of 2..=5 routers. Each router owns a
/// host subnet `10.<i>.0.0/24`; link `i` uses `172.16.<i>.0/30`. Protocol
/// processes, default routes and BGP export policies vary per router.
pub fn arb_chain_network() -> impl Strategy<Value = Vec<Configuration>> {
    prop::collection::vec(arb_router_shape(), 2..=5).prop_map(|shapes| {
        let n = shapes.len();
        shapes
            .into_iter()
            .enumerate()
            .map(|(i, shape)| chain_router(i, n, shape))
            .collect()
    })
}

fn link_address(link: usize, side: u8) -> InterfaceAddress {
    InterfaceAddress::new(Ipv4Addr::new(172, 16, link as u8, side), 30)
}

fn chain_router(i: usize, n: usize, shape: RouterShape) -> Configuration {
    let mut conf = Configuration::new(format!("r{i}"));
    let host = InterfaceAddress::new(Ipv4Addr::new(10, i as u8, 0, 1), 24);
    conf.add_interface(Interface::new("host", Some(host)));

    let mut neighbors = Vec::new();
    if i > 0 {
        let addr = link_address(i - 1, 2);
        conf.add_interface(Interface::new("left", Some(addr)).with_ospf(1));
        neighbors.push(BgpNeighbor::new(Ipv4Addr::new(172, 16, (i - 1) as u8, 1)));
    }
    if i + 1 < n {
        let addr = link_address(i, 1);
        conf.add_interface(Interface::new("right", Some(addr)).with_ospf(1));
        neighbors.push(BgpNeighbor::new(Ipv4Addr::new(172, 16, i as u8, 2)));
    }

    if shape.ospf {
        conf.default_vrf.ospf_process = Some(OspfProcess {
            export_policy: None,
            multipath: shape.ospf_multipath,
        });
    }
    if shape.bgp {
        if let Some(statements) = shape.export_policy {
            conf.add_policy(RoutingPolicy::new("EXPORT", statements));
            for neighbor in &mut neighbors {
                neighbor.export_policy = Some("EXPORT".to_string());
            }
        }
        conf.default_vrf.bgp_process = Some(BgpProcess {
            router_id: Some(Ipv4Addr::new(1, 1, 1, i as u8)),
            multipath_ebgp: shape.bgp_multipath,
            networks: vec![host.prefix()],
            neighbors,
        });
    }
    if shape.default_route && i + 1 < n {
        conf.add_static_route(StaticRoute::via_interface(Prefix::any(), "right"));
    }
    conf
}
