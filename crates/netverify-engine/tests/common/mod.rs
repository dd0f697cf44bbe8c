#![allow(dead_code)]

use netverify_ir::config::{AclLine, Configuration, Interface, IpAccessList, LineAction, StaticRoute};
use netverify_ir::graph::Graph;
use netverify_ir::prefix::Prefix;

/// Destination subnet served by the last router of every topology below.
pub const LAN: &str = "10.9.0.0/24";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn prefix(s: &str) -> Prefix {
    s.parse().unwrap_or_else(|e| panic!("bad prefix {s}: {e}"))
}

pub fn iface(name: &str, addr: &str) -> Interface {
    Interface::new(name, Some(addr.parse().unwrap_or_else(|e| panic!("bad address {addr}: {e}"))))
}

pub fn static_via(conf: &mut Configuration, network: &str, out: &str) {
    conf.add_static_route(StaticRoute::via_interface(prefix(network), out));
}

/// An access list that drops every packet.
pub fn deny_all(name: &str) -> IpAccessList {
    IpAccessList::new(name, Vec::new())
}

pub fn deny_destination(name: &str, network: &str) -> IpAccessList {
    IpAccessList::new(
        name,
        vec![
            AclLine {
                action: LineAction::Reject,
                dst_prefixes: vec![prefix(network)],
                src_prefixes: Vec::new(),
            },
            AclLine {
                action: LineAction::Accept,
                dst_prefixes: Vec::new(),
                src_prefixes: Vec::new(),
            },
        ],
    )
}

/// `a - b - d`, with `d` attached to [`LAN`] and static routes toward it on
/// `a` and `b`.
pub fn static_chain() -> Vec<Configuration> {
    let mut a = Configuration::new("a");
    a.add_interface(iface("right", "172.16.0.1/30"));
    static_via(&mut a, LAN, "right");

    let mut b = Configuration::new("b");
    b.add_interface(iface("left", "172.16.0.2/30"));
    b.add_interface(iface("right", "172.16.1.1/30"));
    static_via(&mut b, LAN, "right");

    let mut d = Configuration::new("d");
    d.add_interface(iface("left", "172.16.1.2/30"));
    d.add_interface(iface("lan", "10.9.0.1/24"));

    vec![a, b, d]
}

/// `a` reaches `d` through both `b` and `c`:
///
/// ```text
///     b
///   /   \
/// a       d -- lan
///   \   /
///     c
/// ```
pub fn static_diamond() -> Vec<Configuration> {
    let mut a = Configuration::new("a");
    a.add_interface(iface("b", "172.16.0.1/30"));
    a.add_interface(iface("c", "172.16.1.1/30"));
    static_via(&mut a, LAN, "b");
    static_via(&mut a, LAN, "c");

    let mut b = Configuration::new("b");
    b.add_interface(iface("a", "172.16.0.2/30"));
    b.add_interface(iface("d", "172.16.2.1/30"));
    static_via(&mut b, LAN, "d");

    let mut c = Configuration::new("c");
    c.add_interface(iface("a", "172.16.1.2/30"));
    c.add_interface(iface("d", "172.16.3.1/30"));
    static_via(&mut c, LAN, "d");

    let mut d = Configuration::new("d");
    d.add_interface(iface("b", "172.16.2.2/30"));
    d.add_interface(iface("c", "172.16.3.2/30"));
    d.add_interface(iface("lan", "10.9.0.1/24"));

    vec![a, b, c, d]
}

pub fn router<'a>(configs: &'a mut [Configuration], name: &str) -> &'a mut Configuration {
    configs
        .iter_mut()
        .find(|c| c.hostname == name)
        .unwrap_or_else(|| panic!("no router {name}"))
}

pub fn network(configs: Vec<Configuration>) -> Graph {
    Graph::new(configs)
}
