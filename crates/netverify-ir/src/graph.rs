//! Network topology inferred from interface addressing.
//!
//! Two interfaces on different routers are linked when they sit on the same
//! subnet. Every active interface yields one [`GraphEdge`] per linked peer
//! interface; an interface without a modeled peer yields a single edge whose
//! far end is the external environment.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{BgpNeighbor, Configuration, Interface, StaticRoute};
use crate::prefix::Prefix;
use crate::protocol::RoutingProtocol;

/// One direction of a link. `end == None` means the far side is outside the
/// modeled network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphEdge {
    pub router: String,
    pub start: String,
    pub peer: Option<String>,
    pub end: Option<String>,
}

impl GraphEdge {
    pub fn is_environment(&self) -> bool {
        self.end.is_none()
    }
}

impl fmt::Display for GraphEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{} --> {},{}",
            self.router,
            self.start,
            self.peer.as_deref().unwrap_or("_"),
            self.end.as_deref().unwrap_or("_"),
        )
    }
}

/// Router configurations plus the edges between them.
#[derive(Debug, Clone)]
pub struct Graph {
    configurations: BTreeMap<String, Configuration>,
    edge_map: BTreeMap<String, Vec<GraphEdge>>,
    other_end: HashMap<GraphEdge, GraphEdge>,
    neighbors: BTreeMap<String, BTreeSet<String>>,
    bgp_neighbors: HashMap<GraphEdge, BgpNeighbor>,
    static_routes: BTreeMap<String, BTreeMap<String, Vec<StaticRoute>>>,
}

impl Graph {
    pub fn new(configs: impl IntoIterator<Item = Configuration>) -> Self {
        let configurations = configs
            .into_iter()
            .map(|c| (c.hostname.clone(), c))
            .collect();
        Self::build(configurations)
    }

    /// A graph over only `routers`. Links to routers left out become
    /// environment edges.
    pub fn restricted<'a>(
        configs: impl IntoIterator<Item = &'a Configuration>,
        routers: &BTreeSet<String>,
    ) -> Self {
        let configurations = configs
            .into_iter()
            .filter(|c| routers.contains(&c.hostname))
            .map(|c| (c.hostname.clone(), c.clone()))
            .collect();
        Self::build(configurations)
    }

    fn build(configurations: BTreeMap<String, Configuration>) -> Self {
        let mut edge_map: BTreeMap<String, Vec<GraphEdge>> = BTreeMap::new();
        let mut neighbors: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for (router, conf) in &configurations {
            let edges = edge_map.entry(router.clone()).or_default();
            neighbors.entry(router.clone()).or_default();

            for iface in conf.interfaces.values().filter(|i| i.active) {
                let mut linked = false;
                if let Some(subnet) = iface.prefix() {
                    for (peer, peer_conf) in &configurations {
                        if peer == router {
                            continue;
                        }
                        for far in peer_conf.interfaces.values().filter(|i| i.active) {
                            if far.prefix() == Some(subnet) {
                                linked = true;
                                edges.push(GraphEdge {
                                    router: router.clone(),
                                    start: iface.name.clone(),
                                    peer: Some(peer.clone()),
                                    end: Some(far.name.clone()),
                                });
                                neighbors
                                    .entry(router.clone())
                                    .or_default()
                                    .insert(peer.clone());
                            }
                        }
                    }
                }
                if !linked {
                    edges.push(GraphEdge {
                        router: router.clone(),
                        start: iface.name.clone(),
                        peer: None,
                        end: None,
                    });
                }
            }
        }

        let mut other_end = HashMap::new();
        for edges in edge_map.values() {
            for edge in edges {
                let (Some(peer), Some(end)) = (&edge.peer, &edge.end) else {
                    continue;
                };
                let reverse = GraphEdge {
                    router: peer.clone(),
                    start: end.clone(),
                    peer: Some(edge.router.clone()),
                    end: Some(edge.start.clone()),
                };
                other_end.insert(edge.clone(), reverse);
            }
        }

        let mut graph = Self {
            configurations,
            edge_map,
            other_end,
            neighbors,
            bgp_neighbors: HashMap::new(),
            static_routes: BTreeMap::new(),
        };
        graph.bgp_neighbors = graph.compute_bgp_neighbors();
        graph.static_routes = graph.compute_static_routes();
        graph
    }

    fn compute_bgp_neighbors(&self) -> HashMap<GraphEdge, BgpNeighbor> {
        let mut out = HashMap::new();
        for (router, edges) in &self.edge_map {
            let Some(conf) = self.configurations.get(router) else {
                continue;
            };
            let Some(bgp) = &conf.default_vrf.bgp_process else {
                continue;
            };
            for edge in edges {
                let Some(subnet) = self.edge_prefix(edge) else {
                    continue;
                };
                let far_ip = self.far_interface(edge).and_then(|i| i.address).map(|a| a.ip);
                let neighbor = bgp.neighbors.iter().find(|n| match far_ip {
                    Some(ip) => n.address == ip,
                    None => edge.is_environment() && subnet.contains_ip(n.address),
                });
                if let Some(n) = neighbor {
                    out.insert(edge.clone(), n.clone());
                }
            }
        }
        out
    }

    fn compute_static_routes(&self) -> BTreeMap<String, BTreeMap<String, Vec<StaticRoute>>> {
        let mut out: BTreeMap<String, BTreeMap<String, Vec<StaticRoute>>> = BTreeMap::new();
        for (router, conf) in &self.configurations {
            let per_iface = out.entry(router.clone()).or_default();
            for route in &conf.default_vrf.static_routes {
                let iface = match (&route.next_hop_interface, route.next_hop_ip) {
                    (Some(name), _) => conf.interface(name).map(|i| i.name.clone()),
                    (None, Some(ip)) => conf
                        .interfaces
                        .values()
                        .find(|i| i.active && i.prefix().is_some_and(|p| p.contains_ip(ip)))
                        .map(|i| i.name.clone()),
                    (None, None) => None,
                };
                if let Some(iface) = iface {
                    per_iface.entry(iface).or_default().push(route.clone());
                }
            }
        }
        out
    }

    pub fn configurations(&self) -> &BTreeMap<String, Configuration> {
        &self.configurations
    }

    pub fn configuration(&self, router: &str) -> Option<&Configuration> {
        self.configurations.get(router)
    }

    pub fn edge_map(&self) -> &BTreeMap<String, Vec<GraphEdge>> {
        &self.edge_map
    }

    pub fn edges(&self, router: &str) -> &[GraphEdge] {
        self.edge_map.get(router).map_or(&[], Vec::as_slice)
    }

    pub fn neighbors(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.neighbors
    }

    pub fn bgp_neighbors(&self) -> &HashMap<GraphEdge, BgpNeighbor> {
        &self.bgp_neighbors
    }

    /// Static routes per router, grouped by the interface they resolve to.
    pub fn static_routes(&self) -> &BTreeMap<String, BTreeMap<String, Vec<StaticRoute>>> {
        &self.static_routes
    }

    /// Static routes of `edge.router` that send traffic across `edge`.
    pub fn static_routes_for_edge(&self, edge: &GraphEdge) -> Vec<&StaticRoute> {
        let far_ip = self.far_interface(edge).and_then(|i| i.address).map(|a| a.ip);
        self.static_routes
            .get(&edge.router)
            .and_then(|m| m.get(&edge.start))
            .map(|routes| {
                routes
                    .iter()
                    .filter(|r| match (r.next_hop_ip, far_ip) {
                        (Some(hop), Some(ip)) => hop == ip,
                        _ => true,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The reverse direction of an internal edge.
    pub fn other_end(&self, edge: &GraphEdge) -> Option<&GraphEdge> {
        self.other_end.get(edge)
    }

    pub fn interface(&self, router: &str, name: &str) -> Option<&Interface> {
        self.configurations.get(router)?.interface(name)
    }

    /// The subnet of the edge's starting interface.
    pub fn edge_prefix(&self, edge: &GraphEdge) -> Option<Prefix> {
        self.interface(&edge.router, &edge.start)?.prefix()
    }

    fn far_interface(&self, edge: &GraphEdge) -> Option<&Interface> {
        self.interface(edge.peer.as_deref()?, edge.end.as_deref()?)
    }

    /// Whether `conf` runs `proto` over interface `iface`.
    pub fn is_interface_used(
        &self,
        conf: &Configuration,
        proto: RoutingProtocol,
        iface: &str,
    ) -> bool {
        let Some(interface) = conf.interface(iface) else {
            return false;
        };
        if !interface.active {
            return false;
        }
        match proto {
            RoutingProtocol::Connected => interface.address.is_some(),
            RoutingProtocol::Static => self
                .static_routes
                .get(&conf.hostname)
                .is_some_and(|m| m.get(iface).is_some_and(|r| !r.is_empty())),
            RoutingProtocol::Ospf => {
                conf.default_vrf.ospf_process.is_some() && interface.ospf_enabled
            }
            RoutingProtocol::Bgp => match (&conf.default_vrf.bgp_process, interface.prefix()) {
                (Some(bgp), Some(subnet)) => {
                    bgp.neighbors.iter().any(|n| subnet.contains_ip(n.address))
                }
                _ => false,
            },
        }
    }
}
