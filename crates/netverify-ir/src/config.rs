//! Vendor-independent router configuration.

use std::net::Ipv4Addr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::policy::RoutingPolicy;
use crate::prefix::{InterfaceAddress, Prefix};
use crate::protocol::RoutingProtocol;

/// Default OSPF interface cost when none is configured.
pub const DEFAULT_OSPF_COST: u32 = 1;

/// One router's configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub hostname: String,
    #[serde(default)]
    pub interfaces: IndexMap<String, Interface>,
    #[serde(default)]
    pub routing_policies: IndexMap<String, RoutingPolicy>,
    #[serde(default)]
    pub ip_access_lists: IndexMap<String, IpAccessList>,
    #[serde(default)]
    pub default_vrf: Vrf,
}

impl Configuration {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            interfaces: IndexMap::new(),
            routing_policies: IndexMap::new(),
            ip_access_lists: IndexMap::new(),
            default_vrf: Vrf::default(),
        }
    }

    pub fn add_interface(&mut self, iface: Interface) -> &mut Self {
        self.interfaces.insert(iface.name.clone(), iface);
        self
    }

    pub fn add_policy(&mut self, policy: RoutingPolicy) -> &mut Self {
        self.routing_policies.insert(policy.name.clone(), policy);
        self
    }

    pub fn add_access_list(&mut self, acl: IpAccessList) -> &mut Self {
        self.ip_access_lists.insert(acl.name.clone(), acl);
        self
    }

    pub fn add_static_route(&mut self, route: StaticRoute) -> &mut Self {
        self.default_vrf.static_routes.push(route);
        self
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.get(name)
    }

    pub fn policy(&self, name: &str) -> Option<&RoutingPolicy> {
        self.routing_policies.get(name)
    }

    /// Prefixes this router injects into `proto`.
    pub fn originated_networks(&self, proto: RoutingProtocol) -> Vec<Prefix> {
        match proto {
            RoutingProtocol::Connected => self
                .interfaces
                .values()
                .filter(|i| i.active)
                .filter_map(|i| i.address.map(|a| a.prefix()))
                .collect(),
            RoutingProtocol::Static => self
                .default_vrf
                .static_routes
                .iter()
                .map(|sr| sr.network)
                .collect(),
            RoutingProtocol::Ospf => {
                if self.default_vrf.ospf_process.is_none() {
                    return Vec::new();
                }
                self.interfaces
                    .values()
                    .filter(|i| i.active && i.ospf_enabled)
                    .filter_map(|i| i.address.map(|a| a.prefix()))
                    .collect()
            }
            RoutingProtocol::Bgp => self
                .default_vrf
                .bgp_process
                .as_ref()
                .map(|p| p.networks.clone())
                .unwrap_or_default(),
        }
    }

    /// Whether equal-cost routes of `proto` are all installed.
    pub fn is_multipath(&self, proto: RoutingProtocol) -> bool {
        match proto {
            RoutingProtocol::Connected | RoutingProtocol::Static => true,
            RoutingProtocol::Ospf => self
                .default_vrf
                .ospf_process
                .as_ref()
                .map_or(true, |p| p.multipath),
            RoutingProtocol::Bgp => self
                .default_vrf
                .bgp_process
                .as_ref()
                .is_some_and(|p| p.multipath_ebgp),
        }
    }

    /// The numeric router id used for tie-breaking, 0 when unset.
    pub fn router_id(&self) -> i64 {
        self.default_vrf
            .bgp_process
            .as_ref()
            .and_then(|p| p.router_id)
            .map_or(0, |id| i64::from(u32::from(id)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    #[serde(default)]
    pub address: Option<InterfaceAddress>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub ospf_enabled: bool,
    #[serde(default)]
    pub ospf_cost: Option<u32>,
    /// Name of the ACL applied to packets arriving on this interface.
    #[serde(default)]
    pub incoming_filter: Option<String>,
    /// Name of the ACL applied to packets leaving through this interface.
    #[serde(default)]
    pub outgoing_filter: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Interface {
    pub fn new(name: impl Into<String>, address: Option<InterfaceAddress>) -> Self {
        Self {
            name: name.into(),
            address,
            active: true,
            ospf_enabled: false,
            ospf_cost: None,
            incoming_filter: None,
            outgoing_filter: None,
        }
    }

    pub fn prefix(&self) -> Option<Prefix> {
        self.address.map(|a| a.prefix())
    }

    pub fn ospf_cost(&self) -> u32 {
        self.ospf_cost.unwrap_or(DEFAULT_OSPF_COST)
    }

    pub fn with_ospf(mut self, cost: u32) -> Self {
        self.ospf_enabled = true;
        self.ospf_cost = Some(cost);
        self
    }

    pub fn with_incoming_filter(mut self, acl: impl Into<String>) -> Self {
        self.incoming_filter = Some(acl.into());
        self
    }

    pub fn with_outgoing_filter(mut self, acl: impl Into<String>) -> Self {
        self.outgoing_filter = Some(acl.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vrf {
    #[serde(default)]
    pub ospf_process: Option<OspfProcess>,
    #[serde(default)]
    pub bgp_process: Option<BgpProcess>,
    #[serde(default)]
    pub static_routes: Vec<StaticRoute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OspfProcess {
    #[serde(default)]
    pub export_policy: Option<String>,
    #[serde(default = "default_true")]
    pub multipath: bool,
}

impl Default for OspfProcess {
    fn default() -> Self {
        Self {
            export_policy: None,
            multipath: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgpProcess {
    #[serde(default)]
    pub router_id: Option<Ipv4Addr>,
    #[serde(default)]
    pub multipath_ebgp: bool,
    /// Networks announced by this process.
    #[serde(default)]
    pub networks: Vec<Prefix>,
    #[serde(default)]
    pub neighbors: Vec<BgpNeighbor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgpNeighbor {
    pub address: Ipv4Addr,
    #[serde(default)]
    pub import_policy: Option<String>,
    #[serde(default)]
    pub export_policy: Option<String>,
}

impl BgpNeighbor {
    pub fn new(address: Ipv4Addr) -> Self {
        Self {
            address,
            import_policy: None,
            export_policy: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRoute {
    pub network: Prefix,
    #[serde(default)]
    pub next_hop_ip: Option<Ipv4Addr>,
    #[serde(default)]
    pub next_hop_interface: Option<String>,
}

impl StaticRoute {
    pub fn via_interface(network: Prefix, iface: impl Into<String>) -> Self {
        Self {
            network,
            next_hop_ip: None,
            next_hop_interface: Some(iface.into()),
        }
    }

    pub fn via_ip(network: Prefix, next_hop: Ipv4Addr) -> Self {
        Self {
            network,
            next_hop_ip: Some(next_hop),
            next_hop_interface: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineAction {
    Accept,
    Reject,
}

/// One ACL line. Empty prefix lists match any address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclLine {
    pub action: LineAction,
    #[serde(default)]
    pub dst_prefixes: Vec<Prefix>,
    #[serde(default)]
    pub src_prefixes: Vec<Prefix>,
}

/// First-match list of lines with an implicit deny at the end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAccessList {
    pub name: String,
    pub lines: Vec<AclLine>,
}

impl IpAccessList {
    pub fn new(name: impl Into<String>, lines: Vec<AclLine>) -> Self {
        Self {
            name: name.into(),
            lines,
        }
    }
}
