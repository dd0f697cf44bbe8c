use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Routing protocols that contribute routes to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingProtocol {
    Bgp,
    Ospf,
    Static,
    Connected,
}

impl RoutingProtocol {
    pub const ALL: [RoutingProtocol; 4] = [
        RoutingProtocol::Bgp,
        RoutingProtocol::Ospf,
        RoutingProtocol::Static,
        RoutingProtocol::Connected,
    ];

    /// Default administrative distance of routes learned through this protocol.
    pub fn default_admin_distance(self) -> i64 {
        match self {
            RoutingProtocol::Connected => 0,
            RoutingProtocol::Static => 1,
            RoutingProtocol::Bgp => 20,
            RoutingProtocol::Ospf => 110,
        }
    }

    /// Whether routes of this protocol are exchanged with neighbors (and so
    /// have import/export logical edges) rather than originated locally.
    pub fn is_adjacency_based(self) -> bool {
        match self {
            RoutingProtocol::Bgp | RoutingProtocol::Ospf => true,
            RoutingProtocol::Static | RoutingProtocol::Connected => false,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RoutingProtocol::Bgp => "bgp",
            RoutingProtocol::Ospf => "ospf",
            RoutingProtocol::Static => "static",
            RoutingProtocol::Connected => "connected",
        }
    }
}

impl fmt::Display for RoutingProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction of a logical edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    Import,
    Export,
}

impl EdgeType {
    pub fn name(self) -> &'static str {
        match self {
            EdgeType::Import => "import",
            EdgeType::Export => "export",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-protocol values, ordered by protocol.
pub type ProtocolMap<T> = BTreeMap<RoutingProtocol, T>;

/// Per-direction values.
pub type EdgeTypeMap<T> = BTreeMap<EdgeType, T>;
