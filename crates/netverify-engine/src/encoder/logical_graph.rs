use std::collections::BTreeMap;

use netverify_ir::graph::GraphEdge;
use netverify_ir::protocol::{EdgeType, RoutingProtocol};

use super::record::SymbolicRecord;

/// A physical edge seen through one protocol in one direction.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalGraphEdge {
    pub edge: GraphEdge,
    pub protocol: RoutingProtocol,
    pub edge_type: EdgeType,
    pub record: SymbolicRecord,
}

/// Logical edges of every router plus the environment's announcements.
#[derive(Debug, Clone, Default)]
pub struct LogicalGraph {
    logical_edges: BTreeMap<String, Vec<LogicalGraphEdge>>,
    environment_vars: BTreeMap<GraphEdge, SymbolicRecord>,
}

impl LogicalGraph {
    pub(crate) fn push(&mut self, lge: LogicalGraphEdge) {
        self.logical_edges
            .entry(lge.edge.router.clone())
            .or_default()
            .push(lge);
    }

    pub(crate) fn add_environment(&mut self, edge: GraphEdge, record: SymbolicRecord) {
        self.environment_vars.insert(edge, record);
    }

    pub fn logical_edges(&self) -> &BTreeMap<String, Vec<LogicalGraphEdge>> {
        &self.logical_edges
    }

    pub fn router_edges(&self, router: &str) -> &[LogicalGraphEdge] {
        self.logical_edges.get(router).map_or(&[], Vec::as_slice)
    }

    /// What the environment announces over each external BGP edge.
    pub fn environment_vars(&self) -> &BTreeMap<GraphEdge, SymbolicRecord> {
        &self.environment_vars
    }

    pub fn environment_record(&self, edge: &GraphEdge) -> Option<&SymbolicRecord> {
        self.environment_vars.get(edge)
    }

    /// The logical edge of `router` for `proto` over interface `iface`.
    pub fn find(
        &self,
        router: &str,
        proto: RoutingProtocol,
        iface: &str,
        edge_type: EdgeType,
    ) -> Option<&LogicalGraphEdge> {
        self.router_edges(router).iter().find(|lge| {
            lge.protocol == proto && lge.edge_type == edge_type && lge.edge.start == iface
        })
    }

    /// The logical edge of `proto` in direction `edge_type` over `edge`.
    pub fn find_edge(
        &self,
        edge: &GraphEdge,
        proto: RoutingProtocol,
        edge_type: EdgeType,
    ) -> Option<&LogicalGraphEdge> {
        self.router_edges(&edge.router).iter().find(|lge| {
            lge.protocol == proto && lge.edge_type == edge_type && lge.edge == *edge
        })
    }

    /// Import edges of `router` for `proto`.
    pub fn imports<'a>(
        &'a self,
        router: &str,
        proto: RoutingProtocol,
    ) -> impl Iterator<Item = &'a LogicalGraphEdge> + 'a {
        self.router_edges(router)
            .iter()
            .filter(move |lge| lge.protocol == proto && lge.edge_type == EdgeType::Import)
    }
}
