use std::collections::BTreeMap;

use netverify_ir::graph::GraphEdge;
use netverify_ir::protocol::{ProtocolMap, RoutingProtocol};
use netverify_smt::terms::SmtTerm;

use super::record::SymbolicRecord;

/// Route selection and forwarding variables of every router.
#[derive(Debug, Clone, Default)]
pub struct SymbolicDecisions {
    pub(crate) best_neighbor: BTreeMap<String, SymbolicRecord>,
    pub(crate) best_neighbor_per_protocol: BTreeMap<String, ProtocolMap<SymbolicRecord>>,
    /// Overall best came from this protocol.
    pub(crate) choice_variables: BTreeMap<String, ProtocolMap<SmtTerm>>,
    /// Protocol best came from this import edge (`None` = local origination).
    pub(crate) candidate_choices:
        BTreeMap<String, ProtocolMap<BTreeMap<Option<GraphEdge>, SmtTerm>>>,
    pub(crate) control_forwarding: BTreeMap<String, BTreeMap<GraphEdge, SmtTerm>>,
    pub(crate) data_forwarding: BTreeMap<String, BTreeMap<GraphEdge, SmtTerm>>,
}

impl SymbolicDecisions {
    pub fn best_neighbor(&self, router: &str) -> Option<&SymbolicRecord> {
        self.best_neighbor.get(router)
    }

    pub fn best_neighbor_per_protocol(
        &self,
        router: &str,
        proto: RoutingProtocol,
    ) -> Option<&SymbolicRecord> {
        self.best_neighbor_per_protocol.get(router)?.get(&proto)
    }

    pub fn choice_variable(&self, router: &str, proto: RoutingProtocol) -> Option<&SmtTerm> {
        self.choice_variables.get(router)?.get(&proto)
    }

    pub fn candidate_choice(
        &self,
        router: &str,
        proto: RoutingProtocol,
        edge: Option<&GraphEdge>,
    ) -> Option<&SmtTerm> {
        self.candidate_choices
            .get(router)?
            .get(&proto)?
            .get(&edge.cloned())
    }

    pub fn control_forwarding_map(&self) -> &BTreeMap<String, BTreeMap<GraphEdge, SmtTerm>> {
        &self.control_forwarding
    }

    pub fn data_forwarding_map(&self) -> &BTreeMap<String, BTreeMap<GraphEdge, SmtTerm>> {
        &self.data_forwarding
    }

    /// The router sends traffic for the packet's destination over `edge`
    /// according to its routing table. False for edges it has no route over.
    pub fn control_forwarding(&self, router: &str, edge: &GraphEdge) -> SmtTerm {
        lookup(&self.control_forwarding, router, edge)
    }

    /// Like [`Self::control_forwarding`], but also passing the ACLs on both
    /// ends of the edge.
    pub fn data_forwarding(&self, router: &str, edge: &GraphEdge) -> SmtTerm {
        lookup(&self.data_forwarding, router, edge)
    }
}

fn lookup(
    map: &BTreeMap<String, BTreeMap<GraphEdge, SmtTerm>>,
    router: &str,
    edge: &GraphEdge,
) -> SmtTerm {
    map.get(router)
        .and_then(|m| m.get(edge))
        .cloned()
        .unwrap_or_else(|| SmtTerm::bool(false))
}
