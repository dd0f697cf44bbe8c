//! Derived variables layered on a built encoding: reachability, path
//! length, load and forwarding loops.
//!
//! Each fixpoint is unrolled once per router. Every round gets its own
//! declared variables, which keeps terms linear in the size of the network
//! instead of nesting the previous round's formula.

use std::collections::BTreeMap;

use netverify_ir::graph::GraphEdge;
use netverify_smt::context::escape_component;
use netverify_smt::terms::SmtTerm;
use tracing::debug;

use crate::encoder::{Encoder, EncoderError};

pub struct PropertyAdder<'a, 'g> {
    encoder: &'a mut Encoder<'g>,
}

impl<'a, 'g> PropertyAdder<'a, 'g> {
    pub fn new(encoder: &'a mut Encoder<'g>) -> Self {
        Self { encoder }
    }

    /// `<id>_<kind>_<router>`, with the router name escaped.
    fn name(&self, kind: &str, router: &str) -> String {
        format!("{}_{kind}_{}", self.encoder.id(), escape_component(router))
    }

    fn declare_bool_equal(
        &mut self,
        name: String,
        value: SmtTerm,
    ) -> Result<SmtTerm, EncoderError> {
        let var = self.encoder.context_mut().declare_bool(name)?;
        self.encoder.add(var.clone().eq(value));
        Ok(var)
    }

    fn declare_int_equal(
        &mut self,
        name: String,
        value: SmtTerm,
    ) -> Result<SmtTerm, EncoderError> {
        let var = self.encoder.context_mut().declare_int(name)?;
        self.encoder.add(var.clone().eq(value));
        Ok(var)
    }

    /// Reachability of `dest` after 0..=N forwarding hops, per router.
    fn reach_rounds(
        &mut self,
        dest: &GraphEdge,
    ) -> Result<Vec<BTreeMap<String, SmtTerm>>, EncoderError> {
        let graph = self.encoder.graph();
        let routers: Vec<&String> = graph.configurations().keys().collect();
        let delivered = self
            .encoder
            .symbolic_decisions()
            .data_forwarding(&dest.router, dest);
        let initial: BTreeMap<String, SmtTerm> = routers
            .iter()
            .map(|r| {
                let term = if **r == dest.router {
                    delivered.clone()
                } else {
                    SmtTerm::bool(false)
                };
                ((*r).clone(), term)
            })
            .collect();

        let mut rounds = vec![initial];
        for i in 1..=routers.len() {
            let mut next = BTreeMap::new();
            for router in &routers {
                let previous = &rounds[i - 1];
                let mut options = vec![previous[*router].clone()];
                for edge in graph.edges(router) {
                    let Some(peer) = &edge.peer else {
                        continue;
                    };
                    let Some(peer_reach) = previous.get(peer) else {
                        continue;
                    };
                    let fwd = self.encoder.symbolic_decisions().data_forwarding(router, edge);
                    options.push(SmtTerm::and(vec![fwd, peer_reach.clone()]));
                }
                let name = self.name(&format!("reach-{i}"), router);
                let var = self.declare_bool_equal(name, SmtTerm::or(options))?;
                next.insert((*router).clone(), var);
            }
            rounds.push(next);
        }
        Ok(rounds)
    }

    /// `reachable_r` holds iff packets leaving `r` are delivered over `dest`.
    pub fn instrument_reachability(
        &mut self,
        dest: &GraphEdge,
    ) -> Result<BTreeMap<String, SmtTerm>, EncoderError> {
        let rounds = self.reach_rounds(dest)?;
        let last = rounds.last().cloned().unwrap_or_default();
        let mut reachable = BTreeMap::new();
        for (router, term) in last {
            let name = self.name("reachable", &router);
            let var = self.declare_bool_equal(name, term)?;
            reachable.insert(router, var);
        }
        debug!(dest = %dest, routers = reachable.len(), "Reachability instrumented");
        Ok(reachable)
    }

    /// Hop count from each router to `dest`; the router count when
    /// unreachable.
    pub fn instrument_path_length(
        &mut self,
        dest: &GraphEdge,
    ) -> Result<BTreeMap<String, SmtTerm>, EncoderError> {
        let rounds = self.reach_rounds(dest)?;
        let n = rounds.len().saturating_sub(1);
        let mut lengths = BTreeMap::new();
        let routers: Vec<String> = rounds
            .first()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default();
        for router in routers {
            let mut length = SmtTerm::int(n as i64);
            for i in (0..n).rev() {
                length = SmtTerm::ite(rounds[i][&router].clone(), SmtTerm::int(i as i64), length);
            }
            let name = self.name("path-length", &router);
            let var = self.declare_int_equal(name, length)?;
            lengths.insert(router, var);
        }
        Ok(lengths)
    }

    /// Number of sources whose traffic for `dest` passes through each router,
    /// the router itself included.
    pub fn instrument_load(
        &mut self,
        dest: &GraphEdge,
    ) -> Result<BTreeMap<String, SmtTerm>, EncoderError> {
        let reachable = self.instrument_reachability(dest)?;
        let graph = self.encoder.graph();
        let mut loads = BTreeMap::new();
        for router in reachable.keys() {
            let name = self.name("load", router);
            let var = self.encoder.context_mut().declare_int(name)?;
            loads.insert(router.clone(), var);
        }
        for (router, load) in &loads {
            let mut terms = vec![SmtTerm::ite(
                reachable[router].clone(),
                SmtTerm::int(1),
                SmtTerm::int(0),
            )];
            for (upstream, upstream_load) in &loads {
                for edge in graph.edges(upstream) {
                    if edge.peer.as_ref() != Some(router) {
                        continue;
                    }
                    let fwd = self.encoder.symbolic_decisions().data_forwarding(upstream, edge);
                    terms.push(SmtTerm::ite(
                        SmtTerm::and(vec![fwd, reachable[upstream].clone()]),
                        upstream_load.clone(),
                        SmtTerm::int(0),
                    ));
                }
            }
            self.encoder.add(load.clone().eq(SmtTerm::sum(terms)));
        }
        Ok(loads)
    }

    /// `has-loop_r` holds iff traffic forwarded by `router` comes back to it.
    pub fn instrument_loop(&mut self, router: &str) -> Result<SmtTerm, EncoderError> {
        let graph = self.encoder.graph();
        let routers: Vec<&String> = graph.configurations().keys().collect();

        let mut visited: BTreeMap<String, SmtTerm> = routers
            .iter()
            .map(|q| {
                let hops = graph
                    .edges(router)
                    .iter()
                    .filter(|e| e.peer.as_ref() == Some(*q))
                    .map(|e| self.encoder.symbolic_decisions().data_forwarding(router, e))
                    .collect();
                ((*q).clone(), SmtTerm::or(hops))
            })
            .collect();

        for i in 2..=routers.len() {
            let mut next = BTreeMap::new();
            for q in &routers {
                let mut options = vec![visited[*q].clone()];
                for p in &routers {
                    for edge in graph.edges(p) {
                        if edge.peer.as_ref() != Some(*q) {
                            continue;
                        }
                        let fwd = self.encoder.symbolic_decisions().data_forwarding(p, edge);
                        options.push(SmtTerm::and(vec![visited[*p].clone(), fwd]));
                    }
                }
                let kind = format!("visited-{}-{i}", escape_component(router));
                let name = self.name(&kind, q);
                let var = self.declare_bool_equal(name, SmtTerm::or(options))?;
                next.insert((*q).clone(), var);
            }
            visited = next;
        }

        let back = visited
            .get(router)
            .cloned()
            .unwrap_or_else(|| SmtTerm::bool(false));
        let name = self.name("has-loop", router);
        self.declare_bool_equal(name, back)
    }
}

/// All terms are pairwise equal; trivially true for fewer than two.
pub fn all_equal(terms: &[SmtTerm]) -> SmtTerm {
    match terms.split_first() {
        Some((first, rest)) => SmtTerm::and(
            rest.iter()
                .map(|t| first.clone().eq(t.clone()))
                .collect(),
        ),
        None => SmtTerm::bool(true),
    }
}
