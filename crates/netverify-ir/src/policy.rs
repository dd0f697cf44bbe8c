//! Routing policy AST and a visitor over it.
//!
//! Policies are lists of statements evaluated in order. A route is accepted
//! or rejected by the first terminal statement reached; falling off the end
//! of a policy rejects.

use serde::{Deserialize, Serialize};

use crate::prefix::Prefix;
use crate::protocol::RoutingProtocol;

/// Name fragment shared by the network-wide BGP export filter that neighbor
/// export policies delegate to.
pub const BGP_COMMON_FILTER_LIST_NAME: &str = "BGP_COMMON_EXPORT_POLICY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingPolicy {
    pub name: String,
    pub statements: Vec<Statement>,
}

impl RoutingPolicy {
    pub fn new(name: impl Into<String>, statements: Vec<Statement>) -> Self {
        Self {
            name: name.into(),
            statements,
        }
    }
}

/// Terminal actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StaticStatement {
    ExitAccept,
    ExitReject,
    ReturnTrue,
    ReturnFalse,
}

impl StaticStatement {
    pub fn accepts(self) -> bool {
        match self {
            StaticStatement::ExitAccept | StaticStatement::ReturnTrue => true,
            StaticStatement::ExitReject | StaticStatement::ReturnFalse => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statement {
    If {
        guard: BooleanExpr,
        true_statements: Vec<Statement>,
        false_statements: Vec<Statement>,
    },
    SetLocalPreference(u32),
    SetMetric(u32),
    Static(StaticStatement),
}

impl Statement {
    pub fn accept() -> Self {
        Statement::Static(StaticStatement::ExitAccept)
    }

    pub fn reject() -> Self {
        Statement::Static(StaticStatement::ExitReject)
    }

    pub fn if_then_else(
        guard: BooleanExpr,
        true_statements: Vec<Statement>,
        false_statements: Vec<Statement>,
    ) -> Self {
        Statement::If {
            guard,
            true_statements,
            false_statements,
        }
    }
}

/// A prefix with an allowed range of route lengths, e.g. `10.0.0.0/8 ge 16 le 24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixRange {
    pub prefix: Prefix,
    pub min_length: u8,
    pub max_length: u8,
}

impl PrefixRange {
    /// Exactly `prefix`, no longer or shorter routes.
    pub fn exact(prefix: Prefix) -> Self {
        Self {
            prefix,
            min_length: prefix.length(),
            max_length: prefix.length(),
        }
    }

    /// `prefix` and everything more specific.
    pub fn orlonger(prefix: Prefix) -> Self {
        Self {
            prefix,
            min_length: prefix.length(),
            max_length: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BooleanExpr {
    True,
    False,
    Not(Box<BooleanExpr>),
    Conjunction(Vec<BooleanExpr>),
    Disjunction(Vec<BooleanExpr>),
    /// Evaluate another policy of the same configuration as a predicate.
    Call(String),
    MatchPrefixSet(Vec<PrefixRange>),
    MatchProtocol(RoutingProtocol),
}

/// Callbacks for each statement and expression kind; all default to no-ops.
pub trait PolicyVisitor {
    fn visit_if(&mut self, _guard: &BooleanExpr) {}
    fn visit_set_local_preference(&mut self, _value: u32) {}
    fn visit_set_metric(&mut self, _value: u32) {}
    fn visit_static(&mut self, _statement: StaticStatement) {}
    fn visit_call(&mut self, _policy: &str) {}
    fn visit_match_prefix_set(&mut self, _ranges: &[PrefixRange]) {}
    fn visit_match_protocol(&mut self, _protocol: RoutingProtocol) {}
}

/// Visit every statement and guard expression, depth first, in order.
pub fn walk_statements<V: PolicyVisitor + ?Sized>(statements: &[Statement], visitor: &mut V) {
    for statement in statements {
        match statement {
            Statement::If {
                guard,
                true_statements,
                false_statements,
            } => {
                visitor.visit_if(guard);
                walk_expr(guard, visitor);
                walk_statements(true_statements, visitor);
                walk_statements(false_statements, visitor);
            }
            Statement::SetLocalPreference(v) => visitor.visit_set_local_preference(*v),
            Statement::SetMetric(v) => visitor.visit_set_metric(*v),
            Statement::Static(s) => visitor.visit_static(*s),
        }
    }
}

pub fn walk_expr<V: PolicyVisitor + ?Sized>(expr: &BooleanExpr, visitor: &mut V) {
    match expr {
        BooleanExpr::True | BooleanExpr::False => {}
        BooleanExpr::Not(inner) => walk_expr(inner, visitor),
        BooleanExpr::Conjunction(items) | BooleanExpr::Disjunction(items) => {
            for item in items {
                walk_expr(item, visitor);
            }
        }
        BooleanExpr::Call(name) => visitor.visit_call(name),
        BooleanExpr::MatchPrefixSet(ranges) => visitor.visit_match_prefix_set(ranges),
        BooleanExpr::MatchProtocol(p) => visitor.visit_match_protocol(*p),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        local_prefs: Vec<u32>,
        metrics: Vec<u32>,
        calls: Vec<String>,
        statics: usize,
    }

    impl PolicyVisitor for Counter {
        fn visit_set_local_preference(&mut self, value: u32) {
            self.local_prefs.push(value);
        }
        fn visit_set_metric(&mut self, value: u32) {
            self.metrics.push(value);
        }
        fn visit_call(&mut self, policy: &str) {
            self.calls.push(policy.to_string());
        }
        fn visit_static(&mut self, _statement: StaticStatement) {
            self.statics += 1;
        }
    }

    #[test]
    fn walk_reaches_both_branches_and_nested_guards() {
        let stmts = vec![Statement::if_then_else(
            BooleanExpr::Conjunction(vec![
                BooleanExpr::Call("A".into()),
                BooleanExpr::Not(Box::new(BooleanExpr::Call("B".into()))),
            ]),
            vec![Statement::SetLocalPreference(200), Statement::accept()],
            vec![Statement::if_then_else(
                BooleanExpr::True,
                vec![Statement::SetMetric(5)],
                vec![Statement::reject()],
            )],
        )];

        let mut counter = Counter::default();
        walk_statements(&stmts, &mut counter);
        assert_eq!(counter.local_prefs, vec![200]);
        assert_eq!(counter.metrics, vec![5]);
        assert_eq!(counter.calls, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(counter.statics, 2);
    }

    #[test]
    fn accepting_statics() {
        assert!(StaticStatement::ExitAccept.accepts());
        assert!(StaticStatement::ReturnTrue.accepts());
        assert!(!StaticStatement::ExitReject.accepts());
        assert!(!StaticStatement::ReturnFalse.accepts());
    }

    #[test]
    fn prefix_range_helpers() {
        let p: Prefix = "10.0.0.0/8".parse().expect("prefix");
        assert_eq!(PrefixRange::exact(p).max_length, 8);
        assert_eq!(PrefixRange::orlonger(p).max_length, 32);
    }
}
