//! Accumulated declarations and assertions for one verification query.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::time::Instant;

use thiserror::Error;
use tracing::debug;

use crate::solver::{Model, SatResult, SmtSolver};
use crate::terms::{SmtSort, SmtTerm};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("variable {name} is already declared as {declared}, not {requested}")]
    SortMismatch {
        name: String,
        declared: SmtSort,
        requested: SmtSort,
    },
}

/// Variables and assertions of an encoding, independent of any solver.
///
/// A context is owned by exactly one query. Encoders append to it while
/// building the model; property code appends the negated property; finally
/// [`SmtContext::solve`] replays everything into a fresh solver.
#[derive(Debug, Default)]
pub struct SmtContext {
    /// Variable declarations: (name, sort).
    declarations: Vec<(String, SmtSort)>,
    declared_sorts: HashMap<String, SmtSort>,
    /// Assertions (constraints).
    assertions: Vec<SmtTerm>,
    assertion_keys: HashSet<String>,
    assertion_candidates: usize,
    assertion_dedup_hits: usize,
    encoders: usize,
}

impl SmtContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next encoder slot; the returned index namespaces that
    /// encoder's variables.
    pub fn register_encoder(&mut self) -> usize {
        let id = self.encoders;
        self.encoders += 1;
        id
    }

    /// Declare a variable and return a term referring to it. Declaring the
    /// same name twice with the same sort is a no-op; with another sort it
    /// is an error.
    pub fn declare(
        &mut self,
        name: impl Into<String>,
        sort: SmtSort,
    ) -> Result<SmtTerm, ContextError> {
        let name = sanitize(&name.into());
        match self.declared_sorts.get(&name) {
            Some(&declared) if declared != sort => {
                return Err(ContextError::SortMismatch {
                    name,
                    declared,
                    requested: sort,
                });
            }
            Some(_) => {}
            None => {
                self.declared_sorts.insert(name.clone(), sort);
                self.declarations.push((name.clone(), sort));
            }
        }
        Ok(SmtTerm::Var(name))
    }

    pub fn declare_bool(&mut self, name: impl Into<String>) -> Result<SmtTerm, ContextError> {
        self.declare(name, SmtSort::Bool)
    }

    pub fn declare_int(&mut self, name: impl Into<String>) -> Result<SmtTerm, ContextError> {
        self.declare(name, SmtSort::Int)
    }

    pub fn assert_term(&mut self, term: SmtTerm) {
        if term == SmtTerm::BoolLit(true) {
            return;
        }
        self.assertion_candidates = self.assertion_candidates.saturating_add(1);
        let key = canonical_term_key(&term);
        if self.assertion_keys.insert(key) {
            self.assertions.push(term);
        } else {
            self.assertion_dedup_hits = self.assertion_dedup_hits.saturating_add(1);
        }
    }

    pub fn declarations(&self) -> &[(String, SmtSort)] {
        &self.declarations
    }

    pub fn assertions(&self) -> &[SmtTerm] {
        &self.assertions
    }

    pub fn assertion_candidates(&self) -> usize {
        self.assertion_candidates
    }

    pub fn assertion_dedup_hits(&self) -> usize {
        self.assertion_dedup_hits
    }

    /// Load every declaration and assertion into `solver`, check
    /// satisfiability and extract a model over all declared variables.
    pub fn solve<S: SmtSolver>(
        &self,
        solver: &mut S,
    ) -> Result<(SatResult, Option<Model>), S::Error> {
        solver.reset()?;
        for (name, sort) in &self.declarations {
            solver.declare_var(name, sort)?;
        }
        for assertion in &self.assertions {
            solver.assert(assertion)?;
        }

        let var_refs: Vec<(&str, &SmtSort)> = self
            .declarations
            .iter()
            .map(|(n, s)| (n.as_str(), s))
            .collect();

        let started = Instant::now();
        let out = solver.check_sat_with_model(&var_refs);
        debug!(
            declarations = self.declarations.len(),
            assertions = self.assertions.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "SMT: check-sat finished"
        );
        out
    }
}

/// Escape one component of a structured variable name such as a router or
/// interface name. The result has no `_` or `-`, so components joined with
/// either separator stay distinct, and [`SmtContext::declare`] keeps it as is.
pub fn escape_component(part: &str) -> String {
    escape_with(part, '.', |c| c.is_ascii_alphanumeric() || c == '/')
}

/// Solver symbols may not contain whitespace, quotes or parentheses. Other
/// characters become `@XX` per UTF-8 byte, so distinct names stay distinct.
fn sanitize(name: &str) -> String {
    escape_with(name, '@', |c| {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/')
    })
}

fn escape_with(name: &str, marker: char, keep: impl Fn(char) -> bool) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if keep(c) {
            out.push(c);
            continue;
        }
        let mut buf = [0u8; 4];
        for byte in c.encode_utf8(&mut buf).bytes() {
            let _ = write!(out, "{marker}{byte:02X}");
        }
    }
    out
}

fn canonical_binary_commutative(tag: &str, lhs: &SmtTerm, rhs: &SmtTerm) -> String {
    let left = canonical_term_key(lhs);
    let right = canonical_term_key(rhs);
    if left <= right {
        format!("({tag} {left} {right})")
    } else {
        format!("({tag} {right} {left})")
    }
}

fn canonical_nary(tag: &str, terms: &[SmtTerm]) -> String {
    let mut items = terms.iter().map(canonical_term_key).collect::<Vec<_>>();
    items.sort();
    format!("({tag} {})", items.join(" "))
}

pub(crate) fn canonical_term_key(term: &SmtTerm) -> String {
    match term {
        SmtTerm::Var(name) => format!("(var {name})"),
        SmtTerm::IntLit(v) => format!("(int {v})"),
        SmtTerm::BoolLit(v) => format!("(bool {v})"),
        SmtTerm::Add(terms) => canonical_nary("+", terms),
        SmtTerm::Sub(lhs, rhs) => format!(
            "(- {} {})",
            canonical_term_key(lhs),
            canonical_term_key(rhs)
        ),
        SmtTerm::Eq(lhs, rhs) => canonical_binary_commutative("=", lhs, rhs),
        SmtTerm::Lt(lhs, rhs) => format!(
            "(< {} {})",
            canonical_term_key(lhs),
            canonical_term_key(rhs)
        ),
        SmtTerm::Le(lhs, rhs) => format!(
            "(<= {} {})",
            canonical_term_key(lhs),
            canonical_term_key(rhs)
        ),
        SmtTerm::Gt(lhs, rhs) => format!(
            "(> {} {})",
            canonical_term_key(lhs),
            canonical_term_key(rhs)
        ),
        SmtTerm::Ge(lhs, rhs) => format!(
            "(>= {} {})",
            canonical_term_key(lhs),
            canonical_term_key(rhs)
        ),
        SmtTerm::And(terms) => canonical_nary("and", terms),
        SmtTerm::Or(terms) => canonical_nary("or", terms),
        SmtTerm::Not(inner) => format!("(not {})", canonical_term_key(inner)),
        SmtTerm::Implies(lhs, rhs) => format!(
            "(=> {} {})",
            canonical_term_key(lhs),
            canonical_term_key(rhs)
        ),
        SmtTerm::Ite(cond, then_term, else_term) => format!(
            "(ite {} {} {})",
            canonical_term_key(cond),
            canonical_term_key(then_term),
            canonical_term_key(else_term)
        ),
    }
}
