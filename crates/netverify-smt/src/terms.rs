use serde::{Deserialize, Serialize};

/// SMT sorts used by the network encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SmtSort {
    Bool,
    Int,
}

impl std::fmt::Display for SmtSort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SmtSort::Bool => write!(f, "Bool"),
            SmtSort::Int => write!(f, "Int"),
        }
    }
}

/// Abstract SMT term representation, solver-agnostic.
#[derive(Debug, Clone, PartialEq)]
pub enum SmtTerm {
    /// Variable reference by name.
    Var(String),
    /// Integer literal.
    IntLit(i64),
    /// Boolean literal.
    BoolLit(bool),

    // Arithmetic
    Add(Vec<SmtTerm>),
    Sub(Box<SmtTerm>, Box<SmtTerm>),

    // Comparison
    Eq(Box<SmtTerm>, Box<SmtTerm>),
    Lt(Box<SmtTerm>, Box<SmtTerm>),
    Le(Box<SmtTerm>, Box<SmtTerm>),
    Gt(Box<SmtTerm>, Box<SmtTerm>),
    Ge(Box<SmtTerm>, Box<SmtTerm>),

    // Boolean logic
    And(Vec<SmtTerm>),
    Or(Vec<SmtTerm>),
    Not(Box<SmtTerm>),
    Implies(Box<SmtTerm>, Box<SmtTerm>),

    // If-then-else
    Ite(Box<SmtTerm>, Box<SmtTerm>, Box<SmtTerm>),
}

/// The Boolean and arithmetic constructors fold literals eagerly. Policy and
/// selection encodings produce many `true`/`false` operands and dropping them
/// here keeps the asserted formulas close to their minimal shape.
#[allow(clippy::should_implement_trait)]
impl SmtTerm {
    pub fn var(name: impl Into<String>) -> Self {
        SmtTerm::Var(name.into())
    }

    pub fn int(n: i64) -> Self {
        SmtTerm::IntLit(n)
    }

    pub fn bool(b: bool) -> Self {
        SmtTerm::BoolLit(b)
    }

    pub fn as_bool_lit(&self) -> Option<bool> {
        match self {
            SmtTerm::BoolLit(b) => Some(*b),
            _ => None,
        }
    }

    pub fn add(self, other: SmtTerm) -> Self {
        SmtTerm::sum(vec![self, other])
    }

    /// N-ary sum; integer literals are folded into a single constant.
    pub fn sum(terms: Vec<SmtTerm>) -> Self {
        let mut constant = 0i64;
        let mut rest = Vec::with_capacity(terms.len());
        for term in terms {
            match term {
                SmtTerm::IntLit(n) => constant = constant.saturating_add(n),
                SmtTerm::Add(inner) => rest.extend(inner),
                other => rest.push(other),
            }
        }
        if constant != 0 || rest.is_empty() {
            rest.push(SmtTerm::IntLit(constant));
        }
        if rest.len() == 1 {
            rest.pop().unwrap_or(SmtTerm::IntLit(0))
        } else {
            SmtTerm::Add(rest)
        }
    }

    pub fn sub(self, other: SmtTerm) -> Self {
        SmtTerm::Sub(Box::new(self), Box::new(other))
    }

    pub fn eq(self, other: SmtTerm) -> Self {
        match (&self, &other) {
            (SmtTerm::IntLit(a), SmtTerm::IntLit(b)) => SmtTerm::BoolLit(a == b),
            (SmtTerm::BoolLit(a), SmtTerm::BoolLit(b)) => SmtTerm::BoolLit(a == b),
            _ if self == other => SmtTerm::BoolLit(true),
            _ => SmtTerm::Eq(Box::new(self), Box::new(other)),
        }
    }

    pub fn lt(self, other: SmtTerm) -> Self {
        SmtTerm::Lt(Box::new(self), Box::new(other))
    }

    pub fn le(self, other: SmtTerm) -> Self {
        SmtTerm::Le(Box::new(self), Box::new(other))
    }

    pub fn gt(self, other: SmtTerm) -> Self {
        SmtTerm::Gt(Box::new(self), Box::new(other))
    }

    pub fn ge(self, other: SmtTerm) -> Self {
        SmtTerm::Ge(Box::new(self), Box::new(other))
    }

    pub fn and(terms: Vec<SmtTerm>) -> Self {
        let mut out = Vec::with_capacity(terms.len());
        for term in terms {
            match term {
                SmtTerm::BoolLit(true) => {}
                SmtTerm::BoolLit(false) => return SmtTerm::BoolLit(false),
                SmtTerm::And(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => SmtTerm::BoolLit(true),
            1 => out.pop().unwrap_or(SmtTerm::BoolLit(true)),
            _ => SmtTerm::And(out),
        }
    }

    pub fn or(terms: Vec<SmtTerm>) -> Self {
        let mut out = Vec::with_capacity(terms.len());
        for term in terms {
            match term {
                SmtTerm::BoolLit(false) => {}
                SmtTerm::BoolLit(true) => return SmtTerm::BoolLit(true),
                SmtTerm::Or(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => SmtTerm::BoolLit(false),
            1 => out.pop().unwrap_or(SmtTerm::BoolLit(false)),
            _ => SmtTerm::Or(out),
        }
    }

    pub fn not(self) -> Self {
        match self {
            SmtTerm::BoolLit(b) => SmtTerm::BoolLit(!b),
            SmtTerm::Not(inner) => *inner,
            other => SmtTerm::Not(Box::new(other)),
        }
    }

    pub fn implies(self, other: SmtTerm) -> Self {
        match (self.as_bool_lit(), other.as_bool_lit()) {
            (Some(false), _) | (_, Some(true)) => SmtTerm::BoolLit(true),
            (Some(true), _) => other,
            (_, Some(false)) => self.not(),
            _ => SmtTerm::Implies(Box::new(self), Box::new(other)),
        }
    }

    pub fn ite(cond: SmtTerm, then: SmtTerm, els: SmtTerm) -> Self {
        match cond.as_bool_lit() {
            Some(true) => then,
            Some(false) => els,
            None if then == els => then,
            None => SmtTerm::Ite(Box::new(cond), Box::new(then), Box::new(els)),
        }
    }

    /// `lo <= self <= hi`.
    pub fn within(self, lo: i64, hi: i64) -> Self {
        SmtTerm::and(vec![
            self.clone().ge(SmtTerm::int(lo)),
            self.le(SmtTerm::int(hi)),
        ])
    }
}
