use std::collections::BTreeMap;
use std::fmt;

use netverify_smt::solver::Model;
use netverify_smt::terms::SmtTerm;
use serde::Serialize;

use crate::encoder::PacketSummary;

/// Outcome of one solver call. `verified` means the negated property was
/// unsatisfiable; otherwise `model` holds the counterexample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub verified: bool,
    /// Every declared variable rendered as text.
    pub model: BTreeMap<String, String>,
    pub packet: Option<PacketSummary>,
}

impl VerificationResult {
    pub fn verified() -> Self {
        Self {
            verified: true,
            model: BTreeMap::new(),
            packet: None,
        }
    }

    pub fn counterexample(model: &Model, packet: Option<PacketSummary>) -> Self {
        Self {
            verified: false,
            model: model.to_strings(),
            packet,
        }
    }

    pub fn bool_value(&self, var: &str) -> Option<bool> {
        self.model.get(var)?.parse().ok()
    }

    pub fn int_value(&self, var: &str) -> Option<i64> {
        self.model.get(var)?.parse().ok()
    }

    /// Whether the variable behind `term` is true in the model. Literals
    /// evaluate to themselves.
    pub fn is_true(&self, term: &SmtTerm) -> bool {
        match term {
            SmtTerm::BoolLit(b) => *b,
            SmtTerm::Var(name) => self.bool_value(name).unwrap_or(false),
            _ => false,
        }
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.verified {
            return write!(f, "verified");
        }
        write!(f, "counterexample")?;
        if let Some(packet) = &self.packet {
            write!(
                f,
                " (dst {} src {} proto {} ports {}->{})",
                packet.dst_ip, packet.src_ip, packet.ip_protocol, packet.src_port, packet.dst_port
            )?;
        }
        Ok(())
    }
}
