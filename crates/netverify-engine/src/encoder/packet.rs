use std::net::Ipv4Addr;

use netverify_ir::prefix::Prefix;
use netverify_smt::context::{ContextError, SmtContext};
use netverify_smt::solver::Model;
use netverify_smt::terms::SmtTerm;
use serde::Serialize;

const MAX_IP: i64 = u32::MAX as i64;

/// Header fields of the packet being forwarded, as bounded integers.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolicPacket {
    pub dst_ip: SmtTerm,
    pub src_ip: SmtTerm,
    pub dst_port: SmtTerm,
    pub src_port: SmtTerm,
    pub ip_protocol: SmtTerm,
}

impl SymbolicPacket {
    pub(crate) fn declare(ctx: &mut SmtContext, encoder_id: usize) -> Result<Self, ContextError> {
        let mut field = |name: &str, hi: i64| -> Result<SmtTerm, ContextError> {
            let var = ctx.declare_int(format!("{encoder_id}_{name}"))?;
            ctx.assert_term(var.clone().within(0, hi));
            Ok(var)
        };
        Ok(Self {
            dst_ip: field("dst-ip", MAX_IP)?,
            src_ip: field("src-ip", MAX_IP)?,
            dst_port: field("dst-port", 65_535)?,
            src_port: field("src-port", 65_535)?,
            ip_protocol: field("ip-protocol", 255)?,
        })
    }

    fn fields(&self) -> [&SmtTerm; 5] {
        [
            &self.dst_ip,
            &self.src_ip,
            &self.dst_port,
            &self.src_port,
            &self.ip_protocol,
        ]
    }

    /// The destination address lies inside `prefix`.
    pub fn dst_in(&self, prefix: &Prefix) -> SmtTerm {
        in_range(&self.dst_ip, prefix)
    }

    pub fn src_in(&self, prefix: &Prefix) -> SmtTerm {
        in_range(&self.src_ip, prefix)
    }

    /// All header fields of the two packets agree.
    pub fn mk_equal(&self, other: &SymbolicPacket) -> SmtTerm {
        SmtTerm::and(
            self.fields()
                .into_iter()
                .zip(other.fields())
                .map(|(a, b)| a.clone().eq(b.clone()))
                .collect(),
        )
    }

    /// Concrete header values chosen by `model`, if it assigns them.
    pub fn summarize(&self, model: &Model) -> Option<PacketSummary> {
        let value = |term: &SmtTerm| match term {
            SmtTerm::Var(name) => model.get_int(name),
            SmtTerm::IntLit(n) => Some(*n),
            _ => None,
        };
        let ip = |term: &SmtTerm| {
            value(term)
                .and_then(|n| u32::try_from(n).ok())
                .map(|n| Ipv4Addr::from(n).to_string())
        };
        Some(PacketSummary {
            dst_ip: ip(&self.dst_ip)?,
            src_ip: ip(&self.src_ip)?,
            dst_port: value(&self.dst_port)?,
            src_port: value(&self.src_port)?,
            ip_protocol: value(&self.ip_protocol)?,
        })
    }
}

fn in_range(field: &SmtTerm, prefix: &Prefix) -> SmtTerm {
    if prefix.length() == 0 {
        return SmtTerm::bool(true);
    }
    field.clone().within(prefix.first_ip(), prefix.last_ip())
}

/// A counterexample packet in readable form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PacketSummary {
    pub dst_ip: String,
    pub src_ip: String,
    pub dst_port: i64,
    pub src_port: i64,
    pub ip_protocol: i64,
}
