//! Symbolic execution of routing policies and access lists.

use netverify_ir::config::{Configuration, IpAccessList, LineAction};
use netverify_ir::policy::{BooleanExpr, Statement};
use netverify_ir::protocol::RoutingProtocol;
use netverify_smt::terms::SmtTerm;

use super::packet::SymbolicPacket;
use super::EncoderError;

/// Policy calls nested deeper than this are rejected as recursive.
pub const MAX_CALL_DEPTH: usize = 32;

/// Attributes a policy may rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteAttributes {
    pub local_pref: SmtTerm,
    pub metric: SmtTerm,
}

/// Result of running a policy over one route.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyOutcome {
    pub accepted: SmtTerm,
    pub attributes: RouteAttributes,
}

impl PolicyOutcome {
    fn merge(cond: SmtTerm, t: PolicyOutcome, f: PolicyOutcome) -> Self {
        Self {
            accepted: SmtTerm::ite(cond.clone(), t.accepted, f.accepted),
            attributes: RouteAttributes {
                local_pref: SmtTerm::ite(
                    cond.clone(),
                    t.attributes.local_pref,
                    f.attributes.local_pref,
                ),
                metric: SmtTerm::ite(cond, t.attributes.metric, f.attributes.metric),
            },
        }
    }
}

/// Everything a policy can inspect about the route it is applied to.
pub struct PolicyTransfer<'a> {
    pub conf: &'a Configuration,
    pub protocol: RoutingProtocol,
    pub packet: &'a SymbolicPacket,
    pub prefix_length: &'a SmtTerm,
}

impl PolicyTransfer<'_> {
    /// Run the named policy, or accept unchanged when there is none.
    pub fn apply(
        &self,
        policy: Option<&str>,
        attributes: RouteAttributes,
    ) -> Result<PolicyOutcome, EncoderError> {
        let Some(name) = policy else {
            return Ok(PolicyOutcome {
                accepted: SmtTerm::bool(true),
                attributes,
            });
        };
        let statements = self.statements(name)?;
        self.execute(&statements, attributes, 0)
    }

    fn statements(&self, name: &str) -> Result<Vec<&Statement>, EncoderError> {
        let policy = self
            .conf
            .policy(name)
            .ok_or_else(|| EncoderError::UnknownPolicy {
                router: self.conf.hostname.clone(),
                policy: name.to_string(),
            })?;
        Ok(policy.statements.iter().collect())
    }

    /// Execute `statements` in order. An `If` forks: both branches continue
    /// with the remaining statements and the results are merged on the guard.
    fn execute(
        &self,
        statements: &[&Statement],
        mut attributes: RouteAttributes,
        depth: usize,
    ) -> Result<PolicyOutcome, EncoderError> {
        for (i, statement) in statements.iter().enumerate() {
            match statement {
                Statement::SetLocalPreference(v) => {
                    attributes.local_pref = SmtTerm::int(i64::from(*v));
                }
                Statement::SetMetric(v) => {
                    attributes.metric = SmtTerm::int(i64::from(*v));
                }
                Statement::Static(s) => {
                    return Ok(PolicyOutcome {
                        accepted: SmtTerm::bool(s.accepts()),
                        attributes,
                    });
                }
                Statement::If {
                    guard,
                    true_statements,
                    false_statements,
                } => {
                    let cond = self.guard(guard, &attributes, depth)?;
                    let rest = &statements[i + 1..];
                    let then_branch: Vec<&Statement> =
                        true_statements.iter().chain(rest.iter().copied()).collect();
                    let else_branch: Vec<&Statement> =
                        false_statements.iter().chain(rest.iter().copied()).collect();
                    return match cond.as_bool_lit() {
                        Some(true) => self.execute(&then_branch, attributes, depth),
                        Some(false) => self.execute(&else_branch, attributes, depth),
                        None => {
                            let t = self.execute(&then_branch, attributes.clone(), depth)?;
                            let f = self.execute(&else_branch, attributes, depth)?;
                            Ok(PolicyOutcome::merge(cond, t, f))
                        }
                    };
                }
            }
        }
        Ok(PolicyOutcome {
            accepted: SmtTerm::bool(false),
            attributes,
        })
    }

    fn guard(
        &self,
        expr: &BooleanExpr,
        attributes: &RouteAttributes,
        depth: usize,
    ) -> Result<SmtTerm, EncoderError> {
        Ok(match expr {
            BooleanExpr::True => SmtTerm::bool(true),
            BooleanExpr::False => SmtTerm::bool(false),
            BooleanExpr::Not(inner) => self.guard(inner, attributes, depth)?.not(),
            BooleanExpr::Conjunction(items) => SmtTerm::and(
                items
                    .iter()
                    .map(|e| self.guard(e, attributes, depth))
                    .collect::<Result<_, _>>()?,
            ),
            BooleanExpr::Disjunction(items) => SmtTerm::or(
                items
                    .iter()
                    .map(|e| self.guard(e, attributes, depth))
                    .collect::<Result<_, _>>()?,
            ),
            BooleanExpr::Call(name) => {
                if depth >= MAX_CALL_DEPTH {
                    return Err(EncoderError::PolicyRecursion {
                        router: self.conf.hostname.clone(),
                        policy: name.clone(),
                    });
                }
                let statements = self.statements(name)?;
                self.execute(&statements, attributes.clone(), depth + 1)?
                    .accepted
            }
            BooleanExpr::MatchPrefixSet(ranges) => SmtTerm::or(
                ranges
                    .iter()
                    .map(|range| {
                        let lo = range.min_length.max(range.prefix.length());
                        SmtTerm::and(vec![
                            self.packet.dst_in(&range.prefix),
                            self.prefix_length
                                .clone()
                                .within(i64::from(lo), i64::from(range.max_length)),
                        ])
                    })
                    .collect(),
            ),
            BooleanExpr::MatchProtocol(p) => SmtTerm::bool(*p == self.protocol),
        })
    }
}

/// First matching line decides; no match denies.
pub fn acl_permits(acl: &IpAccessList, packet: &SymbolicPacket) -> SmtTerm {
    acl.lines.iter().rev().fold(SmtTerm::bool(false), |rest, line| {
        let dst = if line.dst_prefixes.is_empty() {
            SmtTerm::bool(true)
        } else {
            SmtTerm::or(line.dst_prefixes.iter().map(|p| packet.dst_in(p)).collect())
        };
        let src = if line.src_prefixes.is_empty() {
            SmtTerm::bool(true)
        } else {
            SmtTerm::or(line.src_prefixes.iter().map(|p| packet.src_in(p)).collect())
        };
        let action = SmtTerm::bool(matches!(line.action, LineAction::Accept));
        SmtTerm::ite(SmtTerm::and(vec![dst, src]), action, rest)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use netverify_ir::config::AclLine;
    use netverify_ir::policy::{PrefixRange, RoutingPolicy, BGP_COMMON_FILTER_LIST_NAME};
    use netverify_smt::context::SmtContext;

    fn attrs() -> RouteAttributes {
        RouteAttributes {
            local_pref: SmtTerm::int(100),
            metric: SmtTerm::var("m"),
        }
    }

    fn run(conf: &Configuration, policy: &str) -> Result<PolicyOutcome, EncoderError> {
        let mut ctx = SmtContext::new();
        let packet = SymbolicPacket::declare(&mut ctx, 0).expect("declare");
        let len = SmtTerm::var("len");
        let transfer = PolicyTransfer {
            conf,
            protocol: RoutingProtocol::Bgp,
            packet: &packet,
            prefix_length: &len,
        };
        transfer.apply(Some(policy), attrs())
    }

    #[test]
    fn missing_policy_accepts_unchanged() {
        let conf = Configuration::new("r");
        let mut ctx = SmtContext::new();
        let packet = SymbolicPacket::declare(&mut ctx, 0).expect("declare");
        let len = SmtTerm::var("len");
        let transfer = PolicyTransfer {
            conf: &conf,
            protocol: RoutingProtocol::Ospf,
            packet: &packet,
            prefix_length: &len,
        };
        let out = transfer.apply(None, attrs()).expect("no policy");
        assert_eq!(out.accepted, SmtTerm::bool(true));
        assert_eq!(out.attributes, attrs());
    }

    #[test]
    fn falling_off_the_end_rejects() {
        let mut conf = Configuration::new("r");
        conf.add_policy(RoutingPolicy::new("P", vec![Statement::SetMetric(7)]));
        let out = run(&conf, "P").expect("policy");
        assert_eq!(out.accepted, SmtTerm::bool(false));
        assert_eq!(out.attributes.metric, SmtTerm::int(7));
    }

    #[test]
    fn static_guards_select_a_branch_without_ite() {
        let mut conf = Configuration::new("r");
        conf.add_policy(RoutingPolicy::new(
            "P",
            vec![Statement::if_then_else(
                BooleanExpr::MatchProtocol(RoutingProtocol::Bgp),
                vec![Statement::SetLocalPreference(300)],
                vec![Statement::reject()],
            ),
            Statement::accept()],
        ));
        let out = run(&conf, "P").expect("policy");
        assert_eq!(out.accepted, SmtTerm::bool(true));
        assert_eq!(out.attributes.local_pref, SmtTerm::int(300));
    }

    #[test]
    fn call_yields_acceptance_of_the_called_policy() {
        let mut conf = Configuration::new("r");
        conf.add_policy(RoutingPolicy::new(
            BGP_COMMON_FILTER_LIST_NAME,
            vec![Statement::if_then_else(
                BooleanExpr::MatchPrefixSet(vec![PrefixRange::orlonger(
                    "10.0.0.0/8".parse().expect("prefix"),
                )]),
                vec![Statement::SetMetric(1), Statement::accept()],
                vec![Statement::reject()],
            )],
        ));
        conf.add_policy(RoutingPolicy::new(
            "EXPORT",
            vec![Statement::if_then_else(
                BooleanExpr::Call(BGP_COMMON_FILTER_LIST_NAME.to_string()),
                vec![Statement::accept()],
                vec![Statement::reject()],
            )],
        ));
        let out = run(&conf, "EXPORT").expect("policy");
        // The called policy's metric assignment does not leak out.
        assert_eq!(out.attributes.metric, SmtTerm::var("m"));
        assert!(out.accepted.as_bool_lit().is_none());
    }

    #[test]
    fn unknown_and_recursive_policies_are_errors() {
        let mut conf = Configuration::new("r");
        conf.add_policy(RoutingPolicy::new(
            "LOOP",
            vec![Statement::if_then_else(
                BooleanExpr::Call("LOOP".to_string()),
                vec![Statement::accept()],
                vec![Statement::reject()],
            )],
        ));
        assert!(matches!(
            run(&conf, "NOPE"),
            Err(EncoderError::UnknownPolicy { .. })
        ));
        assert!(matches!(
            run(&conf, "LOOP"),
            Err(EncoderError::PolicyRecursion { .. })
        ));
    }

    #[test]
    fn acl_is_first_match_with_implicit_deny() {
        let mut ctx = SmtContext::new();
        let packet = SymbolicPacket::declare(&mut ctx, 0).expect("declare");
        assert_eq!(
            acl_permits(&IpAccessList::new("EMPTY", vec![]), &packet),
            SmtTerm::bool(false)
        );
        let permit_all = IpAccessList::new(
            "ALL",
            vec![AclLine {
                action: LineAction::Accept,
                dst_prefixes: vec![],
                src_prefixes: vec![],
            }],
        );
        assert_eq!(acl_permits(&permit_all, &packet), SmtTerm::bool(true));

        let net: netverify_ir::prefix::Prefix = "10.0.0.0/8".parse().expect("prefix");
        let deny_net = IpAccessList::new(
            "DENY10",
            vec![
                AclLine {
                    action: LineAction::Reject,
                    dst_prefixes: vec![net],
                    src_prefixes: vec![],
                },
                AclLine {
                    action: LineAction::Accept,
                    dst_prefixes: vec![],
                    src_prefixes: vec![],
                },
            ],
        );
        assert_eq!(
            acl_permits(&deny_net, &packet),
            SmtTerm::ite(packet.dst_in(&net), SmtTerm::bool(false), SmtTerm::bool(true))
        );
    }
}
