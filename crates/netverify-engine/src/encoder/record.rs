use netverify_ir::protocol::RoutingProtocol;
use netverify_smt::context::{ContextError, SmtContext};
use netverify_smt::terms::SmtTerm;

/// Local preference of a route that no policy touched.
pub const DEFAULT_LOCAL_PREF: i64 = 100;
pub const DEFAULT_MED: i64 = 0;
pub const DEFAULT_ROUTER_ID: i64 = 0;

/// Which optional attributes a record models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordShape {
    pub admin_dist: bool,
    pub local_pref: bool,
    pub med: bool,
    pub router_id: bool,
}

/// Attributes of one route as it crosses one logical edge. Fields are terms:
/// usually declared variables, but merged records hold the expression they
/// were derived from. Absent optional fields compare as protocol defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolicRecord {
    pub name: String,
    pub permitted: SmtTerm,
    pub prefix_length: SmtTerm,
    pub metric: SmtTerm,
    pub admin_dist: Option<SmtTerm>,
    pub local_pref: Option<SmtTerm>,
    pub med: Option<SmtTerm>,
    pub router_id: Option<SmtTerm>,
}

impl SymbolicRecord {
    /// Declare fresh variables `<name>_<field>` and their range constraints.
    pub fn declare(
        ctx: &mut SmtContext,
        name: impl Into<String>,
        shape: RecordShape,
    ) -> Result<Self, ContextError> {
        let name = name.into();
        let permitted = ctx.declare_bool(format!("{name}_permitted"))?;
        let prefix_length = ctx.declare_int(format!("{name}_prefix-length"))?;
        let metric = ctx.declare_int(format!("{name}_metric"))?;
        ctx.assert_term(prefix_length.clone().within(0, 32));
        ctx.assert_term(metric.clone().ge(SmtTerm::int(0)));

        Ok(Self {
            admin_dist: declare_optional(ctx, &name, shape.admin_dist, "admin-dist")?,
            local_pref: declare_optional(ctx, &name, shape.local_pref, "local-pref")?,
            med: declare_optional(ctx, &name, shape.med, "med")?,
            router_id: declare_optional(ctx, &name, shape.router_id, "router-id")?,
            name,
            permitted,
            prefix_length,
            metric,
        })
    }

    /// A record that never carries a route.
    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            permitted: SmtTerm::bool(false),
            prefix_length: SmtTerm::int(0),
            metric: SmtTerm::int(0),
            admin_dist: None,
            local_pref: None,
            med: None,
            router_id: None,
        }
    }

    pub fn shape(&self) -> RecordShape {
        RecordShape {
            admin_dist: self.admin_dist.is_some(),
            local_pref: self.local_pref.is_some(),
            med: self.med.is_some(),
            router_id: self.router_id.is_some(),
        }
    }

    pub fn admin_dist_or_default(&self, proto: RoutingProtocol) -> SmtTerm {
        self.admin_dist
            .clone()
            .unwrap_or_else(|| SmtTerm::int(proto.default_admin_distance()))
    }

    pub fn local_pref_or_default(&self) -> SmtTerm {
        self.local_pref
            .clone()
            .unwrap_or_else(|| SmtTerm::int(DEFAULT_LOCAL_PREF))
    }

    pub fn med_or_default(&self) -> SmtTerm {
        self.med.clone().unwrap_or_else(|| SmtTerm::int(DEFAULT_MED))
    }

    pub fn router_id_or_default(&self) -> SmtTerm {
        self.router_id
            .clone()
            .unwrap_or_else(|| SmtTerm::int(DEFAULT_ROUTER_ID))
    }

    /// Every field `self` models equals the corresponding field of `other`
    /// (or its default, when `other` leaves it out). `proto` is the protocol
    /// `other` was learned from.
    pub fn copies(&self, other: &SymbolicRecord, proto: RoutingProtocol) -> SmtTerm {
        let mut parts = vec![
            self.permitted.clone().eq(other.permitted.clone()),
            self.prefix_length.clone().eq(other.prefix_length.clone()),
            self.metric.clone().eq(other.metric.clone()),
        ];
        if let Some(ad) = &self.admin_dist {
            parts.push(ad.clone().eq(other.admin_dist_or_default(proto)));
        }
        if let Some(lp) = &self.local_pref {
            parts.push(lp.clone().eq(other.local_pref_or_default()));
        }
        if let Some(med) = &self.med {
            parts.push(med.clone().eq(other.med_or_default()));
        }
        if let Some(rid) = &self.router_id {
            parts.push(rid.clone().eq(other.router_id_or_default()));
        }
        SmtTerm::and(parts)
    }
}

/// One route attribute of two records, with the preferred direction.
struct Criterion {
    a: SmtTerm,
    b: SmtTerm,
    higher_is_better: bool,
}

fn declare_optional(
    ctx: &mut SmtContext,
    name: &str,
    enabled: bool,
    field: &str,
) -> Result<Option<SmtTerm>, ContextError> {
    if !enabled {
        return Ok(None);
    }
    let var = ctx.declare_int(format!("{name}_{field}"))?;
    ctx.assert_term(var.clone().ge(SmtTerm::int(0)));
    Ok(Some(var))
}

fn decision_criteria(
    a: &SymbolicRecord,
    a_proto: RoutingProtocol,
    b: &SymbolicRecord,
    b_proto: RoutingProtocol,
    with_router_id: bool,
) -> Vec<Criterion> {
    let mut criteria = vec![
        Criterion {
            a: a.prefix_length.clone(),
            b: b.prefix_length.clone(),
            higher_is_better: true,
        },
        Criterion {
            a: a.admin_dist_or_default(a_proto),
            b: b.admin_dist_or_default(b_proto),
            higher_is_better: false,
        },
        Criterion {
            a: a.local_pref_or_default(),
            b: b.local_pref_or_default(),
            higher_is_better: true,
        },
        Criterion {
            a: a.metric.clone(),
            b: b.metric.clone(),
            higher_is_better: false,
        },
        Criterion {
            a: a.med_or_default(),
            b: b.med_or_default(),
            higher_is_better: false,
        },
    ];
    if with_router_id {
        criteria.push(Criterion {
            a: a.router_id_or_default(),
            b: b.router_id_or_default(),
            higher_is_better: false,
        });
    }
    criteria
}

fn strictly_better(c: &Criterion) -> SmtTerm {
    match (&c.a, &c.b) {
        (SmtTerm::IntLit(x), SmtTerm::IntLit(y)) => {
            SmtTerm::bool(if c.higher_is_better { x > y } else { x < y })
        }
        _ if c.a == c.b => SmtTerm::bool(false),
        _ if c.higher_is_better => c.a.clone().gt(c.b.clone()),
        _ => c.a.clone().lt(c.b.clone()),
    }
}

/// `a` is strictly preferred over `b` in the decision process: longer
/// prefix, then lower admin distance, higher local preference, lower metric,
/// lower MED and finally (when requested) lower router id.
pub fn better(
    a: &SymbolicRecord,
    a_proto: RoutingProtocol,
    b: &SymbolicRecord,
    b_proto: RoutingProtocol,
    with_router_id: bool,
) -> SmtTerm {
    decision_criteria(a, a_proto, b, b_proto, with_router_id)
        .iter()
        .rev()
        .fold(SmtTerm::bool(false), |acc, c| {
            SmtTerm::or(vec![
                strictly_better(c),
                SmtTerm::and(vec![c.a.clone().eq(c.b.clone()), acc]),
            ])
        })
}

/// Route equality as seen by a neighbor: both permitted or both not, and
/// when permitted every compared attribute matches.
pub fn announcements_equal(
    a: &SymbolicRecord,
    b: &SymbolicRecord,
    proto: RoutingProtocol,
    compare_local_pref: bool,
    compare_router_id: bool,
) -> SmtTerm {
    let mut fields = vec![
        a.prefix_length.clone().eq(b.prefix_length.clone()),
        a.metric.clone().eq(b.metric.clone()),
        a.admin_dist_or_default(proto)
            .eq(b.admin_dist_or_default(proto)),
        a.med_or_default().eq(b.med_or_default()),
    ];
    if compare_local_pref {
        fields.push(a.local_pref_or_default().eq(b.local_pref_or_default()));
    }
    if compare_router_id {
        fields.push(a.router_id_or_default().eq(b.router_id_or_default()));
    }
    SmtTerm::and(vec![
        a.permitted.clone().eq(b.permitted.clone()),
        a.permitted.clone().implies(SmtTerm::and(fields)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concrete(len: i64, metric: i64) -> SymbolicRecord {
        SymbolicRecord {
            prefix_length: SmtTerm::int(len),
            metric: SmtTerm::int(metric),
            permitted: SmtTerm::bool(true),
            ..SymbolicRecord::absent("r")
        }
    }

    #[test]
    fn declare_respects_shape() {
        let mut ctx = SmtContext::new();
        let shape = RecordShape {
            local_pref: true,
            router_id: true,
            ..RecordShape::default()
        };
        let rec = SymbolicRecord::declare(&mut ctx, "0_bgp_r1_eth0_IMPORT", shape).expect("declare");
        assert_eq!(rec.shape(), shape);
        assert_eq!(rec.permitted, SmtTerm::var("0_bgp_r1_eth0_IMPORT_permitted"));
        assert_eq!(ctx.declarations().len(), 5);
    }

    #[test]
    fn longer_prefix_wins_over_everything_else() {
        let long = concrete(24, 50);
        let short = concrete(16, 0);
        assert_eq!(
            better(
                &long,
                RoutingProtocol::Ospf,
                &short,
                RoutingProtocol::Connected,
                true
            ),
            SmtTerm::bool(true)
        );
        assert_eq!(
            better(
                &short,
                RoutingProtocol::Connected,
                &long,
                RoutingProtocol::Ospf,
                true
            ),
            SmtTerm::bool(false)
        );
    }

    #[test]
    fn admin_distance_breaks_prefix_ties() {
        let a = concrete(24, 10);
        let b = concrete(24, 0);
        assert_eq!(
            better(&a, RoutingProtocol::Static, &b, RoutingProtocol::Ospf, false),
            SmtTerm::bool(true)
        );
    }

    #[test]
    fn identical_records_are_not_strictly_better() {
        let a = concrete(24, 3);
        assert_eq!(
            better(&a, RoutingProtocol::Bgp, &a, RoutingProtocol::Bgp, true),
            SmtTerm::bool(false)
        );
    }

    #[test]
    fn copies_only_constrains_modeled_fields() {
        let mut ctx = SmtContext::new();
        let best = SymbolicRecord::declare(&mut ctx, "best", RecordShape::default()).expect("declare");
        let cand = concrete(8, 2);
        let term = best.copies(&cand, RoutingProtocol::Static);
        assert_eq!(
            term,
            SmtTerm::and(vec![
                best.permitted.clone().eq(SmtTerm::bool(true)),
                best.prefix_length.clone().eq(SmtTerm::int(8)),
                best.metric.clone().eq(SmtTerm::int(2)),
            ])
        );
    }
}
