use std::fmt::Write as _;

use crate::context::SmtContext;
use crate::terms::{SmtSort, SmtTerm};

/// Print an SmtTerm as SMT-LIB2 format.
pub fn to_smtlib(term: &SmtTerm) -> String {
    match term {
        SmtTerm::Var(name) => symbol(name),
        SmtTerm::IntLit(n) => {
            if *n < 0 {
                format!("(- {})", n.unsigned_abs())
            } else {
                n.to_string()
            }
        }
        SmtTerm::BoolLit(b) => {
            if *b {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        SmtTerm::Add(terms) => nary("+", "0", terms),
        SmtTerm::Sub(lhs, rhs) => format!("(- {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Eq(lhs, rhs) => format!("(= {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Lt(lhs, rhs) => format!("(< {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Le(lhs, rhs) => format!("(<= {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Gt(lhs, rhs) => format!("(> {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Ge(lhs, rhs) => format!("(>= {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::And(terms) => nary("and", "true", terms),
        SmtTerm::Or(terms) => nary("or", "false", terms),
        SmtTerm::Not(inner) => format!("(not {})", to_smtlib(inner)),
        SmtTerm::Implies(lhs, rhs) => {
            format!("(=> {} {})", to_smtlib(lhs), to_smtlib(rhs))
        }
        SmtTerm::Ite(cond, then, els) => {
            format!(
                "(ite {} {} {})",
                to_smtlib(cond),
                to_smtlib(then),
                to_smtlib(els)
            )
        }
    }
}

fn nary(op: &str, unit: &str, terms: &[SmtTerm]) -> String {
    match terms {
        [] => unit.to_string(),
        [single] => to_smtlib(single),
        _ => {
            let inner: Vec<String> = terms.iter().map(to_smtlib).collect();
            format!("({op} {})", inner.join(" "))
        }
    }
}

/// Variable names start with the encoder index, which a simple symbol may
/// not, so every name is written quoted.
fn symbol(name: &str) -> String {
    format!("|{name}|")
}

/// Print a sort as SMT-LIB2 format.
pub fn sort_to_smtlib(sort: &SmtSort) -> &'static str {
    match sort {
        SmtSort::Bool => "Bool",
        SmtSort::Int => "Int",
    }
}

/// Render a whole context as a standalone SMT-LIB2 script.
pub fn context_to_script(ctx: &SmtContext) -> String {
    let mut out = String::from("(set-logic QF_LIA)\n");
    for (name, sort) in ctx.declarations() {
        let _ = writeln!(
            out,
            "(declare-const {} {})",
            symbol(name),
            sort_to_smtlib(sort)
        );
    }
    for assertion in ctx.assertions() {
        let _ = writeln!(out, "(assert {})", to_smtlib(assertion));
    }
    out.push_str("(check-sat)\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_simple_term() {
        let term = SmtTerm::var("len").add(SmtTerm::int(1)).ge(SmtTerm::int(0));
        assert_eq!(to_smtlib(&term), "(>= (+ |len| 1) 0)");
    }

    #[test]
    fn print_negative_literal() {
        assert_eq!(to_smtlib(&SmtTerm::int(-3)), "(- 3)");
    }

    #[test]
    fn print_script_declares_before_asserting() {
        let mut ctx = SmtContext::new();
        let permitted = ctx.declare_bool("0_permitted").expect("declare");
        let metric = ctx.declare_int("0_metric").expect("declare");
        ctx.assert_term(permitted.implies(metric.ge(SmtTerm::int(0))));
        let script = context_to_script(&ctx);
        assert_eq!(
            script,
            "(set-logic QF_LIA)\n\
             (declare-const |0_permitted| Bool)\n\
             (declare-const |0_metric| Int)\n\
             (assert (=> |0_permitted| (>= |0_metric| 0)))\n\
             (check-sat)\n"
        );
    }
}
