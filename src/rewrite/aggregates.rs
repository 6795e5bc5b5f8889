/*!
Aggregate-directed rewriting.

Two concerns live here:
- *Shifting*: a head aggregate with a single element and no guards
  constrains nothing; the element's atom becomes the head and the
  element's condition joins the body, saving the whole aggregate
  machinery for it.
- *Tuple hygiene*: an aggregate element whose tuple mentions a
  rule-level variable that its own condition never binds counts one
  tuple per outer binding; almost always a mistake, reported as
  [GlobalVariableInTuple](crate::reports::DiagnosticKind).
*/

use crate::{
    reports::{DiagnosticKind, Reporter},
    structures::{
        literal::BodyLiteral,
        rule::{Head, Rule},
        symbol::SymbolStore,
        term::{Term, TermKind, VarTerm},
    },
};

/// Shift a guard-free singleton head aggregate into a plain head.
pub fn shift_head_aggregate(rule: &mut Rule) {
    let aggregate = match &mut rule.head {
        Head::Aggregate(aggregate) => aggregate,
        _ => return,
    };
    if aggregate.left.is_some() || aggregate.right.is_some() || aggregate.elements.len() != 1 {
        return;
    }
    let element = aggregate.elements.pop().expect("one element");
    let mut condition = element.condition;
    for literal in &mut condition {
        relevel_literal(literal, 0);
    }
    let mut atom = element.atom;
    relevel_term(&mut atom, 0);
    rule.body.extend(condition);
    rule.head = Head::Atom(atom);
}

fn relevel_term(term: &mut Term, level: u32) {
    match &mut term.kind {
        TermKind::Var(v) => v.level = level,
        TermKind::Linear { var, .. } => var.level = level,
        TermKind::Value(_) => {}
        TermKind::Unary(_, a) => relevel_term(a, level),
        TermKind::Binary(_, a, b) | TermKind::Range(a, b) => {
            relevel_term(a, level);
            relevel_term(b, level);
        }
        TermKind::Fun { args, .. } | TermKind::Script { args, .. } => {
            for arg in args {
                relevel_term(arg, level);
            }
        }
        TermKind::Pool(alts) => {
            for alt in alts {
                relevel_term(alt, level);
            }
        }
    }
}

fn relevel_literal(literal: &mut BodyLiteral, level: u32) {
    match literal {
        BodyLiteral::Pred { atom, .. } => relevel_term(atom, level),
        BodyLiteral::Comparison { left, rights, .. } => {
            relevel_term(left, level);
            for (_, right) in rights {
                relevel_term(right, level);
            }
        }
        BodyLiteral::Range { var, lo, hi } => {
            var.level = level;
            relevel_term(lo, level);
            relevel_term(hi, level);
        }
        BodyLiteral::Script { var, args, .. } => {
            var.level = level;
            for arg in args {
                relevel_term(arg, level);
            }
        }
        // Nested scopes keep their own levels.
        BodyLiteral::Aggregate { .. }
        | BodyLiteral::Conditional(_)
        | BodyLiteral::Theory { .. } => {}
    }
}

/// Warn about rule-level variables in element tuples the element's
/// condition does not bind.
pub fn check_tuples(body: &[BodyLiteral], store: &SymbolStore, reporter: &mut Reporter) {
    for literal in body {
        let aggregate = match literal {
            BodyLiteral::Aggregate { aggregate, .. } => aggregate,
            _ => continue,
        };
        for element in &aggregate.elements {
            let mut condition_vars: Vec<(VarTerm, bool)> = Vec::new();
            for condition in &element.condition {
                condition.collect_vars(&mut condition_vars);
            }
            for term in &element.tuple {
                let mut tuple_vars: Vec<(VarTerm, bool)> = Vec::new();
                term.collect_vars(false, &mut tuple_vars);
                for (var, _) in tuple_vars {
                    let local = condition_vars.iter().any(|(c, _)| c.cell == var.cell);
                    if var.level == 0 && !local {
                        reporter.warn(
                            DiagnosticKind::GlobalVariableInTuple,
                            term.loc,
                            format!(
                                "global variable {} in aggregate element tuple",
                                store.resolve(var.name)
                            ),
                        );
                    }
                }
            }
        }
    }
}
