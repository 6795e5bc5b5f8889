/*!
Comparison unchaining.

A chain `a R₁ b R₂ c` abbreviates the conjunction `a R₁ b, b R₂ c` and
is expanded as such.
Under negation De Morgan applies: `not (a R₁ b R₂ c)` is the
disjunction of the negated links, so the enclosing rule splits into
one rule per link.
Inside aggregate elements, disjunctive heads and conditional literals
the split stays local: the *element* duplicates instead of the rule.

After this pass every comparison literal has exactly one link and no
negation flag.
*/

use crate::structures::{
    literal::{AggrElem, BodyAggregate, BodyLiteral, CondLiteral},
    rule::{CondHead, Head, HeadAggrElem, Rule},
};

use super::unpool::cross_product;

/// Split one literal into its alternatives; each alternative is the
/// conjunction of literals that replaces it.
fn unchain_literal(literal: BodyLiteral) -> Vec<Vec<BodyLiteral>> {
    match literal {
        BodyLiteral::Comparison {
            neg: false,
            left,
            rights,
            assign,
        } => {
            let mut links = Vec::with_capacity(rights.len());
            let mut lower = left;
            for (relation, right) in rights {
                links.push(BodyLiteral::Comparison {
                    neg: false,
                    left: lower,
                    rights: vec![(relation, right.clone())],
                    assign,
                });
                lower = right;
            }
            vec![links]
        }

        BodyLiteral::Comparison {
            neg: true,
            left,
            rights,
            ..
        } => {
            // De Morgan: one alternative per negated link.
            let mut alternatives = Vec::with_capacity(rights.len());
            let mut lower = left;
            for (relation, right) in rights {
                alternatives.push(vec![BodyLiteral::Comparison {
                    neg: false,
                    left: lower,
                    rights: vec![(relation.negate(), right.clone())],
                    assign: false,
                }]);
                lower = right;
            }
            alternatives
        }

        BodyLiteral::Aggregate { sign, aggregate } => {
            let elements = unchain_elements(aggregate.elements);
            vec![vec![BodyLiteral::Aggregate {
                sign,
                aggregate: BodyAggregate {
                    fun: aggregate.fun,
                    left: aggregate.left,
                    right: aggregate.right,
                    elements,
                },
            }]]
        }

        BodyLiteral::Conditional(conditional) => {
            // A disjunctive condition duplicates the conditional
            // literal conjunctively.
            let literals = unchain_condition(conditional.condition)
                .into_iter()
                .map(|condition| {
                    BodyLiteral::Conditional(CondLiteral {
                        literal: conditional.literal.clone(),
                        condition,
                    })
                })
                .collect();
            vec![literals]
        }

        other => vec![vec![other]],
    }
}

/// The alternatives of a condition: the product of its literals'
/// alternatives, each flattened to one conjunction.
fn unchain_condition(condition: Vec<BodyLiteral>) -> Vec<Vec<BodyLiteral>> {
    cross_product(condition.into_iter().map(unchain_literal).collect())
        .into_iter()
        .map(|rows| rows.into_iter().flatten().collect())
        .collect()
}

fn unchain_elements(elements: Vec<AggrElem>) -> Vec<AggrElem> {
    elements
        .into_iter()
        .flat_map(|element| {
            unchain_condition(element.condition)
                .into_iter()
                .map(move |condition| AggrElem {
                    tuple: element.tuple.clone(),
                    condition,
                })
        })
        .collect()
}

fn unchain_cond_heads(elements: Vec<CondHead>) -> Vec<CondHead> {
    elements
        .into_iter()
        .flat_map(|element| {
            unchain_condition(element.condition)
                .into_iter()
                .map(move |condition| CondHead {
                    atom: element.atom.clone(),
                    condition,
                })
        })
        .collect()
}

fn unchain_head(head: Head) -> Head {
    match head {
        Head::Disjunction(elements) => Head::Disjunction(unchain_cond_heads(elements)),
        Head::Choice {
            left,
            right,
            elements,
        } => Head::Choice {
            left,
            right,
            elements: unchain_cond_heads(elements),
        },
        Head::Aggregate(aggregate) => {
            let elements = aggregate
                .elements
                .into_iter()
                .flat_map(|element| {
                    unchain_condition(element.condition)
                        .into_iter()
                        .map(move |condition| HeadAggrElem {
                            tuple: element.tuple.clone(),
                            atom: element.atom.clone(),
                            condition,
                        })
                })
                .collect();
            Head::Aggregate(crate::structures::rule::HeadAggregate {
                fun: aggregate.fun,
                left: aggregate.left,
                right: aggregate.right,
                elements,
            })
        }
        other => other,
    }
}

/// Unchain every comparison of the rule; the result replaces it.
pub fn unchain_rule(rule: Rule) -> Vec<Rule> {
    let head = unchain_head(rule.head);
    let loc = rule.loc;
    cross_product(rule.body.into_iter().map(unchain_literal).collect())
        .into_iter()
        .map(|rows| Rule {
            head: head.clone(),
            body: rows.into_iter().flatten().collect(),
            loc,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        reports::Location,
        structures::{literal::Relation, symbol::SymbolStore, term::Term},
    };

    fn loc(store: &mut SymbolStore) -> Location {
        let file = store.name("t");
        Location::new(file, (1, 1), (1, 1))
    }

    #[test]
    fn chains_become_conjunctions() {
        let mut store = SymbolStore::default();
        let at = loc(&mut store);
        // :- 1 < 2 < 3.
        let rule = Rule {
            head: Head::False,
            body: vec![BodyLiteral::Comparison {
                neg: false,
                left: Term::value(at, store.num(1)),
                rights: vec![
                    (Relation::Lt, Term::value(at, store.num(2))),
                    (Relation::Lt, Term::value(at, store.num(3))),
                ],
                assign: false,
            }],
            loc: at,
        };
        let rules = unchain_rule(rule);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].body.len(), 2);
        for literal in &rules[0].body {
            match literal {
                BodyLiteral::Comparison { rights, neg, .. } => {
                    assert_eq!(rights.len(), 1);
                    assert!(!neg);
                }
                _ => panic!("comparison expected"),
            }
        }
    }

    #[test]
    fn negated_chains_split_the_rule() {
        let mut store = SymbolStore::default();
        let at = loc(&mut store);
        // :- not 1 < 2 < 3.  Splits into 1 >= 2 and 2 >= 3 readings.
        let rule = Rule {
            head: Head::False,
            body: vec![BodyLiteral::Comparison {
                neg: true,
                left: Term::value(at, store.num(1)),
                rights: vec![
                    (Relation::Lt, Term::value(at, store.num(2))),
                    (Relation::Lt, Term::value(at, store.num(3))),
                ],
                assign: false,
            }],
            loc: at,
        };
        let rules = unchain_rule(rule);
        assert_eq!(rules.len(), 2);
        match &rules[0].body[0] {
            BodyLiteral::Comparison { rights, .. } => {
                assert_eq!(rights[0].0, Relation::Ge);
            }
            _ => panic!("comparison expected"),
        }
    }
}
