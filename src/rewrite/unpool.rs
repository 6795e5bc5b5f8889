/*!
Unpooling --- expanding `(a; b)` alternatives.

A pool makes its enclosing position non-deterministic; expansion takes
the cartesian product of the alternatives of every pooled position.
The same product machinery serves every context:
- a pooled head or body literal multiplies the *rule*;
- a pooled aggregate or disjunction element multiplies the *element*;
- a pooled conditional literal expands conjunctively within its body.

After this pass no [Pool](TermKind::Pool) remains anywhere.
*/

use crate::structures::{
    literal::{AggrElem, AggrGuard, BodyLiteral, CondLiteral},
    rule::{CondHead, Head, HeadAggrElem, Rule},
    term::{Term, TermKind},
};

/// The cartesian product of the given alternative lists.
pub fn cross_product<T: Clone>(alternatives: Vec<Vec<T>>) -> Vec<Vec<T>> {
    let mut product: Vec<Vec<T>> = vec![Vec::with_capacity(alternatives.len())];
    for position in alternatives {
        let mut next = Vec::with_capacity(product.len() * position.len());
        for row in &product {
            for alternative in &position {
                let mut row = row.clone();
                row.push(alternative.clone());
                next.push(row);
            }
        }
        product = next;
    }
    product
}

/// All pool-free readings of a term.
pub fn unpool_term(term: &Term) -> Vec<Term> {
    let loc = term.loc;
    match &term.kind {
        TermKind::Value(_) | TermKind::Var(_) | TermKind::Linear { .. } => vec![term.clone()],

        TermKind::Pool(alternatives) => alternatives.iter().flat_map(unpool_term).collect(),

        TermKind::Unary(op, a) => unpool_term(a)
            .into_iter()
            .map(|a| Term {
                loc,
                kind: TermKind::Unary(*op, Box::new(a)),
            })
            .collect(),

        TermKind::Binary(op, a, b) => cross_product(vec![unpool_term(a), unpool_term(b)])
            .into_iter()
            .map(|mut pair| {
                let b = pair.pop().expect("two positions");
                let a = pair.pop().expect("two positions");
                Term {
                    loc,
                    kind: TermKind::Binary(*op, Box::new(a), Box::new(b)),
                }
            })
            .collect(),

        TermKind::Range(a, b) => cross_product(vec![unpool_term(a), unpool_term(b)])
            .into_iter()
            .map(|mut pair| {
                let b = pair.pop().expect("two positions");
                let a = pair.pop().expect("two positions");
                Term {
                    loc,
                    kind: TermKind::Range(Box::new(a), Box::new(b)),
                }
            })
            .collect(),

        TermKind::Fun { name, sign, args } => {
            cross_product(args.iter().map(unpool_term).collect())
                .into_iter()
                .map(|args| Term {
                    loc,
                    kind: TermKind::Fun {
                        name: *name,
                        sign: *sign,
                        args,
                    },
                })
                .collect()
        }

        TermKind::Script { name, args } => cross_product(args.iter().map(unpool_term).collect())
            .into_iter()
            .map(|args| Term {
                loc,
                kind: TermKind::Script { name: *name, args },
            })
            .collect(),
    }
}

fn unpool_guard(guard: &Option<AggrGuard>) -> Vec<Option<AggrGuard>> {
    match guard {
        None => vec![None],
        Some(guard) => unpool_term(&guard.term)
            .into_iter()
            .map(|term| {
                Some(AggrGuard {
                    relation: guard.relation,
                    term,
                })
            })
            .collect(),
    }
}

fn unpool_condition(condition: &[BodyLiteral]) -> Vec<BodyLiteral> {
    condition.iter().flat_map(unpool_literal).collect()
}

/// The readings of a body literal that multiply the enclosing rule.
///
/// Pools inside aggregate elements and conditional literals expand in
/// place rather than multiplying the rule, so those variants always
/// return one reading.
pub fn unpool_literal(literal: &BodyLiteral) -> Vec<BodyLiteral> {
    match literal {
        BodyLiteral::Pred { sign, atom } => unpool_term(atom)
            .into_iter()
            .map(|atom| BodyLiteral::Pred { sign: *sign, atom })
            .collect(),

        BodyLiteral::Comparison {
            neg,
            left,
            rights,
            assign,
        } => {
            let mut positions = vec![unpool_term(left)];
            for (_, right) in rights {
                positions.push(unpool_term(right));
            }
            cross_product(positions)
                .into_iter()
                .map(|mut row| {
                    let left = row.remove(0);
                    let rights = rights
                        .iter()
                        .zip(row)
                        .map(|((relation, _), term)| (*relation, term))
                        .collect();
                    BodyLiteral::Comparison {
                        neg: *neg,
                        left,
                        rights,
                        assign: *assign,
                    }
                })
                .collect()
        }

        BodyLiteral::Aggregate { sign, aggregate } => {
            let elements: Vec<AggrElem> = aggregate
                .elements
                .iter()
                .flat_map(|element| {
                    // A pooled tuple position multiplies the element.
                    let tuples =
                        cross_product(element.tuple.iter().map(unpool_term).collect());
                    let condition = unpool_condition(&element.condition);
                    tuples.into_iter().map(move |tuple| AggrElem {
                        tuple,
                        condition: condition.clone(),
                    })
                })
                .collect();
            cross_product(vec![
                unpool_guard(&aggregate.left),
                unpool_guard(&aggregate.right),
            ])
            .into_iter()
            .map(|mut guards| {
                let right = guards.pop().expect("two guards");
                let left = guards.pop().expect("two guards");
                BodyLiteral::Aggregate {
                    sign: *sign,
                    aggregate: crate::structures::literal::BodyAggregate {
                        fun: aggregate.fun,
                        left,
                        right,
                        elements: elements.clone(),
                    },
                }
            })
            .collect()
        }

        BodyLiteral::Conditional(conditional) => {
            // Conjunctive reading: every alternative of the conditioned
            // literal joins the body.
            unpool_literal(&conditional.literal)
                .into_iter()
                .map(|literal| {
                    BodyLiteral::Conditional(CondLiteral {
                        literal: Box::new(literal),
                        condition: unpool_condition(&conditional.condition),
                    })
                })
                .collect()
        }

        BodyLiteral::Theory { .. } => vec![literal.clone()],

        BodyLiteral::Range { var, lo, hi } => {
            cross_product(vec![unpool_term(lo), unpool_term(hi)])
                .into_iter()
                .map(|mut pair| {
                    let hi = pair.pop().expect("two positions");
                    let lo = pair.pop().expect("two positions");
                    BodyLiteral::Range { var: *var, lo, hi }
                })
                .collect()
        }

        BodyLiteral::Script { var, name, args } => {
            cross_product(args.iter().map(unpool_term).collect())
                .into_iter()
                .map(|args| BodyLiteral::Script {
                    var: *var,
                    name: *name,
                    args,
                })
                .collect()
        }
    }
}

fn unpool_cond_heads(elements: &[CondHead]) -> Vec<CondHead> {
    elements
        .iter()
        .flat_map(|element| {
            let condition = unpool_condition(&element.condition);
            unpool_term(&element.atom)
                .into_iter()
                .map(move |atom| CondHead {
                    atom,
                    condition: condition.clone(),
                })
        })
        .collect()
}

/// The readings of a head that multiply the enclosing rule.
pub fn unpool_head(head: &Head) -> Vec<Head> {
    match head {
        Head::False => vec![Head::False],

        Head::Atom(atom) => unpool_term(atom).into_iter().map(Head::Atom).collect(),

        // Pooled elements widen the disjunction or choice in place.
        Head::Disjunction(elements) => vec![Head::Disjunction(unpool_cond_heads(elements))],

        Head::Choice {
            left,
            right,
            elements,
        } => {
            let elements = unpool_cond_heads(elements);
            cross_product(vec![unpool_guard(left), unpool_guard(right)])
                .into_iter()
                .map(|mut guards| {
                    let right = guards.pop().expect("two guards");
                    let left = guards.pop().expect("two guards");
                    Head::Choice {
                        left,
                        right,
                        elements: elements.clone(),
                    }
                })
                .collect()
        }

        Head::Aggregate(aggregate) => {
            let elements: Vec<HeadAggrElem> = aggregate
                .elements
                .iter()
                .flat_map(|element| {
                    let tuples =
                        cross_product(element.tuple.iter().map(unpool_term).collect());
                    let condition = unpool_condition(&element.condition);
                    let atoms = unpool_term(&element.atom);
                    cross_product(vec![
                        tuples.into_iter().map(TupleOrAtom::Tuple).collect(),
                        atoms.into_iter().map(TupleOrAtom::Atom).collect(),
                    ])
                    .into_iter()
                    .map(move |mut pair| {
                        let atom = match pair.pop().expect("two positions") {
                            TupleOrAtom::Atom(atom) => atom,
                            TupleOrAtom::Tuple(_) => unreachable!("atom position"),
                        };
                        let tuple = match pair.pop().expect("two positions") {
                            TupleOrAtom::Tuple(tuple) => tuple,
                            TupleOrAtom::Atom(_) => unreachable!("tuple position"),
                        };
                        HeadAggrElem {
                            tuple,
                            atom,
                            condition: condition.clone(),
                        }
                    })
                })
                .collect();
            cross_product(vec![
                unpool_guard(&aggregate.left),
                unpool_guard(&aggregate.right),
            ])
            .into_iter()
            .map(|mut guards| {
                let right = guards.pop().expect("two guards");
                let left = guards.pop().expect("two guards");
                Head::Aggregate(crate::structures::rule::HeadAggregate {
                    fun: aggregate.fun,
                    left,
                    right,
                    elements: elements.clone(),
                })
            })
            .collect()
        }

        Head::Theory(index) => vec![Head::Theory(*index)],
    }
}

#[derive(Clone)]
enum TupleOrAtom {
    Tuple(Vec<Term>),
    Atom(Term),
}

/// All pool-free readings of a rule.
pub fn unpool_rule(rule: &Rule) -> Vec<Rule> {
    let heads = unpool_head(&rule.head);
    let bodies = cross_product(rule.body.iter().map(unpool_literal).collect());
    let mut rules = Vec::with_capacity(heads.len() * bodies.len());
    for head in &heads {
        for body in &bodies {
            rules.push(Rule {
                head: head.clone(),
                body: body.clone(),
                loc: rule.loc,
            });
        }
    }
    rules
}
