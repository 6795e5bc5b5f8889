/*!
Projection of anonymous argument positions.

A body atom `p(_, X)` does not care which value fills the first slot;
enumerating `p`'s full domain there is wasted work.
Projection introduces an auxiliary predicate over the cared-for slots:

```text
#p_p(#p, X) :- p(#P0, X).
```

and the original literal probes `#p_p(#p, X)` instead --- the original
atom *derives* the projection, never the other way around.
The marker `#p` fills projected slots so the auxiliary keeps the
original arity, and one projection rule serves every literal with the
same signature and projection mask.

Only outermost argument slots project; an underscore nested inside a
function argument was already renamed by simplification.
*/

use rustc_hash::FxHashMap;

use crate::structures::{
    literal::{BodyLiteral, NafSign},
    rule::{Head, Rule},
    symbol::{Sig, SymbolStore},
    term::{AuxGen, AuxKind, CellArena, Term, TermKind},
};

/// The reserved prefix of projection predicates.
pub const PROJECTION_PREFIX: &str = "#p_";

/// The marker filling projected argument slots.
pub const PROJECTION_MARKER: &str = "#p";

/// Projection rules created so far, deduplicated by signature and mask.
#[derive(Default)]
pub struct ProjectionState {
    seen: FxHashMap<(Sig, Vec<bool>), ()>,

    /// The projection rules to append to the program.
    pub new_rules: Vec<Rule>,
}

/// Everything projection writes through.
pub struct ProjectionEnv<'a> {
    /// The symbol store.
    pub store: &'a mut SymbolStore,

    /// The cell arena for fresh variables.
    pub cells: &'a mut CellArena,

    /// The fresh-name generator.
    pub aux: &'a mut AuxGen,
}

fn is_anonymous(term: &Term, store: &SymbolStore) -> bool {
    matches!(&term.kind, TermKind::Var(v) if store.resolve(v.name) == "_")
}

/// Rewrite the projectable literals of a body in place.
pub fn project_body(body: &mut [BodyLiteral], state: &mut ProjectionState, env: &mut ProjectionEnv) {
    for literal in body.iter_mut() {
        match literal {
            BodyLiteral::Pred { atom, .. } => project_atom(atom, state, env),
            BodyLiteral::Aggregate { aggregate, .. } => {
                for element in &mut aggregate.elements {
                    project_body(&mut element.condition, state, env);
                }
            }
            BodyLiteral::Conditional(conditional) => {
                project_body(&mut conditional.condition, state, env);
            }
            _ => {}
        }
    }
}

/// Rewrite the projectable literals under a head's conditions.
pub fn project_head(head: &mut Head, state: &mut ProjectionState, env: &mut ProjectionEnv) {
    match head {
        Head::Disjunction(elements) | Head::Choice { elements, .. } => {
            for element in elements {
                project_body(&mut element.condition, state, env);
            }
        }
        Head::Aggregate(aggregate) => {
            for element in &mut aggregate.elements {
                project_body(&mut element.condition, state, env);
            }
        }
        _ => {}
    }
}

fn project_atom(atom: &mut Term, state: &mut ProjectionState, env: &mut ProjectionEnv) {
    let (name, sign, args) = match &atom.kind {
        TermKind::Fun { name, sign, args } => (*name, *sign, args),
        _ => return,
    };
    let mask: Vec<bool> = args
        .iter()
        .map(|arg| is_anonymous(arg, env.store))
        .collect();
    if !mask.iter().any(|&projected| projected) {
        return;
    }
    let loc = atom.loc;
    let sig = Sig {
        name,
        arity: args.len() as u32,
        sign,
    };
    let projected_name = {
        let spelled = format!("{}{}", PROJECTION_PREFIX, env.store.resolve(name));
        env.store.name(&spelled)
    };
    let marker = env.store.id(PROJECTION_MARKER, false);

    // The probe: anonymous slots become the marker, the rest stay.
    let probe_args: Vec<Term> = args
        .iter()
        .zip(&mask)
        .map(|(arg, &projected)| {
            if projected {
                Term::value(loc, marker)
            } else {
                arg.clone()
            }
        })
        .collect();
    atom.kind = TermKind::Fun {
        name: projected_name,
        sign,
        args: probe_args,
    };

    // One projection rule per signature and mask.
    if state.seen.insert((sig, mask.clone()), ()).is_some() {
        return;
    }
    let mut head_args = Vec::with_capacity(mask.len());
    let mut body_args = Vec::with_capacity(mask.len());
    for &projected in &mask {
        if projected {
            head_args.push(Term::value(loc, marker));
            let fresh = env.aux.var(AuxKind::P, 0, env.store, env.cells);
            body_args.push(Term::var(loc, fresh));
        } else {
            let shared = env.aux.var(AuxKind::X, 0, env.store, env.cells);
            head_args.push(Term::var(loc, shared));
            body_args.push(Term::var(loc, shared));
        }
    }
    state.new_rules.push(Rule {
        head: Head::Atom(Term {
            loc,
            kind: TermKind::Fun {
                name: projected_name,
                sign,
                args: head_args,
            },
        }),
        body: vec![BodyLiteral::Pred {
            sign: NafSign::Pos,
            atom: Term {
                loc,
                kind: TermKind::Fun {
                    name,
                    sign,
                    args: body_args,
                },
            },
        }],
        loc,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::Location;
    use crate::structures::term::VarTerm;

    fn loc(store: &mut SymbolStore) -> Location {
        let file = store.name("t");
        Location::new(file, (1, 1), (1, 1))
    }

    #[test]
    fn anonymous_slot_projects_once() {
        let mut store = SymbolStore::default();
        let mut cells = CellArena::default();
        let mut aux = AuxGen::default();
        let at = loc(&mut store);
        let p = store.name("p");
        let anon = store.name("_");
        let x = VarTerm {
            name: store.name("X"),
            level: 0,
            cell: cells.alloc(),
            bind: true,
        };
        let mk_lit = |cells: &mut CellArena, store: &mut SymbolStore| BodyLiteral::Pred {
            sign: NafSign::Pos,
            atom: Term {
                loc: at,
                kind: TermKind::Fun {
                    name: p,
                    sign: false,
                    args: vec![
                        Term::var(
                            at,
                            VarTerm {
                                name: anon,
                                level: 0,
                                cell: cells.alloc(),
                                bind: true,
                            },
                        ),
                        Term::var(at, x),
                    ],
                },
            },
        };
        let mut body = vec![mk_lit(&mut cells, &mut store), mk_lit(&mut cells, &mut store)];
        let mut state = ProjectionState::default();
        let mut env = ProjectionEnv {
            store: &mut store,
            cells: &mut cells,
            aux: &mut aux,
        };
        project_body(&mut body, &mut state, &mut env);

        // Both literals now probe the projection predicate.
        for literal in &body {
            match literal {
                BodyLiteral::Pred { atom, .. } => match &atom.kind {
                    TermKind::Fun { name, args, .. } => {
                        assert_eq!(store.resolve(*name), "#p_p");
                        assert_eq!(args.len(), 2);
                        assert!(matches!(args[0].kind, TermKind::Value(_)));
                        assert!(matches!(args[1].kind, TermKind::Var(_)));
                    }
                    _ => panic!("function atom expected"),
                },
                _ => panic!("predicate literal expected"),
            }
        }
        // One shared projection rule.
        assert_eq!(state.new_rules.len(), 1);
        let rule = &state.new_rules[0];
        match (&rule.head, &rule.body[0]) {
            (Head::Atom(head), BodyLiteral::Pred { atom, .. }) => {
                match (&head.kind, &atom.kind) {
                    (
                        TermKind::Fun { args: head_args, .. },
                        TermKind::Fun {
                            name,
                            args: body_args,
                            ..
                        },
                    ) => {
                        assert_eq!(store.resolve(*name), "p");
                        // The kept slot is one shared variable.
                        match (&head_args[1].kind, &body_args[1].kind) {
                            (TermKind::Var(a), TermKind::Var(b)) => {
                                assert_eq!(a.cell, b.cell)
                            }
                            _ => panic!("shared variable expected"),
                        }
                        // The projected slot: marker in the head, fresh
                        // variable in the body.
                        assert!(matches!(head_args[0].kind, TermKind::Value(_)));
                        assert!(matches!(body_args[0].kind, TermKind::Var(_)));
                    }
                    _ => panic!("function atoms expected"),
                }
            }
            _ => panic!("projection rule shape"),
        }
    }
}
