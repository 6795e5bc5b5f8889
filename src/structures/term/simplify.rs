/*!
Simplification --- partial constant folding and canonicalisation.

Simplification rewrites a term in place:
- Constants fold end to end; an operation without a defined result
  (division by zero, arithmetic on a string, a range over non-numbers)
  makes the whole term *undefined*, which drops the enclosing literal
  with an [OperationUndefined](crate::reports::DiagnosticKind) warning.
- `-X`, `c + X`, `X + c`, `c * X` and friends canonicalise into
  [linear](super::TermKind::Linear) form.
- A range `l..r` is replaced by a fresh variable recorded in
  [SimplifyState::dots]; a script call likewise into
  [SimplifyState::scripts].
  The rewriter turns these records into range and script body literals.
- Anonymous variables in non-positional contexts receive fresh names;
  a positional anonymous variable instead raises the `project` flag
  for the projection pass.
*/

use crate::{
    misc::log::targets,
    reports::{DiagnosticKind, Reporter},
    structures::{
        symbol::{NameId, Symbol, SymbolStore},
        term::{eval_binary, eval_unary, BinOp, CellArena, Term, TermKind, UnOp, VarTerm},
    },
};

/// The families of generated names, each with the reserved `#` prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuxKind {
    /// An auxiliary variable standing for a range.
    Range,

    /// An auxiliary variable standing for a script call.
    Script,

    /// An auxiliary variable standing for a lifted arithmetic term.
    Arith,

    /// A parameter of an incremental program part.
    Inc,

    /// A replacement for an anonymous variable.
    Anon,

    /// A general fresh variable.
    X,

    /// A second family of fresh variables.
    Y,

    /// A fresh projection variable.
    P,
}

impl AuxKind {
    fn prefix(self) -> &'static str {
        match self {
            AuxKind::Range => "#Range",
            AuxKind::Script => "#Script",
            AuxKind::Arith => "#Arith",
            AuxKind::Inc => "#Inc",
            AuxKind::Anon => "#Anon",
            AuxKind::X => "#X",
            AuxKind::Y => "#Y",
            AuxKind::P => "#P",
        }
    }
}

/// Generates fresh names with a monotone suffix counter.
///
/// Owned by the grounder instance, so independent grounders never
/// share counters.
#[derive(Default)]
pub struct AuxGen {
    counter: u32,
}

impl AuxGen {
    /// A fresh name of the given family.
    pub fn name(&mut self, kind: AuxKind, store: &mut SymbolStore) -> NameId {
        let name = format!("{}{}", kind.prefix(), self.counter);
        self.counter += 1;
        store.name(&name)
    }

    /// A fresh variable of the given family with its own cell.
    pub fn var(
        &mut self,
        kind: AuxKind,
        level: u32,
        store: &mut SymbolStore,
        cells: &mut CellArena,
    ) -> VarTerm {
        VarTerm {
            name: self.name(kind, store),
            level,
            cell: cells.alloc(),
            bind: true,
        }
    }
}

/// Range and script replacements accumulated while simplifying one rule.
#[derive(Default)]
pub struct SimplifyState {
    /// Fresh variable, lower and upper bound, one entry per replaced range.
    pub dots: Vec<(VarTerm, Term, Term)>,

    /// Fresh variable, script name and arguments, one entry per replaced call.
    pub scripts: Vec<(VarTerm, NameId, Vec<Term>)>,

    /// The quantification level fresh variables are created at.
    pub level: u32,
}

/// The outcome of simplifying a term.
#[derive(Debug, PartialEq, Eq)]
pub enum Simplified {
    /// The term was simplified in place.
    Ok {
        /// A positional anonymous variable was seen; the projection
        /// pass will want to look at the enclosing literal.
        project: bool,
    },

    /// The term has no defined value; drop the enclosing literal.
    Undefined,
}

/// What simplification of one subterm produced, for the parent's folding.
enum Ret {
    /// Nothing to fold against.
    Untouched,

    /// The subterm is this constant.
    Constant(Symbol),

    /// The subterm is a variable or linear term.
    Linear,

    /// The subterm has no defined value.
    Undefined,
}

/// Everything simplification writes through.
pub struct SimplifyEnv<'a> {
    /// The symbol store.
    pub store: &'a mut SymbolStore,

    /// The cell arena fresh variables allocate from.
    pub cells: &'a mut CellArena,

    /// The fresh-name generator.
    pub aux: &'a mut AuxGen,

    /// The diagnostics sink.
    pub reporter: &'a mut Reporter,
}

/// Simplify `term` in place.
///
/// `positional` marks argument positions of an atom, where anonymous
/// variables may be projected; `arithmetic` marks positions whose value
/// must be a number, where a range is replaced rather than enumerated.
pub fn simplify(
    term: &mut Term,
    state: &mut SimplifyState,
    positional: bool,
    arithmetic: bool,
    env: &mut SimplifyEnv,
) -> Simplified {
    let mut project = false;
    match walk(term, state, positional, arithmetic, &mut project, env) {
        Ret::Undefined => Simplified::Undefined,
        _ => Simplified::Ok { project },
    }
}

fn warn_undefined(term: &Term, env: &mut SimplifyEnv) {
    log::debug!(target: targets::REWRITE, "operation undefined while simplifying");
    env.reporter.warn(
        DiagnosticKind::OperationUndefined,
        term.loc,
        format!("operation undefined: {}", term.display(env.store)),
    );
}

fn is_anonymous(name: NameId, store: &SymbolStore) -> bool {
    store.resolve(name) == "_"
}

fn walk(
    term: &mut Term,
    state: &mut SimplifyState,
    positional: bool,
    arithmetic: bool,
    project: &mut bool,
    env: &mut SimplifyEnv,
) -> Ret {
    match &mut term.kind {
        TermKind::Value(symbol) => Ret::Constant(*symbol),

        TermKind::Var(v) => {
            if is_anonymous(v.name, env.store) {
                if positional && !arithmetic {
                    *project = true;
                } else {
                    // Each underscore is independent; give it a name of its own.
                    *v = env.aux.var(AuxKind::Anon, state.level, env.store, env.cells);
                }
            }
            Ret::Linear
        }

        TermKind::Linear { .. } => Ret::Linear,

        TermKind::Unary(op, a) => {
            let op = *op;
            match walk(a, state, false, true, project, env) {
                Ret::Undefined => return Ret::Undefined,
                Ret::Constant(Symbol::Num(x)) => match eval_unary(op, x) {
                    Some(folded) => {
                        term.kind = TermKind::Value(Symbol::Num(folded));
                        Ret::Constant(Symbol::Num(folded))
                    }
                    None => {
                        warn_undefined(term, env);
                        Ret::Undefined
                    }
                },
                Ret::Constant(symbol @ Symbol::Fun(_)) if op == UnOp::Neg => {
                    match env.store.negate(symbol) {
                        Some(negated) => {
                            term.kind = TermKind::Value(negated);
                            Ret::Constant(negated)
                        }
                        None => {
                            warn_undefined(term, env);
                            Ret::Undefined
                        }
                    }
                }
                Ret::Constant(_) => {
                    warn_undefined(term, env);
                    Ret::Undefined
                }
                Ret::Linear if op == UnOp::Neg => {
                    let (var, m, n) = match &a.kind {
                        TermKind::Var(v) => (*v, -1, 0),
                        TermKind::Linear { var, m, n } => {
                            match (m.checked_neg(), n.checked_neg()) {
                                (Some(m), Some(n)) => (*var, m, n),
                                _ => {
                                    warn_undefined(term, env);
                                    return Ret::Undefined;
                                }
                            }
                        }
                        _ => unreachable!("linear result from a non-linear term"),
                    };
                    term.kind = TermKind::Linear { var, m, n };
                    Ret::Linear
                }
                Ret::Linear | Ret::Untouched => Ret::Untouched,
            }
        }

        TermKind::Binary(op, a, b) => {
            let op = *op;
            let ra = walk(a, state, false, true, project, env);
            let rb = walk(b, state, false, true, project, env);
            match (ra, rb) {
                (Ret::Undefined, _) | (_, Ret::Undefined) => Ret::Undefined,

                (Ret::Constant(Symbol::Num(x)), Ret::Constant(Symbol::Num(y))) => {
                    match eval_binary(op, x, y) {
                        Some(folded) => {
                            term.kind = TermKind::Value(Symbol::Num(folded));
                            Ret::Constant(Symbol::Num(folded))
                        }
                        None => {
                            warn_undefined(term, env);
                            Ret::Undefined
                        }
                    }
                }

                (Ret::Constant(_), Ret::Constant(_)) => {
                    warn_undefined(term, env);
                    Ret::Undefined
                }

                // c ∘ X and X ∘ c canonicalise for +, - and *.
                (Ret::Constant(Symbol::Num(c)), Ret::Linear) => {
                    match fold_linear_left(op, c, b) {
                        Fold::Term(kind) => {
                            term.kind = kind;
                            Ret::Linear
                        }
                        Fold::Overflow => {
                            warn_undefined(term, env);
                            Ret::Undefined
                        }
                        Fold::Keep => Ret::Untouched,
                    }
                }
                (Ret::Linear, Ret::Constant(Symbol::Num(c))) => {
                    match fold_linear_right(op, a, c) {
                        Fold::Term(kind) => {
                            term.kind = kind;
                            Ret::Linear
                        }
                        Fold::Overflow => {
                            warn_undefined(term, env);
                            Ret::Undefined
                        }
                        Fold::Keep => Ret::Untouched,
                    }
                }

                _ => Ret::Untouched,
            }
        }

        TermKind::Range(l, r) => {
            if let Ret::Undefined = walk(l, state, false, true, project, env) {
                return Ret::Undefined;
            }
            if let Ret::Undefined = walk(r, state, false, true, project, env) {
                return Ret::Undefined;
            }
            let var = env.aux.var(AuxKind::Range, state.level, env.store, env.cells);
            let lo = (**l).clone();
            let hi = (**r).clone();
            state.dots.push((var, lo, hi));
            term.kind = TermKind::Var(var);
            Ret::Linear
        }

        TermKind::Script { name, args } => {
            let name = *name;
            for arg in args.iter_mut() {
                if let Ret::Undefined = walk(arg, state, false, false, project, env) {
                    return Ret::Undefined;
                }
            }
            let var = env.aux.var(AuxKind::Script, state.level, env.store, env.cells);
            let args = std::mem::take(args);
            state.scripts.push((var, name, args));
            term.kind = TermKind::Var(var);
            Ret::Linear
        }

        TermKind::Fun { name, sign, args } => {
            let mut all_constant = true;
            let mut folded = Vec::with_capacity(args.len());
            for arg in args.iter_mut() {
                // Only the outermost function's argument slots are positional.
                match walk(arg, state, false, false, project, env) {
                    Ret::Undefined => return Ret::Undefined,
                    Ret::Constant(symbol) => folded.push(symbol),
                    _ => all_constant = false,
                }
            }
            if all_constant {
                let symbol = env.store.fun(*name, folded, *sign);
                term.kind = TermKind::Value(symbol);
                Ret::Constant(symbol)
            } else {
                Ret::Untouched
            }
        }

        TermKind::Pool(_) => unreachable!("pools are expanded before simplification"),
    }
}

enum Fold {
    Term(TermKind),
    Overflow,
    Keep,
}

fn linear_of(term: &Term) -> (VarTerm, i32, i32) {
    match &term.kind {
        TermKind::Var(v) => (*v, 1, 0),
        TermKind::Linear { var, m, n } => (*var, *m, *n),
        _ => unreachable!("linear result from a non-linear term"),
    }
}

/// `c ∘ t` with `t` linear.
fn fold_linear_left(op: BinOp, c: i32, t: &Term) -> Fold {
    let (var, m, n) = linear_of(t);
    let kind = match op {
        BinOp::Add => match n.checked_add(c) {
            Some(n) => TermKind::Linear { var, m, n },
            None => return Fold::Overflow,
        },
        BinOp::Sub => match (m.checked_neg(), c.checked_sub(n)) {
            (Some(m), Some(n)) => TermKind::Linear { var, m, n },
            _ => return Fold::Overflow,
        },
        BinOp::Mul => {
            if c == 0 {
                TermKind::Value(Symbol::Num(0))
            } else {
                match (m.checked_mul(c), n.checked_mul(c)) {
                    (Some(m), Some(n)) => TermKind::Linear { var, m, n },
                    _ => return Fold::Overflow,
                }
            }
        }
        _ => return Fold::Keep,
    };
    Fold::Term(kind)
}

/// `t ∘ c` with `t` linear.
fn fold_linear_right(op: BinOp, t: &Term, c: i32) -> Fold {
    let (var, m, n) = linear_of(t);
    let kind = match op {
        BinOp::Add => match n.checked_add(c) {
            Some(n) => TermKind::Linear { var, m, n },
            None => return Fold::Overflow,
        },
        BinOp::Sub => match n.checked_sub(c) {
            Some(n) => TermKind::Linear { var, m, n },
            None => return Fold::Overflow,
        },
        BinOp::Mul => {
            if c == 0 {
                TermKind::Value(Symbol::Num(0))
            } else {
                match (m.checked_mul(c), n.checked_mul(c)) {
                    (Some(m), Some(n)) => TermKind::Linear { var, m, n },
                    _ => return Fold::Overflow,
                }
            }
        }
        _ => return Fold::Keep,
    };
    Fold::Term(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::Location;

    fn env_parts() -> (SymbolStore, CellArena, AuxGen, Reporter) {
        (
            SymbolStore::default(),
            CellArena::default(),
            AuxGen::default(),
            Reporter::default(),
        )
    }

    fn loc(store: &mut SymbolStore) -> Location {
        let file = store.name("t");
        Location::new(file, (1, 1), (1, 1))
    }

    fn var(store: &mut SymbolStore, cells: &mut CellArena, name: &str) -> VarTerm {
        VarTerm {
            name: store.name(name),
            level: 0,
            cell: cells.alloc(),
            bind: true,
        }
    }

    #[test]
    fn constant_folding() {
        let (mut store, mut cells, mut aux, mut reporter) = env_parts();
        let at = loc(&mut store);
        let mut term = Term {
            loc: at,
            kind: TermKind::Binary(
                BinOp::Mul,
                Box::new(Term::value(at, store.num(6))),
                Box::new(Term {
                    loc: at,
                    kind: TermKind::Binary(
                        BinOp::Add,
                        Box::new(Term::value(at, store.num(3))),
                        Box::new(Term::value(at, store.num(4))),
                    ),
                }),
            ),
        };
        let mut state = SimplifyState::default();
        let mut env = SimplifyEnv {
            store: &mut store,
            cells: &mut cells,
            aux: &mut aux,
            reporter: &mut reporter,
        };
        let out = simplify(&mut term, &mut state, false, true, &mut env);
        assert_eq!(out, Simplified::Ok { project: false });
        assert_eq!(term.as_value(), Some(Symbol::Num(42)));
    }

    #[test]
    fn division_by_zero_is_undefined() {
        let (mut store, mut cells, mut aux, mut reporter) = env_parts();
        let at = loc(&mut store);
        let mut term = Term {
            loc: at,
            kind: TermKind::Binary(
                BinOp::Div,
                Box::new(Term::value(at, store.num(1))),
                Box::new(Term::value(at, store.num(0))),
            ),
        };
        let mut state = SimplifyState::default();
        let mut env = SimplifyEnv {
            store: &mut store,
            cells: &mut cells,
            aux: &mut aux,
            reporter: &mut reporter,
        };
        let out = simplify(&mut term, &mut state, false, true, &mut env);
        assert_eq!(out, Simplified::Undefined);
        assert_eq!(reporter.diagnostics().len(), 1);
        assert_eq!(
            reporter.diagnostics()[0].kind,
            DiagnosticKind::OperationUndefined
        );
    }

    #[test]
    fn negation_canonicalises_to_linear() {
        let (mut store, mut cells, mut aux, mut reporter) = env_parts();
        let at = loc(&mut store);
        let x = var(&mut store, &mut cells, "X");
        let mut term = Term {
            loc: at,
            kind: TermKind::Unary(UnOp::Neg, Box::new(Term::var(at, x))),
        };
        let mut state = SimplifyState::default();
        let mut env = SimplifyEnv {
            store: &mut store,
            cells: &mut cells,
            aux: &mut aux,
            reporter: &mut reporter,
        };
        simplify(&mut term, &mut state, false, true, &mut env);
        assert_eq!(term.kind, TermKind::Linear { var: x, m: -1, n: 0 });
    }

    #[test]
    fn addition_folds_into_linear() {
        let (mut store, mut cells, mut aux, mut reporter) = env_parts();
        let at = loc(&mut store);
        let x = var(&mut store, &mut cells, "X");
        // 1 + (X - 3) becomes -2 + X.
        let mut term = Term {
            loc: at,
            kind: TermKind::Binary(
                BinOp::Add,
                Box::new(Term::value(at, store.num(1))),
                Box::new(Term {
                    loc: at,
                    kind: TermKind::Binary(
                        BinOp::Sub,
                        Box::new(Term::var(at, x)),
                        Box::new(Term::value(at, store.num(3))),
                    ),
                }),
            ),
        };
        let mut state = SimplifyState::default();
        let mut env = SimplifyEnv {
            store: &mut store,
            cells: &mut cells,
            aux: &mut aux,
            reporter: &mut reporter,
        };
        simplify(&mut term, &mut state, false, true, &mut env);
        assert_eq!(term.kind, TermKind::Linear { var: x, m: 1, n: -2 });
    }

    #[test]
    fn range_becomes_fresh_variable() {
        let (mut store, mut cells, mut aux, mut reporter) = env_parts();
        let at = loc(&mut store);
        let mut term = Term {
            loc: at,
            kind: TermKind::Range(
                Box::new(Term::value(at, store.num(1))),
                Box::new(Term::value(at, store.num(3))),
            ),
        };
        let mut state = SimplifyState::default();
        let mut env = SimplifyEnv {
            store: &mut store,
            cells: &mut cells,
            aux: &mut aux,
            reporter: &mut reporter,
        };
        simplify(&mut term, &mut state, false, true, &mut env);
        assert!(matches!(term.kind, TermKind::Var(_)));
        assert_eq!(state.dots.len(), 1);
        assert_eq!(state.dots[0].1.as_value(), Some(Symbol::Num(1)));
        assert_eq!(state.dots[0].2.as_value(), Some(Symbol::Num(3)));
    }

    #[test]
    fn anonymous_variables_are_independent() {
        let (mut store, mut cells, mut aux, mut reporter) = env_parts();
        let at = loc(&mut store);
        let anon = store.name("_");
        let mk = |cells: &mut CellArena| VarTerm {
            name: anon,
            level: 0,
            cell: cells.alloc(),
            bind: true,
        };
        let a = mk(&mut cells);
        let b = mk(&mut cells);
        let f = store.name("f");
        let mut term = Term {
            loc: at,
            kind: TermKind::Fun {
                name: f,
                sign: false,
                args: vec![
                    Term {
                        loc: at,
                        kind: TermKind::Fun {
                            name: f,
                            sign: false,
                            args: vec![Term::var(at, a), Term::var(at, b)],
                        },
                    },
                ],
            },
        };
        let mut state = SimplifyState::default();
        let mut env = SimplifyEnv {
            store: &mut store,
            cells: &mut cells,
            aux: &mut aux,
            reporter: &mut reporter,
        };
        simplify(&mut term, &mut state, true, false, &mut env);
        let inner = match &term.kind {
            TermKind::Fun { args, .. } => match &args[0].kind {
                TermKind::Fun { args, .. } => args,
                _ => panic!("inner function expected"),
            },
            _ => panic!("function expected"),
        };
        let (va, vb) = match (&inner[0].kind, &inner[1].kind) {
            (TermKind::Var(a), TermKind::Var(b)) => (a, b),
            _ => panic!("variables expected"),
        };
        assert_ne!(va.name, vb.name);
        assert_ne!(va.cell, vb.cell);
    }

    #[test]
    fn positional_anonymous_raises_project() {
        let (mut store, mut cells, mut aux, mut reporter) = env_parts();
        let at = loc(&mut store);
        let anon = var(&mut store, &mut cells, "_");
        let mut term = Term::var(at, anon);
        let mut state = SimplifyState::default();
        let mut env = SimplifyEnv {
            store: &mut store,
            cells: &mut cells,
            aux: &mut aux,
            reporter: &mut reporter,
        };
        let out = simplify(&mut term, &mut state, true, false, &mut env);
        assert_eq!(out, Simplified::Ok { project: true });
    }
}
