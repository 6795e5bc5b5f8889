/*!
Invertibility and arithmetic lifting.

A term is *invertible* when, given its value, the single unknown inside
it can be solved for: a variable, and the canonical linear form
`m·X + n`, are invertible; a constant is trivially so.
Everything else --- arithmetic over two unknowns, `|X|`, a function
inside an arithmetic position --- is not, and cannot serve as a match
target.

Lifting replaces every non-invertible arithmetic subterm at
quantification level `k` with a fresh `#Arith` variable and records the
pair in [ArithLift]; the rewriter later materialises each pair as a
body equality `#ArithN = term`, which the instantiator treats as an
always-evaluable binder once the term's variables are bound.
Identical subterms at one level share one fresh variable.
*/

use crate::structures::{
    symbol::SymbolStore,
    term::{AuxGen, AuxKind, CellArena, Term, TermKind, UnOp, VarTerm},
};

/// Whether a term can be solved for its unknown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Invertibility {
    /// No unknown at all.
    Constant,

    /// One unknown, recoverable from the term's value.
    Invertible,

    /// Not solvable; lifted into a fresh variable plus an equality.
    NotInvertible,
}

/// Classify a term.
pub fn invertibility(term: &Term) -> Invertibility {
    match &term.kind {
        TermKind::Value(_) => Invertibility::Constant,
        TermKind::Var(_) | TermKind::Linear { .. } => Invertibility::Invertible,
        TermKind::Unary(UnOp::Neg, a) => invertibility(a),
        _ => {
            if term.has_var() {
                Invertibility::NotInvertible
            } else {
                Invertibility::Constant
            }
        }
    }
}

/// The lifted equalities, one list per quantification level.
#[derive(Default)]
pub struct ArithLift {
    levels: Vec<Vec<(Term, VarTerm)>>,
}

impl ArithLift {
    /// The pairs lifted at `level`, in lift order.
    pub fn at_level(&self, level: u32) -> &[(Term, VarTerm)] {
        self.levels
            .get(level as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Drain all levels, outermost first.
    pub fn drain(&mut self) -> Vec<Vec<(Term, VarTerm)>> {
        std::mem::take(&mut self.levels)
    }

    fn fresh(
        &mut self,
        term: &Term,
        level: u32,
        aux: &mut AuxGen,
        store: &mut SymbolStore,
        cells: &mut CellArena,
    ) -> VarTerm {
        while self.levels.len() <= level as usize {
            self.levels.push(Vec::new());
        }
        let entries = &mut self.levels[level as usize];
        if let Some((_, var)) = entries.iter().find(|(t, _)| t == term) {
            return *var;
        }
        let var = aux.var(AuxKind::Arith, level, store, cells);
        entries.push((term.clone(), var));
        var
    }
}

/// Lift every non-invertible arithmetic subterm of `term` in place.
///
/// Applied to the argument positions of atoms and to aggregate element
/// tuples; comparison sides are evaluated rather than matched and need
/// no lifting.
pub fn rewrite_arithmetics(
    term: &mut Term,
    lift: &mut ArithLift,
    level: u32,
    aux: &mut AuxGen,
    store: &mut SymbolStore,
    cells: &mut CellArena,
) {
    match &mut term.kind {
        TermKind::Value(_) | TermKind::Var(_) | TermKind::Linear { .. } => {}

        TermKind::Fun { args, .. } => {
            for arg in args {
                rewrite_arithmetics(arg, lift, level, aux, store, cells);
            }
        }

        TermKind::Unary(..) | TermKind::Binary(..) => {
            if invertibility(term) == Invertibility::NotInvertible {
                let var = lift.fresh(term, level, aux, store, cells);
                term.kind = TermKind::Var(var);
            }
        }

        TermKind::Range(..) | TermKind::Pool(_) | TermKind::Script { .. } => {
            unreachable!("range, pool and script terms are rewritten away before lifting")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{reports::Location, structures::term::BinOp};

    fn parts() -> (SymbolStore, CellArena, AuxGen) {
        (SymbolStore::default(), CellArena::default(), AuxGen::default())
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
    fn classification() {
        let (mut store, mut cells, _) = parts();
        let at = loc(&mut store);
        let x = var(&mut store, &mut cells, "X");
        let y = var(&mut store, &mut cells, "Y");

        let value = Term::value(at, store.num(3));
        assert_eq!(invertibility(&value), Invertibility::Constant);

        let linear = Term {
            loc: at,
            kind: TermKind::Linear { var: x, m: 2, n: 1 },
        };
        assert_eq!(invertibility(&linear), Invertibility::Invertible);

        let neg = Term {
            loc: at,
            kind: TermKind::Unary(UnOp::Neg, Box::new(Term::var(at, x))),
        };
        assert_eq!(invertibility(&neg), Invertibility::Invertible);

        let sum = Term {
            loc: at,
            kind: TermKind::Binary(
                BinOp::Add,
                Box::new(Term::var(at, x)),
                Box::new(Term::var(at, y)),
            ),
        };
        assert_eq!(invertibility(&sum), Invertibility::NotInvertible);
    }

    #[test]
    fn lifting_replaces_and_dedups() {
        let (mut store, mut cells, mut aux) = parts();
        let at = loc(&mut store);
        let x = var(&mut store, &mut cells, "X");
        let y = var(&mut store, &mut cells, "Y");
        let sum = |at, x: VarTerm, y: VarTerm| Term {
            loc: at,
            kind: TermKind::Binary(
                BinOp::Add,
                Box::new(Term::var(at, x)),
                Box::new(Term::var(at, y)),
            ),
        };
        let f = store.name("f");
        // f(X + Y, X + Y): both occurrences lift to one fresh variable.
        let mut term = Term {
            loc: at,
            kind: TermKind::Fun {
                name: f,
                sign: false,
                args: vec![sum(at, x, y), sum(at, x, y)],
            },
        };
        let mut lift = ArithLift::default();
        rewrite_arithmetics(&mut term, &mut lift, 0, &mut aux, &mut store, &mut cells);
        let args = match &term.kind {
            TermKind::Fun { args, .. } => args,
            _ => panic!("function expected"),
        };
        let (a, b) = match (&args[0].kind, &args[1].kind) {
            (TermKind::Var(a), TermKind::Var(b)) => (*a, *b),
            _ => panic!("lifted variables expected"),
        };
        assert_eq!(a.cell, b.cell);
        assert_eq!(lift.at_level(0).len(), 1);
        let (lifted, fresh) = &lift.at_level(0)[0];
        assert_eq!(fresh.cell, a.cell);
        assert!(matches!(lifted.kind, TermKind::Binary(BinOp::Add, ..)));
    }
}
