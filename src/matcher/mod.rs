/*!
Ground-term mirrors and unification.

For every non-ground term the matcher keeps a parallel [GTerm]: the
same shape, with variables reduced to their shared cells.
Cells progress through three states --- empty, bound to a value, bound
to a term of the opposite side --- and [reset](reset) returns every
cell within one term to empty, so a mirror can be probed any number of
times.

The original dispatches unification virtually over the pairs of
variants; here [unify] matches on the pair directly, with one helper
per pair that can succeed.
The pairs behave as follows:

- value × anything: match the other side against the value.
- function × function: equal signatures, arguments unify pairwise.
- function × variable: an unbound variable binds to the function after
  an occurs check (`X` never unifies with `f(X)`); a bound one unifies
  through its content.
- function × linear: never.
- linear × linear, linear × unbound variable: succeed *without*
  binding.
  This over-approximates --- solving would need rationals --- and is
  sound because every candidate the binder produces is re-matched.
- variable × variable: bound cells unify through their content; two
  empty cells of different names alias one to the other.
*/

mod lookup;
pub use lookup::Lookup;

use crate::structures::{
    symbol::{NameId, Sig, Symbol, SymbolStore},
    term::{CellArena, CellKey, CellValue, Term, TermKind},
};

/// The matcher-side mirror of a term.
#[derive(Clone, Debug)]
pub enum GTerm {
    /// A ground value.
    Val(Symbol),

    /// A variable: its name and its shared cell.
    Var {
        /// The variable's name; structural identity of mirrors goes by name.
        name: NameId,
        /// The shared cell.
        cell: CellKey,
    },

    /// `m·X + n` over a shared cell.
    Linear {
        /// The variable's name.
        name: NameId,
        /// The shared cell.
        cell: CellKey,
        /// The coefficient, never zero.
        m: i32,
        /// The offset.
        n: i32,
    },

    /// A function with mirrored arguments.
    Fun {
        /// The interned name.
        name: NameId,
        /// Classical negation sign.
        sign: bool,
        /// Mirrored arguments.
        args: Vec<GTerm>,
    },
}

/// Mirror a term, sharing its cells.
///
/// Only value, variable, linear and function terms survive rewriting
/// into match positions; anything else here is a pipeline defect.
pub fn gterm(term: &Term) -> GTerm {
    match &term.kind {
        TermKind::Value(symbol) => GTerm::Val(*symbol),
        TermKind::Var(v) => GTerm::Var {
            name: v.name,
            cell: v.cell,
        },
        TermKind::Linear { var, m, n } => GTerm::Linear {
            name: var.name,
            cell: var.cell,
            m: *m,
            n: *n,
        },
        TermKind::Fun { name, sign, args } => GTerm::Fun {
            name: *name,
            sign: *sign,
            args: args.iter().map(gterm).collect(),
        },
        _ => unreachable!("only value, variable, linear and function terms are matched"),
    }
}

impl GTerm {
    /// The signature, for functions and function values.
    pub fn sig(&self, store: &SymbolStore) -> Option<Sig> {
        match self {
            GTerm::Val(symbol) => store.sig(*symbol),
            GTerm::Fun { name, sign, args } => Some(Sig {
                name: *name,
                arity: args.len() as u32,
                sign: *sign,
            }),
            _ => None,
        }
    }

    /// The term's value, if it is ground outright.
    pub fn value(&self) -> Option<Symbol> {
        match self {
            GTerm::Val(symbol) => Some(*symbol),
            _ => None,
        }
    }

    /// True if the cell occurs (transitively) within the term.
    pub fn occurs(&self, key: CellKey, cells: &CellArena) -> bool {
        match self {
            GTerm::Val(_) => false,
            GTerm::Var { cell, .. } | GTerm::Linear { cell, .. } => match cells.get(*cell) {
                CellValue::Empty => *cell == key,
                CellValue::Value(_) => false,
                CellValue::Term(inner) => inner.occurs(key, cells),
            },
            GTerm::Fun { args, .. } => args.iter().any(|arg| arg.occurs(key, cells)),
        }
    }
}

/// Return every cell within `term` to the unbound state.
pub fn reset(term: &GTerm, cells: &mut CellArena) {
    match term {
        GTerm::Val(_) => {}
        GTerm::Var { cell, .. } | GTerm::Linear { cell, .. } => cells.clear(*cell),
        GTerm::Fun { args, .. } => {
            for arg in args {
                reset(arg, cells);
            }
        }
    }
}

/// Match `term` against a ground symbol, binding free cells as a side
/// effect.
///
/// On failure cells may be left partially bound; the caller resets.
pub fn match_symbol(
    term: &GTerm,
    symbol: Symbol,
    cells: &mut CellArena,
    store: &SymbolStore,
) -> bool {
    match term {
        GTerm::Val(value) => *value == symbol,

        GTerm::Var { cell, .. } => match cells.get(*cell) {
            CellValue::Empty => {
                cells.bind_value(*cell, symbol);
                true
            }
            CellValue::Value(bound) => *bound == symbol,
            CellValue::Term(inner) => {
                let inner = inner.clone();
                match_symbol(&inner, symbol, cells, store)
            }
        },

        GTerm::Linear { cell, m, n, .. } => {
            let y = match symbol {
                Symbol::Num(y) => y,
                _ => return false,
            };
            let shifted = match y.checked_sub(*n) {
                Some(shifted) => shifted,
                None => return false,
            };
            if shifted % m != 0 {
                return false;
            }
            let x = Symbol::Num(shifted / m);
            match cells.get(*cell) {
                CellValue::Empty => {
                    cells.bind_value(*cell, x);
                    true
                }
                CellValue::Value(bound) => *bound == x,
                CellValue::Term(inner) => {
                    let inner = inner.clone();
                    match_symbol(&inner, x, cells, store)
                }
            }
        }

        GTerm::Fun { name, sign, args } => {
            let sig = match store.sig(symbol) {
                Some(sig) => sig,
                None => return false,
            };
            if sig.name != *name || sig.sign != *sign || sig.arity as usize != args.len() {
                return false;
            }
            let arg_symbols: Vec<Symbol> = store.args(symbol).to_vec();
            args.iter()
                .zip(arg_symbols)
                .all(|(arg, value)| match_symbol(arg, value, cells, store))
        }
    }
}

/// Unify two partially bound mirrors.
///
/// Succeeds iff some substitution of free cells makes the two equal,
/// modulo the permissive linear cases noted in the module
/// documentation.
/// On failure cells may be left partially bound; the caller resets
/// both sides.
pub fn unify(a: &GTerm, b: &GTerm, cells: &mut CellArena, store: &SymbolStore) -> bool {
    match (a, b) {
        (GTerm::Val(value), other) | (other, GTerm::Val(value)) => {
            match_symbol(other, *value, cells, store)
        }

        (GTerm::Fun { .. }, GTerm::Linear { .. }) | (GTerm::Linear { .. }, GTerm::Fun { .. }) => {
            false
        }

        (
            GTerm::Fun { name, sign, args },
            GTerm::Fun {
                name: name_b,
                sign: sign_b,
                args: args_b,
            },
        ) => {
            name == name_b
                && sign == sign_b
                && args.len() == args_b.len()
                && args
                    .iter()
                    .zip(args_b)
                    .all(|(x, y)| unify(x, y, cells, store))
        }

        (fun @ GTerm::Fun { .. }, GTerm::Var { cell, .. })
        | (GTerm::Var { cell, .. }, fun @ GTerm::Fun { .. }) => match cells.get(*cell) {
            CellValue::Empty => {
                if fun.occurs(*cell, cells) {
                    return false;
                }
                cells.bind_term(*cell, fun.clone());
                true
            }
            CellValue::Value(bound) => {
                let bound = *bound;
                match_symbol(fun, bound, cells, store)
            }
            CellValue::Term(inner) => {
                let inner = inner.clone();
                unify(&inner, fun, cells, store)
            }
        },

        // Solving these would require rationals; unify too much instead
        // and let the binder re-match.
        (GTerm::Linear { .. }, GTerm::Linear { .. }) => true,

        (linear @ GTerm::Linear { .. }, GTerm::Var { cell, .. })
        | (GTerm::Var { cell, .. }, linear @ GTerm::Linear { .. }) => match cells.get(*cell) {
            CellValue::Empty => true,
            CellValue::Value(bound) => {
                let bound = *bound;
                match_symbol(linear, bound, cells, store)
            }
            CellValue::Term(inner) => {
                let inner = inner.clone();
                unify(&inner, linear, cells, store)
            }
        },

        (GTerm::Var { name, cell }, GTerm::Var { name: name_b, cell: cell_b }) => {
            match cells.get(*cell) {
                CellValue::Value(bound) => {
                    let bound = *bound;
                    match_symbol(b, bound, cells, store)
                }
                CellValue::Term(inner) => {
                    let inner = inner.clone();
                    unify(&inner, b, cells, store)
                }
                CellValue::Empty => match cells.get(*cell_b) {
                    CellValue::Value(bound) => {
                        let bound = *bound;
                        cells.bind_value(*cell, bound);
                        true
                    }
                    CellValue::Term(inner) => {
                        let inner = inner.clone();
                        unify(a, &inner, cells, store)
                    }
                    CellValue::Empty => {
                        if name != name_b {
                            cells.bind_term(*cell, b.clone());
                        }
                        true
                    }
                },
            }
        }
    }
}

/// Structural equality of mirrors: values by symbol, variables and
/// linear terms by name, functions by signature and arguments.
pub fn struct_eq(a: &GTerm, b: &GTerm) -> bool {
    match (a, b) {
        (GTerm::Val(x), GTerm::Val(y)) => x == y,
        (GTerm::Var { name: x, .. }, GTerm::Var { name: y, .. }) => x == y,
        (
            GTerm::Linear { name: x, m, n, .. },
            GTerm::Linear {
                name: y,
                m: m_b,
                n: n_b,
                ..
            },
        ) => x == y && m == m_b && n == n_b,
        (
            GTerm::Fun { name, sign, args },
            GTerm::Fun {
                name: name_b,
                sign: sign_b,
                args: args_b,
            },
        ) => {
            name == name_b
                && sign == sign_b
                && args.len() == args_b.len()
                && args.iter().zip(args_b).all(|(x, y)| struct_eq(x, y))
        }
        _ => false,
    }
}

/// A structural hash agreeing with [struct_eq].
pub fn struct_hash(term: &GTerm) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = rustc_hash::FxHasher::default();
    hash_into(term, &mut hasher);
    hasher.finish()
}

fn hash_into(term: &GTerm, hasher: &mut impl std::hash::Hasher) {
    use std::hash::Hash;
    match term {
        GTerm::Val(symbol) => {
            0u8.hash(hasher);
            symbol.hash(hasher);
        }
        GTerm::Var { name, .. } => {
            1u8.hash(hasher);
            name.hash(hasher);
        }
        GTerm::Linear { name, m, n, .. } => {
            2u8.hash(hasher);
            name.hash(hasher);
            m.hash(hasher);
            n.hash(hasher);
        }
        GTerm::Fun { name, sign, args } => {
            3u8.hash(hasher);
            name.hash(hasher);
            sign.hash(hasher);
            args.len().hash(hasher);
            for arg in args {
                hash_into(arg, hasher);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        store: SymbolStore,
        cells: CellArena,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                store: SymbolStore::default(),
                cells: CellArena::default(),
            }
        }

        fn var(&mut self, name: &str) -> GTerm {
            GTerm::Var {
                name: self.store.name(name),
                cell: self.cells.alloc(),
            }
        }
    }

    #[test]
    fn match_function() {
        let mut fx = Fixture::new();
        let x = fx.var("X");
        let f = fx.store.name("f");
        let pattern = GTerm::Fun {
            name: f,
            sign: false,
            args: vec![GTerm::Val(fx.store.num(1)), x.clone()],
        };
        let one = fx.store.num(1);
        let two = fx.store.num(2);
        let f12 = fx.store.fun(f, vec![one, two], false);
        assert!(match_symbol(&pattern, f12, &mut fx.cells, &fx.store));
        let cell = match &x {
            GTerm::Var { cell, .. } => *cell,
            _ => unreachable!(),
        };
        assert_eq!(fx.cells.value(cell), Some(two));

        // A second match against a conflicting symbol fails on the bound cell.
        let three = fx.store.num(3);
        let f13 = fx.store.fun(f, vec![one, three], false);
        assert!(!match_symbol(&pattern, f13, &mut fx.cells, &fx.store));
        reset(&pattern, &mut fx.cells);
        assert!(match_symbol(&pattern, f13, &mut fx.cells, &fx.store));
    }

    #[test]
    fn linear_match_requires_divisibility() {
        let mut fx = Fixture::new();
        let cell = fx.cells.alloc();
        let name = fx.store.name("X");
        let pattern = GTerm::Linear {
            name,
            cell,
            m: 2,
            n: 1,
        };
        // 2X + 1 = 7 gives X = 3.
        assert!(match_symbol(&pattern, fx.store.num(7), &mut fx.cells, &fx.store));
        assert_eq!(fx.cells.value(cell), Some(Symbol::Num(3)));
        fx.cells.clear(cell);
        // 2X + 1 = 6 has no integer solution.
        assert!(!match_symbol(&pattern, fx.store.num(6), &mut fx.cells, &fx.store));
    }

    #[test]
    fn unify_function_against_variable() {
        let mut fx = Fixture::new();
        let x = fx.var("X");
        let y = fx.var("Y");
        let f = fx.store.name("f");
        let fun = GTerm::Fun {
            name: f,
            sign: false,
            args: vec![y.clone()],
        };
        assert!(unify(&x, &fun, &mut fx.cells, &fx.store));
        // X is now f(Y); matching X against f(1) grounds Y.
        let one = fx.store.num(1);
        let f1 = fx.store.fun(f, vec![one], false);
        assert!(match_symbol(&x, f1, &mut fx.cells, &fx.store));
        let y_cell = match &y {
            GTerm::Var { cell, .. } => *cell,
            _ => unreachable!(),
        };
        assert_eq!(fx.cells.value(y_cell), Some(one));
    }

    #[test]
    fn occurs_check_rejects_cyclic_binding() {
        let mut fx = Fixture::new();
        let x = fx.var("X");
        let f = fx.store.name("f");
        let f_x = GTerm::Fun {
            name: f,
            sign: false,
            args: vec![x.clone()],
        };
        assert!(!unify(&x, &f_x, &mut fx.cells, &fx.store));
    }

    #[test]
    fn var_var_aliasing() {
        let mut fx = Fixture::new();
        let x = fx.var("X");
        let y = fx.var("Y");
        assert!(unify(&x, &y, &mut fx.cells, &fx.store));
        let one = fx.store.num(1);
        assert!(match_symbol(&x, one, &mut fx.cells, &fx.store));
        assert!(match_symbol(&y, one, &mut fx.cells, &fx.store));
        let two = fx.store.num(2);
        assert!(!match_symbol(&y, two, &mut fx.cells, &fx.store));
    }

    #[test]
    fn linear_unification_is_permissive() {
        let mut fx = Fixture::new();
        let a = fx.cells.alloc();
        let b = fx.cells.alloc();
        let x = fx.store.name("X");
        let y = fx.store.name("Y");
        let la = GTerm::Linear {
            name: x,
            cell: a,
            m: 2,
            n: 0,
        };
        let lb = GTerm::Linear {
            name: y,
            cell: b,
            m: 2,
            n: 1,
        };
        // 2X and 2Y + 1 never meet over the integers, yet unify: the
        // over-approximation is resolved by re-matching.
        assert!(unify(&la, &lb, &mut fx.cells, &fx.store));
        assert!(!fx.cells.is_bound(a));
        assert!(!fx.cells.is_bound(b));
    }
}
