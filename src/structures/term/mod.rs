/*!
Terms --- the non-ground expressions of a program.

A term is a tagged variant: a ground [value](TermKind::Value), a
[variable](TermKind::Var), a canonicalised [linear](TermKind::Linear)
expression `m·X + n`, unary and binary arithmetic, a
[range](TermKind::Range) `l..r`, a [function](TermKind::Fun), a
[pool](TermKind::Pool) `(a; b)`, or an external
[script call](TermKind::Script).

The original design dispatches operations virtually over a term class
hierarchy; here every operation is a function matching on the variant,
and the capabilities of a term (simplification, arithmetic lifting,
evaluation, variable collection) live in this module and its
submodules.

# Variables and cells

Within a rule, all occurrences of one variable name share a single
*cell* --- a mutable slot the instantiator writes matched values into.
Cells live in an arena owned by the grounder and are addressed by
[CellKey], so cloning a term aliases the cells of the original, which
is intentional: a clone of a rule grounds against the same bindings.

After the [rewriter](crate::rewrite) no [Pool](TermKind::Pool),
[Range](TermKind::Range) or [Script](TermKind::Script) remains inside
a rule; each has been replaced by an auxiliary variable plus an
associated body literal.
*/

mod arith;
mod simplify;

pub use arith::{invertibility, rewrite_arithmetics, ArithLift, Invertibility};
pub use simplify::{simplify, AuxGen, AuxKind, Simplified, SimplifyEnv, SimplifyState};

use crate::{
    reports::Location,
    structures::symbol::{NameId, Symbol, SymbolStore},
    types::err::EvalError,
};

slotmap::new_key_type! {
    /// The identity of a variable cell: its key in the cell arena.
    pub struct CellKey;
}

/// A unary arithmetic operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnOp {
    /// `-x`.
    Neg,

    /// `~x`, bitwise complement.
    Not,

    /// `|x|`.
    Abs,
}

/// A binary arithmetic operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    /// `x ^ y`, bitwise exclusive or.
    Xor,

    /// `x ? y`, bitwise or.
    Or,

    /// `x & y`, bitwise and.
    And,

    /// `x + y`.
    Add,

    /// `x - y`.
    Sub,

    /// `x * y`.
    Mul,

    /// `x / y`, integer division.
    Div,

    /// `x \ y`, integer modulo.
    Mod,

    /// `x ** y`, integer power.
    Pow,
}

impl std::fmt::Display for UnOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnOp::Neg => write!(f, "-"),
            UnOp::Not => write!(f, "~"),
            UnOp::Abs => write!(f, "#abs"),
        }
    }
}

impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinOp::Xor => write!(f, "^"),
            BinOp::Or => write!(f, "?"),
            BinOp::And => write!(f, "&"),
            BinOp::Add => write!(f, "+"),
            BinOp::Sub => write!(f, "-"),
            BinOp::Mul => write!(f, "*"),
            BinOp::Div => write!(f, "/"),
            BinOp::Mod => write!(f, "\\"),
            BinOp::Pow => write!(f, "**"),
        }
    }
}

/// A variable occurrence: name, quantification level, shared cell, bind flag.
///
/// The level is zero for rule-level variables and one inside the
/// condition of an aggregate element or conditional literal.
/// The bind flag marks occurrences the instantiator may write through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VarTerm {
    /// The interned name of the variable.
    pub name: NameId,

    /// The quantification depth of the occurrence.
    pub level: u32,

    /// The cell shared among occurrences of this variable in one rule.
    pub cell: CellKey,

    /// Whether the instantiator may bind through this occurrence.
    pub bind: bool,
}

/// The variants of a term.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TermKind {
    /// A ground value.
    Value(Symbol),

    /// A variable.
    Var(VarTerm),

    /// `m·X + n`, the canonical arithmetic form over one variable.
    Linear {
        /// The variable.
        var: VarTerm,
        /// The coefficient.
        m: i32,
        /// The offset.
        n: i32,
    },

    /// A unary operation.
    Unary(UnOp, Box<Term>),

    /// A binary operation.
    Binary(BinOp, Box<Term>, Box<Term>),

    /// `l..r`; rewritten away before instantiation.
    Range(Box<Term>, Box<Term>),

    /// A function, e.g. `f(X, 1)`, or a tuple when the name is empty.
    Fun {
        /// The interned function name.
        name: NameId,
        /// Whether the function is classically negated.
        sign: bool,
        /// The argument terms.
        args: Vec<Term>,
    },

    /// `(a; b; c)`; rewritten away by unpooling.
    Pool(Vec<Term>),

    /// `@name(args)`; rewritten away into an auxiliary binding.
    Script {
        /// The interned script name.
        name: NameId,
        /// The argument terms.
        args: Vec<Term>,
    },
}

/// A term: a variant tagged with its source location.
#[derive(Clone, Debug)]
pub struct Term {
    /// Where the term was written.
    pub loc: Location,

    /// The variant.
    pub kind: TermKind,
}

// Structural equality; locations are not part of a term's identity.
impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Term {}

impl Term {
    /// A value term.
    pub fn value(loc: Location, symbol: Symbol) -> Self {
        Term {
            loc,
            kind: TermKind::Value(symbol),
        }
    }

    /// A variable term.
    pub fn var(loc: Location, var: VarTerm) -> Self {
        Term {
            loc,
            kind: TermKind::Var(var),
        }
    }

    /// True if any variable occurs in the term.
    pub fn has_var(&self) -> bool {
        match &self.kind {
            TermKind::Value(_) => false,
            TermKind::Var(_) | TermKind::Linear { .. } => true,
            TermKind::Unary(_, a) => a.has_var(),
            TermKind::Binary(_, a, b) => a.has_var() || b.has_var(),
            TermKind::Range(a, b) => a.has_var() || b.has_var(),
            TermKind::Fun { args, .. } | TermKind::Script { args, .. } => {
                args.iter().any(Term::has_var)
            }
            TermKind::Pool(alts) => alts.iter().any(Term::has_var),
        }
    }

    /// True if a pool occurs anywhere in the term.
    pub fn has_pool(&self) -> bool {
        match &self.kind {
            TermKind::Pool(_) => true,
            TermKind::Value(_) | TermKind::Var(_) | TermKind::Linear { .. } => false,
            TermKind::Unary(_, a) => a.has_pool(),
            TermKind::Binary(_, a, b) => a.has_pool() || b.has_pool(),
            TermKind::Range(a, b) => a.has_pool() || b.has_pool(),
            TermKind::Fun { args, .. } | TermKind::Script { args, .. } => {
                args.iter().any(Term::has_pool)
            }
        }
    }

    /// Collect every variable occurrence into `out`.
    ///
    /// `binding` marks whether the surrounding position lets the
    /// instantiator bind the variable, e.g. an argument of a positive
    /// body atom does, the side of a comparison does not.
    pub fn collect_vars(&self, binding: bool, out: &mut Vec<(VarTerm, bool)>) {
        match &self.kind {
            TermKind::Value(_) => {}
            TermKind::Var(v) => out.push((*v, binding)),
            TermKind::Linear { var, .. } => out.push((*var, binding)),
            TermKind::Unary(_, a) => a.collect_vars(false, out),
            TermKind::Binary(_, a, b) | TermKind::Range(a, b) => {
                a.collect_vars(false, out);
                b.collect_vars(false, out);
            }
            TermKind::Fun { args, .. } => {
                for arg in args {
                    arg.collect_vars(binding, out);
                }
            }
            TermKind::Script { args, .. } => {
                for arg in args {
                    arg.collect_vars(false, out);
                }
            }
            TermKind::Pool(alts) => {
                for alt in alts {
                    alt.collect_vars(false, out);
                }
            }
        }
    }

    /// Collect the identifiers occurring in value positions.
    ///
    /// These are the candidate references to `#const` definitions.
    pub fn collect_ids(&self, store: &SymbolStore, out: &mut Vec<NameId>) {
        match &self.kind {
            TermKind::Value(symbol) => {
                if let Some(sig) = store.sig(*symbol) {
                    if sig.arity == 0 && !sig.sign {
                        out.push(sig.name);
                    }
                }
            }
            TermKind::Var(_) | TermKind::Linear { .. } => {}
            TermKind::Unary(_, a) => a.collect_ids(store, out),
            TermKind::Binary(_, a, b) | TermKind::Range(a, b) => {
                a.collect_ids(store, out);
                b.collect_ids(store, out);
            }
            TermKind::Fun { args, .. } | TermKind::Script { args, .. } => {
                for arg in args {
                    arg.collect_ids(store, out);
                }
            }
            TermKind::Pool(alts) => {
                for alt in alts {
                    alt.collect_ids(store, out);
                }
            }
        }
    }

    /// The term as a symbol, if it is one already.
    pub fn as_value(&self) -> Option<Symbol> {
        match &self.kind {
            TermKind::Value(symbol) => Some(*symbol),
            _ => None,
        }
    }

    /// A displayable view of the term.
    pub fn display<'a>(&'a self, store: &'a SymbolStore) -> TermDisplay<'a> {
        TermDisplay { store, term: self }
    }
}

/// The state of a variable cell during matching.
#[derive(Clone, Debug, Default)]
pub enum CellValue {
    /// Unbound.
    #[default]
    Empty,

    /// Bound to a ground value.
    Value(Symbol),

    /// Bound to a (possibly non-ground) term of the opposite side of a
    /// unification.
    Term(crate::matcher::GTerm),
}

/// The arena of variable cells.
///
/// Cells are allocated per variable per rule and addressed by
/// [CellKey]; the key is the cell's identity, so aliasing a cell is
/// copying its key.
#[derive(Default)]
pub struct CellArena {
    cells: slotmap::SlotMap<CellKey, CellValue>,
}

impl CellArena {
    /// Allocate a fresh, unbound cell.
    pub fn alloc(&mut self) -> CellKey {
        self.cells.insert(CellValue::Empty)
    }

    /// The current state of a cell.
    pub fn get(&self, key: CellKey) -> &CellValue {
        &self.cells[key]
    }

    /// The ground value of a cell, if bound to one.
    pub fn value(&self, key: CellKey) -> Option<Symbol> {
        match &self.cells[key] {
            CellValue::Value(symbol) => Some(*symbol),
            _ => None,
        }
    }

    /// Bind a cell to a ground value.
    pub fn bind_value(&mut self, key: CellKey, symbol: Symbol) {
        self.cells[key] = CellValue::Value(symbol);
    }

    /// Bind a cell to a term.
    pub fn bind_term(&mut self, key: CellKey, term: crate::matcher::GTerm) {
        self.cells[key] = CellValue::Term(term);
    }

    /// Return a cell to the unbound state.
    pub fn clear(&mut self, key: CellKey) {
        self.cells[key] = CellValue::Empty;
    }

    /// True if the cell is bound, to a value or to a term.
    pub fn is_bound(&self, key: CellKey) -> bool {
        !matches!(self.cells[key], CellValue::Empty)
    }
}

/// Evaluate `op` over a number, or nothing where undefined.
pub fn eval_unary(op: UnOp, x: i32) -> Option<i32> {
    match op {
        UnOp::Neg => x.checked_neg(),
        UnOp::Abs => x.checked_abs(),
        UnOp::Not => Some(!x),
    }
}

/// Evaluate `op` over two numbers, or nothing where undefined.
///
/// Division and modulo by zero, a zero base under a negative exponent,
/// and any overflow out of the 32 bit range are undefined.
pub fn eval_binary(op: BinOp, x: i32, y: i32) -> Option<i32> {
    match op {
        BinOp::Xor => Some(x ^ y),
        BinOp::Or => Some(x | y),
        BinOp::And => Some(x & y),
        BinOp::Add => x.checked_add(y),
        BinOp::Sub => x.checked_sub(y),
        BinOp::Mul => x.checked_mul(y),
        BinOp::Div => {
            if y == 0 {
                None
            } else {
                x.checked_div(y)
            }
        }
        BinOp::Mod => {
            if y == 0 {
                None
            } else {
                x.checked_rem(y)
            }
        }
        BinOp::Pow => ipow(x, y),
    }
}

/// Integer power by squaring; negative exponents collapse to zero,
/// except over a zero base, which is undefined.
fn ipow(mut a: i32, mut b: i32) -> Option<i32> {
    if b < 0 {
        return if a == 0 { None } else { Some(0) };
    }
    let mut r: i32 = 1;
    while b > 0 {
        if b & 1 != 0 {
            r = r.checked_mul(a)?;
        }
        b >>= 1;
        if b > 0 {
            a = a.checked_mul(a)?;
        }
    }
    Some(r)
}

impl Term {
    /// Evaluate the term to a symbol under the bindings in `cells`.
    ///
    /// Undefined operations --- arithmetic on a non-number, division by
    /// zero, overflow, an unbound variable --- yield
    /// [EvalError::Undefined]; the caller decides whether that drops a
    /// literal or warrants a warning.
    pub fn eval(&self, cells: &CellArena, store: &mut SymbolStore) -> Result<Symbol, EvalError> {
        match &self.kind {
            TermKind::Value(symbol) => Ok(*symbol),
            TermKind::Var(v) => cells.value(v.cell).ok_or(EvalError::Undefined),
            TermKind::Linear { var, m, n } => {
                let x = match cells.value(var.cell) {
                    Some(Symbol::Num(x)) => x,
                    _ => return Err(EvalError::Undefined),
                };
                m.checked_mul(x)
                    .and_then(|mx| mx.checked_add(*n))
                    .map(Symbol::Num)
                    .ok_or(EvalError::Undefined)
            }
            TermKind::Unary(op, a) => match a.eval(cells, store)? {
                Symbol::Num(x) => eval_unary(*op, x).map(Symbol::Num).ok_or(EvalError::Undefined),
                // Classical negation of a function value.
                symbol @ Symbol::Fun(_) if *op == UnOp::Neg => {
                    store.negate(symbol).ok_or(EvalError::Undefined)
                }
                _ => Err(EvalError::Undefined),
            },
            TermKind::Binary(op, a, b) => {
                let (x, y) = match (a.eval(cells, store)?, b.eval(cells, store)?) {
                    (Symbol::Num(x), Symbol::Num(y)) => (x, y),
                    _ => return Err(EvalError::Undefined),
                };
                eval_binary(*op, x, y).map(Symbol::Num).ok_or(EvalError::Undefined)
            }
            TermKind::Fun { name, sign, args } => {
                let mut symbols = Vec::with_capacity(args.len());
                for arg in args {
                    symbols.push(arg.eval(cells, store)?);
                }
                Ok(store.fun(*name, symbols, *sign))
            }
            // Gone after rewriting; nothing evaluates them before.
            TermKind::Range(..) | TermKind::Pool(_) | TermKind::Script { .. } => {
                unreachable!("range, pool and script terms are rewritten away")
            }
        }
    }
}

/// A term paired with its store for printing.
pub struct TermDisplay<'a> {
    store: &'a SymbolStore,
    term: &'a Term,
}

impl std::fmt::Display for TermDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.store;
        match &self.term.kind {
            TermKind::Value(symbol) => write!(f, "{}", store.display(*symbol)),
            TermKind::Var(v) => write!(f, "{}", store.resolve(v.name)),
            TermKind::Linear { var, m, n } => {
                write!(f, "({m}*{}+{n})", store.resolve(var.name))
            }
            TermKind::Unary(UnOp::Abs, a) => write!(f, "|{}|", a.display(store)),
            TermKind::Unary(op, a) => write!(f, "{op}({})", a.display(store)),
            TermKind::Binary(op, a, b) => {
                write!(f, "({}{op}{})", a.display(store), b.display(store))
            }
            TermKind::Range(a, b) => write!(f, "({}..{})", a.display(store), b.display(store)),
            TermKind::Fun { name, sign, args } => {
                if *sign {
                    write!(f, "-")?;
                }
                let name = store.resolve(*name);
                write!(f, "{name}")?;
                if !args.is_empty() || name.is_empty() {
                    write!(f, "(")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ",")?;
                        }
                        write!(f, "{}", arg.display(store))?;
                    }
                    write!(f, ")")?;
                }
                Ok(())
            }
            TermKind::Pool(alts) => {
                write!(f, "(")?;
                for (i, alt) in alts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ";")?;
                    }
                    write!(f, "{}", alt.display(store))?;
                }
                write!(f, ")")
            }
            TermKind::Script { name, args } => {
                write!(f, "@{}(", store.resolve(*name))?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", arg.display(store))?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_arithmetic_edges() {
        assert_eq!(eval_binary(BinOp::Add, 2, 3), Some(5));
        assert_eq!(eval_binary(BinOp::Div, 7, 0), None);
        assert_eq!(eval_binary(BinOp::Mod, 7, 0), None);
        assert_eq!(eval_binary(BinOp::Add, i32::MAX, 1), None);
        assert_eq!(eval_binary(BinOp::Mul, i32::MAX, 2), None);
        assert_eq!(eval_binary(BinOp::Mod, 7, 2), Some(1));
        assert_eq!(eval_binary(BinOp::Div, -7, 2), Some(-3));
    }

    #[test]
    fn power_edges() {
        assert_eq!(eval_binary(BinOp::Pow, 2, 10), Some(1024));
        assert_eq!(eval_binary(BinOp::Pow, 2, -1), Some(0));
        assert_eq!(eval_binary(BinOp::Pow, 0, -1), None);
        assert_eq!(eval_binary(BinOp::Pow, 0, 0), Some(1));
        assert_eq!(eval_binary(BinOp::Pow, -2, 3), Some(-8));
        assert_eq!(eval_binary(BinOp::Pow, 2, 31), None);
    }

    #[test]
    fn clone_shares_cells() {
        let mut store = SymbolStore::default();
        let mut cells = CellArena::default();
        let file = store.name("t");
        let loc = crate::reports::Location::new(file, (1, 1), (1, 1));
        let x = VarTerm {
            name: store.name("X"),
            level: 0,
            cell: cells.alloc(),
            bind: true,
        };
        let term = Term::var(loc, x);
        let clone = term.clone();
        cells.bind_value(x.cell, store.num(42));
        let a = term.eval(&cells, &mut store).unwrap();
        let b = clone.eval(&cells, &mut store).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, store.num(42));
    }

    #[test]
    fn eval_builds_functions() {
        let mut store = SymbolStore::default();
        let cells = CellArena::default();
        let file = store.name("t");
        let loc = crate::reports::Location::new(file, (1, 1), (1, 1));
        let f = store.name("f");
        let term = Term {
            loc,
            kind: TermKind::Fun {
                name: f,
                sign: false,
                args: vec![
                    Term::value(loc, store.num(1)),
                    Term {
                        loc,
                        kind: TermKind::Binary(
                            BinOp::Add,
                            Box::new(Term::value(loc, store.num(2))),
                            Box::new(Term::value(loc, store.num(3))),
                        ),
                    },
                ],
            },
        };
        let five = store.num(5);
        let one = store.num(1);
        let expected = store.fun(f, vec![one, five], false);
        assert_eq!(term.eval(&cells, &mut store), Ok(expected));
    }
}
