/*!
Binder runtime --- lazy candidate streams for scheduled literals.

Each scheduled literal owns a [Cursor].
Advancing a cursor first returns the cells it bound on the previous
candidate to the empty state, then tries the next candidate, so the
nested-loop join of the instantiator can re-enter any binder at any
time.

A scan binder enumerates a slice of a domain's definition order --- the
window the semi-naive loop assigned it --- and falls back to a single
point lookup when its pattern happens to be ground already.
Relation, range and script binders evaluate rather than match; a
relation whose left side is a bindable variable acts as an assignment.
*/

use crate::{
    analysis::{
        inequalities::{BoundType, IeBoundMap},
        intervals::IntervalSet,
    },
    db::DomainStore,
    matcher::{match_symbol, GTerm},
    structures::{
        literal::Relation,
        symbol::{Sig, Symbol, SymbolStore},
        term::{CellArena, CellKey, CellValue, Term, TermKind, VarTerm},
    },
};

/// A half-open slice of a domain's definition order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    /// First definition-order position, inclusive.
    pub start: usize,

    /// Last definition-order position, exclusive.
    pub end: usize,
}

impl Window {
    /// The window over everything defined before `end`.
    pub fn all(end: usize) -> Self {
        Window { start: 0, end }
    }

    /// True if the position lies inside.
    pub fn contains(&self, at: usize) -> bool {
        self.start <= at && at < self.end
    }
}

/// The cells of a pattern that are currently unbound; those are the
/// ones a match may write, and the ones an undo must clear.
pub fn owned_cells(pattern: &GTerm, cells: &CellArena) -> Vec<CellKey> {
    let mut owned = Vec::new();
    collect_cells(pattern, cells, &mut owned);
    owned.sort_unstable();
    owned.dedup();
    owned
}

fn collect_cells(pattern: &GTerm, cells: &CellArena, out: &mut Vec<CellKey>) {
    match pattern {
        GTerm::Val(_) => {}
        GTerm::Var { cell, .. } | GTerm::Linear { cell, .. } => {
            if matches!(cells.get(*cell), CellValue::Empty) {
                out.push(*cell);
            }
        }
        GTerm::Fun { args, .. } => {
            for arg in args {
                collect_cells(arg, cells, out);
            }
        }
    }
}

/// Clear a set of owned cells.
pub fn clear_cells(owned: &[CellKey], cells: &mut CellArena) {
    for &cell in owned {
        cells.clear(cell);
    }
}

/// The per-candidate state of a scan binder.
#[derive(Debug)]
pub struct ScanCursor {
    /// Next definition-order position to try.
    pub at: usize,

    /// End of the window.
    pub end: usize,

    /// The cells this binder may write.
    pub owned: Vec<CellKey>,

    /// The emitter literal of the current candidate; `None` for facts.
    pub lit: Option<i32>,
}

/// Start a scan over `window`, taking the ground fast path when the
/// pattern evaluates outright.
pub fn start_scan(
    sig: Sig,
    atom: &Term,
    window: Window,
    cells: &mut CellArena,
    domains: &DomainStore,
    store: &mut SymbolStore,
    pattern: &GTerm,
) -> ScanCursor {
    let end = match domains.domain(sig) {
        Some(domain) => window.end.min(domain.defined_count()),
        None => 0,
    };
    if let Ok(symbol) = atom.eval(cells, store) {
        // Ground already: a point membership test.
        let hit = domains.domain(sig).and_then(|domain| {
            let offset = domain.offset_of(symbol)?;
            let data = domain.atom(offset);
            if data.defined
                && window.start <= data.defined_at as usize
                && (data.defined_at as usize) < end
            {
                Some(if data.fact { None } else { Some(data.uid as i32) })
            } else {
                None
            }
        });
        return match hit {
            Some(lit) => ScanCursor {
                // One candidate: sit right before the end marker.
                at: usize::MAX - 1,
                end: usize::MAX,
                owned: Vec::new(),
                lit,
            },
            None => ScanCursor {
                at: 0,
                end: 0,
                owned: Vec::new(),
                lit: None,
            },
        };
    }
    ScanCursor {
        at: window.start,
        end,
        owned: owned_cells(pattern, cells),
        lit: None,
    }
}

/// Advance a scan to its next matching candidate.
pub fn advance_scan(
    cursor: &mut ScanCursor,
    sig: Sig,
    pattern: &GTerm,
    cells: &mut CellArena,
    domains: &DomainStore,
    store: &SymbolStore,
) -> bool {
    clear_cells(&cursor.owned, cells);
    if cursor.end == usize::MAX {
        // Point mode: a single pre-computed candidate.
        if cursor.at == usize::MAX - 1 {
            cursor.at = usize::MAX;
            return true;
        }
        return false;
    }
    let domain = match domains.domain(sig) {
        Some(domain) => domain,
        None => return false,
    };
    while cursor.at < cursor.end {
        let data = domain.defined_at(cursor.at);
        cursor.at += 1;
        clear_cells(&cursor.owned, cells);
        if match_symbol(pattern, data.symbol, cells, store) {
            cursor.lit = if data.fact {
                None
            } else {
                Some(data.uid as i32)
            };
            return true;
        }
    }
    clear_cells(&cursor.owned, cells);
    false
}

/// The outcome of evaluating a relation binder.
pub enum RelationOutcome {
    /// The relation holds; the cell, if any, was bound by it.
    Holds(Option<CellKey>),

    /// The relation does not hold.
    Fails,

    /// A side of the relation has no defined value.
    Undefined,
}

/// Evaluate a relation, binding the left side when it assigns.
pub fn eval_relation(
    rel: Relation,
    left: &Term,
    right: &Term,
    assign: bool,
    cells: &mut CellArena,
    store: &mut SymbolStore,
) -> RelationOutcome {
    let rhs = match right.eval(cells, store) {
        Ok(symbol) => symbol,
        Err(_) => return RelationOutcome::Undefined,
    };
    if assign && rel == Relation::Eq {
        match &left.kind {
            TermKind::Var(v) if !cells.is_bound(v.cell) => {
                cells.bind_value(v.cell, rhs);
                return RelationOutcome::Holds(Some(v.cell));
            }
            TermKind::Linear { var, m, n } if !cells.is_bound(var.cell) => {
                let y = match rhs {
                    Symbol::Num(y) => y,
                    _ => return RelationOutcome::Fails,
                };
                let shifted = match y.checked_sub(*n) {
                    Some(shifted) => shifted,
                    None => return RelationOutcome::Undefined,
                };
                if shifted % m != 0 {
                    return RelationOutcome::Fails;
                }
                cells.bind_value(var.cell, Symbol::Num(shifted / m));
                return RelationOutcome::Holds(Some(var.cell));
            }
            _ => {}
        }
    }
    let lhs = match left.eval(cells, store) {
        Ok(symbol) => symbol,
        Err(_) => return RelationOutcome::Undefined,
    };
    if rel.holds(store.cmp_symbols(lhs, rhs)) {
        RelationOutcome::Holds(None)
    } else {
        RelationOutcome::Fails
    }
}

/// The per-candidate state of a range binder.
#[derive(Debug)]
pub struct RangeCursor {
    /// The values still to enumerate.
    pub values: IntervalSet,

    /// The next value to try.
    pub next: i64,

    /// The enumerated cell; `None` once in membership-test mode.
    pub cell: Option<CellKey>,
}

/// The outcome of starting a range binder.
pub enum RangeStart {
    /// Enumerate or test through the cursor.
    Cursor(RangeCursor),

    /// The range is empty or a bound has no defined value.
    Empty {
        /// True when a bound failed to evaluate to a number.
        undefined: bool,
    },
}

/// Start a range binder: evaluate the bounds, narrow the interval by
/// what the inequality solver learned, and decide between enumeration
/// and a membership test.
pub fn start_range(
    var: &VarTerm,
    lo: &Term,
    hi: &Term,
    bounds: &IeBoundMap,
    cells: &mut CellArena,
    store: &mut SymbolStore,
) -> RangeStart {
    let (lo, hi) = match (lo.eval(cells, store), hi.eval(cells, store)) {
        (Ok(Symbol::Num(lo)), Ok(Symbol::Num(hi))) => (lo as i64, hi as i64),
        _ => return RangeStart::Empty { undefined: true },
    };
    let mut values = IntervalSet::of_inclusive(lo, hi);
    if let Some(known) = bounds.get(&var.cell) {
        let lower = known.get(BoundType::Lower).map(i64::from).unwrap_or(i64::MIN);
        let upper = known.get(BoundType::Upper).map(i64::from).unwrap_or(i64::MAX);
        let mut narrowed = IntervalSet::new();
        narrowed.add(lower, upper.saturating_add(1));
        values.intersect(&narrowed);
    }
    if values.is_empty() {
        return RangeStart::Empty { undefined: false };
    }
    match cells.value(var.cell) {
        Some(Symbol::Num(value)) => {
            // Already bound: a membership test with one candidate.
            if values.contains(value as i64) {
                RangeStart::Cursor(RangeCursor {
                    values: IntervalSet::of_inclusive(value as i64, value as i64),
                    next: value as i64,
                    cell: None,
                })
            } else {
                RangeStart::Empty { undefined: false }
            }
        }
        Some(_) => RangeStart::Empty { undefined: false },
        None => RangeStart::Cursor(RangeCursor {
            next: values.front().expect("the set is not empty"),
            values,
            cell: Some(var.cell),
        }),
    }
}

/// Advance a range binder to its next value.
pub fn advance_range(cursor: &mut RangeCursor, cells: &mut CellArena) -> bool {
    if let Some(cell) = cursor.cell {
        cells.clear(cell);
    }
    let back = match cursor.values.back() {
        Some(back) => back,
        None => return false,
    };
    while cursor.next <= back {
        let value = cursor.next;
        cursor.next += 1;
        if cursor.values.contains(value) {
            if let Some(cell) = cursor.cell {
                cells.bind_value(cell, Symbol::Num(value as i32));
            }
            return true;
        }
    }
    false
}

/// The per-candidate state of a script binder.
#[derive(Debug)]
pub struct ScriptCursor {
    /// The values the call returned.
    pub values: Vec<Symbol>,

    /// The next value to try.
    pub at: usize,

    /// The bound cell; `None` once in membership-test mode.
    pub cell: Option<CellKey>,
}

/// Advance a script binder to its next returned value.
pub fn advance_script(cursor: &mut ScriptCursor, cells: &mut CellArena) -> bool {
    if let Some(cell) = cursor.cell {
        cells.clear(cell);
    }
    while cursor.at < cursor.values.len() {
        let value = cursor.values[cursor.at];
        cursor.at += 1;
        match cursor.cell {
            Some(cell) => {
                cells.bind_value(cell, value);
                return true;
            }
            None => return true,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::DomainStore, matcher::gterm, reports::Location};

    fn fixture() -> (SymbolStore, CellArena, DomainStore) {
        (
            SymbolStore::default(),
            CellArena::default(),
            DomainStore::default(),
        )
    }

    fn loc(store: &mut SymbolStore) -> Location {
        let file = store.name("t");
        Location::new(file, (1, 1), (1, 1))
    }

    #[test]
    fn scan_enumerates_window() {
        let (mut store, mut cells, mut domains) = fixture();
        let at = loc(&mut store);
        let p = store.name("p");
        let sig = Sig {
            name: p,
            arity: 1,
            sign: false,
        };
        for n in 1..=3 {
            let num = store.num(n);
            let symbol = store.fun(p, vec![num], false);
            domains.define(sig, symbol, n != 2);
        }
        let x = VarTerm {
            name: store.name("X"),
            level: 0,
            cell: cells.alloc(),
            bind: true,
        };
        let atom = Term {
            loc: at,
            kind: TermKind::Fun {
                name: p,
                sign: false,
                args: vec![Term::var(at, x)],
            },
        };
        let pattern = gterm(&atom);
        let window = Window::all(usize::MAX);
        let mut cursor = start_scan(sig, &atom, window, &mut cells, &domains, &mut store, &pattern);
        let mut seen = Vec::new();
        while advance_scan(&mut cursor, sig, &pattern, &mut cells, &domains, &store) {
            seen.push((cells.value(x.cell).unwrap(), cursor.lit));
        }
        assert_eq!(seen.len(), 3);
        // The non-fact atom contributes a literal; facts do not.
        assert_eq!(seen.iter().filter(|(_, lit)| lit.is_some()).count(), 1);
        assert!(!cells.is_bound(x.cell), "exhaustion clears the cell");
    }

    #[test]
    fn scan_point_mode_respects_windows() {
        let (mut store, mut cells, mut domains) = fixture();
        let at = loc(&mut store);
        let p = store.name("p");
        let sig = Sig {
            name: p,
            arity: 1,
            sign: false,
        };
        let one = store.num(1);
        let p1 = store.fun(p, vec![one], false);
        domains.define(sig, p1, true);
        let atom = Term {
            loc: at,
            kind: TermKind::Fun {
                name: p,
                sign: false,
                args: vec![Term::value(at, one)],
            },
        };
        let pattern = gterm(&atom);
        let window = Window::all(usize::MAX);
        let mut cursor = start_scan(sig, &atom, window, &mut cells, &domains, &mut store, &pattern);
        assert!(advance_scan(&mut cursor, sig, &pattern, &mut cells, &domains, &store));
        assert!(!advance_scan(&mut cursor, sig, &pattern, &mut cells, &domains, &store));

        // Outside the window the same atom is invisible.
        let empty = Window { start: 1, end: 1 };
        let mut cursor = start_scan(sig, &atom, empty, &mut cells, &domains, &mut store, &pattern);
        assert!(!advance_scan(&mut cursor, sig, &pattern, &mut cells, &domains, &store));
    }

    #[test]
    fn relation_assigns_and_tests() {
        let (mut store, mut cells, _) = fixture();
        let at = loc(&mut store);
        let x = VarTerm {
            name: store.name("X"),
            level: 0,
            cell: cells.alloc(),
            bind: true,
        };
        let left = Term::var(at, x);
        let right = Term::value(at, store.num(7));
        match eval_relation(Relation::Eq, &left, &right, true, &mut cells, &mut store) {
            RelationOutcome::Holds(Some(cell)) => assert_eq!(cell, x.cell),
            _ => panic!("assignment expected"),
        }
        assert_eq!(cells.value(x.cell), Some(Symbol::Num(7)));

        // Bound already: the equality tests.
        let right2 = Term::value(at, store.num(8));
        match eval_relation(Relation::Eq, &left, &right2, true, &mut cells, &mut store) {
            RelationOutcome::Fails => {}
            _ => panic!("test failure expected"),
        }
    }

    #[test]
    fn linear_assignment_requires_divisibility() {
        let (mut store, mut cells, _) = fixture();
        let at = loc(&mut store);
        let x = VarTerm {
            name: store.name("X"),
            level: 0,
            cell: cells.alloc(),
            bind: true,
        };
        let left = Term {
            loc: at,
            kind: TermKind::Linear { var: x, m: 2, n: 1 },
        };
        let right = Term::value(at, store.num(7));
        match eval_relation(Relation::Eq, &left, &right, true, &mut cells, &mut store) {
            RelationOutcome::Holds(Some(_)) => {}
            _ => panic!("assignment expected"),
        }
        assert_eq!(cells.value(x.cell), Some(Symbol::Num(3)));
        cells.clear(x.cell);

        let even = Term::value(at, store.num(6));
        match eval_relation(Relation::Eq, &left, &even, true, &mut cells, &mut store) {
            RelationOutcome::Fails => {}
            _ => panic!("divisibility failure expected"),
        }
    }

    #[test]
    fn range_enumerates_and_narrows() {
        let (mut store, mut cells, _) = fixture();
        let at = loc(&mut store);
        let x = VarTerm {
            name: store.name("X"),
            level: 0,
            cell: cells.alloc(),
            bind: true,
        };
        let lo = Term::value(at, store.num(1));
        let hi = Term::value(at, store.num(10));

        let mut bounds = IeBoundMap::default();
        let mut known = crate::analysis::inequalities::IeBound::default();
        known.set(BoundType::Lower, 3);
        known.set(BoundType::Upper, 5);
        bounds.insert(x.cell, known);

        let mut cursor = match start_range(&x, &lo, &hi, &bounds, &mut cells, &mut store) {
            RangeStart::Cursor(cursor) => cursor,
            RangeStart::Empty { .. } => panic!("non-empty range expected"),
        };
        let mut seen = Vec::new();
        while advance_range(&mut cursor, &mut cells) {
            seen.push(cells.value(x.cell).unwrap());
        }
        assert_eq!(
            seen,
            vec![Symbol::Num(3), Symbol::Num(4), Symbol::Num(5)],
            "the solver's bounds narrow the enumeration"
        );
    }
}
