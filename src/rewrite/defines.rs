/*!
`#const` definitions: collection, ordering, substitution.

Definitions form a graph: the right-hand side of each may reference
other defined constants by identifier.
The set is ordered topologically; a cycle rejects every definition on
it with a diagnostic naming all members.
Default definitions (injected by the caller, e.g. from a command line)
yield to in-program ones; a second in-program definition of one
constant is an error.

After ordering, each right-hand side is folded to a ground symbol in
dependency order, and the resulting name-to-symbol map is applied to
every term of the program --- including inside already-interned
function symbols, so `p(a)` with `#const a = 1` becomes `p(1)`.
*/

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    misc::log::targets,
    reports::{DiagnosticKind, Location, Reporter},
    structures::{
        symbol::{NameId, Symbol, SymbolStore},
        term::{CellArena, Term, TermKind},
    },
};

/// A collected definition before resolution.
#[derive(Clone, Debug)]
pub struct Define {
    /// The constant's name.
    pub name: NameId,

    /// The defining term.
    pub value: Term,

    /// Whether the definition is an overridable default.
    pub default: bool,

    /// Where the definition was written.
    pub loc: Location,
}

/// The resolved substitution: constant name to ground symbol.
#[derive(Default)]
pub struct Defines {
    map: FxHashMap<NameId, Symbol>,
}

impl Defines {
    /// The symbol a constant resolves to.
    pub fn get(&self, name: NameId) -> Option<Symbol> {
        self.map.get(&name).copied()
    }

    /// True if no constant is defined.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Collect definitions, rejecting duplicate non-defaults.
pub fn collect(raw: Vec<Define>, store: &SymbolStore, reporter: &mut Reporter) -> Vec<Define> {
    let mut by_name: FxHashMap<NameId, Define> = FxHashMap::default();
    let mut order: Vec<NameId> = Vec::new();
    for define in raw {
        match by_name.get(&define.name) {
            None => {
                order.push(define.name);
                by_name.insert(define.name, define);
            }
            Some(existing) => {
                if existing.default && !define.default {
                    by_name.insert(define.name, define);
                } else if !existing.default && !define.default {
                    reporter.error(
                        DiagnosticKind::RedefinedConstant,
                        define.loc,
                        format!("constant {} defined twice", store.resolve(define.name)),
                    );
                }
                // A later default never overrides.
            }
        }
    }
    order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect()
}

/// Order the definitions, resolve each to a symbol, and return the
/// substitution.
///
/// Cycles are reported with every member named and their definitions
/// dropped; a right-hand side that does not fold to a ground symbol is
/// reported as an undefined operation and dropped likewise.
pub fn resolve(
    defines: Vec<Define>,
    store: &mut SymbolStore,
    cells: &CellArena,
    reporter: &mut Reporter,
) -> Defines {
    let names: FxHashSet<NameId> = defines.iter().map(|d| d.name).collect();
    let index_of: FxHashMap<NameId, usize> = defines
        .iter()
        .enumerate()
        .map(|(index, d)| (d.name, index))
        .collect();

    // Edges: a define depends on the constants its value references.
    let mut depends: Vec<Vec<usize>> = Vec::with_capacity(defines.len());
    for define in &defines {
        let mut ids = Vec::new();
        define.value.collect_ids(store, &mut ids);
        let mut edges: Vec<usize> = ids
            .into_iter()
            .filter(|name| names.contains(name))
            .map(|name| index_of[&name])
            .collect();
        edges.sort_unstable();
        edges.dedup();
        depends.push(edges);
    }

    // Depth-first topological sort with cycle extraction.
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        White,
        Grey,
        Black,
        /// On a cycle; named in the diagnostic.
        Cyclic,
        /// Depends on a cycle; dropped without being named.
        Poisoned,
    }
    let mut marks = vec![Mark::White; defines.len()];
    let mut topo: Vec<usize> = Vec::with_capacity(defines.len());

    fn visit(
        at: usize,
        depends: &[Vec<usize>],
        marks: &mut [Mark],
        topo: &mut Vec<usize>,
        trail: &mut Vec<usize>,
    ) -> bool {
        match marks[at] {
            Mark::Black => return true,
            Mark::Cyclic | Mark::Poisoned => return false,
            Mark::Grey => {
                // Everything from the first visit of `at` is on the cycle.
                let from = trail.iter().position(|&t| t == at).unwrap_or(0);
                for &member in &trail[from..] {
                    marks[member] = Mark::Cyclic;
                }
                return false;
            }
            Mark::White => {}
        }
        marks[at] = Mark::Grey;
        trail.push(at);
        let mut ok = true;
        for &next in &depends[at] {
            ok &= visit(next, depends, marks, topo, trail);
        }
        trail.pop();
        if marks[at] == Mark::Grey {
            marks[at] = if ok { Mark::Black } else { Mark::Poisoned };
        }
        if marks[at] == Mark::Black {
            topo.push(at);
            true
        } else {
            false
        }
    }

    let mut trail = Vec::new();
    for at in 0..defines.len() {
        visit(at, &depends, &mut marks, &mut topo, &mut trail);
    }

    let cyclic: Vec<usize> = (0..defines.len())
        .filter(|&i| marks[i] == Mark::Cyclic)
        .collect();
    if !cyclic.is_empty() {
        let members = cyclic
            .iter()
            .map(|&i| store.resolve(defines[i].name).to_string())
            .collect::<Vec<_>>()
            .join(", ");
        reporter.error(
            DiagnosticKind::CyclicDefine,
            defines[cyclic[0]].loc,
            format!("cyclic constant definitions: {members}"),
        );
    }

    // Fold the right-hand sides in dependency order.
    let mut resolved = Defines::default();
    for at in topo {
        let define = &defines[at];
        let mut value = define.value.clone();
        substitute_term(&mut value, &resolved, store, reporter);
        match value.eval(cells, store) {
            Ok(symbol) => {
                log::debug!(target: targets::DEFINES, "resolved a constant definition");
                resolved.map.insert(define.name, symbol);
            }
            Err(_) => {
                reporter.warn(
                    DiagnosticKind::OperationUndefined,
                    define.loc,
                    format!(
                        "definition of {} does not evaluate",
                        store.resolve(define.name)
                    ),
                );
            }
        }
    }
    resolved
}

/// Substitute constants inside a ground symbol, rebuilding interned
/// functions as needed.
pub fn substitute_symbol(
    symbol: Symbol,
    defines: &Defines,
    store: &mut SymbolStore,
) -> Symbol {
    match symbol {
        Symbol::Fun(_) => {
            let sig = store.sig(symbol).expect("function symbols have signatures");
            if sig.arity == 0 {
                if let Some(replacement) = defines.get(sig.name) {
                    return if sig.sign {
                        store.negate(replacement).unwrap_or(replacement)
                    } else {
                        replacement
                    };
                }
                return symbol;
            }
            let args: Vec<Symbol> = store.args(symbol).to_vec();
            let replaced: Vec<Symbol> = args
                .iter()
                .map(|&arg| substitute_symbol(arg, defines, store))
                .collect();
            if replaced == args {
                symbol
            } else {
                store.fun(sig.name, replaced, sig.sign)
            }
        }
        _ => symbol,
    }
}

/// Substitute constants throughout a term.
pub fn substitute_term(
    term: &mut Term,
    defines: &Defines,
    store: &mut SymbolStore,
    reporter: &mut Reporter,
) {
    if defines.is_empty() {
        return;
    }
    match &mut term.kind {
        TermKind::Value(symbol) => {
            *symbol = substitute_symbol(*symbol, defines, store);
        }
        TermKind::Var(_) | TermKind::Linear { .. } => {}
        TermKind::Unary(_, a) => substitute_term(a, defines, store, reporter),
        TermKind::Binary(_, a, b) | TermKind::Range(a, b) => {
            substitute_term(a, defines, store, reporter);
            substitute_term(b, defines, store, reporter);
        }
        TermKind::Fun { args, .. } | TermKind::Script { args, .. } => {
            for arg in args {
                substitute_term(arg, defines, store, reporter);
            }
        }
        TermKind::Pool(alts) => {
            for alt in alts {
                substitute_term(alt, defines, store, reporter);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(store: &mut SymbolStore) -> Location {
        let file = store.name("t");
        Location::new(file, (1, 1), (1, 1))
    }

    fn define(store: &mut SymbolStore, name: &str, value: Term, default: bool) -> Define {
        let at = loc(store);
        Define {
            name: store.name(name),
            value,
            default,
            loc: at,
        }
    }

    #[test]
    fn chained_defines_resolve() {
        let mut store = SymbolStore::default();
        let cells = CellArena::default();
        let mut reporter = Reporter::default();
        let at = loc(&mut store);
        // #const a = 1.  #const b = a.
        let one = Term::value(at, store.num(1));
        let a_ref = {
            let a = store.id("a", false);
            Term::value(at, a)
        };
        let raw = vec![
            define(&mut store, "b", a_ref, false),
            define(&mut store, "a", one, false),
        ];
        let collected = collect(raw, &store, &mut reporter);
        let defines = resolve(collected, &mut store, &cells, &mut reporter);
        assert!(!reporter.has_error());
        let a = store.name("a");
        let b = store.name("b");
        assert_eq!(defines.get(a), Some(Symbol::Num(1)));
        assert_eq!(defines.get(b), Some(Symbol::Num(1)));
    }

    #[test]
    fn cycles_are_rejected_with_all_members() {
        let mut store = SymbolStore::default();
        let cells = CellArena::default();
        let mut reporter = Reporter::default();
        let at = loc(&mut store);
        // #const a = b.  #const b = a.  #const c = 1.
        let b_ref = {
            let b = store.id("b", false);
            Term::value(at, b)
        };
        let a_ref = {
            let a = store.id("a", false);
            Term::value(at, a)
        };
        let one = Term::value(at, store.num(1));
        let raw = vec![
            define(&mut store, "a", b_ref, false),
            define(&mut store, "b", a_ref, false),
            define(&mut store, "c", one, false),
        ];
        let collected = collect(raw, &store, &mut reporter);
        let defines = resolve(collected, &mut store, &cells, &mut reporter);
        assert!(reporter.has_error());
        let diagnostic = &reporter.diagnostics()[0];
        assert_eq!(diagnostic.kind, DiagnosticKind::CyclicDefine);
        assert!(diagnostic.message.contains('a') && diagnostic.message.contains('b'));
        // The sound definition still resolves.
        let c = store.name("c");
        assert_eq!(defines.get(c), Some(Symbol::Num(1)));
        let a = store.name("a");
        assert_eq!(defines.get(a), None);
    }

    #[test]
    fn defaults_yield_to_definitions() {
        let mut store = SymbolStore::default();
        let cells = CellArena::default();
        let mut reporter = Reporter::default();
        let at = loc(&mut store);
        let one = Term::value(at, store.num(1));
        let two = Term::value(at, store.num(2));
        let raw = vec![
            define(&mut store, "a", one, true),
            define(&mut store, "a", two, false),
        ];
        let collected = collect(raw, &store, &mut reporter);
        let defines = resolve(collected, &mut store, &cells, &mut reporter);
        assert!(!reporter.has_error());
        let a = store.name("a");
        assert_eq!(defines.get(a), Some(Symbol::Num(2)));
    }

    #[test]
    fn double_definition_is_an_error() {
        let mut store = SymbolStore::default();
        let mut reporter = Reporter::default();
        let at = loc(&mut store);
        let one = Term::value(at, store.num(1));
        let two = Term::value(at, store.num(2));
        let raw = vec![
            define(&mut store, "a", one, false),
            define(&mut store, "a", two, false),
        ];
        collect(raw, &store, &mut reporter);
        assert!(reporter.has_error());
        assert_eq!(
            reporter.diagnostics()[0].kind,
            DiagnosticKind::RedefinedConstant
        );
    }

    #[test]
    fn substitution_reaches_interned_functions() {
        let mut store = SymbolStore::default();
        let cells = CellArena::default();
        let mut reporter = Reporter::default();
        let at = loc(&mut store);
        let one = Term::value(at, store.num(1));
        let raw = vec![define(&mut store, "a", one, false)];
        let collected = collect(raw, &store, &mut reporter);
        let defines = resolve(collected, &mut store, &cells, &mut reporter);

        // p(f(a), "a") with a = 1 becomes p(f(1), "a").
        let a = store.id("a", false);
        let f = store.name("f");
        let f_a = store.fun(f, vec![a], false);
        let a_str = store.string("a");
        let p = store.name("p");
        let symbol = store.fun(p, vec![f_a, a_str], false);
        let mut term = Term::value(at, symbol);
        substitute_term(&mut term, &defines, &mut store, &mut reporter);

        let one_sym = store.num(1);
        let f_1 = store.fun(f, vec![one_sym], false);
        let expected = store.fun(p, vec![f_1, a_str], false);
        assert_eq!(term.as_value(), Some(expected));
    }
}
