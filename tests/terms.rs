use std::cmp::Ordering;

use marmot_ground::structures::symbol::{Symbol, SymbolStore};

#[test]
fn symbol_kinds_order() {
    let mut store = SymbolStore::default();
    let chain = [
        Symbol::Infimum,
        store.num(-5),
        store.num(0),
        store.num(7),
        store.string("a"),
        store.string("z"),
        store.id("a", false),
        store.id("z", false),
        {
            let f = store.name("f");
            let one = store.num(1);
            store.fun(f, vec![one], false)
        },
        Symbol::Supremum,
    ];
    for pair in chain.windows(2) {
        assert_eq!(
            store.cmp_symbols(pair[0], pair[1]),
            Ordering::Less,
            "{} < {}",
            store.display(pair[0]),
            store.display(pair[1])
        );
    }
}

#[test]
fn print_then_parse_is_identity() {
    let mut store = SymbolStore::default();
    let samples = {
        let f = store.name("f");
        let g = store.name("g");
        let one = store.num(1);
        let minus = store.num(-3);
        let s = store.string("quoted \"text\"");
        let a = store.id("a", true);
        let g_a = store.fun(g, vec![a], false);
        let nested = store.fun(f, vec![one, minus, s, g_a], false);
        let unit = store.tuple(vec![]);
        let pair = store.tuple(vec![one, nested]);
        vec![Symbol::Infimum, one, minus, s, a, g_a, nested, unit, pair, Symbol::Supremum]
    };
    for symbol in samples {
        let printed = store.display(symbol).to_string();
        let parsed = store.parse_symbol(&printed).unwrap();
        assert_eq!(symbol, parsed, "round trip of {printed}");
    }
}

#[test]
fn classical_negation_involutes() {
    let mut store = SymbolStore::default();
    let p = store.name("p");
    let one = store.num(1);
    let atom = store.fun(p, vec![one], false);
    let negated = store.negate(atom).unwrap();
    assert_ne!(atom, negated);
    assert_eq!(store.negate(negated), Some(atom));
    assert_eq!(store.display(negated).to_string(), "-p(1)");
}

#[test]
fn stores_are_independent() {
    let mut first = SymbolStore::default();
    let mut second = SymbolStore::default();
    // Interning order differs; equal spellings still read back equally.
    let _ = first.id("zebra", false);
    let a1 = first.id("a", false);
    let a2 = second.id("a", false);
    assert_eq!(
        first.display(a1).to_string(),
        second.display(a2).to_string()
    );
}
