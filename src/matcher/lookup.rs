/*!
A signature-indexed lookup of term occurrences.

The dependency analysis asks, for a head atom template, which body
occurrences could be provided by it.
The lookup stores one entry per *structurally distinct* representative
mirror, with the occurrences that share it, and answers by matching (a
ground head) or unifying (a non-ground template) against every entry
of the same signature.

Constant representatives are indexed apart from variable-carrying
ones: a ground representative can only be provided by a head matching
it exactly, which keeps the unification fan-out small.
*/

use rustc_hash::FxHashMap;

use crate::{
    matcher::{match_symbol, reset, struct_eq, struct_hash, unify, GTerm},
    structures::{
        symbol::{Sig, Symbol, SymbolStore},
        term::CellArena,
    },
};

struct Entry<Occ> {
    repr: GTerm,
    occs: Vec<Occ>,
}

/// Occurrences keyed by structurally distinct representative terms.
pub struct Lookup<Occ> {
    entries: Vec<Entry<Occ>>,
    by_hash: FxHashMap<u64, Vec<usize>>,
    ground: FxHashMap<Sig, Vec<usize>>,
    open: FxHashMap<Sig, Vec<usize>>,
}

impl<Occ> Default for Lookup<Occ> {
    fn default() -> Self {
        Lookup {
            entries: Vec::new(),
            by_hash: FxHashMap::default(),
            ground: FxHashMap::default(),
            open: FxHashMap::default(),
        }
    }
}

impl<Occ> Lookup<Occ> {
    /// Add an occurrence under its representative term.
    ///
    /// Returns true if the representative was fresh; otherwise the
    /// occurrence joins the entry of the structurally equal
    /// representative already present.
    pub fn add(&mut self, repr: GTerm, occ: Occ, store: &SymbolStore) -> bool {
        let hash = struct_hash(&repr);
        if let Some(indices) = self.by_hash.get(&hash) {
            for &index in indices {
                if struct_eq(&self.entries[index].repr, &repr) {
                    self.entries[index].occs.push(occ);
                    return false;
                }
            }
        }
        let index = self.entries.len();
        let sig = repr
            .sig(store)
            .expect("an atom representative is a function or a function value");
        if repr.value().is_some() {
            self.ground.entry(sig).or_default().push(index);
        } else {
            self.open.entry(sig).or_default().push(index);
        }
        self.by_hash.entry(hash).or_default().push(index);
        self.entries.push(Entry {
            repr,
            occs: vec![occ],
        });
        true
    }

    /// Call `found` for each entry whose representative matches the
    /// ground symbol.
    pub fn match_symbol(
        &self,
        symbol: Symbol,
        cells: &mut CellArena,
        store: &SymbolStore,
        mut found: impl FnMut(&[Occ]),
    ) {
        let sig = match store.sig(symbol) {
            Some(sig) => sig,
            None => return,
        };
        if let Some(indices) = self.open.get(&sig) {
            for &index in indices {
                let entry = &self.entries[index];
                if match_symbol(&entry.repr, symbol, cells, store) {
                    found(&entry.occs);
                }
                reset(&entry.repr, cells);
            }
        }
        // A ground representative is provided only by the identical symbol.
        let probe = GTerm::Val(symbol);
        if let Some(indices) = self.by_hash.get(&struct_hash(&probe)) {
            for &index in indices {
                let entry = &self.entries[index];
                if struct_eq(&entry.repr, &probe) {
                    found(&entry.occs);
                }
            }
        }
    }

    /// Call `found` for each entry whose representative unifies with
    /// the template.
    pub fn unify_term(
        &self,
        template: &GTerm,
        cells: &mut CellArena,
        store: &SymbolStore,
        mut found: impl FnMut(&[Occ]),
    ) {
        if let Some(symbol) = template.value() {
            self.match_symbol(symbol, cells, store, found);
            return;
        }
        let sig = match template.sig(store) {
            Some(sig) => sig,
            None => return,
        };
        for map in [&self.open, &self.ground] {
            if let Some(indices) = map.get(&sig) {
                for &index in indices {
                    let entry = &self.entries[index];
                    if unify(&entry.repr, template, cells, store) {
                        found(&entry.occs);
                    }
                    reset(&entry.repr, cells);
                    reset(template, cells);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_representative_collects_occurrences() {
        let mut store = SymbolStore::default();
        let mut cells = CellArena::default();
        let p = store.name("p");
        let x = store.name("X");
        let mk = |cells: &mut CellArena| GTerm::Fun {
            name: p,
            sign: false,
            args: vec![GTerm::Var {
                name: x,
                cell: cells.alloc(),
            }],
        };
        let mut lookup: Lookup<u32> = Lookup::default();
        assert!(lookup.add(mk(&mut cells), 0, &store));
        // Structurally equal: same occurrence entry.
        assert!(!lookup.add(mk(&mut cells), 1, &store));

        let one = store.num(1);
        let p1 = store.fun(p, vec![one], false);
        let mut seen = Vec::new();
        lookup.match_symbol(p1, &mut cells, &store, |occs| seen.extend_from_slice(occs));
        assert_eq!(seen, vec![0, 1]);
    }

    #[test]
    fn unification_respects_structure() {
        let mut store = SymbolStore::default();
        let mut cells = CellArena::default();
        let p = store.name("p");
        let one = store.num(1);
        let two = store.num(2);
        let p1 = store.fun(p, vec![one], false);

        let mut lookup: Lookup<&'static str> = Lookup::default();
        lookup.add(GTerm::Val(p1), "ground", &store);
        lookup.add(
            GTerm::Fun {
                name: p,
                sign: false,
                args: vec![GTerm::Var {
                    name: store.name("X"),
                    cell: cells.alloc(),
                }],
            },
            "open",
            &store,
        );

        // The template p(2) unifies with p(X) only.
        let template = GTerm::Fun {
            name: p,
            sign: false,
            args: vec![GTerm::Val(two)],
        };
        let mut seen = Vec::new();
        lookup.unify_term(&template, &mut cells, &store, |occs| {
            seen.extend_from_slice(occs)
        });
        assert_eq!(seen, vec!["open"]);

        // The ground template p(1) reaches both entries.
        let template = GTerm::Val(p1);
        let mut seen = Vec::new();
        lookup.unify_term(&template, &mut cells, &store, |occs| {
            seen.extend_from_slice(occs)
        });
        assert_eq!(seen.len(), 2);
    }
}
