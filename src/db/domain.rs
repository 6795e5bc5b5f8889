/*!
Per-signature atom domains.

A domain is an indexed set of ground atoms:
- The *offset* of an atom is assigned when the atom first appears and
  never moves; atoms are only ever appended.
- The *defined* bit says some rule head (or external declaration) can
  actually derive the atom.
  A negative body literal may *reserve* an atom --- bring it into the
  domain undefined --- so the emitter has an identifier for it; if
  nothing ever defines it, the solver reads it as false.
- The *fact* bit says the atom is unconditionally true; bodies drop
  fact literals, and `not fact` kills its rule instance.
- The *generation* stamp partitions a domain into OLD, NEW and ALL
  during semi-naive iteration.

Definition order is tracked apart from offset order: binders enumerate
atoms in the order they became defined, which keeps the semi-naive
windows contiguous even when an atom was reserved long before a rule
derived it.

Domains whose name carries the incremental prefix `#inc_` are cleared
between steps; every other domain is append-only for the grounder's
lifetime, and offsets are stable across steps.
*/

use rustc_hash::FxHashMap;

use crate::{
    misc::log::targets,
    structures::rule::ExternalValue,
    structures::symbol::{Sig, Symbol, SymbolStore},
};

/// One ground atom in a domain.
#[derive(Clone, Copy, Debug)]
pub struct AtomData {
    /// The atom's symbol.
    pub symbol: Symbol,

    /// The process-unique identifier the emitter speaks in; non-zero.
    pub uid: u32,

    /// Unconditionally true.
    pub fact: bool,

    /// Derivable by some head or external declaration.
    pub defined: bool,

    /// The externally assigned truth, if the atom is external.
    pub external: Option<ExternalValue>,

    /// The generation the atom was defined in.
    pub generation: u32,

    /// The atom's position in the definition order, once defined.
    /// Window membership during semi-naive iteration goes by this.
    pub defined_at: u32,
}

/// The atoms known for one predicate signature.
pub struct Domain {
    /// The signature.
    pub sig: Sig,

    /// The current generation; stamped onto newly defined atoms.
    pub generation: u32,

    atoms: Vec<AtomData>,
    index: FxHashMap<Symbol, u32>,
    defined_order: Vec<u32>,
}

impl Domain {
    fn new(sig: Sig) -> Self {
        Domain {
            sig,
            generation: 0,
            atoms: Vec::new(),
            index: FxHashMap::default(),
            defined_order: Vec::new(),
        }
    }

    /// The offset of `symbol`, if the atom is in the domain.
    pub fn offset_of(&self, symbol: Symbol) -> Option<u32> {
        self.index.get(&symbol).copied()
    }

    /// The atom at `offset`.
    pub fn atom(&self, offset: u32) -> &AtomData {
        &self.atoms[offset as usize]
    }

    /// The number of atoms, defined or reserved.
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    /// True if the domain has no atoms.
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// The number of defined atoms.
    pub fn defined_count(&self) -> usize {
        self.defined_order.len()
    }

    /// The atom at position `at` of the definition order.
    pub fn defined_at(&self, at: usize) -> &AtomData {
        &self.atoms[self.defined_order[at] as usize]
    }

    /// Bring `symbol` into the domain without defining it; its offset.
    pub fn reserve(&mut self, symbol: Symbol, next_uid: &mut u32) -> u32 {
        if let Some(offset) = self.index.get(&symbol) {
            return *offset;
        }
        let offset = self.atoms.len() as u32;
        let uid = *next_uid;
        *next_uid += 1;
        self.atoms.push(AtomData {
            symbol,
            uid,
            fact: false,
            defined: false,
            external: None,
            generation: 0,
            defined_at: 0,
        });
        self.index.insert(symbol, offset);
        offset
    }

    /// Define `symbol`, inserting it if needed.
    ///
    /// Returns the offset and whether the atom was *newly* defined.
    /// Defining an already defined atom as a fact upgrades its fact
    /// bit without renewing its generation.
    pub fn define(&mut self, symbol: Symbol, fact: bool, next_uid: &mut u32) -> (u32, bool) {
        let offset = self.reserve(symbol, next_uid);
        let generation = self.generation;
        let atom = &mut self.atoms[offset as usize];
        if atom.defined {
            if fact && !atom.fact {
                atom.fact = true;
            }
            return (offset, false);
        }
        atom.defined = true;
        atom.fact = fact;
        atom.generation = generation;
        atom.defined_at = self.defined_order.len() as u32;
        self.defined_order.push(offset);
        (offset, true)
    }

    /// Declare `symbol` external with the given truth.
    ///
    /// An external atom counts as defined --- bodies may draw on it ---
    /// but never as a fact.
    /// Releasing removes the external status; the atom keeps its
    /// offset.
    pub fn set_external(&mut self, symbol: Symbol, value: ExternalValue, next_uid: &mut u32) -> u32 {
        let offset = self.reserve(symbol, next_uid);
        let generation = self.generation;
        let atom = &mut self.atoms[offset as usize];
        match value {
            ExternalValue::Release => {
                atom.external = None;
            }
            value => {
                atom.external = Some(value);
                if !atom.defined {
                    atom.defined = true;
                    atom.generation = generation;
                    atom.defined_at = self.defined_order.len() as u32;
                    self.defined_order.push(offset);
                }
            }
        }
        offset
    }

    /// Advance to the next generation.
    pub fn next_generation(&mut self) {
        self.generation += 1;
    }

    fn clear(&mut self) {
        self.atoms.clear();
        self.index.clear();
        self.defined_order.clear();
        self.generation = 0;
    }
}

/// All domains of a grounder, and the atom identifier counter.
pub struct DomainStore {
    domains: Vec<Domain>,
    by_sig: FxHashMap<Sig, usize>,
    next_uid: u32,
}

impl Default for DomainStore {
    fn default() -> Self {
        DomainStore {
            domains: Vec::new(),
            by_sig: FxHashMap::default(),
            // Identifiers are non-zero: the emitter encodes negation by sign.
            next_uid: 1,
        }
    }
}

/// The prefix of program parts whose domains reset between steps.
pub const INCREMENTAL_PREFIX: &str = "#inc_";

impl DomainStore {
    fn entry(&mut self, sig: Sig) -> usize {
        if let Some(&index) = self.by_sig.get(&sig) {
            return index;
        }
        let index = self.domains.len();
        self.domains.push(Domain::new(sig));
        self.by_sig.insert(sig, index);
        index
    }

    /// The domain for `sig`, created empty on first use.
    pub fn domain_mut(&mut self, sig: Sig) -> &mut Domain {
        let index = self.entry(sig);
        &mut self.domains[index]
    }

    /// The domain for `sig`, if any atom ever touched it.
    pub fn domain(&self, sig: Sig) -> Option<&Domain> {
        self.by_sig.get(&sig).map(|&index| &self.domains[index])
    }

    /// Every domain, in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Domain> {
        self.domains.iter()
    }

    /// Define an atom, routing through the identifier counter.
    pub fn define(&mut self, sig: Sig, symbol: Symbol, fact: bool) -> (u32, bool) {
        let index = self.entry(sig);
        self.domains[index].define(symbol, fact, &mut self.next_uid)
    }

    /// Reserve an atom, routing through the identifier counter.
    pub fn reserve(&mut self, sig: Sig, symbol: Symbol) -> u32 {
        let index = self.entry(sig);
        self.domains[index].reserve(symbol, &mut self.next_uid)
    }

    /// Declare an external atom, routing through the identifier counter.
    pub fn set_external(&mut self, sig: Sig, symbol: Symbol, value: ExternalValue) -> u32 {
        let index = self.entry(sig);
        self.domains[index].set_external(symbol, value, &mut self.next_uid)
    }

    /// The emitter identifier of a defined or reserved atom.
    pub fn uid(&self, sig: Sig, symbol: Symbol) -> Option<u32> {
        let domain = self.domain(sig)?;
        let offset = domain.offset_of(symbol)?;
        Some(domain.atom(offset).uid)
    }

    /// Clear the incremental domains at a step boundary.
    pub fn begin_step(&mut self, store: &SymbolStore) {
        for domain in &mut self.domains {
            if store.resolve(domain.sig.name).starts_with(INCREMENTAL_PREFIX) {
                log::debug!(
                    target: targets::DOMAIN,
                    "clearing incremental domain {}/{}",
                    store.resolve(domain.sig.name),
                    domain.sig.arity
                );
                domain.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(store: &mut SymbolStore, name: &str, arity: u32) -> Sig {
        Sig {
            name: store.name(name),
            arity,
            sign: false,
        }
    }

    #[test]
    fn offsets_are_stable_and_monotone() {
        let mut store = SymbolStore::default();
        let mut domains = DomainStore::default();
        let p = sig(&mut store, "p", 1);
        let p_name = p.name;
        let symbols: Vec<Symbol> = (0..5)
            .map(|n| {
                let num = store.num(n);
                store.fun(p_name, vec![num], false)
            })
            .collect();
        for (expected, &symbol) in symbols.iter().enumerate() {
            let (offset, fresh) = domains.define(p, symbol, true);
            assert_eq!(offset as usize, expected);
            assert!(fresh);
        }
        // Redefinition moves nothing.
        let (offset, fresh) = domains.define(p, symbols[2], false);
        assert_eq!(offset, 2);
        assert!(!fresh);
        // Identifiers are non-zero and distinct.
        let domain = domains.domain(p).unwrap();
        let mut uids: Vec<u32> = (0..5).map(|i| domain.atom(i).uid).collect();
        uids.dedup();
        assert_eq!(uids.len(), 5);
        assert!(uids.iter().all(|&uid| uid > 0));
    }

    #[test]
    fn reserve_then_define_keeps_definition_order() {
        let mut store = SymbolStore::default();
        let mut domains = DomainStore::default();
        let p = sig(&mut store, "p", 0);
        let p_sym = store.id("p", false);
        let r_sym = store.id("r", false);
        let r = sig(&mut store, "r", 0);

        // p is reserved by a negative literal, r defined, then p defined.
        domains.reserve(p, p_sym);
        domains.define(r, r_sym, false);
        let (offset, fresh) = domains.define(p, p_sym, false);
        assert_eq!(offset, 0);
        assert!(fresh);

        let p_domain = domains.domain(p).unwrap();
        assert_eq!(p_domain.defined_count(), 1);
        assert_eq!(p_domain.defined_at(0).symbol, p_sym);
    }

    #[test]
    fn fact_upgrade() {
        let mut store = SymbolStore::default();
        let mut domains = DomainStore::default();
        let p = sig(&mut store, "p", 0);
        let p_sym = store.id("p", false);
        domains.define(p, p_sym, false);
        let domain = domains.domain(p).unwrap();
        assert!(!domain.atom(0).fact);
        domains.define(p, p_sym, true);
        let domain = domains.domain(p).unwrap();
        assert!(domain.atom(0).fact);
    }

    #[test]
    fn incremental_domains_clear_between_steps() {
        let mut store = SymbolStore::default();
        let mut domains = DomainStore::default();
        let inc = sig(&mut store, "#inc_q", 0);
        let stable = sig(&mut store, "q", 0);
        let inc_sym = store.id("#inc_q", false);
        let q_sym = store.id("q", false);

        domains.define(inc, inc_sym, true);
        domains.define(stable, q_sym, true);
        domains.begin_step(&store);

        assert_eq!(domains.domain(inc).unwrap().len(), 0);
        assert_eq!(domains.domain(stable).unwrap().len(), 1);
    }

    #[test]
    fn external_atoms_define_without_facts() {
        let mut store = SymbolStore::default();
        let mut domains = DomainStore::default();
        let p = sig(&mut store, "p", 0);
        let p_sym = store.id("p", false);
        domains.set_external(p, p_sym, ExternalValue::True);
        let domain = domains.domain(p).unwrap();
        assert!(domain.atom(0).defined);
        assert!(!domain.atom(0).fact);
        assert_eq!(domain.atom(0).external, Some(ExternalValue::True));

        domains.set_external(p, p_sym, ExternalValue::Release);
        let domain = domains.domain(p).unwrap();
        assert_eq!(domain.atom(0).external, None);
    }
}
