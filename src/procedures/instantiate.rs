/*!
The semi-naive instantiation loop and rule firing.

Components arrive in grounding order.
Within a component, pass zero grounds every rule over the atoms that
existed when the component started; each further pass designates, per
rule and per recursive scan, the window of atoms defined by the
previous pass, so a combination of body atoms is enumerated exactly
once: the designated scan draws from NEW, recursive scans to its left
from OLD, those to its right from OLD∪NEW, and non-recursive scans
from the whole (finished) domain of the earlier component.
The passes stop once a pass defines nothing new.

Firing a rule instance evaluates the head under the current bindings
and encodes it for the emitter:
- a plain atom or constraint becomes a `rule` event;
- a choice emits one choice rule per element instance, plus
  reaches-bound atoms for cardinality guards;
- a disjunction collects its element instances into one head, shifting
  the instances' conditions into the body;
- a head aggregate emits its element atoms as choices and enforces its
  guards the way body aggregates do.

Directives ground their bodies with the same machinery and map onto
their own emitter events; minimise entries and signature-level show
and project directives are buffered and flushed at `end_step`.
*/

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    analysis::{dependency::Component, dependency::OccurrenceType, inequalities::IeBoundMap},
    db::DomainStore,
    misc::log::targets,
    output::{Emitter, HeadKind, TheoryTermData, WeightedLiteral},
    reports::{DiagnosticKind, Location, Reporter},
    structures::{
        literal::{AggrFun, AggrGuard, BodyLiteral, NafSign, Relation},
        rule::{Head, Rule, Statement},
        symbol::{NameId, Sig, Symbol, SymbolStore},
        term::{CellArena, CellKey, Term, TermKind},
    },
    structures::theory::{TheoryAtom, TheoryElem, TheoryTerm},
    types::err::{ErrorKind, GroundError},
};

use super::{
    aggregates::{self, AggOutcome, Contribution},
    atom_sig,
    binder::{
        advance_range, advance_scan, advance_script, eval_relation, start_range, start_scan,
        RangeStart, RelationOutcome, ScanCursor, ScriptCursor, Window,
    },
    conditional::{self, CondInstance, LiteralState},
    BinderSpec, ElementPlan, OccPath, ScriptRegistry, StatementPlan,
};

/// Everything instantiation reads and writes.
pub struct Engine<'e> {
    /// The symbol store.
    pub store: &'e mut SymbolStore,

    /// The cell arena.
    pub cells: &'e mut CellArena,

    /// The domains.
    pub domains: &'e mut DomainStore,

    /// The diagnostics sink.
    pub reporter: &'e mut Reporter,

    /// The output surface.
    pub emitter: &'e mut dyn Emitter,

    /// Registered external scripts.
    pub scripts: &'e ScriptRegistry,

    /// Theory atom occurrences, resolved by the rewriter.
    pub theory_atoms: &'e [TheoryAtom],

    /// Emit facts as rules with empty bodies.
    pub keep_facts: bool,

    /// Buffered minimise entries, flushed at the end of the step.
    minimize: Vec<(i32, WeightedLiteral)>,
    minimize_seen: FxHashMap<(i32, i32, Vec<Symbol>), u32>,
    minimize_aux: Option<NameId>,

    /// Signatures to show at the end of the step.
    shown_sigs: Vec<(NameId, u32)>,

    /// Signatures to project at the end of the step.
    project_sigs: Vec<(NameId, u32)>,

    /// Acyclicity node numbering.
    edge_nodes: FxHashMap<Symbol, i32>,

    /// Emission deduplication.
    emitted_rules: FxHashSet<(u8, Vec<u32>, Vec<i32>)>,
    emitted_weighted: FxHashSet<(u32, i32, Vec<(i32, i32)>)>,

    /// Theory term numbering.
    theory_terms: FxHashMap<TheoryTermData, u32>,
    theory_elements: u32,

    conj_aux: Option<NameId>,
}

impl<'e> Engine<'e> {
    /// A fresh engine over the given collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: &'e mut SymbolStore,
        cells: &'e mut CellArena,
        domains: &'e mut DomainStore,
        reporter: &'e mut Reporter,
        emitter: &'e mut dyn Emitter,
        scripts: &'e ScriptRegistry,
        theory_atoms: &'e [TheoryAtom],
    ) -> Self {
        Engine {
            store,
            cells,
            domains,
            reporter,
            emitter,
            scripts,
            theory_atoms,
            keep_facts: true,
            minimize: Vec::new(),
            minimize_seen: FxHashMap::default(),
            minimize_aux: None,
            shown_sigs: Vec::new(),
            project_sigs: Vec::new(),
            edge_nodes: FxHashMap::default(),
            emitted_rules: FxHashSet::default(),
            emitted_weighted: FxHashSet::default(),
            theory_terms: FxHashMap::default(),
            theory_elements: 0,
            conj_aux: None,
        }
    }

    // {{{ emission helpers

    /// Emit a disjunctive rule unless an identical one went out before.
    pub fn emit_rule_dedup(&mut self, head: &[u32], body: &[i32]) {
        let key = (0u8, head.to_vec(), body.to_vec());
        if self.emitted_rules.insert(key) {
            self.emitter.rule(HeadKind::Disjunctive, head, body);
        }
    }

    /// Emit a choice rule unless an identical one went out before.
    pub fn emit_choice_dedup(&mut self, head: &[u32], body: &[i32]) {
        let key = (1u8, head.to_vec(), body.to_vec());
        if self.emitted_rules.insert(key) {
            self.emitter.rule(HeadKind::Choice, head, body);
        }
    }

    /// Emit a weighted rule unless an identical one went out before.
    pub fn emit_weighted_dedup(&mut self, head: u32, lower: i32, body: &[WeightedLiteral]) {
        let key = (
            head,
            lower,
            body.iter().map(|w| (w.literal, w.weight)).collect(),
        );
        if self.emitted_weighted.insert(key) {
            self.emitter
                .weighted_rule(HeadKind::Disjunctive, &[head], lower, body);
        }
    }

    /// An auxiliary atom of the predicate `aux`, keyed by a marker,
    /// the values of the global cells, and extra key symbols.
    pub fn aux_atom(
        &mut self,
        aux: NameId,
        marker: &str,
        globals: &[CellKey],
        key: &[Symbol],
    ) -> Result<u32, ErrorKind> {
        let mut parts = Vec::with_capacity(globals.len() + key.len() + 1);
        parts.push(self.store.id(marker, false));
        for &cell in globals {
            match self.cells.value(cell) {
                Some(value) => parts.push(value),
                None => parts.push(self.store.id("#u", false)),
            }
        }
        parts.extend_from_slice(key);
        let tuple = self.store.tuple(parts);
        let symbol = self.store.fun(aux, vec![tuple], false);
        let sig = Sig {
            name: aux,
            arity: 1,
            sign: false,
        };
        let (offset, _) = self.domains.define(sig, symbol, false);
        Ok(self
            .domains
            .domain(sig)
            .expect("the domain was just touched")
            .atom(offset)
            .uid)
    }

    /// An atom standing for the conjunction of `lits`, defined by one
    /// rule; identical conjunctions share the atom.
    pub fn conj_atom(&mut self, lits: &[i32]) -> Result<u32, ErrorKind> {
        let aux = match self.conj_aux {
            Some(aux) => aux,
            None => {
                let aux = self.store.name("#bc");
                self.conj_aux = Some(aux);
                aux
            }
        };
        let parts: Vec<Symbol> = lits.iter().map(|&lit| Symbol::Num(lit)).collect();
        let tuple = self.store.tuple(parts);
        let symbol = self.store.fun(aux, vec![tuple], false);
        let sig = Sig {
            name: aux,
            arity: 1,
            sign: false,
        };
        let (offset, fresh) = self.domains.define(sig, symbol, false);
        let uid = self
            .domains
            .domain(sig)
            .expect("the domain was just touched")
            .atom(offset)
            .uid;
        if fresh {
            self.emit_rule_dedup(&[uid], lits);
        }
        Ok(uid)
    }

    // }}}
    // {{{ negative tests and theory atoms

    /// Evaluate a negated predicate literal under the current
    /// bindings.
    ///
    /// `None` kills the rule instance; otherwise the returned literals
    /// join the body.
    fn neg_test(
        &mut self,
        sig: Sig,
        atom: &Term,
        naf: NafSign,
        recursive: bool,
    ) -> Result<Option<Vec<i32>>, ErrorKind> {
        let symbol = match atom.eval(self.cells, self.store) {
            Ok(symbol) => symbol,
            Err(_) => {
                self.reporter.warn(
                    DiagnosticKind::OperationUndefined,
                    atom.loc,
                    format!("operation undefined: {}", atom.display(self.store)),
                );
                return Ok(None);
            }
        };
        let state = self.domains.domain(sig).and_then(|domain| {
            let offset = domain.offset_of(symbol)?;
            let data = domain.atom(offset);
            if data.defined {
                Some((data.uid, data.fact))
            } else {
                None
            }
        });
        match naf {
            NafSign::Pos => unreachable!("negative tests carry a negation"),
            NafSign::Not => match state {
                Some((_, true)) => Ok(None),
                Some((uid, false)) => Ok(Some(vec![-(uid as i32)])),
                None if recursive => {
                    let uid = self.domains.reserve(sig, symbol);
                    let uid = self
                        .domains
                        .domain(sig)
                        .expect("the domain was just touched")
                        .atom(uid)
                        .uid;
                    Ok(Some(vec![-(uid as i32)]))
                }
                None => Ok(Some(Vec::new())),
            },
            NafSign::NotNot => match state {
                Some((_, true)) => Ok(Some(Vec::new())),
                Some((uid, false)) => {
                    let aux = self.conj_atom(&[-(uid as i32)])?;
                    Ok(Some(vec![-(aux as i32)]))
                }
                None if recursive => {
                    let offset = self.domains.reserve(sig, symbol);
                    let uid = self
                        .domains
                        .domain(sig)
                        .expect("the domain was just touched")
                        .atom(offset)
                        .uid;
                    let aux = self.conj_atom(&[-(uid as i32)])?;
                    Ok(Some(vec![-(aux as i32)]))
                }
                None => Ok(None),
            },
        }
    }

    fn theory_term_id(&mut self, data: TheoryTermData) -> u32 {
        if let Some(&id) = self.theory_terms.get(&data) {
            return id;
        }
        let id = self.theory_terms.len() as u32;
        self.emitter.theory_term(id, &data);
        self.theory_terms.insert(data, id);
        id
    }

    fn ground_theory_term(&mut self, term: &TheoryTerm) -> Result<u32, ()> {
        match term {
            TheoryTerm::Term(term) => match term.eval(self.cells, self.store) {
                Ok(Symbol::Num(n)) => Ok(self.theory_term_id(TheoryTermData::Number(n))),
                Ok(symbol) => Ok(self.theory_term_id(TheoryTermData::Symbol(symbol))),
                Err(_) => Err(()),
            },
            TheoryTerm::Tuple(items) => {
                let ids = items
                    .iter()
                    .map(|item| self.ground_theory_term(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(self.theory_term_id(TheoryTermData::Tuple(ids)))
            }
            TheoryTerm::List(items) => {
                let ids = items
                    .iter()
                    .map(|item| self.ground_theory_term(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(self.theory_term_id(TheoryTermData::List(ids)))
            }
            TheoryTerm::Set(items) => {
                let ids = items
                    .iter()
                    .map(|item| self.ground_theory_term(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(self.theory_term_id(TheoryTermData::Set(ids)))
            }
            TheoryTerm::Fun(name, args) => {
                let symbol = self.store.id_symbol(*name);
                let name_id = self.theory_term_id(TheoryTermData::Symbol(symbol));
                let ids = args
                    .iter()
                    .map(|arg| self.ground_theory_term(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(self.theory_term_id(TheoryTermData::Function(name_id, ids)))
            }
            TheoryTerm::Unparsed(_) => Err(()),
        }
    }

    fn ground_theory_element(&mut self, element: &TheoryElem) -> Result<Option<u32>, ()> {
        let mut condition = Vec::new();
        for literal in &element.condition {
            match literal {
                BodyLiteral::Pred { sign, atom } => {
                    let sig = match atom_sig(atom, self.store) {
                        Some(sig) => sig,
                        None => return Err(()),
                    };
                    let symbol = atom.eval(self.cells, self.store).map_err(|_| ())?;
                    let state = self.domains.domain(sig).and_then(|domain| {
                        let offset = domain.offset_of(symbol)?;
                        let data = domain.atom(offset);
                        data.defined.then_some((data.uid, data.fact))
                    });
                    match (sign, state) {
                        (NafSign::Pos, Some((_, true))) => {}
                        (NafSign::Pos, Some((uid, false))) => condition.push(uid as i32),
                        (NafSign::Pos, None) => return Ok(None),
                        (NafSign::Not, Some((_, true))) => return Ok(None),
                        (NafSign::Not, Some((uid, false))) => condition.push(-(uid as i32)),
                        (NafSign::Not, None) => {}
                        (NafSign::NotNot, Some((_, true))) => {}
                        (NafSign::NotNot, Some((uid, false))) => condition.push(uid as i32),
                        (NafSign::NotNot, None) => return Ok(None),
                    }
                }
                BodyLiteral::Comparison {
                    neg: false,
                    left,
                    rights,
                    ..
                } if rights.len() == 1 => {
                    let lhs = left.eval(self.cells, self.store).map_err(|_| ())?;
                    let rhs = rights[0].1.eval(self.cells, self.store).map_err(|_| ())?;
                    if !rights[0].0.holds(self.store.cmp_symbols(lhs, rhs)) {
                        return Ok(None);
                    }
                }
                _ => return Err(()),
            }
        }
        let terms = element
            .tuple
            .iter()
            .map(|term| self.ground_theory_term(term))
            .collect::<Result<Vec<_>, _>>()?;
        let id = self.theory_elements;
        self.theory_elements += 1;
        self.emitter.theory_element(id, &terms, &condition);
        Ok(Some(id))
    }

    /// Ground a theory atom occurrence; the returned identifier is
    /// zero for a directive.
    fn ground_theory_atom(&mut self, index: usize, directive: bool) -> Result<Option<u32>, ErrorKind> {
        // The table outlives the engine; detach the borrow from self.
        let atoms: &'e [TheoryAtom] = self.theory_atoms;
        let atom = &atoms[index];
        let symbol = match atom.atom.eval(self.cells, self.store) {
            Ok(symbol) => symbol,
            Err(_) => {
                self.reporter.warn(
                    DiagnosticKind::OperationUndefined,
                    atom.loc,
                    "theory atom does not evaluate",
                );
                return Ok(None);
            }
        };
        let uid = if directive {
            0
        } else {
            let sig = self
                .store
                .sig(symbol)
                .expect("theory atoms are function shaped");
            let (offset, _) = self.domains.define(sig, symbol, false);
            self.domains
                .domain(sig)
                .expect("the domain was just touched")
                .atom(offset)
                .uid
        };

        let name_term = self.theory_term_id(TheoryTermData::Symbol(symbol));
        let mut elements = Vec::new();
        for element in &atom.elements {
            match self.ground_theory_element(element) {
                Ok(Some(id)) => elements.push(id),
                Ok(None) => {}
                Err(()) => {
                    self.reporter.warn(
                        DiagnosticKind::OperationUndefined,
                        atom.loc,
                        "theory element does not evaluate",
                    );
                }
            }
        }
        let guard = match &atom.guard {
            None => None,
            Some((op, term)) => {
                let op_symbol = self.store.id_symbol(*op);
                let op_id = self.theory_term_id(TheoryTermData::Symbol(op_symbol));
                match self.ground_theory_term(term) {
                    Ok(term_id) => Some((op_id, term_id)),
                    Err(()) => {
                        self.reporter.warn(
                            DiagnosticKind::OperationUndefined,
                            atom.loc,
                            "theory guard does not evaluate",
                        );
                        None
                    }
                }
            }
        };
        self.emitter.theory_atom(uid, name_term, &elements, guard);
        Ok(Some(uid))
    }

    // }}}
}

// {{{ cursors and the nested-loop join

enum Cursor {
    Scan(ScanCursor),
    Range(crate::procedures::binder::RangeCursor),
    Script(ScriptCursor),
    Once {
        fired: bool,
        exhausted: bool,
        lits: Vec<i32>,
        cell: Option<CellKey>,
    },
}

impl Cursor {
    fn once(lits: Vec<i32>, cell: Option<CellKey>) -> Self {
        Cursor::Once {
            fired: false,
            exhausted: false,
            lits,
            cell,
        }
    }

    fn empty() -> Self {
        Cursor::Once {
            fired: false,
            exhausted: true,
            lits: Vec::new(),
            cell: None,
        }
    }
}

/// Ground one schedule, invoking `on_match` per complete binding with
/// the per-binder body literals.
fn run_schedule(
    schedule: &[BinderSpec],
    windows: &FxHashMap<usize, Window>,
    bounds: &IeBoundMap,
    recursive: &dyn Fn(usize) -> bool,
    engine: &mut Engine,
    on_match: &mut dyn FnMut(&mut Engine, &[Cursor]) -> Result<(), ErrorKind>,
) -> Result<(), ErrorKind> {
    if schedule.is_empty() {
        return on_match(engine, &[]);
    }
    let mut cursors: Vec<Cursor> = Vec::with_capacity(schedule.len());
    cursors.push(init_cursor(&schedule[0], windows.get(&0), bounds, recursive(0), engine)?);
    loop {
        let depth = cursors.len() - 1;
        let has = advance_cursor(&schedule[depth], &mut cursors[depth], engine);
        if has {
            if cursors.len() == schedule.len() {
                on_match(engine, &cursors)?;
            } else {
                let next = cursors.len();
                let cursor = init_cursor(
                    &schedule[next],
                    windows.get(&next),
                    bounds,
                    recursive(next),
                    engine,
                )?;
                cursors.push(cursor);
            }
        } else {
            cursors.pop();
            if cursors.is_empty() {
                return Ok(());
            }
        }
    }
}

fn init_cursor(
    spec: &BinderSpec,
    window: Option<&Window>,
    bounds: &IeBoundMap,
    recursive: bool,
    engine: &mut Engine,
) -> Result<Cursor, ErrorKind> {
    match spec {
        BinderSpec::Scan {
            sig, pattern, atom, ..
        } => {
            let window = window.copied().unwrap_or(Window {
                start: 0,
                end: usize::MAX,
            });
            Ok(Cursor::Scan(start_scan(
                *sig,
                atom,
                window,
                engine.cells,
                engine.domains,
                engine.store,
                pattern,
            )))
        }

        BinderSpec::NegTest { sig, atom, naf, .. } => {
            match engine.neg_test(*sig, atom, *naf, recursive)? {
                Some(lits) => Ok(Cursor::once(lits, None)),
                None => Ok(Cursor::empty()),
            }
        }

        BinderSpec::Relation {
            rel,
            left,
            right,
            assign,
        } => match eval_relation(*rel, left, right, *assign, engine.cells, engine.store) {
            RelationOutcome::Holds(cell) => Ok(Cursor::once(Vec::new(), cell)),
            RelationOutcome::Fails => Ok(Cursor::empty()),
            RelationOutcome::Undefined => {
                engine.reporter.warn(
                    DiagnosticKind::OperationUndefined,
                    left.loc,
                    format!(
                        "operation undefined: {} {} {}",
                        left.display(engine.store),
                        rel,
                        right.display(engine.store)
                    ),
                );
                Ok(Cursor::empty())
            }
        },

        BinderSpec::Range { var, lo, hi } => {
            match start_range(var, lo, hi, bounds, engine.cells, engine.store) {
                RangeStart::Cursor(cursor) => Ok(Cursor::Range(cursor)),
                RangeStart::Empty { undefined } => {
                    if undefined {
                        engine.reporter.warn(
                            DiagnosticKind::OperationUndefined,
                            lo.loc,
                            "range over non-numeric bounds",
                        );
                    }
                    Ok(Cursor::empty())
                }
            }
        }

        BinderSpec::Script { var, name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                match arg.eval(engine.cells, engine.store) {
                    Ok(symbol) => values.push(symbol),
                    Err(_) => {
                        engine.reporter.warn(
                            DiagnosticKind::OperationUndefined,
                            arg.loc,
                            "script argument does not evaluate",
                        );
                        return Ok(Cursor::empty());
                    }
                }
            }
            let script = match engine.scripts.get(*name) {
                Some(script) => script,
                None => {
                    let name = engine.store.resolve(*name).to_string();
                    engine.reporter.error(
                        DiagnosticKind::RuntimeError,
                        args.first().map(|a| a.loc).unwrap_or_else(|| {
                            Location::new(engine.store.name("<unknown>"), (0, 0), (0, 0))
                        }),
                        format!("script {name} is not registered"),
                    );
                    return Err(GroundError::ScriptFailure(name).into());
                }
            };
            let results = match script(&values) {
                Ok(results) => results,
                Err(message) => {
                    engine.reporter.error(
                        DiagnosticKind::RuntimeError,
                        args.first().map(|a| a.loc).unwrap_or_else(|| {
                            Location::new(engine.store.name("<unknown>"), (0, 0), (0, 0))
                        }),
                        format!("script failed: {message}"),
                    );
                    return Err(GroundError::ScriptFailure(message).into());
                }
            };
            match engine.cells.value(var.cell) {
                Some(bound) => {
                    if results.contains(&bound) {
                        Ok(Cursor::once(Vec::new(), None))
                    } else {
                        Ok(Cursor::empty())
                    }
                }
                None => Ok(Cursor::Script(ScriptCursor {
                    values: results,
                    at: 0,
                    cell: Some(var.cell),
                })),
            }
        }

        BinderSpec::Aggregate(plan) => {
            let contributions = collect_contributions(plan, recursive, engine)?;
            let loc = plan
                .left
                .as_ref()
                .or(plan.right.as_ref())
                .map(|guard| guard.term.loc)
                .unwrap_or_else(|| Location::new(engine.store.name("<unknown>"), (0, 0), (0, 0)));
            match aggregates::resolve(plan, contributions, loc, engine)? {
                AggOutcome::Fail => Ok(Cursor::empty()),
                AggOutcome::Pass(lits) => Ok(Cursor::once(lits, None)),
                AggOutcome::Bind(value, lits) => {
                    let guard = plan.left.as_ref().expect("assignments have a left guard");
                    match bind_guard(guard, value, engine) {
                        Some(cell) => Ok(Cursor::once(lits, cell)),
                        None => Ok(Cursor::empty()),
                    }
                }
            }
        }

        BinderSpec::Conditional(plan) => {
            let instances = collect_cond_instances(plan, recursive, engine)?;
            match conditional::resolve(plan, instances, engine)? {
                Some(lits) => Ok(Cursor::once(lits, None)),
                None => Ok(Cursor::empty()),
            }
        }

        BinderSpec::Theory { index, sign } => {
            match engine.ground_theory_atom(*index, false)? {
                None => Ok(Cursor::empty()),
                Some(uid) => {
                    let lit = uid as i32;
                    let lits = match sign {
                        NafSign::Pos | NafSign::NotNot => vec![lit],
                        NafSign::Not => vec![-lit],
                    };
                    Ok(Cursor::once(lits, None))
                }
            }
        }
    }
}

fn advance_cursor(spec: &BinderSpec, cursor: &mut Cursor, engine: &mut Engine) -> bool {
    match (spec, cursor) {
        (BinderSpec::Scan { sig, pattern, .. }, Cursor::Scan(scan)) => {
            advance_scan(scan, *sig, pattern, engine.cells, engine.domains, engine.store)
        }
        (BinderSpec::Range { .. }, Cursor::Range(range)) => advance_range(range, engine.cells),
        (BinderSpec::Script { .. }, Cursor::Script(script)) => {
            advance_script(script, engine.cells)
        }
        (
            _,
            Cursor::Once {
                fired,
                exhausted,
                cell,
                ..
            },
        ) => {
            if *exhausted {
                if let Some(cell) = cell.take() {
                    engine.cells.clear(cell);
                }
                return false;
            }
            if *fired {
                *exhausted = true;
                if let Some(cell) = cell.take() {
                    engine.cells.clear(cell);
                }
                false
            } else {
                *fired = true;
                true
            }
        }
        _ => unreachable!("cursor kind follows its spec"),
    }
}

fn cursor_lits(cursor: &Cursor) -> Vec<i32> {
    match cursor {
        Cursor::Scan(scan) => scan.lit.into_iter().collect(),
        Cursor::Range(_) | Cursor::Script(_) => Vec::new(),
        Cursor::Once { lits, .. } => lits.clone(),
    }
}

fn bind_guard(guard: &AggrGuard, value: Symbol, engine: &mut Engine) -> Option<Option<CellKey>> {
    match &guard.term.kind {
        TermKind::Var(v) => match engine.cells.value(v.cell) {
            None => {
                engine.cells.bind_value(v.cell, value);
                Some(Some(v.cell))
            }
            Some(bound) => (bound == value).then_some(None),
        },
        TermKind::Linear { var, m, n } => {
            let y = match value {
                Symbol::Num(y) => y,
                _ => return None,
            };
            let shifted = y.checked_sub(*n)?;
            if shifted % m != 0 {
                return None;
            }
            let x = Symbol::Num(shifted / m);
            match engine.cells.value(var.cell) {
                None => {
                    engine.cells.bind_value(var.cell, x);
                    Some(Some(var.cell))
                }
                Some(bound) => (bound == x).then_some(None),
            }
        }
        _ => None,
    }
}

// }}}
// {{{ element enumeration

/// Enumerate the element conditions of an aggregate.
fn collect_contributions(
    plan: &super::AggregatePlan,
    recursive: bool,
    engine: &mut Engine,
) -> Result<Vec<Contribution>, ErrorKind> {
    let mut contributions = Vec::new();
    let windows = FxHashMap::default();
    let bounds = IeBoundMap::default();
    for element in &plan.elements {
        let mut on_match = |engine: &mut Engine, cursors: &[Cursor]| {
            let mut lits = Vec::new();
            for cursor in cursors {
                lits.extend(cursor_lits(cursor));
            }
            let mut tuple = Vec::with_capacity(element.tuple.len());
            for term in &element.tuple {
                match term.eval(engine.cells, engine.store) {
                    Ok(symbol) => tuple.push(symbol),
                    Err(_) => {
                        engine.reporter.warn(
                            DiagnosticKind::OperationUndefined,
                            term.loc,
                            format!("operation undefined: {}", term.display(engine.store)),
                        );
                        return Ok(());
                    }
                }
            }
            contributions.push(Contribution { tuple, lits });
            Ok(())
        };
        run_schedule(
            &element.schedule,
            &windows,
            &bounds,
            &|_| recursive,
            engine,
            &mut on_match,
        )?;
    }
    Ok(contributions)
}

/// Enumerate the condition of a conditional literal and evaluate the
/// conditioned literal under each instance.
fn collect_cond_instances(
    plan: &super::ConditionalPlan,
    recursive: bool,
    engine: &mut Engine,
) -> Result<Vec<CondInstance>, ErrorKind> {
    let mut instances = Vec::new();
    let windows = FxHashMap::default();
    let bounds = IeBoundMap::default();
    let mut on_match = |engine: &mut Engine, cursors: &[Cursor]| {
        let mut cond_lits = Vec::new();
        for cursor in cursors {
            cond_lits.extend(cursor_lits(cursor));
        }
        let literal = eval_conditioned_literal(&plan.literal, recursive, engine);
        instances.push(CondInstance { cond_lits, literal });
        Ok(())
    };
    run_schedule(
        &plan.element.schedule,
        &windows,
        &bounds,
        &|_| recursive,
        engine,
        &mut on_match,
    )?;
    Ok(instances)
}

fn eval_conditioned_literal(
    literal: &BodyLiteral,
    recursive: bool,
    engine: &mut Engine,
) -> LiteralState {
    match literal {
        BodyLiteral::Pred { sign, atom } => {
            let sig = match atom_sig(atom, engine.store) {
                Some(sig) => sig,
                None => return LiteralState::Fails,
            };
            let symbol = match atom.eval(engine.cells, engine.store) {
                Ok(symbol) => symbol,
                Err(_) => return LiteralState::Fails,
            };
            let state = engine.domains.domain(sig).and_then(|domain| {
                let offset = domain.offset_of(symbol)?;
                let data = domain.atom(offset);
                data.defined.then_some((data.uid, data.fact))
            });
            match (sign, state) {
                (NafSign::Pos, Some((_, true))) => LiteralState::Holds,
                (NafSign::Pos, Some((uid, false))) => LiteralState::Lit(uid as i32),
                (NafSign::Pos, None) if recursive => {
                    // Reserve so recursion through the conjunction can
                    // still resolve at solving time.
                    let offset = engine.domains.reserve(sig, symbol);
                    let uid = engine
                        .domains
                        .domain(sig)
                        .expect("the domain was just touched")
                        .atom(offset)
                        .uid;
                    LiteralState::Lit(uid as i32)
                }
                // The domain is finished: the atom is simply false.
                (NafSign::Pos, None) => LiteralState::Fails,
                (NafSign::Not, Some((_, true))) => LiteralState::Fails,
                (NafSign::Not, Some((uid, false))) => LiteralState::Lit(-(uid as i32)),
                (NafSign::Not, None) => LiteralState::Holds,
                (NafSign::NotNot, Some((_, true))) => LiteralState::Holds,
                (NafSign::NotNot, Some((uid, false))) => LiteralState::Lit(uid as i32),
                (NafSign::NotNot, None) => LiteralState::Fails,
            }
        }
        BodyLiteral::Comparison {
            neg: false,
            left,
            rights,
            ..
        } if rights.len() == 1 => {
            let lhs = match left.eval(engine.cells, engine.store) {
                Ok(symbol) => symbol,
                Err(_) => return LiteralState::Fails,
            };
            let rhs = match rights[0].1.eval(engine.cells, engine.store) {
                Ok(symbol) => symbol,
                Err(_) => return LiteralState::Fails,
            };
            if rights[0].0.holds(engine.store.cmp_symbols(lhs, rhs)) {
                LiteralState::Holds
            } else {
                LiteralState::Fails
            }
        }
        _ => LiteralState::Fails,
    }
}

// }}}
// {{{ component grounding

/// Ground the planned statements of every component, in order.
pub fn ground_components(
    plans: &[StatementPlan],
    components: &[Component],
    engine: &mut Engine,
) -> Result<(), ErrorKind> {
    for component in components {
        ground_component(plans, component, engine)?;
    }
    Ok(())
}

fn component_sigs(plans: &[StatementPlan], component: &Component, store: &SymbolStore) -> Vec<Sig> {
    let mut sigs = Vec::new();
    for &member in &component.nodes {
        if let Statement::Rule(rule) = &plans[member].statement {
            let mut heads: Vec<&Term> = Vec::new();
            match &rule.head {
                Head::Atom(atom) => heads.push(atom),
                Head::Disjunction(elements) | Head::Choice { elements, .. } => {
                    heads.extend(elements.iter().map(|element| &element.atom));
                }
                Head::Aggregate(aggregate) => {
                    heads.extend(aggregate.elements.iter().map(|element| &element.atom));
                }
                Head::False | Head::Theory(_) => {}
            }
            for head in heads {
                if let Some(sig) = atom_sig(head, store) {
                    if !sigs.contains(&sig) {
                        sigs.push(sig);
                    }
                }
            }
        }
    }
    sigs
}

fn recursive_scans(plan: &StatementPlan) -> Vec<usize> {
    plan.schedule
        .iter()
        .enumerate()
        .filter_map(|(at, spec)| match spec {
            BinderSpec::Scan { path, .. } => {
                (plan.occ_types.get(path) == Some(&OccurrenceType::Unstratified)).then_some(at)
            }
            _ => None,
        })
        .collect()
}

/// True if some occurrence nested below a body literal is
/// unstratified: the statement must re-fire every pass.
fn needs_refire(plan: &StatementPlan) -> bool {
    plan.occ_types.iter().any(|(path, occ)| {
        matches!(path, OccPath::BodyElem { .. } | OccPath::Head { .. })
            && *occ == OccurrenceType::Unstratified
    })
}

fn is_recursive_path(plan: &StatementPlan, path: &OccPath) -> bool {
    plan.occ_types.get(path) == Some(&OccurrenceType::Unstratified)
}

fn ground_component(
    plans: &[StatementPlan],
    component: &Component,
    engine: &mut Engine,
) -> Result<(), ErrorKind> {
    let sigs = component_sigs(plans, component, engine.store);
    let counts = |engine: &Engine| -> FxHashMap<Sig, usize> {
        sigs.iter()
            .map(|&sig| {
                let count = engine
                    .domains
                    .domain(sig)
                    .map(|domain| domain.defined_count())
                    .unwrap_or(0);
                (sig, count)
            })
            .collect()
    };

    let mut prev: FxHashMap<Sig, usize> = sigs.iter().map(|&sig| (sig, 0)).collect();
    let mut pass: u32 = 0;
    loop {
        let snapshot = counts(engine);
        if pass > 0 && sigs.iter().all(|sig| snapshot[sig] == prev[sig]) {
            break;
        }
        log::debug!(
            target: targets::INSTANTIATE,
            "component pass {pass} over {} statements",
            component.nodes.len()
        );
        for &member in &component.nodes {
            let plan = &plans[member];
            if plan.rejected {
                continue;
            }
            let recursive = recursive_scans(plan);
            if pass == 0 {
                // Everything that existed when the component started.
                let mut windows = FxHashMap::default();
                for &at in &recursive {
                    if let BinderSpec::Scan { sig, .. } = &plan.schedule[at] {
                        windows.insert(at, Window::all(*snapshot.get(sig).unwrap_or(&0)));
                    }
                }
                ground_statement(plan, &windows, engine)?;
                continue;
            }
            if recursive.is_empty() {
                if needs_refire(plan) {
                    let windows = FxHashMap::default();
                    ground_statement(plan, &windows, engine)?;
                }
                continue;
            }
            for (designated_index, &designated) in recursive.iter().enumerate() {
                let mut windows = FxHashMap::default();
                for (other_index, &other) in recursive.iter().enumerate() {
                    let sig = match &plan.schedule[other] {
                        BinderSpec::Scan { sig, .. } => *sig,
                        _ => continue,
                    };
                    let start_of_new = *prev.get(&sig).unwrap_or(&0);
                    let end_of_new = *snapshot.get(&sig).unwrap_or(&0);
                    let window = if other == designated {
                        Window {
                            start: start_of_new,
                            end: end_of_new,
                        }
                    } else if other_index < designated_index {
                        Window::all(start_of_new)
                    } else {
                        Window::all(end_of_new)
                    };
                    windows.insert(other, window);
                }
                ground_statement(plan, &windows, engine)?;
            }
        }
        for &sig in &sigs {
            engine.domains.domain_mut(sig).next_generation();
        }
        prev = snapshot;
        pass += 1;
        if component.positive
            && component.nodes.iter().all(|&member| {
                recursive_scans(&plans[member]).is_empty() && !needs_refire(&plans[member])
            })
        {
            break;
        }
    }
    Ok(())
}

fn ground_statement(
    plan: &StatementPlan,
    windows: &FxHashMap<usize, Window>,
    engine: &mut Engine,
) -> Result<(), ErrorKind> {
    let recursive = |at: usize| {
        match &plan.schedule[at] {
            BinderSpec::Scan { path, .. } | BinderSpec::NegTest { path, .. } => {
                is_recursive_path(plan, path)
            }
            // Nested scopes re-fire while any of their occurrences sit
            // in the same component; absent atoms stay open until then.
            BinderSpec::Aggregate(_) | BinderSpec::Conditional(_) | BinderSpec::Theory { .. } => {
                needs_refire(plan)
            }
            _ => false,
        }
    };
    let mut on_match = |engine: &mut Engine, cursors: &[Cursor]| {
        let mut body = Vec::new();
        for cursor in cursors {
            body.extend(cursor_lits(cursor));
        }
        fire(plan, body, engine)
    };
    run_schedule(
        &plan.schedule,
        windows,
        &plan.bounds,
        &recursive,
        engine,
        &mut on_match,
    )
}

// }}}
// {{{ firing

/// An enumerated instance of a head element: its atom and the
/// literals of its condition.
struct HeadInstance {
    symbol: Symbol,
    sig: Sig,
    cond_lits: Vec<i32>,
    weight: Option<Symbol>,
}

fn enumerate_head_elements(
    elements: &[ElementPlan],
    engine: &mut Engine,
) -> Result<Vec<HeadInstance>, ErrorKind> {
    let mut instances = Vec::new();
    let windows = FxHashMap::default();
    let bounds = IeBoundMap::default();
    for element in elements {
        let atom = element.atom.clone().expect("head elements carry an atom");
        let tuple = element.tuple.clone();
        let mut on_match = |engine: &mut Engine, cursors: &[Cursor]| {
            let mut cond_lits = Vec::new();
            for cursor in cursors {
                cond_lits.extend(cursor_lits(cursor));
            }
            let symbol = match atom.eval(engine.cells, engine.store) {
                Ok(symbol) => symbol,
                Err(_) => {
                    engine.reporter.warn(
                        DiagnosticKind::OperationUndefined,
                        atom.loc,
                        format!("operation undefined: {}", atom.display(engine.store)),
                    );
                    return Ok(());
                }
            };
            let sig = match engine.store.sig(symbol) {
                Some(sig) => sig,
                None => return Ok(()),
            };
            let weight = match tuple.first() {
                None => None,
                Some(term) => match term.eval(engine.cells, engine.store) {
                    Ok(symbol) => Some(symbol),
                    Err(_) => return Ok(()),
                },
            };
            instances.push(HeadInstance {
                symbol,
                sig,
                cond_lits,
                weight,
            });
            Ok(())
        };
        run_schedule(
            &element.schedule,
            &windows,
            &bounds,
            &|_| true,
            engine,
            &mut on_match,
        )?;
    }
    Ok(instances)
}

fn define_head_atom(engine: &mut Engine, sig: Sig, symbol: Symbol, fact: bool) -> u32 {
    let (offset, _) = engine.domains.define(sig, symbol, fact);
    engine
        .domains
        .domain(sig)
        .expect("the domain was just touched")
        .atom(offset)
        .uid
}

/// Enforce the guards of a choice or head aggregate over its element
/// instances.
fn head_bound_checks(
    fun: AggrFun,
    left: &Option<AggrGuard>,
    right: &Option<AggrGuard>,
    instances: &[(u32, Option<Symbol>, Vec<i32>)],
    body: &[i32],
    aux: NameId,
    engine: &mut Engine,
) -> Result<(), ErrorKind> {
    if left.is_none() && right.is_none() {
        return Ok(());
    }
    // Every element instance is conditional from the solver's view:
    // the element atom itself decides whether the tuple counts.
    let mut conditional: Vec<(i32, i64)> = Vec::new();
    for (uid, weight, _) in instances {
        let weight = match fun {
            AggrFun::Count => 1,
            _ => match weight {
                Some(Symbol::Num(w)) => *w as i64,
                _ => 1,
            },
        };
        conditional.push((*uid as i32, weight));
    }
    for (guard, left_side) in [(left, true), (right, false)] {
        let guard = match guard {
            Some(guard) => guard,
            None => continue,
        };
        let symbol = match guard.term.eval(engine.cells, engine.store) {
            Ok(Symbol::Num(bound)) => bound as i64,
            _ => {
                engine.reporter.warn(
                    DiagnosticKind::OperationUndefined,
                    guard.term.loc,
                    "aggregate guard is not a number",
                );
                continue;
            }
        };
        let rel = if left_side {
            guard.relation.mirror()
        } else {
            guard.relation
        };
        // A constraint per violated direction: the body holds and the
        // bound fails.
        emit_head_guard(rel, symbol, &conditional, body, aux, engine)?;
    }
    Ok(())
}

fn emit_head_guard(
    rel: Relation,
    bound: i64,
    conditional: &[(i32, i64)],
    body: &[i32],
    aux: NameId,
    engine: &mut Engine,
) -> Result<(), ErrorKind> {
    // reach(b) holds when the chosen elements reach b.
    let reach = |engine: &mut Engine, b: i64| -> Result<Option<i32>, ErrorKind> {
        let positives: i64 = conditional.iter().map(|&(_, w)| w.max(0)).sum();
        let negatives: i64 = conditional.iter().map(|&(_, w)| w.min(0)).sum();
        if b <= negatives {
            return Ok(None); // always reached
        }
        if b > positives {
            // Never reached; literal zero is the callers' marker.
            return Ok(Some(0));
        }
        let clamped = b.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        // The elements participate in the key: distinct rule instances
        // with coinciding bounds must not share the atom.
        let mut key = vec![Symbol::Num(clamped)];
        key.extend(conditional.iter().map(|&(lit, _)| Symbol::Num(lit)));
        let uid = engine.aux_atom(aux, "#hge", &[], &key)?;
        let weighted: Vec<WeightedLiteral> = conditional
            .iter()
            .map(|&(literal, weight)| WeightedLiteral {
                literal,
                weight: weight.clamp(i32::MIN as i64, i32::MAX as i64) as i32,
            })
            .collect();
        engine.emit_weighted_dedup(uid, clamped, &weighted);
        Ok(Some(uid as i32))
    };

    // `:- body, not (agg REL bound)` per relation, through reach
    // atoms.  reach(b) == Some(0) encodes "never reached".
    let constraint = |engine: &mut Engine, extra: Vec<i32>| {
        let mut lits = body.to_vec();
        lits.extend(extra);
        engine.emit_rule_dedup(&[], &lits);
    };
    match rel {
        // agg ≥ bound must hold: forbid not reaching it.
        Relation::Ge => match reach(engine, bound)? {
            None => {}
            Some(0) => constraint(engine, Vec::new()),
            Some(lit) => constraint(engine, vec![-lit]),
        },
        Relation::Gt => match reach(engine, bound + 1)? {
            None => {}
            Some(0) => constraint(engine, Vec::new()),
            Some(lit) => constraint(engine, vec![-lit]),
        },
        // agg ≤ bound must hold: forbid reaching bound + 1.
        Relation::Le => match reach(engine, bound + 1)? {
            None => constraint(engine, Vec::new()),
            Some(0) => {}
            Some(lit) => constraint(engine, vec![lit]),
        },
        Relation::Lt => match reach(engine, bound)? {
            None => constraint(engine, Vec::new()),
            Some(0) => {}
            Some(lit) => constraint(engine, vec![lit]),
        },
        Relation::Eq => {
            emit_head_guard(Relation::Ge, bound, conditional, body, aux, engine)?;
            emit_head_guard(Relation::Le, bound, conditional, body, aux, engine)?;
        }
        Relation::Ne => {
            // Forbid agg = bound: body, reach(bound), not reach(bound+1).
            let lower = reach(engine, bound)?;
            let upper = reach(engine, bound + 1)?;
            let mut extra = Vec::new();
            match lower {
                None => {}
                Some(0) => return Ok(()), // can never equal
                Some(lit) => extra.push(lit),
            }
            match upper {
                None => return Ok(()), // always above
                Some(0) => {}
                Some(lit) => extra.push(-lit),
            }
            constraint(engine, extra);
        }
    }
    Ok(())
}

fn fire(plan: &StatementPlan, body: Vec<i32>, engine: &mut Engine) -> Result<(), ErrorKind> {
    match &plan.statement {
        Statement::Rule(rule) => fire_rule(plan, rule, body, engine),
        Statement::Minimize {
            weight,
            priority,
            tuple,
            loc,
            ..
        } => {
            let (weight_n, priority_n) = match (
                weight.eval(engine.cells, engine.store),
                priority.eval(engine.cells, engine.store),
            ) {
                (Ok(Symbol::Num(w)), Ok(Symbol::Num(p))) => (w, p),
                _ => {
                    engine.reporter.warn(
                        DiagnosticKind::OperationUndefined,
                        *loc,
                        "weak constraint weight or priority is not a number",
                    );
                    return Ok(());
                }
            };
            let mut tuple_syms = Vec::with_capacity(tuple.len());
            for term in tuple {
                match term.eval(engine.cells, engine.store) {
                    Ok(symbol) => tuple_syms.push(symbol),
                    Err(_) => {
                        engine.reporter.warn(
                            DiagnosticKind::OperationUndefined,
                            term.loc,
                            "weak constraint tuple does not evaluate",
                        );
                        return Ok(());
                    }
                }
            }
            let aux = match engine.minimize_aux {
                Some(aux) => aux,
                None => {
                    let aux = engine.store.name("#accu");
                    engine.minimize_aux = Some(aux);
                    aux
                }
            };
            let key = (weight_n, priority_n, tuple_syms.clone());
            let uid = match engine.minimize_seen.get(&key) {
                Some(&uid) => uid,
                None => {
                    let mut parts = vec![Symbol::Num(weight_n), Symbol::Num(priority_n)];
                    parts.extend(tuple_syms);
                    let tuple_sym = engine.store.tuple(parts);
                    let symbol = engine.store.fun(aux, vec![tuple_sym], false);
                    let sig = Sig {
                        name: aux,
                        arity: 1,
                        sign: false,
                    };
                    let (offset, _) = engine.domains.define(sig, symbol, false);
                    let uid = engine
                        .domains
                        .domain(sig)
                        .expect("the domain was just touched")
                        .atom(offset)
                        .uid;
                    engine.minimize_seen.insert(key, uid);
                    engine.minimize.push((
                        priority_n,
                        WeightedLiteral {
                            literal: uid as i32,
                            weight: weight_n,
                        },
                    ));
                    uid
                }
            };
            engine.emit_rule_dedup(&[uid], &body);
            Ok(())
        }
        Statement::Show { term, loc, .. } => {
            match term.eval(engine.cells, engine.store) {
                Ok(symbol) => engine.emitter.output(symbol, &body),
                Err(_) => {
                    engine.reporter.warn(
                        DiagnosticKind::OperationUndefined,
                        *loc,
                        "shown term does not evaluate",
                    );
                }
            }
            Ok(())
        }
        Statement::ShowSig { name, arity, .. } => {
            if !engine.shown_sigs.contains(&(*name, *arity)) {
                engine.shown_sigs.push((*name, *arity));
            }
            Ok(())
        }
        Statement::External {
            atom, value, loc, ..
        } => {
            let symbol = match atom.eval(engine.cells, engine.store) {
                Ok(symbol) => symbol,
                Err(_) => {
                    engine.reporter.warn(
                        DiagnosticKind::OperationUndefined,
                        *loc,
                        "external atom does not evaluate",
                    );
                    return Ok(());
                }
            };
            let sig = match engine.store.sig(symbol) {
                Some(sig) => sig,
                None => return Ok(()),
            };
            let offset = engine.domains.set_external(sig, symbol, *value);
            let uid = engine
                .domains
                .domain(sig)
                .expect("the domain was just touched")
                .atom(offset)
                .uid;
            engine.emitter.external(uid, *value);
            Ok(())
        }
        Statement::Edge { u, v, loc, .. } => {
            let (us, vs) = match (
                u.eval(engine.cells, engine.store),
                v.eval(engine.cells, engine.store),
            ) {
                (Ok(us), Ok(vs)) => (us, vs),
                _ => {
                    engine.reporter.warn(
                        DiagnosticKind::OperationUndefined,
                        *loc,
                        "edge endpoint does not evaluate",
                    );
                    return Ok(());
                }
            };
            let next = engine.edge_nodes.len() as i32;
            let source = *engine.edge_nodes.entry(us).or_insert(next);
            let next = engine.edge_nodes.len() as i32;
            let target = *engine.edge_nodes.entry(vs).or_insert(next);
            engine.emitter.acyc_edge(source, target, &body);
            Ok(())
        }
        Statement::Heuristic {
            atom,
            bias,
            priority,
            modifier,
            loc,
            ..
        } => {
            let symbol = match atom.eval(engine.cells, engine.store) {
                Ok(symbol) => symbol,
                Err(_) => {
                    engine.reporter.warn(
                        DiagnosticKind::OperationUndefined,
                        *loc,
                        "heuristic atom does not evaluate",
                    );
                    return Ok(());
                }
            };
            let sig = match engine.store.sig(symbol) {
                Some(sig) => sig,
                None => return Ok(()),
            };
            let (bias_n, priority_n) = match (
                bias.eval(engine.cells, engine.store),
                priority.eval(engine.cells, engine.store),
            ) {
                (Ok(Symbol::Num(b)), Ok(Symbol::Num(p))) => (b, p.max(0) as u32),
                _ => {
                    engine.reporter.warn(
                        DiagnosticKind::OperationUndefined,
                        *loc,
                        "heuristic bias or priority is not a number",
                    );
                    return Ok(());
                }
            };
            let offset = engine.domains.reserve(sig, symbol);
            let uid = engine
                .domains
                .domain(sig)
                .expect("the domain was just touched")
                .atom(offset)
                .uid;
            engine
                .emitter
                .heuristic(uid, *modifier, bias_n, priority_n, &body);
            Ok(())
        }
        Statement::Project { atom, loc, .. } => {
            let symbol = match atom.eval(engine.cells, engine.store) {
                Ok(symbol) => symbol,
                Err(_) => {
                    engine.reporter.warn(
                        DiagnosticKind::OperationUndefined,
                        *loc,
                        "projected atom does not evaluate",
                    );
                    return Ok(());
                }
            };
            let sig = match engine.store.sig(symbol) {
                Some(sig) => sig,
                None => return Ok(()),
            };
            let offset = engine.domains.reserve(sig, symbol);
            let uid = engine
                .domains
                .domain(sig)
                .expect("the domain was just touched")
                .atom(offset)
                .uid;
            engine.emitter.project(&[uid]);
            Ok(())
        }
        Statement::ProjectSig { name, arity, .. } => {
            if !engine.project_sigs.contains(&(*name, *arity)) {
                engine.project_sigs.push((*name, *arity));
            }
            Ok(())
        }
        Statement::Define { .. } => Ok(()),
    }
}

fn fire_rule(
    plan: &StatementPlan,
    rule: &Rule,
    body: Vec<i32>,
    engine: &mut Engine,
) -> Result<(), ErrorKind> {
    match &rule.head {
        Head::False => {
            engine.emit_rule_dedup(&[], &body);
            Ok(())
        }

        Head::Atom(atom) => {
            let symbol = match atom.eval(engine.cells, engine.store) {
                Ok(symbol) => symbol,
                Err(_) => {
                    // An undefined head derives nothing.
                    engine.reporter.warn(
                        DiagnosticKind::OperationUndefined,
                        atom.loc,
                        format!("operation undefined: {}", atom.display(engine.store)),
                    );
                    return Ok(());
                }
            };
            let sig = match engine.store.sig(symbol) {
                Some(sig) => sig,
                None => return Ok(()),
            };
            let fact = body.is_empty();
            let uid = define_head_atom(engine, sig, symbol, fact);
            if !fact || engine.keep_facts {
                engine.emit_rule_dedup(&[uid], &body);
            }
            Ok(())
        }

        Head::Theory(index) => {
            let directive = body.is_empty() && rule.body.is_empty();
            if let Some(uid) = engine.ground_theory_atom(*index, directive)? {
                if uid != 0 {
                    engine.emit_rule_dedup(&[uid], &body);
                }
            }
            Ok(())
        }

        Head::Disjunction(_) => {
            let instances = enumerate_head_elements(&plan.head_elements, engine)?;
            if instances.is_empty() {
                // An empty disjunction holds of nothing.
                engine.emit_rule_dedup(&[], &body);
                return Ok(());
            }
            let mut head = Vec::with_capacity(instances.len());
            let mut full_body = body;
            for instance in &instances {
                // The element's condition shifts into the body.
                full_body.extend(instance.cond_lits.iter().copied());
            }
            let singleton_fact = instances.len() == 1 && full_body.is_empty();
            for instance in &instances {
                let uid =
                    define_head_atom(engine, instance.sig, instance.symbol, singleton_fact);
                if !head.contains(&uid) {
                    head.push(uid);
                }
            }
            engine.emit_rule_dedup(&head, &full_body);
            Ok(())
        }

        Head::Choice { left, right, .. } => {
            let instances = enumerate_head_elements(&plan.head_elements, engine)?;
            let mut emitted = Vec::with_capacity(instances.len());
            for instance in &instances {
                let uid = define_head_atom(engine, instance.sig, instance.symbol, false);
                let mut choice_body = body.clone();
                choice_body.extend(instance.cond_lits.iter().copied());
                engine.emit_choice_dedup(&[uid], &choice_body);
                emitted.push((uid, instance.weight, instance.cond_lits.clone()));
            }
            let aux = engine.store.name("#d");
            head_bound_checks(AggrFun::Count, left, right, &emitted, &body, aux, engine)
        }

        Head::Aggregate(aggregate) => {
            let instances = enumerate_head_elements(&plan.head_elements, engine)?;
            let mut emitted = Vec::with_capacity(instances.len());
            for instance in &instances {
                let uid = define_head_atom(engine, instance.sig, instance.symbol, false);
                let mut choice_body = body.clone();
                choice_body.extend(instance.cond_lits.iter().copied());
                engine.emit_choice_dedup(&[uid], &choice_body);
                emitted.push((uid, instance.weight, instance.cond_lits.clone()));
            }
            let aux = engine.store.name("#d");
            head_bound_checks(
                aggregate.fun,
                &aggregate.left,
                &aggregate.right,
                &emitted,
                &body,
                aux,
                engine,
            )
        }
    }
}

// }}}
// {{{ step boundaries

impl Engine<'_> {
    /// Flush the buffered step-level output: minimise groups, shown
    /// and projected signatures.
    pub fn finish_step(&mut self) {
        // Minimise entries grouped by priority, in first-seen order.
        let mut priorities: Vec<i32> = Vec::new();
        for (priority, _) in &self.minimize {
            if !priorities.contains(priority) {
                priorities.push(*priority);
            }
        }
        for priority in priorities {
            let literals: Vec<WeightedLiteral> = self
                .minimize
                .iter()
                .filter(|(p, _)| *p == priority)
                .map(|(_, w)| *w)
                .collect();
            self.emitter.minimize(priority, &literals);
        }
        self.minimize.clear();

        let shown = std::mem::take(&mut self.shown_sigs);
        for (name, arity) in &shown {
            let sig = Sig {
                name: *name,
                arity: *arity,
                sign: false,
            };
            let atoms: Vec<(Symbol, Option<u32>)> = match self.domains.domain(sig) {
                None => Vec::new(),
                Some(domain) => (0..domain.defined_count())
                    .map(|at| {
                        let data = domain.defined_at(at);
                        (data.symbol, (!data.fact).then_some(data.uid))
                    })
                    .collect(),
            };
            for (symbol, uid) in atoms {
                match uid {
                    Some(uid) => self.emitter.output(symbol, &[uid as i32]),
                    None => self.emitter.output(symbol, &[]),
                }
            }
        }
        self.shown_sigs = shown;

        let projected = std::mem::take(&mut self.project_sigs);
        for (name, arity) in &projected {
            let sig = Sig {
                name: *name,
                arity: *arity,
                sign: false,
            };
            let atoms: Vec<u32> = match self.domains.domain(sig) {
                None => Vec::new(),
                Some(domain) => (0..domain.defined_count())
                    .map(|at| domain.defined_at(at).uid)
                    .collect(),
            };
            if !atoms.is_empty() {
                self.emitter.project(&atoms);
            }
        }
        self.project_sigs = projected;
    }
}

/// Report body occurrences no head provides.
pub fn report_undefined(plans: &[StatementPlan], store: &SymbolStore, reporter: &mut Reporter) {
    let mut seen: FxHashSet<(Sig, Location)> = FxHashSet::default();
    for plan in plans {
        for path in &plan.undefined {
            let literal = match path {
                OccPath::Body(index) => match plan.statement {
                    Statement::Rule(ref rule) => rule.body.get(*index),
                    _ => continue,
                },
                _ => continue,
            };
            let (sign, atom) = match literal {
                Some(BodyLiteral::Pred { sign, atom }) => (sign, atom),
                _ => continue,
            };
            if sign.is_positive() {
                // A positive occurrence over an empty domain grounds
                // to nothing; only tests are worth an info.
                continue;
            }
            let sig = match atom_sig(atom, store) {
                Some(sig) => sig,
                None => continue,
            };
            if store.resolve(sig.name).starts_with('#') {
                continue;
            }
            if seen.insert((sig, atom.loc)) {
                reporter.info(
                    DiagnosticKind::AtomUndefined,
                    atom.loc,
                    format!(
                        "atom {}/{} does not occur in any rule head",
                        store.resolve(sig.name),
                        sig.arity
                    ),
                );
            }
        }
    }
}

// }}}
