/*!
The ground program emitter --- the grounder's output surface.

The grounder drives an [Emitter] with a stream of typed events in
emission order: `init_program`, then per step `begin_step`, the
statements derived during the step, and `end_step`.
Atoms are the non-zero identifiers handed out by the
[domain store](crate::db::DomainStore); a literal is a signed atom
identifier; a weighted literal pairs a literal with its weight.

Within a step, all rules of one component are emitted before any rule
of a later component.
Partial output of an aborted step is the emitter's to discard.

[RecordingEmitter] keeps the stream as data, for tests and for
inspection.
*/

use crate::structures::{
    rule::{ExternalValue, HeuristicMod},
    symbol::Symbol,
};

/// An atom identifier; non-zero.
pub type AtomId = u32;

/// A signed atom reference.
pub type LiteralId = i32;

/// A literal with a weight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WeightedLiteral {
    /// The literal.
    pub literal: LiteralId,

    /// The weight.
    pub weight: i32,
}

/// How a rule head is read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeadKind {
    /// The head atoms form a disjunction.
    Disjunctive,

    /// The head atoms form a choice.
    Choice,
}

/// A theory term payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TheoryTermData {
    /// A number.
    Number(i32),

    /// A symbolic constant or string.
    Symbol(Symbol),

    /// A function application; the name is a previously emitted term.
    Function(u32, Vec<u32>),

    /// A tuple of previously emitted terms.
    Tuple(Vec<u32>),

    /// A set of previously emitted terms.
    Set(Vec<u32>),

    /// A list of previously emitted terms.
    List(Vec<u32>),
}

/// The receiver of the ground program.
///
/// Invoked synchronously from the grounder thread; every method has a
/// default empty body, so an emitter implements only the events it
/// cares about.
pub trait Emitter {
    /// The stream begins; `incremental` announces more than one step.
    fn init_program(&mut self, incremental: bool) {
        let _ = incremental;
    }

    /// A step begins.
    fn begin_step(&mut self) {}

    /// A disjunctive or choice rule.
    fn rule(&mut self, head_kind: HeadKind, head: &[AtomId], body: &[LiteralId]) {
        let _ = (head_kind, head, body);
    }

    /// A rule with a weighted body and a lower bound.
    fn weighted_rule(
        &mut self,
        head_kind: HeadKind,
        head: &[AtomId],
        lower: i32,
        body: &[WeightedLiteral],
    ) {
        let _ = (head_kind, head, lower, body);
    }

    /// A minimise statement at a priority.
    fn minimize(&mut self, priority: i32, literals: &[WeightedLiteral]) {
        let _ = (priority, literals);
    }

    /// A projection directive.
    fn project(&mut self, atoms: &[AtomId]) {
        let _ = atoms;
    }

    /// A shown symbol under a condition.
    fn output(&mut self, symbol: Symbol, condition: &[LiteralId]) {
        let _ = (symbol, condition);
    }

    /// An external atom and its assigned truth.
    fn external(&mut self, atom: AtomId, value: ExternalValue) {
        let _ = (atom, value);
    }

    /// Assumptions for the next solve.
    fn assume(&mut self, literals: &[LiteralId]) {
        let _ = literals;
    }

    /// A heuristic directive.
    fn heuristic(
        &mut self,
        atom: AtomId,
        modifier: HeuristicMod,
        bias: i32,
        priority: u32,
        condition: &[LiteralId],
    ) {
        let _ = (atom, modifier, bias, priority, condition);
    }

    /// An acyclicity edge under a condition.
    fn acyc_edge(&mut self, source: i32, target: i32, condition: &[LiteralId]) {
        let _ = (source, target, condition);
    }

    /// A theory term definition.
    fn theory_term(&mut self, id: u32, term: &TheoryTermData) {
        let _ = (id, term);
    }

    /// A theory element over previously emitted terms.
    fn theory_element(&mut self, id: u32, terms: &[u32], condition: &[LiteralId]) {
        let _ = (id, terms, condition);
    }

    /// A theory atom: its program atom (zero for a directive), name
    /// term, elements, and optional guard.
    fn theory_atom(
        &mut self,
        atom: AtomId,
        name_term: u32,
        elements: &[u32],
        guard: Option<(u32, u32)>,
    ) {
        let _ = (atom, name_term, elements, guard);
    }

    /// The step is complete.
    fn end_step(&mut self) {}
}

/// One recorded event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// `init_program`.
    InitProgram(bool),

    /// `begin_step`.
    BeginStep,

    /// `rule`.
    Rule(HeadKind, Vec<AtomId>, Vec<LiteralId>),

    /// `weighted_rule`.
    WeightedRule(HeadKind, Vec<AtomId>, i32, Vec<WeightedLiteral>),

    /// `minimize`.
    Minimize(i32, Vec<WeightedLiteral>),

    /// `project`.
    Project(Vec<AtomId>),

    /// `output`.
    Output(Symbol, Vec<LiteralId>),

    /// `external`.
    External(AtomId, ExternalValue),

    /// `assume`.
    Assume(Vec<LiteralId>),

    /// `heuristic`.
    Heuristic(AtomId, HeuristicMod, i32, u32, Vec<LiteralId>),

    /// `acyc_edge`.
    AcycEdge(i32, i32, Vec<LiteralId>),

    /// `theory_term`.
    TheoryTerm(u32, TheoryTermData),

    /// `theory_element`.
    TheoryElement(u32, Vec<u32>, Vec<LiteralId>),

    /// `theory_atom`.
    TheoryAtom(AtomId, u32, Vec<u32>, Option<(u32, u32)>),

    /// `end_step`.
    EndStep,
}

/// An emitter that records the stream as [Event]s.
#[derive(Default)]
pub struct RecordingEmitter {
    /// The recorded events, in emission order.
    pub events: Vec<Event>,
}

impl RecordingEmitter {
    /// The recorded rule events.
    pub fn rules(&self) -> impl Iterator<Item = (&HeadKind, &Vec<AtomId>, &Vec<LiteralId>)> {
        self.events.iter().filter_map(|event| match event {
            Event::Rule(kind, head, body) => Some((kind, head, body)),
            _ => None,
        })
    }

    /// The recorded facts: rules with one head atom and no body.
    pub fn facts(&self) -> impl Iterator<Item = AtomId> + '_ {
        self.rules().filter_map(|(kind, head, body)| {
            if *kind == HeadKind::Disjunctive && head.len() == 1 && body.is_empty() {
                Some(head[0])
            } else {
                None
            }
        })
    }
}

impl Emitter for RecordingEmitter {
    fn init_program(&mut self, incremental: bool) {
        self.events.push(Event::InitProgram(incremental));
    }

    fn begin_step(&mut self) {
        self.events.push(Event::BeginStep);
    }

    fn rule(&mut self, head_kind: HeadKind, head: &[AtomId], body: &[LiteralId]) {
        self.events
            .push(Event::Rule(head_kind, head.to_vec(), body.to_vec()));
    }

    fn weighted_rule(
        &mut self,
        head_kind: HeadKind,
        head: &[AtomId],
        lower: i32,
        body: &[WeightedLiteral],
    ) {
        self.events.push(Event::WeightedRule(
            head_kind,
            head.to_vec(),
            lower,
            body.to_vec(),
        ));
    }

    fn minimize(&mut self, priority: i32, literals: &[WeightedLiteral]) {
        self.events.push(Event::Minimize(priority, literals.to_vec()));
    }

    fn project(&mut self, atoms: &[AtomId]) {
        self.events.push(Event::Project(atoms.to_vec()));
    }

    fn output(&mut self, symbol: Symbol, condition: &[LiteralId]) {
        self.events.push(Event::Output(symbol, condition.to_vec()));
    }

    fn external(&mut self, atom: AtomId, value: ExternalValue) {
        self.events.push(Event::External(atom, value));
    }

    fn assume(&mut self, literals: &[LiteralId]) {
        self.events.push(Event::Assume(literals.to_vec()));
    }

    fn heuristic(
        &mut self,
        atom: AtomId,
        modifier: HeuristicMod,
        bias: i32,
        priority: u32,
        condition: &[LiteralId],
    ) {
        self.events.push(Event::Heuristic(
            atom,
            modifier,
            bias,
            priority,
            condition.to_vec(),
        ));
    }

    fn acyc_edge(&mut self, source: i32, target: i32, condition: &[LiteralId]) {
        self.events
            .push(Event::AcycEdge(source, target, condition.to_vec()));
    }

    fn theory_term(&mut self, id: u32, term: &TheoryTermData) {
        self.events.push(Event::TheoryTerm(id, term.clone()));
    }

    fn theory_element(&mut self, id: u32, terms: &[u32], condition: &[LiteralId]) {
        self.events
            .push(Event::TheoryElement(id, terms.to_vec(), condition.to_vec()));
    }

    fn theory_atom(
        &mut self,
        atom: AtomId,
        name_term: u32,
        elements: &[u32],
        guard: Option<(u32, u32)>,
    ) {
        self.events
            .push(Event::TheoryAtom(atom, name_term, elements.to_vec(), guard));
    }

    fn end_step(&mut self) {
        self.events.push(Event::EndStep);
    }
}
