/*!
Rules, heads, statements, and programs.

A [Rule] pairs a [Head] with a body.
Beyond rules, a program carries directive [Statement]s --- constant
definitions, optimisation, externals, projections, and so on --- each
grounded with the same body machinery and delivered through its own
[emitter](crate::output) event.

Statements are grouped into named [program parts](ProgramPart); the
caller selects which parts to instantiate in a step, with which
argument tuples.
The name of the reserved base part is `base`.
*/

use crate::{
    reports::Location,
    structures::{
        literal::{AggrFun, AggrGuard, BodyLiteral},
        symbol::NameId,
        term::Term,
    },
    structures::theory::{TheoryAtom, TheoryDefinition},
};

/// A head element with a condition, as in `a : c₁, …` inside a
/// disjunction or choice.
#[derive(Clone, Debug)]
pub struct CondHead {
    /// The head atom.
    pub atom: Term,

    /// The condition, level-one local.
    pub condition: Vec<BodyLiteral>,
}

/// One element of a head aggregate: tuple, atom, and condition.
#[derive(Clone, Debug)]
pub struct HeadAggrElem {
    /// The term tuple.
    pub tuple: Vec<Term>,

    /// The conditioned head atom.
    pub atom: Term,

    /// The condition, level-one local.
    pub condition: Vec<BodyLiteral>,
}

/// A head aggregate with optional guards.
#[derive(Clone, Debug)]
pub struct HeadAggregate {
    /// The aggregate function.
    pub fun: AggrFun,

    /// The guard left of the aggregate.
    pub left: Option<AggrGuard>,

    /// The guard right of the aggregate.
    pub right: Option<AggrGuard>,

    /// The elements.
    pub elements: Vec<HeadAggrElem>,
}

/// The head of a rule.
#[derive(Clone, Debug)]
pub enum Head {
    /// No head; an integrity constraint.
    False,

    /// A single atom.
    Atom(Term),

    /// A disjunction of conditioned atoms.
    Disjunction(Vec<CondHead>),

    /// A choice over conditioned atoms, with optional cardinality
    /// guards.
    Choice {
        /// The guard left of the braces.
        left: Option<AggrGuard>,
        /// The guard right of the braces.
        right: Option<AggrGuard>,
        /// The elements.
        elements: Vec<CondHead>,
    },

    /// A head aggregate.
    Aggregate(HeadAggregate),

    /// A theory atom in head position.
    Theory(usize),
}

/// A rule: head, body, location.
#[derive(Clone, Debug)]
pub struct Rule {
    /// The head.
    pub head: Head,

    /// The body, an ordered multiset of literals.
    pub body: Vec<BodyLiteral>,

    /// Where the rule was written.
    pub loc: Location,
}

/// The truth a caller assigns to an external atom.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExternalValue {
    /// Open; the solver decides.
    Free,

    /// Fixed true.
    True,

    /// Fixed false.
    False,

    /// No longer external; forget the atom.
    Release,
}

/// The modifier of a heuristic directive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeuristicMod {
    /// Decision level.
    Level,

    /// Preferred sign.
    Sign,

    /// Activity factor.
    Factor,

    /// Initial activity.
    Init,

    /// Prefer true.
    True,

    /// Prefer false.
    False,
}

/// A statement of a program part.
#[derive(Clone, Debug)]
pub enum Statement {
    /// A rule.
    Rule(Rule),

    /// `#const name = value.`
    Define {
        /// The constant's name.
        name: NameId,
        /// The defining term; ground after substitution.
        value: Term,
        /// True for a definition injected by the caller, which any
        /// in-program definition overrides.
        default: bool,
        /// Where the define was written.
        loc: Location,
    },

    /// `:~ body. [weight@priority, tuple]`, a weak constraint.
    Minimize {
        /// The weight term.
        weight: Term,
        /// The priority term.
        priority: Term,
        /// The discriminating tuple.
        tuple: Vec<Term>,
        /// The body.
        body: Vec<BodyLiteral>,
        /// Where the statement was written.
        loc: Location,
    },

    /// `#show term : body.`
    Show {
        /// The shown term.
        term: Term,
        /// The condition.
        body: Vec<BodyLiteral>,
        /// Where the statement was written.
        loc: Location,
    },

    /// `#show name/arity.`
    ShowSig {
        /// The shown signature's name.
        name: NameId,
        /// The shown signature's arity.
        arity: u32,
        /// Where the statement was written.
        loc: Location,
    },

    /// `#external atom : body. [value]`
    External {
        /// The external atom.
        atom: Term,
        /// The condition.
        body: Vec<BodyLiteral>,
        /// The assigned truth.
        value: ExternalValue,
        /// Where the statement was written.
        loc: Location,
    },

    /// `#edge (u, v) : body.`
    Edge {
        /// The source node term.
        u: Term,
        /// The target node term.
        v: Term,
        /// The condition.
        body: Vec<BodyLiteral>,
        /// Where the statement was written.
        loc: Location,
    },

    /// `#heuristic atom : body. [bias@priority, modifier]`
    Heuristic {
        /// The subject atom.
        atom: Term,
        /// The condition.
        body: Vec<BodyLiteral>,
        /// The bias term.
        bias: Term,
        /// The priority term.
        priority: Term,
        /// The modifier.
        modifier: HeuristicMod,
        /// Where the statement was written.
        loc: Location,
    },

    /// `#project atom : body.`
    Project {
        /// The projected atom.
        atom: Term,
        /// The condition.
        body: Vec<BodyLiteral>,
        /// Where the statement was written.
        loc: Location,
    },

    /// `#project name/arity.`
    ProjectSig {
        /// The projected signature's name.
        name: NameId,
        /// The projected signature's arity.
        arity: u32,
        /// Where the statement was written.
        loc: Location,
    },
}

/// A named program part with parameters.
#[derive(Clone, Debug, Default)]
pub struct ProgramPart {
    /// The part's name.
    pub name: Option<NameId>,

    /// The parameter names.
    pub params: Vec<NameId>,

    /// The statements, in input order.
    pub statements: Vec<Statement>,
}

/// A non-ground program: parts, theory atoms, theory definitions.
#[derive(Default)]
pub struct Program {
    /// The program parts; index zero is the base part.
    pub parts: Vec<ProgramPart>,

    /// The table of theory atom occurrences, referenced by index from
    /// [BodyLiteral::Theory](crate::structures::literal::BodyLiteral)
    /// and [Head::Theory].
    pub theory_atoms: Vec<TheoryAtom>,

    /// The theory definitions, in input order.
    pub theory_defs: Vec<TheoryDefinition>,
}

impl Program {
    /// A program with an empty base part.
    pub fn new() -> Self {
        Program {
            parts: vec![ProgramPart::default()],
            theory_atoms: Vec::new(),
            theory_defs: Vec::new(),
        }
    }

    /// Open (or reopen) a part; statements added afterwards belong to it.
    pub fn part(&mut self, name: NameId, params: Vec<NameId>) {
        let existing = self
            .parts
            .iter()
            .position(|part| part.name == Some(name) && part.params == params);
        match existing {
            Some(index) => {
                let part = self.parts.remove(index);
                self.parts.push(part);
            }
            None => self.parts.push(ProgramPart {
                name: Some(name),
                params,
                statements: Vec::new(),
            }),
        }
    }

    /// Add a statement to the part opened last.
    pub fn add(&mut self, statement: Statement) {
        self.parts
            .last_mut()
            .expect("a program always has its base part")
            .statements
            .push(statement);
    }

    /// Register a theory atom occurrence, returning its index.
    pub fn add_theory_atom(&mut self, atom: TheoryAtom) -> usize {
        self.theory_atoms.push(atom);
        self.theory_atoms.len() - 1
    }
}
