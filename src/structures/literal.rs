/*!
Literals --- the members of rule bodies.

A body is an ordered multiset of [BodyLiteral]s:
- A predicate literal under default negation.
- A comparison chain `a < b < c`, which the rewriter unchains into
  single comparisons; a single `X = t` comparison may later be marked
  an *assignment*, an always-succeeding binder.
- A body aggregate with optional guards.
- A conditional literal `l : c₁, …, cₙ`.
- A theory atom.
- Range and script literals, which only the rewriter introduces: they
  carry the auxiliary variable standing for a `l..r` term or an
  `@script(…)` call.
*/

use crate::structures::{
    symbol::NameId,
    term::{Term, TermKind, VarTerm},
};

/// Default negation of a literal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NafSign {
    /// No negation.
    Pos,

    /// `not l`.
    Not,

    /// `not not l`.
    NotNot,
}

impl NafSign {
    /// True for the unnegated sign.
    pub fn is_positive(self) -> bool {
        matches!(self, NafSign::Pos)
    }

    /// One application of `not`.
    pub fn negate(self) -> Self {
        match self {
            NafSign::Pos => NafSign::Not,
            NafSign::Not => NafSign::NotNot,
            // not not not l is not l.
            NafSign::NotNot => NafSign::Not,
        }
    }
}

/// A comparison relation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Relation {
    /// `=`.
    Eq,

    /// `!=`.
    Ne,

    /// `<`.
    Lt,

    /// `<=`.
    Le,

    /// `>`.
    Gt,

    /// `>=`.
    Ge,
}

impl Relation {
    /// Whether the relation holds of an ordering outcome.
    pub fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Relation::Eq => ordering == Equal,
            Relation::Ne => ordering != Equal,
            Relation::Lt => ordering == Less,
            Relation::Le => ordering != Greater,
            Relation::Gt => ordering == Greater,
            Relation::Ge => ordering != Less,
        }
    }

    /// The relation with its sides swapped.
    pub fn mirror(self) -> Self {
        match self {
            Relation::Eq => Relation::Eq,
            Relation::Ne => Relation::Ne,
            Relation::Lt => Relation::Gt,
            Relation::Le => Relation::Ge,
            Relation::Gt => Relation::Lt,
            Relation::Ge => Relation::Le,
        }
    }

    /// The complementary relation, for De Morgan rewriting.
    pub fn negate(self) -> Self {
        match self {
            Relation::Eq => Relation::Ne,
            Relation::Ne => Relation::Eq,
            Relation::Lt => Relation::Ge,
            Relation::Le => Relation::Gt,
            Relation::Gt => Relation::Le,
            Relation::Ge => Relation::Lt,
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Relation::Eq => write!(f, "="),
            Relation::Ne => write!(f, "!="),
            Relation::Lt => write!(f, "<"),
            Relation::Le => write!(f, "<="),
            Relation::Gt => write!(f, ">"),
            Relation::Ge => write!(f, ">="),
        }
    }
}

/// The aggregate functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggrFun {
    /// `#count`, the number of distinct tuples.
    Count,

    /// `#sum`, the sum of tuple weights.
    Sum,

    /// `#sum+`, the sum of positive tuple weights.
    SumPlus,

    /// `#min`, the least weight, `#sup` when empty.
    Min,

    /// `#max`, the greatest weight, `#inf` when empty.
    Max,
}

/// One aggregate element: a term tuple and its condition.
#[derive(Clone, Debug)]
pub struct AggrElem {
    /// The term tuple, whose first member is the weight for `#sum`.
    pub tuple: Vec<Term>,

    /// The condition literals, quantified at level one.
    pub condition: Vec<BodyLiteral>,
}

/// A guard on an aggregate: a relation and the bounding term.
#[derive(Clone, Debug)]
pub struct AggrGuard {
    /// The relation, read with the aggregate on its right for a left
    /// guard and on its left for a right guard.
    pub relation: Relation,

    /// The bounding term.
    pub term: Term,
}

/// A body aggregate with optional guards.
#[derive(Clone, Debug)]
pub struct BodyAggregate {
    /// The aggregate function.
    pub fun: AggrFun,

    /// The guard left of the aggregate, e.g. `2 <` in `2 < #count{…}`.
    pub left: Option<AggrGuard>,

    /// The guard right of the aggregate.
    pub right: Option<AggrGuard>,

    /// The elements.
    pub elements: Vec<AggrElem>,
}

impl BodyAggregate {
    /// True if the aggregate is `V = #agg{…}` with a bindable left side.
    pub fn is_assignment(&self) -> bool {
        self.right.is_none()
            && match &self.left {
                Some(guard) => {
                    guard.relation == Relation::Eq
                        && matches!(guard.term.kind, TermKind::Var(_) | TermKind::Linear { .. })
                }
                None => false,
            }
    }
}

/// A conditional literal `l : c₁, …, cₙ` in a body.
///
/// Grounds to the conjunction of `l` over every instance of the
/// condition; local variables live at level one.
#[derive(Clone, Debug)]
pub struct CondLiteral {
    /// The conditioned literal.
    pub literal: Box<BodyLiteral>,

    /// The condition.
    pub condition: Vec<BodyLiteral>,
}

/// A literal in a rule body.
#[derive(Clone, Debug)]
pub enum BodyLiteral {
    /// A predicate literal under default negation.
    Pred {
        /// The default negation sign.
        sign: NafSign,
        /// The atom, a function- or identifier-shaped term.
        atom: Term,
    },

    /// A comparison chain `l ≺ r₁ ≺ r₂ …`; after rewriting exactly one
    /// link remains.
    Comparison {
        /// Whether the chain is under `not`.
        neg: bool,
        /// The leftmost term.
        left: Term,
        /// The links: relation and right-hand term, left to right.
        rights: Vec<(Relation, Term)>,
        /// Marked by assignment planning: the left side is a variable
        /// this equality binds.
        assign: bool,
    },

    /// A body aggregate under default negation.
    Aggregate {
        /// The default negation sign.
        sign: NafSign,
        /// The aggregate.
        aggregate: BodyAggregate,
    },

    /// A conditional literal.
    Conditional(CondLiteral),

    /// A theory atom occurrence, resolved against its definition
    /// during rewriting.
    Theory {
        /// The default negation sign.
        sign: NafSign,
        /// Index into the program's theory atom table.
        atom: usize,
    },

    /// `var` ranges over `lo..hi`; introduced by simplification.
    Range {
        /// The enumerated variable.
        var: VarTerm,
        /// Lower bound, inclusive.
        lo: Term,
        /// Upper bound, inclusive.
        hi: Term,
    },

    /// `var` is the result of an external script call; introduced by
    /// simplification.
    Script {
        /// The bound variable.
        var: VarTerm,
        /// The interned script name.
        name: NameId,
        /// The call arguments.
        args: Vec<Term>,
    },
}

impl BodyLiteral {
    /// A positive predicate literal.
    pub fn pred(atom: Term) -> Self {
        BodyLiteral::Pred {
            sign: NafSign::Pos,
            atom,
        }
    }

    /// A single comparison.
    pub fn comparison(left: Term, relation: Relation, right: Term) -> Self {
        BodyLiteral::Comparison {
            neg: false,
            left,
            rights: vec![(relation, right)],
            assign: false,
        }
    }

    /// True for literals whose success can bind variables.
    pub fn is_positive(&self) -> bool {
        match self {
            BodyLiteral::Pred { sign, .. }
            | BodyLiteral::Aggregate { sign, .. }
            | BodyLiteral::Theory { sign, .. } => sign.is_positive(),
            BodyLiteral::Comparison { .. }
            | BodyLiteral::Range { .. }
            | BodyLiteral::Script { .. } => true,
            BodyLiteral::Conditional(_) => true,
        }
    }

    /// Collect rule-level variable occurrences with their binding flag.
    ///
    /// Arguments of a positive predicate literal bind; the variable of
    /// a range, script, assignment or assignment-aggregate binds;
    /// everything else only consumes.
    /// Variables local to a condition (level above zero) are skipped;
    /// they are planned inside their element.
    pub fn collect_vars(&self, out: &mut Vec<(VarTerm, bool)>) {
        let mut raw = Vec::new();
        match self {
            BodyLiteral::Pred { sign, atom } => {
                atom.collect_vars(sign.is_positive(), &mut raw);
            }
            BodyLiteral::Comparison {
                left,
                rights,
                assign,
                ..
            } => {
                left.collect_vars(*assign, &mut raw);
                for (_, right) in rights {
                    right.collect_vars(false, &mut raw);
                }
            }
            BodyLiteral::Aggregate { sign, aggregate } => {
                let assigns = sign.is_positive() && aggregate.is_assignment();
                if let Some(guard) = &aggregate.left {
                    guard.term.collect_vars(assigns, &mut raw);
                }
                if let Some(guard) = &aggregate.right {
                    guard.term.collect_vars(false, &mut raw);
                }
                let mut inner = Vec::new();
                for element in &aggregate.elements {
                    for term in &element.tuple {
                        term.collect_vars(false, &mut inner);
                    }
                    for literal in &element.condition {
                        literal.collect_vars(&mut inner);
                    }
                }
                // Globals inside elements are consumed, never bound:
                // the enclosing body has to provide them.
                raw.extend(inner.into_iter().map(|(var, _)| (var, false)));
            }
            BodyLiteral::Conditional(conditional) => {
                conditional.literal.collect_vars(&mut raw);
                for literal in &conditional.condition {
                    literal.collect_vars(&mut raw);
                }
                // Locals of the condition are existential; only
                // rule-level variables escape.
                raw.retain(|(var, _)| var.level == 0);
                for (_, binding) in raw.iter_mut() {
                    *binding = false;
                }
            }
            BodyLiteral::Theory { .. } => {}
            BodyLiteral::Range { var, lo, hi } => {
                raw.push((*var, true));
                lo.collect_vars(false, &mut raw);
                hi.collect_vars(false, &mut raw);
            }
            BodyLiteral::Script { var, args, .. } => {
                raw.push((*var, true));
                for arg in args {
                    arg.collect_vars(false, &mut raw);
                }
            }
        }
        out.extend(raw.into_iter().filter(|(var, _)| var.level == 0));
    }
}
