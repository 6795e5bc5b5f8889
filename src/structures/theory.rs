/*!
Theory atoms, terms, and definitions.

A theory atom `&name{ elements } op guard` extends a program with
syntax the grounder does not interpret: it grounds the atom's
arguments and element conditions, evaluates the theory terms, and
hands the result to the emitter untouched.

A [TheoryDefinition] governs what is permissible: which operators may
appear in theory terms (with precedence and associativity), which
element and guard shapes an atom of a given signature may carry, and
whether the atom may stand in a head, a body, either, or alone as a
directive.
Resolution happens once, during rewriting; operator sequences left
unparsed by the parser are arranged here by precedence climbing.
*/

use crate::{
    reports::Location,
    structures::{literal::BodyLiteral, symbol::NameId, term::Term},
    types::err::TheoryError,
};

/// The shape of a theory operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TheoryOpType {
    /// A prefix operator.
    Unary,

    /// An infix operator associating to the left.
    BinaryLeft,

    /// An infix operator associating to the right.
    BinaryRight,
}

/// One operator definition inside a theory term definition.
#[derive(Clone, Debug)]
pub struct TheoryOpDef {
    /// The operator's spelling.
    pub name: NameId,

    /// Binding strength; higher binds tighter.
    pub priority: u32,

    /// Prefix or infix, and the associativity.
    pub op_type: TheoryOpType,
}

/// A named theory term grammar: the operators usable within it.
#[derive(Clone, Debug)]
pub struct TheoryTermDef {
    /// The grammar's name.
    pub name: NameId,

    /// The operator definitions.
    pub ops: Vec<TheoryOpDef>,

    /// Where the definition was written.
    pub loc: Location,
}

impl TheoryTermDef {
    fn lookup(&self, name: NameId, unary: bool) -> Option<&TheoryOpDef> {
        self.ops.iter().find(|op| {
            op.name == name && (op.op_type == TheoryOpType::Unary) == unary
        })
    }
}

/// Where an atom definition permits the atom to occur.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TheoryAtomType {
    /// Head position only.
    Head,

    /// Body position only.
    Body,

    /// Head or body.
    Any,

    /// Alone, as a directive.
    Directive,
}

/// A theory atom definition: signature, grammars, guard, placement.
#[derive(Clone, Debug)]
pub struct TheoryAtomDef {
    /// The atom's name.
    pub name: NameId,

    /// The atom's arity.
    pub arity: u32,

    /// The grammar for element tuples.
    pub element_def: NameId,

    /// The permissible guard operators and the guard grammar.
    pub guard: Option<(Vec<NameId>, NameId)>,

    /// Where the atom may occur.
    pub atom_type: TheoryAtomType,

    /// Where the definition was written.
    pub loc: Location,
}

/// A `#theory` definition: term grammars and atom definitions.
#[derive(Clone, Debug)]
pub struct TheoryDefinition {
    /// The theory's name.
    pub name: NameId,

    /// The term grammars.
    pub terms: Vec<TheoryTermDef>,

    /// The atom definitions.
    pub atoms: Vec<TheoryAtomDef>,

    /// Where the definition was written.
    pub loc: Location,
}

impl TheoryDefinition {
    /// The term grammar of the given name.
    pub fn term_def(&self, name: NameId) -> Option<&TheoryTermDef> {
        self.terms.iter().find(|def| def.name == name)
    }

    /// The atom definition of the given signature.
    pub fn atom_def(&self, name: NameId, arity: u32) -> Option<&TheoryAtomDef> {
        self.atoms
            .iter()
            .find(|def| def.name == name && def.arity == arity)
    }
}

/// A theory term as written, before and after operator resolution.
#[derive(Clone, Debug)]
pub enum TheoryTerm {
    /// A plain term; variables in it ground like any other.
    Term(Term),

    /// A tuple `(…)`.
    Tuple(Vec<TheoryTerm>),

    /// A list `[…]`.
    List(Vec<TheoryTerm>),

    /// A set `{…}`.
    Set(Vec<TheoryTerm>),

    /// A function or resolved operator application.
    Fun(NameId, Vec<TheoryTerm>),

    /// An operator sequence the parser left flat, e.g. `- 1 + 2 * 3`;
    /// resolution arranges it by the definition's precedences.
    Unparsed(Vec<TheoryUnparsedElem>),
}

/// One step of an unparsed operator sequence: prefix operators, then a
/// operand.
#[derive(Clone, Debug)]
pub struct TheoryUnparsedElem {
    /// Leading operators; for the first element all are prefix, for
    /// later elements the first is the connecting infix operator.
    pub ops: Vec<NameId>,

    /// The operand.
    pub term: TheoryTerm,
}

/// One element of a theory atom: tuple and condition.
#[derive(Clone, Debug)]
pub struct TheoryElem {
    /// The term tuple.
    pub tuple: Vec<TheoryTerm>,

    /// The condition literals, level-one local.
    pub condition: Vec<BodyLiteral>,
}

/// A theory atom occurrence.
#[derive(Clone, Debug)]
pub struct TheoryAtom {
    /// The atom term `name(args)` after the `&`.
    pub atom: Term,

    /// The elements.
    pub elements: Vec<TheoryElem>,

    /// The guard: operator spelling and right-hand theory term.
    pub guard: Option<(NameId, TheoryTerm)>,

    /// Where the atom was written.
    pub loc: Location,
}

/// Arrange the unparsed operator sequences of `term` in place,
/// following the precedences of `def`.
pub fn resolve_operators(term: &mut TheoryTerm, def: &TheoryTermDef) -> Result<(), TheoryError> {
    match term {
        TheoryTerm::Term(_) => Ok(()),
        TheoryTerm::Tuple(items) | TheoryTerm::List(items) | TheoryTerm::Set(items) => {
            for item in items {
                resolve_operators(item, def)?;
            }
            Ok(())
        }
        TheoryTerm::Fun(_, args) => {
            for arg in args {
                resolve_operators(arg, def)?;
            }
            Ok(())
        }
        TheoryTerm::Unparsed(elems) => {
            let mut elems = std::mem::take(elems);
            for elem in &mut elems {
                resolve_operators(&mut elem.term, def)?;
            }
            let resolved = parse_sequence(&mut elems.into_iter().peekable(), def, 0)?;
            *term = resolved;
            Ok(())
        }
    }
}

type ElemIter = std::iter::Peekable<std::vec::IntoIter<TheoryUnparsedElem>>;

/// Precedence climbing over an unparsed sequence.
fn parse_sequence(
    elems: &mut ElemIter,
    def: &TheoryTermDef,
    min_priority: u32,
) -> Result<TheoryTerm, TheoryError> {
    let first = match elems.next() {
        Some(first) => first,
        None => return Err(TheoryError::InvalidTerm),
    };
    let lhs = apply_prefix(&first.ops, first.term, def)?;
    climb_tail(lhs, elems, def, min_priority)
}

/// Continue climbing with an already-parsed left operand.
fn climb_tail(
    mut lhs: TheoryTerm,
    elems: &mut ElemIter,
    def: &TheoryTermDef,
    min_priority: u32,
) -> Result<TheoryTerm, TheoryError> {
    while let Some(next) = elems.peek() {
        let op_name = match next.ops.first() {
            Some(op) => *op,
            None => return Err(TheoryError::InvalidTerm),
        };
        let op = match def.lookup(op_name, false) {
            Some(op) => op.clone(),
            None => return Err(TheoryError::UndefinedOperator(format!("{op_name:?}"))),
        };
        if op.priority < min_priority {
            break;
        }
        let mut next = elems.next().expect("peeked above");
        // The first op connects; any further ops are prefix on the rhs.
        next.ops.remove(0);
        let rhs_min = match op.op_type {
            TheoryOpType::BinaryLeft => op.priority + 1,
            TheoryOpType::BinaryRight => op.priority,
            TheoryOpType::Unary => return Err(TheoryError::InvalidTerm),
        };
        let rhs_first = apply_prefix(&next.ops, next.term, def)?;
        let rhs = climb_tail(rhs_first, elems, def, rhs_min)?;
        lhs = TheoryTerm::Fun(op.name, vec![lhs, rhs]);
    }
    Ok(lhs)
}

fn apply_prefix(
    ops: &[NameId],
    mut term: TheoryTerm,
    def: &TheoryTermDef,
) -> Result<TheoryTerm, TheoryError> {
    for op in ops.iter().rev() {
        if def.lookup(*op, true).is_none() {
            return Err(TheoryError::UndefinedOperator(format!("{op:?}")));
        }
        term = TheoryTerm::Fun(*op, vec![term]);
    }
    Ok(term)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::symbol::SymbolStore;

    fn num(store: &mut SymbolStore, n: i32) -> TheoryTerm {
        let file = store.name("t");
        let loc = Location::new(file, (1, 1), (1, 1));
        TheoryTerm::Term(Term::value(loc, store.num(n)))
    }

    #[test]
    fn precedence_climbing() {
        let mut store = SymbolStore::default();
        let file = store.name("t");
        let loc = Location::new(file, (1, 1), (1, 1));
        let plus = store.name("+");
        let times = store.name("*");
        let def = TheoryTermDef {
            name: store.name("term"),
            ops: vec![
                TheoryOpDef {
                    name: plus,
                    priority: 1,
                    op_type: TheoryOpType::BinaryLeft,
                },
                TheoryOpDef {
                    name: times,
                    priority: 2,
                    op_type: TheoryOpType::BinaryLeft,
                },
            ],
            loc,
        };
        // 1 + 2 * 3 resolves as 1 + (2 * 3).
        let one = num(&mut store, 1);
        let two = num(&mut store, 2);
        let three = num(&mut store, 3);
        let mut term = TheoryTerm::Unparsed(vec![
            TheoryUnparsedElem {
                ops: vec![],
                term: one,
            },
            TheoryUnparsedElem {
                ops: vec![plus],
                term: two,
            },
            TheoryUnparsedElem {
                ops: vec![times],
                term: three,
            },
        ]);
        resolve_operators(&mut term, &def).unwrap();
        match term {
            TheoryTerm::Fun(op, args) => {
                assert_eq!(op, plus);
                assert!(matches!(&args[1], TheoryTerm::Fun(inner, _) if *inner == times));
            }
            _ => panic!("operator application expected"),
        }
    }

    #[test]
    fn undefined_operator_is_rejected() {
        let mut store = SymbolStore::default();
        let file = store.name("t");
        let loc = Location::new(file, (1, 1), (1, 1));
        let minus = store.name("-");
        let def = TheoryTermDef {
            name: store.name("term"),
            ops: vec![],
            loc,
        };
        let one = num(&mut store, 1);
        let two = num(&mut store, 2);
        let mut term = TheoryTerm::Unparsed(vec![
            TheoryUnparsedElem {
                ops: vec![],
                term: one,
            },
            TheoryUnparsedElem {
                ops: vec![minus],
                term: two,
            },
        ]);
        assert!(matches!(
            resolve_operators(&mut term, &def),
            Err(TheoryError::UndefinedOperator(_))
        ));
    }
}
