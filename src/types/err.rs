/*!
Error types used in the library.

- Some of these are internally expected --- e.g. [EvalError::Undefined]
  controls whether a literal is dropped during simplification.
- Others are terminal for the affected unit --- e.g. a cyclic chain of
  `#const` statements rejects every define on the cycle.

User-facing consequences of these errors are reported through the
[reporter](crate::reports::Reporter); the enums here are what the
internal `Result`s carry.
*/

/// A union of varied error kinds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// An error while evaluating a term.
    Eval(EvalError),

    /// An error among `#const` definitions.
    Define(DefineError),

    /// An error in the rewriting pipeline.
    Rewrite(RewriteError),

    /// An error in the safety check.
    Safety(SafetyError),

    /// An error resolving a theory atom.
    Theory(TheoryError),

    /// An error during instantiation.
    Ground(GroundError),
}

/// Errors while evaluating a term.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvalError {
    /// The operation has no defined result, e.g. division by zero or
    /// arithmetic on a string.
    ///
    /// The enclosing literal is dropped and a warning is emitted.
    Undefined,
}

impl From<EvalError> for ErrorKind {
    fn from(e: EvalError) -> Self {
        ErrorKind::Eval(e)
    }
}

/// Errors among `#const` definitions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DefineError {
    /// A cycle through the named constants.
    Cyclic(Vec<String>),

    /// A second non-default definition for the named constant.
    Redefined(String),
}

impl From<DefineError> for ErrorKind {
    fn from(e: DefineError) -> Self {
        ErrorKind::Define(e)
    }
}

/// Errors in the rewriting pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RewriteError {
    /// A global variable appeared inside an aggregate element tuple.
    GlobalVariableInTuple,
}

impl From<RewriteError> for ErrorKind {
    fn from(e: RewriteError) -> Self {
        ErrorKind::Rewrite(e)
    }
}

/// Errors in the safety check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SafetyError {
    /// The named variables cannot be bound by any positive literal.
    UnsafeVariables(Vec<String>),
}

impl From<SafetyError> for ErrorKind {
    fn from(e: SafetyError) -> Self {
        ErrorKind::Safety(e)
    }
}

/// Errors resolving a theory atom against its definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TheoryError {
    /// No theory atom definition for the signature.
    UndefinedAtom(String),

    /// Two theory atom definitions for one signature.
    MultipleDefinitions(String),

    /// An operator used without a matching operator definition.
    UndefinedOperator(String),

    /// A guard or element rejected by the definition.
    InvalidTerm,

    /// A theory atom in a position its definition does not permit.
    MisplacedAtom,
}

impl From<TheoryError> for ErrorKind {
    fn from(e: TheoryError) -> Self {
        ErrorKind::Theory(e)
    }
}

/// Errors during instantiation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GroundError {
    /// An external script failed; the current step is aborted.
    ScriptFailure(String),
}

impl From<GroundError> for ErrorKind {
    fn from(e: GroundError) -> Self {
        ErrorKind::Ground(e)
    }
}
