/*!
Locations, diagnostics, and the reporter.

Everything a grounder has to say about a program that is not ground
output flows through a [Reporter]: warnings about dropped literals,
errors about unsafe rules, and so on.
Each diagnostic carries a [Location] and a kind from a closed taxonomy,
so callers may filter or map them without string matching.

Errors set a sticky `has_error` flag.
The pipeline checks the flag at phase boundaries and stops at the end
of the current phase, so a single pass reports as many independent
problems as possible.
*/

use crate::structures::symbol::{NameId, SymbolStore};

/// A region of source text: file, begin line/column, end line/column.
///
/// Lines and columns are one-based, matching the surface the parser
/// reports on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    /// The interned path of the source file.
    pub file: NameId,

    /// Begin line and column.
    pub begin: (u32, u32),

    /// End line and column.
    pub end: (u32, u32),
}

impl Location {
    /// A location spanning the given lines and columns of `file`.
    pub fn new(file: NameId, begin: (u32, u32), end: (u32, u32)) -> Self {
        Location { file, begin, end }
    }

    /// Render the location against the store holding its file name.
    pub fn display<'a>(&self, store: &'a SymbolStore) -> LocationDisplay<'a> {
        LocationDisplay {
            store,
            location: *self,
        }
    }
}

/// A location paired with its store for printing.
pub struct LocationDisplay<'a> {
    store: &'a SymbolStore,
    location: Location,
}

impl std::fmt::Display for LocationDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let l = &self.location;
        write!(
            f,
            "{}:{}:{}-{}:{}",
            self.store.resolve(l.file),
            l.begin.0,
            l.begin.1,
            l.end.0,
            l.end.1
        )
    }
}

/// How serious a diagnostic is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// Of interest, no effect on the ground program.
    Info,

    /// Something was dropped or replaced; grounding continues.
    Warning,

    /// The affected unit produces no output and the pipeline stops at
    /// the end of the current phase.
    Error,
}

/// The closed taxonomy of diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// An arithmetic or interval operation without a defined result.
    OperationUndefined,

    /// A body atom over a signature no rule head provides.
    AtomUndefined,

    /// A global variable inside an aggregate element tuple.
    GlobalVariableInTuple,

    /// The same file appeared twice among the inputs.
    FileIncludedTwice,

    /// A failure reported by an external script.
    RuntimeError,

    /// A variable over an unbounded integer range.
    VariableUnbounded,

    /// A rule variable not bound by any positive literal.
    UnsafeVariable,

    /// A cycle among `#const` definitions.
    CyclicDefine,

    /// A constant defined twice, neither definition a default.
    RedefinedConstant,

    /// A theory term rejected by its theory definition.
    InvalidTheoryTerm,

    /// Two theory atom definitions for one signature.
    MultipleTheoryAtomDefinitions,
}

/// A single report: severity, kind, location, and rendered detail.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// How serious the diagnostic is.
    pub severity: Severity,

    /// The kind, from the closed taxonomy.
    pub kind: DiagnosticKind,

    /// Where in the source the diagnostic points.
    pub location: Location,

    /// Human-readable detail.
    pub message: String,
}

/// Collects diagnostics and tracks whether any error was reported.
#[derive(Default)]
pub struct Reporter {
    diagnostics: Vec<Diagnostic>,
    has_error: bool,
}

impl Reporter {
    /// Record an informational diagnostic.
    pub fn info(&mut self, kind: DiagnosticKind, location: Location, message: impl Into<String>) {
        self.push(Severity::Info, kind, location, message.into());
    }

    /// Record a warning.
    pub fn warn(&mut self, kind: DiagnosticKind, location: Location, message: impl Into<String>) {
        self.push(Severity::Warning, kind, location, message.into());
    }

    /// Record an error and set the sticky error flag.
    pub fn error(&mut self, kind: DiagnosticKind, location: Location, message: impl Into<String>) {
        self.has_error = true;
        self.push(Severity::Error, kind, location, message.into());
    }

    fn push(
        &mut self,
        severity: Severity,
        kind: DiagnosticKind,
        location: Location,
        message: String,
    ) {
        log::debug!(target: "reports", "{severity:?} {kind:?}: {message}");
        self.diagnostics.push(Diagnostic {
            severity,
            kind,
            location,
            message,
        });
    }

    /// True if any error has been reported.
    pub fn has_error(&self) -> bool {
        self.has_error
    }

    /// All diagnostics recorded so far, in report order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Drain the recorded diagnostics, keeping the error flag.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}
