/*!
A library for computing the propositional image of a first-order
answer set program.

marmot_ground consumes a non-ground logic program --- rules with
variables, aggregates, disjunctions, conditional literals, theory
atoms, and optimisation statements --- and emits an equivalent
variable-free program as a stream of typed events, suitable for a
downstream boolean-constraint solver.

marmot_ground is developed to help researchers, developers, or anyone
curious, to investigate grounders, whether as a novice or through
implementing novel ideas.

# Orientation

The library is designed around the core structure of a
[grounder](context::Grounder).

Programs are assembled through the structures of [structures::rule]
--- typically with the help of a [rule scope](context::RuleScope) for
terms --- and grounded against an [emitter](output::Emitter), which
receives the ground rules.

Internally, and at a high level, a grounding step is a pipeline:
- The [rewriter](rewrite) brings statements into a canonical form:
  constants substituted, pools expanded, ranges and scripts extracted,
  comparisons unchained, arithmetic lifted.
- The [dependency analysis](analysis::dependency) partitions the
  statements into components and classifies every body occurrence by
  stratification.
- The [safety check](analysis::safety) fixes, per rule, the order in
  which literals bind variables, or rejects the rule.
- The [instantiation engine](procedures) runs semi-naive evaluation
  over each component, drawing candidate atoms from
  [domains](db::domain) partitioned into OLD, NEW and ALL.

Useful starting points, then, may be:
- [context::Grounder::ground] to inspect the dynamics of a step.
- The [domain module](db) to inspect the data a step accumulates.
- The [structures] to familiarise yourself with the elements of a
  program and their representation (symbols, terms, literals, rules).
- The [matcher] for how non-ground terms meet ground atoms.

# Examples

+ Ground a small program and read the facts back.

```rust
use marmot_ground::{
    config::Config,
    context::Grounder,
    output::RecordingEmitter,
    structures::rule::{Head, Rule, Statement},
};

let mut grounder = Grounder::from_config(Config::default());
let mut program = grounder.program();

// p(1..3).
let rule = {
    let mut scope = grounder.rule_scope("example");
    let args = vec![scope.interval(1, 3)];
    let head = scope.fun("p", args);
    Rule {
        head: Head::Atom(head),
        body: Vec::new(),
        loc: scope.loc(),
    }
};
program.add(Statement::Rule(rule));

let mut out = RecordingEmitter::default();
grounder.ground(&mut program, &mut out).unwrap();
assert_eq!(out.facts().count(), 3);
```

+ Diagnostics carry locations and a closed taxonomy.

```rust
use marmot_ground::{
    config::Config,
    context::Grounder,
    output::RecordingEmitter,
    reports::DiagnosticKind,
    structures::rule::{Head, Rule, Statement},
};

let mut grounder = Grounder::from_config(Config::default());
let mut program = grounder.program();

// p(X).  X is bound by nothing.
let rule = {
    let mut scope = grounder.rule_scope("example");
    let args = vec![scope.var("X")];
    let head = scope.fun("p", args);
    Rule {
        head: Head::Atom(head),
        body: Vec::new(),
        loc: scope.loc(),
    }
};
program.add(Statement::Rule(rule));

let mut out = RecordingEmitter::default();
grounder.ground(&mut program, &mut out).unwrap();
let diagnostics = grounder.take_diagnostics();
assert!(diagnostics
    .iter()
    .any(|d| d.kind == DiagnosticKind::UnsafeVariable));
```

# Logs

To help diagnose issues, calls to [log!](log) are made throughout the
library, with a target per subsystem so output can be narrowed to
relevant parts; the targets are listed in [misc::log].
No log implementation is installed by the library.
*/

#![allow(clippy::collapsible_else_if)]
#![allow(clippy::single_match)]

pub mod analysis;
pub mod config;
pub mod context;
pub mod db;
pub mod matcher;
pub mod misc;
pub mod output;
pub mod procedures;
pub mod reports;
pub mod rewrite;
pub mod structures;
pub mod types;
