/*!
The grounder --- to which programs are given and from which ground
programs flow.

A [Grounder] owns everything with grounding lifetime: the symbol
store, the cell arena, the predicate domains, the fresh-name counters,
the diagnostics, and any registered scripts.
Two grounders share nothing, so tests may run any number of them side
by side.

A call to [ground](Grounder::ground) is one *step*: the statements of
the selected program parts are rewritten, analysed, and instantiated
against the domains accumulated by earlier steps, and the emitter
receives the step's ground image between `begin_step` and `end_step`.
Between steps the caller may add program parts, reassign externals,
and register scripts.

# Example

```rust
# use marmot_ground::context::Grounder;
# use marmot_ground::config::Config;
# use marmot_ground::output::RecordingEmitter;
# use marmot_ground::structures::rule::{Head, Rule, Statement};
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
*/

use rustc_hash::FxHashMap;

use crate::{
    config::Config,
    db::DomainStore,
    misc::log::targets,
    output::Emitter,
    procedures::{
        self,
        instantiate::{self, Engine},
        PlanContext, ScriptFn, ScriptRegistry,
    },
    reports::{Diagnostic, Location, Reporter},
    rewrite::{self, Define},
    structures::{
        literal::{AggrElem, AggrFun, AggrGuard, BodyAggregate, BodyLiteral, NafSign, Relation},
        rule::Program,
        symbol::{NameId, Symbol, SymbolStore},
        term::{AuxGen, BinOp, CellArena, CellKey, SimplifyEnv, Term, TermKind, UnOp, VarTerm},
    },
    types::err::ErrorKind,
};

/// The grounder instance.
pub struct Grounder {
    /// The configuration of the grounder.
    pub config: Config,

    /// Interned symbols.
    pub store: SymbolStore,

    /// Variable cells.
    pub cells: CellArena,

    /// Predicate domains.
    pub domains: DomainStore,

    /// Collected diagnostics.
    pub reporter: Reporter,

    /// Registered external scripts.
    pub scripts: ScriptRegistry,

    aux: AuxGen,
    aux_predicates: u32,
    defaults: Vec<Define>,
    started: bool,
}

impl Grounder {
    /// A grounder over the given configuration.
    pub fn from_config(config: Config) -> Self {
        Grounder {
            config,
            store: SymbolStore::default(),
            cells: CellArena::default(),
            domains: DomainStore::default(),
            reporter: Reporter::default(),
            scripts: ScriptRegistry::default(),
            aux: AuxGen::default(),
            aux_predicates: 0,
            defaults: Vec::new(),
            started: false,
        }
    }

    /// An empty program to assemble statements into.
    pub fn program(&self) -> Program {
        Program::new()
    }

    /// A scope for building one rule's terms; variables of one name
    /// share their cell within the scope.
    pub fn rule_scope(&mut self, file: &str) -> RuleScope<'_> {
        let file = self.store.name(file);
        RuleScope {
            store: &mut self.store,
            cells: &mut self.cells,
            vars: FxHashMap::default(),
            loc: Location::new(file, (1, 1), (1, 1)),
        }
    }

    /// Register an external script under a name.
    pub fn register_script(&mut self, name: &str, f: ScriptFn) {
        let name = self.store.name(name);
        self.scripts.register(name, f);
    }

    /// Inject a default `#const` definition, overridable in-program.
    pub fn add_default_define(&mut self, name: &str, value: Symbol) {
        let name = self.store.name(name);
        let file = self.store.name("<defaults>");
        let loc = Location::new(file, (0, 0), (0, 0));
        self.defaults.push(Define {
            name,
            value: Term::value(loc, value),
            default: true,
            loc,
        });
    }

    /// The diagnostics recorded so far; draining keeps the error flag.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.reporter.take()
    }

    /// Ground every part of the program as one step.
    pub fn ground(
        &mut self,
        program: &mut Program,
        emitter: &mut dyn Emitter,
    ) -> Result<(), ErrorKind> {
        let parts: Vec<(Option<NameId>, Vec<Symbol>)> = program
            .parts
            .iter()
            .map(|part| (part.name, Vec::new()))
            .collect();
        self.ground_parts(program, &parts, emitter)
    }

    /// Ground the selected parts, binding their parameters to the
    /// given argument symbols, as one step.
    pub fn ground_parts(
        &mut self,
        program: &mut Program,
        parts: &[(Option<NameId>, Vec<Symbol>)],
        emitter: &mut dyn Emitter,
    ) -> Result<(), ErrorKind> {
        if !self.started {
            emitter.init_program(self.config.incremental);
            self.started = true;
        }
        emitter.begin_step();
        self.domains.begin_step(&self.store);

        // Select statements, instantiating part parameters as defines.
        let mut statements = Vec::new();
        let mut injected = self.defaults.clone();
        for (name, args) in parts {
            for part in &program.parts {
                if part.name != *name {
                    continue;
                }
                if part.params.len() != args.len() {
                    continue;
                }
                for (&param, &value) in part.params.iter().zip(args) {
                    let file = self.store.name("<parameters>");
                    let loc = Location::new(file, (0, 0), (0, 0));
                    injected.push(Define {
                        name: param,
                        value: Term::value(loc, value),
                        default: false,
                        loc,
                    });
                }
                statements.extend(part.statements.iter().cloned());
            }
        }

        // Rewrite.
        let statements = {
            let mut env = SimplifyEnv {
                store: &mut self.store,
                cells: &mut self.cells,
                aux: &mut self.aux,
                reporter: &mut self.reporter,
            };
            rewrite::rewrite(
                statements,
                injected,
                &mut program.theory_atoms,
                &program.theory_defs,
                &mut env,
            )
        };
        if self.reporter.has_error() {
            log::warn!(target: targets::REWRITE, "errors during rewriting; step produces no output");
            emitter.end_step();
            return Ok(());
        }

        // Plan and analyse.
        let mut plans = Vec::with_capacity(statements.len());
        {
            let mut ctx = PlanContext {
                store: &mut self.store,
                domains: &self.domains,
                reporter: &mut self.reporter,
                aux_predicates: &mut self.aux_predicates,
            };
            for statement in statements {
                plans.push(procedures::plan_statement(statement, &mut ctx));
            }
        }
        let components =
            procedures::analyze_dependencies(&mut plans, &mut self.cells, &self.store);
        if self.config.check_undefined {
            instantiate::report_undefined(&plans, &self.store, &mut self.reporter);
        }
        if self.reporter.has_error() {
            emitter.end_step();
            return Ok(());
        }

        // Instantiate.
        let mut engine = Engine::new(
            &mut self.store,
            &mut self.cells,
            &mut self.domains,
            &mut self.reporter,
            emitter,
            &self.scripts,
            &program.theory_atoms,
        );
        engine.keep_facts = self.config.keep_facts;
        instantiate::ground_components(&plans, &components, &mut engine)?;
        engine.finish_step();
        emitter.end_step();
        Ok(())
    }
}

/// Constructors for one rule's terms and literals.
///
/// Variables of one name share their cell within a scope; each
/// underscore is fresh.
pub struct RuleScope<'g> {
    store: &'g mut SymbolStore,
    cells: &'g mut CellArena,
    vars: FxHashMap<NameId, CellKey>,
    loc: Location,
}

impl RuleScope<'_> {
    /// The scope's location, for statements built by hand.
    pub fn loc(&self) -> Location {
        self.loc
    }

    /// A variable term; occurrences of one name alias.
    pub fn var(&mut self, name: &str) -> Term {
        let name = self.store.name(name);
        let anonymous = self.store.resolve(name) == "_";
        let cell = if anonymous {
            self.cells.alloc()
        } else {
            match self.vars.get(&name) {
                Some(&cell) => cell,
                None => {
                    let cell = self.cells.alloc();
                    self.vars.insert(name, cell);
                    cell
                }
            }
        };
        Term::var(
            self.loc,
            VarTerm {
                name,
                level: 0,
                cell,
                bind: true,
            },
        )
    }

    /// A number term.
    pub fn num(&mut self, n: i32) -> Term {
        let symbol = self.store.num(n);
        Term::value(self.loc, symbol)
    }

    /// An identifier term.
    pub fn id(&mut self, name: &str) -> Term {
        let symbol = self.store.id(name, false);
        Term::value(self.loc, symbol)
    }

    /// A string term.
    pub fn string(&mut self, content: &str) -> Term {
        let symbol = self.store.string(content);
        Term::value(self.loc, symbol)
    }

    /// A function term.
    pub fn fun(&mut self, name: &str, args: Vec<Term>) -> Term {
        let name = self.store.name(name);
        Term {
            loc: self.loc,
            kind: TermKind::Fun {
                name,
                sign: false,
                args,
            },
        }
    }

    /// A classically negated function term.
    pub fn neg_fun(&mut self, name: &str, args: Vec<Term>) -> Term {
        let name = self.store.name(name);
        Term {
            loc: self.loc,
            kind: TermKind::Fun {
                name,
                sign: true,
                args,
            },
        }
    }

    /// A range term `lo..hi`.
    pub fn range(&mut self, lo: Term, hi: Term) -> Term {
        Term {
            loc: self.loc,
            kind: TermKind::Range(Box::new(lo), Box::new(hi)),
        }
    }

    /// A numeric range term `lo..hi`.
    pub fn interval(&mut self, lo: i32, hi: i32) -> Term {
        let lo = self.num(lo);
        let hi = self.num(hi);
        self.range(lo, hi)
    }

    /// A pool term `(a; b; …)`.
    pub fn pool(&mut self, alternatives: Vec<Term>) -> Term {
        Term {
            loc: self.loc,
            kind: TermKind::Pool(alternatives),
        }
    }

    /// A binary operation term.
    pub fn binary(&mut self, op: BinOp, a: Term, b: Term) -> Term {
        Term {
            loc: self.loc,
            kind: TermKind::Binary(op, Box::new(a), Box::new(b)),
        }
    }

    /// A unary operation term.
    pub fn unary(&mut self, op: UnOp, a: Term) -> Term {
        Term {
            loc: self.loc,
            kind: TermKind::Unary(op, Box::new(a)),
        }
    }

    /// A script call term `@name(args)`.
    pub fn script(&mut self, name: &str, args: Vec<Term>) -> Term {
        let name = self.store.name(name);
        Term {
            loc: self.loc,
            kind: TermKind::Script { name, args },
        }
    }

    /// A positive body literal.
    pub fn pred(&mut self, atom: Term) -> BodyLiteral {
        BodyLiteral::pred(atom)
    }

    /// A default-negated body literal.
    pub fn not(&mut self, atom: Term) -> BodyLiteral {
        BodyLiteral::Pred {
            sign: NafSign::Not,
            atom,
        }
    }

    /// A comparison literal.
    pub fn cmp(&mut self, left: Term, relation: Relation, right: Term) -> BodyLiteral {
        BodyLiteral::comparison(left, relation, right)
    }

    /// A body aggregate literal.
    pub fn aggregate(
        &mut self,
        fun: AggrFun,
        left: Option<AggrGuard>,
        right: Option<AggrGuard>,
        elements: Vec<AggrElem>,
    ) -> BodyLiteral {
        BodyLiteral::Aggregate {
            sign: NafSign::Pos,
            aggregate: BodyAggregate {
                fun,
                left,
                right,
                elements,
            },
        }
    }

    /// An aggregate element.
    pub fn element(&mut self, tuple: Vec<Term>, condition: Vec<BodyLiteral>) -> AggrElem {
        AggrElem { tuple, condition }
    }

    /// A variable at the condition level of an element.
    pub fn local_var(&mut self, name: &str) -> Term {
        let mut term = self.var(name);
        if let TermKind::Var(v) = &mut term.kind {
            v.level = 1;
        }
        term
    }
}
