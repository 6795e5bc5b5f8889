/*!
The instantiation engine.

Rewritten statements are *planned* --- each body gets a binder
schedule from the safety check, aggregates and conditional literals
get nested element plans, and the statements are arranged into
components by the dependency analysis --- and then *instantiated*,
component by component, with semi-naive iteration inside recursive
components.

- [binder] --- the runtime of a single scheduled literal: scans,
  point probes, relation tests, range enumeration, script calls.
- [aggregates] --- accumulation and emission of body and head
  aggregates.
- [conditional] --- materialisation of conditional literals.
- [instantiate] --- the component loop, rule firing, and the emitter
  encodings of heads and directives.
*/

pub mod aggregates;
pub mod binder;
pub mod conditional;
pub mod instantiate;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    analysis::{
        dependency::{Component, Dependency, OccurrenceType},
        inequalities::{Ie, IeBoundMap, IeSolver, IeTerm},
        safety::SafetyChecker,
    },
    matcher::{gterm, GTerm},
    misc::log::targets,
    reports::{DiagnosticKind, Reporter},
    structures::{
        literal::{AggrFun, AggrGuard, BodyLiteral, NafSign, Relation},
        rule::{Head, Statement},
        symbol::{NameId, Sig, Symbol, SymbolStore},
        term::{CellArena, CellKey, Term, TermKind, VarTerm},
    },
};

/// A registered external script.
pub type ScriptFn = Box<dyn Fn(&[Symbol]) -> Result<Vec<Symbol>, String>>;

/// External scripts by name; consulted by script binders.
#[derive(Default)]
pub struct ScriptRegistry {
    map: FxHashMap<NameId, ScriptFn>,
}

impl ScriptRegistry {
    /// Register a script under a name.
    pub fn register(&mut self, name: NameId, f: ScriptFn) {
        self.map.insert(name, f);
    }

    /// The script of the given name.
    pub fn get(&self, name: NameId) -> Option<&ScriptFn> {
        self.map.get(&name)
    }
}

/// Where a predicate occurrence sits within a statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OccPath {
    /// A body literal.
    Body(usize),

    /// Condition literal `cond` of element `element` of the aggregate
    /// or conditional literal at body position `body`.
    BodyElem {
        /// The body position.
        body: usize,
        /// The element.
        element: usize,
        /// The condition literal.
        cond: usize,
    },

    /// Condition literal `cond` of head element `element`.
    Head {
        /// The element.
        element: usize,
        /// The condition literal.
        cond: usize,
    },
}

/// The planned form of one condition: a binder schedule over its
/// literals, with rule-level variables assumed bound.
#[derive(Debug)]
pub struct ElementPlan {
    /// The element's term tuple (empty for conditional literals).
    pub tuple: Vec<Term>,

    /// The conditioned head atom, where the element has one.
    pub atom: Option<Term>,

    /// The scheduled condition binders.
    pub schedule: Vec<BinderSpec>,

    /// The rule-level cells the condition reads; bound by the outer
    /// schedule before the element runs.
    pub globals: Vec<CellKey>,
}

/// A planned body aggregate.
#[derive(Debug)]
pub struct AggregatePlan {
    /// The aggregate function.
    pub fun: AggrFun,

    /// The default negation sign of the literal.
    pub sign: NafSign,

    /// The guard left of the aggregate.
    pub left: Option<AggrGuard>,

    /// The guard right of the aggregate.
    pub right: Option<AggrGuard>,

    /// True for `V = #agg{…}` with `V` bindable.
    pub assign: bool,

    /// The planned elements.
    pub elements: Vec<ElementPlan>,

    /// The name of the aggregate's auxiliary predicate.
    pub aux: NameId,

    /// The rule-level cells the aggregate reads.
    pub globals: Vec<CellKey>,
}

/// A planned conditional literal.
#[derive(Debug)]
pub struct ConditionalPlan {
    /// The conditioned literal.
    pub literal: BodyLiteral,

    /// The planned condition.
    pub element: ElementPlan,

    /// The name of the conjunction's auxiliary predicate.
    pub aux: NameId,
}

/// One scheduled entity of a body.
#[derive(Debug)]
pub enum BinderSpec {
    /// Enumerate a predicate domain against a pattern.
    Scan {
        /// The body position.
        path: OccPath,
        /// The predicate signature.
        sig: Sig,
        /// The match pattern.
        pattern: GTerm,
        /// The original atom term, for the ground fast path.
        atom: Term,
    },

    /// Test a negated (or doubly negated) predicate literal.
    NegTest {
        /// The body position.
        path: OccPath,
        /// The predicate signature.
        sig: Sig,
        /// The atom term; ground once the schedule reaches it.
        atom: Term,
        /// `not` or `not not`.
        naf: NafSign,
    },

    /// Evaluate a relation, binding the left side if it assigns.
    Relation {
        /// The relation.
        rel: Relation,
        /// The left term.
        left: Term,
        /// The right term.
        right: Term,
        /// True when the left side binds.
        assign: bool,
    },

    /// Enumerate the integers of a range.
    Range {
        /// The enumerated variable.
        var: VarTerm,
        /// The lower bound term.
        lo: Term,
        /// The upper bound term.
        hi: Term,
    },

    /// Enumerate the symbols an external script returns.
    Script {
        /// The bound variable.
        var: VarTerm,
        /// The script name.
        name: NameId,
        /// The argument terms.
        args: Vec<Term>,
    },

    /// Evaluate a body aggregate.
    Aggregate(Box<AggregatePlan>),

    /// Materialise a conditional literal.
    Conditional(Box<ConditionalPlan>),

    /// Ground a theory atom occurrence.
    Theory {
        /// The index into the program's theory atom table.
        index: usize,
        /// The default negation sign.
        sign: NafSign,
    },
}

/// A planned statement, ready to instantiate.
pub struct StatementPlan {
    /// The statement.
    pub statement: Statement,

    /// The binder schedule of the body.
    pub schedule: Vec<BinderSpec>,

    /// Plans for the head's conditioned elements, if any.
    pub head_elements: Vec<ElementPlan>,

    /// Domain narrowing learned from the body's linear comparisons.
    pub bounds: IeBoundMap,

    /// Classification of each occurrence, filled by the dependency
    /// analysis.
    pub occ_types: FxHashMap<OccPath, OccurrenceType>,

    /// Occurrences no head provides, filled by the dependency
    /// analysis; candidates for the atom-undefined diagnostic.
    pub undefined: FxHashSet<OccPath>,

    /// True if the safety check rejected the statement.
    pub rejected: bool,
}

/// What planning needs write access to.
pub struct PlanContext<'a> {
    /// The symbol store.
    pub store: &'a mut SymbolStore,

    /// The domain store, for size estimates.
    pub domains: &'a crate::db::DomainStore,

    /// The diagnostics sink.
    pub reporter: &'a mut Reporter,

    /// Monotone counter for auxiliary predicate names.
    pub aux_predicates: &'a mut u32,
}

impl PlanContext<'_> {
    fn aux_predicate(&mut self, prefix: &str) -> NameId {
        let name = format!("{}{}", prefix, *self.aux_predicates);
        *self.aux_predicates += 1;
        self.store.name(&name)
    }
}

/// The signature of an atom term.
pub fn atom_sig(term: &Term, store: &SymbolStore) -> Option<Sig> {
    match &term.kind {
        TermKind::Fun { name, sign, args } => Some(Sig {
            name: *name,
            arity: args.len() as u32,
            sign: *sign,
        }),
        TermKind::Value(symbol) => store.sig(*symbol),
        _ => None,
    }
}

// {{{ schedule construction

/// The priority heuristic of the planner: positive literals first,
/// then assignments, then ranges and scripts, then the rest; ties go
/// to the smaller size estimate, then to body order.
#[derive(Clone, Copy, Debug, PartialEq)]
struct EntityCost {
    rank: u8,
    estimate: f64,
    order: usize,
}

fn better(a: &EntityCost, b: &EntityCost) -> bool {
    (a.rank, a.estimate, a.order) < (b.rank, b.estimate, b.order)
}

fn literal_cost(literal: &BodyLiteral, order: usize, ctx: &PlanContext) -> EntityCost {
    match literal {
        BodyLiteral::Pred { sign, atom } if sign.is_positive() => {
            let estimate = atom_sig(atom, ctx.store)
                .and_then(|sig| ctx.domains.domain(sig))
                .map(|domain| domain.defined_count() as f64)
                .unwrap_or(0.0);
            EntityCost {
                rank: 0,
                estimate,
                order,
            }
        }
        BodyLiteral::Comparison { assign: true, .. } => EntityCost {
            rank: 1,
            estimate: 1.0,
            order,
        },
        BodyLiteral::Range { lo, hi, .. } => {
            let estimate = match (lo.as_value(), hi.as_value()) {
                (Some(Symbol::Num(lo)), Some(Symbol::Num(hi))) => {
                    (hi as f64 - lo as f64 + 1.0).max(0.0)
                }
                _ => 1000.0,
            };
            EntityCost {
                rank: 2,
                estimate,
                order,
            }
        }
        BodyLiteral::Script { .. } => EntityCost {
            rank: 2,
            estimate: 1.0,
            order,
        },
        _ => EntityCost {
            rank: 3,
            estimate: 0.0,
            order,
        },
    }
}

struct VarInfo {
    name: NameId,
}

/// Schedule `literals` with the given cells assumed bound; `consumers`
/// are variables (e.g. of the head) that must end up bound without an
/// entity of their own.
///
/// On failure the unbound variable names are returned.
fn order_literals(
    literals: &[BodyLiteral],
    pre_bound: &FxHashSet<CellKey>,
    consumers: &[(VarTerm, bool)],
    ctx: &mut PlanContext,
) -> Result<Vec<usize>, Vec<NameId>> {
    let mut checker: SafetyChecker<VarInfo, EntityCost> = SafetyChecker::default();
    let mut var_ids: FxHashMap<CellKey, usize> = FxHashMap::default();

    let mut var_id = |checker: &mut SafetyChecker<VarInfo, EntityCost>,
                      var_ids: &mut FxHashMap<CellKey, usize>,
                      var: &VarTerm| {
        *var_ids
            .entry(var.cell)
            .or_insert_with(|| checker.insert_var(VarInfo { name: var.name }))
    };

    // The context entity provides whatever the caller fixed already.
    let context = checker.insert_ent(EntityCost {
        rank: 0,
        estimate: 0.0,
        order: usize::MAX,
    });

    let mut ents = Vec::with_capacity(literals.len());
    for (order, literal) in literals.iter().enumerate() {
        let ent = checker.insert_ent(literal_cost(literal, order, ctx));
        ents.push(ent);
        let mut vars = Vec::new();
        literal.collect_vars(&mut vars);
        // Aggregate and conditional locals were filtered to rule level
        // already; condition schedules pass their locals through the
        // literals directly.
        let mut nested = Vec::new();
        collect_local_vars(literal, &mut nested);
        vars.extend(nested);
        for (var, binding) in vars {
            let id = var_id(&mut checker, &mut var_ids, &var);
            if pre_bound.contains(&var.cell) {
                checker.insert_edge_ent_var(context, id);
                continue;
            }
            if binding {
                checker.insert_edge_ent_var(ent, id);
            } else {
                checker.insert_edge_var_ent(id, ent);
            }
        }
    }

    for (var, _) in consumers {
        let id = var_id(&mut checker, &mut var_ids, var);
        if pre_bound.contains(&var.cell) {
            checker.insert_edge_ent_var(context, id);
        }
    }

    let order = checker.order(better);
    let open = checker.open_vars();
    if !open.is_empty() {
        return Err(open
            .into_iter()
            .map(|id| checker.var_data(id).name)
            .collect());
    }
    Ok(order
        .into_iter()
        .filter_map(|ent| ents.iter().position(|&e| e == ent))
        .collect())
}

/// Level-above-zero variables of a condition schedule's own literals.
///
/// [BodyLiteral::collect_vars] hides them for rule-level planning;
/// a condition schedule plans exactly those, so they are gathered
/// here.
fn collect_local_vars(literal: &BodyLiteral, out: &mut Vec<(VarTerm, bool)>) {
    let mut all = Vec::new();
    match literal {
        BodyLiteral::Pred { sign, atom } => atom.collect_vars(sign.is_positive(), &mut all),
        BodyLiteral::Comparison {
            left,
            rights,
            assign,
            ..
        } => {
            left.collect_vars(*assign, &mut all);
            for (_, right) in rights {
                right.collect_vars(false, &mut all);
            }
        }
        BodyLiteral::Range { var, lo, hi } => {
            all.push((*var, true));
            lo.collect_vars(false, &mut all);
            hi.collect_vars(false, &mut all);
        }
        BodyLiteral::Script { var, args, .. } => {
            all.push((*var, true));
            for arg in args {
                arg.collect_vars(false, &mut all);
            }
        }
        _ => {}
    }
    out.extend(all.into_iter().filter(|(var, _)| var.level > 0));
}

fn cells_of_terms(terms: &[Term], out: &mut FxHashSet<CellKey>, rule_level_only: bool) {
    for term in terms {
        let mut vars = Vec::new();
        term.collect_vars(false, &mut vars);
        for (var, _) in vars {
            if !rule_level_only || var.level == 0 {
                out.insert(var.cell);
            }
        }
    }
}

/// Plan a condition: rule-level cells are assumed bound, locals are
/// scheduled, and the tuple and atom must come out fully bound.
fn plan_condition(
    tuple: Vec<Term>,
    atom: Option<Term>,
    condition: &[BodyLiteral],
    loc: crate::reports::Location,
    ctx: &mut PlanContext,
) -> Result<ElementPlan, ()> {
    let mut pre_bound = FxHashSet::default();
    for literal in condition {
        let mut vars = Vec::new();
        literal.collect_vars(&mut vars);
        for (var, _) in vars {
            pre_bound.insert(var.cell);
        }
    }
    // Rule-level tuple and atom cells are bound by the outer schedule.
    cells_of_terms(&tuple, &mut pre_bound, true);
    if let Some(atom) = &atom {
        cells_of_terms(std::slice::from_ref(atom), &mut pre_bound, true);
    }

    let mut consumers = Vec::new();
    for term in &tuple {
        term.collect_vars(false, &mut consumers);
    }
    if let Some(atom) = &atom {
        atom.collect_vars(false, &mut consumers);
    }

    match order_literals(condition, &pre_bound, &consumers, ctx) {
        Ok(order) => {
            let schedule = order
                .into_iter()
                .map(|index| binder_spec(OccPath::Body(index), &condition[index], ctx))
                .collect::<Result<Vec<_>, ()>>()?;
            let mut globals: Vec<CellKey> = pre_bound.iter().copied().collect();
            globals.sort_unstable();
            Ok(ElementPlan {
                tuple,
                atom,
                schedule,
                globals,
            })
        }
        Err(unbound) => {
            for name in unbound {
                let name = ctx.store.resolve(name).to_string();
                ctx.reporter.error(
                    DiagnosticKind::UnsafeVariable,
                    loc,
                    format!("variable {name} is unsafe"),
                );
            }
            Err(())
        }
    }
}

fn binder_spec(
    path: OccPath,
    literal: &BodyLiteral,
    ctx: &mut PlanContext,
) -> Result<BinderSpec, ()> {
    match literal {
        BodyLiteral::Pred { sign, atom } => {
            let sig = match atom_sig(atom, ctx.store) {
                Some(sig) => sig,
                None => return Err(()),
            };
            match sign {
                NafSign::Pos => Ok(BinderSpec::Scan {
                    path,
                    sig,
                    pattern: gterm(atom),
                    atom: atom.clone(),
                }),
                naf => Ok(BinderSpec::NegTest {
                    path,
                    sig,
                    atom: atom.clone(),
                    naf: *naf,
                }),
            }
        }

        BodyLiteral::Comparison {
            left,
            rights,
            assign,
            ..
        } => {
            let (rel, right) = rights.first().expect("unchained comparison");
            Ok(BinderSpec::Relation {
                rel: *rel,
                left: left.clone(),
                right: right.clone(),
                assign: *assign,
            })
        }

        BodyLiteral::Range { var, lo, hi } => Ok(BinderSpec::Range {
            var: *var,
            lo: lo.clone(),
            hi: hi.clone(),
        }),

        BodyLiteral::Script { var, name, args } => Ok(BinderSpec::Script {
            var: *var,
            name: *name,
            args: args.clone(),
        }),

        BodyLiteral::Aggregate { sign, aggregate } => {
            let assign = sign.is_positive() && aggregate.is_assignment();
            let mut elements = Vec::with_capacity(aggregate.elements.len());
            for element in &aggregate.elements {
                let loc = element
                    .tuple
                    .first()
                    .map(|term| term.loc)
                    .or_else(|| element.condition.first().and_then(literal_loc))
                    .unwrap_or_else(|| fallback_loc(ctx.store));
                let planned = plan_condition(
                    element.tuple.clone(),
                    None,
                    &element.condition,
                    loc,
                    ctx,
                )?;
                elements.push(planned);
            }
            let mut globals = FxHashSet::default();
            let mut vars = Vec::new();
            literal.collect_vars(&mut vars);
            for (var, _) in vars {
                globals.insert(var.cell);
            }
            // Sorted for deterministic auxiliary keys.
            let mut globals: Vec<CellKey> = globals.into_iter().collect();
            globals.sort_unstable();
            Ok(BinderSpec::Aggregate(Box::new(AggregatePlan {
                fun: aggregate.fun,
                sign: *sign,
                left: aggregate.left.clone(),
                right: aggregate.right.clone(),
                assign,
                elements,
                aux: ctx.aux_predicate("#d"),
                globals,
            })))
        }

        BodyLiteral::Conditional(conditional) => {
            let loc = literal_loc(&conditional.literal).unwrap_or_else(|| fallback_loc(ctx.store));
            let element = plan_condition(Vec::new(), None, &conditional.condition, loc, ctx)?;
            Ok(BinderSpec::Conditional(Box::new(ConditionalPlan {
                literal: (*conditional.literal).clone(),
                element,
                aux: ctx.aux_predicate("#b"),
            })))
        }

        BodyLiteral::Theory { sign, atom } => Ok(BinderSpec::Theory {
            index: *atom,
            sign: *sign,
        }),
    }
}

fn literal_loc(literal: &BodyLiteral) -> Option<crate::reports::Location> {
    match literal {
        BodyLiteral::Pred { atom, .. } => Some(atom.loc),
        BodyLiteral::Comparison { left, .. } => Some(left.loc),
        BodyLiteral::Range { lo, .. } => Some(lo.loc),
        BodyLiteral::Script { args, .. } => args.first().map(|arg| arg.loc),
        BodyLiteral::Aggregate { aggregate, .. } => aggregate
            .elements
            .first()
            .and_then(|element| element.tuple.first().map(|term| term.loc)),
        BodyLiteral::Conditional(conditional) => literal_loc(&conditional.literal),
        BodyLiteral::Theory { .. } => None,
    }
}

fn fallback_loc(store: &mut SymbolStore) -> crate::reports::Location {
    let file = store.name("<unknown>");
    crate::reports::Location::new(file, (0, 0), (0, 0))
}

// }}}
// {{{ statement planning

fn statement_loc(statement: &Statement) -> crate::reports::Location {
    match statement {
        Statement::Rule(rule) => rule.loc,
        Statement::Define { loc, .. }
        | Statement::Minimize { loc, .. }
        | Statement::Show { loc, .. }
        | Statement::ShowSig { loc, .. }
        | Statement::External { loc, .. }
        | Statement::Edge { loc, .. }
        | Statement::Heuristic { loc, .. }
        | Statement::Project { loc, .. }
        | Statement::ProjectSig { loc, .. } => *loc,
    }
}

fn statement_body(statement: &Statement) -> &[BodyLiteral] {
    match statement {
        Statement::Rule(rule) => &rule.body,
        Statement::Minimize { body, .. }
        | Statement::Show { body, .. }
        | Statement::External { body, .. }
        | Statement::Edge { body, .. }
        | Statement::Heuristic { body, .. }
        | Statement::Project { body, .. } => body,
        _ => &[],
    }
}

/// Variables a statement consumes outside its body.
fn statement_consumers(statement: &Statement) -> Vec<(VarTerm, bool)> {
    let mut out = Vec::new();
    let mut push_term = |term: &Term| {
        let mut vars = Vec::new();
        term.collect_vars(false, &mut vars);
        out.extend(vars.into_iter().filter(|(var, _)| var.level == 0));
    };
    match statement {
        Statement::Rule(rule) => match &rule.head {
            Head::False | Head::Theory(_) => {}
            Head::Atom(atom) => push_term(atom),
            Head::Disjunction(elements) => {
                for element in elements {
                    push_term(&element.atom);
                }
            }
            Head::Choice {
                left,
                right,
                elements,
            } => {
                for guard in [left, right].into_iter().flatten() {
                    push_term(&guard.term);
                }
                for element in elements {
                    push_term(&element.atom);
                }
            }
            Head::Aggregate(aggregate) => {
                for guard in [&aggregate.left, &aggregate.right].into_iter().flatten() {
                    push_term(&guard.term);
                }
                for element in &aggregate.elements {
                    push_term(&element.atom);
                    for term in &element.tuple {
                        push_term(term);
                    }
                }
            }
        },
        Statement::Minimize {
            weight,
            priority,
            tuple,
            ..
        } => {
            push_term(weight);
            push_term(priority);
            for term in tuple {
                push_term(term);
            }
        }
        Statement::Show { term, .. } => push_term(term),
        Statement::External { atom, .. } | Statement::Project { atom, .. } => push_term(atom),
        Statement::Edge { u, v, .. } => {
            push_term(u);
            push_term(v);
        }
        Statement::Heuristic {
            atom,
            bias,
            priority,
            ..
        } => {
            push_term(atom);
            push_term(bias);
            push_term(priority);
        }
        _ => {}
    }
    out
}

/// Collect the linear inequalities manifest in a body.
fn gather_inequalities(body: &[BodyLiteral], solver: &mut IeSolver) {
    fn linear(term: &Term) -> Option<(CellKey, i64, i64)> {
        match &term.kind {
            TermKind::Var(v) => Some((v.cell, 1, 0)),
            TermKind::Linear { var, m, n } => Some((var.cell, *m as i64, *n as i64)),
            _ => None,
        }
    }
    fn number(term: &Term) -> Option<i64> {
        match term.as_value() {
            Some(Symbol::Num(n)) => Some(n as i64),
            _ => None,
        }
    }
    // m·x + n REL rhs, as zero or more `Σ ≥ b` rows.
    fn rows(
        solver: &mut IeSolver,
        rel: Relation,
        x: (CellKey, i64, i64),
        rhs_var: Option<(CellKey, i64, i64)>,
        rhs_const: i64,
        manifest: bool,
    ) {
        let (cell, m, n) = x;
        let mut terms = vec![IeTerm {
            coefficient: m,
            variable: Some(cell),
        }];
        let mut constant = rhs_const - n;
        if let Some((rcell, rm, rn)) = rhs_var {
            terms.push(IeTerm {
                coefficient: -rm,
                variable: Some(rcell),
            });
            constant += rn;
        }
        let negated: Vec<IeTerm> = terms
            .iter()
            .map(|t| IeTerm {
                coefficient: -t.coefficient,
                variable: t.variable,
            })
            .collect();
        match rel {
            Relation::Ge => solver.add(
                Ie {
                    terms,
                    bound: constant,
                },
                manifest,
            ),
            Relation::Gt => solver.add(
                Ie {
                    terms,
                    bound: constant + 1,
                },
                manifest,
            ),
            Relation::Le => solver.add(
                Ie {
                    terms: negated,
                    bound: -constant,
                },
                manifest,
            ),
            Relation::Lt => solver.add(
                Ie {
                    terms: negated,
                    bound: -constant - 1,
                },
                manifest,
            ),
            Relation::Eq => {
                solver.add(
                    Ie {
                        terms,
                        bound: constant,
                    },
                    manifest,
                );
                solver.add(
                    Ie {
                        terms: negated,
                        bound: -constant,
                    },
                    manifest,
                );
            }
            Relation::Ne => {}
        }
    }

    for literal in body {
        match literal {
            BodyLiteral::Comparison {
                neg: false,
                left,
                rights,
                ..
            } if rights.len() == 1 => {
                let (rel, right) = &rights[0];
                if let Some(x) = linear(left) {
                    if let Some(c) = number(right) {
                        rows(solver, *rel, x, None, c, false);
                    } else if let Some(y) = linear(right) {
                        rows(solver, *rel, x, Some(y), 0, false);
                    }
                } else if let (Some(c), Some(y)) = (number(left), linear(right)) {
                    rows(solver, rel.mirror(), y, None, c, false);
                }
            }
            BodyLiteral::Range { var, lo, hi } => {
                let x = (var.cell, 1i64, 0i64);
                if let Some(c) = number(lo) {
                    rows(solver, Relation::Ge, x, None, c, true);
                }
                if let Some(c) = number(hi) {
                    rows(solver, Relation::Le, x, None, c, true);
                }
            }
            _ => {}
        }
    }
}

/// Plan one statement: schedule its body, plan nested elements, run
/// the inequality solver.
pub fn plan_statement(statement: Statement, ctx: &mut PlanContext) -> StatementPlan {
    let loc = statement_loc(&statement);
    let body = statement_body(&statement).to_vec();
    let consumers = statement_consumers(&statement);

    let pre_bound = FxHashSet::default();
    let mut rejected = false;
    let mut schedule = Vec::new();
    match order_literals(&body, &pre_bound, &consumers, ctx) {
        Ok(order) => {
            for index in order {
                match binder_spec(OccPath::Body(index), &body[index], ctx) {
                    Ok(spec) => schedule.push(spec),
                    Err(()) => {
                        rejected = true;
                        break;
                    }
                }
            }
        }
        Err(unbound) => {
            for name in unbound {
                let name = ctx.store.resolve(name).to_string();
                ctx.reporter.error(
                    DiagnosticKind::UnsafeVariable,
                    loc,
                    format!("variable {name} is unsafe"),
                );
            }
            rejected = true;
        }
    }

    // Head element conditions get their own schedules.
    let mut head_elements = Vec::new();
    if !rejected {
        if let Statement::Rule(rule) = &statement {
            let plans: Vec<Option<ElementPlan>> = match &rule.head {
                Head::Disjunction(elements) | Head::Choice { elements, .. } => elements
                    .iter()
                    .map(|element| {
                        plan_condition(
                            Vec::new(),
                            Some(element.atom.clone()),
                            &element.condition,
                            element.atom.loc,
                            ctx,
                        )
                        .ok()
                    })
                    .collect(),
                Head::Aggregate(aggregate) => aggregate
                    .elements
                    .iter()
                    .map(|element| {
                        plan_condition(
                            element.tuple.clone(),
                            Some(element.atom.clone()),
                            &element.condition,
                            element.atom.loc,
                            ctx,
                        )
                        .ok()
                    })
                    .collect(),
                _ => Vec::new(),
            };
            for plan in plans {
                match plan {
                    Some(plan) => head_elements.push(plan),
                    None => rejected = true,
                }
            }
        }
    }

    let mut solver = IeSolver::default();
    gather_inequalities(&body, &mut solver);
    let bounds = solver.compute(None);

    if rejected {
        log::debug!(target: targets::SAFETY, "statement rejected by the safety check");
    }

    StatementPlan {
        statement,
        schedule,
        head_elements,
        bounds,
        occ_types: FxHashMap::default(),
        undefined: FxHashSet::default(),
        rejected,
    }
}

// }}}
// {{{ dependency wiring

/// Register every occurrence of `plans` with the dependency graph and
/// analyze it, writing classifications back into the plans.
pub fn analyze_dependencies(
    plans: &mut [StatementPlan],
    cells: &mut CellArena,
    store: &SymbolStore,
) -> Vec<Component> {
    let mut dependency: Dependency<usize, OccPath> = Dependency::default();

    for (index, plan) in plans.iter().enumerate() {
        let normal = match &plan.statement {
            Statement::Rule(rule) => matches!(rule.head, Head::Atom(_) | Head::False),
            _ => true,
        };
        let node = dependency.add_node(index, normal);

        // Provides.
        if let Statement::Rule(rule) = &plan.statement {
            match &rule.head {
                Head::Atom(atom) => dependency.provides(node, gterm(atom)),
                Head::Disjunction(elements) | Head::Choice { elements, .. } => {
                    for element in elements {
                        dependency.provides(node, gterm(&element.atom));
                    }
                }
                Head::Aggregate(aggregate) => {
                    for element in &aggregate.elements {
                        dependency.provides(node, gterm(&element.atom));
                    }
                }
                Head::False | Head::Theory(_) => {}
            }
        }
        if let Statement::External { atom, .. } = &plan.statement {
            dependency.provides(node, gterm(atom));
        }

        // Depends.
        let body = statement_body(&plan.statement);
        for (body_index, literal) in body.iter().enumerate() {
            register_depends(
                &mut dependency,
                node,
                literal,
                OccPath::Body(body_index),
                false,
                store,
            );
        }
        if let Statement::Rule(rule) = &plan.statement {
            let elements: &[crate::structures::rule::CondHead] = match &rule.head {
                Head::Disjunction(elements) | Head::Choice { elements, .. } => elements,
                _ => &[],
            };
            for (element_index, element) in elements.iter().enumerate() {
                for (cond_index, literal) in element.condition.iter().enumerate() {
                    register_depends(
                        &mut dependency,
                        node,
                        literal,
                        OccPath::Head {
                            element: element_index,
                            cond: cond_index,
                        },
                        // Recursion through a choice or disjunction
                        // condition counts as negative.
                        true,
                        store,
                    );
                }
            }
            if let Head::Aggregate(aggregate) = &rule.head {
                for (element_index, element) in aggregate.elements.iter().enumerate() {
                    for (cond_index, literal) in element.condition.iter().enumerate() {
                        register_depends(
                            &mut dependency,
                            node,
                            literal,
                            OccPath::Head {
                                element: element_index,
                                cond: cond_index,
                            },
                            true,
                            store,
                        );
                    }
                }
            }
        }
    }

    let components = dependency.analyze(cells, store);

    for node in &dependency.nodes {
        let plan = &mut plans[node.stm];
        for dep in &node.depends {
            plan.occ_types.insert(dep.key, dep.occ_type);
            if dep.providers.is_empty() {
                plan.undefined.insert(dep.key);
            }
        }
    }
    components
}

fn register_depends(
    dependency: &mut Dependency<usize, OccPath>,
    node: usize,
    literal: &BodyLiteral,
    path: OccPath,
    force_negative: bool,
    store: &SymbolStore,
) {
    match literal {
        BodyLiteral::Pred { sign, atom } => {
            dependency.depends(
                node,
                gterm(atom),
                path,
                sign.is_positive(),
                !sign.is_positive(),
                force_negative,
                store,
            );
        }
        BodyLiteral::Aggregate { sign, aggregate } => {
            let body_index = match path {
                OccPath::Body(index) => index,
                _ => return,
            };
            for (element_index, element) in aggregate.elements.iter().enumerate() {
                for (cond_index, literal) in element.condition.iter().enumerate() {
                    if let BodyLiteral::Pred { sign: cond_sign, atom } = literal {
                        let positive = sign.is_positive() && cond_sign.is_positive();
                        dependency.depends(
                            node,
                            gterm(atom),
                            OccPath::BodyElem {
                                body: body_index,
                                element: element_index,
                                cond: cond_index,
                            },
                            positive,
                            !positive,
                            force_negative,
                            store,
                        );
                    }
                }
            }
        }
        BodyLiteral::Conditional(conditional) => {
            let body_index = match path {
                OccPath::Body(index) => index,
                _ => return,
            };
            if let BodyLiteral::Pred { sign, atom } = &*conditional.literal {
                dependency.depends(
                    node,
                    gterm(atom),
                    OccPath::BodyElem {
                        body: body_index,
                        element: 0,
                        cond: usize::MAX,
                    },
                    // The conditioned literal is required universally;
                    // recursion through it is not monotone.
                    false,
                    !sign.is_positive(),
                    true,
                    store,
                );
            }
            for (cond_index, literal) in conditional.condition.iter().enumerate() {
                if let BodyLiteral::Pred { sign, atom } = literal {
                    dependency.depends(
                        node,
                        gterm(atom),
                        OccPath::BodyElem {
                            body: body_index,
                            element: 0,
                            cond: cond_index,
                        },
                        sign.is_positive(),
                        !sign.is_positive(),
                        force_negative,
                        store,
                    );
                }
            }
        }
        _ => {}
    }
}

// }}}
