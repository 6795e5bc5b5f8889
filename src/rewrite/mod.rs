/*!
The rewriting pipeline.

One pass over the selected statements brings them into the canonical
form the instantiator consumes.
The stages run in a fixed order, and running the whole pipeline a
second time changes nothing:

1. `#const` substitution ([defines]).
2. Unpooling ([unpool]).
3. Theory initialisation, resolving atoms against their definitions.
4. Simplification: constant folding, range and script extraction,
   anonymous-variable handling.
5. Projection of anonymous argument slots ([projection]).
6. Comparison unchaining ([comparison]).
7. Head-aggregate shifting ([aggregates]).
8. Arithmetic lifting of non-invertible subterms.
9. Assignment planning: equalities with a bindable side become
   binders.

Afterwards no pool, range or script term remains in any statement;
every comparison has one link; every atom argument is a value,
variable, linear term or function over such.
*/

pub mod aggregates;
pub mod comparison;
pub mod defines;
pub mod projection;
pub mod unpool;

pub use defines::Define;

use crate::{
    misc::log::targets,
    reports::DiagnosticKind,
    structures::{
        literal::{AggrElem, BodyLiteral, Relation},
        rule::{Head, Statement},
        term::{
            rewrite_arithmetics, simplify, ArithLift, Simplified, SimplifyEnv, SimplifyState,
            Term, TermKind,
        },
        theory::{resolve_operators, TheoryAtom, TheoryAtomType, TheoryDefinition},
    },
};

use projection::{ProjectionEnv, ProjectionState};

/// Run the pipeline over the statements of the parts selected for a
/// step.
///
/// `injected` carries caller defines: command-line defaults and the
/// parameter bindings of instantiated program parts.
pub fn rewrite(
    statements: Vec<Statement>,
    injected: Vec<Define>,
    theory_atoms: &mut [TheoryAtom],
    theory_defs: &[TheoryDefinition],
    env: &mut SimplifyEnv,
) -> Vec<Statement> {
    // Stage 1: defines.
    let mut defines_raw = injected;
    let mut statements: Vec<Statement> = statements
        .into_iter()
        .filter_map(|statement| match statement {
            Statement::Define {
                name,
                value,
                default,
                loc,
            } => {
                defines_raw.push(Define {
                    name,
                    value,
                    default,
                    loc,
                });
                None
            }
            other => Some(other),
        })
        .collect();
    let collected = defines::collect(defines_raw, env.store, env.reporter);
    let resolved = defines::resolve(collected, env.store, env.cells, env.reporter);
    for statement in &mut statements {
        visit_statement_terms(statement, &mut |term| {
            defines::substitute_term(term, &resolved, env.store, env.reporter);
        });
    }

    // Stage 2: unpooling.
    let mut statements: Vec<Statement> =
        statements.into_iter().flat_map(unpool_statement).collect();

    // Stage 3: theory initialisation.
    init_theory(&statements, theory_atoms, theory_defs, env);

    // Stage 4: simplification.
    let mut statements: Vec<Statement> = statements
        .drain(..)
        .filter_map(|statement| simplify_statement(statement, env))
        .collect();

    // Stage 5: projection.
    let mut projections = ProjectionState::default();
    {
        let mut penv = ProjectionEnv {
            store: env.store,
            cells: env.cells,
            aux: env.aux,
        };
        for statement in &mut statements {
            if let Some((head, body)) = statement_head_body(statement) {
                if let Some(head) = head {
                    projection::project_head(head, &mut projections, &mut penv);
                }
                projection::project_body(body, &mut projections, &mut penv);
            }
        }
    }
    statements.extend(projections.new_rules.into_iter().map(Statement::Rule));

    // Stage 6: comparison unchaining.
    let mut statements: Vec<Statement> = statements
        .into_iter()
        .flat_map(|statement| match statement {
            Statement::Rule(rule) => comparison::unchain_rule(rule)
                .into_iter()
                .map(Statement::Rule)
                .collect::<Vec<_>>(),
            other => vec![other],
        })
        .collect();

    // Stages 7 through 9, statement by statement.
    for statement in &mut statements {
        if let Statement::Rule(rule) = statement {
            aggregates::shift_head_aggregate(rule);
            aggregates::check_tuples(&rule.body, env.store, env.reporter);
        }
        lift_statement(statement, env);
        if let Some((_, body)) = statement_head_body(statement) {
            plan_assignments(body);
        }
    }

    log::debug!(
        target: targets::REWRITE,
        "pipeline produced {} statements",
        statements.len()
    );
    statements
}

/// The head (for rules) and body of a statement, where it has one.
fn statement_head_body(
    statement: &mut Statement,
) -> Option<(Option<&mut Head>, &mut Vec<BodyLiteral>)> {
    match statement {
        Statement::Rule(rule) => Some((Some(&mut rule.head), &mut rule.body)),
        Statement::Minimize { body, .. }
        | Statement::Show { body, .. }
        | Statement::External { body, .. }
        | Statement::Edge { body, .. }
        | Statement::Heuristic { body, .. }
        | Statement::Project { body, .. } => Some((None, body)),
        Statement::ShowSig { .. } | Statement::ProjectSig { .. } | Statement::Define { .. } => {
            None
        }
    }
}

// {{{ term visitors

fn visit_literal_terms(literal: &mut BodyLiteral, f: &mut impl FnMut(&mut Term)) {
    match literal {
        BodyLiteral::Pred { atom, .. } => f(atom),
        BodyLiteral::Comparison { left, rights, .. } => {
            f(left);
            for (_, right) in rights {
                f(right);
            }
        }
        BodyLiteral::Aggregate { aggregate, .. } => {
            if let Some(guard) = &mut aggregate.left {
                f(&mut guard.term);
            }
            if let Some(guard) = &mut aggregate.right {
                f(&mut guard.term);
            }
            for element in &mut aggregate.elements {
                for term in &mut element.tuple {
                    f(term);
                }
                for literal in &mut element.condition {
                    visit_literal_terms(literal, f);
                }
            }
        }
        BodyLiteral::Conditional(conditional) => {
            visit_literal_terms(&mut conditional.literal, f);
            for literal in &mut conditional.condition {
                visit_literal_terms(literal, f);
            }
        }
        BodyLiteral::Theory { .. } => {}
        BodyLiteral::Range { lo, hi, .. } => {
            f(lo);
            f(hi);
        }
        BodyLiteral::Script { args, .. } => {
            for arg in args {
                f(arg);
            }
        }
    }
}

fn visit_head_terms(head: &mut Head, f: &mut impl FnMut(&mut Term)) {
    match head {
        Head::False | Head::Theory(_) => {}
        Head::Atom(atom) => f(atom),
        Head::Disjunction(elements) => {
            for element in elements {
                f(&mut element.atom);
                for literal in &mut element.condition {
                    visit_literal_terms(literal, f);
                }
            }
        }
        Head::Choice {
            left,
            right,
            elements,
        } => {
            if let Some(guard) = left {
                f(&mut guard.term);
            }
            if let Some(guard) = right {
                f(&mut guard.term);
            }
            for element in elements {
                f(&mut element.atom);
                for literal in &mut element.condition {
                    visit_literal_terms(literal, f);
                }
            }
        }
        Head::Aggregate(aggregate) => {
            if let Some(guard) = &mut aggregate.left {
                f(&mut guard.term);
            }
            if let Some(guard) = &mut aggregate.right {
                f(&mut guard.term);
            }
            for element in &mut aggregate.elements {
                for term in &mut element.tuple {
                    f(term);
                }
                f(&mut element.atom);
                for literal in &mut element.condition {
                    visit_literal_terms(literal, f);
                }
            }
        }
    }
}

fn visit_statement_terms(statement: &mut Statement, f: &mut impl FnMut(&mut Term)) {
    match statement {
        Statement::Rule(rule) => {
            visit_head_terms(&mut rule.head, f);
            for literal in &mut rule.body {
                visit_literal_terms(literal, f);
            }
        }
        Statement::Define { value, .. } => f(value),
        Statement::Minimize {
            weight,
            priority,
            tuple,
            body,
            ..
        } => {
            f(weight);
            f(priority);
            for term in tuple {
                f(term);
            }
            for literal in body {
                visit_literal_terms(literal, f);
            }
        }
        Statement::Show { term, body, .. } => {
            f(term);
            for literal in body {
                visit_literal_terms(literal, f);
            }
        }
        Statement::External { atom, body, .. }
        | Statement::Project { atom, body, .. } => {
            f(atom);
            for literal in body {
                visit_literal_terms(literal, f);
            }
        }
        Statement::Edge { u, v, body, .. } => {
            f(u);
            f(v);
            for literal in body {
                visit_literal_terms(literal, f);
            }
        }
        Statement::Heuristic {
            atom,
            body,
            bias,
            priority,
            ..
        } => {
            f(atom);
            f(bias);
            f(priority);
            for literal in body {
                visit_literal_terms(literal, f);
            }
        }
        Statement::ShowSig { .. } | Statement::ProjectSig { .. } => {}
    }
}

// }}}
// {{{ unpooling over statements

fn unpool_statement(statement: Statement) -> Vec<Statement> {
    use unpool::{cross_product, unpool_literal, unpool_rule, unpool_term};

    fn bodies(body: &[BodyLiteral]) -> Vec<Vec<BodyLiteral>> {
        cross_product(body.iter().map(unpool_literal).collect())
    }

    match statement {
        Statement::Rule(rule) => unpool_rule(&rule)
            .into_iter()
            .map(Statement::Rule)
            .collect(),

        Statement::Define { .. } | Statement::ShowSig { .. } | Statement::ProjectSig { .. } => {
            vec![statement]
        }

        Statement::Minimize {
            weight,
            priority,
            tuple,
            body,
            loc,
        } => {
            let mut positions = vec![unpool_term(&weight), unpool_term(&priority)];
            positions.extend(tuple.iter().map(unpool_term));
            let mut out = Vec::new();
            for row in cross_product(positions) {
                for body in bodies(&body) {
                    let mut row = row.clone().into_iter();
                    let weight = row.next().expect("weight position");
                    let priority = row.next().expect("priority position");
                    out.push(Statement::Minimize {
                        weight,
                        priority,
                        tuple: row.collect(),
                        body,
                        loc,
                    });
                }
            }
            out
        }

        Statement::Show { term, body, loc } => {
            let mut out = Vec::new();
            for term in unpool_term(&term) {
                for body in bodies(&body) {
                    out.push(Statement::Show {
                        term: term.clone(),
                        body,
                        loc,
                    });
                }
            }
            out
        }

        Statement::External {
            atom,
            body,
            value,
            loc,
        } => {
            let mut out = Vec::new();
            for atom in unpool_term(&atom) {
                for body in bodies(&body) {
                    out.push(Statement::External {
                        atom: atom.clone(),
                        body,
                        value,
                        loc,
                    });
                }
            }
            out
        }

        Statement::Edge { u, v, body, loc } => {
            let mut out = Vec::new();
            for pair in cross_product(vec![unpool_term(&u), unpool_term(&v)]) {
                for body in bodies(&body) {
                    out.push(Statement::Edge {
                        u: pair[0].clone(),
                        v: pair[1].clone(),
                        body,
                        loc,
                    });
                }
            }
            out
        }

        Statement::Heuristic {
            atom,
            body,
            bias,
            priority,
            modifier,
            loc,
        } => {
            let positions = vec![
                unpool_term(&atom),
                unpool_term(&bias),
                unpool_term(&priority),
            ];
            let mut out = Vec::new();
            for row in cross_product(positions) {
                for body in bodies(&body) {
                    out.push(Statement::Heuristic {
                        atom: row[0].clone(),
                        body,
                        bias: row[1].clone(),
                        priority: row[2].clone(),
                        modifier,
                        loc,
                    });
                }
            }
            out
        }

        Statement::Project { atom, body, loc } => {
            let mut out = Vec::new();
            for atom in unpool_term(&atom) {
                for body in bodies(&body) {
                    out.push(Statement::Project {
                        atom: atom.clone(),
                        body,
                        loc,
                    });
                }
            }
            out
        }
    }
}

// }}}
// {{{ theory initialisation

fn init_theory(
    statements: &[Statement],
    theory_atoms: &mut [TheoryAtom],
    theory_defs: &[TheoryDefinition],
    env: &mut SimplifyEnv,
) {
    // Conflicting atom definitions across (or within) theories.
    let mut seen: Vec<(crate::structures::symbol::NameId, u32)> = Vec::new();
    for def in theory_defs {
        for atom_def in &def.atoms {
            let key = (atom_def.name, atom_def.arity);
            if seen.contains(&key) {
                env.reporter.error(
                    DiagnosticKind::MultipleTheoryAtomDefinitions,
                    atom_def.loc,
                    format!(
                        "theory atom &{}/{} defined more than once",
                        env.store.resolve(atom_def.name),
                        atom_def.arity
                    ),
                );
            } else {
                seen.push(key);
            }
        }
    }

    // Occurrence placement, collected from the statements.
    let mut placements: Vec<(usize, bool, bool)> = Vec::new();
    for statement in statements {
        if let Statement::Rule(rule) = statement {
            if let Head::Theory(index) = rule.head {
                placements.push((index, true, rule.body.is_empty()));
            }
            for literal in &rule.body {
                if let BodyLiteral::Theory { atom, .. } = literal {
                    placements.push((*atom, false, false));
                }
            }
        }
    }

    for (index, in_head, directive) in placements {
        let atom = &mut theory_atoms[index];
        let (name, arity) = match &atom.atom.kind {
            TermKind::Fun { name, args, .. } => (*name, args.len() as u32),
            TermKind::Value(symbol) => match env.store.sig(*symbol) {
                Some(sig) => (sig.name, sig.arity),
                None => continue,
            },
            _ => continue,
        };
        let atom_def = theory_defs
            .iter()
            .find_map(|def| def.atom_def(name, arity).map(|atom_def| (def, atom_def)));
        let (def, atom_def) = match atom_def {
            Some(found) => found,
            None => {
                env.reporter.error(
                    DiagnosticKind::InvalidTheoryTerm,
                    atom.loc,
                    format!(
                        "no definition for theory atom &{}/{}",
                        env.store.resolve(name),
                        arity
                    ),
                );
                continue;
            }
        };
        let allowed = match atom_def.atom_type {
            TheoryAtomType::Any => true,
            TheoryAtomType::Head => in_head,
            TheoryAtomType::Body => !in_head,
            TheoryAtomType::Directive => in_head && directive,
        };
        if !allowed {
            env.reporter.error(
                DiagnosticKind::InvalidTheoryTerm,
                atom.loc,
                format!(
                    "theory atom &{} not allowed in this position",
                    env.store.resolve(name)
                ),
            );
            continue;
        }
        if let Some(term_def) = def.term_def(atom_def.element_def) {
            for element in &mut atom.elements {
                for term in &mut element.tuple {
                    if resolve_operators(term, term_def).is_err() {
                        env.reporter.error(
                            DiagnosticKind::InvalidTheoryTerm,
                            atom.loc,
                            "operator not covered by the theory definition",
                        );
                    }
                }
            }
        }
        match (&mut atom.guard, &atom_def.guard) {
            (None, _) => {}
            (Some((op, term)), Some((ops, guard_def))) => {
                if !ops.contains(op) {
                    env.reporter.error(
                        DiagnosticKind::InvalidTheoryTerm,
                        atom.loc,
                        "guard operator not covered by the theory definition",
                    );
                } else if let Some(term_def) = def.term_def(*guard_def) {
                    if resolve_operators(term, term_def).is_err() {
                        env.reporter.error(
                            DiagnosticKind::InvalidTheoryTerm,
                            atom.loc,
                            "guard term not covered by the theory definition",
                        );
                    }
                }
            }
            (Some(_), None) => {
                env.reporter.error(
                    DiagnosticKind::InvalidTheoryTerm,
                    atom.loc,
                    "theory atom does not admit a guard",
                );
            }
        }
    }
}

// }}}
// {{{ simplification over statements

fn append_state(condition: &mut Vec<BodyLiteral>, state: SimplifyState) {
    for (var, lo, hi) in state.dots {
        condition.push(BodyLiteral::Range { var, lo, hi });
    }
    for (var, name, args) in state.scripts {
        condition.push(BodyLiteral::Script { var, name, args });
    }
}

fn simplify_atom_args(
    atom: &mut Term,
    positional: bool,
    state: &mut SimplifyState,
    env: &mut SimplifyEnv,
) -> bool {
    if let TermKind::Fun { args, .. } = &mut atom.kind {
        for arg in args {
            match simplify(arg, state, positional, false, env) {
                Simplified::Undefined => return false,
                Simplified::Ok { .. } => {}
            }
        }
    }
    true
}

fn simplify_terms(
    terms: &mut [Term],
    arithmetic: bool,
    state: &mut SimplifyState,
    env: &mut SimplifyEnv,
) -> bool {
    for term in terms {
        match simplify(term, state, false, arithmetic, env) {
            Simplified::Undefined => return false,
            Simplified::Ok { .. } => {}
        }
    }
    true
}

fn simplify_guards(
    left: &mut Option<crate::structures::literal::AggrGuard>,
    right: &mut Option<crate::structures::literal::AggrGuard>,
    state: &mut SimplifyState,
    env: &mut SimplifyEnv,
) -> bool {
    for guard in [left, right].into_iter().flatten() {
        match simplify(&mut guard.term, state, false, false, env) {
            Simplified::Undefined => return false,
            Simplified::Ok { .. } => {}
        }
    }
    true
}

fn simplify_aggr_elem(element: &mut AggrElem, level: u32, env: &mut SimplifyEnv) -> bool {
    let mut state = SimplifyState {
        level,
        ..Default::default()
    };
    if !simplify_terms(&mut element.tuple, false, &mut state, env) {
        return false;
    }
    if !simplify_literals(&mut element.condition, &mut state, env) {
        return false;
    }
    append_state(&mut element.condition, state);
    true
}

/// Simplify a conjunction of literals against the given state.
///
/// Returns false when some literal can never hold, which drops the
/// enclosing scope: a rule for a body, an element for a condition.
fn simplify_literals(
    literals: &mut Vec<BodyLiteral>,
    state: &mut SimplifyState,
    env: &mut SimplifyEnv,
) -> bool {
    let level = state.level;
    for literal in literals.iter_mut() {
        match literal {
            BodyLiteral::Pred { atom, .. } => {
                if !simplify_atom_args(atom, true, state, env) {
                    return false;
                }
            }
            BodyLiteral::Comparison { left, rights, .. } => {
                match simplify(left, state, false, false, env) {
                    Simplified::Undefined => return false,
                    Simplified::Ok { .. } => {}
                }
                for (_, right) in rights {
                    match simplify(right, state, false, false, env) {
                        Simplified::Undefined => return false,
                        Simplified::Ok { .. } => {}
                    }
                }
            }
            BodyLiteral::Aggregate { aggregate, .. } => {
                if !simplify_guards(&mut aggregate.left, &mut aggregate.right, state, env) {
                    return false;
                }
                aggregate
                    .elements
                    .retain_mut(|element| simplify_aggr_elem(element, level + 1, env));
            }
            BodyLiteral::Conditional(conditional) => {
                let mut nested = SimplifyState {
                    level: level + 1,
                    ..Default::default()
                };
                let mut kept = vec![(*conditional.literal).clone()];
                if !simplify_literals(&mut kept, &mut nested, env) {
                    return false;
                }
                conditional.literal = Box::new(kept.pop().expect("one literal"));
                if !simplify_literals(&mut conditional.condition, &mut nested, env) {
                    return false;
                }
                append_state(&mut conditional.condition, nested);
            }
            BodyLiteral::Theory { .. } => {}
            BodyLiteral::Range { lo, hi, .. } => {
                match simplify(lo, state, false, true, env) {
                    Simplified::Undefined => return false,
                    Simplified::Ok { .. } => {}
                }
                match simplify(hi, state, false, true, env) {
                    Simplified::Undefined => return false,
                    Simplified::Ok { .. } => {}
                }
            }
            BodyLiteral::Script { args, .. } => {
                if !simplify_terms(args, false, state, env) {
                    return false;
                }
            }
        }
    }
    true
}

/// Simplify a head in place; false drops the whole rule: a head
/// without a defined value derives nothing.
fn simplify_head(head: &mut Head, state: &mut SimplifyState, env: &mut SimplifyEnv) -> bool {
    match head {
        Head::False | Head::Theory(_) => true,
        Head::Atom(atom) => simplify_atom_args(atom, false, state, env),
        Head::Disjunction(elements) => {
            // An undefined element derives nothing; the disjunction
            // simply loses it.
            elements.retain_mut(|element| {
                let mut nested = SimplifyState {
                    level: 1,
                    ..Default::default()
                };
                if !simplify_atom_args(&mut element.atom, false, &mut nested, env) {
                    return false;
                }
                if !simplify_literals(&mut element.condition, &mut nested, env) {
                    return false;
                }
                append_state(&mut element.condition, nested);
                true
            });
            true
        }
        Head::Choice {
            left,
            right,
            elements,
        } => {
            if !simplify_guards(left, right, state, env) {
                return false;
            }
            elements.retain_mut(|element| {
                let mut nested = SimplifyState {
                    level: 1,
                    ..Default::default()
                };
                if !simplify_atom_args(&mut element.atom, false, &mut nested, env) {
                    return false;
                }
                if !simplify_literals(&mut element.condition, &mut nested, env) {
                    return false;
                }
                append_state(&mut element.condition, nested);
                true
            });
            true
        }
        Head::Aggregate(aggregate) => {
            if !simplify_guards(&mut aggregate.left, &mut aggregate.right, state, env) {
                return false;
            }
            aggregate.elements.retain_mut(|element| {
                let mut nested = SimplifyState {
                    level: 1,
                    ..Default::default()
                };
                if !simplify_terms(&mut element.tuple, false, &mut nested, env) {
                    return false;
                }
                if !simplify_atom_args(&mut element.atom, false, &mut nested, env) {
                    return false;
                }
                if !simplify_literals(&mut element.condition, &mut nested, env) {
                    return false;
                }
                append_state(&mut element.condition, nested);
                true
            });
            true
        }
    }
}

fn simplify_statement(statement: Statement, env: &mut SimplifyEnv) -> Option<Statement> {
    let mut statement = statement;
    let mut state = SimplifyState::default();
    let keep = match &mut statement {
        Statement::Rule(rule) => {
            simplify_head(&mut rule.head, &mut state, env)
                && simplify_literals(&mut rule.body, &mut state, env)
        }
        Statement::Minimize {
            weight,
            priority,
            tuple,
            body,
            ..
        } => {
            simplify_terms(std::slice::from_mut(weight), true, &mut state, env)
                && simplify_terms(std::slice::from_mut(priority), true, &mut state, env)
                && simplify_terms(tuple, false, &mut state, env)
                && simplify_literals(body, &mut state, env)
        }
        Statement::Show { term, body, .. } => {
            simplify_terms(std::slice::from_mut(term), false, &mut state, env)
                && simplify_literals(body, &mut state, env)
        }
        Statement::External { atom, body, .. } | Statement::Project { atom, body, .. } => {
            simplify_atom_args(atom, false, &mut state, env)
                && simplify_literals(body, &mut state, env)
        }
        Statement::Edge { u, v, body, .. } => {
            simplify_terms(std::slice::from_mut(u), false, &mut state, env)
                && simplify_terms(std::slice::from_mut(v), false, &mut state, env)
                && simplify_literals(body, &mut state, env)
        }
        Statement::Heuristic {
            atom,
            body,
            bias,
            priority,
            ..
        } => {
            simplify_atom_args(atom, false, &mut state, env)
                && simplify_terms(std::slice::from_mut(bias), true, &mut state, env)
                && simplify_terms(std::slice::from_mut(priority), true, &mut state, env)
                && simplify_literals(body, &mut state, env)
        }
        Statement::ShowSig { .. } | Statement::ProjectSig { .. } | Statement::Define { .. } => {
            true
        }
    };
    if !keep {
        return None;
    }
    if let Some((_, body)) = statement_head_body(&mut statement) {
        append_state(body, state);
    }
    Some(statement)
}

// }}}
// {{{ arithmetic lifting

fn lift_body(
    body: &mut Vec<BodyLiteral>,
    lift: &mut ArithLift,
    env: &mut SimplifyEnv,
) {
    for literal in body.iter_mut() {
        match literal {
            BodyLiteral::Pred { atom, .. } => {
                rewrite_arithmetics(atom, lift, 0, env.aux, env.store, env.cells);
            }
            BodyLiteral::Aggregate { aggregate, .. } => {
                for element in &mut aggregate.elements {
                    lift_condition(&mut element.condition, env);
                }
            }
            BodyLiteral::Conditional(conditional) => {
                lift_condition(&mut conditional.condition, env);
                if let BodyLiteral::Pred { atom, .. } = &mut *conditional.literal {
                    let mut local = ArithLift::default();
                    rewrite_arithmetics(atom, &mut local, 1, env.aux, env.store, env.cells);
                    push_equalities(&mut conditional.condition, &mut local);
                }
            }
            _ => {}
        }
    }
}

/// Lift the predicate arguments of a condition into the condition.
fn lift_condition(condition: &mut Vec<BodyLiteral>, env: &mut SimplifyEnv) {
    let mut local = ArithLift::default();
    for literal in condition.iter_mut() {
        if let BodyLiteral::Pred { atom, .. } = literal {
            rewrite_arithmetics(atom, &mut local, 1, env.aux, env.store, env.cells);
        }
    }
    push_equalities(condition, &mut local);
}

fn push_equalities(body: &mut Vec<BodyLiteral>, lift: &mut ArithLift) {
    for entries in lift.drain() {
        for (term, var) in entries {
            let loc = term.loc;
            body.push(BodyLiteral::Comparison {
                neg: false,
                left: Term::var(loc, var),
                rights: vec![(Relation::Eq, term)],
                assign: true,
            });
        }
    }
}

fn lift_statement(statement: &mut Statement, env: &mut SimplifyEnv) {
    match statement {
        Statement::Rule(rule) => {
            let mut lift = ArithLift::default();
            match &mut rule.head {
                Head::Atom(atom) => {
                    rewrite_arithmetics(atom, &mut lift, 0, env.aux, env.store, env.cells);
                }
                Head::Disjunction(elements)
                | Head::Choice { elements, .. } => {
                    for element in elements {
                        let mut local = ArithLift::default();
                        rewrite_arithmetics(
                            &mut element.atom,
                            &mut local,
                            1,
                            env.aux,
                            env.store,
                            env.cells,
                        );
                        push_equalities(&mut element.condition, &mut local);
                        lift_condition(&mut element.condition, env);
                    }
                }
                Head::Aggregate(aggregate) => {
                    for element in &mut aggregate.elements {
                        let mut local = ArithLift::default();
                        rewrite_arithmetics(
                            &mut element.atom,
                            &mut local,
                            1,
                            env.aux,
                            env.store,
                            env.cells,
                        );
                        push_equalities(&mut element.condition, &mut local);
                        lift_condition(&mut element.condition, env);
                    }
                }
                Head::False | Head::Theory(_) => {}
            }
            lift_body(&mut rule.body, &mut lift, env);
            push_equalities(&mut rule.body, &mut lift);
        }
        Statement::External { atom, body, .. } => {
            // External atoms provide; their templates must mirror.
            let mut lift = ArithLift::default();
            rewrite_arithmetics(atom, &mut lift, 0, env.aux, env.store, env.cells);
            lift_body(body, &mut lift, env);
            push_equalities(body, &mut lift);
        }
        Statement::Minimize { body, .. }
        | Statement::Show { body, .. }
        | Statement::Edge { body, .. }
        | Statement::Heuristic { body, .. }
        | Statement::Project { body, .. } => {
            let mut lift = ArithLift::default();
            lift_body(body, &mut lift, env);
            push_equalities(body, &mut lift);
        }
        Statement::ShowSig { .. } | Statement::ProjectSig { .. } | Statement::Define { .. } => {}
    }
}

// }}}
// {{{ assignment planning

fn bindable(term: &Term) -> bool {
    matches!(term.kind, TermKind::Var(_) | TermKind::Linear { .. })
}

/// Mark equalities with a bindable side as assignments, normalising
/// the bindable side to the left.
fn plan_assignments(body: &mut [BodyLiteral]) {
    for literal in body.iter_mut() {
        match literal {
            BodyLiteral::Comparison {
                neg: false,
                left,
                rights,
                assign,
            } if rights.len() == 1 && rights[0].0 == Relation::Eq => {
                if bindable(left) {
                    *assign = true;
                } else if bindable(&rights[0].1) {
                    std::mem::swap(left, &mut rights[0].1);
                    *assign = true;
                }
            }
            BodyLiteral::Aggregate { aggregate, .. } => {
                for element in &mut aggregate.elements {
                    plan_assignments(&mut element.condition);
                }
            }
            BodyLiteral::Conditional(conditional) => {
                plan_assignments(&mut conditional.condition);
            }
            _ => {}
        }
    }
}

// }}}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        reports::{Location, Reporter},
        structures::{
            rule::{Program, Rule},
            symbol::SymbolStore,
            term::{AuxGen, BinOp, CellArena, VarTerm},
        },
    };

    struct Fixture {
        store: SymbolStore,
        cells: CellArena,
        aux: AuxGen,
        reporter: Reporter,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                store: SymbolStore::default(),
                cells: CellArena::default(),
                aux: AuxGen::default(),
                reporter: Reporter::default(),
            }
        }

        fn loc(&mut self) -> Location {
            let file = self.store.name("t");
            Location::new(file, (1, 1), (1, 1))
        }

        fn var(&mut self, name: &str) -> VarTerm {
            VarTerm {
                name: self.store.name(name),
                level: 0,
                cell: self.cells.alloc(),
                bind: true,
            }
        }

        fn run(&mut self, statements: Vec<Statement>) -> Vec<Statement> {
            let mut program = Program::new();
            let mut env = SimplifyEnv {
                store: &mut self.store,
                cells: &mut self.cells,
                aux: &mut self.aux,
                reporter: &mut self.reporter,
            };
            rewrite(
                statements,
                Vec::new(),
                &mut program.theory_atoms,
                &program.theory_defs,
                &mut env,
            )
        }
    }

    #[test]
    fn define_substitution_reaches_rules() {
        let mut fx = Fixture::new();
        let at = fx.loc();
        // #const a = 1.  p(a).
        let one = Term::value(at, fx.store.num(1));
        let a = fx.store.name("a");
        let a_term = {
            let id = fx.store.id("a", false);
            Term::value(at, id)
        };
        let p = fx.store.name("p");
        let statements = vec![
            Statement::Define {
                name: a,
                value: one,
                default: false,
                loc: at,
            },
            Statement::Rule(Rule {
                head: Head::Atom(Term {
                    loc: at,
                    kind: TermKind::Fun {
                        name: p,
                        sign: false,
                        args: vec![a_term],
                    },
                }),
                body: Vec::new(),
                loc: at,
            }),
        ];
        let out = fx.run(statements);
        assert_eq!(out.len(), 1);
        match &out[0] {
            Statement::Rule(rule) => match &rule.head {
                Head::Atom(atom) => match &atom.kind {
                    TermKind::Fun { args, .. } => {
                        assert_eq!(args[0].as_value(), Some(fx.store.num(1)));
                    }
                    _ => panic!("function head expected"),
                },
                _ => panic!("atom head expected"),
            },
            _ => panic!("rule expected"),
        }
    }

    #[test]
    fn range_in_head_becomes_body_literal() {
        let mut fx = Fixture::new();
        let at = fx.loc();
        // p(1..3).
        let p = fx.store.name("p");
        let lo = Term::value(at, fx.store.num(1));
        let hi = Term::value(at, fx.store.num(3));
        let statements = vec![Statement::Rule(Rule {
            head: Head::Atom(Term {
                loc: at,
                kind: TermKind::Fun {
                    name: p,
                    sign: false,
                    args: vec![Term {
                        loc: at,
                        kind: TermKind::Range(Box::new(lo), Box::new(hi)),
                    }],
                },
            }),
            body: Vec::new(),
            loc: at,
        })];
        let out = fx.run(statements);
        assert_eq!(out.len(), 1);
        match &out[0] {
            Statement::Rule(rule) => {
                assert_eq!(rule.body.len(), 1);
                assert!(matches!(rule.body[0], BodyLiteral::Range { .. }));
            }
            _ => panic!("rule expected"),
        }
    }

    #[test]
    fn rewriting_is_idempotent() {
        let mut fx = Fixture::new();
        let at = fx.loc();
        // q(X) :- p(X), X = 1..3.
        let p = fx.store.name("p");
        let q = fx.store.name("q");
        let x = fx.var("X");
        let statements = vec![Statement::Rule(Rule {
            head: Head::Atom(Term {
                loc: at,
                kind: TermKind::Fun {
                    name: q,
                    sign: false,
                    args: vec![Term::var(at, x)],
                },
            }),
            body: vec![
                BodyLiteral::pred(Term {
                    loc: at,
                    kind: TermKind::Fun {
                        name: p,
                        sign: false,
                        args: vec![Term::var(at, x)],
                    },
                }),
                BodyLiteral::comparison(
                    Term::var(at, x),
                    Relation::Eq,
                    Term {
                        loc: at,
                        kind: TermKind::Range(
                            Box::new(Term::value(at, fx.store.num(1))),
                            Box::new(Term::value(at, fx.store.num(3))),
                        ),
                    },
                ),
            ],
            loc: at,
        })];
        let once = fx.run(statements);
        let again = fx.run(once.clone());
        assert_eq!(once.len(), again.len());
        let count_ranges = |statements: &[Statement]| {
            statements
                .iter()
                .map(|s| match s {
                    Statement::Rule(rule) => rule
                        .body
                        .iter()
                        .filter(|l| matches!(l, BodyLiteral::Range { .. }))
                        .count(),
                    _ => 0,
                })
                .sum::<usize>()
        };
        assert_eq!(count_ranges(&once), 1);
        assert_eq!(count_ranges(&again), 1);
    }

    #[test]
    fn non_invertible_arithmetic_lifts() {
        let mut fx = Fixture::new();
        let at = fx.loc();
        // p(X + Y) :- q(X), r(Y).  The head argument lifts.
        let p = fx.store.name("p");
        let q = fx.store.name("q");
        let r = fx.store.name("r");
        let x = fx.var("X");
        let y = fx.var("Y");
        let statements = vec![Statement::Rule(Rule {
            head: Head::Atom(Term {
                loc: at,
                kind: TermKind::Fun {
                    name: p,
                    sign: false,
                    args: vec![Term {
                        loc: at,
                        kind: TermKind::Binary(
                            BinOp::Add,
                            Box::new(Term::var(at, x)),
                            Box::new(Term::var(at, y)),
                        ),
                    }],
                },
            }),
            body: vec![
                BodyLiteral::pred(Term {
                    loc: at,
                    kind: TermKind::Fun {
                        name: q,
                        sign: false,
                        args: vec![Term::var(at, x)],
                    },
                }),
                BodyLiteral::pred(Term {
                    loc: at,
                    kind: TermKind::Fun {
                        name: r,
                        sign: false,
                        args: vec![Term::var(at, y)],
                    },
                }),
            ],
            loc: at,
        })];
        let out = fx.run(statements);
        let rule = match &out[0] {
            Statement::Rule(rule) => rule,
            _ => panic!("rule expected"),
        };
        // The head argument is now a variable, and an assignment
        // equality appeared in the body.
        match &rule.head {
            Head::Atom(atom) => match &atom.kind {
                TermKind::Fun { args, .. } => {
                    assert!(matches!(args[0].kind, TermKind::Var(_)));
                }
                _ => panic!("function head expected"),
            },
            _ => panic!("atom head expected"),
        }
        let assignment = rule.body.iter().any(|literal| {
            matches!(literal, BodyLiteral::Comparison { assign: true, .. })
        });
        assert!(assignment);
    }

    #[test]
    fn equalities_normalise_the_bindable_side() {
        let mut fx = Fixture::new();
        let at = fx.loc();
        // :- 1 = X.  X moves to the left and binds.
        let x = fx.var("X");
        let statements = vec![Statement::Rule(Rule {
            head: Head::False,
            body: vec![BodyLiteral::comparison(
                Term::value(at, fx.store.num(1)),
                Relation::Eq,
                Term::var(at, x),
            )],
            loc: at,
        })];
        let out = fx.run(statements);
        match &out[0] {
            Statement::Rule(rule) => match &rule.body[0] {
                BodyLiteral::Comparison {
                    left,
                    rights,
                    assign,
                    ..
                } => {
                    assert!(assign);
                    assert!(matches!(left.kind, TermKind::Var(_)));
                    assert_eq!(rights[0].1.as_value(), Some(fx.store.num(1)));
                }
                _ => panic!("comparison expected"),
            },
            _ => panic!("rule expected"),
        }
    }

    #[test]
    fn undefined_body_drops_the_rule() {
        let mut fx = Fixture::new();
        let at = fx.loc();
        // :- p(1/0).
        let p = fx.store.name("p");
        let statements = vec![Statement::Rule(Rule {
            head: Head::False,
            body: vec![BodyLiteral::pred(Term {
                loc: at,
                kind: TermKind::Fun {
                    name: p,
                    sign: false,
                    args: vec![Term {
                        loc: at,
                        kind: TermKind::Binary(
                            BinOp::Div,
                            Box::new(Term::value(at, fx.store.num(1))),
                            Box::new(Term::value(at, fx.store.num(0))),
                        ),
                    }],
                },
            })],
            loc: at,
        })];
        let out = fx.run(statements);
        assert!(out.is_empty());
        assert!(fx
            .reporter
            .diagnostics()
            .iter()
            .any(|d| d.kind == DiagnosticKind::OperationUndefined));
    }
}
