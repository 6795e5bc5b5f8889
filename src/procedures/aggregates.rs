/*!
Aggregate accumulation and emission.

The instantiator hands this module the *contributions* of a body or
head aggregate: one entry per ground element instance, carrying the
evaluated term tuple and the emitter literals of the instance's
non-fact condition atoms.
Contributions with no literals are certain --- they fold into a fixed
value at grounding time.
The rest are conditional: whether they count is the solver's business,
so the guard checks compile into auxiliary atoms.

For `#count` and `#sum`, a *reaches-bound* atom per needed bound `b`
is defined by one weighted rule

```text
#d… :- (b - fixed) ≤ Σ { w·lit }
```

over the conditional tuples, and every guard relation is expressed
through such atoms: `agg ≥ t` is the atom for `t`, `agg ≤ t` the
negation of the atom for `t + 1`, equality the conjunction, and
disequality a small disjunction.

For `#min` and `#max`, the bound atoms are *below-threshold* (or
above-threshold) disjunctions: one plain rule per conditional tuple
whose weight passes the threshold.

The neutral elements come out of the folds: an empty `#sum` or
`#count` is `0`, an empty `#min` is `#sup`, an empty `#max` is `#inf`.
*/

use std::cmp::Ordering;

use crate::{
    misc::log::targets,
    output::WeightedLiteral,
    reports::DiagnosticKind,
    structures::{
        literal::{AggrFun, AggrGuard, NafSign, Relation},
        symbol::Symbol,
    },
    types::err::ErrorKind,
};

use super::{instantiate::Engine, AggregatePlan};

/// One ground element instance of an aggregate.
#[derive(Clone, Debug)]
pub struct Contribution {
    /// The evaluated term tuple.
    pub tuple: Vec<Symbol>,

    /// The emitter literals of the instance's non-fact condition
    /// atoms; empty means the instance is certain.
    pub lits: Vec<i32>,
}

/// The outcome of resolving an aggregate literal.
#[derive(Debug)]
pub enum AggOutcome {
    /// The aggregate cannot hold; the rule instance dies.
    Fail,

    /// The aggregate holds, contributing the given body literals.
    Pass(Vec<i32>),

    /// An assignment aggregate bound its variable to the value.
    Bind(Symbol, Vec<i32>),
}

/// A tuple after deduplication: its weight and its holds-literal.
struct Tuple {
    weight_sym: Symbol,
    /// `None` for a certain tuple.
    lit: Option<i32>,
}

/// Deduplicate contributions by tuple and give each conditional tuple
/// one literal.
fn dedup_tuples(
    plan: &AggregatePlan,
    contributions: Vec<Contribution>,
    engine: &mut Engine,
) -> Result<Vec<Tuple>, ErrorKind> {
    let mut order: Vec<Vec<Symbol>> = Vec::new();
    let mut instances: Vec<(bool, Vec<Vec<i32>>)> = Vec::new();
    for contribution in contributions {
        let at = match order.iter().position(|t| *t == contribution.tuple) {
            Some(at) => at,
            None => {
                order.push(contribution.tuple.clone());
                instances.push((false, Vec::new()));
                order.len() - 1
            }
        };
        if contribution.lits.is_empty() {
            instances[at].0 = true;
        } else {
            instances[at].1.push(contribution.lits);
        }
    }

    let mut tuples = Vec::with_capacity(order.len());
    for (tuple, (certain, conditional)) in order.into_iter().zip(instances) {
        let weight_sym = tuple.first().copied().unwrap_or(Symbol::Num(0));
        if certain {
            tuples.push(Tuple {
                weight_sym,
                lit: None,
            });
            continue;
        }
        let lit = match conditional.as_slice() {
            [] => continue,
            [single] if single.len() == 1 => single[0],
            _ => {
                // One atom standing for "some instance of this tuple
                // holds".
                let uid = engine.aux_atom(plan.aux, "#t", &plan.globals, &tuple)?;
                for lits in &conditional {
                    engine.emit_rule_dedup(&[uid], lits);
                }
                uid as i32
            }
        };
        tuples.push(Tuple {
            weight_sym,
            lit: Some(lit),
        });
    }
    Ok(tuples)
}

fn numeric_weight(
    fun: AggrFun,
    tuple: &Tuple,
    engine: &mut Engine,
    loc: crate::reports::Location,
) -> Option<i64> {
    match fun {
        AggrFun::Count => Some(1),
        AggrFun::Sum | AggrFun::SumPlus => match tuple.weight_sym {
            Symbol::Num(w) => {
                let w = w as i64;
                Some(if fun == AggrFun::SumPlus { w.max(0) } else { w })
            }
            _ => {
                engine.reporter.warn(
                    DiagnosticKind::OperationUndefined,
                    loc,
                    "aggregate weight is not a number",
                );
                None
            }
        },
        AggrFun::Min | AggrFun::Max => None,
    }
}

/// Resolve a planned body aggregate against its contributions.
pub fn resolve(
    plan: &AggregatePlan,
    contributions: Vec<Contribution>,
    loc: crate::reports::Location,
    engine: &mut Engine,
) -> Result<AggOutcome, ErrorKind> {
    let tuples = dedup_tuples(plan, contributions, engine)?;
    let outcome = match plan.fun {
        AggrFun::Count | AggrFun::Sum | AggrFun::SumPlus => {
            resolve_numeric(plan, &tuples, loc, engine)?
        }
        AggrFun::Min | AggrFun::Max => resolve_extremum(plan, &tuples, loc, engine)?,
    };
    Ok(wrap_naf(plan.sign, outcome, engine)?)
}

// {{{ count and sum

fn resolve_numeric(
    plan: &AggregatePlan,
    tuples: &[Tuple],
    loc: crate::reports::Location,
    engine: &mut Engine,
) -> Result<AggOutcome, ErrorKind> {
    let mut fixed: i64 = 0;
    let mut conditional: Vec<(i32, i64)> = Vec::new();
    for tuple in tuples {
        let weight = match numeric_weight(plan.fun, tuple, engine, loc) {
            Some(weight) => weight,
            None => continue,
        };
        match tuple.lit {
            None => fixed += weight,
            Some(lit) => conditional.push((lit, weight)),
        }
    }

    if plan.assign {
        if !conditional.is_empty() {
            engine.reporter.warn(
                DiagnosticKind::OperationUndefined,
                loc,
                "assignment aggregate over undecided atoms",
            );
            return Ok(AggOutcome::Fail);
        }
        let clamped = fixed.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        return Ok(AggOutcome::Bind(Symbol::Num(clamped), Vec::new()));
    }

    let mut lits = Vec::new();
    for (guard, left_side) in [(&plan.left, true), (&plan.right, false)] {
        let guard = match guard {
            Some(guard) => guard,
            None => continue,
        };
        let (rel, bound) = match normalise_guard(guard, left_side, engine) {
            Some(normalised) => normalised,
            None => {
                engine.reporter.warn(
                    DiagnosticKind::OperationUndefined,
                    loc,
                    "aggregate guard is not a number",
                );
                return Ok(AggOutcome::Fail);
            }
        };
        match numeric_guard(plan, rel, bound, fixed, &conditional, engine)? {
            GuardLits::False => return Ok(AggOutcome::Fail),
            GuardLits::True => {}
            GuardLits::Lits(mut guard_lits) => lits.append(&mut guard_lits),
        }
    }
    Ok(AggOutcome::Pass(lits))
}

/// Rewrite a guard so the aggregate sits on the left of the relation.
fn normalise_guard(
    guard: &AggrGuard,
    left_side: bool,
    engine: &mut Engine,
) -> Option<(Relation, i64)> {
    let symbol = guard
        .term
        .eval(engine.cells, engine.store)
        .ok()?;
    let bound = match symbol {
        Symbol::Num(bound) => bound as i64,
        _ => return None,
    };
    // A left guard reads `t REL agg`; mirrored it reads `agg REL' t`.
    let rel = if left_side {
        guard.relation.mirror()
    } else {
        guard.relation
    };
    Some((rel, bound))
}

enum GuardLits {
    True,
    False,
    Lits(Vec<i32>),
}

/// The literals enforcing `agg REL bound` over the fixed part and the
/// conditional tuples.
fn numeric_guard(
    plan: &AggregatePlan,
    rel: Relation,
    bound: i64,
    fixed: i64,
    conditional: &[(i32, i64)],
    engine: &mut Engine,
) -> Result<GuardLits, ErrorKind> {
    if conditional.is_empty() {
        let holds = rel.holds(fixed.cmp(&bound));
        return Ok(if holds { GuardLits::True } else { GuardLits::False });
    }
    let ge = |engine: &mut Engine, b: i64| reaches_bound(plan, b, fixed, conditional, engine);
    match rel {
        Relation::Ge => Ok(lit_of(ge(engine, bound)?, true)),
        Relation::Gt => Ok(lit_of(ge(engine, bound + 1)?, true)),
        Relation::Le => Ok(lit_of(ge(engine, bound + 1)?, false)),
        Relation::Lt => Ok(lit_of(ge(engine, bound)?, false)),
        Relation::Eq => {
            let lower = lit_of(ge(engine, bound)?, true);
            let upper = lit_of(ge(engine, bound + 1)?, false);
            Ok(conjoin(lower, upper))
        }
        Relation::Ne => {
            // agg < bound or agg > bound, as a two-rule disjunction.
            let below = lit_of(ge(engine, bound)?, false);
            let above = lit_of(ge(engine, bound + 1)?, true);
            disjoin(plan, below, above, bound, engine)
        }
    }
}

/// Whether the chosen conditional tuples can reach a bound.
enum Reach {
    /// Every choice reaches it.
    Always,

    /// No choice reaches it.
    Never,

    /// The atom defined to hold exactly when the bound is reached.
    Atom(u32),
}

/// The reaches-bound atom for `b`, or a constant when the bound is
/// trivially met or out of reach.
fn reaches_bound(
    plan: &AggregatePlan,
    bound: i64,
    fixed: i64,
    conditional: &[(i32, i64)],
    engine: &mut Engine,
) -> Result<Reach, ErrorKind> {
    let lower = bound - fixed;
    let negatives: i64 = conditional.iter().map(|&(_, w)| w.min(0)).sum();
    let positives: i64 = conditional.iter().map(|&(_, w)| w.max(0)).sum();
    if lower <= negatives {
        return Ok(Reach::Always);
    }
    if lower > positives {
        return Ok(Reach::Never);
    }
    let clamped = lower.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
    let key = [Symbol::Num(clamped)];
    let uid = engine.aux_atom(plan.aux, "#ge", &plan.globals, &key)?;
    let body: Vec<WeightedLiteral> = conditional
        .iter()
        .map(|&(literal, weight)| WeightedLiteral {
            literal,
            weight: weight.clamp(i32::MIN as i64, i32::MAX as i64) as i32,
        })
        .collect();
    engine.emit_weighted_dedup(uid, clamped, &body);
    log::trace!(target: targets::AGGREGATE, "reaches-bound atom for {bound}");
    Ok(Reach::Atom(uid))
}

fn lit_of(reach: Reach, positive: bool) -> GuardLits {
    match reach {
        Reach::Always => {
            if positive {
                GuardLits::True
            } else {
                GuardLits::False
            }
        }
        Reach::Never => {
            if positive {
                GuardLits::False
            } else {
                GuardLits::True
            }
        }
        Reach::Atom(uid) => {
            let lit = uid as i32;
            GuardLits::Lits(vec![if positive { lit } else { -lit }])
        }
    }
}

fn conjoin(a: GuardLits, b: GuardLits) -> GuardLits {
    match (a, b) {
        (GuardLits::False, _) | (_, GuardLits::False) => GuardLits::False,
        (GuardLits::True, other) | (other, GuardLits::True) => other,
        (GuardLits::Lits(mut a), GuardLits::Lits(b)) => {
            a.extend(b);
            GuardLits::Lits(a)
        }
    }
}

fn disjoin(
    plan: &AggregatePlan,
    a: GuardLits,
    b: GuardLits,
    bound: i64,
    engine: &mut Engine,
) -> Result<GuardLits, ErrorKind> {
    match (a, b) {
        (GuardLits::True, _) | (_, GuardLits::True) => Ok(GuardLits::True),
        (GuardLits::False, other) | (other, GuardLits::False) => Ok(other),
        (GuardLits::Lits(a), GuardLits::Lits(b)) => {
            let key = [Symbol::Num(bound.clamp(i32::MIN as i64, i32::MAX as i64) as i32)];
            let uid = engine.aux_atom(plan.aux, "#ne", &plan.globals, &key)?;
            engine.emit_rule_dedup(&[uid], &a);
            engine.emit_rule_dedup(&[uid], &b);
            Ok(GuardLits::Lits(vec![uid as i32]))
        }
    }
}

// }}}
// {{{ min and max

fn resolve_extremum(
    plan: &AggregatePlan,
    tuples: &[Tuple],
    loc: crate::reports::Location,
    engine: &mut Engine,
) -> Result<AggOutcome, ErrorKind> {
    // The neutral element of #min is #sup, of #max #inf.
    let mut fixed = match plan.fun {
        AggrFun::Min => Symbol::Supremum,
        _ => Symbol::Infimum,
    };
    let mut conditional: Vec<(i32, Symbol)> = Vec::new();
    for tuple in tuples {
        match tuple.lit {
            None => {
                let replace = match plan.fun {
                    AggrFun::Min => {
                        engine.store.cmp_symbols(tuple.weight_sym, fixed) == Ordering::Less
                    }
                    _ => engine.store.cmp_symbols(tuple.weight_sym, fixed) == Ordering::Greater,
                };
                if replace {
                    fixed = tuple.weight_sym;
                }
            }
            Some(lit) => conditional.push((lit, tuple.weight_sym)),
        }
    }

    if plan.assign {
        if !conditional.is_empty() {
            engine.reporter.warn(
                DiagnosticKind::OperationUndefined,
                loc,
                "assignment aggregate over undecided atoms",
            );
            return Ok(AggOutcome::Fail);
        }
        return Ok(AggOutcome::Bind(fixed, Vec::new()));
    }

    let mut lits = Vec::new();
    for (guard, left_side) in [(&plan.left, true), (&plan.right, false)] {
        let guard = match guard {
            Some(guard) => guard,
            None => continue,
        };
        let bound = match guard.term.eval(engine.cells, engine.store) {
            Ok(symbol) => symbol,
            Err(_) => {
                engine.reporter.warn(
                    DiagnosticKind::OperationUndefined,
                    loc,
                    "aggregate guard does not evaluate",
                );
                return Ok(AggOutcome::Fail);
            }
        };
        let rel = if left_side {
            guard.relation.mirror()
        } else {
            guard.relation
        };
        match extremum_guard(plan, rel, bound, fixed, &conditional, engine)? {
            GuardLits::False => return Ok(AggOutcome::Fail),
            GuardLits::True => {}
            GuardLits::Lits(mut guard_lits) => lits.append(&mut guard_lits),
        }
    }
    Ok(AggOutcome::Pass(lits))
}

/// The literals enforcing `extremum REL bound`.
fn extremum_guard(
    plan: &AggregatePlan,
    rel: Relation,
    bound: Symbol,
    fixed: Symbol,
    conditional: &[(i32, Symbol)],
    engine: &mut Engine,
) -> Result<GuardLits, ErrorKind> {
    // For #min, a chosen tuple can only pull the value down; for #max,
    // only up.
    // `passes(rel)` is the disjunction of tuples that alone make
    // `extremum rel bound` hold.
    let passes = |engine: &mut Engine, rel: Relation| -> Result<GuardLits, ErrorKind> {
        let fixed_holds = rel.holds(engine.store.cmp_symbols(fixed, bound));
        if fixed_holds {
            return Ok(GuardLits::True);
        }
        let qualifying: Vec<i32> = conditional
            .iter()
            .filter(|(_, weight)| rel.holds(engine.store.cmp_symbols(*weight, bound)))
            .map(|&(lit, _)| lit)
            .collect();
        match qualifying.as_slice() {
            [] => Ok(GuardLits::False),
            [single] => Ok(GuardLits::Lits(vec![*single])),
            _ => {
                let key = [bound];
                let marker = match rel {
                    Relation::Lt => "#lt",
                    Relation::Le => "#le",
                    Relation::Gt => "#gt",
                    Relation::Ge => "#geq",
                    Relation::Eq => "#eq",
                    Relation::Ne => "#neq",
                };
                let uid = engine.aux_atom(plan.aux, marker, &plan.globals, &key)?;
                for lit in &qualifying {
                    engine.emit_rule_dedup(&[uid], &[*lit]);
                }
                Ok(GuardLits::Lits(vec![uid as i32]))
            }
        }
    };
    let negate = |lits: GuardLits| match lits {
        GuardLits::True => GuardLits::False,
        GuardLits::False => GuardLits::True,
        GuardLits::Lits(lits) => {
            debug_assert_eq!(lits.len(), 1);
            GuardLits::Lits(vec![-lits[0]])
        }
    };

    // Express the guard through the monotone direction of the
    // aggregate: downward relations for #min, upward for #max.
    let toward = |rel: Relation| match plan.fun {
        AggrFun::Min => rel,
        _ => rel.mirror(),
    };
    match toward(rel) {
        // min ≤ b: the fixed part reaches it or some chosen tuple does.
        Relation::Le => passes(engine, toward(Relation::Le)),
        Relation::Lt => passes(engine, toward(Relation::Lt)),
        // min ≥ b: nothing is allowed below b.
        Relation::Ge => Ok(negate(passes(engine, toward(Relation::Lt))?)),
        Relation::Gt => Ok(negate(passes(engine, toward(Relation::Le))?)),
        Relation::Eq => {
            let reaches = passes(engine, toward(Relation::Le))?;
            let not_below = negate(passes(engine, toward(Relation::Lt))?);
            Ok(conjoin(reaches, not_below))
        }
        Relation::Ne => {
            let below = passes(engine, toward(Relation::Lt))?;
            let above = negate(passes(engine, toward(Relation::Le))?);
            let bound_key = match bound {
                Symbol::Num(n) => n as i64,
                _ => 0,
            };
            disjoin(plan, below, above, bound_key, engine)
        }
    }
}

// }}}

/// Apply the literal's default negation to the resolved outcome.
fn wrap_naf(
    sign: NafSign,
    outcome: AggOutcome,
    engine: &mut Engine,
) -> Result<AggOutcome, ErrorKind> {
    match sign {
        NafSign::Pos => Ok(outcome),
        NafSign::Not => match outcome {
            AggOutcome::Fail => Ok(AggOutcome::Pass(Vec::new())),
            AggOutcome::Pass(lits) if lits.is_empty() => Ok(AggOutcome::Fail),
            AggOutcome::Pass(lits) => {
                let uid = engine.conj_atom(&lits)?;
                Ok(AggOutcome::Pass(vec![-(uid as i32)]))
            }
            AggOutcome::Bind(..) => Ok(AggOutcome::Fail),
        },
        NafSign::NotNot => match outcome {
            AggOutcome::Fail => Ok(AggOutcome::Fail),
            AggOutcome::Pass(lits) if lits.is_empty() => Ok(AggOutcome::Pass(Vec::new())),
            AggOutcome::Pass(lits) => {
                let inner = engine.conj_atom(&lits)?;
                let outer = engine.conj_atom(&[-(inner as i32)])?;
                Ok(AggOutcome::Pass(vec![-(outer as i32)]))
            }
            AggOutcome::Bind(..) => Ok(AggOutcome::Fail),
        },
    }
}
