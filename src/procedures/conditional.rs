/*!
Materialisation of conditional literals.

A body literal `l : c₁, …, cₙ` holds when `l` holds for *every*
instance of its condition.
The instantiator enumerates the condition instances and evaluates `l`
under each; this module turns the survivors into emitter form.

Per instance `σ` the obligation is the implication `cσ → lσ`, i.e. the
disjunction of `lσ` and the negations of the instance's non-fact
condition atoms.
Instances whose implication already holds at grounding time vanish;
the rest conjoin into one auxiliary atom:

```text
#b…          :- or(σ₁), …, or(σₖ).
or(σ)        :- lσ.
or(σ)        :- not cσᵢ.        (one rule per condition atom)
```

and the conditional literal contributes the auxiliary atom to its
rule's body.
*/

use crate::{structures::symbol::Symbol, types::err::ErrorKind};

use super::{instantiate::Engine, ConditionalPlan};

/// What the conditioned literal evaluated to under one instance.
#[derive(Clone, Copy, Debug)]
pub enum LiteralState {
    /// Certainly true.
    Holds,

    /// Certainly false.
    Fails,

    /// Known to the solver as this literal.
    Lit(i32),
}

/// One enumerated condition instance.
#[derive(Clone, Debug)]
pub struct CondInstance {
    /// The non-fact condition atoms; empty means the condition is
    /// certain.
    pub cond_lits: Vec<i32>,

    /// The conditioned literal under this instance.
    pub literal: LiteralState,
}

/// Resolve a conditional literal against its instances.
///
/// `None` means the conjunction can never hold; otherwise the returned
/// literals join the rule body.
pub fn resolve(
    plan: &ConditionalPlan,
    instances: Vec<CondInstance>,
    engine: &mut Engine,
) -> Result<Option<Vec<i32>>, ErrorKind> {
    // Each surviving instance is a disjunction of ways out.
    let mut obligations: Vec<Vec<i32>> = Vec::new();
    for instance in instances {
        let mut ways: Vec<i32> = Vec::new();
        match instance.literal {
            LiteralState::Holds => continue,
            LiteralState::Fails => {}
            LiteralState::Lit(lit) => ways.push(lit),
        }
        for &cond in &instance.cond_lits {
            ways.push(-cond);
        }
        if ways.is_empty() {
            // A certain condition with a failing literal.
            return Ok(None);
        }
        obligations.push(ways);
    }
    if obligations.is_empty() {
        return Ok(Some(Vec::new()));
    }

    let mut members = Vec::with_capacity(obligations.len());
    for (index, ways) in obligations.iter().enumerate() {
        if let [single] = ways.as_slice() {
            members.push(*single);
            continue;
        }
        let key = [Symbol::Num(index as i32)];
        let or_atom = engine.aux_atom(plan.aux, "#or", &plan.element.globals, &key)?;
        for &way in ways {
            engine.emit_rule_dedup(&[or_atom], &[way]);
        }
        members.push(or_atom as i32);
    }

    if let [single] = members.as_slice() {
        return Ok(Some(vec![*single]));
    }
    let atom = engine.aux_atom(plan.aux, "#c", &plan.element.globals, &[])?;
    engine.emit_rule_dedup(&[atom], &members);
    Ok(Some(vec![atom as i32]))
}
