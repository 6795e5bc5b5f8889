/*!
Bounds propagation over linear integer inequalities.

Constraints have the form `Σ cᵢ·xᵢ ≥ b`.
Adding a constraint normalises it: terms without a variable fold into
the bound, terms are sorted by variable, and terms over one variable
merge.
[compute](IeSolver::compute) then propagates: for each constraint, the
slack is taken with every variable at the bound relevant to its
coefficient's sign; when at most one variable is unbounded in the
tightening direction, a new bound on it follows.
This repeats to a fixed point.

If a constraint's slack is positive with every variable bounded, the
system is infeasible: every involved variable receives the empty
interval `[1, 0]`, so the enclosing literal grounds to nothing.

Slack is accumulated in `i128`, so no sum of 64 bit products can wrap,
and derived bounds clamp saturating at the 32 bit limits.
A nested scope seeds from its parent's bounds and publishes only
bounds that improve on what the parent knew.
*/

use rustc_hash::FxHashMap;

use crate::structures::term::CellKey;

/// One `c·x` term of a constraint.
#[derive(Clone, Copy, Debug)]
pub struct IeTerm {
    /// The coefficient.
    pub coefficient: i64,

    /// The variable, by cell; `None` marks a constant contribution.
    pub variable: Option<CellKey>,
}

/// A constraint `Σ terms ≥ bound`.
#[derive(Clone, Debug)]
pub struct Ie {
    /// The left-hand terms.
    pub terms: Vec<IeTerm>,

    /// The right-hand bound.
    pub bound: i64,
}

/// Which side of an interval a bound is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundType {
    /// The lower side.
    Lower,

    /// The upper side.
    Upper,
}

/// A variable's `[lower, upper]` interval; either side may be unset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IeBound {
    lower: Option<i32>,
    upper: Option<i32>,
}

impl IeBound {
    /// True if the given side is set.
    pub fn is_set(&self, which: BoundType) -> bool {
        self.get(which).is_some()
    }

    /// The given side, if set.
    pub fn get(&self, which: BoundType) -> Option<i32> {
        match which {
            BoundType::Lower => self.lower,
            BoundType::Upper => self.upper,
        }
    }

    /// Set the given side outright.
    pub fn set(&mut self, which: BoundType, bound: i32) {
        match which {
            BoundType::Lower => self.lower = Some(bound),
            BoundType::Upper => self.upper = Some(bound),
        }
    }

    /// Tighten the given side; true if the interval changed.
    pub fn refine(&mut self, which: BoundType, bound: i32) -> bool {
        match (which, self.get(which)) {
            (_, None) => {
                self.set(which, bound);
                true
            }
            (BoundType::Lower, Some(current)) if bound > current => {
                self.lower = Some(bound);
                true
            }
            (BoundType::Upper, Some(current)) if bound < current => {
                self.upper = Some(bound);
                true
            }
            _ => false,
        }
    }

    /// Tighten both sides from another interval; true on any change.
    pub fn refine_from(&mut self, other: &IeBound) -> bool {
        let mut changed = false;
        if let Some(lower) = other.lower {
            changed |= self.refine(BoundType::Lower, lower);
        }
        if let Some(upper) = other.upper {
            changed |= self.refine(BoundType::Upper, upper);
        }
        changed
    }

    /// True if both sides are set.
    pub fn is_bounded(&self) -> bool {
        self.lower.is_some() && self.upper.is_some()
    }

    /// True if the interval is empty.
    pub fn is_empty(&self) -> bool {
        matches!((self.lower, self.upper), (Some(l), Some(u)) if l > u)
    }

    /// True if this interval is strictly inside `other`.
    pub fn is_improving(&self, other: &IeBound) -> bool {
        if !self.is_bounded() || !other.is_bounded() {
            return false;
        }
        other.lower < self.lower || self.upper < other.upper
    }
}

/// Bounds per variable.
pub type IeBoundMap = FxHashMap<CellKey, IeBound>;

fn clamp(a: i128) -> i32 {
    if a > i32::MAX as i128 {
        i32::MAX
    } else if a < i32::MIN as i128 {
        i32::MIN
    } else {
        a as i32
    }
}

fn floordiv(n: i128, m: i128) -> i128 {
    let mut a = n / m;
    if (n < 0) != (m < 0) && n % m != 0 {
        a -= 1;
    }
    a
}

fn ceildiv(n: i128, m: i128) -> i128 {
    let mut a = n / m;
    if (n < 0) != (m < 0) && n % m != 0 {
        a += 1;
    }
    a
}

fn clamp_div(positive: bool, a: i128, b: i64) -> i32 {
    if positive {
        clamp(floordiv(a, b as i128))
    } else {
        clamp(ceildiv(a, b as i128))
    }
}

/// The solver: a set of constraints and the bounds derived from them.
#[derive(Default)]
pub struct IeSolver {
    ies: Vec<Ie>,
    fixed: IeBoundMap,
    bounds: IeBoundMap,
}

impl IeSolver {
    /// Add a constraint, normalising it first.
    ///
    /// With `ignore_if_fixed`, a constraint that pins a single
    /// variable with a unit coefficient is remembered as *fixed*: such
    /// bounds are already manifest in the rule and are not worth
    /// publishing again.
    pub fn add(&mut self, mut ie: Ie, ignore_if_fixed: bool) {
        // Fold constant terms into the bound.
        ie.terms.retain(|term| {
            if term.variable.is_none() || term.coefficient == 0 {
                if term.variable.is_none() {
                    ie.bound -= term.coefficient;
                }
                false
            } else {
                true
            }
        });

        ie.terms.sort_by_key(|term| term.variable);

        // Merge runs over one variable.
        let mut merged: Vec<IeTerm> = Vec::with_capacity(ie.terms.len());
        for term in ie.terms.drain(..) {
            match merged.last_mut() {
                Some(last) if last.variable == term.variable => {
                    last.coefficient += term.coefficient;
                }
                _ => merged.push(term),
            }
        }
        merged.retain(|term| term.coefficient != 0);
        ie.terms = merged;

        if ignore_if_fixed && ie.terms.len() == 1 {
            let term = ie.terms[0];
            let variable = term.variable.expect("constants were folded away");
            if term.coefficient == 1 {
                self.fixed
                    .entry(variable)
                    .or_default()
                    .refine(BoundType::Lower, clamp(ie.bound as i128));
            } else if term.coefficient == -1 {
                self.fixed
                    .entry(variable)
                    .or_default()
                    .refine(BoundType::Upper, clamp(-(ie.bound as i128)));
            }
        }

        self.ies.push(ie);
    }

    /// Propagate to a fixed point, seeded by `parent` bounds, and
    /// return the bounds worth publishing: bounded intervals that
    /// improve on the seed and on the manifest fixed bounds.
    pub fn compute(&mut self, parent: Option<&IeBoundMap>) -> IeBoundMap {
        self.bounds.clear();
        if let Some(parent) = parent {
            for (variable, bound) in parent {
                self.fixed.entry(*variable).or_default().refine_from(bound);
                self.bounds.entry(*variable).or_default().refine_from(bound);
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for index in 0..self.ies.len() {
                let ie = &self.ies[index];
                let mut slack: i128 = ie.bound as i128;
                let mut unbounded: u32 = 0;
                for term in &ie.terms {
                    update_slack(&mut self.bounds, term, &mut slack, &mut unbounded);
                }
                if unbounded == 0 && slack > 0 {
                    // Infeasible: empty every involved interval.
                    for ie in &self.ies {
                        for term in &ie.terms {
                            let variable = term.variable.expect("constants were folded away");
                            let entry = self.bounds.entry(variable).or_default();
                            entry.set(BoundType::Lower, 1);
                            entry.set(BoundType::Upper, 0);
                        }
                    }
                    changed = false;
                    break;
                }
                if unbounded <= 1 {
                    let terms = self.ies[index].terms.clone();
                    for term in &terms {
                        if update_bound(&mut self.bounds, term, slack, unbounded) {
                            changed = true;
                        }
                    }
                }
            }
        }

        let mut published = IeBoundMap::default();
        for (variable, bound) in &self.bounds {
            let improving = match self.fixed.get(variable) {
                Some(fixed) => bound.is_improving(fixed),
                None => bound.is_bounded(),
            };
            if improving {
                published.insert(*variable, *bound);
            }
        }
        published
    }
}

/// Subtract `c·bound(x)` from the slack, counting unbounded variables.
fn update_slack(bounds: &mut IeBoundMap, term: &IeTerm, slack: &mut i128, unbounded: &mut u32) {
    let variable = term.variable.expect("constants were folded away");
    let which = if term.coefficient > 0 {
        BoundType::Upper
    } else {
        BoundType::Lower
    };
    match bounds.entry(variable).or_default().get(which) {
        Some(bound) => *slack -= term.coefficient as i128 * bound as i128,
        None => *unbounded += 1,
    }
}

/// Derive a bound on `term`'s variable from the slack; true on change.
fn update_bound(bounds: &mut IeBoundMap, term: &IeTerm, mut slack: i128, unbounded: u32) -> bool {
    let variable = term.variable.expect("constants were folded away");
    let positive = term.coefficient > 0;
    let which = if positive {
        BoundType::Upper
    } else {
        BoundType::Lower
    };
    let entry = bounds.entry(variable).or_default();
    if unbounded == 0 {
        match entry.get(which) {
            Some(bound) => slack += term.coefficient as i128 * bound as i128,
            None => return false,
        }
    } else if unbounded > 1 || entry.is_set(which) {
        return false;
    }
    let value = clamp_div(positive, slack, term.coefficient);
    let target = if positive {
        BoundType::Lower
    } else {
        BoundType::Upper
    };
    entry.refine(target, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::term::CellArena;

    fn term(coefficient: i64, variable: CellKey) -> IeTerm {
        IeTerm {
            coefficient,
            variable: Some(variable),
        }
    }

    #[test]
    fn base_propagation() {
        let mut cells = CellArena::default();
        let x = cells.alloc();
        let y = cells.alloc();
        let mut solver = IeSolver::default();
        // x >= 2, y - x >= 1, -x - y >= -100.
        solver.add(
            Ie {
                terms: vec![term(1, x)],
                bound: 2,
            },
            false,
        );
        solver.add(
            Ie {
                terms: vec![term(1, y), term(-1, x)],
                bound: 1,
            },
            false,
        );
        solver.add(
            Ie {
                terms: vec![term(-1, x), term(-1, y)],
                bound: -100,
            },
            false,
        );
        let bounds = solver.compute(None);
        let bx = bounds.get(&x).expect("x is bounded");
        let by = bounds.get(&y).expect("y is bounded");
        assert_eq!(bx.get(BoundType::Lower), Some(2));
        assert_eq!(bx.get(BoundType::Upper), Some(97));
        assert_eq!(by.get(BoundType::Lower), Some(3));
        assert_eq!(by.get(BoundType::Upper), Some(98));
    }

    #[test]
    fn normalisation_merges_terms() {
        let mut cells = CellArena::default();
        let x = cells.alloc();
        let mut solver = IeSolver::default();
        // x + x - 3 >= 1 normalises to 2x >= 4.
        solver.add(
            Ie {
                terms: vec![
                    term(1, x),
                    term(1, x),
                    IeTerm {
                        coefficient: -3,
                        variable: None,
                    },
                ],
                bound: 1,
            },
            false,
        );
        // -x >= -10.
        solver.add(
            Ie {
                terms: vec![term(-1, x)],
                bound: -10,
            },
            false,
        );
        let bounds = solver.compute(None);
        let bx = bounds.get(&x).expect("x is bounded");
        assert_eq!(bx.get(BoundType::Lower), Some(2));
        assert_eq!(bx.get(BoundType::Upper), Some(10));
    }

    #[test]
    fn infeasible_empties_intervals() {
        let mut cells = CellArena::default();
        let x = cells.alloc();
        let mut solver = IeSolver::default();
        // x >= 5 and -x >= -3 cannot hold together.
        solver.add(
            Ie {
                terms: vec![term(1, x)],
                bound: 5,
            },
            false,
        );
        solver.add(
            Ie {
                terms: vec![term(-1, x)],
                bound: -3,
            },
            false,
        );
        let bounds = solver.compute(None);
        let bx = bounds.get(&x).expect("x received a bound");
        assert!(bx.is_empty());
    }

    #[test]
    fn parent_bounds_seed_the_child() {
        let mut cells = CellArena::default();
        let x = cells.alloc();
        let mut parent = IeBoundMap::default();
        let mut seed = IeBound::default();
        seed.set(BoundType::Lower, 0);
        seed.set(BoundType::Upper, 50);
        parent.insert(x, seed);

        let mut solver = IeSolver::default();
        // x >= 10 improves the parent's lower bound.
        solver.add(
            Ie {
                terms: vec![term(1, x)],
                bound: 10,
            },
            false,
        );
        let bounds = solver.compute(Some(&parent));
        let bx = bounds.get(&x).expect("x improved");
        assert_eq!(bx.get(BoundType::Lower), Some(10));
        assert_eq!(bx.get(BoundType::Upper), Some(50));

        // Without improvement nothing is published.
        let mut solver = IeSolver::default();
        solver.add(
            Ie {
                terms: vec![term(1, x)],
                bound: -5,
            },
            false,
        );
        let bounds = solver.compute(Some(&parent));
        assert!(bounds.get(&x).is_none());
    }

    #[test]
    fn fixed_bounds_are_not_republished() {
        let mut cells = CellArena::default();
        let x = cells.alloc();
        let mut solver = IeSolver::default();
        // x >= 2 is manifest in the rule; x <= 8 is derived knowledge.
        solver.add(
            Ie {
                terms: vec![term(1, x)],
                bound: 2,
            },
            true,
        );
        solver.add(
            Ie {
                terms: vec![term(-1, x)],
                bound: -8,
            },
            true,
        );
        let bounds = solver.compute(None);
        // Both bounds coincide with the fixed ones: no improvement.
        assert!(bounds.get(&x).is_none());
    }
}
