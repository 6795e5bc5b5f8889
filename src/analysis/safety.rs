/*!
The safety check and variable-order planner.

A bipartite graph over *variable* nodes and *entity* nodes (one entity
per literal, aggregate, or lifted equality):
- an edge entity → variable says grounding the entity binds the
  variable;
- an edge variable → entity says the entity needs the variable bound
  first.

An entity is *open* once all variables it waits on are bound; entities
with nothing to wait on are open at the start.
[order](SafetyChecker::order) repeatedly removes the best open entity
--- "best" is the caller's cost heuristic --- and propagates the
variables it binds, yielding the instantiation schedule.
Variables still unbound afterwards ([open_vars](SafetyChecker::open_vars))
make the rule unsafe.
*/

/// The index of a variable node.
pub type VarId = usize;

/// The index of an entity node.
pub type EntId = usize;

struct VarNode<V> {
    bound: bool,
    provides: Vec<EntId>,
    data: V,
}

struct EntNode<E> {
    provides: Vec<VarId>,
    depends: u32,
    data: E,
}

/// The bipartite variable/entity graph.
pub struct SafetyChecker<V, E> {
    vars: Vec<VarNode<V>>,
    ents: Vec<EntNode<E>>,
}

impl<V, E> Default for SafetyChecker<V, E> {
    fn default() -> Self {
        SafetyChecker {
            vars: Vec::new(),
            ents: Vec::new(),
        }
    }
}

impl<V, E> SafetyChecker<V, E> {
    /// Add a variable node.
    pub fn insert_var(&mut self, data: V) -> VarId {
        self.vars.push(VarNode {
            bound: false,
            provides: Vec::new(),
            data,
        });
        self.vars.len() - 1
    }

    /// Add an entity node.
    pub fn insert_ent(&mut self, data: E) -> EntId {
        self.ents.push(EntNode {
            provides: Vec::new(),
            depends: 0,
            data,
        });
        self.ents.len() - 1
    }

    /// The entity waits for the variable: `ent` opens only after `var`
    /// is bound.
    pub fn insert_edge_var_ent(&mut self, var: VarId, ent: EntId) {
        self.vars[var].provides.push(ent);
        self.ents[ent].depends += 1;
    }

    /// Grounding the entity binds the variable.
    pub fn insert_edge_ent_var(&mut self, ent: EntId, var: VarId) {
        self.ents[ent].provides.push(var);
    }

    /// A variable's payload.
    pub fn var_data(&self, var: VarId) -> &V {
        &self.vars[var].data
    }

    /// An entity's payload.
    pub fn ent_data(&self, ent: EntId) -> &E {
        &self.ents[ent].data
    }

    /// Schedule the entities: repeatedly take the best open entity and
    /// propagate the variables it binds.
    ///
    /// `better(a, b)` is true when entity `a` should be scheduled
    /// before entity `b`.
    pub fn order(&mut self, better: impl Fn(&E, &E) -> bool) -> Vec<EntId> {
        let mut open: Vec<EntId> = self
            .ents
            .iter()
            .enumerate()
            .filter(|(_, ent)| ent.depends == 0)
            .map(|(index, _)| index)
            .collect();
        let mut done = Vec::with_capacity(self.ents.len());
        while !open.is_empty() {
            let mut best = 0;
            for candidate in 1..open.len() {
                if better(
                    &self.ents[open[candidate]].data,
                    &self.ents[open[best]].data,
                ) {
                    best = candidate;
                }
            }
            let ent = open.swap_remove(best);
            self.propagate(ent, &mut open);
            done.push(ent);
        }
        done
    }

    fn propagate(&mut self, ent: EntId, open: &mut Vec<EntId>) {
        let provides = std::mem::take(&mut self.ents[ent].provides);
        for &var in &provides {
            if !self.vars[var].bound {
                self.vars[var].bound = true;
                let waiting = std::mem::take(&mut self.vars[var].provides);
                for &dependent in &waiting {
                    self.ents[dependent].depends -= 1;
                    if self.ents[dependent].depends == 0 {
                        open.push(dependent);
                    }
                }
                self.vars[var].provides = waiting;
            }
        }
        self.ents[ent].provides = provides;
    }

    /// The variables no scheduled entity bound: the unsafe ones.
    pub fn open_vars(&self) -> Vec<VarId> {
        self.vars
            .iter()
            .enumerate()
            .filter(|(_, var)| !var.bound)
            .map(|(index, _)| index)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_before_use() {
        // :- p(X), X < Y, q(Y).
        // The comparison needs both variables; the predicates bind them.
        let mut checker: SafetyChecker<&str, &str> = SafetyChecker::default();
        let x = checker.insert_var("X");
        let y = checker.insert_var("Y");
        let p = checker.insert_ent("p");
        let q = checker.insert_ent("q");
        let cmp = checker.insert_ent("cmp");
        checker.insert_edge_ent_var(p, x);
        checker.insert_edge_ent_var(q, y);
        checker.insert_edge_var_ent(x, cmp);
        checker.insert_edge_var_ent(y, cmp);

        let order = checker.order(|_, _| false);
        assert_eq!(order.len(), 3);
        let cmp_at = order.iter().position(|&e| e == cmp).unwrap();
        assert_eq!(cmp_at, 2, "the comparison runs after both binders");
        assert!(checker.open_vars().is_empty());
    }

    #[test]
    fn unsafe_variable_stays_open() {
        // p(X) :- q(Y).  X is bound by nothing.
        let mut checker: SafetyChecker<&str, &str> = SafetyChecker::default();
        let x = checker.insert_var("X");
        let y = checker.insert_var("Y");
        let q = checker.insert_ent("q");
        checker.insert_edge_ent_var(q, y);

        let order = checker.order(|_, _| false);
        assert_eq!(order, vec![q]);
        assert_eq!(checker.open_vars(), vec![x]);
    }

    #[test]
    fn chained_assignments_schedule() {
        // :- q(Z), Y = Z + 1, X = Y + 1, p(X).
        // Each assignment opens once its right side is bound.
        let mut checker: SafetyChecker<&str, u32> = SafetyChecker::default();
        let x = checker.insert_var("X");
        let y = checker.insert_var("Y");
        let z = checker.insert_var("Z");
        let q = checker.insert_ent(0);
        let y_of_z = checker.insert_ent(1);
        let x_of_y = checker.insert_ent(2);
        let p = checker.insert_ent(3);

        checker.insert_edge_ent_var(q, z);
        checker.insert_edge_var_ent(z, y_of_z);
        checker.insert_edge_ent_var(y_of_z, y);
        checker.insert_edge_var_ent(y, x_of_y);
        checker.insert_edge_ent_var(x_of_y, x);
        checker.insert_edge_var_ent(x, p);

        let order = checker.order(|_, _| false);
        assert_eq!(order, vec![q, y_of_z, x_of_y, p]);
        assert!(checker.open_vars().is_empty());
    }

    #[test]
    fn cost_breaks_ties() {
        // Two open entities; the cheaper one goes first.
        let mut checker: SafetyChecker<(), u32> = SafetyChecker::default();
        let expensive = checker.insert_ent(10);
        let cheap = checker.insert_ent(1);
        let order = checker.order(|a, b| a < b);
        assert_eq!(order, vec![cheap, expensive]);
    }
}
