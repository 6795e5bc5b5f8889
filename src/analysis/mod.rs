/*!
Static analyses over rewritten programs.

- [dependency] --- the predicate-level dependency graph, its two-pass
  strongly connected component decomposition, and the classification
  of body occurrences by stratification.
- [safety] --- the bipartite variable/literal dataflow check that
  rejects unsafe rules and fixes the instantiation order.
- [inequalities] --- bounds propagation over linear integer
  inequalities, narrowing the domains range literals enumerate.
- [intervals] --- the interval sets the narrowing works with.
*/

pub mod dependency;
pub mod inequalities;
pub mod intervals;
pub mod safety;
