/*!
The rule dependency graph and its two-pass decomposition.

Each node stands for one statement, carrying the head atoms it
*provides* (as representative mirrors) and the body occurrences it
*depends* on.
An edge runs from a dependent node to each node providing an atom its
occurrence unifies with.

Two Tarjan passes structure the graph:
1. Over all edges, yielding the outer components in grounding order:
   providers come before dependents, mutual recursion shares a
   component.
2. Within each outer component, over the non-negative edges alone,
   yielding the finer positive stratification.

Every body occurrence is then classified by the strictest label its
providers admit:
- [PositivelyStratified](OccurrenceType::PositivelyStratified) ---
  every provider lies in an earlier positive component.
- [Stratified](OccurrenceType::Stratified) --- every provider lies in
  an earlier outer component, or earlier in this one.
- [Unstratified](OccurrenceType::Unstratified) --- some provider sits
  in the same positive component.

The classification picks index windows during instantiation, and the
per-component *positive* flag (no negation, no choice, and no
dependence on a non-positive earlier component) licenses one-shot
grounding.
*/

use petgraph::graph::{DiGraph, NodeIndex};

use crate::{
    matcher::{GTerm, Lookup},
    misc::log::targets,
    structures::{symbol::SymbolStore, term::CellArena},
};

/// How a body occurrence relates to its providers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OccurrenceType {
    /// All providers in earlier positive components.
    PositivelyStratified,

    /// All providers in earlier components, outer or positive.
    Stratified,

    /// A provider within the same positive component.
    Unstratified,
}

/// A body occurrence of a node.
#[derive(Debug)]
pub struct BodyDepend<K> {
    /// The caller's handle for the occurrence.
    pub key: K,

    /// True when the occurrence is not under default negation.
    pub positive: bool,

    /// True when the occurrence is under default negation.
    pub negative: bool,

    /// Treat the edge as negative regardless of the occurrence's sign;
    /// used for recursion through choice and head aggregates.
    pub force_negative: bool,

    /// Filled by [Dependency::analyze]: the providing nodes.
    pub providers: Vec<usize>,

    /// Filled by [Dependency::analyze]: the classification.
    pub occ_type: OccurrenceType,
}

/// A node of the dependency graph.
#[derive(Debug)]
pub struct DepNode<S, K> {
    /// The statement the node stands for.
    pub stm: S,

    /// True for a normal statement: no choice, no disjunction, no
    /// negative head recursion potential.
    pub normal: bool,

    /// The head templates the node provides.
    pub provides: Vec<GTerm>,

    /// The body occurrences.
    pub depends: Vec<BodyDepend<K>>,

    /// Filled by analysis: index of the outer component.
    pub neg_scc: usize,

    /// Filled by analysis: index of the positive component within the
    /// outer one.
    pub pos_scc: usize,
}

/// One grounding component: statement nodes and the positive flag.
#[derive(Debug)]
pub struct Component {
    /// Indices of the member nodes, in discovery order.
    pub nodes: Vec<usize>,

    /// True if the component grounds in one shot: every rule normal,
    /// no recursion through negation or choice, and all earlier
    /// components it draws from positive as well.
    pub positive: bool,
}

/// The dependency graph under construction.
pub struct Dependency<S, K> {
    /// The nodes, in insertion order.
    pub nodes: Vec<DepNode<S, K>>,
    lookup: Lookup<(usize, usize)>,
}

impl<S, K> Default for Dependency<S, K> {
    fn default() -> Self {
        Dependency {
            nodes: Vec::new(),
            lookup: Lookup::default(),
        }
    }
}

impl<S, K> Dependency<S, K> {
    /// Add a statement node.
    pub fn add_node(&mut self, stm: S, normal: bool) -> usize {
        self.nodes.push(DepNode {
            stm,
            normal,
            provides: Vec::new(),
            depends: Vec::new(),
            neg_scc: 0,
            pos_scc: 0,
        });
        self.nodes.len() - 1
    }

    /// Register a body occurrence of `node` with its representative.
    pub fn depends(
        &mut self,
        node: usize,
        repr: GTerm,
        key: K,
        positive: bool,
        negative: bool,
        force_negative: bool,
        store: &SymbolStore,
    ) {
        let dep_index = self.nodes[node].depends.len();
        self.lookup.add(repr, (node, dep_index), store);
        self.nodes[node].depends.push(BodyDepend {
            key,
            positive,
            negative,
            force_negative,
            providers: Vec::new(),
            occ_type: OccurrenceType::PositivelyStratified,
        });
    }

    /// Register a head template of `node`.
    pub fn provides(&mut self, node: usize, repr: GTerm) {
        self.nodes[node].provides.push(repr);
    }

    /// Resolve providers, decompose, classify, and return the
    /// components in grounding order.
    pub fn analyze(&mut self, cells: &mut CellArena, store: &SymbolStore) -> Vec<Component> {
        // Resolve which nodes provide which occurrences.
        let mut edges: Vec<(usize, usize, usize)> = Vec::new();
        for provider in 0..self.nodes.len() {
            for template in &self.nodes[provider].provides {
                self.lookup.unify_term(template, cells, store, |occs| {
                    for &(node, dep) in occs {
                        edges.push((node, dep, provider));
                    }
                });
            }
        }
        for (node, dep, provider) in edges {
            self.nodes[node].depends[dep].providers.push(provider);
        }

        // The outer graph: an edge from dependent to provider.
        let mut graph: DiGraph<(), ()> = DiGraph::new();
        let indices: Vec<NodeIndex> = (0..self.nodes.len()).map(|_| graph.add_node(())).collect();
        for (index, node) in self.nodes.iter().enumerate() {
            for dep in &node.depends {
                for &provider in &dep.providers {
                    graph.add_edge(indices[index], indices[provider], ());
                }
            }
        }

        // tarjan_scc returns components in reverse topological order,
        // which with dependent-to-provider edges is providers first ---
        // exactly the grounding order.
        let outer_sccs = petgraph::algo::tarjan_scc(&graph);

        // Index zero is reserved so an unassigned component reads as
        // positive.
        let mut positive: Vec<bool> = vec![true];
        let mut components = Vec::new();

        for scc in outer_sccs {
            let members: Vec<usize> = scc.iter().map(|ix| ix.index()).collect();
            let neg_scc = positive.len();
            for &member in &members {
                self.nodes[member].neg_scc = neg_scc;
            }
            let mut scc_positive = true;
            for &member in &members {
                scc_positive = scc_positive && self.nodes[member].normal;
                for dep in &self.nodes[member].depends {
                    for &provider in &dep.providers {
                        let provider_scc = self.nodes[provider].neg_scc;
                        scc_positive = scc_positive
                            && if provider_scc != neg_scc {
                                positive[provider_scc]
                            } else {
                                dep.positive && !dep.force_negative
                            };
                    }
                }
            }
            positive.push(scc_positive);

            // The positive graph within the component.
            let mut inner: DiGraph<(), ()> = DiGraph::new();
            let inner_indices: Vec<NodeIndex> =
                members.iter().map(|_| inner.add_node(())).collect();
            let position = |node: usize| members.iter().position(|&m| m == node);
            for (local, &member) in members.iter().enumerate() {
                for dep in &self.nodes[member].depends {
                    if dep.negative {
                        continue;
                    }
                    for &provider in &dep.providers {
                        if self.nodes[provider].neg_scc == neg_scc {
                            let target = position(provider).expect("provider is a member");
                            inner.add_edge(inner_indices[local], inner_indices[target], ());
                        }
                    }
                }
            }
            let inner_sccs = petgraph::algo::tarjan_scc(&inner);
            for (pos_scc, scc) in inner_sccs.iter().enumerate() {
                for ix in scc {
                    self.nodes[members[ix.index()]].pos_scc = pos_scc;
                }
            }

            // Classification, walking the positive components in order.
            for (pos_scc, scc) in inner_sccs.iter().enumerate() {
                let mut component = Component {
                    nodes: Vec::new(),
                    positive: scc_positive,
                };
                for ix in scc {
                    let member = members[ix.index()];
                    let mut classified = Vec::new();
                    for dep in &self.nodes[member].depends {
                        let mut occ_type = OccurrenceType::PositivelyStratified;
                        for &provider in &dep.providers {
                            let provider_node = &self.nodes[provider];
                            if provider_node.neg_scc != neg_scc {
                                if occ_type == OccurrenceType::PositivelyStratified
                                    && !positive[provider_node.neg_scc]
                                {
                                    occ_type = OccurrenceType::Stratified;
                                }
                            } else if provider_node.pos_scc < pos_scc {
                                if occ_type == OccurrenceType::PositivelyStratified {
                                    occ_type = OccurrenceType::Stratified;
                                }
                            } else {
                                occ_type = OccurrenceType::Unstratified;
                                break;
                            }
                        }
                        classified.push(occ_type);
                    }
                    for (dep, occ_type) in
                        self.nodes[member].depends.iter_mut().zip(classified)
                    {
                        dep.occ_type = occ_type;
                    }
                    component.nodes.push(member);
                }
                log::debug!(
                    target: targets::DEPENDENCY,
                    "component with {} nodes, positive: {}",
                    component.nodes.len(),
                    component.positive
                );
                components.push(component);
            }
        }
        components
    }
}
