//! Meek orientation rules run to a local fixpoint.
//!
//! ## Rules
//!
//! An undirected edge `a --- c` becomes `a --> c` when any of these hold:
//!
//! - **R1** (away from collider): `b --> a` with `b` not adjacent to `c`
//! - **R2** (no directed cycle): `a --> b --> c`
//! - **R3** (kite): `a --- b --> c`, `a --- d --> c`, `b` not adjacent to `d`
//! - **R4** (only with knowledge): `a --- k --> l --> c`, `a` adjacent to `l`,
//!   `k` not adjacent to `c`
//! - knowledge requires `a --> c` or forbids `c --> a`
//!
//! Orientations that knowledge forbids are never applied.
//!
//! ## Worklist
//!
//! Propagation starts from a frontier of touched nodes and only examines
//! undirected edges incident to popped nodes. Rules only ever orient
//! undirected edges, so each firing shrinks that set and the run
//! terminates. An orientation `u --> v` pushes `u`, `v` and the neighbors
//! of `v`, which covers every edge whose rule premises it can complete.
//!
//! ## Reverting to pattern form
//!
//! With `undirect_unforced_edges`, the frontier is first widened to its
//! whole connected component, and every directed edge in it that is not
//! part of an unshielded collider (and not forced by knowledge) is reverted
//! to undirected. The rules then re-derive every compelled orientation from
//! scratch, so an edge compelled only by an edge an operator just removed
//! or undirected cannot survive. Components the frontier does not touch
//! are already in pattern form and are left alone.

use std::collections::BTreeSet;

use crate::engine::errors::SearchError;
use crate::engine::graph::{Graph, NodeId, NodeSet};
use crate::engine::knowledge::KnowledgeIndex;

/// Summary of one propagation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeekOutcome {
    /// Nodes processed or touched by an orientation change.
    pub visited: BTreeSet<NodeId>,
    /// Number of undirected edges oriented.
    pub oriented: usize,
    /// Number of directed edges reverted to undirected.
    pub undirected: usize,
}

/// Meek rule propagator bound to a knowledge index.
#[derive(Debug, Clone, Copy)]
pub struct MeekRules<'k> {
    knowledge: &'k KnowledgeIndex,
    undirect_unforced: bool,
}

impl<'k> MeekRules<'k> {
    pub fn new(knowledge: &'k KnowledgeIndex) -> Self {
        Self {
            knowledge,
            undirect_unforced: false,
        }
    }

    /// Revert the frontier's component to its basic pattern before orienting.
    pub fn undirect_unforced_edges(mut self, enabled: bool) -> Self {
        self.undirect_unforced = enabled;
        self
    }

    /// Propagates orientations from `frontier` until no rule fires.
    pub fn orient_implied(
        &self,
        graph: &mut Graph,
        frontier: &[NodeId],
    ) -> Result<MeekOutcome, SearchError> {
        let start = if self.undirect_unforced {
            graph.connected_component(frontier)
        } else {
            frontier.to_vec()
        };
        let mut propagation = Propagation {
            graph,
            knowledge: self.knowledge,
            stack: Vec::new(),
            outcome: MeekOutcome::default(),
        };
        if self.undirect_unforced {
            for &node in &start {
                propagation.undirect_unforced_parents(node)?;
            }
        }
        propagation.run(&start)
    }
}

struct Propagation<'a> {
    graph: &'a mut Graph,
    knowledge: &'a KnowledgeIndex,
    stack: Vec<NodeId>,
    outcome: MeekOutcome,
}

impl Propagation<'_> {
    fn run(mut self, start: &[NodeId]) -> Result<MeekOutcome, SearchError> {
        self.outcome.visited.extend(start.iter().copied());
        for &node in start {
            self.apply_rules(node)?;
        }
        while let Some(node) = self.stack.pop() {
            self.outcome.visited.insert(node);
            self.apply_rules(node)?;
        }
        Ok(self.outcome)
    }

    /// Undirects parent edges of `y` that are in no unshielded collider.
    fn undirect_unforced_parents(&mut self, y: NodeId) -> Result<(), SearchError> {
        let parents = self.graph.parents(y);
        for &x in &parents {
            let in_collider = parents
                .iter()
                .any(|&p| p != x && !self.graph.is_adjacent(p, x));
            let forced = self.knowledge.is_required(x, y) || self.knowledge.is_forbidden(y, x);
            if in_collider || forced {
                continue;
            }
            self.graph.set_undirected(x, y)?;
            self.outcome.undirected += 1;
        }
        Ok(())
    }

    fn apply_rules(&mut self, node: NodeId) -> Result<(), SearchError> {
        for other in self.graph.neighbors_undirected(node) {
            if !self.graph.is_undirected(node, other) {
                // Oriented earlier in this loop.
                continue;
            }
            if self.implied(node, other) {
                self.direct(node, other)?;
            } else if self.implied(other, node) {
                self.direct(other, node)?;
            }
        }
        Ok(())
    }

    /// Whether the undirected edge `a --- c` must be `a --> c`.
    fn implied(&self, a: NodeId, c: NodeId) -> bool {
        if !self.knowledge.arrowpoint_allowed(a, c) {
            return false;
        }
        if self.knowledge.is_required(a, c) || self.knowledge.is_forbidden(c, a) {
            return true;
        }
        let g = &*self.graph;

        // R1
        if g.parents(a).iter().any(|&b| b != c && !g.is_adjacent(b, c)) {
            return true;
        }

        // R2
        if g.children(a).iter().any(|&b| g.is_parent_of(b, c)) {
            return true;
        }

        // R3
        let kite: NodeSet = g
            .neighbors_undirected(a)
            .into_iter()
            .filter(|&b| b != c && g.is_parent_of(b, c))
            .collect();
        for (i, &b) in kite.iter().enumerate() {
            if kite[i + 1..].iter().any(|&d| !g.is_adjacent(b, d)) {
                return true;
            }
        }

        // R4
        if !self.knowledge.is_empty() {
            for l in g.parents(c) {
                if l == a || !g.is_adjacent(a, l) {
                    continue;
                }
                let chain = g.parents(l).into_iter().any(|k| {
                    k != c && g.is_undirected(a, k) && !g.is_adjacent(k, c)
                });
                if chain {
                    return true;
                }
            }
        }
        false
    }

    fn direct(&mut self, from: NodeId, to: NodeId) -> Result<(), SearchError> {
        self.graph.set_directed(from, to)?;
        self.outcome.visited.insert(from);
        self.outcome.visited.insert(to);
        self.outcome.oriented += 1;
        self.stack.push(from);
        self.stack.push(to);
        self.stack.extend(self.graph.adjacent_nodes(to));
        Ok(())
    }
}
