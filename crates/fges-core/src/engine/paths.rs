//! Reachability queries over [`Graph`].
//!
//! These are the traversal-heavy checks the search consults before and
//! after every mutation: bounded semi-directed paths (insert validity),
//! ancestry (required-edge seeding), directed cycles, and d-connection
//! (second-pass candidate generation and the d-separation oracle).

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::engine::graph::{Endpoint, Graph, NodeId, NodeSet};

impl Graph {
    /// Whether a semi-directed path `from ~> to` exists that avoids `avoid`
    /// and uses at most `bound` edges (`-1` for no bound).
    ///
    /// A semi-directed path only leaves a node through a tail, i.e. along
    /// `u --> v` or `u --- v`. A search still open when the bound is reached
    /// reports a path, so callers guarding against cycles stay conservative.
    pub fn exists_semi_directed_path(
        &self,
        from: NodeId,
        to: NodeId,
        avoid: &[NodeId],
        bound: i32,
    ) -> bool {
        let limit = usize::try_from(bound).unwrap_or(usize::MAX);
        let mut visited = FxHashSet::default();
        visited.insert(from);
        let mut frontier = vec![from];
        let mut depth = 0usize;

        while !frontier.is_empty() {
            if depth >= limit {
                return true;
            }
            depth += 1;
            let mut next = Vec::new();
            for &node in &frontier {
                for other in self.adjacent_nodes(node) {
                    let Some(edge) = self.edge(node, other) else {
                        continue;
                    };
                    let leaves_by_tail = edge.endpoint_at(node) == Some(Endpoint::Tail)
                        && edge.endpoint_at(other) != Some(Endpoint::Circle);
                    if !leaves_by_tail {
                        continue;
                    }
                    if other == to {
                        return true;
                    }
                    if avoid.contains(&other) || !visited.insert(other) {
                        continue;
                    }
                    next.push(other);
                }
            }
            frontier = next;
        }
        false
    }

    /// Every node connected to one of `seeds` by edges of any kind, sorted.
    pub fn connected_component(&self, seeds: &[NodeId]) -> Vec<NodeId> {
        let mut seen = vec![false; self.num_nodes()];
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        for &seed in seeds {
            if !seen[seed.index()] {
                seen[seed.index()] = true;
                queue.push_back(seed);
            }
        }
        while let Some(node) = queue.pop_front() {
            for other in self.adjacent_nodes(node) {
                if !seen[other.index()] {
                    seen[other.index()] = true;
                    queue.push_back(other);
                }
            }
        }
        self.node_ids().filter(|n| seen[n.index()]).collect()
    }

    /// Whether `ancestor` reaches `node` along directed edges (or is `node`).
    pub fn is_ancestor_of(&self, ancestor: NodeId, node: NodeId) -> bool {
        if ancestor == node {
            return true;
        }
        let mut visited = FxHashSet::default();
        let mut queue = VecDeque::from([ancestor]);
        while let Some(current) = queue.pop_front() {
            for child in self.children(current) {
                if child == node {
                    return true;
                }
                if visited.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        false
    }

    /// Marks every node that is an ancestor of (or is in) `nodes`.
    pub fn ancestor_mask(&self, nodes: &[NodeId]) -> Vec<bool> {
        let mut mask = vec![false; self.num_nodes()];
        let mut queue: VecDeque<NodeId> = nodes.iter().copied().collect();
        for &n in nodes {
            mask[n.index()] = true;
        }
        while let Some(current) = queue.pop_front() {
            for parent in self.parents(current) {
                if !mask[parent.index()] {
                    mask[parent.index()] = true;
                    queue.push_back(parent);
                }
            }
        }
        mask
    }

    /// Whether the directed sub-edges contain a cycle.
    pub fn has_directed_cycle(&self) -> bool {
        let mut in_degree: Vec<usize> = self
            .node_ids()
            .map(|n| self.parents(n).len())
            .collect();
        let mut ready: Vec<NodeId> = self
            .node_ids()
            .filter(|n| in_degree[n.index()] == 0)
            .collect();
        let mut removed = 0usize;
        while let Some(node) = ready.pop() {
            removed += 1;
            for child in self.children(node) {
                in_degree[child.index()] -= 1;
                if in_degree[child.index()] == 0 {
                    ready.push(child);
                }
            }
        }
        removed != self.num_nodes()
    }

    /// Nodes d-connected to `source` given `conditioning`, excluding `source`.
    ///
    /// Undirected edges are treated as non-colliding links, so on a pattern
    /// with an empty conditioning set this yields every node reachable by a
    /// path without a definite collider.
    pub fn d_connected_from(&self, source: NodeId, conditioning: &[NodeId]) -> NodeSet {
        let ancestors = self.ancestor_mask(conditioning);
        // State: (node, arrived with an arrowhead at node).
        let mut seen: FxHashSet<(NodeId, bool)> = FxHashSet::default();
        let mut reached = vec![false; self.num_nodes()];
        let mut queue = VecDeque::new();

        for other in self.adjacent_nodes(source) {
            if let Some(edge) = self.edge(source, other) {
                let state = (other, edge.endpoint_at(other) == Some(Endpoint::Arrow));
                if seen.insert(state) {
                    queue.push_back(state);
                }
            }
        }

        while let Some((node, arrow_in)) = queue.pop_front() {
            reached[node.index()] = true;
            for next in self.adjacent_nodes(node) {
                if next == source {
                    continue;
                }
                let Some(edge) = self.edge(node, next) else {
                    continue;
                };
                let arrow_out = edge.endpoint_at(node) == Some(Endpoint::Arrow);
                let passable = if arrow_in && arrow_out {
                    ancestors[node.index()]
                } else {
                    !conditioning.contains(&node)
                };
                if !passable {
                    continue;
                }
                let state = (next, edge.endpoint_at(next) == Some(Endpoint::Arrow));
                if seen.insert(state) {
                    queue.push_back(state);
                }
            }
        }

        reached[source.index()] = false;
        self.node_ids()
            .filter(|n| reached[n.index()] && !conditioning.contains(n))
            .collect()
    }

    /// Whether `x` and `y` are d-separated given `conditioning`.
    pub fn is_d_separated(&self, x: NodeId, y: NodeId, conditioning: &[NodeId]) -> bool {
        if x == y {
            return false;
        }
        if conditioning.contains(&x) || conditioning.contains(&y) {
            return true;
        }
        !self.d_connected_from(x, conditioning).contains(&y)
    }
}
