//! Delete operator: candidate generation, validation and the backward loop.

use std::collections::BTreeSet;

use crate::engine::errors::SearchError;
use crate::engine::graph::{difference, union, Combinations, Edge, NodeId};
use crate::engine::meek::MeekRules;

use super::{pair_key, Operation, Phase, SearchSession};

impl SearchSession<'_> {
    /// Backward equivalence search: rebuilds the queue from the current
    /// edges and applies deletes until it drains, then closes the graph
    /// under the orientation rules.
    pub(super) fn backward(&mut self) -> Result<(), SearchError> {
        #[cfg(feature = "tracing")]
        tracing::info!(
            edges = self.graph.num_edges(),
            total_score = self.total_score,
            "backward phase"
        );

        self.queue.clear();
        self.snapshots.fill(None);
        self.initialize_arrows_backward();

        while !self.is_cancelled() {
            let Some(candidate) = self.queue.pop_best() else {
                break;
            };
            let (x, y) = (candidate.source, candidate.target);

            let Some(edge) = self.graph.edge(x, y) else {
                self.discard_stale(&candidate, "no longer adjacent");
                continue;
            };
            if edge.points_towards(x) {
                self.discard_stale(&candidate, "edge points the other way");
                continue;
            }
            let context = self.delete_context(x, y);
            if candidate.context != context {
                self.discard_stale(&candidate, "neighborhood changed");
                continue;
            }
            if !self.valid_delete(x, y, &candidate.h_or_t, &context.na_yx) {
                self.discard_stale(&candidate, "invalid delete");
                continue;
            }

            let removed = self.delete(x, y, &candidate.h_or_t)?;
            self.queue.clear_pair(x, y);
            self.queue.clear_pair(y, x);

            let mut frontier = vec![x, y];
            frontier.extend(candidate.h_or_t.iter().copied());
            let visited = self.reapply_orientation(&frontier)?;
            self.record_operator(Phase::Backward, Operation::Delete, removed, candidate.bump);

            let mut to_process: BTreeSet<NodeId> = visited
                .into_iter()
                .filter(|&n| self.neighbors_changed(n))
                .collect();
            to_process.insert(x);
            to_process.insert(y);
            to_process.extend(self.graph.common_adjacents(x, y));
            self.reevaluate_backward(to_process);
        }

        if !self.is_cancelled() {
            let nodes: Vec<NodeId> = self.graph.node_ids().collect();
            self.stats.meek_runs += 1;
            MeekRules::new(&self.knowledge)
                .undirect_unforced_edges(true)
                .orient_implied(&mut self.graph, &nodes)?;
        }
        Ok(())
    }

    fn initialize_arrows_backward(&mut self) {
        let this = &*self;
        let edges: Vec<Edge> = this.graph.edges().collect();
        let evaluated = this.pool.flat_map(&edges, &this.config.cancellation, |edge| {
            let (a, b) = edge.nodes();
            if !this.knowledge.no_edge_required(a, b) {
                return Vec::new();
            }
            this.calculate_pair_backward(a, b);
            vec![a, b]
        });
        self.record_snapshots(evaluated);

        #[cfg(feature = "tracing")]
        tracing::debug!(candidates = self.queue.len(), "backward queue initialized");
    }

    /// Regenerates delete candidates for every edge incident to `nodes`.
    fn reevaluate_backward(&mut self, nodes: BTreeSet<NodeId>) {
        let pairs: Vec<(NodeId, NodeId)> = nodes
            .iter()
            .flat_map(|&r| self.graph.adjacent_nodes(r).map(move |w| pair_key(r, w)))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let this = &*self;
        this.pool.for_each(&pairs, &this.config.cancellation, |&(a, b)| {
            this.queue.clear_pair(a, b);
            this.queue.clear_pair(b, a);
            this.calculate_pair_backward(a, b);
        });
        self.record_snapshots(nodes);
    }

    /// Scores deletion of the edge between `a` and `b` in each direction the
    /// edge allows.
    fn calculate_pair_backward(&self, a: NodeId, b: NodeId) {
        let Some(edge) = self.graph.edge(a, b) else {
            return;
        };
        match edge.direction() {
            Some((tail, head)) => self.calculate_arrows_backward(tail, head),
            None if edge.is_undirected() => {
                self.calculate_arrows_backward(a, b);
                self.calculate_arrows_backward(b, a);
            }
            None => {}
        }
    }

    /// Pushes Delete(a, b, H) candidates for every admissible H.
    fn calculate_arrows_backward(&self, a: NodeId, b: NodeId) {
        if !self.knowledge.no_edge_required(a, b) || self.no_more_parents[b.index()] {
            return;
        }
        let context = self.delete_context(a, b);
        let na_yx = &context.na_yx;

        let mut pushed = 0;
        for size in 0..=na_yx.len() {
            for diff in Combinations::new(na_yx, size) {
                if !self.graph.is_clique(&diff) {
                    continue;
                }
                let h = difference(na_yx, &diff);
                if !self.delete_allowed_by_knowledge(a, b, &h) {
                    continue;
                }
                let conditioning = difference(&union(&diff, &context.parents), &[a]);
                let bump = -self.score.local_score_diff(a, b, &conditioning);
                if bump > 0.0 {
                    self.queue.push(a, b, bump, context.clone(), h);
                    pushed += 1;
                }
            }
        }
        self.count_generated(pushed);
    }

    fn delete_allowed_by_knowledge(&self, x: NodeId, y: NodeId, h: &[NodeId]) -> bool {
        h.iter()
            .all(|&h| !self.knowledge.is_forbidden(x, h) && !self.knowledge.is_forbidden(y, h))
    }

    /// Chickering's validity test for Delete(x, y, H).
    fn valid_delete(&self, x: NodeId, y: NodeId, h: &[NodeId], na_yx: &[NodeId]) -> bool {
        self.delete_allowed_by_knowledge(x, y, h) && self.graph.is_clique(&difference(na_yx, h))
    }

    /// Removes the `x`, `y` edge and directs `y --> h` (and `x --> h` where
    /// `x --- h`) for every released `h`. Returns the removed edge.
    fn delete(&mut self, x: NodeId, y: NodeId, h: &[NodeId]) -> Result<Edge, SearchError> {
        let removed = self.graph.remove_edge(x, y).ok_or_else(|| {
            SearchError::Internal(format!(
                "delete of non-adjacent pair '{}', '{}'",
                self.graph.name(x),
                self.graph.name(y)
            ))
        })?;
        self.removed_edges.insert(pair_key(x, y));

        for &h in h {
            if self.graph.is_parent_of(h, y) || self.graph.is_parent_of(h, x) {
                continue;
            }
            if self.graph.is_adjacent(y, h) {
                self.graph.set_directed(y, h)?;
            }
            if self.graph.is_undirected(x, h) {
                self.graph.set_directed(x, h)?;
            }
        }
        Ok(removed)
    }
}
