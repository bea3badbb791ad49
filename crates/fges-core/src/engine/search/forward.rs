//! Insert operator: candidate generation, validation and the forward loop.

use std::collections::BTreeSet;

use crate::engine::candidate::CandidateContext;
use crate::engine::errors::SearchError;
use crate::engine::graph::{union, Combinations, Edge, NodeId, NodeSet};

use super::{Mode, Operation, Phase, SearchSession};

impl SearchSession<'_> {
    /// Scores every unordered pair of measured variables with no parents and
    /// seeds the forward queue from pairs that form effect edges.
    pub(super) fn initialize_effect_edges(&mut self) -> Result<(), SearchError> {
        self.queue.clear();
        let this = &*self;
        let positions: Vec<usize> = (0..this.nodes.len()).collect();
        let pairs = this
            .pool
            .flat_map(&positions, &this.config.cancellation, |&i| this.effect_pairs(i));

        for &(x, y, _, _) in &pairs {
            self.effect_edges.add_undirected(x, y)?;
        }

        if self.graph.num_edges() == 0 {
            for &(x, y, into_y, into_x) in &pairs {
                self.push_first_step(x, y, into_y);
                self.push_first_step(y, x, into_x);
            }
        } else {
            // Parents already present change every family score; rescore the
            // effect-edge pairs against the starting graph.
            let this = &*self;
            let directed: Vec<(NodeId, NodeId)> = pairs
                .iter()
                .flat_map(|&(x, y, _, _)| [(x, y), (y, x)])
                .collect();
            this.pool.for_each(&directed, &this.config.cancellation, |&(a, b)| {
                this.calculate_arrows_forward(a, b);
            });
        }
        let nodes = self.nodes.clone();
        self.record_snapshots(nodes);

        #[cfg(feature = "tracing")]
        tracing::info!(
            effect_edges = self.effect_edges.num_edges(),
            candidates = self.queue.len(),
            "effect edges initialized"
        );
        Ok(())
    }

    /// Effect-edge pairs `(x, y, bump for x --> y, bump for y --> x)` between
    /// `nodes[i]` and every later node.
    fn effect_pairs(&self, i: usize) -> Vec<(NodeId, NodeId, f64, f64)> {
        let y = self.nodes[i];
        let mut out = Vec::new();
        for &x in &self.nodes[i + 1..] {
            if self.knowledge.is_forbidden(x, y) && self.knowledge.is_forbidden(y, x) {
                continue;
            }
            if !self.allowed_by_restriction(x, y) {
                continue;
            }
            if let Some(bound) = &self.config.bound_graph {
                if !bound.is_adjacent(x, y) {
                    continue;
                }
            }
            let into_y = self.score.local_score_diff(x, y, &[]);
            let into_x = self.score.local_score_diff(y, x, &[]);
            if self.config.symmetric_first_step {
                let best = into_y.max(into_x);
                if best > 0.0 {
                    out.push((x, y, best, best));
                }
            } else if into_y > 0.0 && into_x > 0.0 {
                out.push((x, y, into_y, into_x));
            }
        }
        out
    }

    fn push_first_step(&self, source: NodeId, target: NodeId, bump: f64) {
        if self.knowledge.is_forbidden(source, target) || self.no_more_parents[target.index()] {
            return;
        }
        let context = CandidateContext::default();
        self.queue.push(source, target, bump, context, NodeSet::new());
        self.count_generated(1);
    }

    /// Seeds the second forward pass from the current graph.
    pub(super) fn reseed_forward(&mut self) {
        self.queue.clear();
        self.snapshots.fill(None);
        if let Some(initial) = &self.config.initial_graph {
            for edge in initial.edges() {
                let (a, b) = edge.nodes();
                if !self.effect_edges.is_adjacent(a, b) {
                    // Pairs were checked against the same variables.
                    let _ = self.effect_edges.add_undirected(a, b);
                }
            }
        }

        let this = &*self;
        let evaluated = this.pool.flat_map(&this.nodes, &this.config.cancellation, |&y| {
            let mut out = Vec::new();
            for x in this.forward_partners(y, true) {
                if this.knowledge.is_forbidden(x, y) && this.knowledge.is_forbidden(y, x) {
                    continue;
                }
                if this.calculate_arrows_forward(x, y) {
                    out.push(y);
                }
            }
            out
        });
        self.record_snapshots(evaluated);

        #[cfg(feature = "tracing")]
        tracing::info!(
            mode = ?self.mode,
            candidates = self.queue.len(),
            "second pass seeded"
        );
    }

    /// Forward equivalence search: applies inserts until the queue drains.
    pub(super) fn forward(&mut self) -> Result<(), SearchError> {
        #[cfg(feature = "tracing")]
        tracing::info!(
            mode = ?self.mode,
            edges = self.graph.num_edges(),
            total_score = self.total_score,
            "forward phase"
        );

        while !self.is_cancelled() {
            let Some(candidate) = self.queue.pop_best() else {
                break;
            };
            let (x, y) = (candidate.source, candidate.target);

            if self.graph.is_adjacent(x, y) {
                self.discard_stale(&candidate, "already adjacent");
                continue;
            }
            if self.graph.degree(x) >= self.max_degree || self.graph.degree(y) >= self.max_degree {
                self.discard_stale(&candidate, "degree bound");
                continue;
            }
            let context = self.insert_context(x, y);
            if candidate.context != context {
                self.discard_stale(&candidate, "neighborhood changed");
                continue;
            }
            if !self.valid_insert(x, y, &candidate.h_or_t, &context.na_yx) {
                self.discard_stale(&candidate, "invalid insert");
                continue;
            }
            if !self.insert(x, y, &candidate.h_or_t)? {
                continue;
            }

            let visited = self.reapply_orientation(&[x, y])?;
            self.record_operator(
                Phase::Forward,
                Operation::Insert,
                Edge::directed(x, y),
                candidate.bump,
            );

            let mut to_process: BTreeSet<NodeId> = visited
                .into_iter()
                .filter(|&n| self.neighbors_changed(n))
                .collect();
            to_process.insert(x);
            to_process.insert(y);
            self.reevaluate_forward(to_process.into_iter().collect());
        }
        Ok(())
    }

    /// Chickering's validity test for Insert(x, y, T).
    fn valid_insert(&self, x: NodeId, y: NodeId, t: &[NodeId], na_yx: &[NodeId]) -> bool {
        if self.knowledge.is_forbidden(x, y) || t.iter().any(|&t| self.knowledge.is_forbidden(t, y)) {
            return false;
        }
        let union = union(t, na_yx);
        self.graph.is_clique(&union)
            && !self
                .graph
                .exists_semi_directed_path(y, x, &union, self.config.cycle_bound)
    }

    /// Adds `x --> y` and directs every `t --- y` into `y`.
    fn insert(&mut self, x: NodeId, y: NodeId, t: &[NodeId]) -> Result<bool, SearchError> {
        if self.graph.is_adjacent(x, y) || self.no_more_parents[y.index()] {
            return Ok(false);
        }
        let bound = self.config.bound_graph.as_ref();
        if bound.is_some_and(|g| !g.is_adjacent(x, y)) {
            return Ok(false);
        }

        self.graph.add_directed(x, y)?;
        for &t in t {
            if bound.is_some_and(|g| !g.is_adjacent(t, y)) {
                continue;
            }
            self.graph.set_directed(t, y)?;
        }

        let parents = self.graph.parents(y);
        if self.score.local_score(y, &parents).is_nan() {
            #[cfg(feature = "tracing")]
            tracing::debug!(node = self.graph.name(y), "no more parents accepted");
            self.no_more_parents[y.index()] = true;
        }
        Ok(true)
    }

    /// Regenerates insert candidates into every node in `nodes`.
    fn reevaluate_forward(&mut self, nodes: Vec<NodeId>) {
        let this = &*self;
        let evaluated = this.pool.flat_map(&nodes, &this.config.cancellation, |&x| {
            let mut out = Vec::new();
            for w in this.forward_partners(x, false) {
                if w == x || this.graph.is_adjacent(w, x) || !this.allowed_by_restriction(w, x) {
                    continue;
                }
                this.queue.clear_pair(w, x);
                if this.calculate_arrows_forward(w, x) {
                    out.push(x);
                }
            }
            out
        });
        self.record_snapshots(evaluated);
    }

    /// Nodes that may become parents of `x` in the current mode.
    ///
    /// When `seeding` the second pass, pairs deleted earlier are skipped in
    /// the non-collider mode and effect-edge partners in the d-connection
    /// mode.
    fn forward_partners(&self, x: NodeId, seeding: bool) -> NodeSet {
        match self.mode {
            Mode::EffectEdges => self.effect_edges.adjacent_nodes(x).collect(),
            Mode::CoverNoncolliders => {
                let mut partners = BTreeSet::new();
                for n in self.graph.adjacent_nodes(x) {
                    for m in self.graph.adjacent_nodes(n) {
                        if m == x || self.graph.is_adjacent(x, m) || self.graph.is_def_collider(m, n, x)
                        {
                            continue;
                        }
                        if seeding && self.removed_edges.contains(&super::pair_key(m, x)) {
                            continue;
                        }
                        partners.insert(m);
                    }
                }
                partners.into_iter().collect()
            }
            Mode::AllowUnfaithfulness => {
                let connected = self.graph.d_connected_from(x, &[]);
                if seeding {
                    connected
                        .into_iter()
                        .filter(|&m| !self.effect_edges.is_adjacent(m, x))
                        .collect()
                } else {
                    connected
                }
            }
        }
    }

    /// Pushes Insert(a, b, T) candidates for every admissible T.
    ///
    /// Returns whether `b` was evaluated, i.e. whether its neighbor snapshot
    /// should be refreshed.
    fn calculate_arrows_forward(&self, a: NodeId, b: NodeId) -> bool {
        if self.mode == Mode::EffectEdges && !self.effect_edges.is_adjacent(a, b) {
            return false;
        }
        if !self.allowed_by_restriction(a, b) {
            return false;
        }
        if a == b
            || self.graph.is_adjacent(a, b)
            || self.knowledge.is_forbidden(a, b)
            || self.no_more_parents[b.index()]
        {
            return true;
        }

        let context = self.insert_context(a, b);
        if !self.graph.is_clique(&context.na_yx) {
            return true;
        }
        let largest = context.t_neighbors.len().min(self.max_subset);

        // Clique lattice: a union is only tried if it contains a clique
        // accepted at the previous size.
        let mut previous: Vec<NodeSet> = vec![NodeSet::new()];
        let mut pushed = 0;
        for size in 0..=largest {
            let mut accepted = Vec::new();
            for t in Combinations::new(&context.t_neighbors, size) {
                if t.iter().any(|&n| self.knowledge.is_forbidden(n, b)) {
                    continue;
                }
                let joined = union(&context.na_yx, &t);
                if !previous
                    .iter()
                    .any(|clique| clique.iter().all(|n| joined.contains(n)))
                {
                    continue;
                }
                if !self.graph.is_clique(&joined) {
                    continue;
                }
                let conditioning = union(&joined, &context.parents);
                let bump = self.score.local_score_diff(a, b, &conditioning);
                accepted.push(joined);
                if bump > 0.0 {
                    self.queue.push(a, b, bump, context.clone(), t);
                    pushed += 1;
                }
            }
            if accepted.is_empty() {
                break;
            }
            previous = accepted;
        }
        self.count_generated(pushed);
        true
    }
}
