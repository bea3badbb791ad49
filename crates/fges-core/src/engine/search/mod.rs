//! Fast greedy equivalence search.
//!
//! ## Phases
//!
//! 1. **Required edges**: knowledge-required edges are seeded into the
//!    starting graph and forbidden orientations reversed.
//! 2. **Effect edges**: every pair of measured variables is scored with an
//!    empty parent set; pairs that improve the score in both directions form
//!    the effect-edge graph and seed the forward queue.
//! 3. **Forward / backward** over effect-edge pairs only.
//! 4. **Second pass**: candidates are re-seeded either from pairs two steps
//!    apart that do not meet at a definite collider (faithfulness assumed) or
//!    from every d-connected pair, and forward / backward run again.
//!
//! ## Threading
//!
//! The loop in this module is the only code that mutates the graph, applies
//! operators or runs orientation propagation. Candidate (re)generation is
//! dispatched to the session's [`WorkerPool`]; workers read the graph and the
//! oracle and push straight into the shared [`CandidateQueue`]. The loop
//! blocks until each round returns, then records neighbor snapshots for the
//! targets that were evaluated.
//!
//! ## Stale candidates
//!
//! The queue is not purged when the graph changes around a candidate. Each
//! candidate carries the naYX, T-neighbor and parent sets its bump was
//! computed against; a popped candidate whose sets no longer equal the
//! current graph's is dropped. After an operator only nodes whose undirected
//! neighbors or parents actually changed are re-evaluated. Between a
//! mutation and the next pop the queue may therefore hold candidates scored
//! against an older graph; they are never applied.

mod backward;
mod forward;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;

use crate::engine::candidate::{Candidate, CandidateContext, CandidateQueue};
use crate::engine::config::SearchConfig;
use crate::engine::coordinator::WorkerPool;
use crate::engine::errors::SearchError;
use crate::engine::graph::{Edge, Graph, NodeId, NodeSet};
use crate::engine::knowledge::KnowledgeIndex;
use crate::engine::meek::MeekRules;
use crate::engine::pattern::dag_from_pattern;
use crate::engine::score::{score_dag, ScoreOracle};

/// Which loop applied an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
    Forward,
    Backward,
}

/// Kind of applied operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operation {
    Insert,
    Delete,
}

/// One applied operator.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeLogEntry {
    pub phase: Phase,
    pub operation: Operation,
    /// The inserted edge, or the edge as it was before deletion.
    pub edge: Edge,
    pub bump: f64,
    /// Running total after this operator.
    pub total_score: f64,
}

/// An intermediate graph with the running total at the time it was stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredGraph {
    pub graph: Graph,
    pub score: f64,
}

/// Counters collected over one search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchStats {
    /// Candidates pushed onto the queue.
    pub candidates_generated: usize,
    /// Popped candidates dropped because the graph moved on.
    pub stale_candidates: usize,
    pub inserts: usize,
    pub deletes: usize,
    /// Orientation propagation runs.
    pub meek_runs: usize,
    pub elapsed: Duration,
}

/// Result of a search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Final pattern (or the partial graph if cancelled).
    pub graph: Graph,
    /// Sum of the bumps of every applied operator.
    pub total_score: f64,
    /// Score of a DAG in the final pattern's class, when one exists and the
    /// search converged.
    pub model_score: Option<f64>,
    /// Best intermediate graphs, highest score first.
    pub top_graphs: Vec<ScoredGraph>,
    /// Applied operators in order; empty unless `record_edge_log` is set.
    pub edge_log: Vec<EdgeLogEntry>,
    /// Whether the search stopped on its cancellation token.
    pub cancelled: bool,
    pub stats: SearchStats,
}

impl SearchOutcome {
    pub fn into_parts(self) -> (Graph, f64) {
        (self.graph, self.total_score)
    }
}

/// Runs the full search with a worker pool sized by `config.parallelism`.
pub fn search(score: &dyn ScoreOracle, config: &SearchConfig) -> Result<SearchOutcome, SearchError> {
    config.validate(score.variables())?;
    let pool = build_pool(config)?;
    search_with_pool(score, config, &pool)
}

/// Runs the full search on a caller-owned worker pool.
pub fn search_with_pool(
    score: &dyn ScoreOracle,
    config: &SearchConfig,
    pool: &WorkerPool,
) -> Result<SearchOutcome, SearchError> {
    config.validate(score.variables())?;
    SearchSession::new(score, config, pool)?.run()
}

/// Runs only the backward phase, starting from `config.initial_graph`.
pub fn backward_search(
    score: &dyn ScoreOracle,
    config: &SearchConfig,
) -> Result<SearchOutcome, SearchError> {
    config.validate(score.variables())?;
    let pool = build_pool(config)?;
    SearchSession::new(score, config, &pool)?.run_backward_only()
}

fn build_pool(config: &SearchConfig) -> Result<WorkerPool, SearchError> {
    let parallelism = usize::try_from(config.parallelism)
        .map_err(|_| SearchError::InvalidConfig("search: parallelism must be >= 1".into()))?;
    WorkerPool::new(parallelism, config.min_chunk_size)
}

/// Where forward candidates come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Only pairs in the effect-edge graph.
    EffectEdges,
    /// Pairs two steps apart that do not meet at a definite collider.
    CoverNoncolliders,
    /// Every d-connected pair.
    AllowUnfaithfulness,
}

/// K best graphs seen so far, best first; earlier captures win ties.
#[derive(Debug, Default)]
struct TopGraphs {
    capacity: usize,
    graphs: Vec<ScoredGraph>,
}

impl TopGraphs {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            graphs: Vec::with_capacity(capacity),
        }
    }

    fn record(&mut self, graph: &Graph, score: f64) {
        if self.capacity == 0 {
            return;
        }
        let at = self.graphs.partition_point(|g| g.score >= score);
        if at >= self.capacity {
            return;
        }
        self.graphs.insert(
            at,
            ScoredGraph {
                graph: graph.clone(),
                score,
            },
        );
        self.graphs.truncate(self.capacity);
    }
}

/// Undirected neighbors and parents of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Neighborhood {
    undirected: NodeSet,
    parents: NodeSet,
}

/// State of one `search()` call.
struct SearchSession<'a> {
    score: &'a dyn ScoreOracle,
    config: &'a SearchConfig,
    pool: &'a WorkerPool,
    knowledge: KnowledgeIndex,
    /// Measured variables, the only nodes the search connects.
    nodes: Vec<NodeId>,
    graph: Graph,
    effect_edges: Graph,
    /// Unordered pairs deleted by a backward phase.
    removed_edges: FxHashSet<(NodeId, NodeId)>,
    queue: CandidateQueue,
    /// Neighborhood of each node when it was last evaluated.
    snapshots: Vec<Option<Neighborhood>>,
    no_more_parents: Vec<bool>,
    mode: Mode,
    max_degree: usize,
    max_subset: usize,
    total_score: f64,
    top_graphs: TopGraphs,
    edge_log: Vec<EdgeLogEntry>,
    generated: AtomicUsize,
    stats: SearchStats,
    started: Instant,
}

impl<'a> SearchSession<'a> {
    fn new(
        score: &'a dyn ScoreOracle,
        config: &'a SearchConfig,
        pool: &'a WorkerPool,
    ) -> Result<Self, SearchError> {
        let variables = score.variables();
        let graph = match &config.initial_graph {
            Some(initial) => initial.clone(),
            None => Graph::new(variables.to_vec())?,
        };
        let knowledge = KnowledgeIndex::resolve(config.knowledge.as_deref(), variables)?;
        let nodes = variables
            .iter()
            .filter(|v| v.is_measured())
            .map(|v| v.id)
            .collect();
        let max_degree = match config.max_degree {
            -1 => score.suggested_max_degree(),
            d => d,
        };
        let n = variables.len();

        Ok(Self {
            score,
            config,
            pool,
            knowledge,
            nodes,
            effect_edges: graph.empty_like(),
            graph,
            removed_edges: FxHashSet::default(),
            queue: CandidateQueue::new(),
            snapshots: vec![None; n],
            no_more_parents: vec![false; n],
            mode: Mode::EffectEdges,
            max_degree: usize::try_from(max_degree).unwrap_or(usize::MAX),
            max_subset: usize::try_from(config.depth).unwrap_or(usize::MAX),
            total_score: 0.0,
            top_graphs: TopGraphs::new(usize::try_from(config.num_top_graphs_to_store).unwrap_or(0)),
            edge_log: Vec::new(),
            generated: AtomicUsize::new(0),
            stats: SearchStats::default(),
            started: Instant::now(),
        })
    }

    fn run(mut self) -> Result<SearchOutcome, SearchError> {
        #[cfg(feature = "tracing")]
        tracing::info!(
            variables = self.nodes.len(),
            parallelism = self.pool.parallelism(),
            "starting search"
        );

        self.add_required_edges()?;
        self.initialize_effect_edges()?;
        self.forward()?;
        self.backward()?;
        if self.is_cancelled() {
            return Ok(self.finish());
        }

        if self.config.faithfulness_assumed {
            self.mode = Mode::CoverNoncolliders;
        } else {
            self.mode = Mode::AllowUnfaithfulness;
        }
        self.reseed_forward();
        self.forward()?;
        self.backward()?;
        Ok(self.finish())
    }

    fn run_backward_only(mut self) -> Result<SearchOutcome, SearchError> {
        self.backward()?;
        Ok(self.finish())
    }

    fn is_cancelled(&self) -> bool {
        self.config.cancellation.is_cancelled()
    }

    fn finish(mut self) -> SearchOutcome {
        let cancelled = self.is_cancelled();
        let model_score = if cancelled {
            None
        } else {
            dag_from_pattern(&self.graph)
                .and_then(|dag| score_dag(self.score, &dag))
                .ok()
        };
        self.stats.candidates_generated = self.generated.load(Ordering::Relaxed);
        self.stats.elapsed = self.started.elapsed();

        #[cfg(feature = "tracing")]
        tracing::info!(
            edges = self.graph.num_edges(),
            total_score = self.total_score,
            cancelled,
            elapsed_ms = self.stats.elapsed.as_millis() as u64,
            "search finished"
        );

        SearchOutcome {
            graph: self.graph,
            total_score: self.total_score,
            model_score,
            top_graphs: self.top_graphs.graphs,
            edge_log: self.edge_log,
            cancelled,
            stats: self.stats,
        }
    }

    /// Seeds required edges and reverses forbidden orientations.
    fn add_required_edges(&mut self) -> Result<(), SearchError> {
        if self.knowledge.is_empty() {
            return Ok(());
        }
        for &(from, to) in self.knowledge.required_edges() {
            if self.graph.is_parent_of(from, to) {
                continue;
            }
            if !self.graph.is_ancestor_of(to, from) {
                self.graph.set_directed(from, to)?;
            }
        }

        let edges: Vec<Edge> = self.graph.edges().collect();
        for edge in edges {
            let (a, b) = edge.nodes();
            for (from, to) in [(a, b), (b, a)] {
                if !self.knowledge.is_forbidden(from, to)
                    || self.knowledge.is_forbidden(to, from)
                    || self.graph.is_parent_of(to, from)
                {
                    continue;
                }
                let Some(original) = self.graph.remove_edge(from, to) else {
                    continue;
                };
                if self.graph.is_ancestor_of(from, to) {
                    self.graph.add_edge(original)?;
                } else {
                    self.graph.add_directed(to, from)?;
                }
            }
        }
        Ok(())
    }

    /// Undirected neighbors of `y` that are adjacent to `x`.
    fn na_yx(&self, x: NodeId, y: NodeId) -> NodeSet {
        self.graph
            .neighbors_undirected(y)
            .into_iter()
            .filter(|&z| z != x && self.graph.is_adjacent(z, x))
            .collect()
    }

    /// Undirected neighbors of `y` that are not adjacent to `x`.
    fn t_neighbors(&self, x: NodeId, y: NodeId) -> NodeSet {
        self.graph
            .neighbors_undirected(y)
            .into_iter()
            .filter(|&z| z != x && !self.graph.is_adjacent(z, x))
            .collect()
    }

    /// Graph state an Insert(x, y, T) bump is computed against.
    fn insert_context(&self, x: NodeId, y: NodeId) -> CandidateContext {
        CandidateContext {
            na_yx: self.na_yx(x, y),
            t_neighbors: self.t_neighbors(x, y),
            parents: self.graph.parents(y),
        }
    }

    /// Graph state a Delete(x, y, H) bump is computed against.
    fn delete_context(&self, x: NodeId, y: NodeId) -> CandidateContext {
        CandidateContext {
            na_yx: self.na_yx(x, y),
            t_neighbors: NodeSet::new(),
            parents: self.graph.parents(y),
        }
    }

    fn allowed_by_restriction(&self, a: NodeId, b: NodeId) -> bool {
        self.config
            .adjacency_restriction
            .as_ref()
            .map_or(true, |g| g.is_adjacent(a, b))
    }

    fn neighborhood(&self, node: NodeId) -> Neighborhood {
        Neighborhood {
            undirected: self.graph.neighbors_undirected(node),
            parents: self.graph.parents(node),
        }
    }

    fn neighbors_changed(&self, node: NodeId) -> bool {
        self.snapshots[node.index()].as_ref() != Some(&self.neighborhood(node))
    }

    fn record_snapshots(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        for node in nodes {
            self.snapshots[node.index()] = Some(self.neighborhood(node));
        }
    }

    /// Re-runs orientation propagation around `frontier`.
    fn reapply_orientation(&mut self, frontier: &[NodeId]) -> Result<BTreeSet<NodeId>, SearchError> {
        self.stats.meek_runs += 1;
        let outcome = MeekRules::new(&self.knowledge)
            .undirect_unforced_edges(true)
            .orient_implied(&mut self.graph, frontier)?;
        Ok(outcome.visited)
    }

    /// Accounts for an applied operator.
    fn record_operator(&mut self, phase: Phase, operation: Operation, edge: Edge, bump: f64) {
        self.total_score += bump;
        match operation {
            Operation::Insert => self.stats.inserts += 1,
            Operation::Delete => self.stats.deletes += 1,
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            ?phase,
            ?operation,
            edge = %self.graph.edge_label(&edge),
            bump,
            total_score = self.total_score,
            "applied operator"
        );

        if self.config.record_edge_log {
            self.edge_log.push(EdgeLogEntry {
                phase,
                operation,
                edge,
                bump,
                total_score: self.total_score,
            });
        }
        self.top_graphs.record(&self.graph, self.total_score);
    }

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn discard_stale(&mut self, candidate: &Candidate, reason: &'static str) {
        self.stats.stale_candidates += 1;
        #[cfg(feature = "tracing")]
        tracing::trace!(
            source = self.graph.name(candidate.source),
            target = self.graph.name(candidate.target),
            bump = candidate.bump,
            reason,
            "discarded stale candidate"
        );
    }

    fn count_generated(&self, n: usize) {
        self.generated.fetch_add(n, Ordering::Relaxed);
    }
}

/// Unordered key for a node pair.
fn pair_key(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
