//! Search configuration.

use std::fmt;
use std::sync::Arc;

use crate::engine::coordinator::CancellationToken;
use crate::engine::errors::SearchError;
use crate::engine::graph::{Graph, Variable};
use crate::engine::knowledge::Knowledge;

/// Default number of items a worker takes per chunk.
pub const DEFAULT_MIN_CHUNK: usize = 16;

/// Configuration for one `search()` call.
#[derive(Clone)]
pub struct SearchConfig {
    /// Graph to start from instead of the empty graph.
    pub initial_graph: Option<Graph>,
    /// Pairs not adjacent here are never inserted.
    pub bound_graph: Option<Graph>,
    /// Pairs not adjacent here are never considered as candidates.
    pub adjacency_restriction: Option<Graph>,
    /// Maximum node degree; `-1` defers to the oracle's suggestion.
    pub max_degree: i32,
    /// Longest semi-directed path checked when validating an insert; `-1`
    /// for no bound.
    pub cycle_bound: i32,
    /// Second pass covers non-colliders instead of scanning every
    /// d-connected pair.
    pub faithfulness_assumed: bool,
    /// Seed effect edges from the larger of the two directional bumps.
    pub symmetric_first_step: bool,
    /// Worker threads used for candidate generation.
    pub parallelism: i32,
    /// Number of best intermediate graphs to keep.
    pub num_top_graphs_to_store: i32,
    /// Largest T subset tried per insert candidate; `-1` for no cap.
    pub depth: i32,
    /// Record every applied operator in the outcome's edge log.
    pub record_edge_log: bool,
    /// Minimum items per worker chunk.
    pub min_chunk_size: usize,
    /// Forbidden and required edges.
    pub knowledge: Option<Arc<dyn Knowledge>>,
    /// Checked between operators and between chunk items.
    pub cancellation: CancellationToken,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            initial_graph: None,
            bound_graph: None,
            adjacency_restriction: None,
            max_degree: -1,
            cycle_bound: -1,
            faithfulness_assumed: true,
            symmetric_first_step: false,
            parallelism: i32::try_from(num_cpus::get()).unwrap_or(i32::MAX),
            num_top_graphs_to_store: 0,
            depth: -1,
            record_edge_log: false,
            min_chunk_size: DEFAULT_MIN_CHUNK,
            knowledge: None,
            cancellation: CancellationToken::new(),
        }
    }
}

impl fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchConfig")
            .field("initial_graph", &self.initial_graph.as_ref().map(Graph::num_edges))
            .field("bound_graph", &self.bound_graph.as_ref().map(Graph::num_edges))
            .field(
                "adjacency_restriction",
                &self.adjacency_restriction.as_ref().map(Graph::num_edges),
            )
            .field("max_degree", &self.max_degree)
            .field("cycle_bound", &self.cycle_bound)
            .field("faithfulness_assumed", &self.faithfulness_assumed)
            .field("symmetric_first_step", &self.symmetric_first_step)
            .field("parallelism", &self.parallelism)
            .field("num_top_graphs_to_store", &self.num_top_graphs_to_store)
            .field("depth", &self.depth)
            .field("record_edge_log", &self.record_edge_log)
            .field("min_chunk_size", &self.min_chunk_size)
            .field("knowledge", &self.knowledge)
            .finish_non_exhaustive()
    }
}

impl SearchConfig {
    /// Single-threaded configuration; runs are fully deterministic.
    pub fn sequential() -> Self {
        Self {
            parallelism: 1,
            ..Self::default()
        }
    }

    /// Checks every field against the oracle's `variables`.
    pub fn validate(&self, variables: &[Variable]) -> Result<(), SearchError> {
        if self.max_degree < -1 {
            return Err(SearchError::InvalidConfig(
                "search: max_degree must be -1 (unbounded) or >= 0".into(),
            ));
        }
        if self.cycle_bound == 0 || self.cycle_bound < -1 {
            return Err(SearchError::InvalidConfig(
                "search: cycle_bound must be -1 (unbounded) or >= 1".into(),
            ));
        }
        if self.parallelism < 1 {
            return Err(SearchError::InvalidConfig(
                "search: parallelism must be >= 1".into(),
            ));
        }
        if self.num_top_graphs_to_store < 0 {
            return Err(SearchError::InvalidConfig(
                "search: num_top_graphs_to_store must be >= 0".into(),
            ));
        }
        if self.depth < -1 {
            return Err(SearchError::InvalidConfig(
                "search: depth must be -1 (unbounded) or >= 0".into(),
            ));
        }
        if self.min_chunk_size == 0 {
            return Err(SearchError::InvalidConfig(
                "search: min_chunk_size must be >= 1".into(),
            ));
        }
        if variables.is_empty() {
            return Err(SearchError::VariableMismatch(
                "search: the score oracle has no variables".into(),
            ));
        }
        let graphs = [
            ("initial_graph", &self.initial_graph),
            ("bound_graph", &self.bound_graph),
            ("adjacency_restriction", &self.adjacency_restriction),
        ];
        for (field, graph) in graphs {
            if let Some(graph) = graph {
                if !graph.has_variables(variables) {
                    return Err(SearchError::VariableMismatch(format!(
                        "search: {field} is not defined over the oracle's variables"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::measured_variables;

    #[test]
    fn default_config_is_valid() {
        let vars = measured_variables(["A", "B"]);
        SearchConfig::default().validate(&vars).unwrap();
        assert!(SearchConfig::default().parallelism >= 1);
    }

    #[test]
    fn rejects_bad_bounds() {
        let vars = measured_variables(["A", "B"]);
        for config in [
            SearchConfig { max_degree: -2, ..SearchConfig::sequential() },
            SearchConfig { cycle_bound: 0, ..SearchConfig::sequential() },
            SearchConfig { cycle_bound: -5, ..SearchConfig::sequential() },
            SearchConfig { parallelism: 0, ..SearchConfig::sequential() },
            SearchConfig { num_top_graphs_to_store: -1, ..SearchConfig::sequential() },
            SearchConfig { depth: -3, ..SearchConfig::sequential() },
        ] {
            assert!(
                matches!(config.validate(&vars), Err(SearchError::InvalidConfig(_))),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn accepts_bound_edges_of_range() {
        let vars = measured_variables(["A"]);
        let config = SearchConfig {
            max_degree: 0,
            cycle_bound: 1,
            ..SearchConfig::sequential()
        };
        config.validate(&vars).unwrap();
    }

    #[test]
    fn rejects_graph_over_other_variables() {
        let vars = measured_variables(["A", "B"]);
        let other = Graph::new(measured_variables(["A", "C"])).unwrap();
        let config = SearchConfig {
            initial_graph: Some(other),
            ..SearchConfig::sequential()
        };
        assert!(matches!(
            config.validate(&vars),
            Err(SearchError::VariableMismatch(_))
        ));
    }
}
