//! # FGES Core
//!
//! Fast greedy equivalence search: learns a CPDAG over a set of variables by
//! greedily inserting and then deleting edges under a decomposable score,
//! with candidate scoring spread over an owned worker pool.
//!
//! ```
//! use fges_core::{search, to_pattern, DSeparationScore, Graph, SearchConfig};
//! use fges_core::engine::graph::measured_variables;
//!
//! let vars = measured_variables(["X", "Y", "Z"]);
//! let truth = Graph::from_edge_list(vars, "X-->Y,Y-->Z").unwrap();
//! let oracle = DSeparationScore::new(truth.clone()).unwrap();
//!
//! let outcome = search(&oracle, &SearchConfig::sequential()).unwrap();
//! assert_eq!(outcome.graph, to_pattern(&truth).unwrap());
//! ```

#![forbid(unsafe_code)]

pub mod engine;

// Re-export commonly used types
pub use engine::config::SearchConfig;
pub use engine::coordinator::{CancellationToken, WorkerPool};
pub use engine::errors::SearchError;
pub use engine::graph::{Edge, Endpoint, Graph, NodeId, Variable};
pub use engine::knowledge::{EdgeKnowledge, Knowledge};
pub use engine::oracle::DSeparationScore;
pub use engine::pattern::{dag_from_pattern, to_pattern};
pub use engine::score::{edge_bayes_factors, score_dag, ScoreOracle};
pub use engine::search::{backward_search, search, search_with_pool, SearchOutcome};
