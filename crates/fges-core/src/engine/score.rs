//! Score oracle interface and whole-DAG scoring helpers.
//!
//! The search core only ever talks to a [`ScoreOracle`]: it never inspects
//! which concrete scorer (BIC, BDeu, SEM likelihood, a test oracle) is bound.
//! Oracles must be safe for concurrent read-only calls since candidate
//! generation runs on the worker pool.

use crate::engine::errors::SearchError;
use crate::engine::graph::{Edge, Graph, NodeId, NodeSet, Variable};

/// Decomposable score over `(target, parent set)` pairs.
pub trait ScoreOracle: Send + Sync {
    /// Variables scored by this oracle; ids equal positions.
    fn variables(&self) -> &[Variable];

    /// Score of `target` given `parents`. May return NaN when the oracle
    /// cannot evaluate the family (e.g., a singular covariance block).
    fn local_score(&self, target: NodeId, parents: &[NodeId]) -> f64;

    /// Change in `target`'s score when `parent` is added to
    /// `existing_parents`.
    fn local_score_diff(&self, parent: NodeId, target: NodeId, existing_parents: &[NodeId]) -> f64 {
        let mut extended: NodeSet = existing_parents.iter().copied().collect();
        extended.push(parent);
        extended.sort_unstable();
        self.local_score(target, &extended) - self.local_score(target, existing_parents)
    }

    /// Degree cap suggested by the oracle, or `-1` for none.
    fn suggested_max_degree(&self) -> i32 {
        -1
    }
}

fn require_dag(dag: &Graph) -> Result<(), SearchError> {
    if let Some(edge) = dag.edges().find(|e| !e.is_directed()) {
        return Err(SearchError::Graph(format!(
            "expected a DAG, found {}",
            dag.edge_label(&edge)
        )));
    }
    if dag.has_directed_cycle() {
        return Err(SearchError::Graph("expected a DAG, found a directed cycle".into()));
    }
    Ok(())
}

/// Sum of local scores of every node given its parents in `dag`.
pub fn score_dag(oracle: &dyn ScoreOracle, dag: &Graph) -> Result<f64, SearchError> {
    require_dag(dag)?;
    Ok(dag
        .node_ids()
        .map(|node| oracle.local_score(node, &dag.parents(node)))
        .sum())
}

/// Log Bayes factor attributed to one edge of a DAG.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeBayesFactor {
    pub edge: Edge,
    /// Score of the DAG minus the score of the DAG without `edge`.
    pub factor: f64,
}

/// Per-edge log Bayes factors of `dag`, strongest first.
///
/// Only the child's family changes when an edge is removed, so each factor
/// is a single local-score difference.
pub fn edge_bayes_factors(
    oracle: &dyn ScoreOracle,
    dag: &Graph,
) -> Result<Vec<EdgeBayesFactor>, SearchError> {
    require_dag(dag)?;
    let mut factors: Vec<EdgeBayesFactor> = dag
        .edges()
        .filter_map(|edge| {
            let (parent, child) = edge.direction()?;
            let parents = dag.parents(child);
            let without: NodeSet = parents.iter().copied().filter(|&p| p != parent).collect();
            let factor = oracle.local_score(child, &parents) - oracle.local_score(child, &without);
            Some(EdgeBayesFactor { edge, factor })
        })
        .collect();
    factors.sort_by(|a, b| b.factor.total_cmp(&a.factor));
    Ok(factors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::measured_variables;

    /// Scores each parent with a fixed weight minus a per-parent penalty.
    struct WeightedScore {
        variables: Vec<Variable>,
        weights: Vec<Vec<f64>>,
    }

    impl ScoreOracle for WeightedScore {
        fn variables(&self) -> &[Variable] {
            &self.variables
        }

        fn local_score(&self, target: NodeId, parents: &[NodeId]) -> f64 {
            parents
                .iter()
                .map(|p| self.weights[p.index()][target.index()] - 1.0)
                .sum()
        }
    }

    fn oracle() -> WeightedScore {
        WeightedScore {
            variables: measured_variables(["A", "B", "C"]),
            weights: vec![
                vec![0.0, 5.0, 2.0],
                vec![5.0, 0.0, 3.0],
                vec![2.0, 3.0, 0.0],
            ],
        }
    }

    #[test]
    fn default_diff_is_difference_of_local_scores() {
        let s = oracle();
        let diff = s.local_score_diff(NodeId(0), NodeId(2), &[NodeId(1)]);
        assert!((diff - 1.0).abs() < 1e-12);
    }

    #[test]
    fn score_dag_sums_families() {
        let s = oracle();
        let dag = Graph::from_edge_list(s.variables().to_vec(), "A-->B,B-->C").unwrap();
        assert!((score_dag(&s, &dag).unwrap() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn score_dag_rejects_patterns() {
        let s = oracle();
        let pattern = Graph::from_edge_list(s.variables().to_vec(), "A---B").unwrap();
        assert!(matches!(score_dag(&s, &pattern), Err(SearchError::Graph(_))));
    }

    #[test]
    fn bayes_factors_sorted_strongest_first() {
        let s = oracle();
        let dag = Graph::from_edge_list(s.variables().to_vec(), "A-->C,B-->C,A-->B").unwrap();
        let factors = edge_bayes_factors(&s, &dag).unwrap();
        let values: Vec<f64> = factors.iter().map(|f| f.factor).collect();
        assert_eq!(values, vec![4.0, 2.0, 1.0]);
        assert_eq!(factors[0].edge, Edge::directed(NodeId(0), NodeId(1)));
    }
}
