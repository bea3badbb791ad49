//! Score oracle backed by a known generating DAG.
//!
//! Adding parent `x` to `y` given `Z` scores `+1` when `x` and `y` are
//! d-connected given `Z` in the DAG and `-1` otherwise. Under that oracle a
//! correct search recovers exactly the pattern of the generating DAG, which
//! makes it the reference scorer for validating search behavior.

use crate::engine::errors::SearchError;
use crate::engine::graph::{Graph, NodeId, NodeSet, Variable};
use crate::engine::score::ScoreOracle;

#[derive(Debug, Clone)]
pub struct DSeparationScore {
    dag: Graph,
}

impl DSeparationScore {
    /// Wraps `dag`; fails if it has undirected edges or a directed cycle.
    pub fn new(dag: Graph) -> Result<Self, SearchError> {
        if dag.edges().any(|e| !e.is_directed()) || dag.has_directed_cycle() {
            return Err(SearchError::Graph(
                "d-separation oracle needs a directed acyclic graph".into(),
            ));
        }
        Ok(Self { dag })
    }

    pub fn dag(&self) -> &Graph {
        &self.dag
    }
}

impl ScoreOracle for DSeparationScore {
    fn variables(&self) -> &[Variable] {
        self.dag.variables()
    }

    /// Counts parents that are dependent on `target` given the other
    /// parents, minus those that are not.
    fn local_score(&self, target: NodeId, parents: &[NodeId]) -> f64 {
        parents
            .iter()
            .map(|&p| {
                let rest: NodeSet = parents.iter().copied().filter(|&q| q != p).collect();
                self.local_score_diff(p, target, &rest)
            })
            .sum()
    }

    fn local_score_diff(&self, parent: NodeId, target: NodeId, existing_parents: &[NodeId]) -> f64 {
        if self.dag.is_d_separated(parent, target, existing_parents) {
            -1.0
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::measured_variables;

    #[test]
    fn diff_follows_d_separation() {
        let dag = Graph::from_edge_list(measured_variables(["X", "Y", "Z"]), "X-->Y,Y-->Z").unwrap();
        let score = DSeparationScore::new(dag).unwrap();
        assert_eq!(score.local_score_diff(NodeId(0), NodeId(2), &[]), 1.0);
        assert_eq!(score.local_score_diff(NodeId(0), NodeId(2), &[NodeId(1)]), -1.0);
    }

    #[test]
    fn rejects_patterns() {
        let g = Graph::from_edge_list(measured_variables(["X", "Y"]), "X---Y").unwrap();
        assert!(DSeparationScore::new(g).is_err());
    }
}
