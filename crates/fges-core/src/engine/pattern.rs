//! Conversions between DAGs and their patterns (CPDAGs).

use crate::engine::errors::SearchError;
use crate::engine::graph::{Graph, NodeId, NodeSet};
use crate::engine::knowledge::KnowledgeIndex;
use crate::engine::meek::MeekRules;

/// The pattern of `dag`: its skeleton with unshielded colliders oriented,
/// closed under Meek's rules.
pub fn to_pattern(dag: &Graph) -> Result<Graph, SearchError> {
    if dag.edges().any(|e| !e.is_directed()) || dag.has_directed_cycle() {
        return Err(SearchError::Graph("to_pattern expects a DAG".into()));
    }
    let mut pattern = dag.empty_like();
    for edge in dag.edges() {
        let (a, b) = edge.nodes();
        pattern.add_undirected(a, b)?;
    }
    for child in dag.node_ids() {
        let parents = dag.parents(child);
        for (i, &a) in parents.iter().enumerate() {
            for &c in &parents[i + 1..] {
                if !dag.is_adjacent(a, c) {
                    pattern.set_directed(a, child)?;
                    pattern.set_directed(c, child)?;
                }
            }
        }
    }
    let knowledge = KnowledgeIndex::empty();
    let nodes: Vec<NodeId> = pattern.node_ids().collect();
    MeekRules::new(&knowledge).orient_implied(&mut pattern, &nodes)?;
    Ok(pattern)
}

/// A DAG in the equivalence class of `pattern` (Dor and Tarsi).
///
/// Repeatedly picks a sink whose undirected neighbors are adjacent to all
/// of its other adjacents, points those undirected edges into it and drops
/// it. Fails when no such node exists, i.e. the pattern has no consistent
/// extension.
pub fn dag_from_pattern(pattern: &Graph) -> Result<Graph, SearchError> {
    if pattern.edges().any(|e| !e.is_directed() && !e.is_undirected()) {
        return Err(SearchError::Graph(
            "dag_from_pattern expects directed and undirected edges only".into(),
        ));
    }
    let mut dag = pattern.clone();
    let mut work = pattern.clone();
    let mut remaining: Vec<NodeId> = pattern.node_ids().collect();

    while !remaining.is_empty() {
        let pick = remaining.iter().position(|&x| {
            if !work.children(x).is_empty() {
                return false;
            }
            let adjacent: NodeSet = work.adjacent_nodes(x).collect();
            work.neighbors_undirected(x).iter().all(|&y| {
                adjacent
                    .iter()
                    .all(|&z| z == y || work.is_adjacent(y, z))
            })
        });
        let Some(pos) = pick else {
            return Err(SearchError::Graph(
                "pattern has no consistent DAG extension".into(),
            ));
        };
        let x = remaining.remove(pos);
        for y in work.neighbors_undirected(x) {
            dag.set_directed(y, x)?;
        }
        work.isolate(x);
    }

    if dag.has_directed_cycle() {
        return Err(SearchError::Internal(
            "DAG extension produced a directed cycle".into(),
        ));
    }
    Ok(dag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::measured_variables;

    fn build(names: &[&str], edges: &str) -> Graph {
        Graph::from_edge_list(measured_variables(names.iter().copied()), edges).unwrap()
    }

    #[test]
    fn pattern_of_chain_is_undirected() {
        let dag = build(&["X", "Y", "Z"], "X-->Y,Y-->Z");
        assert_eq!(to_pattern(&dag).unwrap().to_string(), "X --- Y, Y --- Z");
    }

    #[test]
    fn pattern_keeps_collider_and_propagates() {
        let names = ["X1", "X2", "X3", "X4", "X5"];
        let dag = build(&names, "X1-->X3,X2-->X3,X3-->X4,X4-->X5");
        let pattern = to_pattern(&dag).unwrap();
        assert_eq!(
            pattern.to_string(),
            "X1 --> X3, X2 --> X3, X3 --> X4, X4 --> X5"
        );
    }

    #[test]
    fn diamond_pattern() {
        let dag = build(&["X1", "X2", "X3", "X4"], "X1-->X2,X1-->X3,X2-->X4,X3-->X4");
        assert_eq!(
            to_pattern(&dag).unwrap().to_string(),
            "X1 --- X2, X1 --- X3, X2 --> X4, X3 --> X4"
        );
    }

    #[test]
    fn extension_round_trips_to_same_pattern() {
        let dag = build(&["A", "B", "C", "D", "E"], "A-->D,A-->B,B-->D,C-->D,D-->E");
        let pattern = to_pattern(&dag).unwrap();
        let extension = dag_from_pattern(&pattern).unwrap();
        assert!(extension.edges().all(|e| e.is_directed()));
        assert_eq!(to_pattern(&extension).unwrap(), pattern);
    }

    #[test]
    fn unextendable_pattern_is_rejected() {
        // A 4-cycle of undirected edges has no extension without a new collider.
        let g = build(&["A", "B", "C", "D"], "A---B,B---C,C---D,D---A");
        assert!(dag_from_pattern(&g).is_err());
    }
}
