//! Background knowledge honored by the search.

mod common;

use std::sync::Arc;

use common::{graph, SemBicScore};
use fges_core::{search, DSeparationScore, EdgeKnowledge, SearchConfig, SearchError};

fn chain() -> SemBicScore {
    SemBicScore::new(&["X", "Y", "Z"], &[("X", "Y", 0.8), ("Y", "Z", 0.8)])
}

fn with_knowledge(knowledge: EdgeKnowledge) -> SearchConfig {
    SearchConfig {
        knowledge: Some(Arc::new(knowledge)),
        ..SearchConfig::sequential()
    }
}

#[test]
fn tiers_orient_edge_forward_in_time() {
    let oracle = DSeparationScore::new(graph(&["A", "B"], "A-->B")).unwrap();
    let mut knowledge = EdgeKnowledge::new();
    knowledge.add_to_tier(1, ["A"]);
    knowledge.add_to_tier(2, ["B"]);

    let outcome = search(&oracle, &with_knowledge(knowledge)).unwrap();
    assert_eq!(outcome.graph.to_string(), "A --> B");
}

#[test]
fn forbidden_directions_orient_the_chain() {
    let mut knowledge = EdgeKnowledge::new();
    knowledge.set_forbidden("Y", "X").unwrap();
    knowledge.set_forbidden("Z", "Y").unwrap();

    let outcome = search(&chain(), &with_knowledge(knowledge)).unwrap();
    assert_eq!(outcome.graph.to_string(), "X --> Y, Y --> Z");
}

#[test]
fn pair_forbidden_both_ways_is_never_adjacent() {
    let mut knowledge = EdgeKnowledge::new();
    knowledge.set_forbidden("X", "Y").unwrap();
    knowledge.set_forbidden("Y", "X").unwrap();

    let outcome = search(&chain(), &with_knowledge(knowledge)).unwrap();
    let g = &outcome.graph;
    let (x, y) = (g.node_by_name("X").unwrap(), g.node_by_name("Y").unwrap());
    assert!(!g.is_adjacent(x, y));
}

#[test]
fn required_edge_survives_search() {
    let mut knowledge = EdgeKnowledge::new();
    knowledge.set_required("Z", "X").unwrap();

    let outcome = search(&chain(), &with_knowledge(knowledge)).unwrap();
    let g = &outcome.graph;
    let (x, z) = (g.node_by_name("X").unwrap(), g.node_by_name("Z").unwrap());
    assert!(g.is_parent_of(z, x));
}

#[test]
fn required_edge_on_unknown_variable_is_rejected() {
    let mut knowledge = EdgeKnowledge::new();
    knowledge.set_required("X", "Q").unwrap();

    assert!(matches!(
        search(&chain(), &with_knowledge(knowledge)),
        Err(SearchError::VariableMismatch(_))
    ));
}

#[test]
fn required_edge_against_tiers_is_rejected() {
    let mut knowledge = EdgeKnowledge::new();
    knowledge.set_required("Y", "X").unwrap();
    knowledge.add_to_tier(1, ["X"]);
    knowledge.add_to_tier(2, ["Y"]);

    assert!(matches!(
        search(&chain(), &with_knowledge(knowledge)),
        Err(SearchError::Knowledge(_))
    ));
}
