//! Repeatability and parallel/sequential agreement.

mod common;

use common::SemBicScore;
use fges_core::{search, SearchConfig};

fn eight_node_model() -> SemBicScore {
    SemBicScore::new(
        &["V0", "V1", "V2", "V3", "V4", "V5", "V6", "V7"],
        &[
            ("V0", "V2", 0.9),
            ("V1", "V2", -0.7),
            ("V2", "V3", 0.6),
            ("V1", "V4", 0.5),
            ("V3", "V5", 0.8),
            ("V4", "V5", 0.4),
            ("V5", "V6", -0.6),
            ("V3", "V7", 0.7),
            ("V6", "V7", 0.5),
        ],
    )
}

fn logged(parallelism: i32) -> SearchConfig {
    SearchConfig {
        parallelism,
        min_chunk_size: 1,
        record_edge_log: true,
        num_top_graphs_to_store: 3,
        ..SearchConfig::default()
    }
}

#[test]
fn sequential_runs_are_identical() {
    let score = eight_node_model();
    let first = search(&score, &logged(1)).unwrap();
    let second = search(&score, &logged(1)).unwrap();

    assert_eq!(first.graph, second.graph);
    assert_eq!(first.graph.to_string(), second.graph.to_string());
    assert_eq!(first.total_score.to_bits(), second.total_score.to_bits());
    assert_eq!(first.edge_log, second.edge_log);
    assert_eq!(first.top_graphs, second.top_graphs);
}

#[test]
fn parallel_run_is_well_formed() {
    let score = eight_node_model();
    let outcome = search(&score, &logged(4)).unwrap();

    assert!(!outcome.cancelled);
    assert!(!outcome.graph.has_directed_cycle());
    assert!(outcome.edge_log.iter().all(|e| e.bump > 0.0));
    let sum: f64 = outcome.edge_log.iter().map(|e| e.bump).sum();
    assert!((sum - outcome.total_score).abs() < 1e-6);
}

#[test]
fn parallel_chain_matches_sequential() {
    let score = SemBicScore::new(&["X", "Y", "Z"], &[("X", "Y", 0.8), ("Y", "Z", 0.8)]);
    let sequential = search(&score, &logged(1)).unwrap();
    let parallel = search(&score, &logged(4)).unwrap();
    assert_eq!(sequential.graph, parallel.graph);
    assert!((sequential.total_score - parallel.total_score).abs() < 1e-9);
}
