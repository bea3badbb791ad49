//! Benchmarks comparing sequential and parallel search on random DAGs.
//!
//! Run with: cargo bench --features parallel --bench search_scaling

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fges_core::engine::graph::measured_variables;
use fges_core::{search, DSeparationScore, Graph, NodeId, SearchConfig};
use std::time::Duration;

/// Random DAG with roughly `avg_degree` edges per node, from a fixed seed.
fn random_dag(num_nodes: usize, avg_degree: f64, seed: u64) -> Graph {
    let names: Vec<String> = (0..num_nodes).map(|i| format!("X{i}")).collect();
    let mut g = Graph::new(measured_variables(names)).unwrap();
    let p = avg_degree / (num_nodes as f64 - 1.0);
    let mut state = seed;
    for i in 0..num_nodes {
        for j in i + 1..num_nodes {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let unit = ((state >> 11) as f64) / ((u64::MAX >> 11) as f64);
            if unit < p {
                g.add_directed(NodeId::from(i), NodeId::from(j)).unwrap();
            }
        }
    }
    g
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("fges_search");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(10);

    for &num_nodes in &[10_usize, 20, 40] {
        let oracle = DSeparationScore::new(random_dag(num_nodes, 2.0, num_nodes as u64)).unwrap();

        group.bench_with_input(
            BenchmarkId::new("sequential", num_nodes),
            &oracle,
            |b, oracle| {
                let config = SearchConfig::sequential();
                b.iter(|| black_box(search(black_box(oracle), &config).unwrap()));
            },
        );

        #[cfg(feature = "parallel")]
        group.bench_with_input(
            BenchmarkId::new("parallel", num_nodes),
            &oracle,
            |b, oracle| {
                let config = SearchConfig {
                    min_chunk_size: 2,
                    ..SearchConfig::default()
                };
                b.iter(|| black_box(search(black_box(oracle), &config).unwrap()));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
