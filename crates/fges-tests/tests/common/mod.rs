//! Shared oracles and helpers for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use fges_core::engine::graph::measured_variables;
use fges_core::{CancellationToken, Graph, NodeId, ScoreOracle, Variable};

/// Sample size the BIC oracle pretends to have seen.
pub const SAMPLE_SIZE: f64 = 1000.0;

/// Builds a graph over `names` from an edge list such as `"X-->Y,Y---Z"`.
pub fn graph(names: &[&str], edges: &str) -> Graph {
    Graph::from_edge_list(measured_variables(names.iter().copied()), edges).unwrap()
}

/// Unordered adjacencies of `g` as name pairs.
pub fn adjacencies(g: &Graph) -> Vec<(String, String)> {
    g.edges()
        .map(|e| {
            let (a, b) = e.nodes();
            (g.name(a).to_string(), g.name(b).to_string())
        })
        .collect()
}

/// Gaussian BIC score computed from the exact covariance implied by a
/// linear SEM with unit noise variances.
#[derive(Debug, Clone)]
pub struct SemBicScore {
    variables: Vec<Variable>,
    covariance: Vec<Vec<f64>>,
    penalty: f64,
}

impl SemBicScore {
    /// `names` must be listed in a topological order of `coefficients`,
    /// given as `(parent, child, weight)`.
    pub fn new(names: &[&str], coefficients: &[(&str, &str, f64)]) -> Self {
        let variables = measured_variables(names.iter().copied());
        let index = |name: &str| {
            names
                .iter()
                .position(|n| *n == name)
                .unwrap_or_else(|| panic!("unknown variable {name}"))
        };
        let n = names.len();
        let mut weights = vec![vec![0.0; n]; n];
        for &(parent, child, w) in coefficients {
            let (p, c) = (index(parent), index(child));
            assert!(p < c, "{parent} must precede {child}");
            weights[c][p] = w;
        }

        let mut cov = vec![vec![0.0; n]; n];
        for j in 0..n {
            for i in 0..j {
                let value: f64 = (0..j).map(|k| weights[j][k] * cov[i][k]).sum();
                cov[i][j] = value;
                cov[j][i] = value;
            }
            let explained: f64 = (0..j)
                .flat_map(|k| (0..j).map(move |l| (k, l)))
                .map(|(k, l)| weights[j][k] * weights[j][l] * cov[k][l])
                .sum();
            cov[j][j] = explained + 1.0;
        }

        Self {
            variables,
            covariance: cov,
            penalty: 1.0,
        }
    }

    /// Residual variance of `target` regressed on `parents`.
    fn residual_variance(&self, target: usize, parents: &[usize]) -> Option<f64> {
        let k = parents.len();
        let mut a: Vec<Vec<f64>> = parents
            .iter()
            .map(|&p| {
                let mut row: Vec<f64> = parents.iter().map(|&q| self.covariance[p][q]).collect();
                row.push(self.covariance[p][target]);
                row
            })
            .collect();
        // Gaussian elimination with partial pivoting on [S_PP | S_Pt].
        for col in 0..k {
            let pivot = (col..k)
                .max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))?;
            if a[pivot][col].abs() < 1e-12 {
                return None;
            }
            a.swap(col, pivot);
            for row in 0..k {
                if row != col {
                    let factor = a[row][col] / a[col][col];
                    for c in col..=k {
                        a[row][c] -= factor * a[col][c];
                    }
                }
            }
        }
        let explained: f64 = (0..k)
            .map(|i| self.covariance[target][parents[i]] * a[i][k] / a[i][i])
            .sum();
        Some(self.covariance[target][target] - explained)
    }
}

impl ScoreOracle for SemBicScore {
    fn variables(&self) -> &[Variable] {
        &self.variables
    }

    fn local_score(&self, target: NodeId, parents: &[NodeId]) -> f64 {
        let parents: Vec<usize> = parents.iter().map(|p| p.index()).collect();
        match self.residual_variance(target.index(), &parents) {
            Some(variance) if variance > 0.0 => {
                -SAMPLE_SIZE * variance.ln()
                    - self.penalty * parents.len() as f64 * SAMPLE_SIZE.ln()
            }
            _ => f64::NAN,
        }
    }
}

/// Wraps an oracle and cancels a token after a fixed number of delta calls.
#[derive(Debug)]
pub struct CancellingScore<S> {
    inner: S,
    token: CancellationToken,
    limit: usize,
    calls: AtomicUsize,
}

impl<S: ScoreOracle> CancellingScore<S> {
    pub fn new(inner: S, token: CancellationToken, limit: usize) -> Self {
        Self {
            inner,
            token,
            limit,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl<S: ScoreOracle> ScoreOracle for CancellingScore<S> {
    fn variables(&self) -> &[Variable] {
        self.inner.variables()
    }

    fn local_score(&self, target: NodeId, parents: &[NodeId]) -> f64 {
        self.inner.local_score(target, parents)
    }

    fn local_score_diff(&self, parent: NodeId, target: NodeId, existing_parents: &[NodeId]) -> f64 {
        if self.calls.fetch_add(1, Ordering::Relaxed) + 1 >= self.limit {
            self.token.cancel();
        }
        self.inner.local_score_diff(parent, target, existing_parents)
    }
}

/// Oracle that cannot evaluate any family with parents.
#[derive(Debug)]
pub struct DegenerateScore {
    variables: Vec<Variable>,
}

impl DegenerateScore {
    pub fn new(names: &[&str]) -> Self {
        Self {
            variables: measured_variables(names.iter().copied()),
        }
    }
}

impl ScoreOracle for DegenerateScore {
    fn variables(&self) -> &[Variable] {
        &self.variables
    }

    fn local_score(&self, _target: NodeId, parents: &[NodeId]) -> f64 {
        if parents.is_empty() {
            0.0
        } else {
            f64::NAN
        }
    }
}

/// Score that adds a fixed, symmetric weight per parent, less one per
/// parent. A DAG's score is therefore the sum of `weight - 1` over its
/// edges, whatever their orientation.
#[derive(Debug)]
pub struct AdditiveScore {
    variables: Vec<Variable>,
    weights: Vec<Vec<f64>>,
}

impl AdditiveScore {
    pub fn new(names: &[&str], weights: &[(&str, &str, f64)]) -> Self {
        let variables = measured_variables(names.iter().copied());
        let n = names.len();
        let mut table = vec![vec![0.0; n]; n];
        for &(a, b, w) in weights {
            let i = names.iter().position(|n| *n == a).unwrap();
            let j = names.iter().position(|n| *n == b).unwrap();
            table[i][j] = w;
            table[j][i] = w;
        }
        Self {
            variables,
            weights: table,
        }
    }
}

impl ScoreOracle for AdditiveScore {
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

/// Score of a DAG in the class of pattern `g` minus the score of the empty
/// graph; `None` when `g` has no DAG extension.
pub fn class_gain(score: &dyn ScoreOracle, g: &Graph) -> Option<f64> {
    let dag = fges_core::dag_from_pattern(g).ok()?;
    let empty = Graph::new(score.variables().to_vec()).ok()?;
    let full = fges_core::score_dag(score, &dag).ok()?;
    Some(full - fges_core::score_dag(score, &empty).ok()?)
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * (1.0 + b.abs())
}
