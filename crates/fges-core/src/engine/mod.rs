//! The search engine for learning CPDAGs from a decomposable score.
//!
//! This module provides:
//! - **errors**: Error types for configuration and graph failures
//! - **graph**: Mixed graph over indexed variables with sorted adjacency
//! - **paths**: Semi-directed paths, ancestry and d-separation queries
//! - **knowledge**: Forbidden and required edges, by name and by index
//! - **score**: The score oracle interface and whole-DAG scoring
//! - **oracle**: A d-separation oracle backed by a known DAG
//! - **candidate**: Scored Insert/Delete proposals and their shared queue
//! - **meek**: Frontier-restricted Meek orientation rules
//! - **pattern**: DAG to pattern and pattern to DAG conversions
//! - **coordinator**: Worker pool and cancellation for candidate generation
//! - **config**: Search configuration and validation
//! - **search**: The forward/backward equivalence search loops

pub mod candidate;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod graph;
pub mod knowledge;
pub mod meek;
pub mod oracle;
pub mod paths;
pub mod pattern;
pub mod score;
pub mod search;
