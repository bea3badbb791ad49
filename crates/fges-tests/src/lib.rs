//! Integration test harness for `fges-core`.
//!
//! All tests live under `tests/`; shared score oracles are in
//! `tests/common/mod.rs`.
