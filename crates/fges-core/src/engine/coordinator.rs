//! Worker pool for parallel candidate generation.
//!
//! ## Architecture
//!
//! - **Explicit pool**: each [`WorkerPool`] owns its own rayon thread pool
//!   sized to the requested parallelism; nothing is global
//! - **Fork/join over index ranges**: work lists are split in halves with
//!   `rayon::join` until a range fits in one chunk
//! - **Ordered merge**: map-style rounds send `(chunk index, results)` over a
//!   channel and the caller reassembles them in chunk order
//! - **Cooperative cancellation**: every chunk checks the
//!   [`CancellationToken`] between items
//!
//! Workers only read shared state; the caller keeps exclusive ownership of
//! anything it mutates after the round returns.
//!
//! ## Feature gating
//!
//! The thread pool is behind the `parallel` feature flag. Without it, and
//! whenever `parallelism == 1`, chunks run inline on the calling thread in
//! index order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::engine::errors::SearchError;

/// Shared flag for cooperative cancellation of a running search.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; running loops stop at their next check.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Bounded pool that runs chunked candidate-generation rounds.
pub struct WorkerPool {
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
    parallelism: usize,
    min_chunk: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("parallelism", &self.parallelism)
            .field("min_chunk", &self.min_chunk)
            .finish()
    }
}

impl WorkerPool {
    /// Builds a pool with `parallelism` threads.
    pub fn new(parallelism: usize, min_chunk: usize) -> Result<Self, SearchError> {
        if parallelism == 0 {
            return Err(SearchError::InvalidConfig(
                "worker pool: parallelism must be >= 1".into(),
            ));
        }
        if min_chunk == 0 {
            return Err(SearchError::InvalidConfig(
                "worker pool: min_chunk must be >= 1".into(),
            ));
        }
        #[cfg(feature = "parallel")]
        let pool = if parallelism > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(parallelism)
                .thread_name(|i| format!("fges-worker-{i}"))
                .build()
                .map_err(|e| SearchError::WorkerPool(e.to_string()))?;
            Some(pool)
        } else {
            None
        };
        Ok(Self {
            #[cfg(feature = "parallel")]
            pool,
            parallelism,
            min_chunk,
        })
    }

    /// A pool that runs everything on the calling thread.
    pub fn sequential() -> Self {
        Self {
            #[cfg(feature = "parallel")]
            pool: None,
            parallelism: 1,
            min_chunk: 1,
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Items per chunk for a list of `len` items.
    pub fn chunk_size(&self, len: usize) -> usize {
        (len / self.parallelism).max(self.min_chunk)
    }

    /// Runs `f` on every item, chunk by chunk.
    pub fn for_each<T, F>(&self, items: &[T], cancel: &CancellationToken, f: F)
    where
        T: Sync,
        F: Fn(&T) + Sync,
    {
        let chunk = self.chunk_size(items.len());
        #[cfg(feature = "parallel")]
        if let Some(pool) = self.pool.as_ref().filter(|_| items.len() > chunk) {
            pool.install(|| split_for_each(items, chunk, cancel, &f));
            return;
        }
        for part in items.chunks(chunk) {
            run_chunk(part, cancel, &f);
        }
    }

    /// Maps every item to zero or more results and returns them in item
    /// order, regardless of which worker produced them.
    pub fn flat_map<T, R, F>(&self, items: &[T], cancel: &CancellationToken, f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Vec<R> + Sync,
    {
        let chunk = self.chunk_size(items.len());
        #[cfg(feature = "parallel")]
        if let Some(pool) = self.pool.as_ref().filter(|_| items.len() > chunk) {
            let chunks: Vec<&[T]> = items.chunks(chunk).collect();
            let (tx, rx) = crossbeam_channel::unbounded();
            pool.install(|| {
                split_indices(0, chunks.len(), &|index| {
                    let mut out = Vec::new();
                    for item in chunks[index] {
                        if cancel.is_cancelled() {
                            break;
                        }
                        out.extend(f(item));
                    }
                    // The receiver outlives the pool scope.
                    let _ = tx.send((index, out));
                })
            });
            drop(tx);
            let mut parts: Vec<(usize, Vec<R>)> = rx.into_iter().collect();
            parts.sort_unstable_by_key(|(index, _)| *index);
            return parts.into_iter().flat_map(|(_, out)| out).collect();
        }
        let mut out = Vec::new();
        for item in items {
            if cancel.is_cancelled() {
                break;
            }
            out.extend(f(item));
        }
        out
    }
}

fn run_chunk<T, F>(items: &[T], cancel: &CancellationToken, f: &F)
where
    F: Fn(&T),
{
    for item in items {
        if cancel.is_cancelled() {
            return;
        }
        f(item);
    }
}

#[cfg(feature = "parallel")]
fn split_for_each<T, F>(items: &[T], chunk: usize, cancel: &CancellationToken, f: &F)
where
    T: Sync,
    F: Fn(&T) + Sync,
{
    if items.len() <= chunk {
        run_chunk(items, cancel, f);
        return;
    }
    let (left, right) = items.split_at(items.len() / 2);
    rayon::join(
        || split_for_each(left, chunk, cancel, f),
        || split_for_each(right, chunk, cancel, f),
    );
}

#[cfg(feature = "parallel")]
fn split_indices<F>(from: usize, to: usize, f: &F)
where
    F: Fn(usize) + Sync,
{
    match to - from {
        0 => {}
        1 => f(from),
        len => {
            let mid = from + len / 2;
            rayon::join(|| split_indices(from, mid, f), || split_indices(mid, to, f));
        }
    }
}
