//! Scored edit proposals and the shared priority queue that orders them.
//!
//! ## Ordering
//!
//! Candidates are totally ordered by `(bump descending, sequence ascending)`.
//! The sequence number comes from a single counter bumped under the queue
//! lock, so two equal-bump candidates always pop in creation order no matter
//! which worker produced them.
//!
//! ## Invalidation
//!
//! A secondary index maps each directed `(source, target)` pair to the keys
//! of its live candidates. [`CandidateQueue::clear_pair`] drops all of them
//! in one call; everything else is validated lazily when popped.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{self, AtomicU64};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::engine::graph::{NodeId, NodeSet};

/// Graph state around a pair that a bump was computed against.
///
/// A popped candidate is only applied while its context still matches the
/// graph; otherwise its bump no longer describes the edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateContext {
    /// Undirected neighbors of `target` adjacent to `source`.
    pub na_yx: NodeSet,
    /// Undirected neighbors of `target` not adjacent to `source`. Empty for
    /// deletes.
    pub t_neighbors: NodeSet,
    /// Parents of `target`.
    pub parents: NodeSet,
}

/// A scored Insert or Delete proposal for the pair `source`, `target`.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub source: NodeId,
    pub target: NodeId,
    pub bump: f64,
    pub context: CandidateContext,
    /// The committed T subset (insert) or H subset (delete).
    pub h_or_t: NodeSet,
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy)]
struct QueueKey {
    bump: f64,
    sequence: u64,
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .bump
            .total_cmp(&self.bump)
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueueKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueKey {}

#[derive(Debug, Default)]
struct QueueState {
    ordered: BTreeMap<QueueKey, Candidate>,
    by_pair: FxHashMap<(NodeId, NodeId), SmallVec<[QueueKey; 2]>>,
}

/// Concurrent priority queue of candidates with pair-indexed removal.
#[derive(Debug, Default)]
pub struct CandidateQueue {
    state: Mutex<QueueState>,
    next_sequence: AtomicU64,
}

impl CandidateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a candidate and returns its sequence number.
    pub fn push(
        &self,
        source: NodeId,
        target: NodeId,
        bump: f64,
        context: CandidateContext,
        h_or_t: NodeSet,
    ) -> u64 {
        debug_assert!(!bump.is_nan(), "NaN bumps must be filtered before queueing");
        let mut state = self.lock();
        let sequence = self.next_sequence.fetch_add(1, atomic::Ordering::Relaxed);
        let key = QueueKey { bump, sequence };
        state.by_pair.entry((source, target)).or_default().push(key);
        state.ordered.insert(
            key,
            Candidate {
                source,
                target,
                bump,
                context,
                h_or_t,
                sequence,
            },
        );
        sequence
    }

    /// Removes and returns the highest-bump candidate.
    pub fn pop_best(&self) -> Option<Candidate> {
        let mut state = self.lock();
        let (key, candidate) = state.ordered.pop_first()?;
        let pair = (candidate.source, candidate.target);
        if let Some(keys) = state.by_pair.get_mut(&pair) {
            keys.retain(|k| k.sequence != key.sequence);
            if keys.is_empty() {
                state.by_pair.remove(&pair);
            }
        }
        Some(candidate)
    }

    /// Drops every live candidate for the directed pair; returns how many.
    pub fn clear_pair(&self, source: NodeId, target: NodeId) -> usize {
        let mut state = self.lock();
        let Some(keys) = state.by_pair.remove(&(source, target)) else {
            return 0;
        };
        for key in &keys {
            state.ordered.remove(key);
        }
        keys.len()
    }

    /// Drops all candidates. Sequence numbers keep increasing.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.ordered.clear();
        state.by_pair.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().ordered.is_empty()
    }

    /// Number of live candidates for the directed pair.
    pub fn pair_len(&self, source: NodeId, target: NodeId) -> usize {
        self.lock()
            .by_pair
            .get(&(source, target))
            .map_or(0, SmallVec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;
    use std::sync::Arc;

    fn n(i: u32) -> NodeId {
        NodeId(i)
    }

    #[test]
    fn pops_by_bump_then_sequence() {
        let q = CandidateQueue::new();
        q.push(n(0), n(1), 1.0, CandidateContext::default(), NodeSet::new());
        q.push(n(1), n(2), 3.0, CandidateContext::default(), NodeSet::new());
        q.push(n(2), n(3), 3.0, CandidateContext::default(), NodeSet::new());
        let order: Vec<(u32, u32)> = std::iter::from_fn(|| q.pop_best())
            .map(|c| (c.source.0, c.target.0))
            .collect();
        assert_eq!(order, vec![(1, 2), (2, 3), (0, 1)]);
        assert!(q.is_empty());
    }

    #[test]
    fn clear_pair_removes_only_that_direction() {
        let q = CandidateQueue::new();
        q.push(n(0), n(1), 1.0, CandidateContext::default(), NodeSet::new());
        q.push(n(0), n(1), 2.0, CandidateContext::default(), smallvec![n(4)]);
        q.push(n(1), n(0), 5.0, CandidateContext::default(), NodeSet::new());
        assert_eq!(q.pair_len(n(0), n(1)), 2);
        assert_eq!(q.clear_pair(n(0), n(1)), 2);
        assert_eq!(q.len(), 1);
        assert_eq!(q.clear_pair(n(0), n(1)), 0);
        let best = q.pop_best().unwrap();
        assert_eq!((best.source, best.target), (n(1), n(0)));
    }

    #[test]
    fn pop_keeps_pair_index_consistent() {
        let q = CandidateQueue::new();
        q.push(n(0), n(1), 4.0, CandidateContext::default(), NodeSet::new());
        q.push(n(0), n(1), 2.0, CandidateContext::default(), NodeSet::new());
        let first = q.pop_best().unwrap();
        assert_eq!(first.bump, 4.0);
        assert_eq!(q.pair_len(n(0), n(1)), 1);
        assert_eq!(q.clear_pair(n(0), n(1)), 1);
        assert!(q.is_empty());
    }

    #[test]
    fn sequences_survive_clear() {
        let q = CandidateQueue::new();
        let a = q.push(n(0), n(1), 1.0, CandidateContext::default(), NodeSet::new());
        q.clear();
        let b = q.push(n(0), n(1), 1.0, CandidateContext::default(), NodeSet::new());
        assert!(b > a);
    }

    #[test]
    fn concurrent_pushes_get_unique_sequences() {
        let q = Arc::new(CandidateQueue::new());
        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let q = Arc::clone(&q);
                std::thread::spawn(move || {
                    for i in 0..100u32 {
                        let context = CandidateContext::default();
                        q.push(n(t), n(i + 10), 1.0, context, NodeSet::new());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(q.len(), 400);
        let mut last = None;
        while let Some(c) = q.pop_best() {
            if let Some(prev) = last {
                assert!(c.sequence > prev, "equal bumps must pop in sequence order");
            }
            last = Some(c.sequence);
        }
    }
}
