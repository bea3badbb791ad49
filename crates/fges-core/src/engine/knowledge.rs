//! Background knowledge: forbidden and required directed edges.
//!
//! Knowledge is expressed by variable name through the [`Knowledge`] trait so
//! callers can plug in their own stores. A search resolves it once into a
//! [`KnowledgeIndex`] keyed by [`NodeId`], which is what the hot paths query.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::engine::errors::SearchError;
use crate::engine::graph::{NodeId, Variable};

/// Read-only forbidden/required edge predicate over variable names.
pub trait Knowledge: Send + Sync + fmt::Debug {
    /// Whether `from --> to` may never appear.
    fn is_forbidden(&self, from: &str, to: &str) -> bool;

    /// Whether `from --> to` must appear.
    fn is_required(&self, from: &str, to: &str) -> bool;

    /// All required `(from, to)` pairs, in a stable order.
    fn required_edges(&self) -> Box<dyn Iterator<Item = (&str, &str)> + '_>;

    /// True when nothing is forbidden or required.
    fn is_empty(&self) -> bool;
}

/// In-memory knowledge with explicit pairs and optional temporal tiers.
///
/// An edge from a variable in a later tier into a variable in an earlier
/// tier is forbidden.
#[derive(Debug, Clone, Default)]
pub struct EdgeKnowledge {
    forbidden: FxHashMap<Arc<str>, FxHashSet<Arc<str>>>,
    required: BTreeMap<Arc<str>, BTreeSet<Arc<str>>>,
    tiers: FxHashMap<Arc<str>, usize>,
}

impl EdgeKnowledge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forbids `from --> to`. Fails if the edge is already required.
    pub fn set_forbidden(&mut self, from: &str, to: &str) -> Result<(), SearchError> {
        if self.required.get(from).is_some_and(|s| s.contains(to)) {
            return Err(SearchError::Knowledge(format!(
                "{from} --> {to} is already required"
            )));
        }
        self.forbidden
            .entry(Arc::from(from))
            .or_default()
            .insert(Arc::from(to));
        Ok(())
    }

    /// Requires `from --> to`. Fails if the edge is forbidden.
    pub fn set_required(&mut self, from: &str, to: &str) -> Result<(), SearchError> {
        if from == to {
            return Err(SearchError::Knowledge(format!(
                "cannot require a self loop on {from}"
            )));
        }
        if self.is_forbidden(from, to) {
            return Err(SearchError::Knowledge(format!(
                "{from} --> {to} is forbidden"
            )));
        }
        self.required
            .entry(Arc::from(from))
            .or_default()
            .insert(Arc::from(to));
        Ok(())
    }

    /// Places `names` in temporal tier `tier`.
    pub fn add_to_tier<'a>(&mut self, tier: usize, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            self.tiers.insert(Arc::from(name), tier);
        }
    }

    fn tier_forbids(&self, from: &str, to: &str) -> bool {
        match (self.tiers.get(from), self.tiers.get(to)) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        }
    }
}

impl Knowledge for EdgeKnowledge {
    fn is_forbidden(&self, from: &str, to: &str) -> bool {
        self.forbidden.get(from).is_some_and(|s| s.contains(to)) || self.tier_forbids(from, to)
    }

    fn is_required(&self, from: &str, to: &str) -> bool {
        self.required.get(from).is_some_and(|s| s.contains(to))
    }

    fn required_edges(&self) -> Box<dyn Iterator<Item = (&str, &str)> + '_> {
        Box::new(
            self.required
                .iter()
                .flat_map(|(from, tos)| tos.iter().map(move |to| (&**from, &**to))),
        )
    }

    fn is_empty(&self) -> bool {
        self.forbidden.values().all(FxHashSet::is_empty)
            && self.required.is_empty()
            && self.tiers.is_empty()
    }
}

/// Knowledge resolved against a concrete variable list.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeIndex {
    forbidden: FxHashSet<(NodeId, NodeId)>,
    required: FxHashSet<(NodeId, NodeId)>,
    required_order: Vec<(NodeId, NodeId)>,
}

impl KnowledgeIndex {
    /// Index with nothing forbidden or required.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolves `knowledge` for `variables`.
    ///
    /// Required edges must name known variables; forbidden pairs are
    /// evaluated for every ordered pair of variables.
    pub fn resolve(
        knowledge: Option<&dyn Knowledge>,
        variables: &[Variable],
    ) -> Result<Self, SearchError> {
        let Some(knowledge) = knowledge.filter(|k| !k.is_empty()) else {
            return Ok(Self::empty());
        };
        let lookup: FxHashMap<&str, NodeId> =
            variables.iter().map(|v| (&*v.name, v.id)).collect();

        let mut index = Self::default();
        for (from, to) in knowledge.required_edges() {
            let (Some(&a), Some(&b)) = (lookup.get(from), lookup.get(to)) else {
                return Err(SearchError::VariableMismatch(format!(
                    "required edge {from} --> {to} names an unknown variable"
                )));
            };
            if index.required.insert((a, b)) {
                index.required_order.push((a, b));
            }
        }

        for from in variables {
            for to in variables {
                if from.id != to.id && knowledge.is_forbidden(&from.name, &to.name) {
                    if index.required.contains(&(from.id, to.id)) {
                        return Err(SearchError::Knowledge(format!(
                            "{} --> {} is both required and forbidden",
                            from.name, to.name
                        )));
                    }
                    index.forbidden.insert((from.id, to.id));
                }
            }
        }
        Ok(index)
    }

    pub fn is_empty(&self) -> bool {
        self.forbidden.is_empty() && self.required.is_empty()
    }

    pub fn is_forbidden(&self, from: NodeId, to: NodeId) -> bool {
        self.forbidden.contains(&(from, to))
    }

    pub fn is_required(&self, from: NodeId, to: NodeId) -> bool {
        self.required.contains(&(from, to))
    }

    /// True when neither orientation of the pair is required.
    pub fn no_edge_required(&self, a: NodeId, b: NodeId) -> bool {
        !self.is_required(a, b) && !self.is_required(b, a)
    }

    /// Whether an arrowhead may be placed at `to` on the edge `from *-> to`.
    pub fn arrowpoint_allowed(&self, from: NodeId, to: NodeId) -> bool {
        !self.is_required(to, from) && !self.is_forbidden(from, to)
    }

    /// Required edges in declaration order.
    pub fn required_edges(&self) -> &[(NodeId, NodeId)] {
        &self.required_order
    }
}
