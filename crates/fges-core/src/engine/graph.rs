//! Mixed graph model for equivalence-class search.
//!
//! ## Key Components
//!
//! - **NodeId / Variable**: stable integer identity plus name and kind
//! - **Endpoint / Edge**: two endpoint marks per edge, canonicalised so that
//!   `node1 < node2` and structural equality is orientation-aware
//! - **Graph**: per-node sorted adjacency lists; at most one edge per
//!   unordered pair and no self loops
//!
//! ## Design
//!
//! Variables are shared behind an `Arc<[Variable]>` so cloning a graph only
//! copies adjacency. Each adjacency entry stores both endpoint marks from
//! the owning node's point of view, which keeps parent/child/undirected
//! queries to a single scan of a `SmallVec` without touching the partner
//! node's list. Lists are kept sorted by neighbor id so iteration order is
//! deterministic and lookups are binary searches.
//!
//! Traversal algorithms (semi-directed paths, ancestry, d-separation) live
//! in [`crate::engine::paths`].

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::engine::errors::SearchError;

/// Inline capacity for per-node adjacency lists before spilling to the heap.
pub const INLINE_ADJACENCY: usize = 8;

/// Small sorted node set used for parent sets, naYX and T/H subsets.
pub type NodeSet = SmallVec<[NodeId; 4]>;

/// Stable index of a variable in the oracle's variable list.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u32);

impl NodeId {
    /// Position of this node in the variable list.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        NodeId(index as u32)
    }
}

/// Whether a variable was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VariableKind {
    Measured,
    Latent,
}

/// An immutable variable identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Variable {
    pub id: NodeId,
    pub name: Arc<str>,
    pub kind: VariableKind,
}

impl Variable {
    pub fn measured(index: usize, name: impl Into<Arc<str>>) -> Self {
        Self {
            id: NodeId::from(index),
            name: name.into(),
            kind: VariableKind::Measured,
        }
    }

    pub fn latent(index: usize, name: impl Into<Arc<str>>) -> Self {
        Self {
            id: NodeId::from(index),
            name: name.into(),
            kind: VariableKind::Latent,
        }
    }

    pub fn is_measured(&self) -> bool {
        self.kind == VariableKind::Measured
    }
}

/// Builds measured variables with indices matching their position.
pub fn measured_variables<I, S>(names: I) -> Vec<Variable>
where
    I: IntoIterator<Item = S>,
    S: Into<Arc<str>>,
{
    names
        .into_iter()
        .enumerate()
        .map(|(index, name)| Variable::measured(index, name))
        .collect()
}

/// Mark at one end of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Endpoint {
    Tail,
    Arrow,
    Circle,
}

impl Endpoint {
    fn left_glyph(self) -> char {
        match self {
            Endpoint::Tail => '-',
            Endpoint::Arrow => '<',
            Endpoint::Circle => 'o',
        }
    }

    fn right_glyph(self) -> char {
        match self {
            Endpoint::Tail => '-',
            Endpoint::Arrow => '>',
            Endpoint::Circle => 'o',
        }
    }
}

/// An edge between two distinct nodes.
///
/// Stored canonically with `node1 < node2`; `Edge::directed(b, a)` and an
/// edge built with swapped endpoints compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Edge {
    node1: NodeId,
    node2: NodeId,
    endpoint1: Endpoint,
    endpoint2: Endpoint,
}

impl Edge {
    pub fn new(a: NodeId, b: NodeId, at_a: Endpoint, at_b: Endpoint) -> Self {
        if a <= b {
            Self {
                node1: a,
                node2: b,
                endpoint1: at_a,
                endpoint2: at_b,
            }
        } else {
            Self {
                node1: b,
                node2: a,
                endpoint1: at_b,
                endpoint2: at_a,
            }
        }
    }

    /// `from --> to`.
    pub fn directed(from: NodeId, to: NodeId) -> Self {
        Self::new(from, to, Endpoint::Tail, Endpoint::Arrow)
    }

    /// `a --- b`.
    pub fn undirected(a: NodeId, b: NodeId) -> Self {
        Self::new(a, b, Endpoint::Tail, Endpoint::Tail)
    }

    pub fn nodes(&self) -> (NodeId, NodeId) {
        (self.node1, self.node2)
    }

    /// Endpoint mark at `node`, or `None` if `node` is not on this edge.
    pub fn endpoint_at(&self, node: NodeId) -> Option<Endpoint> {
        if node == self.node1 {
            Some(self.endpoint1)
        } else if node == self.node2 {
            Some(self.endpoint2)
        } else {
            None
        }
    }

    /// The other end of the edge.
    pub fn distal(&self, node: NodeId) -> Option<NodeId> {
        if node == self.node1 {
            Some(self.node2)
        } else if node == self.node2 {
            Some(self.node1)
        } else {
            None
        }
    }

    pub fn is_directed(&self) -> bool {
        matches!(
            (self.endpoint1, self.endpoint2),
            (Endpoint::Tail, Endpoint::Arrow) | (Endpoint::Arrow, Endpoint::Tail)
        )
    }

    pub fn is_undirected(&self) -> bool {
        self.endpoint1 == Endpoint::Tail && self.endpoint2 == Endpoint::Tail
    }

    /// True for a directed edge whose arrowhead is at `node`.
    pub fn points_towards(&self, node: NodeId) -> bool {
        self.is_directed() && self.endpoint_at(node) == Some(Endpoint::Arrow)
    }

    /// `(tail, head)` of a directed edge.
    pub fn direction(&self) -> Option<(NodeId, NodeId)> {
        match (self.endpoint1, self.endpoint2) {
            (Endpoint::Tail, Endpoint::Arrow) => Some((self.node1, self.node2)),
            (Endpoint::Arrow, Endpoint::Tail) => Some((self.node2, self.node1)),
            _ => None,
        }
    }
}

/// One adjacency entry as seen from its owning node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Link {
    node: NodeId,
    /// Mark at the owning node.
    near: Endpoint,
    /// Mark at `node`.
    far: Endpoint,
}

/// Mutable mixed graph over a fixed variable list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    variables: Arc<[Variable]>,
    names: Arc<FxHashMap<Arc<str>, NodeId>>,
    adjacency: Vec<SmallVec<[Link; INLINE_ADJACENCY]>>,
    num_edges: usize,
}

impl Graph {
    /// Creates an empty graph.
    ///
    /// Variable ids must equal their positions and names must be unique.
    pub fn new(variables: impl Into<Arc<[Variable]>>) -> Result<Self, SearchError> {
        let variables: Arc<[Variable]> = variables.into();
        let mut names = FxHashMap::default();
        for (position, variable) in variables.iter().enumerate() {
            if variable.id.index() != position {
                return Err(SearchError::VariableMismatch(format!(
                    "variable '{}' has id {} but sits at position {}",
                    variable.name, variable.id.0, position
                )));
            }
            if names.insert(variable.name.clone(), variable.id).is_some() {
                return Err(SearchError::VariableMismatch(format!(
                    "duplicate variable name '{}'",
                    variable.name
                )));
            }
        }
        let adjacency = vec![SmallVec::new(); variables.len()];
        Ok(Self {
            variables,
            names: Arc::new(names),
            adjacency,
            num_edges: 0,
        })
    }

    /// An edgeless graph over the same variables.
    pub fn empty_like(&self) -> Self {
        Self {
            variables: Arc::clone(&self.variables),
            names: Arc::clone(&self.names),
            adjacency: vec![SmallVec::new(); self.variables.len()],
            num_edges: 0,
        }
    }

    /// Parses a comma separated edge list such as `"X1-->X2,X2---X3"`.
    ///
    /// Accepted connectors are `-->`, `<--` and `---`.
    pub fn from_edge_list(
        variables: impl Into<Arc<[Variable]>>,
        edges: &str,
    ) -> Result<Self, SearchError> {
        let mut graph = Self::new(variables)?;
        for token in edges.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (left, connector, right) = ["-->", "<--", "---"]
                .iter()
                .find_map(|c| token.split_once(c).map(|(l, r)| (l.trim(), *c, r.trim())))
                .ok_or_else(|| SearchError::Graph(format!("unrecognised edge '{token}'")))?;
            let a = graph.require_node(left)?;
            let b = graph.require_node(right)?;
            match connector {
                "-->" => graph.add_directed(a, b)?,
                "<--" => graph.add_directed(b, a)?,
                _ => graph.add_undirected(a, b)?,
            }
        }
        Ok(graph)
    }

    fn require_node(&self, name: &str) -> Result<NodeId, SearchError> {
        self.node_by_name(name)
            .ok_or_else(|| SearchError::Graph(format!("unknown variable '{name}'")))
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// True when `other` lists the same names in the same order.
    pub fn has_variables(&self, other: &[Variable]) -> bool {
        self.variables.len() == other.len()
            && self
                .variables
                .iter()
                .zip(other)
                .all(|(a, b)| a.name == b.name)
    }

    pub fn num_nodes(&self) -> usize {
        self.variables.len()
    }

    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.variables.len()).map(NodeId::from)
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn name(&self, node: NodeId) -> &str {
        &self.variables[node.index()].name
    }

    pub fn contains(&self, node: NodeId) -> bool {
        node.index() < self.variables.len()
    }

    fn link(&self, a: NodeId, b: NodeId) -> Option<&Link> {
        let links = self.adjacency.get(a.index())?;
        links
            .binary_search_by_key(&b, |l| l.node)
            .ok()
            .map(|i| &links[i])
    }

    pub fn is_adjacent(&self, a: NodeId, b: NodeId) -> bool {
        self.link(a, b).is_some()
    }

    pub fn edge(&self, a: NodeId, b: NodeId) -> Option<Edge> {
        self.link(a, b)
            .map(|l| Edge::new(a, b, l.near, l.far))
    }

    pub fn degree(&self, node: NodeId) -> usize {
        self.adjacency[node.index()].len()
    }

    /// Adds an edge; the pair must be distinct, known and not yet adjacent.
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), SearchError> {
        let (a, b) = edge.nodes();
        if a == b {
            return Err(SearchError::Graph(format!(
                "self loop on '{}'",
                self.name(a)
            )));
        }
        if !self.contains(a) || !self.contains(b) {
            return Err(SearchError::Graph(format!(
                "edge {}-{} references a node outside the graph",
                a.0, b.0
            )));
        }
        if self.is_adjacent(a, b) {
            return Err(SearchError::Graph(format!(
                "'{}' and '{}' are already adjacent",
                self.name(a),
                self.name(b)
            )));
        }
        let at_a = edge.endpoint1;
        let at_b = edge.endpoint2;
        insert_link(&mut self.adjacency[a.index()], Link { node: b, near: at_a, far: at_b });
        insert_link(&mut self.adjacency[b.index()], Link { node: a, near: at_b, far: at_a });
        self.num_edges += 1;
        Ok(())
    }

    pub fn add_directed(&mut self, from: NodeId, to: NodeId) -> Result<(), SearchError> {
        self.add_edge(Edge::directed(from, to))
    }

    pub fn add_undirected(&mut self, a: NodeId, b: NodeId) -> Result<(), SearchError> {
        self.add_edge(Edge::undirected(a, b))
    }

    /// Removes the edge between `a` and `b`, returning it if present.
    pub fn remove_edge(&mut self, a: NodeId, b: NodeId) -> Option<Edge> {
        let edge = self.edge(a, b)?;
        remove_link(&mut self.adjacency[a.index()], b);
        remove_link(&mut self.adjacency[b.index()], a);
        self.num_edges -= 1;
        Some(edge)
    }

    /// Replaces whatever joins `from` and `to` with `from --> to`.
    pub fn set_directed(&mut self, from: NodeId, to: NodeId) -> Result<(), SearchError> {
        self.remove_edge(from, to);
        self.add_directed(from, to)
    }

    /// Replaces whatever joins `a` and `b` with `a --- b`.
    pub fn set_undirected(&mut self, a: NodeId, b: NodeId) -> Result<(), SearchError> {
        self.remove_edge(a, b);
        self.add_undirected(a, b)
    }

    /// Removes every edge incident to `node`.
    pub fn isolate(&mut self, node: NodeId) {
        let partners: NodeSet = self.adjacent_nodes(node).collect();
        for other in partners {
            self.remove_edge(node, other);
        }
    }

    /// All edges, ordered by `(node1, node2)`.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.adjacency.iter().enumerate().flat_map(|(index, links)| {
            let owner = NodeId::from(index);
            links
                .iter()
                .filter(move |l| l.node > owner)
                .map(move |l| Edge::new(owner, l.node, l.near, l.far))
        })
    }

    pub fn adjacent_nodes(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacency[node.index()].iter().map(|l| l.node)
    }

    fn linked(&self, node: NodeId, near: Endpoint, far: Endpoint) -> NodeSet {
        self.adjacency[node.index()]
            .iter()
            .filter(|l| l.near == near && l.far == far)
            .map(|l| l.node)
            .collect()
    }

    /// Nodes `p` with `p --> node`.
    pub fn parents(&self, node: NodeId) -> NodeSet {
        self.linked(node, Endpoint::Arrow, Endpoint::Tail)
    }

    /// Nodes `c` with `node --> c`.
    pub fn children(&self, node: NodeId) -> NodeSet {
        self.linked(node, Endpoint::Tail, Endpoint::Arrow)
    }

    /// Nodes joined to `node` by an undirected edge.
    pub fn neighbors_undirected(&self, node: NodeId) -> NodeSet {
        self.linked(node, Endpoint::Tail, Endpoint::Tail)
    }

    pub fn is_parent_of(&self, parent: NodeId, child: NodeId) -> bool {
        self.link(parent, child)
            .is_some_and(|l| l.near == Endpoint::Tail && l.far == Endpoint::Arrow)
    }

    pub fn is_undirected(&self, a: NodeId, b: NodeId) -> bool {
        self.link(a, b)
            .is_some_and(|l| l.near == Endpoint::Tail && l.far == Endpoint::Tail)
    }

    /// `a *-> b <-* c`.
    pub fn is_def_collider(&self, a: NodeId, b: NodeId, c: NodeId) -> bool {
        let into_b = |x: NodeId| self.link(b, x).is_some_and(|l| l.near == Endpoint::Arrow);
        into_b(a) && into_b(c)
    }

    /// True when every pair in `nodes` is adjacent.
    pub fn is_clique(&self, nodes: &[NodeId]) -> bool {
        nodes.iter().enumerate().all(|(i, &a)| {
            nodes[i + 1..].iter().all(|&b| self.is_adjacent(a, b))
        })
    }

    /// Nodes adjacent to both `a` and `b`.
    pub fn common_adjacents(&self, a: NodeId, b: NodeId) -> NodeSet {
        self.adjacent_nodes(a)
            .filter(|&n| self.is_adjacent(n, b))
            .collect()
    }

    /// Renders one edge with variable names, e.g. `X1 --> X2`.
    pub fn edge_label(&self, edge: &Edge) -> String {
        let (a, b) = edge.nodes();
        format!(
            "{} {}-{} {}",
            self.name(a),
            edge.endpoint1.left_glyph(),
            edge.endpoint2.right_glyph(),
            self.name(b)
        )
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for edge in self.edges() {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            f.write_str(&self.edge_label(&edge))?;
        }
        Ok(())
    }
}

fn insert_link(links: &mut SmallVec<[Link; INLINE_ADJACENCY]>, link: Link) {
    let at = links.partition_point(|l| l.node < link.node);
    links.insert(at, link);
}

fn remove_link(links: &mut SmallVec<[Link; INLINE_ADJACENCY]>, node: NodeId) {
    if let Ok(at) = links.binary_search_by_key(&node, |l| l.node) {
        links.remove(at);
    }
}

/// Sorted union of two sorted sets.
pub(crate) fn union(a: &[NodeId], b: &[NodeId]) -> NodeSet {
    let mut out: NodeSet = a.iter().chain(b).copied().collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// Elements of sorted `a` not in `b`.
pub(crate) fn difference(a: &[NodeId], b: &[NodeId]) -> NodeSet {
    a.iter().copied().filter(|n| !b.contains(n)).collect()
}

/// Lexicographic `size`-subsets of a sorted node list.
pub(crate) struct Combinations<'a> {
    items: &'a [NodeId],
    indices: SmallVec<[usize; 4]>,
    started: bool,
    done: bool,
}

impl<'a> Combinations<'a> {
    pub(crate) fn new(items: &'a [NodeId], size: usize) -> Self {
        Self {
            items,
            indices: (0..size).collect(),
            started: false,
            done: size > items.len(),
        }
    }
}

impl Iterator for Combinations<'_> {
    type Item = NodeSet;

    fn next(&mut self) -> Option<NodeSet> {
        if self.done {
            return None;
        }
        if self.started {
            let k = self.indices.len();
            let n = self.items.len();
            let mut i = k;
            loop {
                if i == 0 {
                    self.done = true;
                    return None;
                }
                i -= 1;
                if self.indices[i] < n - k + i {
                    break;
                }
            }
            self.indices[i] += 1;
            for j in i + 1..k {
                self.indices[j] = self.indices[j - 1] + 1;
            }
        }
        self.started = true;
        Some(self.indices.iter().map(|&i| self.items[i]).collect())
    }
}
