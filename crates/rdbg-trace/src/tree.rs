//! Arena storage for materialized trace forests.
//!
//! Nodes reference their parent and children by [`NodeId`] instead of owning
//! pointers. A forest is never patched in place: a rebuild calls
//! [`TraceTree::clear`], which bumps the generation so ids handed out for the
//! previous forest resolve to `None` rather than to unrelated nodes.

use std::collections::HashMap;

use crate::record::{LogRecord, RecordIndex, ThreadId, TraceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    generation: u32,
    slot: u32,
}

impl NodeId {
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}.{}", self.generation, self.slot)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Log(LogRecord),
    /// Placeholder for a run of records whose enclosing calls fall outside
    /// the fetched window. `offset` is the index where the run resumes at its
    /// shallowest depth.
    OmittedRange {
        offset: RecordIndex,
        depth: u32,
        thread_id: Option<ThreadId>,
    },
    /// Activating this node widens a client-side window.
    LoadMore,
    /// One server page. `parent_index` is set for continuation pages of a
    /// record's hinted children.
    Page {
        number: u64,
        offset: u64,
        parent_index: Option<RecordIndex>,
    },
    Root {
        kind: TraceKind,
    },
    Thread {
        thread_id: ThreadId,
    },
}

impl NodeKind {
    pub fn record(&self) -> Option<&LogRecord> {
        match self {
            NodeKind::Log(record) => Some(record),
            _ => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(
            self,
            NodeKind::OmittedRange { .. } | NodeKind::LoadMore | NodeKind::Page { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// `false` until a lazily populated node has fetched its children.
    pub children_loaded: bool,
    pub expanded: bool,
}

#[derive(Debug, Default)]
pub struct TraceTree {
    generation: u32,
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    by_index: HashMap<RecordIndex, NodeId>,
}

impl TraceTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard the whole forest. Ids issued before this call become stale.
    pub fn clear(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.nodes.clear();
        self.roots.clear();
        self.by_index.clear();
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append a node under `parent` (or as a root). Log nodes are registered
    /// in the index map unless the record already has a placement.
    pub fn push(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = NodeId {
            generation: self.generation,
            slot: self.nodes.len() as u32,
        };
        if let NodeKind::Log(record) = &kind {
            self.by_index.entry(record.index).or_insert(id);
        }
        let children_loaded = !matches!(kind, NodeKind::Page { .. });
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
            children_loaded,
            expanded: false,
        });

        match parent.and_then(|parent| self.node_mut(parent)) {
            Some(parent) => parent.children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        if id.generation != self.generation {
            return None;
        }
        self.nodes.get(id.slot as usize)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if id.generation != self.generation {
            return None;
        }
        self.nodes.get_mut(id.slot as usize)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.node(id).map(|node| &node.kind)
    }

    pub fn record(&self, id: NodeId) -> Option<&LogRecord> {
        self.kind(id).and_then(NodeKind::record)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|node| node.children.as_slice()).unwrap_or(&[])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|node| node.parent)
    }

    pub fn find_by_index(&self, index: RecordIndex) -> Option<NodeId> {
        self.by_index.get(&index).copied()
    }

    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) {
        if let Some(node) = self.node_mut(id) {
            node.expanded = expanded;
        }
    }

    pub fn is_expanded(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|node| node.expanded)
    }

    /// Leave `id` to be populated on expansion.
    pub fn mark_children_pending(&mut self, id: NodeId) {
        if let Some(node) = self.node_mut(id) {
            node.children_loaded = false;
        }
    }

    pub fn mark_children_loaded(&mut self, id: NodeId) {
        if let Some(node) = self.node_mut(id) {
            node.children_loaded = true;
        }
    }

    pub fn children_loaded(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|node| node.children_loaded)
    }

    /// Ancestors of `id`, outermost first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut cursor = self.parent(id);
        while let Some(ancestor) = cursor {
            chain.push(ancestor);
            cursor = self.parent(ancestor);
        }
        chain.reverse();
        chain
    }

    /// Expand every ancestor of `id` and return them, outermost first.
    pub fn reveal(&mut self, id: NodeId) -> Vec<NodeId> {
        let ancestors = self.ancestors(id);
        for &ancestor in &ancestors {
            self.set_expanded(ancestor, true);
        }
        ancestors
    }

    /// Depth-first, parent-before-children walk of the subtree rooted at `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Depth-first walk of the whole forest.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for &root in &self.roots {
            out.push(root);
            out.extend(self.descendants(root));
        }
        out
    }

    /// Record indices in depth-first order, skipping placeholders and headers.
    pub fn flattened_indices(&self) -> Vec<RecordIndex> {
        self.preorder()
            .into_iter()
            .filter_map(|id| self.record(id).map(|record| record.index))
            .collect()
    }

    pub fn first_log_under(&self, id: NodeId) -> Option<NodeId> {
        self.descendants(id)
            .into_iter()
            .find(|&node| self.record(node).is_some())
    }

    pub fn last_log_under(&self, id: NodeId) -> Option<NodeId> {
        self.descendants(id)
            .into_iter()
            .rev()
            .find(|&node| self.record(node).is_some())
    }

    /// Structural snapshot of the forest, independent of node ids.
    pub fn shape(&self) -> Vec<Shape> {
        self.roots.iter().map(|&root| self.shape_of(root)).collect()
    }

    pub fn shape_of(&self, id: NodeId) -> Shape {
        let node = match self.node(id) {
            Some(node) => ShapeKind::from(&node.kind),
            None => ShapeKind::Stale,
        };
        Shape {
            node,
            children: self
                .children(id)
                .iter()
                .map(|&child| self.shape_of(child))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeKind {
    Log { index: RecordIndex, depth: u32 },
    Omitted { offset: RecordIndex, depth: u32 },
    LoadMore,
    Page { number: u64, offset: u64 },
    Root(TraceKind),
    Thread(ThreadId),
    Stale,
}

impl From<&NodeKind> for ShapeKind {
    fn from(kind: &NodeKind) -> Self {
        match kind {
            NodeKind::Log(record) => ShapeKind::Log {
                index: record.index,
                depth: record.depth,
            },
            NodeKind::OmittedRange { offset, depth, .. } => ShapeKind::Omitted {
                offset: *offset,
                depth: *depth,
            },
            NodeKind::LoadMore => ShapeKind::LoadMore,
            NodeKind::Page { number, offset, .. } => ShapeKind::Page {
                number: *number,
                offset: *offset,
            },
            NodeKind::Root { kind } => ShapeKind::Root(*kind),
            NodeKind::Thread { thread_id } => ShapeKind::Thread(*thread_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    pub node: ShapeKind,
    pub children: Vec<Shape>,
}

impl Shape {
    pub fn leaf(node: ShapeKind) -> Self {
        Self {
            node,
            children: Vec::new(),
        }
    }

    pub fn log(index: RecordIndex, depth: u32, children: Vec<Shape>) -> Self {
        Self {
            node: ShapeKind::Log { index, depth },
            children,
        }
    }

    pub fn omitted(offset: RecordIndex, depth: u32, children: Vec<Shape>) -> Self {
        Self {
            node: ShapeKind::Omitted { offset, depth },
            children,
        }
    }
}
