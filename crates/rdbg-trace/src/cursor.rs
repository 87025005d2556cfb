//! Previous/next stepping through a partition's history.
//!
//! Stepping follows the flat record order, not the tree: the record after a
//! call is its first child when it has one, and the record before a sibling
//! may be a deeply nested return. Placeholders are never a destination; they
//! are resolved (by widening the window or fetching a page) into the record
//! they stand for.

use tracing::warn;

use crate::backend::TraceBackend;
use crate::partition::{Pagination, TracePartition};
use crate::record::RecordIndex;
use crate::tree::{NodeId, NodeKind, TraceTree};

/// A navigation result. `ancestors` (outermost first) have already been
/// marked expanded so the host can reveal `node` directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reveal {
    pub node: NodeId,
    pub ancestors: Vec<NodeId>,
}

impl Reveal {
    pub fn expand(tree: &mut TraceTree, node: NodeId) -> Self {
        let ancestors = tree.reveal(node);
        Self { node, ancestors }
    }
}

pub struct Cursor<'a, B: ?Sized> {
    partition: &'a mut TracePartition,
    backend: &'a B,
}

impl<'a, B> Cursor<'a, B>
where
    B: TraceBackend + ?Sized,
{
    pub fn new(partition: &'a mut TracePartition, backend: &'a B) -> Self {
        Self { partition, backend }
    }

    pub async fn next(&mut self, selected: NodeId) -> Option<Reveal> {
        let kind = self.partition.tree().kind(selected)?.clone();
        match kind {
            NodeKind::Log(record) => {
                let pos = self.partition.position_of(record.index)?;
                let index = self.partition.index_at(pos + 1)?;
                self.reveal(index).await
            }
            NodeKind::OmittedRange { offset, .. } => self.reveal(offset).await,
            NodeKind::LoadMore => {
                if !self.partition.load_more() {
                    return None;
                }
                let start = self.partition.window_offset()?;
                let index = self.partition.index_at(start as u64)?;
                self.reveal(index).await
            }
            NodeKind::Page { .. } => {
                self.partition.load(self.backend, selected).await;
                let first = self.partition.tree().first_log_under(selected)?;
                Some(self.partition.reveal_node(first))
            }
            NodeKind::Thread { .. } | NodeKind::Root { .. } => {
                let first = self.partition.tree().first_log_under(selected)?;
                Some(self.partition.reveal_node(first))
            }
        }
    }

    pub async fn prev(&mut self, selected: NodeId) -> Option<Reveal> {
        let kind = self.partition.tree().kind(selected)?.clone();
        match kind {
            NodeKind::Log(record) => {
                let pos = self.partition.position_of(record.index)?;
                let index = self.partition.index_at(pos.checked_sub(1)?)?;
                self.reveal(index).await
            }
            NodeKind::OmittedRange { .. } => self.prev_of_omission(selected).await,
            NodeKind::LoadMore => self.before_window().await,
            NodeKind::Page {
                number,
                parent_index: None,
                ..
            } => {
                let previous = self
                    .partition
                    .load_page(self.backend, number.checked_sub(1)?)
                    .await?;
                let last = self.partition.tree().last_log_under(previous)?;
                Some(self.partition.reveal_node(last))
            }
            NodeKind::Page {
                parent_index: Some(_),
                ..
            } => {
                let tree = self.partition.tree();
                let order = tree.preorder();
                let at = order.iter().position(|&id| id == selected)?;
                let previous = order[..at]
                    .iter()
                    .rev()
                    .copied()
                    .find(|&id| tree.record(id).is_some())?;
                Some(self.partition.reveal_node(previous))
            }
            NodeKind::Thread { .. } | NodeKind::Root { .. } => None,
        }
    }

    async fn reveal(&mut self, index: RecordIndex) -> Option<Reveal> {
        self.partition.reveal_index(self.backend, index).await
    }

    /// Widen the window and step to the record just before its old start.
    async fn before_window(&mut self) -> Option<Reveal> {
        let old = self.partition.window_offset()?;
        if !self.partition.load_more() {
            return None;
        }
        let index = self.partition.index_at(old.checked_sub(1)? as u64)?;
        self.reveal(index).await
    }

    async fn prev_of_omission(&mut self, omitted: NodeId) -> Option<Reveal> {
        let tree = self.partition.tree();
        let parent = tree.parent(omitted);
        match parent.and_then(|parent| tree.kind(parent)) {
            Some(NodeKind::Log(_) | NodeKind::OmittedRange { .. }) => {
                let parent = parent?;
                Some(self.partition.reveal_node(parent))
            }
            Some(NodeKind::Page {
                parent_index: Some(_),
                ..
            }) => {
                let owner = tree.parent(parent?)?;
                Some(self.partition.reveal_node(owner))
            }
            Some(NodeKind::Page {
                offset,
                parent_index: None,
                ..
            }) => {
                let (page, offset) = (parent?, *offset);
                let child = tree
                    .first_log_under(omitted)
                    .and_then(|id| tree.record(id))
                    .map(|record| record.index)?;
                self.parent_from_debugger(page, child, offset).await
            }
            _ => match self.partition.pagination() {
                Pagination::Windowed(_) => self.before_window().await,
                Pagination::Paged(_) => None,
            },
        }
    }

    /// Ask the debugger which record encloses the start of a page. `None`
    /// from the debugger means the page header itself is the parent.
    async fn parent_from_debugger(
        &mut self,
        page: NodeId,
        child: RecordIndex,
        offset: u64,
    ) -> Option<Reveal> {
        let profile = self.partition.profile();
        let (kind, page_size) = (profile.kind, profile.page_size);
        match self
            .backend
            .fetch_parent(kind, child, offset, page_size)
            .await
        {
            Ok(Some(parent)) => self.reveal(parent.index).await,
            Ok(None) => Some(self.partition.reveal_node(page)),
            Err(err) => {
                warn!(target: "rdbg.trace", %kind, child, error = %err, "fetch-parent failed");
                None
            }
        }
    }
}
