//! Server-paged pagination.
//!
//! Pages address flat record indices: page `n` holds `[(n-1)*size, n*size)`.
//! Page nodes are created eagerly up to the page holding the selected record,
//! while their contents (and the hinted children of records whose descendants
//! fall past the page end) are fetched from the debugger on expansion.

use tracing::warn;

use crate::backend::TraceBackend;
use crate::materialize::materialize;
use crate::record::{LogRecord, RecordIndex, TraceKind};
use crate::tree::{NodeId, NodeKind, TraceTree};

/// One-based page holding `index`.
pub fn page_number(index: RecordIndex, page_size: usize) -> u64 {
    index / page_size.max(1) as u64 + 1
}

/// First record index of page `number`.
pub fn page_offset(number: u64, page_size: usize) -> u64 {
    number.saturating_sub(1) * page_size.max(1) as u64
}

#[derive(Debug, Clone)]
pub struct ServerPages {
    kind: TraceKind,
    page_size: usize,
    total: u64,
    selected: Option<RecordIndex>,
    pages: Vec<NodeId>,
}

impl ServerPages {
    pub fn new(kind: TraceKind, page_size: usize, total: u64, selected: Option<RecordIndex>) -> Self {
        Self {
            kind,
            page_size: page_size.max(1),
            total,
            selected,
            pages: Vec::new(),
        }
    }

    pub fn kind(&self) -> TraceKind {
        self.kind
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn selected(&self) -> Option<RecordIndex> {
        self.selected
    }

    pub fn page_count(&self) -> u64 {
        self.total.div_ceil(self.page_size as u64)
    }

    pub fn pages(&self) -> &[NodeId] {
        &self.pages
    }

    /// Discard `tree` and lay out page headers through the selected page;
    /// only that last page starts expanded.
    pub fn rebuild(&mut self, tree: &mut TraceTree) {
        tree.clear();
        self.pages.clear();
        if self.total == 0 {
            return;
        }
        let target = self
            .selected
            .unwrap_or(self.total - 1)
            .min(self.total - 1);
        let last = page_number(target, self.page_size);
        for number in 1..=last {
            self.push_page(tree, number);
        }
        if let Some(&last_page) = self.pages.last() {
            tree.set_expanded(last_page, true);
        }
    }

    fn push_page(&mut self, tree: &mut TraceTree, number: u64) -> NodeId {
        let id = tree.push(
            None,
            NodeKind::Page {
                number,
                offset: page_offset(number, self.page_size),
                parent_index: None,
            },
        );
        self.pages.push(id);
        id
    }

    /// Page header for `number`, appending headers past the eagerly created
    /// ones when needed. `None` outside `1..=page_count`.
    pub fn ensure_page(&mut self, tree: &mut TraceTree, number: u64) -> Option<NodeId> {
        if number == 0 || number > self.page_count() {
            return None;
        }
        while (self.pages.len() as u64) < number {
            let next = self.pages.len() as u64 + 1;
            self.push_page(tree, next);
        }
        self.pages.get(number as usize - 1).copied()
    }

    pub fn page_of(&self, tree: &TraceTree, id: NodeId) -> Option<NodeId> {
        std::iter::once(id)
            .chain(tree.ancestors(id).into_iter().rev())
            .find(|&node| {
                matches!(
                    tree.kind(node),
                    Some(NodeKind::Page {
                        parent_index: None,
                        ..
                    })
                )
            })
    }

    /// Fetch the children of a lazily populated node. Pages and records with
    /// a `hasChild` hint are loaded once; anything else is a no-op. Debugger
    /// failures leave the node empty until the next rebuild.
    pub async fn load_children<B>(&self, tree: &mut TraceTree, backend: &B, id: NodeId)
    where
        B: TraceBackend + ?Sized,
    {
        if tree.children_loaded(id) {
            return;
        }
        let Some(kind) = tree.kind(id).cloned() else {
            return;
        };

        match kind {
            NodeKind::Page {
                offset,
                parent_index: None,
                ..
            } => {
                let records = self.fetched(backend.fetch_root(self.kind, offset, self.page_size).await);
                materialize(tree, Some(id), &records, None);
                defer_hinted_children(tree, &records);
            }
            NodeKind::Page {
                number,
                offset,
                parent_index: Some(parent_index),
            } => {
                let records = self.fetched(
                    backend
                        .fetch_children(self.kind, parent_index, offset, self.page_size)
                        .await,
                );
                materialize(tree, Some(id), &records, None);
                defer_hinted_children(tree, &records);
                if records.len() >= self.page_size {
                    let owner = tree.parent(id);
                    tree.push(
                        owner,
                        NodeKind::Page {
                            number: number + 1,
                            offset: offset + self.page_size as u64,
                            parent_index: Some(parent_index),
                        },
                    );
                }
            }
            NodeKind::Log(_) if !tree.children(id).is_empty() => {}
            NodeKind::Log(record) => {
                let records = self.fetched(
                    backend
                        .fetch_children(self.kind, record.index, 0, self.page_size)
                        .await,
                );
                materialize(tree, Some(id), &records, None);
                defer_hinted_children(tree, &records);
                if records.len() >= self.page_size {
                    tree.push(
                        Some(id),
                        NodeKind::Page {
                            number: 2,
                            offset: self.page_size as u64,
                            parent_index: Some(record.index),
                        },
                    );
                }
            }
            _ => {}
        }
        tree.mark_children_loaded(id);
    }

    fn fetched(
        &self,
        result: Result<Vec<LogRecord>, crate::backend::BackendError>,
    ) -> Vec<LogRecord> {
        result.unwrap_or_else(|err| {
            warn!(target: "rdbg.trace", kind = %self.kind, error = %err, "trace page fetch failed");
            Vec::new()
        })
    }
}

/// Records the server flagged with `hasChild` whose children fell outside the
/// fetched page are populated on expansion.
fn defer_hinted_children(tree: &mut TraceTree, records: &[LogRecord]) {
    for record in records.iter().filter(|record| record.hints_children()) {
        if let Some(id) = tree.find_by_index(record.index) {
            if tree.children(id).is_empty() {
                tree.mark_children_pending(id);
            }
        }
    }
}
