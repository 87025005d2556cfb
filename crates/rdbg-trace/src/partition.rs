//! One materialized view: a thread of the trace view, the record view, or a
//! legacy per-kind view. A partition owns its arena and its pagination state
//! and is replaced wholesale on every update.

use tracing::debug;

use crate::backend::TraceBackend;
use crate::cursor::Reveal;
use crate::error::TraceResult;
use crate::paging::{page_number, ServerPages};
use crate::profile::{TraceProfile, TreeItem, WindowConfig};
use crate::record::{LogRecord, RecordIndex, ThreadId, TraceKind};
use crate::tree::{NodeId, NodeKind, TraceTree};
use crate::window::ClientWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartitionKey {
    Thread(ThreadId),
    Record,
    Kind(TraceKind),
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartitionKey::Thread(id) => write!(f, "thread:{id}"),
            PartitionKey::Record => f.write_str("record"),
            PartitionKey::Kind(kind) => write!(f, "kind:{kind}"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Pagination {
    Windowed(ClientWindow),
    Paged(ServerPages),
}

#[derive(Debug)]
pub struct TracePartition {
    key: PartitionKey,
    profile: TraceProfile,
    tree: TraceTree,
    pagination: Pagination,
}

impl TracePartition {
    /// Client-windowed partition over a fully fetched record array.
    pub fn windowed(
        key: PartitionKey,
        profile: TraceProfile,
        records: Vec<LogRecord>,
        window: WindowConfig,
    ) -> Self {
        let mut partition = Self {
            key,
            profile,
            tree: TraceTree::new(),
            pagination: Pagination::Windowed(ClientWindow::new(records, window)),
        };
        partition.create_tree();
        partition
    }

    /// Server-paged partition over a history of `total` records.
    pub fn paged(
        key: PartitionKey,
        profile: TraceProfile,
        total: u64,
        selected: Option<RecordIndex>,
    ) -> Self {
        let pages = ServerPages::new(profile.kind, profile.page_size, total, selected);
        let mut partition = Self {
            key,
            profile,
            tree: TraceTree::new(),
            pagination: Pagination::Paged(pages),
        };
        partition.create_tree();
        partition
    }

    pub fn key(&self) -> PartitionKey {
        self.key
    }

    pub fn profile(&self) -> &TraceProfile {
        &self.profile
    }

    pub fn tree(&self) -> &TraceTree {
        &self.tree
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    /// Start of the visible window, for client-windowed partitions.
    pub fn window_offset(&self) -> Option<usize> {
        match &self.pagination {
            Pagination::Windowed(window) => Some(window.offset()),
            Pagination::Paged(_) => None,
        }
    }

    pub(crate) fn reveal_node(&mut self, id: NodeId) -> Reveal {
        Reveal::expand(&mut self.tree, id)
    }

    fn thread_id(&self) -> Option<ThreadId> {
        match self.key {
            PartitionKey::Thread(id) => Some(id),
            _ => None,
        }
    }

    fn header(&self) -> NodeKind {
        match self.key {
            PartitionKey::Thread(thread_id) => NodeKind::Thread { thread_id },
            PartitionKey::Record => NodeKind::Root {
                kind: TraceKind::Record,
            },
            PartitionKey::Kind(kind) => NodeKind::Root { kind },
        }
    }

    /// Rebuild the forest from the partition's current pagination state and
    /// return its roots.
    pub fn create_tree(&mut self) -> &[NodeId] {
        let header = self.header();
        let thread_id = self.thread_id();
        match &mut self.pagination {
            Pagination::Windowed(window) => {
                window.rebuild(&mut self.tree, header, thread_id);
            }
            Pagination::Paged(pages) => pages.rebuild(&mut self.tree),
        }
        debug!(
            target: "rdbg.trace",
            key = %self.key,
            nodes = self.tree.len(),
            "materialized partition"
        );
        self.tree.roots()
    }

    pub fn roots(&self) -> &[NodeId] {
        self.tree.roots()
    }

    /// Children of `id`, fetching them first when the node is lazily
    /// populated.
    pub async fn children<B>(&mut self, backend: &B, id: NodeId) -> Vec<NodeId>
    where
        B: TraceBackend + ?Sized,
    {
        self.load(backend, id).await;
        self.tree.children(id).to_vec()
    }

    pub async fn expand<B>(&mut self, backend: &B, id: NodeId) -> Vec<NodeId>
    where
        B: TraceBackend + ?Sized,
    {
        self.tree.set_expanded(id, true);
        self.children(backend, id).await
    }

    pub fn collapse(&mut self, id: NodeId) {
        self.tree.set_expanded(id, false);
    }

    pub(crate) async fn load<B>(&mut self, backend: &B, id: NodeId)
    where
        B: TraceBackend + ?Sized,
    {
        if let Pagination::Paged(pages) = &self.pagination {
            pages.load_children(&mut self.tree, backend, id).await;
        }
    }

    /// Widen a client window by one step and rebuild. `false` for server
    /// paging or when the window already starts at the history start.
    pub fn load_more(&mut self) -> bool {
        let Pagination::Windowed(window) = &mut self.pagination else {
            return false;
        };
        if !window.load_more() {
            return false;
        }
        self.create_tree();
        true
    }

    /// Handle a click on a placeholder. Returns whether the forest changed.
    pub fn activate(&mut self, id: NodeId) -> bool {
        match self.tree.kind(id) {
            Some(NodeKind::LoadMore) => self.load_more(),
            _ => false,
        }
    }

    pub fn tree_item(&self, id: NodeId) -> TraceResult<TreeItem> {
        let history_len = match &self.pagination {
            Pagination::Windowed(_) => None,
            Pagination::Paged(pages) => Some(pages.total()),
        };
        self.profile.tree_item(&self.tree, id, history_len)
    }

    /// Materialize the node of record `index`, widening the window or
    /// fetching its page as needed, and expand its ancestors.
    pub async fn reveal_index<B>(&mut self, backend: &B, index: RecordIndex) -> Option<Reveal>
    where
        B: TraceBackend + ?Sized,
    {
        let node = self.locate(backend, index).await?;
        Some(self.reveal_node(node))
    }

    pub(crate) async fn locate<B>(&mut self, backend: &B, index: RecordIndex) -> Option<NodeId>
    where
        B: TraceBackend + ?Sized,
    {
        match &mut self.pagination {
            Pagination::Windowed(window) => {
                let pos = window.position_of(index)?;
                if window.ensure_visible(pos) {
                    self.create_tree();
                }
            }
            Pagination::Paged(pages) => {
                if index >= pages.total() {
                    return None;
                }
                let number = page_number(index, pages.page_size());
                self.load_page(backend, number).await?;
            }
        }
        self.tree.find_by_index(index)
    }

    /// Top-level page `number` with its records fetched.
    pub(crate) async fn load_page<B>(&mut self, backend: &B, number: u64) -> Option<NodeId>
    where
        B: TraceBackend + ?Sized,
    {
        let Pagination::Paged(pages) = &mut self.pagination else {
            return None;
        };
        let page = pages.ensure_page(&mut self.tree, number)?;
        self.load(backend, page).await;
        Some(page)
    }

    /// Flat position of a record inside the partition. Server-paged histories
    /// are addressed by index directly.
    pub(crate) fn position_of(&self, index: RecordIndex) -> Option<u64> {
        match &self.pagination {
            Pagination::Windowed(window) => window.position_of(index).map(|pos| pos as u64),
            Pagination::Paged(pages) => (index < pages.total()).then_some(index),
        }
    }

    /// Record index at flat position `pos`.
    pub(crate) fn index_at(&self, pos: u64) -> Option<RecordIndex> {
        match &self.pagination {
            Pagination::Windowed(window) => {
                window.record_at(pos as usize).map(|record| record.index)
            }
            Pagination::Paged(pages) => (pos < pages.total()).then_some(pos),
        }
    }
}
