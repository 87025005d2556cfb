//! Per-kind presentation and paging parameters.
//!
//! The line, call, exception, trace and record views differ only in how a
//! record is labelled, which icon it gets, how large a server page is and which
//! pagination strategy feeds them. [`TraceProfile`] carries those differences so
//! one engine serves every view.

use serde::{Deserialize, Serialize};

use crate::error::{TraceError, TraceResult};
use crate::record::{Location, LogRecord, RecordIndex, TraceKind};
use crate::tree::{NodeId, NodeKind, TraceTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Full log fetched once; a suffix window slides backwards on "load more".
    ClientWindowed,
    /// Fixed-size pages fetched on demand.
    ServerPaged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Number of root-level groups visible before any "load more".
    pub initial_groups: usize,
    /// Records revealed per "load more" activation.
    pub step: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            initial_groups: 5,
            step: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSizes {
    pub line: usize,
    pub call: usize,
    pub exception: usize,
}

impl Default for PageSizes {
    fn default() -> Self {
        Self {
            line: 5,
            call: 5,
            exception: 50,
        }
    }
}

impl PageSizes {
    pub fn for_kind(&self, kind: TraceKind) -> usize {
        match kind {
            TraceKind::Line => self.line,
            TraceKind::Call => self.call,
            TraceKind::Exception => self.exception,
            TraceKind::Trace | TraceKind::Record => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Icon {
    Line,
    Call,
    Return,
    Exception,
    Omitted,
    LoadMore,
    Page,
    Thread,
    Root,
}

impl Icon {
    /// Codicon identifier the host can map to its own icon set.
    pub fn codicon(self) -> &'static str {
        match self {
            Icon::Line => "debug-line-by-line",
            Icon::Call => "arrow-small-right",
            Icon::Return => "arrow-small-left",
            Icon::Exception => "error",
            Icon::Omitted => "ellipsis",
            Icon::LoadMore => "fold-up",
            Icon::Page => "files",
            Icon::Thread => "debug-thread",
            Icon::Root => "history",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub label: String,
    pub description: Option<String>,
}

pub type LabelFn = fn(&LogRecord) -> TraceResult<Label>;
pub type IconFn = fn(&LogRecord) -> Icon;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collapsible {
    None,
    Collapsed,
    Expanded,
}

/// Host-neutral description of one node, ready to be drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeItem {
    pub label: String,
    pub description: Option<String>,
    pub tooltip: Option<String>,
    pub icon: Icon,
    pub collapsible: Collapsible,
    pub location: Option<Location>,
    pub index: Option<RecordIndex>,
}

#[derive(Clone, Copy)]
pub struct TraceProfile {
    pub kind: TraceKind,
    pub page_size: usize,
    pub strategy: Strategy,
    pub label: LabelFn,
    pub icon: IconFn,
}

impl std::fmt::Debug for TraceProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceProfile")
            .field("kind", &self.kind)
            .field("page_size", &self.page_size)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl TraceProfile {
    pub fn line(page_size: usize) -> Self {
        Self {
            kind: TraceKind::Line,
            page_size,
            strategy: Strategy::ServerPaged,
            label: line_label,
            icon: |_| Icon::Line,
        }
    }

    pub fn call(page_size: usize) -> Self {
        Self {
            kind: TraceKind::Call,
            page_size,
            strategy: Strategy::ServerPaged,
            label: call_label,
            icon: call_icon,
        }
    }

    pub fn exception(page_size: usize) -> Self {
        Self {
            kind: TraceKind::Exception,
            page_size,
            strategy: Strategy::ServerPaged,
            label: exception_label,
            icon: |_| Icon::Exception,
        }
    }

    pub fn trace() -> Self {
        Self {
            kind: TraceKind::Trace,
            page_size: 0,
            strategy: Strategy::ClientWindowed,
            label: mixed_label,
            icon: mixed_icon,
        }
    }

    pub fn record() -> Self {
        Self {
            kind: TraceKind::Record,
            page_size: 0,
            strategy: Strategy::ClientWindowed,
            label: mixed_label,
            icon: mixed_icon,
        }
    }

    pub fn for_kind(kind: TraceKind, pages: &PageSizes) -> Self {
        match kind {
            TraceKind::Line => Self::line(pages.line),
            TraceKind::Call => Self::call(pages.call),
            TraceKind::Exception => Self::exception(pages.exception),
            TraceKind::Trace => Self::trace(),
            TraceKind::Record => Self::record(),
        }
    }

    /// Describe `id` for the host. `history_len` bounds the range shown on
    /// the last top-level page of a server-paged history. Fails when a record
    /// lacks a field this profile requires.
    pub fn tree_item(
        &self,
        tree: &TraceTree,
        id: NodeId,
        history_len: Option<u64>,
    ) -> TraceResult<TreeItem> {
        let node = tree.node(id).ok_or(TraceError::StaleNode(id))?;
        let collapsible = if node.children.is_empty() && node.children_loaded {
            Collapsible::None
        } else if node.expanded {
            Collapsible::Expanded
        } else {
            Collapsible::Collapsed
        };

        let item = match &node.kind {
            NodeKind::Log(record) => {
                let Label { label, description } = (self.label)(record)?;
                TreeItem {
                    label,
                    description,
                    tooltip: Some(record.location.to_string()),
                    icon: (self.icon)(record),
                    collapsible,
                    location: Some(record.location.clone()),
                    index: Some(record.index),
                }
            }
            NodeKind::OmittedRange { offset, depth, .. } => TreeItem {
                label: "..".to_string(),
                description: Some(format!("resumes at #{offset}")),
                tooltip: Some(format!("records above depth {depth} are outside the loaded range")),
                icon: Icon::Omitted,
                collapsible,
                location: None,
                index: None,
            },
            NodeKind::LoadMore => TreeItem {
                label: "Load more".to_string(),
                description: None,
                tooltip: None,
                icon: Icon::LoadMore,
                collapsible: Collapsible::None,
                location: None,
                index: None,
            },
            NodeKind::Page {
                number,
                offset,
                parent_index,
            } => {
                let first = *offset;
                let mut last = first + self.page_size.saturating_sub(1) as u64;
                if let (None, Some(len)) = (parent_index, history_len) {
                    last = last.min(len.saturating_sub(1)).max(first);
                }
                TreeItem {
                    label: match parent_index {
                        Some(_) => format!("More ({first}..{last})"),
                        None => format!("Page {number}"),
                    },
                    description: Some(format!("#{first}..#{last}")),
                    tooltip: None,
                    icon: Icon::Page,
                    collapsible,
                    location: None,
                    index: None,
                }
            }
            NodeKind::Root { kind } => TreeItem {
                label: match kind {
                    TraceKind::Record => "Recorded history".to_string(),
                    other => format!("{other} trace"),
                },
                description: None,
                tooltip: None,
                icon: Icon::Root,
                collapsible,
                location: None,
                index: None,
            },
            NodeKind::Thread { thread_id } => TreeItem {
                label: format!("Thread {thread_id}"),
                description: None,
                tooltip: None,
                icon: Icon::Thread,
                collapsible,
                location: None,
                index: None,
            },
        };
        Ok(item)
    }
}

fn location_label(location: &Location) -> String {
    format!("{}:{}", location.file_name(), location.line)
}

fn line_label(record: &LogRecord) -> TraceResult<Label> {
    Ok(Label {
        label: location_label(&record.location),
        description: None,
    })
}

fn call_label(record: &LogRecord) -> TraceResult<Label> {
    let name = record.call_name().ok_or(TraceError::MalformedRecord {
        index: record.index,
        field: "name",
    })?;
    Ok(Label {
        label: name.to_string(),
        description: call_description(record),
    })
}

fn exception_label(record: &LogRecord) -> TraceResult<Label> {
    let name = record.name.as_deref().ok_or(TraceError::MalformedRecord {
        index: record.index,
        field: "name",
    })?;
    Ok(Label {
        label: name.to_string(),
        description: Some(location_label(&record.location)),
    })
}

/// Trace and record logs interleave line and call events; a name marks a call.
fn mixed_label(record: &LogRecord) -> TraceResult<Label> {
    match record.call_name() {
        Some(name) => Ok(Label {
            label: name.to_string(),
            description: call_description(record)
                .or_else(|| Some(location_label(&record.location))),
        }),
        None => line_label(record),
    }
}

fn call_description(record: &LogRecord) -> Option<String> {
    if let Some(value) = &record.return_value {
        return Some(format!("#=> {value}"));
    }
    let params = record.parameters.as_ref().filter(|params| !params.is_empty())?;
    let rendered: Vec<String> = params
        .iter()
        .map(|param| format!("{} = {}", param.name, param.value))
        .collect();
    Some(format!("({})", rendered.join(", ")))
}

fn call_icon(record: &LogRecord) -> Icon {
    if record.is_return() {
        Icon::Return
    } else {
        Icon::Call
    }
}

fn mixed_icon(record: &LogRecord) -> Icon {
    match record.call_name() {
        Some(_) => call_icon(record),
        None => Icon::Line,
    }
}
