//! The requests the engine issues to the debugger.
//!
//! The engine never talks to a transport directly; `rdbg-dap` implements this
//! trait over a DAP connection and [`crate::mock::MockBackend`] implements it
//! in memory for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{LogRecord, RecordIndex, RecordSnapshot, ThreadId, TraceKind};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("no active debug session")]
    NoSession,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("debugger rejected `{command}`: {message}")]
    Rejected { command: String, message: String },
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Event kinds accepted by `enable-trace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceEvent {
    Line,
    Call,
    Exception,
}

impl TraceEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            TraceEvent::Line => "line",
            TraceEvent::Call => "call",
            TraceEvent::Exception => "exception",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "line" => Some(TraceEvent::Line),
            "call" => Some(TraceEvent::Call),
            "exception" => Some(TraceEvent::Exception),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceOptions {
    pub events: Vec<TraceEvent>,
    pub filter_regexp: Option<String>,
    pub max_log_size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackDirection {
    #[serde(rename = "stepForward")]
    StepForward,
    #[serde(rename = "stepBack")]
    StepBack,
}

impl PlaybackDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackDirection::StepForward => "stepForward",
            PlaybackDirection::StepBack => "stepBack",
        }
    }
}

#[async_trait]
pub trait TraceBackend: Send + Sync {
    /// Records of one top-level page, `offset..offset + page_size`.
    async fn fetch_root(
        &self,
        kind: TraceKind,
        offset: u64,
        page_size: usize,
    ) -> Result<Vec<LogRecord>, BackendError>;

    /// Records nested under `parent_index`, one page at a time.
    async fn fetch_children(
        &self,
        kind: TraceKind,
        parent_index: RecordIndex,
        offset: u64,
        page_size: usize,
    ) -> Result<Vec<LogRecord>, BackendError>;

    /// Nearest ancestor of `child_index`, or `None` when the ancestor is the
    /// page header itself.
    async fn fetch_parent(
        &self,
        kind: TraceKind,
        child_index: RecordIndex,
        offset: u64,
        page_size: usize,
    ) -> Result<Option<LogRecord>, BackendError>;

    async fn fetch_full_log(&self, kind: TraceKind) -> Result<Vec<LogRecord>, BackendError>;

    async fn enable_trace(&self, kind: TraceKind, options: &TraceOptions) -> Result<(), BackendError>;

    async fn disable_trace(&self, kind: TraceKind) -> Result<(), BackendError>;

    async fn collect_record(&self, thread_id: ThreadId) -> Result<RecordSnapshot, BackendError>;

    async fn playback(
        &self,
        direction: PlaybackDirection,
        count: u64,
        thread_id: ThreadId,
    ) -> Result<(), BackendError>;
}
