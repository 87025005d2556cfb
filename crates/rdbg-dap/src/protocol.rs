//! The `rdbgTraceInspector` custom request and event exchanged with the rdbg
//! debug adapter.
//!
//! Every inspector request is one DAP request named [`INSPECTOR_COMMAND`]
//! whose arguments carry a `command` (`trace`, `record` or `logs`) and a
//! `subCommand`. The adapter announces new trace data with an event of the
//! same name whose body is a [`LogsUpdated`] payload.

use rdbg_trace::{
    LogRecord, LogsUpdated, PlaybackDirection, RecordIndex, ThreadId, TraceEvent, TraceKind,
};
use serde::{Deserialize, Serialize};

pub const INSPECTOR_COMMAND: &str = "rdbgTraceInspector";
pub const INSPECTOR_EVENT: &str = "rdbgTraceInspector";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum InspectorRequest {
    Trace(TraceRequest),
    Record(RecordRequest),
    Logs(LogsRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "subCommand", rename_all = "camelCase")]
pub enum TraceRequest {
    #[serde(rename_all = "camelCase")]
    Enable {
        events: Vec<TraceEvent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter_reg_exp: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_log_size: Option<u64>,
    },
    Disable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "subCommand", rename_all = "camelCase")]
pub enum RecordRequest {
    Enable,
    Disable,
    #[serde(rename_all = "camelCase")]
    Collect { thread_id: ThreadId },
    #[serde(rename_all = "camelCase")]
    Step {
        direction: PlaybackDirection,
        count: u64,
        thread_id: ThreadId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "subCommand", rename_all = "camelCase")]
pub enum LogsRequest {
    #[serde(rename_all = "camelCase")]
    Root {
        #[serde(rename = "type")]
        kind: TraceKind,
        offset: u64,
        page_size: usize,
    },
    #[serde(rename_all = "camelCase")]
    Children {
        #[serde(rename = "type")]
        kind: TraceKind,
        index: RecordIndex,
        offset: u64,
        page_size: usize,
    },
    #[serde(rename_all = "camelCase")]
    Parent {
        #[serde(rename = "type")]
        kind: TraceKind,
        index: RecordIndex,
        offset: u64,
        page_size: usize,
    },
    Full {
        #[serde(rename = "type")]
        kind: TraceKind,
    },
}

/// Body of `logs` `root`, `children` and `full`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsBody {
    #[serde(default)]
    pub logs: Vec<LogRecord>,
}

/// Body of `logs` `parent`; a missing `log` means the page header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentBody {
    #[serde(default)]
    pub log: Option<LogRecord>,
}

/// Body of `stopped` events; only the thread matters here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedBody {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub thread_id: Option<ThreadId>,
}

/// The single event kind a legacy per-kind trace enables.
pub fn event_for_kind(kind: TraceKind) -> Option<TraceEvent> {
    match kind {
        TraceKind::Line => Some(TraceEvent::Line),
        TraceKind::Call => Some(TraceEvent::Call),
        TraceKind::Exception => Some(TraceEvent::Exception),
        TraceKind::Trace | TraceKind::Record => None,
    }
}
