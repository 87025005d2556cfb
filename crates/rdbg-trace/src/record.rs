use std::fmt;

use serde::{Deserialize, Serialize};

/// Thread (or fiber) identifier reported by the debugger.
pub type ThreadId = i64;

/// Stable position of a record in the append-only execution history.
pub type RecordIndex = u64;

/// The kinds of trace logs the debugger can collect.
///
/// `Line`, `Call` and `Exception` are the legacy per-kind views backed by
/// server-side paging. `Trace` is the combined multi-thread trace and `Record`
/// is the record/replay history; both are fetched in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    Line,
    Call,
    Exception,
    Trace,
    Record,
}

impl TraceKind {
    pub const LEGACY: [TraceKind; 3] = [TraceKind::Line, TraceKind::Call, TraceKind::Exception];

    pub fn as_str(self) -> &'static str {
        match self {
            TraceKind::Line => "line",
            TraceKind::Call => "call",
            TraceKind::Exception => "exception",
            TraceKind::Trace => "trace",
            TraceKind::Record => "record",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "line" => Some(TraceKind::Line),
            "call" => Some(TraceKind::Call),
            "exception" => Some(TraceKind::Exception),
            "trace" => Some(TraceKind::Trace),
            "record" => Some(TraceKind::Record),
            _ => None,
        }
    }
}

impl fmt::Display for TraceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source position of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub path: String,
    pub line: u32,
    /// Method name; present for call-kind records only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Location {
    pub fn new(path: impl Into<String>, line: u32) -> Self {
        Self {
            path: path.into(),
            line,
            name: None,
        }
    }

    /// Last path component, used for compact labels.
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.path.as_str())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

/// One captured execution event. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub index: RecordIndex,
    pub depth: u32,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<ThreadId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<Parameter>>,
    /// Server-supplied hint that children exist beyond the fetched page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_child: Option<bool>,
}

impl LogRecord {
    pub fn new(index: RecordIndex, depth: u32, location: Location) -> Self {
        Self {
            index,
            depth,
            location,
            name: None,
            thread_id: None,
            return_value: None,
            parameters: None,
            has_child: None,
        }
    }

    pub fn with_thread(mut self, thread_id: ThreadId) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.location.name = Some(name.clone());
        self.name = Some(name);
        self
    }

    pub fn with_return_value(mut self, value: impl Into<String>) -> Self {
        self.return_value = Some(value.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<Parameter>) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn with_has_child(mut self, has_child: bool) -> Self {
        self.has_child = Some(has_child);
        self
    }

    /// Method name of a call record, from either the record or its location.
    pub fn call_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.location.name.as_deref())
    }

    pub fn is_return(&self) -> bool {
        self.return_value.is_some()
    }

    pub fn hints_children(&self) -> bool {
        self.has_child.unwrap_or(false)
    }
}

/// Snapshot returned by `collect-record`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSnapshot {
    pub stopped_index: Option<RecordIndex>,
    #[serde(default)]
    pub logs: Vec<LogRecord>,
}

/// Smallest depth present in `records`, or `None` for an empty slice.
pub fn min_depth(records: &[LogRecord]) -> Option<u32> {
    records.iter().map(|record| record.depth).min()
}
