use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backend::{BackendError, PlaybackDirection, TraceBackend, TraceOptions};
use crate::materialize::descendant_end;
use crate::record::{LogRecord, RecordIndex, RecordSnapshot, ThreadId, TraceKind};

/// A request observed by [`MockBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    FetchRoot {
        kind: TraceKind,
        offset: u64,
        page_size: usize,
    },
    FetchChildren {
        kind: TraceKind,
        parent_index: RecordIndex,
        offset: u64,
        page_size: usize,
    },
    FetchParent {
        kind: TraceKind,
        child_index: RecordIndex,
        offset: u64,
        page_size: usize,
    },
    FetchFullLog(TraceKind),
    EnableTrace(TraceKind, TraceOptions),
    DisableTrace(TraceKind),
    CollectRecord(ThreadId),
    Playback {
        direction: PlaybackDirection,
        count: u64,
        thread_id: ThreadId,
    },
}

#[derive(Default)]
struct State {
    logs: HashMap<TraceKind, Vec<LogRecord>>,
    record: RecordSnapshot,
    closed: bool,
    failure: Option<BackendError>,
    calls: Vec<MockCall>,
}

/// Deterministic, in-memory debugger. Each history is addressed by position,
/// so record indices are expected to be `0..len`.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<State>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_log(&self, kind: TraceKind, records: Vec<LogRecord>) {
        self.state.lock().logs.insert(kind, records);
    }

    pub fn set_record(&self, snapshot: RecordSnapshot) {
        self.state.lock().record = snapshot;
    }

    pub fn record(&self) -> RecordSnapshot {
        self.state.lock().record.clone()
    }

    /// Every later request fails with `NoSession`.
    pub fn close_session(&self) {
        self.state.lock().closed = true;
    }

    /// Every later request fails with `err` until cleared.
    pub fn fail_with(&self, err: Option<BackendError>) {
        self.state.lock().failure = err;
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn begin(&self, call: MockCall) -> Result<parking_lot::MutexGuard<'_, State>, BackendError> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if state.closed {
            return Err(BackendError::NoSession);
        }
        if let Some(err) = state.failure.clone() {
            return Err(err);
        }
        Ok(state)
    }
}

fn page(records: &[LogRecord], offset: u64, page_size: usize) -> Vec<LogRecord> {
    records
        .iter()
        .skip(offset as usize)
        .take(page_size)
        .cloned()
        .collect()
}

#[async_trait]
impl TraceBackend for MockBackend {
    async fn fetch_root(
        &self,
        kind: TraceKind,
        offset: u64,
        page_size: usize,
    ) -> Result<Vec<LogRecord>, BackendError> {
        let state = self.begin(MockCall::FetchRoot {
            kind,
            offset,
            page_size,
        })?;
        Ok(state
            .logs
            .get(&kind)
            .map(|records| page(records, offset, page_size))
            .unwrap_or_default())
    }

    async fn fetch_children(
        &self,
        kind: TraceKind,
        parent_index: RecordIndex,
        offset: u64,
        page_size: usize,
    ) -> Result<Vec<LogRecord>, BackendError> {
        let state = self.begin(MockCall::FetchChildren {
            kind,
            parent_index,
            offset,
            page_size,
        })?;
        let Some(records) = state.logs.get(&kind) else {
            return Ok(Vec::new());
        };
        let pos = parent_index as usize;
        if pos >= records.len() {
            return Ok(Vec::new());
        }
        let end = descendant_end(records, pos);
        Ok(page(&records[pos + 1..end], offset, page_size))
    }

    async fn fetch_parent(
        &self,
        kind: TraceKind,
        child_index: RecordIndex,
        offset: u64,
        page_size: usize,
    ) -> Result<Option<LogRecord>, BackendError> {
        let state = self.begin(MockCall::FetchParent {
            kind,
            child_index,
            offset,
            page_size,
        })?;
        let Some(records) = state.logs.get(&kind) else {
            return Ok(None);
        };
        let Some(child) = records.get(child_index as usize) else {
            return Ok(None);
        };
        Ok(records[..child_index as usize]
            .iter()
            .rev()
            .find(|record| record.depth < child.depth)
            .cloned())
    }

    async fn fetch_full_log(&self, kind: TraceKind) -> Result<Vec<LogRecord>, BackendError> {
        let state = self.begin(MockCall::FetchFullLog(kind))?;
        Ok(state.logs.get(&kind).cloned().unwrap_or_default())
    }

    async fn enable_trace(
        &self,
        kind: TraceKind,
        options: &TraceOptions,
    ) -> Result<(), BackendError> {
        self.begin(MockCall::EnableTrace(kind, options.clone()))?;
        Ok(())
    }

    async fn disable_trace(&self, kind: TraceKind) -> Result<(), BackendError> {
        self.begin(MockCall::DisableTrace(kind))?;
        Ok(())
    }

    async fn collect_record(&self, thread_id: ThreadId) -> Result<RecordSnapshot, BackendError> {
        let state = self.begin(MockCall::CollectRecord(thread_id))?;
        Ok(state.record.clone())
    }

    async fn playback(
        &self,
        direction: PlaybackDirection,
        count: u64,
        thread_id: ThreadId,
    ) -> Result<(), BackendError> {
        let mut state = self.begin(MockCall::Playback {
            direction,
            count,
            thread_id,
        })?;
        if let Some(stopped) = state.record.stopped_index {
            state.record.stopped_index = Some(match direction {
                PlaybackDirection::StepForward => stopped + count,
                PlaybackDirection::StepBack => stopped.saturating_sub(count),
            });
        }
        Ok(())
    }
}
