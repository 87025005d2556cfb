//! [`TraceBackend`] over a DAP connection to the rdbg adapter.

use async_trait::async_trait;
use rdbg_trace::{
    BackendError, LogRecord, PlaybackDirection, RecordIndex, RecordSnapshot, ThreadId,
    TraceBackend, TraceKind, TraceOptions,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use crate::client::{ClientError, DapClient};
use crate::dap::codec::sanitize_json_error_message;
use crate::protocol::{
    event_for_kind, InspectorRequest, LogsBody, LogsRequest, ParentBody, RecordRequest,
    TraceRequest, INSPECTOR_COMMAND,
};

impl From<ClientError> for BackendError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::ConnectionClosed | ClientError::Cancelled => BackendError::NoSession,
            ClientError::Rejected { command, message } => {
                BackendError::Rejected { command, message }
            }
            other => BackendError::Transport(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DapTraceBackend {
    client: DapClient,
}

impl DapTraceBackend {
    pub fn new(client: DapClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &DapClient {
        &self.client
    }

    async fn send(&self, request: InspectorRequest) -> Result<Option<Value>, BackendError> {
        trace!(target: "rdbg.dap", ?request, "inspector request");
        let arguments = serde_json::to_value(&request)
            .map_err(|err| BackendError::Protocol(sanitize_json_error_message(&err.to_string())))?;
        Ok(self.client.request(INSPECTOR_COMMAND, Some(arguments)).await?)
    }

    async fn query<T: DeserializeOwned + Default>(
        &self,
        request: InspectorRequest,
    ) -> Result<T, BackendError> {
        match self.send(request).await? {
            Some(body) => serde_json::from_value(body).map_err(|err| {
                BackendError::Protocol(sanitize_json_error_message(&err.to_string()))
            }),
            None => Ok(T::default()),
        }
    }

    async fn logs(&self, request: LogsRequest) -> Result<Vec<LogRecord>, BackendError> {
        let body: LogsBody = self.query(InspectorRequest::Logs(request)).await?;
        Ok(body.logs)
    }
}

#[async_trait]
impl TraceBackend for DapTraceBackend {
    async fn fetch_root(
        &self,
        kind: TraceKind,
        offset: u64,
        page_size: usize,
    ) -> Result<Vec<LogRecord>, BackendError> {
        self.logs(LogsRequest::Root {
            kind,
            offset,
            page_size,
        })
        .await
    }

    async fn fetch_children(
        &self,
        kind: TraceKind,
        parent_index: RecordIndex,
        offset: u64,
        page_size: usize,
    ) -> Result<Vec<LogRecord>, BackendError> {
        self.logs(LogsRequest::Children {
            kind,
            index: parent_index,
            offset,
            page_size,
        })
        .await
    }

    async fn fetch_parent(
        &self,
        kind: TraceKind,
        child_index: RecordIndex,
        offset: u64,
        page_size: usize,
    ) -> Result<Option<LogRecord>, BackendError> {
        let body: ParentBody = self
            .query(InspectorRequest::Logs(LogsRequest::Parent {
                kind,
                index: child_index,
                offset,
                page_size,
            }))
            .await?;
        Ok(body.log)
    }

    async fn fetch_full_log(&self, kind: TraceKind) -> Result<Vec<LogRecord>, BackendError> {
        self.logs(LogsRequest::Full { kind }).await
    }

    async fn enable_trace(&self, kind: TraceKind, options: &TraceOptions) -> Result<(), BackendError> {
        let request = match kind {
            TraceKind::Record => InspectorRequest::Record(RecordRequest::Enable),
            TraceKind::Trace => InspectorRequest::Trace(TraceRequest::Enable {
                events: options.events.clone(),
                filter_reg_exp: options.filter_regexp.clone(),
                max_log_size: options.max_log_size,
            }),
            legacy => InspectorRequest::Trace(TraceRequest::Enable {
                events: event_for_kind(legacy).into_iter().collect(),
                filter_reg_exp: options.filter_regexp.clone(),
                max_log_size: options.max_log_size,
            }),
        };
        self.send(request).await.map(drop)
    }

    async fn disable_trace(&self, kind: TraceKind) -> Result<(), BackendError> {
        let request = match kind {
            TraceKind::Record => InspectorRequest::Record(RecordRequest::Disable),
            _ => InspectorRequest::Trace(TraceRequest::Disable),
        };
        self.send(request).await.map(drop)
    }

    async fn collect_record(&self, thread_id: ThreadId) -> Result<RecordSnapshot, BackendError> {
        self.query(InspectorRequest::Record(RecordRequest::Collect { thread_id }))
            .await
    }

    async fn playback(
        &self,
        direction: PlaybackDirection,
        count: u64,
        thread_id: ThreadId,
    ) -> Result<(), BackendError> {
        self.send(InspectorRequest::Record(RecordRequest::Step {
            direction,
            count,
            thread_id,
        }))
        .await
        .map(drop)
    }
}
