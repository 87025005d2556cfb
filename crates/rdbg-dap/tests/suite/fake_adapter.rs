//! In-process stand-in for the rdbg debug adapter, serving inspector
//! requests from a [`MockBackend`] over `tokio::io::duplex`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rdbg_dap::dap::codec::{DapReader, DapWriter};
use rdbg_dap::dap::messages::{Event, ProtocolMessage, Request, Response};
use rdbg_dap::protocol::{
    InspectorRequest, LogsBody, LogsRequest, ParentBody, RecordRequest, TraceRequest,
    INSPECTOR_COMMAND,
};
use rdbg_dap::{DapClient, DapClientConfig};
use rdbg_trace::mock::MockBackend;
use rdbg_trace::{BackendError, TraceBackend, TraceKind, TraceOptions};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub(crate) struct FakeAdapter {
    pub(crate) backend: Arc<MockBackend>,
    requests: Arc<Mutex<Vec<Request>>>,
    silent: Arc<Mutex<HashSet<String>>>,
    events: mpsc::UnboundedSender<Event>,
    stop: CancellationToken,
}

impl FakeAdapter {
    pub(crate) fn start(backend: MockBackend) -> (DapClient, FakeAdapter) {
        Self::start_with(
            backend,
            DapClientConfig {
                reply_timeout: Duration::from_secs(5),
                ..DapClientConfig::default()
            },
        )
    }

    pub(crate) fn start_with(backend: MockBackend, config: DapClientConfig) -> (DapClient, FakeAdapter) {
        let (client_stream, adapter_stream) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_stream);
        let client = DapClient::spawn(client_read, client_write, config);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let adapter = FakeAdapter {
            backend: Arc::new(backend),
            requests: Arc::default(),
            silent: Arc::default(),
            events: events_tx,
            stop: CancellationToken::new(),
        };
        tokio::spawn(serve(
            adapter_stream,
            adapter.backend.clone(),
            adapter.requests.clone(),
            adapter.silent.clone(),
            events_rx,
            adapter.stop.clone(),
        ));
        (client, adapter)
    }

    /// Commands received so far, in order.
    pub(crate) fn commands(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.command.clone())
            .collect()
    }

    /// Never answer `command`.
    pub(crate) fn ignore(&self, command: &str) {
        self.silent.lock().unwrap().insert(command.to_owned());
    }

    pub(crate) fn emit(&self, event: &str, body: Option<Value>) {
        self.events.send(Event::new(0, event, body)).unwrap();
    }

    /// Drop the connection.
    pub(crate) fn disconnect(&self) {
        self.stop.cancel();
    }
}

async fn serve(
    stream: tokio::io::DuplexStream,
    backend: Arc<MockBackend>,
    requests: Arc<Mutex<Vec<Request>>>,
    silent: Arc<Mutex<HashSet<String>>>,
    mut events: mpsc::UnboundedReceiver<Event>,
    stop: CancellationToken,
) {
    let (read, write) = tokio::io::split(stream);
    let mut writer = DapWriter::new(write);

    // Reads run on their own task so a pending event never interrupts a
    // half-read request.
    let (requests_tx, mut incoming) = mpsc::unbounded_channel::<Request>();
    let reader_stop = stop.clone();
    tokio::spawn(async move {
        let mut reader = DapReader::new(read);
        loop {
            let message = tokio::select! {
                _ = reader_stop.cancelled() => return,
                message = reader.read_message::<ProtocolMessage>() => message,
            };
            let Ok(Some(ProtocolMessage::Request(request))) = message else {
                return;
            };
            if requests_tx.send(request).is_err() {
                return;
            }
        }
    });

    let mut seq = 1u64;
    loop {
        let outgoing = tokio::select! {
            _ = stop.cancelled() => return,
            event = events.recv() => match event {
                Some(mut event) => {
                    event.seq = seq;
                    ProtocolMessage::Event(event)
                }
                None => return,
            },
            request = incoming.recv() => {
                let Some(request) = request else {
                    return;
                };
                requests.lock().unwrap().push(request.clone());
                if silent.lock().unwrap().contains(&request.command) {
                    continue;
                }
                ProtocolMessage::Response(respond(&backend, seq, &request).await)
            }
        };
        seq += 1;
        if writer.write_message(&outgoing).await.is_err() {
            return;
        }
    }
}

async fn respond(backend: &MockBackend, seq: u64, request: &Request) -> Response {
    match request.command.as_str() {
        "initialize" | "attach" | "configurationDone" => Response::success(seq, request, None),
        INSPECTOR_COMMAND => {
            let arguments = request.arguments.clone().unwrap_or_default();
            let inspector: InspectorRequest = match serde_json::from_value(arguments) {
                Ok(inspector) => inspector,
                Err(err) => return Response::error(seq, request, err.to_string()),
            };
            match dispatch(backend, inspector).await {
                Ok(body) => Response::success(seq, request, body),
                Err(err) => Response::error(seq, request, err.to_string()),
            }
        }
        other => Response::error(seq, request, format!("unsupported command {other}")),
    }
}

fn logs(logs: Vec<rdbg_trace::LogRecord>) -> Option<Value> {
    Some(serde_json::to_value(LogsBody { logs }).unwrap())
}

async fn dispatch(
    backend: &MockBackend,
    request: InspectorRequest,
) -> Result<Option<Value>, BackendError> {
    match request {
        InspectorRequest::Logs(LogsRequest::Root {
            kind,
            offset,
            page_size,
        }) => Ok(logs(backend.fetch_root(kind, offset, page_size).await?)),
        InspectorRequest::Logs(LogsRequest::Children {
            kind,
            index,
            offset,
            page_size,
        }) => Ok(logs(
            backend.fetch_children(kind, index, offset, page_size).await?,
        )),
        InspectorRequest::Logs(LogsRequest::Parent {
            kind,
            index,
            offset,
            page_size,
        }) => {
            let log = backend.fetch_parent(kind, index, offset, page_size).await?;
            Ok(Some(serde_json::to_value(ParentBody { log }).unwrap()))
        }
        InspectorRequest::Logs(LogsRequest::Full { kind }) => {
            Ok(logs(backend.fetch_full_log(kind).await?))
        }
        InspectorRequest::Trace(TraceRequest::Enable {
            events,
            filter_reg_exp,
            max_log_size,
        }) => {
            let options = TraceOptions {
                events,
                filter_regexp: filter_reg_exp,
                max_log_size,
            };
            backend.enable_trace(TraceKind::Trace, &options).await?;
            Ok(None)
        }
        InspectorRequest::Trace(TraceRequest::Disable) => {
            backend.disable_trace(TraceKind::Trace).await?;
            Ok(None)
        }
        InspectorRequest::Record(RecordRequest::Enable) => {
            backend
                .enable_trace(TraceKind::Record, &TraceOptions::default())
                .await?;
            Ok(None)
        }
        InspectorRequest::Record(RecordRequest::Disable) => {
            backend.disable_trace(TraceKind::Record).await?;
            Ok(None)
        }
        InspectorRequest::Record(RecordRequest::Collect { thread_id }) => {
            let snapshot = backend.collect_record(thread_id).await?;
            Ok(Some(serde_json::to_value(snapshot).unwrap()))
        }
        InspectorRequest::Record(RecordRequest::Step {
            direction,
            count,
            thread_id,
        }) => {
            backend.playback(direction, count, thread_id).await?;
            Ok(None)
        }
    }
}
