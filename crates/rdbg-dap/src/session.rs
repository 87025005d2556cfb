//! One attached inspector session: the DAP handshake followed by a loop that
//! applies adapter events to the [`TraceRouter`] one at a time.

use rdbg_trace::{LogsUpdated, RouterConfig, ThreadId, TraceRouter};
use serde_json::json;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ClientError, DapClient};
use crate::dap::codec::sanitize_json_error_message;
use crate::dap::messages::Event;
use crate::inspector::DapTraceBackend;
use crate::protocol::{StoppedBody, INSPECTOR_EVENT};

pub const CLIENT_ID: &str = "rdbg-inspector";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("`{command}` handshake step failed: {source}")]
    Handshake {
        command: &'static str,
        #[source]
        source: ClientError,
    },
}

/// What an adapter event changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    LogsChanged,
    Stopped { thread_id: Option<ThreadId> },
    Ended,
}

pub struct InspectorSession {
    router: TraceRouter<DapTraceBackend>,
    events: broadcast::Receiver<Event>,
    shutdown: CancellationToken,
}

impl InspectorSession {
    /// `initialize`, `attach`, `configurationDone`, in that order.
    pub async fn attach(client: DapClient, config: RouterConfig) -> Result<Self, SessionError> {
        // Subscribe first so nothing sent during the handshake is missed.
        let events = client.subscribe_events();
        let shutdown = client.shutdown_token();

        handshake(
            &client,
            "initialize",
            Some(json!({
                "clientID": CLIENT_ID,
                "clientName": CLIENT_ID,
                "adapterID": "rdbg",
                "linesStartAt1": true,
                "columnsStartAt1": true,
                "pathFormat": "path",
            })),
        )
        .await?;
        handshake(
            &client,
            "attach",
            Some(json!({ "type": "rdbg", "request": "attach" })),
        )
        .await?;
        handshake(&client, "configurationDone", None).await?;
        info!(target: "rdbg.dap", "attached to debug adapter");

        Ok(Self {
            router: TraceRouter::new(DapTraceBackend::new(client), config),
            events,
            shutdown,
        })
    }

    pub fn router(&self) -> &TraceRouter<DapTraceBackend> {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut TraceRouter<DapTraceBackend> {
        &mut self.router
    }

    /// Wait for the next event that changes something. Returns `None` once the
    /// session has ended.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        loop {
            if self.router.is_ended() {
                return None;
            }
            let received = tokio::select! {
                biased;
                received = self.events.recv() => received,
                _ = self.shutdown.cancelled() => {
                    debug!(target: "rdbg.dap", "connection shut down");
                    self.router.end_session();
                    return Some(SessionUpdate::Ended);
                }
            };
            match received {
                Ok(event) => {
                    if let Some(update) = self.handle_event(&event).await {
                        return Some(update);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "rdbg.dap", skipped, "dropped adapter events");
                }
                Err(RecvError::Closed) => {
                    self.router.end_session();
                    return Some(SessionUpdate::Ended);
                }
            }
        }
    }

    /// Apply one adapter event. Events the inspector does not care about
    /// yield `None`.
    pub async fn handle_event(&mut self, event: &Event) -> Option<SessionUpdate> {
        match event.event.as_str() {
            INSPECTOR_EVENT => {
                let body = event.body.clone().unwrap_or_default();
                let update: LogsUpdated = match serde_json::from_value(body) {
                    Ok(update) => update,
                    Err(err) => {
                        warn!(
                            target: "rdbg.dap",
                            error = %sanitize_json_error_message(&err.to_string()),
                            "malformed logs notification"
                        );
                        return None;
                    }
                };
                self.router.on_logs_changed(&update).await;
                Some(SessionUpdate::LogsChanged)
            }
            "stopped" => {
                let body: StoppedBody = event
                    .body
                    .clone()
                    .and_then(|body| serde_json::from_value(body).ok())
                    .unwrap_or_default();
                debug!(target: "rdbg.dap", reason = ?body.reason, thread_id = ?body.thread_id, "stopped");
                if let Some(thread_id) = body.thread_id {
                    self.router.set_last_active_thread(thread_id);
                }
                if self.router.is_recording() {
                    self.router.refresh_record().await;
                }
                Some(SessionUpdate::Stopped {
                    thread_id: body.thread_id,
                })
            }
            "terminated" | "exited" => {
                self.router.end_session();
                Some(SessionUpdate::Ended)
            }
            other => {
                debug!(target: "rdbg.dap", event = other, "ignoring event");
                None
            }
        }
    }
}

async fn handshake(
    client: &DapClient,
    command: &'static str,
    arguments: Option<serde_json::Value>,
) -> Result<(), SessionError> {
    client
        .request(command, arguments)
        .await
        .map(drop)
        .map_err(|source| SessionError::Handshake { command, source })
}
