//! Async DAP client: requests are correlated with responses by `seq`, events
//! are fanned out to subscribers.

use std::{
    collections::HashMap,
    io,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use rdbg_config::ConnectionConfig;
use serde_json::Value;
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    sync::{broadcast, oneshot, Mutex},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dap::codec::{DapError, DapReader, DapWriter};
use crate::dap::messages::{Event, ProtocolMessage, Request, Response};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Dap(#[from] DapError),
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("timed out waiting for `{command}`")]
    Timeout { command: String },
    #[error("`{command}` failed: {message}")]
    Rejected { command: String, message: String },
    #[error("connection closed")]
    ConnectionClosed,
    #[error("client shut down")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Clone)]
pub struct DapClientConfig {
    pub connect_timeout: Duration,
    pub reply_timeout: Duration,
    pub event_channel_size: usize,
}

impl Default for DapClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            reply_timeout: Duration::from_secs(10),
            event_channel_size: 256,
        }
    }
}

impl From<&ConnectionConfig> for DapClientConfig {
    fn from(connection: &ConnectionConfig) -> Self {
        Self {
            connect_timeout: connection.connect_timeout(),
            reply_timeout: connection.reply_timeout(),
            ..Self::default()
        }
    }
}

type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

struct Inner {
    writer: Mutex<DapWriter<BoxedWriter>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Response>>>,
    next_seq: AtomicU64,
    events: broadcast::Sender<Event>,
    shutdown: CancellationToken,
    /// Set by the read loop when the adapter went away.
    closed: AtomicBool,
    config: DapClientConfig,
}

#[derive(Clone)]
pub struct DapClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DapClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DapClient")
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl DapClient {
    pub async fn connect(connection: &ConnectionConfig) -> Result<Self> {
        let config = DapClientConfig::from(connection);
        let addr = connection.address();
        let connecting = TcpStream::connect(addr.as_str());
        let stream = match tokio::time::timeout(config.connect_timeout, connecting).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ClientError::Connect { addr, source }),
            Err(_elapsed) => {
                return Err(ClientError::Connect {
                    addr,
                    source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                })
            }
        };
        let _ = stream.set_nodelay(true);
        debug!(target: "rdbg.dap", %addr, "connected");

        let (reader, writer) = stream.into_split();
        Ok(Self::spawn(reader, writer, config))
    }

    /// Start a client over an already established byte stream.
    pub fn spawn<R, W>(reader: R, writer: W, config: DapClientConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        let (events, _) = broadcast::channel(config.event_channel_size.max(1));
        let writer: BoxedWriter = Box::pin(writer);
        let inner = Arc::new(Inner {
            writer: Mutex::new(DapWriter::new(writer)),
            pending: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
            events,
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
            config,
        });

        tokio::spawn(read_loop(DapReader::new(reader), inner.clone()));
        Self { inner }
    }

    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Cancelled on [`DapClient::shutdown`] and when the adapter closes the
    /// connection.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    fn stopped_error(&self) -> ClientError {
        if self.inner.closed.load(Ordering::Acquire) {
            ClientError::ConnectionClosed
        } else {
            ClientError::Cancelled
        }
    }

    /// Send `command` and wait for its response body.
    pub async fn request(&self, command: &str, arguments: Option<Value>) -> Result<Option<Value>> {
        if self.inner.shutdown.is_cancelled() {
            return Err(self.stopped_error());
        }

        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().await.insert(seq, tx);

        let message = ProtocolMessage::Request(Request {
            seq,
            command: command.to_owned(),
            arguments,
        });
        let written = {
            let mut writer = self.inner.writer.lock().await;
            writer.write_message(&message).await
        };
        if let Err(err) = written {
            self.remove_pending(seq).await;
            return Err(err.into());
        }

        let response = tokio::select! {
            _ = self.inner.shutdown.cancelled() => {
                self.remove_pending(seq).await;
                return Err(self.stopped_error());
            }
            res = tokio::time::timeout(self.inner.config.reply_timeout, rx) => {
                match res {
                    Ok(Ok(response)) => response,
                    Ok(Err(_closed)) => return Err(ClientError::ConnectionClosed),
                    Err(_elapsed) => {
                        self.remove_pending(seq).await;
                        return Err(ClientError::Timeout { command: command.to_owned() });
                    }
                }
            }
        };

        if !response.success {
            return Err(ClientError::Rejected {
                command: response.command,
                message: response.message.unwrap_or_default(),
            });
        }
        Ok(response.body)
    }

    async fn remove_pending(&self, seq: u64) {
        self.inner.pending.lock().await.remove(&seq);
    }
}

async fn read_loop<R: AsyncRead + Unpin>(mut reader: DapReader<R>, inner: Arc<Inner>) {
    loop {
        let message = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            res = reader.read_message::<ProtocolMessage>() => res,
        };

        match message {
            Ok(Some(ProtocolMessage::Response(response))) => {
                let tx = inner.pending.lock().await.remove(&response.request_seq);
                match tx {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => debug!(
                        target: "rdbg.dap",
                        request_seq = response.request_seq,
                        "response without a pending request"
                    ),
                }
            }
            Ok(Some(ProtocolMessage::Event(event))) => {
                // No subscribers is fine.
                let _ = inner.events.send(event);
            }
            Ok(Some(ProtocolMessage::Request(request))) => {
                debug!(target: "rdbg.dap", command = %request.command, "ignoring reverse request");
            }
            Ok(None) => {
                debug!(target: "rdbg.dap", "adapter closed the connection");
                break;
            }
            Err(DapError::Json(message)) => {
                warn!(target: "rdbg.dap", error = %message, "skipping undecodable message");
            }
            Err(err) => {
                warn!(target: "rdbg.dap", error = %err, "connection failed");
                break;
            }
        }
    }

    if !inner.shutdown.is_cancelled() {
        inner.closed.store(true, Ordering::Release);
    }
    inner.shutdown.cancel();

    // Dropping the senders fails every waiting request.
    inner.pending.lock().await.clear();
}
