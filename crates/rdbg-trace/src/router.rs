//! Per-session owner of every materialized partition.
//!
//! A "logs changed" notification is fanned out here: each legacy kind named
//! in it gets a fresh server-paged partition, and while the trace view is
//! active the full log is fetched again and split by thread. Every rebuild
//! replaces the previous partition outright and is announced on the refresh
//! channel.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, PlaybackDirection, TraceBackend, TraceOptions};
use crate::cursor::{Cursor, Reveal};
use crate::error::TraceResult;
use crate::partition::{PartitionKey, TracePartition};
use crate::profile::{PageSizes, TraceProfile, TreeItem, WindowConfig};
use crate::record::{LogRecord, RecordIndex, ThreadId, TraceKind};
use crate::tree::NodeId;

const REFRESH_CHANNEL_CAPACITY: usize = 64;

/// New data available for one legacy kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindUpdate {
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_index: Option<RecordIndex>,
}

/// Payload of a "logs changed" notification. An absent kind is unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsUpdated {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<KindUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call: Option<KindUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<KindUpdate>,
}

impl LogsUpdated {
    pub fn get(&self, kind: TraceKind) -> Option<KindUpdate> {
        match kind {
            TraceKind::Line => self.line,
            TraceKind::Call => self.call,
            TraceKind::Exception => self.exception,
            TraceKind::Trace | TraceKind::Record => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshEvent {
    pub key: PartitionKey,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterConfig {
    pub window: WindowConfig,
    pub page_sizes: PageSizes,
}

pub struct TraceRouter<B> {
    backend: B,
    config: RouterConfig,
    partitions: BTreeMap<PartitionKey, TracePartition>,
    last_active_thread: Option<ThreadId>,
    trace_active: bool,
    recording: bool,
    record_stopped: Option<RecordIndex>,
    ended: bool,
    refresh_tx: broadcast::Sender<RefreshEvent>,
}

impl<B: TraceBackend> TraceRouter<B> {
    pub fn new(backend: B, config: RouterConfig) -> Self {
        let (refresh_tx, _) = broadcast::channel(REFRESH_CHANNEL_CAPACITY);
        Self {
            backend,
            config,
            partitions: BTreeMap::new(),
            last_active_thread: None,
            trace_active: false,
            recording: false,
            record_stopped: None,
            ended: false,
            refresh_tx,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.refresh_tx.subscribe()
    }

    pub fn set_last_active_thread(&mut self, thread_id: ThreadId) {
        self.last_active_thread = Some(thread_id);
    }

    pub fn last_active_thread(&self) -> Option<ThreadId> {
        self.last_active_thread
    }

    pub fn is_trace_active(&self) -> bool {
        self.trace_active
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn record_stopped_index(&self) -> Option<RecordIndex> {
        self.record_stopped
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn keys(&self) -> Vec<PartitionKey> {
        self.partitions.keys().copied().collect()
    }

    pub fn partition(&self, key: PartitionKey) -> Option<&TracePartition> {
        self.partitions.get(&key)
    }

    fn emit(&self, key: PartitionKey) {
        // No subscribers is fine.
        let _ = self.refresh_tx.send(RefreshEvent { key });
    }

    fn replace(&mut self, partition: TracePartition) {
        let key = partition.key();
        self.partitions.insert(key, partition);
        self.emit(key);
    }

    pub async fn on_logs_changed(&mut self, update: &LogsUpdated) {
        if self.ended {
            return;
        }
        debug!(target: "rdbg.trace", ?update, "logs changed");
        for kind in TraceKind::LEGACY {
            if let Some(kind_update) = update.get(kind) {
                self.rebuild_kind(kind, kind_update).await;
            }
        }
        if self.trace_active {
            self.refresh_trace().await;
        }
    }

    async fn rebuild_kind(&mut self, kind: TraceKind, update: KindUpdate) {
        let profile = TraceProfile::for_kind(kind, &self.config.page_sizes);
        let mut partition = TracePartition::paged(
            PartitionKey::Kind(kind),
            profile,
            update.size,
            update.stopped_index,
        );
        if update.size > 0 {
            let target = update
                .stopped_index
                .unwrap_or(update.size - 1)
                .min(update.size - 1);
            partition.reveal_index(&self.backend, target).await;
        }
        self.replace(partition);
    }

    /// Re-fetch the full trace and rebuild one partition per thread. Threads
    /// absent from the new log are dropped.
    pub async fn refresh_trace(&mut self) {
        if self.ended {
            return;
        }
        let records = match self.backend.fetch_full_log(TraceKind::Trace).await {
            Ok(records) => records,
            Err(err) => {
                warn!(target: "rdbg.trace", error = %err, "failed to fetch trace log");
                Vec::new()
            }
        };

        let mut by_thread: BTreeMap<ThreadId, Vec<LogRecord>> = BTreeMap::new();
        for record in records {
            by_thread
                .entry(record.thread_id.unwrap_or_default())
                .or_default()
                .push(record);
        }

        let stale: Vec<PartitionKey> = self
            .partitions
            .keys()
            .copied()
            .filter(|key| match key {
                PartitionKey::Thread(id) => !by_thread.contains_key(id),
                _ => false,
            })
            .collect();
        for key in stale {
            self.partitions.remove(&key);
            self.emit(key);
        }

        for (thread_id, records) in by_thread {
            let newest = records.last().map(|record| record.index);
            let mut partition = TracePartition::windowed(
                PartitionKey::Thread(thread_id),
                TraceProfile::trace(),
                records,
                self.config.window,
            );
            if self.last_active_thread == Some(thread_id) {
                if let Some(&header) = partition.roots().first() {
                    partition.expand(&self.backend, header).await;
                }
                if let Some(newest) = newest {
                    partition.reveal_index(&self.backend, newest).await;
                }
            }
            self.replace(partition);
        }
    }

    /// Collect the record/replay history of the last active thread and
    /// rebuild the record view around the stopped index.
    pub async fn refresh_record(&mut self) {
        if self.ended {
            return;
        }
        let Some(thread_id) = self.last_active_thread else {
            debug!(target: "rdbg.trace", "no active thread to collect a record for");
            return;
        };
        let snapshot = match self.backend.collect_record(thread_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(target: "rdbg.trace", thread_id, error = %err, "failed to collect record");
                Default::default()
            }
        };
        self.record_stopped = snapshot.stopped_index;

        let mut partition = TracePartition::windowed(
            PartitionKey::Record,
            TraceProfile::record(),
            snapshot.logs,
            self.config.window,
        );
        if let Some(stopped) = snapshot.stopped_index {
            partition.reveal_index(&self.backend, stopped).await;
        }
        self.replace(partition);
    }

    pub async fn start_trace(&mut self, options: &TraceOptions) -> Result<(), BackendError> {
        self.live()?;
        self.backend.enable_trace(TraceKind::Trace, options).await?;
        info!(target: "rdbg.trace", events = ?options.events, "trace enabled");
        self.trace_active = true;
        self.refresh_trace().await;
        Ok(())
    }

    pub async fn stop_trace(&mut self) -> Result<(), BackendError> {
        self.live()?;
        self.backend.disable_trace(TraceKind::Trace).await?;
        info!(target: "rdbg.trace", "trace disabled");
        self.trace_active = false;
        let threads: Vec<PartitionKey> = self
            .partitions
            .keys()
            .copied()
            .filter(|key| matches!(key, PartitionKey::Thread(_)))
            .collect();
        for key in threads {
            self.partitions.remove(&key);
            self.emit(key);
        }
        Ok(())
    }

    pub async fn start_record(&mut self) -> Result<(), BackendError> {
        self.live()?;
        self.backend
            .enable_trace(TraceKind::Record, &TraceOptions::default())
            .await?;
        info!(target: "rdbg.trace", "recording enabled");
        self.recording = true;
        self.refresh_record().await;
        Ok(())
    }

    pub async fn stop_record(&mut self) -> Result<(), BackendError> {
        self.live()?;
        self.backend.disable_trace(TraceKind::Record).await?;
        info!(target: "rdbg.trace", "recording disabled");
        self.recording = false;
        self.record_stopped = None;
        if self.partitions.remove(&PartitionKey::Record).is_some() {
            self.emit(PartitionKey::Record);
        }
        Ok(())
    }

    /// Replay to record `target`. Returns `false` when already there or when
    /// nothing has been recorded.
    pub async fn playback_to(&mut self, target: RecordIndex) -> Result<bool, BackendError> {
        self.live()?;
        let (Some(stopped), Some(thread_id)) = (self.record_stopped, self.last_active_thread)
        else {
            return Ok(false);
        };
        if target == stopped {
            return Ok(false);
        }
        let (direction, count) = if target > stopped {
            (PlaybackDirection::StepForward, target - stopped)
        } else {
            (PlaybackDirection::StepBack, stopped - target)
        };
        self.backend.playback(direction, count, thread_id).await?;
        info!(target: "rdbg.trace", direction = direction.as_str(), count, "replayed");
        self.refresh_record().await;
        Ok(true)
    }

    pub async fn next_log_item(&mut self, key: PartitionKey, selected: NodeId) -> Option<Reveal> {
        if self.ended {
            return None;
        }
        let partition = self.partitions.get_mut(&key)?;
        Cursor::new(partition, &self.backend).next(selected).await
    }

    pub async fn prev_log_item(&mut self, key: PartitionKey, selected: NodeId) -> Option<Reveal> {
        if self.ended {
            return None;
        }
        let partition = self.partitions.get_mut(&key)?;
        Cursor::new(partition, &self.backend).prev(selected).await
    }

    pub async fn expand(&mut self, key: PartitionKey, id: NodeId) -> Vec<NodeId> {
        if self.ended {
            return Vec::new();
        }
        match self.partitions.get_mut(&key) {
            Some(partition) => partition.expand(&self.backend, id).await,
            None => Vec::new(),
        }
    }

    /// Click on a placeholder node; a changed forest is announced.
    pub fn activate(&mut self, key: PartitionKey, id: NodeId) -> bool {
        if self.ended {
            return false;
        }
        let changed = self
            .partitions
            .get_mut(&key)
            .is_some_and(|partition| partition.activate(id));
        if changed {
            self.emit(key);
        }
        changed
    }

    pub fn tree_item(&self, key: PartitionKey, id: NodeId) -> Option<TraceResult<TreeItem>> {
        if self.ended {
            return None;
        }
        self.partitions
            .get(&key)
            .map(|partition| partition.tree_item(id))
    }

    /// Drop every partition. The router answers nothing afterwards.
    pub fn end_session(&mut self) {
        if self.ended {
            return;
        }
        info!(target: "rdbg.trace", partitions = self.partitions.len(), "session ended");
        self.ended = true;
        self.trace_active = false;
        self.recording = false;
        self.record_stopped = None;
        self.partitions.clear();
    }

    fn live(&self) -> Result<(), BackendError> {
        if self.ended {
            Err(BackendError::NoSession)
        } else {
            Ok(())
        }
    }
}
