//! Client-windowed pagination.
//!
//! The complete record array of a partition is held locally. Only the suffix
//! starting at `offset` is materialized; "load more" moves the offset back by
//! a fixed step and rebuilds, without asking the debugger for anything.

use std::collections::HashMap;

use crate::materialize::materialize;
use crate::profile::WindowConfig;
use crate::record::{min_depth, LogRecord, RecordIndex, ThreadId};
use crate::tree::{NodeId, NodeKind, TraceTree};

#[derive(Debug, Clone)]
pub struct ClientWindow {
    records: Vec<LogRecord>,
    offset: usize,
    step: usize,
    positions: HashMap<RecordIndex, usize>,
}

impl ClientWindow {
    pub fn new(records: Vec<LogRecord>, config: WindowConfig) -> Self {
        let offset = initial_offset(&records, config.initial_groups);
        let positions = records
            .iter()
            .enumerate()
            .map(|(pos, record)| (record.index, pos))
            .collect();
        Self {
            records,
            offset,
            step: config.step.max(1),
            positions,
        }
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The visible suffix of the partition.
    pub fn window(&self) -> &[LogRecord] {
        &self.records[self.offset.min(self.records.len())..]
    }

    pub fn position_of(&self, index: RecordIndex) -> Option<usize> {
        self.positions.get(&index).copied()
    }

    pub fn record_at(&self, pos: usize) -> Option<&LogRecord> {
        self.records.get(pos)
    }

    /// Widen the window by one step. Returns `false` when it already starts
    /// at the beginning of the history.
    pub fn load_more(&mut self) -> bool {
        if self.offset == 0 {
            return false;
        }
        self.offset = load_more_offset(self.offset, self.step);
        true
    }

    /// Widen the window until position `pos` is inside it. Returns whether
    /// the offset moved.
    pub fn ensure_visible(&mut self, pos: usize) -> bool {
        let mut moved = false;
        while self.offset > pos && self.load_more() {
            moved = true;
        }
        moved
    }

    /// Discard `tree` and rebuild it under a single `header` node.
    pub fn rebuild(
        &self,
        tree: &mut TraceTree,
        header: NodeKind,
        thread_id: Option<ThreadId>,
    ) -> NodeId {
        tree.clear();
        let root = tree.push(None, header);
        if self.offset > 0 {
            tree.push(Some(root), NodeKind::LoadMore);
        }
        materialize(tree, Some(root), self.window(), thread_id);
        root
    }
}

/// Offset after one "load more" activation, clamped at the history start.
pub fn load_more_offset(offset: usize, step: usize) -> usize {
    offset.saturating_sub(step)
}

/// Start position of the `groups`-th last root-level group, where root-level
/// means the partition's minimum depth.
pub fn initial_offset(records: &[LogRecord], groups: usize) -> usize {
    let Some(min) = min_depth(records) else {
        return 0;
    };
    let starts: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, record)| record.depth == min)
        .map(|(pos, _)| pos)
        .collect();
    let groups = groups.max(1);
    if starts.len() <= groups {
        0
    } else {
        starts[starts.len() - groups]
    }
}
