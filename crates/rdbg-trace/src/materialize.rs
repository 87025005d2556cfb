//! Flat-to-tree conversion of depth-tagged trace records.
//!
//! A slice is grouped around its shallowest records: each record at the
//! minimum depth becomes a node whose children are the records that follow it
//! while they stay strictly deeper. When the slice starts below its minimum
//! depth (a window that cut off the enclosing calls), the records before the
//! first minimum-depth record hang under a single `OmittedRange` node.

use crate::record::{min_depth, LogRecord, ThreadId};
use crate::tree::{NodeId, NodeKind, TraceTree};

/// Materialize `records` under `parent` and return the created top-level ids.
///
/// `thread_id` tags omitted-range placeholders so a host can tell which
/// partition they summarize. Input is trusted to come from one coherent
/// execution trace; depth sequences that violate call/return nesting produce
/// a forest but no particular shape is guaranteed.
pub fn materialize(
    tree: &mut TraceTree,
    parent: Option<NodeId>,
    records: &[LogRecord],
    thread_id: Option<ThreadId>,
) -> Vec<NodeId> {
    let Some(min) = min_depth(records) else {
        return Vec::new();
    };
    let first_root = records
        .iter()
        .position(|record| record.depth == min)
        .unwrap_or(0);

    let mut created = Vec::new();
    if first_root > 0 {
        let prefix = &records[..first_root];
        let (offset, depth) = omission_bounds(prefix);
        let omitted = tree.push(
            parent,
            NodeKind::OmittedRange {
                offset,
                depth,
                thread_id,
            },
        );
        materialize(tree, Some(omitted), prefix, thread_id);
        created.push(omitted);
    }

    let mut pos = first_root;
    while pos < records.len() {
        let end = descendant_end(records, pos);
        let id = tree.push(parent, NodeKind::Log(records[pos].clone()));
        materialize(tree, Some(id), &records[pos + 1..end], thread_id);
        created.push(id);
        pos = end;
    }

    created
}

/// Exclusive end of the descendant region of `records[pos]`: the first later
/// position whose depth is not greater than the record's own depth.
pub fn descendant_end(records: &[LogRecord], pos: usize) -> usize {
    let depth = records[pos].depth;
    records[pos + 1..]
        .iter()
        .position(|record| record.depth <= depth)
        .map_or(records.len(), |rel| pos + 1 + rel)
}

/// Whether a window starting at `records[0]` needs an omission placeholder.
pub fn needs_omission(records: &[LogRecord]) -> bool {
    match (records.first(), min_depth(records)) {
        (Some(first), Some(min)) => first.depth > min,
        _ => false,
    }
}

/// `(offset, depth)` for an omitted prefix: the prefix's minimum depth and the
/// index of the first prefix record at that depth.
fn omission_bounds(prefix: &[LogRecord]) -> (u64, u32) {
    let depth = min_depth(prefix).unwrap_or(0);
    let offset = prefix
        .iter()
        .find(|record| record.depth == depth)
        .map_or(0, |record| record.index);
    (offset, depth)
}
