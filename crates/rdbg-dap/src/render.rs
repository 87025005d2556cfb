//! Plain-text rendering of partitions, for terminals and snapshots.

use rdbg_trace::annotations::InlineHint;
use rdbg_trace::profile::Collapsible;
use rdbg_trace::{NodeId, TraceBackend, TracePartition, TraceResult, TraceRouter};

const INDENT: &str = "  ";

/// Every materialized node of `partition`, one per line, indented by depth.
/// Rows start with `>` (collapsed), `v` (expanded) or `-` (leaf).
pub fn render_partition(partition: &TracePartition) -> TraceResult<String> {
    let mut out = String::new();
    for &root in partition.roots() {
        render_node(partition, root, 0, &mut out)?;
    }
    Ok(out)
}

fn render_node(
    partition: &TracePartition,
    id: NodeId,
    depth: usize,
    out: &mut String,
) -> TraceResult<()> {
    let item = partition.tree_item(id)?;
    let marker = match item.collapsible {
        Collapsible::None => '-',
        Collapsible::Collapsed => '>',
        Collapsible::Expanded => 'v',
    };
    out.push_str(&INDENT.repeat(depth));
    out.push(marker);
    out.push(' ');
    out.push_str(&item.label);
    if let Some(description) = &item.description {
        out.push_str("  ");
        out.push_str(description);
    }
    out.push('\n');

    for &child in partition.tree().children(id) {
        render_node(partition, child, depth + 1, out)?;
    }
    Ok(())
}

/// All partitions of `router`, in key order, separated by a blank line.
pub fn render_router<B: TraceBackend>(router: &TraceRouter<B>) -> TraceResult<String> {
    let mut sections = Vec::new();
    for key in router.keys() {
        if let Some(partition) = router.partition(key) {
            sections.push(render_partition(partition)?);
        }
    }
    Ok(sections.join("\n"))
}

pub fn render_hints(path: &str, hints: &[InlineHint]) -> String {
    let mut out = String::new();
    for hint in hints {
        out.push_str(&format!("{path}:{}  {}\n", hint.line, hint.label));
    }
    out
}
