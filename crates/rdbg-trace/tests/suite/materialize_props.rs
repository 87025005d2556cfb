use proptest::prelude::*;
use rdbg_trace::materialize::{materialize, needs_omission};
use rdbg_trace::record::min_depth;
use rdbg_trace::{
    Cursor, LogRecord, NodeId, NodeKind, PartitionKey, TracePartition, TraceProfile, TraceTree,
    WindowConfig,
};

use super::history;

const PROPTEST_CASES: u32 = 128;

/// Depth sequences that follow call/return nesting: one level deeper per
/// step at most, any number of levels shallower.
fn arb_depths() -> impl Strategy<Value = Vec<u32>> {
    (
        0u32..3,
        prop::collection::vec(
            prop_oneof![
                3 => Just(Step::Call),
                2 => Just(Step::Stay),
                2 => Just(Step::Return),
                1 => Just(Step::Unwind),
            ],
            0..40,
        ),
    )
        .prop_map(|(start, steps)| {
            let mut depth = start;
            let mut depths = vec![depth];
            for step in steps {
                depth = match step {
                    Step::Call => depth + 1,
                    Step::Stay => depth,
                    Step::Return => depth.saturating_sub(1),
                    Step::Unwind => 0,
                };
                depths.push(depth);
            }
            depths
        })
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Call,
    Stay,
    Return,
    Unwind,
}

/// A history and the start of a suffix window over it.
fn arb_window() -> impl Strategy<Value = (Vec<u32>, usize)> {
    arb_depths().prop_flat_map(|depths| {
        let len = depths.len();
        (Just(depths), 0..len)
    })
}

fn siblings_ascend(tree: &TraceTree, ids: &[NodeId]) -> bool {
    let keys: Vec<u64> = ids
        .iter()
        .filter_map(|&id| match tree.kind(id)? {
            NodeKind::Log(record) => Some(record.index),
            NodeKind::OmittedRange { .. } => tree
                .first_log_under(id)
                .and_then(|first| tree.record(first))
                .map(|record| record.index),
            _ => None,
        })
        .collect();
    keys.windows(2).all(|pair| pair[0] < pair[1])
        && ids.iter().all(|&id| siblings_ascend(tree, tree.children(id)))
}

fn index(partition: &TracePartition, node: NodeId) -> Option<u64> {
    partition.tree().record(node).map(|record| record.index)
}

proptest! {
    #![proptest_config(ProptestConfig { cases: PROPTEST_CASES, .. ProptestConfig::default() })]

    #[test]
    fn flattening_reproduces_the_window((depths, start) in arb_window()) {
        let records = history(&depths);
        let window = &records[start..];
        let mut tree = TraceTree::new();
        materialize(&mut tree, None, window, None);

        let expected: Vec<u64> = window.iter().map(|record| record.index).collect();
        prop_assert_eq!(tree.flattened_indices(), expected);
        prop_assert!(siblings_ascend(&tree, tree.roots()));
    }

    #[test]
    fn omission_marks_windows_that_start_below_their_minimum((depths, start) in arb_window()) {
        let records = history(&depths);
        let window = &records[start..];
        let mut tree = TraceTree::new();
        materialize(&mut tree, None, window, None);

        let min = min_depth(window).unwrap();
        let omitted: Vec<&NodeKind> = tree
            .roots()
            .iter()
            .filter_map(|&id| tree.kind(id))
            .filter(|kind| matches!(kind, NodeKind::OmittedRange { .. }))
            .collect();

        if needs_omission(window) {
            prop_assert_eq!(omitted.len(), 1);
            let first_root = window.iter().position(|record| record.depth == min).unwrap();
            let prefix = &window[..first_root];
            let prefix_min = min_depth(prefix).unwrap();
            let resume = prefix.iter().find(|record| record.depth == prefix_min).unwrap();
            prop_assert_eq!(
                omitted[0],
                &NodeKind::OmittedRange { offset: resume.index, depth: prefix_min, thread_id: None }
            );
            let leads_with_omission =
                matches!(tree.kind(tree.roots()[0]), Some(NodeKind::OmittedRange { .. }));
            prop_assert!(leads_with_omission);
        } else {
            prop_assert!(omitted.is_empty());
            prop_assert_eq!(window[0].depth, min);
        }
    }

    #[test]
    fn rebuilding_yields_the_same_shape((depths, start) in arb_window()) {
        let records: Vec<LogRecord> = history(&depths);
        let mut first = TraceTree::new();
        materialize(&mut first, None, &records[start..], None);
        let mut second = TraceTree::new();
        second.clear();
        materialize(&mut second, None, &records[start..], None);

        prop_assert_eq!(first.shape(), second.shape());
        prop_assert_ne!(first.generation(), second.generation());
    }

    #[test]
    fn prev_undoes_next_and_next_undoes_prev(depths in arb_depths(), groups in 1usize..4, step in 1usize..4) {
        prop_assume!(depths.len() >= 3);
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let backend = rdbg_trace::mock::MockBackend::new();
        let records = history(&depths);
        let len = records.len() as u64;

        runtime.block_on(async {
            for i in 1..len - 1 {
                let mut partition = TracePartition::windowed(
                    PartitionKey::Thread(1),
                    TraceProfile::trace(),
                    records.clone(),
                    WindowConfig { initial_groups: groups, step },
                );
                let node = partition.reveal_index(&backend, i).await.unwrap().node;

                let next = Cursor::new(&mut partition, &backend).next(node).await.unwrap().node;
                prop_assert_eq!(index(&partition, next), Some(i + 1));
                let back = Cursor::new(&mut partition, &backend).prev(next).await.unwrap().node;
                prop_assert_eq!(index(&partition, back), Some(i));

                let prev = Cursor::new(&mut partition, &backend).prev(back).await.unwrap().node;
                prop_assert_eq!(index(&partition, prev), Some(i - 1));
                let forth = Cursor::new(&mut partition, &backend).next(prev).await.unwrap().node;
                prop_assert_eq!(index(&partition, forth), Some(i));
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
