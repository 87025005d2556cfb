use pretty_assertions::assert_eq;
use rdbg_trace::mock::{MockBackend, MockCall};
use rdbg_trace::{
    Cursor, NodeId, NodeKind, PartitionKey, Reveal, TraceKind, TracePartition, TraceProfile,
    WindowConfig,
};

use super::{history, on_thread};

fn index_of(partition: &TracePartition, reveal: Option<Reveal>) -> Option<u64> {
    partition
        .tree()
        .record(reveal?.node)
        .map(|record| record.index)
}

fn child_of_kind(partition: &TracePartition, parent: NodeId, want: fn(&NodeKind) -> bool) -> NodeId {
    partition
        .tree()
        .children(parent)
        .iter()
        .copied()
        .find(|&id| partition.tree().kind(id).is_some_and(want))
        .expect("child of requested kind")
}

/// Call history split in two pages of five; page 2 opens three levels deep.
fn paged_call_history() -> (MockBackend, TracePartition) {
    let backend = MockBackend::new();
    backend.set_log(TraceKind::Call, history(&[0, 1, 0, 1, 2, 2, 2, 1, 0, 0]));
    let partition = TracePartition::paged(
        PartitionKey::Kind(TraceKind::Call),
        TraceProfile::call(5),
        10,
        None,
    );
    (backend, partition)
}

#[tokio::test]
async fn omission_steps_forward_to_where_the_run_resumes() {
    let backend = MockBackend::new();
    let mut partition = TracePartition::windowed(
        PartitionKey::Thread(3),
        TraceProfile::trace(),
        on_thread(history(&[0, 1, 2, 1, 0, 1, 0]), 3),
        WindowConfig {
            initial_groups: 1,
            step: 4,
        },
    );
    assert!(partition.load_more());
    assert_eq!(partition.window_offset(), Some(2));

    let header = partition.roots()[0];
    let omitted = child_of_kind(&partition, header, |kind| {
        matches!(kind, NodeKind::OmittedRange { .. })
    });
    assert_eq!(
        partition.tree().kind(omitted),
        Some(&NodeKind::OmittedRange {
            offset: 3,
            depth: 1,
            thread_id: Some(3),
        })
    );

    let next = Cursor::new(&mut partition, &backend).next(omitted).await;
    assert_eq!(index_of(&partition, next), Some(3));
}

#[tokio::test]
async fn nested_omission_steps_back_to_the_enclosing_one() {
    let (backend, mut partition) = paged_call_history();
    let page = partition.roots()[1];
    partition.expand(&backend, page).await;

    let outer = partition.tree().children(page)[0];
    let inner = partition.tree().children(outer)[0];
    assert!(matches!(
        partition.tree().kind(inner),
        Some(NodeKind::OmittedRange {
            offset: 5,
            depth: 2,
            ..
        })
    ));

    let reveal = Cursor::new(&mut partition, &backend).prev(inner).await.unwrap();
    assert_eq!(reveal.node, outer);
    assert_eq!(reveal.ancestors, vec![page]);
}

#[tokio::test]
async fn page_level_omission_asks_the_debugger_for_the_parent() {
    let (backend, mut partition) = paged_call_history();
    let page = partition.roots()[1];
    partition.expand(&backend, page).await;
    let outer = partition.tree().children(page)[0];
    backend.clear_calls();

    let prev = Cursor::new(&mut partition, &backend).prev(outer).await;
    // Record 5 (depth 2) is enclosed by record 3, the nearest shallower one.
    assert_eq!(index_of(&partition, prev), Some(3));
    assert_eq!(
        backend.calls(),
        vec![
            MockCall::FetchParent {
                kind: TraceKind::Call,
                child_index: 5,
                offset: 5,
                page_size: 5,
            },
            MockCall::FetchRoot {
                kind: TraceKind::Call,
                offset: 0,
                page_size: 5,
            },
        ]
    );
}

#[tokio::test]
async fn load_more_placeholder_resolves_to_records_around_the_old_start() {
    let backend = MockBackend::new();
    let records = history(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    let config = WindowConfig {
        initial_groups: 3,
        step: 2,
    };

    let mut partition =
        TracePartition::windowed(PartitionKey::Record, TraceProfile::record(), records.clone(), config);
    let load_more = partition.tree().children(partition.roots()[0])[0];
    let next = Cursor::new(&mut partition, &backend).next(load_more).await;
    assert_eq!(index_of(&partition, next), Some(5));

    let mut partition =
        TracePartition::windowed(PartitionKey::Record, TraceProfile::record(), records, config);
    let load_more = partition.tree().children(partition.roots()[0])[0];
    let prev = Cursor::new(&mut partition, &backend).prev(load_more).await;
    assert_eq!(index_of(&partition, prev), Some(6));
    assert_eq!(partition.window_offset(), Some(5));
}

#[tokio::test]
async fn headers_step_into_their_first_record() {
    let backend = MockBackend::new();
    let mut partition = TracePartition::windowed(
        PartitionKey::Thread(1),
        TraceProfile::trace(),
        on_thread(history(&[0, 1, 0]), 1),
        WindowConfig::default(),
    );
    let header = partition.roots()[0];

    let next = Cursor::new(&mut partition, &backend).next(header).await;
    assert_eq!(index_of(&partition, next), Some(0));
    assert!(Cursor::new(&mut partition, &backend)
        .prev(header)
        .await
        .is_none());
}

#[tokio::test]
async fn pages_step_into_their_records_and_back_to_the_previous_page() {
    let (backend, mut partition) = paged_call_history();
    let first_page = partition.roots()[0];
    let second_page = partition.roots()[1];

    let next = Cursor::new(&mut partition, &backend).next(second_page).await;
    assert_eq!(index_of(&partition, next), Some(5));

    let prev = Cursor::new(&mut partition, &backend).prev(second_page).await;
    assert_eq!(index_of(&partition, prev), Some(4));
    assert!(partition.tree().is_expanded(first_page));
}

#[tokio::test]
async fn stale_ids_resolve_to_nothing() {
    let backend = MockBackend::new();
    let mut partition = TracePartition::windowed(
        PartitionKey::Record,
        TraceProfile::record(),
        history(&[0, 0, 0]),
        WindowConfig::default(),
    );
    let first = partition.tree().find_by_index(0).unwrap();
    partition.create_tree();

    assert!(Cursor::new(&mut partition, &backend)
        .next(first)
        .await
        .is_none());
}
