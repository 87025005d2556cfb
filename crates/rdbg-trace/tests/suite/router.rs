use pretty_assertions::assert_eq;
use rdbg_trace::mock::{MockBackend, MockCall};
use rdbg_trace::{
    KindUpdate, LogsUpdated, NodeKind, PartitionKey, RecordSnapshot, RouterConfig, TraceKind,
    TraceRouter, WindowConfig,
};

use super::{history, on_thread};

fn update(kind: TraceKind, size: u64, stopped_index: Option<u64>) -> LogsUpdated {
    let entry = Some(KindUpdate {
        size,
        stopped_index,
    });
    match kind {
        TraceKind::Line => LogsUpdated {
            line: entry,
            ..Default::default()
        },
        TraceKind::Call => LogsUpdated {
            call: entry,
            ..Default::default()
        },
        _ => LogsUpdated {
            exception: entry,
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn only_named_kinds_are_rebuilt() {
    let backend = MockBackend::new();
    backend.set_log(TraceKind::Line, history(&[0, 0, 0, 0, 0, 0, 0]));
    backend.set_log(TraceKind::Call, history(&[0, 1, 0]));
    let mut router = TraceRouter::new(backend, RouterConfig::default());
    let mut refreshes = router.subscribe();

    router.on_logs_changed(&update(TraceKind::Line, 7, Some(6))).await;
    assert_eq!(router.keys(), vec![PartitionKey::Kind(TraceKind::Line)]);
    assert_eq!(
        refreshes.recv().await.unwrap().key,
        PartitionKey::Kind(TraceKind::Line)
    );

    // The page holding the stopped record is loaded and expanded.
    let line = router.partition(PartitionKey::Kind(TraceKind::Line)).unwrap();
    assert_eq!(line.roots().len(), 2);
    let stopped = line.tree().find_by_index(6).unwrap();
    assert!(line.tree().ancestors(stopped).iter().all(|&id| line.tree().is_expanded(id)));
    assert!(!line.tree().is_expanded(line.roots()[0]));

    router.on_logs_changed(&update(TraceKind::Call, 3, None)).await;
    assert_eq!(
        router.keys(),
        vec![
            PartitionKey::Kind(TraceKind::Line),
            PartitionKey::Kind(TraceKind::Call),
        ]
    );
}

#[tokio::test]
async fn record_view_reveals_the_stopped_record() {
    let backend = MockBackend::new();
    backend.set_record(RecordSnapshot {
        stopped_index: Some(1),
        logs: on_thread(history(&[0, 1, 2, 1, 0, 0, 0, 0, 0]), 4),
    });
    let mut router = TraceRouter::new(
        backend,
        RouterConfig {
            window: WindowConfig {
                initial_groups: 2,
                step: 4,
            },
            ..Default::default()
        },
    );
    router.set_last_active_thread(4);
    router.start_record().await.unwrap();

    let record = router.partition(PartitionKey::Record).unwrap();
    // Revealing record 1 widened the window back to the start.
    assert_eq!(record.window_offset(), Some(0));
    let header = record.roots()[0];
    assert_eq!(
        record.tree().kind(header),
        Some(&NodeKind::Root {
            kind: TraceKind::Record
        })
    );
    let stopped = record.tree().find_by_index(1).unwrap();
    let first = record.tree().find_by_index(0).unwrap();
    assert!(record.tree().is_expanded(header));
    assert!(record.tree().is_expanded(first));
    assert!(!record.tree().is_expanded(stopped));

    assert_eq!(
        router.backend().calls(),
        vec![
            MockCall::EnableTrace(TraceKind::Record, Default::default()),
            MockCall::CollectRecord(4),
        ]
    );
}

#[tokio::test]
async fn navigation_through_the_router_reaches_the_next_page() {
    let backend = MockBackend::new();
    backend.set_log(TraceKind::Exception, history(&[0, 0, 0, 0, 0, 0]));
    let mut router = TraceRouter::new(
        backend,
        RouterConfig {
            page_sizes: rdbg_trace::PageSizes {
                exception: 3,
                ..Default::default()
            },
            ..Default::default()
        },
    );
    router
        .on_logs_changed(&update(TraceKind::Exception, 6, Some(1)))
        .await;
    let key = PartitionKey::Kind(TraceKind::Exception);
    let two = router.partition(key).unwrap().tree().find_by_index(2).unwrap();

    let reveal = router.next_log_item(key, two).await.unwrap();
    let partition = router.partition(key).unwrap();
    assert_eq!(partition.tree().record(reveal.node).unwrap().index, 3);
    assert_eq!(partition.roots().len(), 2);
    assert_eq!(reveal.ancestors, vec![partition.roots()[1]]);

    let item = router.tree_item(key, reveal.node).unwrap().unwrap();
    assert_eq!(item.label, "Main#step3");
}

#[tokio::test]
async fn load_more_activation_is_announced() {
    let backend = MockBackend::new();
    backend.set_log(
        TraceKind::Trace,
        on_thread(history(&[0, 0, 0, 0, 0, 0, 0, 0]), 1),
    );
    let mut router = TraceRouter::new(backend, RouterConfig::default());
    router.start_trace(&Default::default()).await.unwrap();
    let mut refreshes = router.subscribe();

    let key = PartitionKey::Thread(1);
    let header = router.partition(key).unwrap().roots()[0];
    let load_more = router.partition(key).unwrap().tree().children(header)[0];
    assert!(router.activate(key, load_more));
    assert_eq!(refreshes.recv().await.unwrap().key, key);
    assert_eq!(router.partition(key).unwrap().window_offset(), Some(0));
    assert!(!router.activate(key, load_more));
}
