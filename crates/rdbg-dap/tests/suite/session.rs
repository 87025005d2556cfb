use std::time::Duration;

use pretty_assertions::assert_eq;
use rdbg_dap::render::render_partition;
use rdbg_dap::{ClientError, DapClientConfig, InspectorSession, SessionError, SessionUpdate};
use rdbg_trace::mock::{MockBackend, MockCall};
use rdbg_trace::{NodeKind, PartitionKey, RecordSnapshot, RouterConfig, TraceKind, TraceOptions};
use serde_json::json;

use super::fake_adapter::FakeAdapter;
use super::history;

async fn attached(mock: MockBackend) -> (InspectorSession, FakeAdapter) {
    let (client, adapter) = FakeAdapter::start(mock);
    let session = InspectorSession::attach(client, RouterConfig::default())
        .await
        .expect("handshake should succeed");
    (session, adapter)
}

#[tokio::test]
async fn handshake_runs_in_order() {
    let (_session, adapter) = attached(MockBackend::new()).await;
    assert_eq!(
        adapter.commands(),
        vec!["initialize", "attach", "configurationDone"]
    );
}

#[tokio::test]
async fn unanswered_attach_fails_the_handshake() {
    let (client, adapter) = FakeAdapter::start_with(
        MockBackend::new(),
        DapClientConfig {
            reply_timeout: Duration::from_millis(50),
            ..DapClientConfig::default()
        },
    );
    adapter.ignore("attach");

    let err = InspectorSession::attach(client, RouterConfig::default())
        .await
        .err()
        .expect("attach should time out");
    let SessionError::Handshake { command, source } = err;
    assert_eq!(command, "attach");
    assert!(matches!(source, ClientError::Timeout { .. }), "{source:?}");
    assert_eq!(adapter.commands(), vec!["initialize", "attach"]);
}

#[tokio::test]
async fn logs_notification_rebuilds_the_named_kinds() {
    let mock = MockBackend::new();
    mock.set_log(TraceKind::Call, history(&[0, 1, 0, 1, 2, 2, 2, 1, 0, 0]));
    let (mut session, adapter) = attached(mock).await;

    adapter.emit("rdbgTraceInspector", Some(json!({ "call": { "size": 10 } })));
    assert_eq!(session.next_update().await, Some(SessionUpdate::LogsChanged));

    let router = session.router();
    assert_eq!(router.keys(), vec![PartitionKey::Kind(TraceKind::Call)]);
    let partition = router
        .partition(PartitionKey::Kind(TraceKind::Call))
        .unwrap();
    let pages: Vec<&NodeKind> = partition
        .roots()
        .iter()
        .filter_map(|&id| partition.tree().kind(id))
        .collect();
    assert_eq!(pages.len(), 2);
    // The newest record is revealed, so the last page is loaded.
    let last_page = partition.roots()[1];
    assert!(partition.tree().children_loaded(last_page));
    assert!(render_partition(partition).unwrap().contains("Main#step9"));
}

#[tokio::test]
async fn unrelated_and_malformed_events_are_skipped() {
    let (mut session, adapter) = attached(MockBackend::new()).await;

    adapter.emit("output", Some(json!({ "output": "hi" })));
    adapter.emit("rdbgTraceInspector", Some(json!({ "call": "lots" })));
    adapter.emit("terminated", None);

    assert_eq!(session.next_update().await, Some(SessionUpdate::Ended));
    assert_eq!(session.next_update().await, None);
}

#[tokio::test]
async fn stop_while_recording_collects_for_the_stopped_thread() {
    let mock = MockBackend::new();
    mock.set_record(RecordSnapshot {
        stopped_index: Some(3),
        logs: history(&[0, 0, 1, 0, 0]),
    });
    let (mut session, adapter) = attached(mock).await;

    session.router_mut().start_record().await.unwrap();
    assert!(session.router().partition(PartitionKey::Record).is_none());

    adapter.emit("stopped", Some(json!({ "reason": "step", "threadId": 2 })));
    assert_eq!(
        session.next_update().await,
        Some(SessionUpdate::Stopped { thread_id: Some(2) })
    );
    assert_eq!(session.router().last_active_thread(), Some(2));
    assert_eq!(session.router().record_stopped_index(), Some(3));
    assert!(session.router().partition(PartitionKey::Record).is_some());
    assert_eq!(
        adapter.backend.calls(),
        vec![
            MockCall::EnableTrace(TraceKind::Record, TraceOptions::default()),
            MockCall::CollectRecord(2),
        ]
    );
}

#[tokio::test]
async fn trace_view_is_split_by_thread() {
    let mock = MockBackend::new();
    let mut records = history(&[0, 1, 0, 0]);
    for (record, thread) in records.iter_mut().zip([1, 1, 2, 1]) {
        record.thread_id = Some(thread);
    }
    mock.set_log(TraceKind::Trace, records);
    let (mut session, _adapter) = attached(mock).await;

    session
        .router_mut()
        .start_trace(&TraceOptions::default())
        .await
        .unwrap();
    assert!(session.router().is_trace_active());
    assert_eq!(
        session.router().keys(),
        vec![PartitionKey::Thread(1), PartitionKey::Thread(2)]
    );
}

#[tokio::test]
async fn dropped_connection_ends_the_session() {
    let (mut session, adapter) = attached(MockBackend::new()).await;
    adapter.disconnect();

    assert_eq!(session.next_update().await, Some(SessionUpdate::Ended));
    assert!(session.router().is_ended());
    let err = session
        .router_mut()
        .start_trace(&TraceOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, rdbg_trace::BackendError::NoSession);
}
