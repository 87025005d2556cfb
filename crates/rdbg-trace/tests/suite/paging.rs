use pretty_assertions::assert_eq;
use rdbg_trace::mock::{MockBackend, MockCall};
use rdbg_trace::paging::{page_number, page_offset};
use rdbg_trace::tree::{Shape, ShapeKind};
use rdbg_trace::{NodeKind, PartitionKey, TraceKind, TracePartition, TraceProfile};

use super::history;

#[test]
fn selected_index_picks_the_page() {
    let number = page_number(123, 50);
    assert_eq!(number, 3);
    assert_eq!(page_offset(number, 50), 100);

    let partition = TracePartition::paged(
        PartitionKey::Kind(TraceKind::Exception),
        TraceProfile::exception(50),
        200,
        Some(123),
    );
    let shapes: Vec<ShapeKind> = partition
        .tree()
        .shape()
        .into_iter()
        .map(|shape| shape.node)
        .collect();
    assert_eq!(
        shapes,
        vec![
            ShapeKind::Page {
                number: 1,
                offset: 0
            },
            ShapeKind::Page {
                number: 2,
                offset: 50
            },
            ShapeKind::Page {
                number: 3,
                offset: 100
            },
        ]
    );
}

#[tokio::test]
async fn hinted_record_whose_children_share_its_page_is_not_refetched() {
    let backend = MockBackend::new();
    let mut records = history(&[0, 1, 1, 1, 1, 1, 1, 1, 0]);
    records[0] = records[0].clone().with_has_child(true);
    backend.set_log(TraceKind::Call, records);

    let mut partition = TracePartition::paged(
        PartitionKey::Kind(TraceKind::Call),
        TraceProfile::call(5),
        9,
        Some(0),
    );
    let page = partition.roots()[0];
    partition.expand(&backend, page).await;
    let call = partition.tree().find_by_index(0).unwrap();
    assert_eq!(partition.tree().children(call).len(), 4);

    backend.clear_calls();
    partition.expand(&backend, call).await;
    assert!(backend.calls().is_empty());
    assert!(partition.tree().children_loaded(call));
}

#[tokio::test]
async fn hinted_record_without_children_fetches_them_page_by_page() {
    let backend = MockBackend::new();
    let records = history(&[0, 1, 1, 1, 1, 1, 1, 1, 0]);
    backend.set_log(TraceKind::Call, records.clone());

    let mut partition = TracePartition::paged(
        PartitionKey::Kind(TraceKind::Call),
        TraceProfile::call(5),
        9,
        Some(0),
    );
    // A page holding just the call itself, as a server would return for a
    // collapsed listing.
    let page = partition.roots()[0];
    let hinted = records[0].clone().with_has_child(true);
    backend.set_log(TraceKind::Call, vec![hinted]);
    partition.expand(&backend, page).await;
    backend.set_log(TraceKind::Call, records);

    let call = partition.tree().find_by_index(0).unwrap();
    let children = partition.expand(&backend, call).await;
    let kinds: Vec<ShapeKind> = children
        .iter()
        .map(|&id| partition.tree().shape_of(id).node)
        .collect();
    assert_eq!(
        kinds,
        vec![
            ShapeKind::Log { index: 1, depth: 1 },
            ShapeKind::Log { index: 2, depth: 1 },
            ShapeKind::Log { index: 3, depth: 1 },
            ShapeKind::Log { index: 4, depth: 1 },
            ShapeKind::Log { index: 5, depth: 1 },
            ShapeKind::Page {
                number: 2,
                offset: 5
            },
        ]
    );

    let more = children[5];
    backend.clear_calls();
    partition.expand(&backend, more).await;
    assert_eq!(
        backend.calls(),
        vec![MockCall::FetchChildren {
            kind: TraceKind::Call,
            parent_index: 0,
            offset: 5,
            page_size: 5,
        }]
    );
    assert_eq!(
        partition.tree().shape_of(more),
        Shape {
            node: ShapeKind::Page {
                number: 2,
                offset: 5
            },
            children: vec![Shape::log(6, 1, vec![]), Shape::log(7, 1, vec![])],
        }
    );
    // A short page ends the continuation chain.
    assert_eq!(partition.tree().children(call).len(), 6);
}

#[tokio::test]
async fn failed_fetch_leaves_the_page_empty() {
    let backend = MockBackend::new();
    backend.set_log(TraceKind::Line, history(&[0, 0, 0]));
    backend.close_session();
    let mut partition = TracePartition::paged(
        PartitionKey::Kind(TraceKind::Line),
        TraceProfile::line(5),
        3,
        None,
    );
    let page = partition.roots()[0];
    assert!(partition.expand(&backend, page).await.is_empty());
    assert!(matches!(
        partition.tree().kind(page),
        Some(NodeKind::Page { number: 1, .. })
    ));
}
