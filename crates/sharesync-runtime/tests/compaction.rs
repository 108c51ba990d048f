//! Integration test: compacted reads.
//!
//! Events are folded oldest-first into one item per merge key; reads that
//! find nothing new leave storage untouched.

use std::sync::Arc;

use sharesync_core::data::{FileDiff, Message, Model, Part, Session};
use sharesync_core::{Data, ShareId};
use sharesync_runtime::{
    DescendingIdGenerator, SequentialIdGenerator, ShareAuth, ShareRecord, ShareService,
};
use sharesync_storage::MemoryBackend;

const SESSION: &str = "ses_compaction01";

async fn start_share() -> (ShareService, Arc<MemoryBackend>, ShareRecord) {
    let backend = Arc::new(MemoryBackend::new());
    let service = ShareService::builder(backend.clone())
        .id_generator(Arc::new(SequentialIdGenerator::new()))
        .build();
    let record = service.create(SESSION).await.expect("share should be created");
    (service, backend, record)
}

fn text(message: &str, id: &str, text: &str) -> Data {
    Data::Part(Part::text(id, SESSION, message, text))
}

fn texts(data: &[Data]) -> Vec<(&str, Option<&str>)> {
    data.iter()
        .filter_map(|item| match item {
            Data::Part(part) => Some((part.id.as_str(), part.text_content())),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_fresh_share_has_no_data() {
    let (service, backend, record) = start_share().await;
    let writes = backend.writes();
    assert!(service.data(&record.id).await.unwrap().is_empty());
    assert_eq!(backend.writes(), writes, "nothing to compact, nothing written");
}

#[tokio::test]
async fn test_last_write_wins() {
    let (service, _backend, record) = start_share().await;
    let auth = ShareAuth::from(&record);

    service
        .sync(&auth, &[text("msg1", "part1", "Hello")])
        .await
        .unwrap();
    service
        .sync(&auth, &[text("msg1", "part1", "Hello Updated")])
        .await
        .unwrap();

    let data = service.data(&record.id).await.unwrap();
    assert_eq!(texts(&data), vec![("part1", Some("Hello Updated"))]);
}

#[tokio::test]
async fn test_last_write_wins_within_one_batch() {
    let (service, _backend, record) = start_share().await;
    let auth = ShareAuth::from(&record);

    service
        .sync(
            &auth,
            &[
                text("msg1", "part1", "first"),
                text("msg1", "part1", "second"),
            ],
        )
        .await
        .unwrap();

    let data = service.data(&record.id).await.unwrap();
    assert_eq!(texts(&data), vec![("part1", Some("second"))]);
}

#[tokio::test]
async fn test_update_after_compaction_wins() {
    let (service, _backend, record) = start_share().await;
    let auth = ShareAuth::from(&record);

    service
        .sync(&auth, &[text("msg1", "part1", "Hello")])
        .await
        .unwrap();
    assert_eq!(
        texts(&service.data(&record.id).await.unwrap()),
        vec![("part1", Some("Hello"))]
    );

    service
        .sync(&auth, &[text("msg1", "part1", "Hello Updated")])
        .await
        .unwrap();
    assert_eq!(
        texts(&service.data(&record.id).await.unwrap()),
        vec![("part1", Some("Hello Updated"))]
    );
}

#[tokio::test]
async fn test_syncs_accumulate_across_reads() {
    let (service, _backend, record) = start_share().await;
    let auth = ShareAuth::from(&record);

    service
        .sync(&auth, &[text("msg1", "part1", "one")])
        .await
        .unwrap();
    assert_eq!(service.data(&record.id).await.unwrap().len(), 1);

    service
        .sync(&auth, &[text("msg1", "part2", "two")])
        .await
        .unwrap();
    service
        .sync(&auth, &[text("msg1", "part3", "three")])
        .await
        .unwrap();
    assert_eq!(service.data(&record.id).await.unwrap().len(), 3);

    // Same result without the intermediate read
    let (fresh, _backend, fresh_record) = start_share().await;
    let fresh_auth = ShareAuth::from(&fresh_record);
    for (id, body) in [("part1", "one"), ("part2", "two"), ("part3", "three")] {
        fresh
            .sync(&fresh_auth, &[text("msg1", id, body)])
            .await
            .unwrap();
    }
    assert_eq!(
        fresh.data(&fresh_record.id).await.unwrap(),
        service.data(&record.id).await.unwrap()
    );
}

#[tokio::test]
async fn test_repeated_reads_are_idempotent_and_write_nothing() {
    let (service, backend, record) = start_share().await;
    let auth = ShareAuth::from(&record);
    service
        .sync(&auth, &[text("msg1", "part1", "Hello")])
        .await
        .unwrap();

    let first = service.data(&record.id).await.unwrap();
    let writes = backend.writes();
    let second = service.data(&record.id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(backend.writes(), writes);
}

#[tokio::test]
async fn test_mixed_kinds_in_one_batch() {
    let (service, _backend, record) = start_share().await;
    let auth = ShareAuth::from(&record);

    service
        .sync(
            &auth,
            &[
                Data::Session(Session::new(SESSION)),
                Data::Message(Message::new("msg1", SESSION)),
                text("msg1", "part1", "Hello"),
            ],
        )
        .await
        .unwrap();

    let data = service.data(&record.id).await.unwrap();
    let kinds: Vec<&str> = data.iter().map(Data::kind).collect();
    assert_eq!(kinds.len(), 3);
    for kind in ["session", "message", "part"] {
        assert_eq!(kinds.iter().filter(|k| **k == kind).count(), 1);
    }
}

#[tokio::test]
async fn test_data_is_sorted_by_merge_key() {
    let (service, _backend, record) = start_share().await;
    let auth = ShareAuth::from(&record);

    service
        .sync(
            &auth,
            &[
                Data::Model(vec![]),
                text("msg2", "part1", "b"),
                Data::Session(Session::new(SESSION)),
                text("msg1", "part1", "a"),
                Data::SessionDiff(vec![]),
                Data::Message(Message::new("msg1", SESSION)),
            ],
        )
        .await
        .unwrap();

    let data = service.data(&record.id).await.unwrap();
    let keys: Vec<String> = data.iter().map(|d| d.merge_key().into_owned()).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(keys, sorted);
}

#[tokio::test]
async fn test_whole_value_kinds_are_replaced() {
    let (service, _backend, record) = start_share().await;
    let auth = ShareAuth::from(&record);
    let diff = |file: &str| FileDiff::new(file);

    service
        .sync(&auth, &[Data::SessionDiff(vec![diff("a.rs"), diff("b.rs")])])
        .await
        .unwrap();
    service
        .sync(&auth, &[Data::SessionDiff(vec![diff("c.rs")])])
        .await
        .unwrap();

    let data = service.data(&record.id).await.unwrap();
    assert_eq!(data, vec![Data::SessionDiff(vec![diff("c.rs")])]);
}

#[tokio::test]
async fn test_view_groups_compacted_data() {
    let (service, _backend, record) = start_share().await;
    let auth = ShareAuth::from(&record);
    let model: Model = serde_json::from_value(serde_json::json!({
        "id": "claude", "providerID": "anthropic", "name": "Claude"
    }))
    .unwrap();

    service
        .sync(
            &auth,
            &[
                Data::Session(Session::new(SESSION)),
                Data::Message(Message::new("msg1", SESSION)),
                text("msg1", "part1", "Hello"),
                text("msg1", "part2", "World"),
                Data::Model(vec![model]),
            ],
        )
        .await
        .unwrap();

    let view = service.view(&record.id).await.unwrap();
    assert_eq!(view.share_id, record.id);
    assert_eq!(view.messages().len(), 1);
    assert_eq!(view.parts_of("msg1").len(), 2);
    assert_eq!(view.models[0].provider_id.as_deref(), Some("anthropic"));
}

#[tokio::test]
async fn test_view_without_session_fails() {
    let (service, _backend, record) = start_share().await;
    let auth = ShareAuth::from(&record);
    service
        .sync(&auth, &[text("msg1", "part1", "orphan")])
        .await
        .unwrap();

    let err = service.view(&record.id).await.unwrap_err();
    assert!(matches!(
        err,
        sharesync_core::ShareError::SessionDataMissing { .. }
    ));
}

#[tokio::test]
async fn test_wall_clock_ids_preserve_sync_order() {
    let backend = Arc::new(MemoryBackend::new());
    let service = ShareService::builder(backend)
        .id_generator(Arc::new(DescendingIdGenerator::new()))
        .build();
    let record = service.create(SESSION).await.unwrap();
    let auth = ShareAuth::from(&record);

    for i in 0..20 {
        service
            .sync(&auth, &[text("msg1", "part1", &format!("v{i}"))])
            .await
            .unwrap();
    }

    let data = service.data(&ShareId::new(record.id.as_str())).await.unwrap();
    assert_eq!(texts(&data), vec![("part1", Some("v19"))]);
}
