//! Integration test: concurrent syncs and reads.
//!
//! Compaction of one share is serialized inside a process, so overlapping
//! `data` calls neither lose items nor regress the snapshot cursor.

use std::sync::Arc;

use futures::future::join_all;

use sharesync_core::data::Part;
use sharesync_core::{Data, ShareError};
use sharesync_runtime::{SequentialIdGenerator, ShareAuth, ShareService};
use sharesync_storage::MemoryBackend;

fn part(session: &str, id: &str) -> Data {
    Data::Part(Part::text(id, session, "msg1", id))
}

fn test_service() -> ShareService {
    ShareService::builder(Arc::new(MemoryBackend::new()))
        .id_generator(Arc::new(SequentialIdGenerator::new()))
        .build()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_agree() {
    let service = test_service();
    let record = service.create("ses_concurrent1").await.unwrap();
    let auth = ShareAuth::from(&record);
    for i in 0..10 {
        service
            .sync(&auth, &[part("ses_concurrent1", &format!("part{i:02}"))])
            .await
            .unwrap();
    }

    let reads = (0..8).map(|_| {
        let service = service.clone();
        let id = record.id.clone();
        tokio::spawn(async move { service.data(&id).await })
    });
    let results: Vec<Vec<Data>> = join_all(reads)
        .await
        .into_iter()
        .map(|r| r.expect("task should not panic").expect("read should succeed"))
        .collect();

    for result in &results {
        assert_eq!(result.len(), 10);
        assert_eq!(result, &results[0]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reads_interleaved_with_syncs_lose_nothing() {
    let service = test_service();
    let record = service.create("ses_interleave").await.unwrap();
    let auth = ShareAuth::from(&record);

    let writer = {
        let service = service.clone();
        let auth = auth.clone();
        tokio::spawn(async move {
            for i in 0..25 {
                service
                    .sync(&auth, &[part("ses_interleave", &format!("part{i:02}"))])
                    .await?;
            }
            Ok::<_, ShareError>(())
        })
    };
    let reader = {
        let service = service.clone();
        let id = record.id.clone();
        tokio::spawn(async move {
            let mut seen = 0;
            for _ in 0..25 {
                let len = service.data(&id).await?.len();
                assert!(len >= seen, "compacted data never shrinks");
                seen = len;
                tokio::task::yield_now().await;
            }
            Ok::<_, ShareError>(())
        })
    };

    writer.await.unwrap().unwrap();
    reader.await.unwrap().unwrap();
    assert_eq!(service.data(&record.id).await.unwrap().len(), 25);
}

#[tokio::test]
async fn test_independent_shares_do_not_interfere() {
    let service = test_service();
    let a = service.create("ses_share_aaaa").await.unwrap();
    let b = service.create("ses_share_bbbb").await.unwrap();

    let (auth_a, auth_b) = (ShareAuth::from(&a), ShareAuth::from(&b));
    let batch_a = [part("ses_share_aaaa", "p1")];
    let batch_b = [part("ses_share_bbbb", "p1"), part("ses_share_bbbb", "p2")];
    let (ra, rb) = tokio::join!(
        service.sync(&auth_a, &batch_a),
        service.sync(&auth_b, &batch_b),
    );
    ra.unwrap();
    rb.unwrap();

    assert_eq!(service.data(&a.id).await.unwrap().len(), 1);
    assert_eq!(service.data(&b.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_concurrent_creates_yield_one_share() {
    let service = test_service();
    let attempts = (0..8).map(|_| {
        let service = service.clone();
        tokio::spawn(async move { service.create("ses_race_create").await })
    });
    let outcomes: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.expect("task should not panic"))
        .collect();

    let created = outcomes.iter().filter(|r| r.is_ok()).count();
    let rejected = outcomes
        .iter()
        .filter(|r| matches!(r, Err(ShareError::AlreadyExists { .. })))
        .count();
    assert_eq!(created, 1);
    assert_eq!(rejected, 7);
}
