//! Integration tests for the content-addressed header store

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ::common::store::HeaderDigest;
use sha2::{Digest, Sha256};

#[tokio::test]
async fn test_storing_twice_is_idempotent() {
    let (store, _temp) = common::setup_store().await;
    let bytes = common::blob(1, 4096);

    let first = store.put(&bytes).await.unwrap();
    let second = store.put(&bytes).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.digests().await.unwrap(), vec![first]);
    assert_eq!(store.get(&first).await.unwrap().unwrap(), bytes);
}

#[tokio::test]
async fn test_digest_is_sha256_hex() {
    let (store, _temp) = common::setup_store().await;

    for (seed, len) in [(0u8, 1usize), (7, 124), (42, 65536)] {
        let bytes = common::blob(seed, len);
        let digest = store.put(&bytes).await.unwrap();
        assert_eq!(digest.to_hex(), hex::encode(Sha256::digest(&bytes)));
    }
}

#[tokio::test]
async fn test_concurrent_identical_writers() {
    let (store, _temp) = common::setup_store().await;
    let bytes = Arc::new(common::blob(9, 32 * 1024));

    let writers = (0..16).map(|_| {
        let store = store.clone();
        let bytes = bytes.clone();
        tokio::spawn(async move { store.put(&bytes).await.unwrap() })
    });
    let digests: Vec<HeaderDigest> = futures::future::join_all(writers)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert!(digests.iter().all(|d| *d == digests[0]));
    assert_eq!(store.digests().await.unwrap(), vec![digests[0]]);
    assert_eq!(store.get(&digests[0]).await.unwrap().unwrap(), *bytes);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reader_never_sees_partial_blob() {
    let (store, _temp) = common::setup_store().await;
    let bytes = common::blob(3, 1024 * 1024);
    let digest = HeaderDigest::of(&bytes);
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let store = store.clone();
        let done = done.clone();
        tokio::spawn(async move {
            let mut observed = 0usize;
            while !done.load(Ordering::SeqCst) {
                if let Some(seen) = store.get(&digest).await.unwrap() {
                    assert_eq!(HeaderDigest::of(&seen), digest);
                    observed += 1;
                }
                tokio::task::yield_now().await;
            }
            observed
        })
    };

    for _ in 0..20 {
        let mut pending = store.put_pending().unwrap();
        pending.write(&bytes).await.unwrap();
        let (published, _) = store.publish(pending).await.unwrap();
        assert_eq!(published, digest);
    }
    done.store(true, Ordering::SeqCst);

    reader.await.unwrap();
    assert_eq!(store.get(&digest).await.unwrap().unwrap(), bytes);
}

#[tokio::test]
async fn test_external_writer_then_publish() {
    let (store, _temp) = common::setup_store().await;

    let pending = store.put_pending().unwrap();
    std::fs::write(pending.path(), b"written by another process").unwrap();
    let (digest, bytes) = store.publish(pending).await.unwrap();

    assert_eq!(bytes, b"written by another process");
    assert!(store.contains(&digest).await.unwrap());
}
