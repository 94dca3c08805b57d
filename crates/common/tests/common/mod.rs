//! Shared test utilities for header store integration tests
#![allow(dead_code)]

use common::store::HeaderStore;
use tempfile::TempDir;

/// Set up a header store in a fresh temporary directory
pub async fn setup_store() -> (HeaderStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = HeaderStore::open(temp_dir.path().join("headers"))
        .await
        .unwrap();
    (store, temp_dir)
}

/// Deterministic pseudo-random bytes of the given length
pub fn blob(seed: u8, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
