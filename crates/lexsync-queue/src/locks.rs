//! Per-key job serialization

use lexsync_core::EntityType;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per (connection, entity type) key.
///
/// At most one job for a key runs at a time; workers holding different keys
/// proceed fully in parallel. This avoids write contention between a batch
/// sync and webhook-triggered jobs for the same key, but the database
/// uniqueness constraint remains the actual correctness guarantee across
/// processes.
///
/// Entries are never pruned: the map tops out at connections x entity
/// types, and each key's mutex is reused by every later job for that key.
#[derive(Default)]
pub struct KeyLockMap {
    locks: Mutex<HashMap<(i32, EntityType), Arc<Mutex<()>>>>,
}

impl KeyLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a key, waiting behind any current holder.
    pub async fn lock(&self, key: (i32, EntityType)) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_never_runs_concurrently() {
        let locks = Arc::new(KeyLockMap::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock((1, EntityType::Matter)).await;
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_run_in_parallel() {
        let locks = Arc::new(KeyLockMap::new());

        let guard = locks.lock((1, EntityType::Matter)).await;

        // A different entity type for the same connection is a different key
        let other = tokio::time::timeout(
            Duration::from_millis(100),
            locks.lock((1, EntityType::Contact)),
        )
        .await;
        assert!(other.is_ok());

        // The same key stays blocked while the guard is held
        let same = tokio::time::timeout(
            Duration::from_millis(50),
            locks.lock((1, EntityType::Matter)),
        )
        .await;
        assert!(same.is_err());

        drop(guard);
        let unblocked = tokio::time::timeout(
            Duration::from_millis(100),
            locks.lock((1, EntityType::Matter)),
        )
        .await;
        assert!(unblocked.is_ok());
    }
}
