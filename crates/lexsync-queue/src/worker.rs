//! Fixed-size worker pool

use crate::executor::JobExecutor;
use crate::locks::KeyLockMap;
use lexsync_core::Job;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Pool of identical workers draining one shared job channel.
///
/// Each worker takes the next message, acquires the per-key lock, and runs
/// the executor. A worker blocked on a busy key is the serialization
/// mechanism: same-key jobs run in enqueue order, different keys run in
/// parallel up to the pool size.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(
        concurrency: usize,
        receiver: mpsc::Receiver<Job>,
        executor: Arc<JobExecutor>,
        locks: Arc<KeyLockMap>,
    ) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));
        let mut handles = Vec::with_capacity(concurrency);

        for worker_id in 0..concurrency {
            let receiver = receiver.clone();
            let executor = executor.clone();
            let locks = locks.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    // Hold the receiver lock only for the dequeue itself
                    let job = {
                        let mut receiver = receiver.lock().await;
                        receiver.recv().await
                    };
                    let Some(job) = job else {
                        debug!(worker_id, "queue channel closed, worker exiting");
                        break;
                    };

                    debug!(worker_id, %job, "worker picked up job");
                    let _guard = locks.lock(job.lock_key()).await;
                    executor.execute(job).await;
                }
            }));
        }

        info!(concurrency, "worker pool started");
        Self { handles }
    }

    /// Wait for every worker to drain and exit. Workers exit once the last
    /// sender is dropped and the channel is empty.
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexsync_core::{BatchSyncJob, EntityType, SyncMode};

    // Pool mechanics are exercised here with a channel the test controls;
    // end-to-end job behavior is covered by the executor tests.

    #[tokio::test]
    async fn test_workers_exit_when_channel_closes() {
        let (sender, receiver) = mpsc::channel::<Job>(4);
        drop(sender);

        // A pool with no executor work to do: closing the channel before any
        // job is sent means workers must exit immediately.
        let receiver = Arc::new(Mutex::new(receiver));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let receiver = receiver.clone();
            handles.push(tokio::spawn(async move {
                let mut receiver = receiver.lock().await;
                receiver.recv().await
            }));
        }

        for handle in handles {
            let result = tokio::time::timeout(std::time::Duration::from_secs(1), handle)
                .await
                .expect("worker should exit promptly")
                .expect("worker task should not panic");
            assert!(result.is_none());
        }
    }

    #[tokio::test]
    async fn test_shared_receiver_delivers_each_job_once() {
        let (sender, receiver) = mpsc::channel::<Job>(16);
        let receiver = Arc::new(Mutex::new(receiver));

        for job_id in 0..10 {
            sender
                .send(Job::BatchSync(BatchSyncJob {
                    job_id,
                    connection_id: 1,
                    entity_type: EntityType::Matter,
                    mode: SyncMode::Full,
                }))
                .await
                .unwrap();
        }
        drop(sender);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let receiver = receiver.clone();
            let seen = seen.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let job = {
                        let mut receiver = receiver.lock().await;
                        receiver.recv().await
                    };
                    match job {
                        Some(job) => seen.lock().await.push(job.job_id()),
                        None => break,
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut ids = seen.lock().await.clone();
        ids.sort_unstable();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
    }
}
