//! `RefreshScheduler` (C6) — background pre-refresh dispatch for ASYNC mode.
//!
//! A `tokio::sync::broadcast` channel carries the shutdown signal, raced via
//! `tokio::select!` against each task's refresh future. The dedup map is a
//! `DashMap`-as-in-flight-set, keyed per-task rather than per-lock.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Dispatches at most one in-flight background refresh per key, bounded by a
/// semaphore so a pre-refresh storm can't exhaust the runtime's task budget.
pub struct RefreshScheduler {
    in_flight: Arc<DashMap<String, ()>>,
    semaphore: Arc<Semaphore>,
    tasks: tokio::sync::Mutex<JoinSet<()>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RefreshScheduler {
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            in_flight: Arc::new(DashMap::new()),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            tasks: tokio::sync::Mutex::new(JoinSet::new()),
            shutdown_tx,
        }
    }

    /// Schedules `refresh` to run on the runtime unless `dedup_key` already
    /// has a refresh in flight, in which case this call is a silent no-op —
    /// the in-flight task will populate the same key.
    pub async fn schedule<F>(self: &Arc<Self>, dedup_key: String, refresh: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.in_flight.insert(dedup_key.clone(), ()).is_some() {
            debug!(key = %dedup_key, "pre-refresh already in flight, skipping");
            return;
        }

        let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
            warn!(key = %dedup_key, "pre-refresh semaphore exhausted, dropping task");
            self.in_flight.remove(&dedup_key);
            return;
        };

        let in_flight = self.in_flight.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let task_key = dedup_key.clone();

        self.tasks.lock().await.spawn(async move {
            let _permit = permit;
            tokio::select! {
                () = refresh => {}
                _ = shutdown_rx.recv() => {
                    debug!(key = %task_key, "pre-refresh cancelled by shutdown");
                }
            }
            in_flight.remove(&task_key);
        });
    }

    /// Waits up to `deadline` for outstanding tasks to finish naturally, then
    /// broadcasts cancellation and gives stragglers a brief grace period to
    /// observe it before this call returns and abandons them.
    pub async fn shutdown(&self, deadline: tokio::time::Duration) {
        let mut tasks = self.tasks.lock().await;
        let drained = tokio::time::timeout(deadline, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            let _ = self.shutdown_tx.send(());
            let _ = tokio::time::timeout(tokio::time::Duration::from_millis(50), async {
                while tasks.join_next().await.is_some() {}
            })
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn duplicate_schedule_for_same_key_runs_once() {
        let scheduler = Arc::new(RefreshScheduler::new(4));
        let count = Arc::new(AtomicU32::new(0));

        for _ in 0..5 {
            let count = count.clone();
            scheduler
                .schedule("users::42".to_string(), async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    count.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }

        scheduler.shutdown(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_all_run() {
        let scheduler = Arc::new(RefreshScheduler::new(4));
        let count = Arc::new(AtomicU32::new(0));

        for i in 0..3 {
            let count = count.clone();
            scheduler
                .schedule(format!("users::{i}"), async move {
                    count.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }

        scheduler.shutdown(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
