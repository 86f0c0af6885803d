//! The heartbeat task: a cooperative future sharing the worker's queue handle,
//! stopped explicitly on shutdown rather than left to die with the process.

use queue::{Queue, WorkerStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::oneshot;
use tokio::time::{Duration, interval};
use tracing::warn;

const HEARTBEAT_INTERVAL_SECS: u64 = 5;

/// Shared slot the main loop updates with the task it currently holds, read by
/// the heartbeat task on every tick. `0` means idle.
pub struct CurrentTask(AtomicI64);

impl CurrentTask {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(0)))
    }

    pub fn set(&self, task_id: Option<i64>) {
        self.0.store(task_id.unwrap_or(0), Ordering::SeqCst);
    }

    pub fn get(&self) -> Option<i64> {
        match self.0.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }
}

pub struct HeartbeatHandle {
    shutdown: oneshot::Sender<()>,
    join: tokio::task::JoinHandle<()>,
}

impl HeartbeatHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.join.await;
    }
}

pub fn spawn(queue: Queue, worker_id: String, current_task: Arc<CurrentTask>) -> HeartbeatHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

    let join = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let task_id = current_task.get();
                    let status = if task_id.is_some() { WorkerStatus::Active } else { WorkerStatus::Idle };
                    if let Err(e) = queue.update_worker_heartbeat(&worker_id, status, task_id).await {
                        warn!(worker_id = %worker_id, error = %e, "heartbeat update failed");
                    }
                }
                _ = &mut shutdown_rx => break,
            }
        }
    });

    HeartbeatHandle { shutdown: shutdown_tx, join }
}
