//! Detects whether workers are likely to pick up a job's pending tasks, trusting
//! the `workers` table (status + heartbeat freshness) rather than OS process lookup.

use queue::{JobStats, Queue, QueueResult, WorkerStatus};
use std::io::IsTerminal;

const MAX_SUGGESTED_WORKERS: i64 = 10;
const STALE_AFTER_SECS: i64 = 60;

pub async fn count_live_workers(queue: &Queue) -> QueueResult<usize> {
    let workers = queue.get_active_progress().await?;
    let now = chrono::Utc::now();
    Ok(workers
        .iter()
        .filter(|w| w.status == WorkerStatus::Active || w.status == WorkerStatus::Idle)
        .filter(|w| (now - w.last_heartbeat).num_seconds() < STALE_AFTER_SECS)
        .count())
}

pub fn suggested_worker_count(stats: &JobStats) -> i64 {
    let runnable = stats.pending + stats.claimed;
    runnable.clamp(1, MAX_SUGGESTED_WORKERS)
}

/// True when running non-interactively: no controlling terminal on either std stream,
/// or the operator opted in via `AUTO_START_WORKERS=true`.
pub fn is_non_interactive() -> bool {
    std::env::var("AUTO_START_WORKERS").map(|v| v == "true").unwrap_or(false)
        || !std::io::stdin().is_terminal()
        || !std::io::stdout().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_at_least_one_worker_when_tasks_exist() {
        let stats = JobStats { pending: 0, claimed: 1, ..Default::default() };
        assert_eq!(suggested_worker_count(&stats), 1);
    }

    #[test]
    fn caps_suggestion_at_max() {
        let stats = JobStats { pending: 50, ..Default::default() };
        assert_eq!(suggested_worker_count(&stats), 10);
    }
}
