use queue::JobStats;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job_id: String,
    pub total_tasks: i64,
    pub completed: i64,
    pub failed: i64,
    pub in_progress: i64,
    pub pending: i64,
    pub progress_pct: f64,
}

pub fn from_stats(job_id: &str, stats: &JobStats) -> JobStatus {
    let total = stats.total();
    JobStatus {
        job_id: job_id.to_string(),
        total_tasks: total,
        completed: stats.completed,
        failed: stats.failed,
        in_progress: stats.in_progress + stats.claimed,
        pending: stats.pending,
        progress_pct: if total > 0 { stats.completed as f64 / total as f64 * 100.0 } else { 0.0 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_pct_is_zero_for_empty_job() {
        let stats = JobStats::default();
        let status = from_stats("job_x", &stats);
        assert_eq!(status.progress_pct, 0.0);
        assert_eq!(status.total_tasks, 0);
    }

    #[test]
    fn in_progress_merges_claimed_and_in_progress() {
        let stats = JobStats { claimed: 2, in_progress: 3, completed: 1, pending: 4, ..Default::default() };
        let status = from_stats("job_x", &stats);
        assert_eq!(status.in_progress, 5);
        assert_eq!(status.total_tasks, 10);
        assert_eq!(status.progress_pct, 10.0);
    }
}
