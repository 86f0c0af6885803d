//! Spawns and supervises worker child processes.

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use queue::Queue;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{info, warn};

const SUPERVISE_INTERVAL_SECS: u64 = 5;
const SHUTDOWN_GRACE_SECS: u64 = 10;

pub struct Coordinator {
    num_workers: usize,
    db_path: PathBuf,
    worker_bin: PathBuf,
    idle_timeout: Option<Duration>,
    log_dir: PathBuf,
}

impl Coordinator {
    pub fn new(num_workers: usize, db_path: PathBuf, worker_bin: PathBuf, idle_timeout_secs: u64) -> Self {
        Self {
            num_workers,
            db_path,
            worker_bin,
            idle_timeout: (idle_timeout_secs > 0).then(|| Duration::from_secs(idle_timeout_secs)),
            log_dir: PathBuf::from("logs"),
        }
    }

    async fn spawn_worker(&self, worker_id: &str) -> std::io::Result<Child> {
        let child = Command::new(&self.worker_bin)
            .arg(worker_id)
            .arg(&self.db_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        info!(worker_id, pid = child.id(), "spawned worker");
        Ok(child)
    }

    async fn monitor_worker_output(&self, child: &mut Child, worker_id: String) {
        let log_dir = self.log_dir.clone();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        if fs::create_dir_all(&log_dir).await.is_err() {
            warn!(worker_id = %worker_id, "failed to create log directory");
            return;
        }

        let log_path = log_dir.join(format!("worker_{}.log", worker_id));
        let Ok(mut file) = fs::File::create(&log_path).await else {
            warn!(worker_id = %worker_id, "failed to create worker log file");
            return;
        };
        let _ = file.write_all(format!("Worker {} log started\n{}\n\n", worker_id, "=".repeat(60)).as_bytes()).await;

        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).lines();
            let worker_id = worker_id.clone();
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = file.write_all(format!("{}\n", line).as_bytes()).await;
                    let _ = file.flush().await;
                    println!("[{}] {}", worker_id, line);
                }
            });
        }
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    eprintln!("[{}] {}", worker_id, line);
                }
            });
        }
    }

    /// Cleans up stale work from a previous run, spawns `num_workers` children, then
    /// supervises them until shutdown (idle timeout, Ctrl-C, or a fatal respawn loop).
    pub async fn run(&self, queue: Queue, stale_timeout_secs: i64) -> std::io::Result<()> {
        queue.cleanup_stale_tasks(stale_timeout_secs).await.ok();

        let mut children: HashMap<String, Child> = HashMap::new();
        for i in 1..=self.num_workers {
            let worker_id = format!("worker_{}", i);
            let mut child = self.spawn_worker(&worker_id).await?;
            self.monitor_worker_output(&mut child, worker_id.clone()).await;
            children.insert(worker_id, child);
        }

        info!(count = self.num_workers, "workers started");
        let mut last_activity = Instant::now();
        let mut shutdown = Box::pin(tokio::signal::ctrl_c());

        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(SUPERVISE_INTERVAL_SECS)) => {
                    if let Ok(stats) = queue.get_stats().await {
                        let active = stats.pending + stats.claimed + stats.in_progress;
                        if active > 0 {
                            last_activity = Instant::now();
                        } else if let Some(timeout) = self.idle_timeout {
                            if last_activity.elapsed() >= timeout {
                                warn!(idle_secs = last_activity.elapsed().as_secs(), "idle timeout reached, shutting down");
                                break;
                            }
                        }
                    }

                    let ids: Vec<String> = children.keys().cloned().collect();
                    for worker_id in ids {
                        let exited = children.get_mut(&worker_id).map(|c| c.try_wait());
                        if let Some(Ok(Some(status))) = exited {
                            warn!(worker_id = %worker_id, code = ?status.code(), "worker died, respawning");
                            if let Ok(mut child) = self.spawn_worker(&worker_id).await {
                                self.monitor_worker_output(&mut child, worker_id.clone()).await;
                                children.insert(worker_id, child);
                            }
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        self.shutdown_children(&mut children).await;
        Ok(())
    }

    async fn shutdown_children(&self, children: &mut HashMap<String, Child>) {
        for (worker_id, child) in children.iter() {
            if let Some(pid) = child.id() {
                info!(worker_id = %worker_id, pid, "sending SIGTERM");
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }

        for (worker_id, child) in children.iter_mut() {
            let waited = tokio::time::timeout(Duration::from_secs(SHUTDOWN_GRACE_SECS), child.wait()).await;
            if waited.is_err() {
                if let Some(pid) = child.id() {
                    warn!(worker_id = %worker_id, pid, "worker did not stop gracefully, sending SIGKILL");
                    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
                    let _ = child.wait().await;
                }
            }
        }

        info!("all workers stopped");
    }
}

pub fn worker_log_path(log_dir: &Path, worker_id: &str) -> PathBuf {
    log_dir.join(format!("worker_{}.log", worker_id))
}
