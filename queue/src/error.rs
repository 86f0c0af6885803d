//! Error types returned by the store actor and the public `Queue` handle.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("task {0} not found")]
    TaskNotFound(i64),

    #[error("worker {0} not found")]
    WorkerNotFound(String),

    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("checkpoint for task {0} not found")]
    CheckpointNotFound(i64),

    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("dependency from task {task} on task {depends_on} would create a cycle")]
    DependencyCycle { task: i64, depends_on: i64 },

    #[error("task {0} cannot be claimed: not pending or paused")]
    NotClaimable(i64),

    #[error("task {0} is already terminal and cannot transition to {1}")]
    InvalidTransition(i64, &'static str),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store actor is no longer running")]
    ActorGone,

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type QueueResult<T> = Result<T, QueueError>;

impl From<tokio::sync::oneshot::error::RecvError> for QueueError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        QueueError::ActorGone
    }
}
