use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Queue(#[from] queue::QueueError),

    #[error(transparent)]
    ProjectBoundary(#[from] queue::config::ProjectBoundaryError),

    #[error("job {0} not found")]
    JobNotFound(String),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
