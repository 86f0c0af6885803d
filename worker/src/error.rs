use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("database does not exist at {0}")]
    DatabaseMissing(String),

    #[error(transparent)]
    Queue(#[from] queue::QueueError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type WorkerResult<T> = Result<T, WorkerError>;
