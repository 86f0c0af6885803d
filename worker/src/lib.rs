//! Worker execution loop and coordinator supervisor for the task fleet.

pub mod coordinator;
pub mod error;
pub mod execution;
pub mod heartbeat;
pub mod prompt;
pub mod worker;

pub use coordinator::Coordinator;
pub use error::{WorkerError, WorkerResult};
pub use worker::Worker;
