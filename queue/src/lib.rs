//! Durable SQLite-backed task queue: the sole coordination substrate shared by the
//! worker fleet and the orchestrator.

pub mod config;
pub mod error;
pub mod queue;
pub mod schema;
pub mod store;
pub mod types;
pub mod verifier;

pub use config::Config;
pub use error::{QueueError, QueueResult};
pub use queue::Queue;
pub use types::*;
