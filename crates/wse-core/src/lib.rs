//! WSE Core - asynchronous task queue
//!
//! Runs named operations in the background on a bounded worker pool:
//! - Registry of operations with declared argument styles
//! - FIFO queue, fixed number of tokio workers
//! - Observable job records (`queued -> running -> done | failed`)
//! - Built-in sleep, HTTP and script operations
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use wse_core::{EngineContext, ScriptSettings, TaskQueue};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = Arc::new(EngineContext::with_builtins(ScriptSettings::default()));
//! let queue = TaskQueue::start(ctx, 2)?;
//!
//! let id = queue.submit("sleep", serde_json::json!({"seconds": 0}));
//! let job = queue.wait(&id, Duration::from_secs(5)).await;
//! println!("{}", serde_json::to_string(&job)?);
//!
//! queue.shutdown(Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod builtins;
pub mod context;
pub mod error;
pub mod jobs;
pub mod registry;
pub mod task_queue;
pub mod types;

pub use builtins::{register_builtins, ScriptOutput, ScriptSettings};
pub use context::EngineContext;
pub use error::{OperationError, QueueError};
pub use jobs::{JobStore, QueueStats};
pub use registry::{Operation, OperationFuture, OperationRegistry};
pub use task_queue::TaskQueue;
pub use types::{JobId, JobLookup, JobRecord, JobStatus};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
