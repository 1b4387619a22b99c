//! WSE Kernel - the workspace engine process
//!
//! Ties the reconciliation engine and the task queue together:
//! 1. **Scheduler**: debounced change-triggered pipeline runs plus heartbeat audits
//! 2. **Pipeline**: `sync -> apply -> doctor`, serialized across callers
//! 3. **Engine**: configuration, logging, journal and the daemon loop
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use wse_kernel::{Engine, EngineConfig};
//!
//! let engine = Engine::new(EngineConfig::from_env()?);
//! engine.run_daemon(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod ops;
pub mod pipeline;
pub mod scheduler;

pub use config::{EngineConfig, LogFormat};
pub use engine::Engine;
pub use error::{ConfigError, PipelineError, SchedulerError};
pub use logging::{init_tracing, EventJournal, JournalEvent, JOURNAL_FILE};
pub use ops::register_workspace_operations;
pub use pipeline::{Pipeline, ReconcilePipeline};
pub use scheduler::{MtimeWatcher, Phase, Scheduler, SchedulerConfig, SchedulerHandle, SchedulerStats};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
