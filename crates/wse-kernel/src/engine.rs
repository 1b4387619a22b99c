//! Engine assembly
//!
//! Wires configuration, the reconciliation pipeline, the task queue and the
//! scheduler into one process-owned object.

use crate::config::EngineConfig;
use crate::logging::{EventJournal, JournalEvent};
use crate::ops::register_workspace_operations;
use crate::pipeline::{Pipeline, ReconcilePipeline};
use crate::scheduler::{MtimeWatcher, Scheduler};
use anyhow::Context;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use wse_core::{EngineContext, QueueError, TaskQueue};
use wse_reconcile::{Reconciler, WorkspaceLayout};

/// Fully wired engine
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    layout: WorkspaceLayout,
    ctx: Arc<EngineContext>,
    pipeline: Arc<ReconcilePipeline>,
    journal: Arc<EventJournal>,
}

impl Engine {
    /// Build the context (built-in and workspace operations) and pipeline
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let layout = WorkspaceLayout::new(&config.data_dir);
        let pipeline = Arc::new(ReconcilePipeline::new(Reconciler::new(
            layout.clone(),
            config.mode.clone(),
        )));
        let ctx = EngineContext::with_builtins(config.scripts());
        register_workspace_operations(&ctx, &pipeline);
        let journal = Arc::new(EventJournal::in_dir(&layout.logs_dir()));

        Self {
            config,
            layout,
            ctx: Arc::new(ctx),
            pipeline,
            journal,
        }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    #[inline]
    #[must_use]
    pub fn pipeline(&self) -> &Arc<ReconcilePipeline> {
        &self.pipeline
    }

    #[inline]
    #[must_use]
    pub fn journal(&self) -> &Arc<EventJournal> {
        &self.journal
    }

    /// Start a worker pool sized from config
    ///
    /// # Errors
    /// - `QueueError::EmptyPool` if configured with zero workers
    pub fn start_queue(&self) -> Result<TaskQueue, QueueError> {
        TaskQueue::start(Arc::clone(&self.ctx), self.config.workers)
    }

    /// Run queue and scheduler until `shutdown` resolves
    ///
    /// Mirrors are polled every `poll` interval; one pipeline run is queued
    /// at startup so canonical files catch up with edits made while stopped.
    ///
    /// # Errors
    /// Startup failures (worker pool, scheduler thread, poll task join)
    pub async fn run_daemon<S>(&self, shutdown: S) -> anyhow::Result<()>
    where
        S: Future<Output = ()>,
    {
        self.journal.record(
            &JournalEvent::now("start")
                .with("data_dir", self.layout.root().display().to_string())
                .with("workers", self.config.workers),
        );
        tracing::info!("Engine starting on {}", self.layout.root().display());

        let queue = self.start_queue().context("starting task queue")?;
        let pipeline: Arc<dyn Pipeline> = Arc::clone(&self.pipeline) as Arc<dyn Pipeline>;
        let scheduler = Scheduler::start(
            self.config.scheduler(),
            pipeline,
            Some(Arc::clone(&self.journal)),
        )
        .context("starting scheduler")?;
        let handle = scheduler.handle();
        handle.mark_dirty();

        let layout = self.layout.clone();
        let mut watcher = tokio::task::spawn_blocking(move || MtimeWatcher::new(layout))
            .await
            .context("priming change watcher")?;
        let mut ticker = tokio::time::interval(self.config.poll.max(Duration::from_millis(1)));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    let (polled, changed) = tokio::task::spawn_blocking(move || {
                        let changed = watcher.poll();
                        (watcher, changed)
                    })
                    .await
                    .context("polling mirrors")?;
                    watcher = polled;
                    if changed {
                        handle.mark_dirty();
                    }
                }
            }
        }

        tracing::info!("Engine stopping");
        let timeout = self.config.shutdown_timeout;
        let stopped = tokio::task::spawn_blocking(move || scheduler.stop(timeout)).await;
        match stopped {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("{e}"),
            Err(e) => tracing::warn!("Scheduler stop task failed: {e}"),
        }
        if let Err(e) = queue.shutdown(timeout).await {
            tracing::warn!("{e}");
        }
        self.journal.record(&JournalEvent::now("stop"));
        Ok(())
    }
}
