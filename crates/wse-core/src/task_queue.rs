//! Task queue with a bounded worker pool
//!
//! Named operations are submitted with a JSON argument payload and executed
//! in FIFO order by a fixed number of tokio worker tasks:
//! - Submission never blocks on execution
//! - At most `pool_size` operations run at once
//! - A failing or panicking operation fails only its own job
//!
//! Workers share one receiver; whichever worker is idle takes the next id.

use crate::context::EngineContext;
use crate::error::{OperationError, QueueError};
use crate::jobs::QueueStats;
use crate::types::{JobId, JobLookup};
use serde_json::{Map, Value};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::{JoinError, JoinHandle};

/// Status poll interval used by [`TaskQueue::wait`]
const WAIT_POLL: Duration = Duration::from_millis(10);

type SharedReceiver = Arc<Mutex<mpsc::UnboundedReceiver<JobId>>>;

/// Handle to a running worker pool
#[derive(Debug)]
pub struct TaskQueue {
    ctx: Arc<EngineContext>,
    sender: mpsc::UnboundedSender<JobId>,
    stop: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskQueue {
    /// Spawn `pool_size` workers on the current tokio runtime
    ///
    /// # Errors
    /// - `QueueError::EmptyPool` if `pool_size` is zero
    pub fn start(ctx: Arc<EngineContext>, pool_size: usize) -> Result<Self, QueueError> {
        if pool_size == 0 {
            return Err(QueueError::EmptyPool);
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver: SharedReceiver = Arc::new(Mutex::new(receiver));
        let (stop, stop_rx) = watch::channel(false);

        let workers = (0..pool_size)
            .map(|n| {
                tokio::spawn(worker_loop(
                    n,
                    Arc::clone(&ctx),
                    Arc::clone(&receiver),
                    stop_rx.clone(),
                ))
            })
            .collect();

        tracing::info!("Task queue started with {pool_size} workers");
        Ok(Self {
            ctx,
            sender,
            stop,
            workers,
        })
    }

    /// Shared context (registry and job store)
    #[inline]
    #[must_use]
    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    /// Number of workers
    #[inline]
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.workers.len()
    }

    /// Enqueue a job and return its id immediately
    ///
    /// The name is not checked here; an unregistered name fails the job when
    /// a worker picks it up. A `null` payload is recorded as `{}`.
    pub fn submit(&self, name: impl Into<String>, args: Value) -> JobId {
        let args = if args.is_null() {
            Value::Object(Map::new())
        } else {
            args
        };
        let name = name.into();
        let id = self.ctx.jobs.insert_queued(name.clone(), args);
        tracing::debug!("Job {id} queued: {name}");

        if self.sender.send(id).is_err() {
            // all workers are gone; the job can never run
            self.ctx.jobs.finish(
                &id,
                Err(OperationError::failed("task queue is shut down")),
            );
        }
        id
    }

    /// Snapshot of a job, or the `unknown` sentinel
    #[must_use]
    pub fn status(&self, id: &JobId) -> JobLookup {
        self.ctx.jobs.lookup(id)
    }

    /// Like [`TaskQueue::status`] for a raw id string
    ///
    /// Strings that are not job ids yield the `unknown` sentinel.
    #[must_use]
    pub fn status_str(&self, raw: &str) -> JobLookup {
        raw.parse::<JobId>()
            .map_or(JobLookup::Unknown, |id| self.status(&id))
    }

    /// Registered operation names, sorted
    #[must_use]
    pub fn list_operations(&self) -> Vec<String> {
        self.ctx.registry.names()
    }

    /// Job counts by status
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        self.ctx.jobs.stats()
    }

    /// Poll until the job is terminal or `timeout` elapses
    ///
    /// Returns the last snapshot either way; callers check
    /// [`JobLookup::status_str`] to tell the cases apart.
    pub async fn wait(&self, id: &JobId, timeout: Duration) -> JobLookup {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let lookup = self.status(id);
            let settled = match &lookup {
                JobLookup::Known(record) => record.status.is_terminal(),
                JobLookup::Unknown => true,
            };
            if settled || tokio::time::Instant::now() >= deadline {
                return lookup;
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }

    /// Stop taking new jobs and join the workers
    ///
    /// Workers finish the job they are running; queued jobs that were not
    /// picked up stay `queued`.
    ///
    /// # Errors
    /// - `QueueError::ShutdownTimeout` if workers are still busy after
    ///   `timeout`; they are left detached
    pub async fn shutdown(mut self, timeout: Duration) -> Result<(), QueueError> {
        // receivers only vanish once every worker has exited
        let _ = self.stop.send(true);

        let deadline = tokio::time::Instant::now() + timeout;
        let mut workers = std::mem::take(&mut self.workers);
        for handle in &mut workers {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Worker ended abnormally: {e}"),
                Err(_) => break,
            }
        }

        let pending = workers.iter().filter(|h| !h.is_finished()).count();
        if pending > 0 {
            tracing::warn!("Task queue shutdown timed out with {pending} busy workers");
            return Err(QueueError::ShutdownTimeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                pending,
            });
        }
        tracing::info!("Task queue stopped");
        Ok(())
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
    }
}

/// Worker task (one per pool slot)
async fn worker_loop(
    worker: usize,
    ctx: Arc<EngineContext>,
    queue: SharedReceiver,
    mut stop: watch::Receiver<bool>,
) {
    tracing::debug!("Worker {worker} started");
    loop {
        if *stop.borrow() {
            break;
        }
        let next = tokio::select! {
            biased;
            _ = stop.changed() => break,
            id = async { queue.lock().await.recv().await } => id,
        };
        let Some(id) = next else { break };
        run_job(&ctx, id).await;
    }
    tracing::debug!("Worker {worker} stopped");
}

/// Execute one job and record its outcome
async fn run_job(ctx: &EngineContext, id: JobId) {
    let Some((name, args)) = ctx.jobs.mark_running(&id) else {
        tracing::warn!("Dequeued job {id} is not queued; skipping");
        return;
    };
    tracing::debug!("Job {id} running: {name}");

    let outcome = match ctx.registry.get(&name) {
        None => Err(OperationError::UnknownTask(name.clone())),
        // invoke inside the task: a panic while building the future must also
        // land in the JoinError
        Some(op) => match tokio::spawn(async move { op.invoke(args).await }).await {
            Ok(result) => result,
            Err(e) => Err(OperationError::Panicked(join_error_message(e))),
        },
    };

    match &outcome {
        Ok(_) => tracing::info!("Job {id} ({name}) done"),
        Err(e) => tracing::warn!("Job {id} ({name}) failed: {e}"),
    }
    ctx.jobs.finish(&id, outcome);
}

fn join_error_message(e: JoinError) -> String {
    if e.is_cancelled() {
        return "task was cancelled".to_string();
    }
    panic_message(e.into_panic())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&'static str>()
            .map_or_else(|| "unknown panic payload".to_string(), |s| (*s).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Operation;
    use serde_json::json;

    fn echo_context() -> Arc<EngineContext> {
        let ctx = EngineContext::new();
        ctx.register(
            "echo",
            Operation::positional(|v| async move { Ok(json!({"echo": v})) }),
        );
        Arc::new(ctx)
    }

    #[tokio::test]
    async fn zero_workers_is_rejected() {
        let result = TaskQueue::start(echo_context(), 0);
        assert!(matches!(result, Err(QueueError::EmptyPool)));
    }

    #[tokio::test]
    async fn null_payload_is_recorded_as_empty_object() {
        let queue = TaskQueue::start(echo_context(), 1).unwrap();
        let id = queue.submit("echo", Value::Null);
        let lookup = queue.wait(&id, Duration::from_secs(5)).await;

        let record = lookup.record().unwrap();
        assert_eq!(record.args, json!({}));
        assert_eq!(record.result, Some(json!({"echo": {}})));
        queue.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn garbage_id_string_is_unknown() {
        let queue = TaskQueue::start(echo_context(), 1).unwrap();
        assert_eq!(queue.status_str("definitely-not-an-id").status_str(), "unknown");
        assert_eq!(
            queue.status_str(&JobId::new().to_string()).status_str(),
            "unknown"
        );
        queue.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[test]
    fn panic_payloads_render_as_text() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new("owned".to_string())), "owned");
        assert_eq!(panic_message(Box::new(42_u8)), "unknown panic payload");
    }
}
