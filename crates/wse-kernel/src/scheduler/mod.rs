//! Debounced Scheduler
//!
//! One background thread owns every pipeline invocation, so apply and doctor
//! passes never overlap:
//! - `mark_dirty` moves the scheduler from idle to pending
//! - while pending, each new mark restarts the debounce window; once the
//!   window passes quietly the full pipeline runs and the scheduler is idle
//! - when the heartbeat interval elapses while idle, a doctor-only pass runs
//!   and the heartbeat clock restarts
//!
//! Step failures and panics are logged and swallowed; the loop keeps going.

mod watch;

pub use watch::MtimeWatcher;

use crate::error::SchedulerError;
use crate::logging::{EventJournal, JournalEvent};
use crate::pipeline::Pipeline;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Scheduler timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Quiet interval required after the last change
    pub debounce: Duration,
    /// Cadence of doctor-only passes
    pub heartbeat: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
            heartbeat: Duration::from_secs(60),
        }
    }
}

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Change seen, waiting out the debounce window or running the pipeline
    Pending,
}

/// Counters since start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Full pipeline runs triggered by changes
    pub pipeline_runs: u64,
    /// Doctor-only passes triggered by the heartbeat
    pub heartbeat_passes: u64,
    /// Runs or passes that returned an error or panicked
    pub failures: u64,
}

#[derive(Debug)]
struct State {
    dirty: bool,
    stop: bool,
    phase: Phase,
}

#[derive(Debug, Default)]
struct Counters {
    pipeline_runs: AtomicU64,
    heartbeat_passes: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    signal: Condvar,
    counters: Counters,
}

/// Cloneable handle for signalling changes from other threads
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
}

impl SchedulerHandle {
    /// Record that watched paths changed
    pub fn mark_dirty(&self) {
        let mut state = self.shared.state.lock();
        state.dirty = true;
        state.phase = Phase::Pending;
        self.shared.signal.notify_all();
    }
}

/// Running scheduler
#[derive(Debug)]
pub struct Scheduler {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
    exited: mpsc::Receiver<()>,
}

impl Scheduler {
    /// Spawn the background thread
    ///
    /// # Errors
    /// - `SchedulerError::Spawn` if the OS refuses a new thread
    pub fn start(
        config: SchedulerConfig,
        pipeline: Arc<dyn Pipeline>,
        journal: Option<Arc<EventJournal>>,
    ) -> Result<Self, SchedulerError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                dirty: false,
                stop: false,
                phase: Phase::Idle,
            }),
            signal: Condvar::new(),
            counters: Counters::default(),
        });
        let (exited_tx, exited) = mpsc::channel();

        let worker = Worker {
            config,
            shared: Arc::clone(&shared),
            pipeline,
            journal,
        };
        let thread = std::thread::Builder::new()
            .name("wse-scheduler".to_string())
            .spawn(move || {
                worker.run();
                let _ = exited_tx.send(());
            })
            .map_err(SchedulerError::Spawn)?;

        tracing::info!(
            debounce = ?config.debounce,
            heartbeat = ?config.heartbeat,
            "Scheduler started"
        );
        Ok(Self {
            shared,
            thread: Some(thread),
            exited,
        })
    }

    /// Handle for change notifications
    #[must_use]
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Record that watched paths changed
    pub fn mark_dirty(&self) {
        self.handle().mark_dirty();
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.shared.state.lock().phase
    }

    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let c = &self.shared.counters;
        SchedulerStats {
            pipeline_runs: c.pipeline_runs.load(Ordering::SeqCst),
            heartbeat_passes: c.heartbeat_passes.load(Ordering::SeqCst),
            failures: c.failures.load(Ordering::SeqCst),
        }
    }

    /// Signal stop and join the thread within `timeout`
    ///
    /// A pass already in progress is not interrupted.
    ///
    /// # Errors
    /// - `SchedulerError::JoinTimeout` if the thread is still busy; it is
    ///   left detached and exits after its current pass
    pub fn stop(mut self, timeout: Duration) -> Result<(), SchedulerError> {
        self.request_stop();
        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                if let Some(thread) = self.thread.take() {
                    if thread.join().is_err() {
                        tracing::error!("Scheduler thread panicked");
                    }
                }
                tracing::info!("Scheduler stopped");
                Ok(())
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                self.thread.take();
                Err(SchedulerError::JoinTimeout {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    fn request_stop(&self) {
        let mut state = self.shared.state.lock();
        state.stop = true;
        self.shared.signal.notify_all();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.request_stop();
    }
}

/// State owned by the background thread
struct Worker {
    config: SchedulerConfig,
    shared: Arc<Shared>,
    pipeline: Arc<dyn Pipeline>,
    journal: Option<Arc<EventJournal>>,
}

impl Worker {
    fn run(&self) {
        let mut next_heartbeat = Instant::now() + self.config.heartbeat;
        let mut state = self.shared.state.lock();

        loop {
            if state.stop {
                break;
            }

            if state.dirty {
                if !self.debounce(&mut state) {
                    break;
                }
                MutexGuard::unlocked(&mut state, || self.run_pipeline());
                // a change during the run re-arms dirty and keeps us pending
                if !state.dirty {
                    state.phase = Phase::Idle;
                }
                continue;
            }

            if Instant::now() >= next_heartbeat {
                MutexGuard::unlocked(&mut state, || self.run_heartbeat());
                next_heartbeat = Instant::now() + self.config.heartbeat;
                continue;
            }

            self.shared.signal.wait_until(&mut state, next_heartbeat);
        }
        tracing::debug!("Scheduler loop exited");
    }

    /// Wait until `debounce` passes with no new mark; `false` on stop
    fn debounce(&self, state: &mut MutexGuard<'_, State>) -> bool {
        state.dirty = false;
        state.phase = Phase::Pending;
        let mut deadline = Instant::now() + self.config.debounce;
        loop {
            let timed_out = self.shared.signal.wait_until(state, deadline).timed_out();
            if state.stop {
                return false;
            }
            if state.dirty {
                state.dirty = false;
                deadline = Instant::now() + self.config.debounce;
                continue;
            }
            if timed_out || Instant::now() >= deadline {
                return true;
            }
        }
    }

    fn run_pipeline(&self) {
        let c = &self.shared.counters;
        c.pipeline_runs.fetch_add(1, Ordering::SeqCst);
        let result = guarded(|| self.pipeline.run());
        if let Err(message) = &result {
            c.failures.fetch_add(1, Ordering::SeqCst);
            tracing::error!("Pipeline run failed: {message}");
        }
        self.journal("pipeline", result);
    }

    fn run_heartbeat(&self) {
        let c = &self.shared.counters;
        c.heartbeat_passes.fetch_add(1, Ordering::SeqCst);
        let result = guarded(|| self.pipeline.doctor());
        if let Err(message) = &result {
            c.failures.fetch_add(1, Ordering::SeqCst);
            tracing::error!("Heartbeat doctor failed: {message}");
        }
        self.journal("heartbeat", result);
    }

    fn journal(&self, event: &str, result: Result<(), String>) {
        let Some(journal) = &self.journal else {
            return;
        };
        let mut line = JournalEvent::now(event).with("ok", result.is_ok());
        if let Err(message) = result {
            line = line.with("error", message);
        }
        journal.record(&line);
    }
}

/// Run a step, turning errors and panics into a message
fn guarded<F>(step: F) -> Result<(), String>
where
    F: FnOnce() -> Result<(), crate::error::PipelineError>,
{
    match catch_unwind(AssertUnwindSafe(step)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(format!(
            "panicked: {}",
            payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown payload".to_string())
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    #[derive(Default)]
    struct Counting {
        runs: AtomicU64,
        doctors: AtomicU64,
    }

    impl Pipeline for Counting {
        fn apply(&self) -> Result<(), PipelineError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn doctor(&self) -> Result<(), PipelineError> {
            self.doctors.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn idle_until_marked() {
        let config = SchedulerConfig {
            debounce: Duration::from_millis(20),
            heartbeat: Duration::from_secs(3600),
        };
        let pipeline = Arc::new(Counting::default());
        let scheduler = Scheduler::start(config, pipeline.clone(), None).unwrap();

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(scheduler.phase(), Phase::Idle);
        assert_eq!(scheduler.stats(), SchedulerStats::default());

        scheduler.stop(Duration::from_secs(1)).unwrap();
        assert_eq!(pipeline.runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn mark_enters_pending() {
        let config = SchedulerConfig {
            debounce: Duration::from_secs(3600),
            heartbeat: Duration::from_secs(3600),
        };
        let scheduler = Scheduler::start(config, Arc::new(Counting::default()), None).unwrap();
        scheduler.mark_dirty();
        assert_eq!(scheduler.phase(), Phase::Pending);
        // stop interrupts the debounce wait
        scheduler.stop(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn panic_message_is_captured() {
        let result = guarded(|| panic!("bad step"));
        assert_eq!(result, Err("panicked: bad step".to_string()));
    }
}
