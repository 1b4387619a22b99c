//! Task queue behaviour through the public API
//!
//! Run with: cargo test --package wse-core --test task_queue_tests

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use wse_core::{EngineContext, JobStatus, Operation, OperationError, ScriptSettings, TaskQueue};

const WAIT: Duration = Duration::from_secs(5);

fn builtin_queue(workers: usize) -> TaskQueue {
    let ctx = Arc::new(EngineContext::with_builtins(ScriptSettings::default()));
    TaskQueue::start(ctx, workers).unwrap()
}

#[tokio::test]
async fn sleep_job_completes_with_result() {
    let queue = builtin_queue(2);

    let id = queue.submit("sleep", json!({"seconds": 0}));
    let job = queue.wait(&id, WAIT).await;

    let record = job.record().unwrap();
    assert_eq!(record.status, JobStatus::Done);
    assert_eq!(record.result, Some(json!({"slept": 0})));
    assert_eq!(record.error, None);
    let started = record.started_at.unwrap();
    let finished = record.finished_at.unwrap();
    assert!(record.submitted_at <= started);
    assert!(started <= finished);

    let value = serde_json::to_value(&job).unwrap();
    assert_eq!(value["status"], "done");
    assert_eq!(value["result"], json!({"slept": 0}));

    queue.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn unknown_operation_fails_job() {
    let queue = builtin_queue(1);

    let id = queue.submit("does_not_exist", json!({}));
    let job = queue.wait(&id, WAIT).await;

    let record = job.record().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.error.as_deref(), Some("Unknown task: does_not_exist"));
    assert!(record.finished_at.is_some());

    queue.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn never_submitted_id_is_unknown() {
    let queue = builtin_queue(1);
    let value = serde_json::to_value(queue.status_str("0000")).unwrap();
    assert_eq!(value, json!({"status": "unknown"}));
    queue.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn failing_and_panicking_jobs_leave_workers_alive() {
    let ctx = EngineContext::new();
    ctx.register(
        "boom",
        Operation::no_args(|| async { Err(OperationError::failed("boom")) }),
    );
    ctx.register(
        "explode",
        Operation::positional(|v| async move {
            assert!(v.is_array(), "kaboom");
            Ok(v)
        }),
    );
    ctx.register(
        "ok",
        Operation::no_args(|| async { Ok(json!("fine")) }),
    );
    let queue = TaskQueue::start(Arc::new(ctx), 1).unwrap();

    let boom = queue.submit("boom", Value::Null);
    let explode = queue.submit("explode", Value::Null);
    let ok = queue.submit("ok", Value::Null);

    let ok_job = queue.wait(&ok, WAIT).await;
    assert_eq!(ok_job.status_str(), "done");

    let boom_job = queue.status(&boom);
    assert_eq!(boom_job.record().unwrap().error.as_deref(), Some("boom"));

    let explode_job = queue.status(&explode);
    let error = explode_job.record().unwrap().error.clone().unwrap();
    assert_eq!(explode_job.status_str(), "failed");
    assert!(error.contains("kaboom"), "unexpected error {error}");

    queue.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn panic_before_future_is_built_fails_job() {
    let ctx = EngineContext::new();
    ctx.register(
        "eager",
        Operation::keyword(|kwargs| {
            let n = kwargs["n"].as_i64().unwrap();
            async move { Ok(json!(n)) }
        }),
    );
    ctx.register(
        "ok",
        Operation::no_args(|| async { Ok(json!("fine")) }),
    );
    let queue = TaskQueue::start(Arc::new(ctx), 1).unwrap();

    let eager = queue.submit("eager", json!({}));
    let ok = queue.submit("ok", Value::Null);

    // the single worker survives and picks up the next job
    assert_eq!(queue.wait(&ok, WAIT).await.status_str(), "done");
    let eager_job = queue.wait(&eager, WAIT).await;
    assert_eq!(eager_job.status_str(), "failed");
    assert!(eager_job
        .record()
        .unwrap()
        .error
        .as_deref()
        .unwrap()
        .starts_with("operation panicked"));

    queue.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn status_is_prompt_while_another_job_blocks() {
    let gate = Arc::new(Notify::new());
    let ctx = EngineContext::new();
    {
        let gate = Arc::clone(&gate);
        ctx.register(
            "blocked",
            Operation::no_args(move || {
                let gate = Arc::clone(&gate);
                async move {
                    gate.notified().await;
                    Ok(Value::Null)
                }
            }),
        );
    }
    ctx.register(
        "ok",
        Operation::no_args(|| async { Ok(json!("fine")) }),
    );
    let queue = TaskQueue::start(Arc::new(ctx), 2).unwrap();

    let a = queue.submit("blocked", Value::Null);
    while queue.status(&a).status_str() != "running" {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let b = queue.submit("ok", Value::Null);
    let started = std::time::Instant::now();
    let status = queue.status(&b).status_str();
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(["queued", "running", "done"].contains(&status));

    // the second worker runs B while A is still blocked
    assert_eq!(queue.wait(&b, WAIT).await.status_str(), "done");
    assert_eq!(queue.status(&a).status_str(), "running");

    gate.notify_one();
    assert_eq!(queue.wait(&a, WAIT).await.status_str(), "done");
    queue.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn pool_bounds_concurrency() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let ctx = EngineContext::new();
    {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        ctx.register(
            "busy",
            Operation::no_args(move || {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(Value::Null)
                }
            }),
        );
    }
    let queue = TaskQueue::start(Arc::new(ctx), 2).unwrap();

    let ids: Vec<_> = (0..8).map(|_| queue.submit("busy", Value::Null)).collect();
    for id in &ids {
        assert_eq!(queue.wait(id, WAIT).await.status_str(), "done");
    }

    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(queue.stats().done, 8);
    queue.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn submit_returns_before_execution() {
    let gate = Arc::new(Notify::new());
    let ctx = EngineContext::new();
    {
        let gate = Arc::clone(&gate);
        ctx.register(
            "gated",
            Operation::no_args(move || {
                let gate = Arc::clone(&gate);
                async move {
                    gate.notified().await;
                    Ok(json!("released"))
                }
            }),
        );
    }
    let queue = TaskQueue::start(Arc::new(ctx), 1).unwrap();

    let id = queue.submit("gated", Value::Null);
    let status = queue.status(&id).status_str();
    assert!(status == "queued" || status == "running");

    gate.notify_one();
    let job = queue.wait(&id, WAIT).await;
    assert_eq!(job.record().unwrap().result, Some(json!("released")));
    queue.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn operations_registered_after_start_are_runnable() {
    let queue = builtin_queue(1);
    queue.context().register(
        "late",
        Operation::positional(|v| async move { Ok(json!({"got": v})) }),
    );
    assert!(queue.list_operations().contains(&"late".to_string()));

    let id = queue.submit("late", json!([1, 2]));
    let job = queue.wait(&id, WAIT).await;
    assert_eq!(job.record().unwrap().result, Some(json!({"got": [1, 2]})));
    queue.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn invalid_arguments_fail_only_that_job() {
    let queue = builtin_queue(1);

    let bad = queue.submit("sleep", json!({"seconds": "soon"}));
    let good = queue.submit("sleep", json!({"seconds": 0}));

    assert_eq!(queue.wait(&good, WAIT).await.status_str(), "done");
    let bad_job = queue.status(&bad);
    assert_eq!(bad_job.status_str(), "failed");
    assert!(bad_job
        .record()
        .unwrap()
        .error
        .as_deref()
        .unwrap()
        .starts_with("invalid arguments"));
    queue.shutdown(WAIT).await.unwrap();
}

#[tokio::test]
async fn shutdown_times_out_on_stuck_worker() {
    let ctx = EngineContext::new();
    ctx.register(
        "stuck",
        Operation::no_args(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Value::Null)
        }),
    );
    let queue = TaskQueue::start(Arc::new(ctx), 1).unwrap();
    let id = queue.submit("stuck", Value::Null);
    while queue.status(&id).status_str() != "running" {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let err = queue.shutdown(Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(
        err,
        wse_core::QueueError::ShutdownTimeout { pending: 1, .. }
    ));
}
