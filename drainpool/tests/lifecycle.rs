use std::sync::Arc;
use std::time::Duration;

use drainpool::config::{CancelMode, ExecutorConfig};
use drainpool::{ErrorKind, Executor, RejectReason, SubmitResult, Task, WorkerState};
use drainpool_telemetry::tracing::init_test_tracing;
use tokio::sync::Notify;

mod support;

use crate::support::{blocking_gate, bounded, sleeping_task, wait_for_stats};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn graceful_shutdown_drains_queued_work() {
    init_test_tracing();

    let executor = Executor::new(4, 10).unwrap();

    for _ in 0..100 {
        let result = executor
            .submit_with_timeout(
                sleeping_task(Duration::from_millis(10)),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert!(result.is_accepted());
    }

    executor.shutdown(Duration::from_secs(5)).await.unwrap();

    let stats = executor.stats();
    assert_eq!(stats.completed, 100);
    assert_eq!(stats.rejected, 0);
    assert_eq!(stats.live_workers, 0);
    assert!(stats.is_conserved());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_shutdowns_agree_on_final_state() {
    init_test_tracing();

    let executor = Executor::new(2, 16).unwrap();
    for _ in 0..16 {
        executor
            .submit(sleeping_task(Duration::from_millis(2)))
            .unwrap()
            .into_result()
            .unwrap();
    }

    let first = executor.clone();
    let second = executor.clone();
    let (first_result, second_result) = bounded(async {
        tokio::join!(
            async {
                first.shutdown(Duration::from_secs(5)).await?;
                Ok::<_, drainpool::DrainError>(first.stats())
            },
            async {
                second.shutdown(Duration::from_secs(5)).await?;
                Ok::<_, drainpool::DrainError>(second.stats())
            },
        )
    })
    .await;

    let first_stats = first_result.unwrap();
    let second_stats = second_result.unwrap();
    assert_eq!(first_stats, second_stats);
    assert_eq!(first_stats.completed, 16);
    assert_eq!(first_stats.live_workers, 0);

    // A later call returns immediately.
    executor.shutdown(Duration::from_millis(1)).await.unwrap();
    assert_eq!(executor.stats(), first_stats);
}

#[tokio::test]
async fn shutdown_timeout_leaves_workers_running() {
    init_test_tracing();

    let executor = Executor::new(1, 4).unwrap();
    let (gate, release) = blocking_gate();
    executor.submit(gate).unwrap().into_result().unwrap();
    executor
        .submit(Task::new(async {}))
        .unwrap()
        .into_result()
        .unwrap();

    let err = executor
        .shutdown(Duration::from_millis(20))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShutdownTimedOut);
    assert!(err.kind().is_recoverable());

    // Admission is closed but the worker keeps going.
    assert!(executor.is_shutdown());
    assert_eq!(
        executor.submit(Task::new(async {})).unwrap(),
        SubmitResult::Rejected(RejectReason::ShuttingDown)
    );
    assert_eq!(executor.live_workers(), 1);

    release.send(()).unwrap();
    executor.shutdown(Duration::from_secs(5)).await.unwrap();

    let stats = executor.stats();
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.live_workers, 0);
}

#[tokio::test]
async fn cancel_after_timeout_stops_cooperative_tasks() {
    init_test_tracing();

    let executor = Executor::new(1, 4).unwrap();
    let token_seen = Arc::new(Notify::new());
    let task = {
        let token_seen = token_seen.clone();
        Task::cancellable(move |token| async move {
            token.cancelled().await;
            token_seen.notify_one();
        })
    };
    executor.submit(task).unwrap().into_result().unwrap();
    let (queued, queued_handle) = Task::with_result(async { "never" });
    executor.submit(queued).unwrap().into_result().unwrap();

    let err = executor
        .shutdown(Duration::from_millis(20))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShutdownTimedOut);

    executor.cancel_tasks();
    assert!(executor.cancellation_token().is_cancelled());

    bounded(token_seen.notified()).await;
    executor.shutdown(Duration::from_secs(5)).await.unwrap();

    let err = bounded(queued_handle).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TaskAbandoned);

    let stats = executor.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.discarded, 1);
    assert!(stats.is_conserved());
}

#[tokio::test]
async fn hard_shutdown_discards_queued_tasks() {
    init_test_tracing();

    let config = ExecutorConfig {
        cancel_mode: CancelMode::Hard,
        ..ExecutorConfig::new(1, 8)
    };
    let executor = Executor::start(config).unwrap();

    executor
        .submit(Task::cancellable(|token| async move {
            token.cancelled().await;
        }))
        .unwrap()
        .into_result()
        .unwrap();
    wait_for_stats(&executor, |stats| stats.in_flight == 1).await;

    let mut handles = Vec::new();
    for i in 0..3 {
        let (task, handle) = Task::with_result(async move { i });
        executor.submit(task).unwrap().into_result().unwrap();
        handles.push(handle);
    }

    executor.shutdown(Duration::from_secs(5)).await.unwrap();

    for handle in handles {
        let err = handle.await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TaskAbandoned);
    }

    let stats = executor.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.discarded, 3);
    assert_eq!(stats.queue_depth, 0);
    assert!(stats.is_conserved());
    assert!(
        executor
            .worker_states()
            .iter()
            .all(|state| *state == WorkerState::Stopped)
    );
}

#[tokio::test]
async fn stopped_resolves_once_workers_exit() {
    let executor = Executor::new(2, 2).unwrap();

    let stopped = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.stopped().await })
    };

    tokio::task::yield_now().await;
    assert!(!stopped.is_finished());

    executor.shutdown(Duration::from_secs(5)).await.unwrap();
    bounded(stopped).await.unwrap();
}
