use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use drainpool::{ErrorKind, Executor, RejectReason, SubmitResult, Task};
use drainpool_telemetry::tracing::init_test_tracing;
use tokio::runtime::Handle;

mod support;

use crate::support::{blocking_gate, bounded, sleeping_task, wait_for_stats, wait_until};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_never_exceed_capacity() {
    init_test_tracing();

    let executor = Executor::new(1, 4).unwrap();
    let (gate, release) = blocking_gate();
    executor.submit(gate).unwrap().into_result().unwrap();
    wait_for_stats(&executor, |stats| stats.in_flight == 1).await;

    let sampling = Arc::new(AtomicBool::new(true));
    let sampler = {
        let executor = executor.clone();
        let sampling = sampling.clone();
        tokio::spawn(async move {
            let mut max_depth = 0;
            while sampling.load(Ordering::SeqCst) {
                max_depth = max_depth.max(executor.stats().queue_depth);
                tokio::task::yield_now().await;
            }
            max_depth
        })
    };

    let producers: Vec<_> = (0..8)
        .map(|_| {
            let executor = executor.clone();
            tokio::spawn(async move {
                let mut accepted = 0;
                for _ in 0..50 {
                    if executor.submit(Task::new(async {})).unwrap().is_accepted() {
                        accepted += 1;
                    }
                }
                accepted
            })
        })
        .collect();

    let mut accepted = 0;
    for producer in producers {
        accepted += producer.await.unwrap();
    }
    sampling.store(false, Ordering::SeqCst);
    let max_depth = sampler.await.unwrap();

    // The only worker is held by the gate, so exactly the queue capacity got in.
    assert_eq!(accepted, 4);
    assert!(max_depth <= 4);

    let stats = executor.stats();
    assert_eq!(stats.queue_depth, 4);
    assert_eq!(stats.submitted, 401);
    assert_eq!(stats.rejected, 396);

    release.send(()).unwrap();
    executor.shutdown(Duration::from_secs(5)).await.unwrap();
    assert_eq!(executor.stats().completed, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_task_is_admitted_once_shutdown_is_observed() {
    init_test_tracing();

    let executor = Executor::new(2, 1024).unwrap();
    let accepted_after_shutdown = Arc::new(AtomicUsize::new(0));

    let submitters: Vec<_> = (0..1000)
        .map(|_| {
            let executor = executor.clone();
            let accepted_after_shutdown = accepted_after_shutdown.clone();
            tokio::spawn(async move {
                let observed_shutdown = executor.is_shutdown();
                let result = executor.submit(Task::new(async {})).unwrap();
                if observed_shutdown && result.is_accepted() {
                    accepted_after_shutdown.fetch_add(1, Ordering::SeqCst);
                }
                result
            })
        })
        .collect();

    let shutdown = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.shutdown(Duration::from_secs(5)).await })
    };

    let mut accepted = 0;
    for submitter in submitters {
        if submitter.await.unwrap().is_accepted() {
            accepted += 1;
        }
    }
    shutdown.await.unwrap().unwrap();

    assert_eq!(accepted_after_shutdown.load(Ordering::SeqCst), 0);

    let result = executor.submit(Task::new(async {})).unwrap();
    assert_eq!(result, SubmitResult::Rejected(RejectReason::ShuttingDown));

    // Graceful shutdown runs everything that got in.
    let stats = executor.stats();
    assert_eq!(stats.completed, accepted);
    assert_eq!(stats.submitted, 1001);
    assert!(stats.is_conserved());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backpressure_rejects_instead_of_growing() {
    init_test_tracing();

    let metrics = Handle::current().metrics();
    let executor = Executor::new(1, 5).unwrap();

    for i in 0..1000 {
        let _ = executor
            .submit(sleeping_task(Duration::from_millis(1)))
            .unwrap();

        if i % 50 == 0 {
            assert!(metrics.num_alive_tasks() <= executor.worker_count());
        }
    }

    let stats = executor.stats();
    assert!(stats.rejected > 0);
    assert!(stats.queue_depth <= 5);

    executor.shutdown(Duration::from_secs(5)).await.unwrap();

    let stats = executor.stats();
    assert_eq!(stats.submitted, 1000);
    assert_eq!(stats.submitted, stats.completed + stats.rejected);
    assert_eq!(stats.discarded, 0);
    wait_until(|| metrics.num_alive_tasks() == 0).await;
}

#[tokio::test]
async fn deadline_submission_waits_for_room() {
    let executor = Executor::new(1, 1).unwrap();
    let (gate, release) = blocking_gate();
    executor.submit(gate).unwrap().into_result().unwrap();
    wait_for_stats(&executor, |stats| stats.in_flight == 1).await;
    executor.submit(Task::new(async {})).unwrap().into_result().unwrap();

    let result = executor
        .submit_with_timeout(Task::new(async {}), Duration::from_millis(20))
        .await
        .unwrap();
    assert_eq!(result, SubmitResult::TimedOut);
    assert_eq!(result.into_result().unwrap_err().kind(), ErrorKind::TimedOut);

    let waiting = {
        let executor = executor.clone();
        tokio::spawn(async move {
            executor
                .submit_with_timeout(Task::new(async {}), Duration::from_secs(5))
                .await
        })
    };
    release.send(()).unwrap();
    assert!(bounded(waiting).await.unwrap().unwrap().is_accepted());

    executor.shutdown(Duration::from_secs(5)).await.unwrap();

    let stats = executor.stats();
    assert_eq!(stats.triple(), (4, 3, 1));
    assert_eq!(stats.timed_out, 1);
}

#[tokio::test]
async fn shutdown_rejects_blocked_deadline_submissions() {
    let executor = Executor::new(1, 1).unwrap();
    let (gate, release) = blocking_gate();
    executor.submit(gate).unwrap().into_result().unwrap();
    wait_for_stats(&executor, |stats| stats.in_flight == 1).await;
    executor.submit(Task::new(async {})).unwrap().into_result().unwrap();

    let waiting = {
        let executor = executor.clone();
        tokio::spawn(async move {
            executor
                .submit_with_timeout(Task::new(async {}), Duration::from_secs(30))
                .await
        })
    };
    wait_for_stats(&executor, |stats| stats.submitted == 3).await;

    let shutdown = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.shutdown(Duration::from_secs(5)).await })
    };

    let result = bounded(waiting).await.unwrap().unwrap();
    assert_eq!(result, SubmitResult::Rejected(RejectReason::ShuttingDown));

    release.send(()).unwrap();
    bounded(shutdown).await.unwrap().unwrap();

    let stats = executor.stats();
    assert_eq!(stats.triple(), (3, 2, 1));
    assert_eq!(stats.timed_out, 0);
}

#[tokio::test]
async fn empty_tasks_are_invalid_and_not_counted() {
    let executor = Executor::new(1, 1).unwrap();

    let err = executor.submit(Task::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTask);

    let err = executor
        .submit_with_timeout(Task::default().named("empty"), Duration::from_millis(10))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTask);

    assert_eq!(executor.stats().submitted, 0);

    // The executor keeps serving valid tasks.
    let (task, handle) = Task::with_result(async { 7 });
    executor.submit(task).unwrap().into_result().unwrap();
    assert_eq!(bounded(handle).await.unwrap(), 7);

    executor.shutdown(Duration::from_secs(5)).await.unwrap();
}
