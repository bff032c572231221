use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ll_harness::{TaskOutcome, TaskSupervisor};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn fast_operation_result_is_captured() {
    let mut task = TaskSupervisor::new("fast", Duration::from_secs(1))
        .enter(|_| async { Ok::<_, Infallible>(String::from("ready")) });

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(task.is_finished());

    task.exit().await;
    assert_eq!(task.result().map(String::as_str), Some("ready"));
}

#[tokio::test(start_paused = true)]
async fn cooperative_loop_stops_on_cancel() {
    let mut task = TaskSupervisor::new("ticker", Duration::from_secs(1)).enter(|cancel| async move {
        let mut ticks = 0_u32;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok::<_, Infallible>(ticks),
                _ = tokio::time::sleep(Duration::from_millis(100)) => ticks += 1,
            }
        }
    });

    tokio::time::sleep(Duration::from_millis(550)).await;
    let started = Instant::now();
    let outcome = task.exit().await.clone();

    assert!(started.elapsed() < Duration::from_millis(10));
    assert_eq!(outcome, TaskOutcome::Completed(5));
}

#[tokio::test(start_paused = true)]
async fn operation_ignoring_cancellation_is_abandoned_within_timeout() {
    let timeout = Duration::from_secs(2);
    let mut task = TaskSupervisor::new("stubborn", timeout).enter(|_cancel| async {
        std::future::pending::<()>().await;
        Ok::<(), Infallible>(())
    });

    let started = Instant::now();
    let outcome = task.exit().await.clone();
    let elapsed = started.elapsed();

    assert_eq!(outcome, TaskOutcome::Abandoned);
    assert!(elapsed >= timeout);
    assert!(elapsed <= timeout + Duration::from_millis(50), "took {elapsed:?}");
    assert!(task.result().is_none());
}

#[tokio::test(start_paused = true)]
async fn panic_is_recorded_as_failure() {
    let mut task = TaskSupervisor::new("panicky", Duration::from_secs(1)).enter(|_| async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if true {
            panic!("lost the plot");
        }
        Ok::<(), Infallible>(())
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    match task.exit().await {
        TaskOutcome::Failed(message) => assert!(message.contains("lost the plot")),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn scoped_runs_cleanup_after_body() {
    let stopped = Arc::new(AtomicBool::new(false));
    let flag = stopped.clone();
    let task = TaskSupervisor::new("scoped", Duration::from_secs(1)).enter(move |cancel| async move {
        cancel.cancelled().await;
        flag.store(true, Ordering::SeqCst);
        Ok::<_, Infallible>(())
    });

    let (body, outcome) = task
        .scoped(async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            "body done"
        })
        .await;

    assert_eq!(body, "body done");
    assert_eq!(outcome, TaskOutcome::Completed(()));
    assert!(stopped.load(Ordering::SeqCst));
}

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_stops_the_operation() {
    let released = Arc::new(AtomicBool::new(false));
    let guard = SetOnDrop(released.clone());
    let task = TaskSupervisor::new("dropped", Duration::from_secs(1)).enter(move |_cancel| async move {
        let _guard = guard;
        std::future::pending::<()>().await;
        Ok::<_, Infallible>(())
    });

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(!released.load(Ordering::SeqCst));

    drop(task);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(released.load(Ordering::SeqCst));
}
