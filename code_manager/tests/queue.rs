//tests/queue.rs
use code_manager::manager::manager::GradeManager;
use code_runner::GradeTaskExecutor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::{Duration, Instant, sleep};
use util::test_helpers::test_config;

const RUN_TIME: Duration = Duration::from_millis(500);

fn manager(max_concurrent: usize) -> (GradeManager, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let executor = GradeTaskExecutor::from_config(Arc::new(test_config(dir.path())));
    (GradeManager::new(Arc::new(executor), max_concurrent), dir)
}

/// Submits `total` mock runs and returns (elapsed, max observed concurrency, outputs).
async fn run_mocks(manager: &GradeManager, total: usize, label: &str) -> (Duration, usize, Vec<String>) {
    let running = Arc::new(AtomicUsize::new(0));
    let max_observed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..total)
        .map(|i| {
            let mgr = manager.clone();
            let running = Arc::clone(&running);
            let max_observed = Arc::clone(&max_observed);
            let label = format!("{label}_{i}");
            tokio::spawn(async move {
                mgr.submit(async move {
                    let current = running.fetch_add(1, Ordering::SeqCst) + 1;
                    max_observed.fetch_max(current, Ordering::SeqCst);
                    sleep(RUN_TIME).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    format!("ran {label}")
                })
                .await
            })
        })
        .collect();

    let outputs = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("task should not panic").expect("work should not panic"))
        .collect();
    (start.elapsed(), max_observed.load(Ordering::SeqCst), outputs)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queue_respects_max_concurrency() {
    let (manager, _dir) = manager(2);
    let (elapsed, max_observed, outputs) = run_mocks(&manager, 5, "file").await;

    for (i, output) in outputs.iter().enumerate() {
        assert_eq!(output, &format!("ran file_{i}"));
    }
    assert!(max_observed <= 2, "observed {max_observed} concurrent runs");
    // ceil(5 / 2) rounds of RUN_TIME
    assert!(elapsed >= RUN_TIME * 3 - Duration::from_millis(100), "{elapsed:?}");
    assert!(elapsed <= Duration::from_secs(5), "{elapsed:?}");
    assert_eq!(manager.stats().running, 0);
    assert_eq!(manager.stats().waiting, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queue_serialises_with_single_slot() {
    let (manager, _dir) = manager(1);
    let (elapsed, max_observed, _) = run_mocks(&manager, 3, "script").await;

    assert_eq!(max_observed, 1);
    assert!(elapsed >= RUN_TIME * 3 - Duration::from_millis(100), "{elapsed:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queue_with_no_waiting() {
    let (manager, _dir) = manager(5);
    let (elapsed, max_observed, outputs) = run_mocks(&manager, 3, "app").await;

    assert_eq!(outputs.len(), 3);
    assert_eq!(max_observed, 3);
    assert!(elapsed < RUN_TIME * 2, "{elapsed:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_managers_are_independent() {
    let (manager1, _dir1) = manager(2);
    let (manager2, _dir2) = manager(1);

    let ((_, max1, out1), (_, max2, out2)) = tokio::join!(
        run_mocks(&manager1, 3, "mgr1"),
        run_mocks(&manager2, 2, "mgr2")
    );
    assert!(max1 <= 2);
    assert_eq!(max2, 1);
    assert_eq!(out1.len(), 3);
    assert_eq!(out2.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slot_is_released_when_work_panics() {
    let (manager, _dir) = manager(1);
    let result = manager.submit(async { Option::<u8>::None.expect("boom") }).await;
    assert!(result.is_err());
    assert_eq!(manager.stats().running, 0);

    let value = manager.submit(async { 7 }).await.unwrap();
    assert_eq!(value, 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stats_report_waiting_work() {
    let (manager, _dir) = manager(1);
    let first = {
        let mgr = manager.clone();
        tokio::spawn(async move { mgr.submit(sleep(RUN_TIME)).await })
    };
    let second = {
        let mgr = manager.clone();
        tokio::spawn(async move { mgr.submit(sleep(RUN_TIME)).await })
    };
    sleep(Duration::from_millis(150)).await;

    let stats = manager.stats();
    assert_eq!(stats.running, 1);
    assert_eq!(stats.waiting, 1);
    assert_eq!(stats.max_concurrent, 1);

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();
    assert_eq!(manager.stats().running, 0);
}
