//! Watch-mode pipeline behavior.

mod support;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pretty_assertions::assert_eq;
use support::{Accept, checkout, config};
use tokio::sync::{Semaphore, mpsc};
use vaultsync_core::pipeline::{CycleOutcome, Pipeline, PipelineState};
use vaultsync_core::sender::{Deliver, PushResult, Target};

/// Holds every delivery until the test releases a permit.
#[derive(Clone)]
struct Gated {
    gate: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl Gated {
    fn closed() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            in_flight: Arc::default(),
            max_in_flight: Arc::default(),
            calls: Arc::default(),
        }
    }
}

impl Deliver for Gated {
    fn deliver(&self, _archive: &Path, target: &Target) -> impl Future<Output = PushResult> + Send {
        let this = self.clone();
        let target = target.to_string();
        async move {
            let now = this.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            this.max_in_flight.fetch_max(now, Ordering::SeqCst);
            this.calls.fetch_add(1, Ordering::SeqCst);

            this.gate.acquire().await.unwrap().forget();

            this.in_flight.fetch_sub(1, Ordering::SeqCst);
            PushResult {
                target,
                elapsed: Duration::ZERO,
                log: None,
                outcome: Ok(()),
            }
        }
    }
}

/// Panics on every delivery.
struct Crash;

fn crash(target: String) -> PushResult {
    panic!("delivery to {target} crashed")
}

impl Deliver for Crash {
    fn deliver(&self, _archive: &Path, target: &Target) -> impl Future<Output = PushResult> + Send {
        let target = target.to_string();
        async move { crash(target) }
    }
}

fn touch(root: &Path, name: &str) -> PathBuf {
    let file = root.join("jcr_root/apps/myapp").join(name);
    std::fs::write(&file, name).unwrap();
    file
}

#[tokio::test]
async fn only_one_archive_is_in_flight() {
    let temp = checkout();
    let a = touch(temp.path(), "a.txt");
    let b = touch(temp.path(), "b.txt");
    let c = touch(temp.path(), "c.txt");

    let deliver = Gated::closed();
    let pipeline = Pipeline::new(&config(temp.path()), deliver.clone()).unwrap();
    let mut state = pipeline.subscribe();

    let (batch_tx, batch_rx) = mpsc::channel(8);
    let (report_tx, mut report_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(pipeline.run(batch_rx, report_tx));

    batch_tx.send(vec![a.clone()]).await.unwrap();
    state.wait_for(|s| *s == PipelineState::Sending).await.unwrap();

    batch_tx.send(vec![b.clone()]).await.unwrap();
    batch_tx.send(vec![c.clone(), b.clone()]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(*state.borrow(), PipelineState::Sending);
    assert_eq!(deliver.calls.load(Ordering::SeqCst), 1);

    deliver.gate.add_permits(1);
    let first = report_rx.recv().await.unwrap();
    assert_eq!(first.paths, vec![a]);

    deliver.gate.add_permits(1);
    let second = report_rx.recv().await.unwrap();
    assert_eq!(second.paths, vec![b, c]);

    assert_eq!(deliver.calls.load(Ordering::SeqCst), 2);
    assert_eq!(deliver.max_in_flight.load(Ordering::SeqCst), 1);

    drop(batch_tx);
    handle.await.unwrap();
    assert!(report_rx.recv().await.is_none());
}

#[tokio::test]
async fn filtered_batches_start_no_cycle() {
    let temp = checkout();
    let deliver = Accept::default();
    let pipeline = Pipeline::new(&config(temp.path()), deliver.clone()).unwrap();

    let (batch_tx, batch_rx) = mpsc::channel(8);
    let (report_tx, mut report_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(pipeline.run(batch_rx, report_tx));

    batch_tx
        .send(vec![temp.path().join("jcr_root"), temp.path().join(".git/index")])
        .await
        .unwrap();
    drop(batch_tx);
    handle.await.unwrap();

    assert!(report_rx.recv().await.is_none());
    assert!(deliver.targets.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_assembly_is_retried_after_quiet_period() {
    let temp = checkout();
    let file = touch(temp.path(), "a.txt");
    let mut cfg = config(temp.path());
    cfg.retry.attempts = 1;
    let blocker = cfg.archive_path();
    std::fs::create_dir_all(&blocker).unwrap();

    let deliver = Accept::default();
    let pipeline = Pipeline::new(&cfg, deliver.clone()).unwrap();

    let (batch_tx, batch_rx) = mpsc::channel(8);
    let (report_tx, mut report_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(pipeline.run(batch_rx, report_tx));

    batch_tx.send(vec![file.clone()]).await.unwrap();

    let failed = report_rx.recv().await.unwrap();
    assert!(matches!(failed.outcome, CycleOutcome::Failed(_)));
    std::fs::remove_dir(&blocker).unwrap();

    let retried = report_rx.recv().await.unwrap();
    assert_eq!(retried.paths, vec![file]);
    assert!(retried.is_success());
    assert_eq!(deliver.targets.lock().unwrap().len(), 1);

    drop(batch_tx);
    handle.await.unwrap();
}

#[tokio::test]
async fn crashed_cycle_releases_the_pipeline() {
    let temp = checkout();
    let file = touch(temp.path(), "a.txt");

    let pipeline = Pipeline::new(&config(temp.path()), Crash).unwrap();
    let state = pipeline.subscribe();

    let (batch_tx, batch_rx) = mpsc::channel(8);
    let (report_tx, mut report_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(pipeline.run(batch_rx, report_tx));

    batch_tx.send(vec![file.clone()]).await.unwrap();

    let report = report_rx.recv().await.unwrap();
    assert!(matches!(report.outcome, CycleOutcome::Aborted(_)));
    assert!(!report.is_success());
    assert_eq!(report.paths, vec![file]);
    assert_eq!(*state.borrow(), PipelineState::Idle);

    drop(batch_tx);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("pipeline should stop once batches close")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn batches_wait_for_retry_after_failed_assembly() {
    let temp = checkout();
    let a = touch(temp.path(), "a.txt");
    let b = touch(temp.path(), "b.txt");
    let mut cfg = config(temp.path());
    cfg.retry.attempts = 1;
    let quiet = cfg.delay();
    let blocker = cfg.archive_path();
    std::fs::create_dir_all(&blocker).unwrap();

    let deliver = Accept::default();
    let pipeline = Pipeline::new(&cfg, deliver.clone()).unwrap();

    let (batch_tx, batch_rx) = mpsc::channel(8);
    let (report_tx, mut report_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(pipeline.run(batch_rx, report_tx));

    batch_tx.send(vec![a.clone()]).await.unwrap();
    let failed = report_rx.recv().await.unwrap();
    assert!(matches!(failed.outcome, CycleOutcome::Failed(_)));

    batch_tx.send(vec![b.clone()]).await.unwrap();
    tokio::time::sleep(quiet / 2).await;
    assert!(report_rx.try_recv().is_err(), "no cycle before the quiet period");

    std::fs::remove_dir(&blocker).unwrap();
    let retried = report_rx.recv().await.unwrap();
    assert_eq!(retried.paths, vec![a, b]);
    assert!(retried.is_success());
    assert_eq!(deliver.targets.lock().unwrap().len(), 1);

    drop(batch_tx);
    handle.await.unwrap();
}
