//! Batching queue flows: coalescing streamed execution output into
//! throttled snapshots persisted through a sink.

use async_trait::async_trait;
use codebench_common::{ExecutionResult, StateSink, UpdateQueue};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Persisted view of a run: accumulated stdout plus the final result.
#[derive(Debug, Clone, Default)]
struct RunSnapshot {
    stdout: String,
    result: Option<ExecutionResult>,
}

struct RecordingSink {
    persists: AtomicUsize,
    snapshots: Mutex<Vec<RunSnapshot>>,
}

impl RecordingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            persists: AtomicUsize::new(0),
            snapshots: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl StateSink<RunSnapshot> for RecordingSink {
    async fn persist(&self, state: &RunSnapshot) -> anyhow::Result<()> {
        self.persists.fetch_add(1, Ordering::SeqCst);
        self.snapshots.lock().unwrap().push(state.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_output_burst_persists_one_snapshot() {
    let sink = RecordingSink::new();
    let queue = UpdateQueue::new(sink.clone(), Duration::from_millis(50));

    // A guest streaming three stdout fragments in quick succession.
    for fragment in ["hello", " ", "world"] {
        let fragment = fragment.to_string();
        queue.set_with(move |prev| {
            let mut snapshot = prev.unwrap_or_default();
            snapshot.stdout.push_str(&fragment);
            snapshot
        });
    }

    tokio::time::sleep(Duration::from_millis(25)).await;
    assert_eq!(sink.persists.load(Ordering::SeqCst), 1);
    let snapshots = sink.snapshots.lock().unwrap();
    assert_eq!(snapshots[0].stdout, "hello world");
}

#[tokio::test]
async fn test_final_result_lands_in_a_later_pass() {
    let sink = RecordingSink::new();
    let queue = UpdateQueue::new(sink.clone(), Duration::from_millis(10));

    queue.set_with(|prev| {
        let mut snapshot = prev.unwrap_or_default();
        snapshot.stdout.push_str("partial");
        snapshot
    });
    tokio::time::sleep(Duration::from_millis(40)).await;

    // The execution completes after the first throttle window closed.
    queue.set_with(|prev| {
        let mut snapshot = prev.unwrap_or_default();
        snapshot.result = Some(ExecutionResult {
            stdout: snapshot.stdout.clone(),
            ..ExecutionResult::default()
        });
        snapshot
    });
    tokio::time::sleep(Duration::from_millis(40)).await;

    assert_eq!(sink.persists.load(Ordering::SeqCst), 2);
    let state = queue.state().await.unwrap();
    assert_eq!(state.result.unwrap().stdout, "partial");
}

#[tokio::test]
async fn test_replace_discards_accumulated_state() {
    let sink = RecordingSink::new();
    let queue = UpdateQueue::new(sink.clone(), Duration::from_millis(10));

    queue.set_with(|prev| {
        let mut snapshot = prev.unwrap_or_default();
        snapshot.stdout.push_str("stale");
        snapshot
    });
    // A fresh run replaces the snapshot wholesale within the same pass.
    queue.set_value(RunSnapshot::default());

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(sink.persists.load(Ordering::SeqCst), 1);
    assert_eq!(queue.state().await.unwrap().stdout, "");
}
