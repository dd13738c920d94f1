//! Batching queue for bursty state updates
//!
//! Coalesces rapid, possibly overlapping update requests (streaming output
//! fragments, persisted UI state) into a single committed snapshot per
//! throttle window while preserving submission order.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One queued update: either a replacement value or a pure function from the
/// previous state to the next state.
pub enum Update<S> {
    Replace(S),
    Apply(Box<dyn FnOnce(Option<S>) -> S + Send>),
}

impl<S> Update<S> {
    pub fn replace(state: S) -> Self {
        Update::Replace(state)
    }

    pub fn apply(f: impl FnOnce(Option<S>) -> S + Send + 'static) -> Self {
        Update::Apply(Box::new(f))
    }
}

/// Destination for committed snapshots, injected at queue construction.
#[async_trait]
pub trait StateSink<S>: Send + Sync {
    async fn persist(&self, state: &S) -> anyhow::Result<()>;
}

struct Core<S> {
    pending: VecDeque<Update<S>>,
    /// True while a drain pass is running or scheduled. Guards against a
    /// second concurrent pass.
    pass_active: bool,
}

struct Inner<S> {
    core: Mutex<Core<S>>,
    state: tokio::sync::Mutex<Option<S>>,
    sink: Arc<dyn StateSink<S>>,
    throttle: Duration,
}

/// Order-preserving, throttled update queue.
///
/// A single in-flight pass drains all queued updates in submission order,
/// folds them into one snapshot, persists exactly once, then waits the
/// throttle delay before the next pass may start. Updates enqueued while the
/// drain loop is still emptying the queue are folded into the same pass.
pub struct UpdateQueue<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for UpdateQueue<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Send + 'static> UpdateQueue<S> {
    pub fn new(sink: Arc<dyn StateSink<S>>, throttle: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                core: Mutex::new(Core {
                    pending: VecDeque::new(),
                    pass_active: false,
                }),
                state: tokio::sync::Mutex::new(None),
                sink,
                throttle,
            }),
        }
    }

    /// Enqueue an update. Starts a drain pass unless one is already in
    /// flight, in which case the running (or next scheduled) pass picks the
    /// update up.
    pub fn set(&self, update: Update<S>) {
        let start_pass = {
            let mut core = self.inner.core.lock().expect("queue lock poisoned");
            core.pending.push_back(update);
            if core.pass_active {
                false
            } else {
                core.pass_active = true;
                true
            }
        };

        if start_pass {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                Self::run_passes(inner).await;
            });
        }
    }

    /// Convenience: enqueue a replacement value.
    pub fn set_value(&self, state: S) {
        self.set(Update::Replace(state));
    }

    /// Convenience: enqueue an updater function. The first ever update is
    /// invoked with `None` rather than being skipped.
    pub fn set_with(&self, f: impl FnOnce(Option<S>) -> S + Send + 'static) {
        self.set(Update::apply(f));
    }

    async fn run_passes(inner: Arc<Inner<S>>) {
        loop {
            let mut state_guard = inner.state.lock().await;
            let mut current = state_guard.take();

            // Drain to empty before persisting: items added while this loop
            // runs are included in the same pass.
            loop {
                let next = {
                    let mut core = inner.core.lock().expect("queue lock poisoned");
                    core.pending.pop_front()
                };
                match next {
                    Some(Update::Replace(state)) => current = Some(state),
                    Some(Update::Apply(f)) => current = Some(f(current)),
                    None => break,
                }
            }

            if let Some(state) = &current {
                if let Err(err) = inner.sink.persist(state).await {
                    tracing::warn!(error = %err, "failed to persist batched state");
                }
            }
            *state_guard = current;
            drop(state_guard);

            tokio::time::sleep(inner.throttle).await;

            let mut core = inner.core.lock().expect("queue lock poisoned");
            if core.pending.is_empty() {
                core.pass_active = false;
                return;
            }
            // More updates arrived during the throttle window; run a
            // follow-up pass.
        }
    }
}

impl<S: Clone + Send + 'static> UpdateQueue<S> {
    /// Current folded state (None before the first committed pass).
    pub async fn state(&self) -> Option<S> {
        self.inner.state.lock().await.clone()
    }
}
