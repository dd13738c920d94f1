//! Execution unit lifecycle primitives
//!
//! The unit state machine and the output-capture capability object wired
//! into every instance at creation time.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Lifecycle states of an execution unit.
///
/// `Unloaded -> Loaded -> Instantiated -> {Executing <-> Instantiated} ->
/// Disposed`. `Disposed` is terminal; every operation other than
/// construction fails once it is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    Unloaded,
    Loaded,
    Instantiated,
    Executing,
    Disposed,
}

/// Output stream selector for capability hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Injected output-capture capability. Passed at instance creation rather
/// than mutated as shared module-level state.
pub trait OutputSink: Send + Sync {
    fn write(&self, stream: StreamKind, bytes: &[u8]);
}

/// Default sink: buffers both streams in memory, honoring per-request
/// capture flags.
#[derive(Debug, Default)]
pub struct BufferSink {
    stdout: Mutex<Vec<u8>>,
    stderr: Mutex<Vec<u8>>,
    capture_stdout: AtomicBool,
    capture_stderr: AtomicBool,
}

impl BufferSink {
    pub fn new() -> Self {
        Self {
            stdout: Mutex::new(Vec::new()),
            stderr: Mutex::new(Vec::new()),
            capture_stdout: AtomicBool::new(true),
            capture_stderr: AtomicBool::new(true),
        }
    }

    /// Set which streams are captured for the next execution.
    pub fn set_capture(&self, stdout: bool, stderr: bool) {
        self.capture_stdout.store(stdout, Ordering::Relaxed);
        self.capture_stderr.store(stderr, Ordering::Relaxed);
    }

    /// Clear both buffers. Called before every execution and on reset so no
    /// output leaks across calls.
    pub fn clear(&self) {
        self.stdout.lock().expect("sink lock poisoned").clear();
        self.stderr.lock().expect("sink lock poisoned").clear();
    }

    /// Snapshot both buffers as lossy UTF-8.
    pub fn contents(&self) -> (String, String) {
        let stdout = self.stdout.lock().expect("sink lock poisoned");
        let stderr = self.stderr.lock().expect("sink lock poisoned");
        (
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
        )
    }
}

impl OutputSink for BufferSink {
    fn write(&self, stream: StreamKind, bytes: &[u8]) {
        match stream {
            StreamKind::Stdout => {
                if self.capture_stdout.load(Ordering::Relaxed) {
                    self.stdout
                        .lock()
                        .expect("sink lock poisoned")
                        .extend_from_slice(bytes);
                }
            }
            StreamKind::Stderr => {
                if self.capture_stderr.load(Ordering::Relaxed) {
                    self.stderr
                        .lock()
                        .expect("sink lock poisoned")
                        .extend_from_slice(bytes);
                }
            }
        }
    }
}
