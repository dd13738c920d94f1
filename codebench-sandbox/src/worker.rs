//! Execution worker protocol
//!
//! Drives execution units inside an isolated context (a dedicated OS thread
//! with its own units and memory), communicating only through message
//! passing. The wire shape is the compatibility surface: kinds
//! `init|execute|reset|dispose|status` in, `result|error|status|ready` out,
//! each tagged with a language id and an optional correlation id.

use crate::config::UnitConfig;
use crate::error::{SandboxError, UnitError};
use crate::unit::UnitState;
use crate::wasm::WasmUnit;
use codebench_common::{ExecutionRequest, ExecutionResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use uuid::Uuid;

/// Timeout for control messages (init, reset, dispose, status).
const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);

/// Message sent to the worker context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WorkerMessage {
    Init {
        language: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation_id: Option<Uuid>,
        config: UnitConfig,
    },
    Execute {
        language: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation_id: Option<Uuid>,
        request: ExecutionRequest,
    },
    Reset {
        language: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation_id: Option<Uuid>,
    },
    Dispose {
        language: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation_id: Option<Uuid>,
    },
    Status {
        language: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation_id: Option<Uuid>,
    },
}

impl WorkerMessage {
    fn language(&self) -> &str {
        match self {
            Self::Init { language, .. }
            | Self::Execute { language, .. }
            | Self::Reset { language, .. }
            | Self::Dispose { language, .. }
            | Self::Status { language, .. } => language,
        }
    }

    fn correlation_id(&self) -> Option<Uuid> {
        match self {
            Self::Init { correlation_id, .. }
            | Self::Execute { correlation_id, .. }
            | Self::Reset { correlation_id, .. }
            | Self::Dispose { correlation_id, .. }
            | Self::Status { correlation_id, .. } => *correlation_id,
        }
    }
}

/// Response mirrored back from the worker context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WorkerResponse {
    Ready {
        language: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation_id: Option<Uuid>,
    },
    Result {
        language: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation_id: Option<Uuid>,
        result: ExecutionResult,
    },
    Error {
        language: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation_id: Option<Uuid>,
        message: String,
    },
    Status {
        language: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation_id: Option<Uuid>,
        status: UnitStatus,
    },
}

impl WorkerResponse {
    fn correlation_id(&self) -> Option<Uuid> {
        match self {
            Self::Ready { correlation_id, .. }
            | Self::Result { correlation_id, .. }
            | Self::Error { correlation_id, .. }
            | Self::Status { correlation_id, .. } => *correlation_id,
        }
    }
}

/// Unit state reported by `status` responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitStatus {
    pub state: UnitState,
    pub ready: bool,
}

type PendingMap = Arc<StdMutex<HashMap<Uuid, oneshot::Sender<WorkerResponse>>>>;

/// Controller handle for one worker context.
///
/// Routes responses by correlation id, serializes same-language executions
/// (a second `execute` for a busy language queues, it is never dropped), and
/// discards responses that arrive after the caller's timeout.
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<WorkerMessage>,
    pending: PendingMap,
    ready: Arc<StdMutex<HashSet<String>>>,
    execute_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl WorkerHandle {
    /// Spawn the worker thread and its response dispatcher.
    pub fn spawn() -> Result<Self, SandboxError> {
        let (tx_in, rx_in) = mpsc::unbounded_channel::<WorkerMessage>();
        let (tx_out, mut rx_out) = mpsc::unbounded_channel::<WorkerResponse>();

        std::thread::Builder::new()
            .name("codebench-worker".to_string())
            .spawn(move || worker_loop(rx_in, tx_out))
            .map_err(|err| SandboxError::Worker(format!("failed to spawn worker: {}", err)))?;

        let pending: PendingMap = Arc::new(StdMutex::new(HashMap::new()));
        let pending_for_dispatch = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(response) = rx_out.recv().await {
                dispatch_response(&pending_for_dispatch, response);
            }
        });

        Ok(Self {
            tx: tx_in,
            pending,
            ready: Arc::new(StdMutex::new(HashSet::new())),
            execute_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Initialize a language unit. The worker accepts `execute` for this
    /// language only after it has responded `ready`.
    pub async fn init(&self, config: UnitConfig) -> Result<(), SandboxError> {
        let language = config.language_id.clone();
        let response = self
            .request(
                |correlation_id| WorkerMessage::Init {
                    language: language.clone(),
                    correlation_id: Some(correlation_id),
                    config,
                },
                CONTROL_TIMEOUT,
            )
            .await?;
        match response {
            WorkerResponse::Ready { .. } => {
                self.ready
                    .lock()
                    .expect("ready set poisoned")
                    .insert(language);
                Ok(())
            }
            WorkerResponse::Error { message, .. } => Err(SandboxError::Worker(message)),
            other => Err(SandboxError::Worker(format!(
                "unexpected init response: {:?}",
                other
            ))),
        }
    }

    /// Execute code for a language, racing the worker's answer against the
    /// given timeout. On timeout the request is abandoned: the pending entry
    /// is dropped so a late response is discarded, never applied to a later
    /// request.
    pub async fn execute(
        &self,
        language: &str,
        request: ExecutionRequest,
        timeout: Duration,
    ) -> Result<ExecutionResult, SandboxError> {
        if !self
            .ready
            .lock()
            .expect("ready set poisoned")
            .contains(language)
        {
            return Err(SandboxError::NotReady(language.to_string()));
        }

        // At most one in-flight execute per language; later callers queue
        // here in arrival order.
        let lock = {
            let mut locks = self.execute_locks.lock().await;
            Arc::clone(
                locks
                    .entry(language.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let _guard = lock.lock().await;

        let language_owned = language.to_string();
        let response = self
            .request(
                |correlation_id| WorkerMessage::Execute {
                    language: language_owned.clone(),
                    correlation_id: Some(correlation_id),
                    request,
                },
                timeout,
            )
            .await?;
        match response {
            WorkerResponse::Result { result, .. } => Ok(result),
            WorkerResponse::Error { message, .. } => Err(SandboxError::Worker(message)),
            other => Err(SandboxError::Worker(format!(
                "unexpected execute response: {:?}",
                other
            ))),
        }
    }

    /// Reset a language unit. Idempotent: resetting a missing or disposed
    /// unit is a no-op success.
    pub async fn reset(&self, language: &str) -> Result<UnitStatus, SandboxError> {
        self.control(|correlation_id| WorkerMessage::Reset {
            language: language.to_string(),
            correlation_id: Some(correlation_id),
        })
        .await
    }

    /// Dispose a language unit. Idempotent like `reset`.
    pub async fn dispose(&self, language: &str) -> Result<UnitStatus, SandboxError> {
        let status = self
            .control(|correlation_id| WorkerMessage::Dispose {
                language: language.to_string(),
                correlation_id: Some(correlation_id),
            })
            .await?;
        self.ready
            .lock()
            .expect("ready set poisoned")
            .remove(language);
        Ok(status)
    }

    /// Query unit state.
    pub async fn status(&self, language: &str) -> Result<UnitStatus, SandboxError> {
        self.control(|correlation_id| WorkerMessage::Status {
            language: language.to_string(),
            correlation_id: Some(correlation_id),
        })
        .await
    }

    /// Queue a reset without waiting for the answer. Used to reclaim an
    /// instance abandoned by a caller-side timeout; the eventual status
    /// response carries no correlation id and is dropped by the dispatcher.
    pub fn send_reset(&self, language: &str) {
        let _ = self.tx.send(WorkerMessage::Reset {
            language: language.to_string(),
            correlation_id: None,
        });
    }

    async fn control(
        &self,
        make: impl FnOnce(Uuid) -> WorkerMessage,
    ) -> Result<UnitStatus, SandboxError> {
        let response = self.request(make, CONTROL_TIMEOUT).await?;
        match response {
            WorkerResponse::Status { status, .. } => Ok(status),
            WorkerResponse::Error { message, .. } => Err(SandboxError::Worker(message)),
            other => Err(SandboxError::Worker(format!(
                "unexpected control response: {:?}",
                other
            ))),
        }
    }

    async fn request(
        &self,
        make: impl FnOnce(Uuid) -> WorkerMessage,
        timeout: Duration,
    ) -> Result<WorkerResponse, SandboxError> {
        let correlation_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending map poisoned")
            .insert(correlation_id, tx);

        if self.tx.send(make(correlation_id)).is_err() {
            self.pending
                .lock()
                .expect("pending map poisoned")
                .remove(&correlation_id);
            return Err(SandboxError::ChannelClosed);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => {
                self.pending
                    .lock()
                    .expect("pending map poisoned")
                    .remove(&correlation_id);
                Err(SandboxError::ChannelClosed)
            }
            Err(_) => {
                self.pending
                    .lock()
                    .expect("pending map poisoned")
                    .remove(&correlation_id);
                Err(SandboxError::Timeout(timeout.as_millis() as u64))
            }
        }
    }
}

fn dispatch_response(pending: &PendingMap, response: WorkerResponse) {
    let Some(correlation_id) = response.correlation_id() else {
        tracing::debug!("dropping worker response without correlation id");
        return;
    };
    let sender = pending
        .lock()
        .expect("pending map poisoned")
        .remove(&correlation_id);
    match sender {
        Some(sender) => {
            let _ = sender.send(response);
        }
        None => {
            tracing::debug!(
                correlation_id = %correlation_id,
                "discarding late worker response"
            );
        }
    }
}

/// Worker context body. Owns the units; one message at a time; any failure,
/// including a panic, becomes an `error` response and the loop keeps
/// serving.
fn worker_loop(
    mut rx: mpsc::UnboundedReceiver<WorkerMessage>,
    tx: mpsc::UnboundedSender<WorkerResponse>,
) {
    let mut units: HashMap<String, WasmUnit> = HashMap::new();

    while let Some(message) = rx.blocking_recv() {
        let language = message.language().to_string();
        let correlation_id = message.correlation_id();

        let response = std::panic::catch_unwind(AssertUnwindSafe(|| {
            handle_message(&mut units, message)
        }))
        .unwrap_or_else(|_| {
            tracing::error!(language = %language, "worker message handler panicked");
            WorkerResponse::Error {
                language: language.clone(),
                correlation_id,
                message: "internal worker failure".to_string(),
            }
        });

        if tx.send(response).is_err() {
            break;
        }
    }
}

fn handle_message(units: &mut HashMap<String, WasmUnit>, message: WorkerMessage) -> WorkerResponse {
    match message {
        WorkerMessage::Init {
            language,
            correlation_id,
            config,
        } => match init_unit(config) {
            Ok(unit) => {
                units.insert(language.clone(), unit);
                WorkerResponse::Ready {
                    language,
                    correlation_id,
                }
            }
            Err(err) => WorkerResponse::Error {
                language,
                correlation_id,
                message: err.to_string(),
            },
        },

        WorkerMessage::Execute {
            language,
            correlation_id,
            request,
        } => match units.get_mut(&language) {
            Some(unit) => match unit.execute(&request) {
                Ok(result) => WorkerResponse::Result {
                    language,
                    correlation_id,
                    result,
                },
                Err(err) => WorkerResponse::Error {
                    language,
                    correlation_id,
                    message: err.to_string(),
                },
            },
            None => WorkerResponse::Error {
                message: format!("language '{}' is not initialized", language),
                language,
                correlation_id,
            },
        },

        WorkerMessage::Reset {
            language,
            correlation_id,
        } => {
            let status = match units.get_mut(&language) {
                Some(unit) => {
                    match unit.reset() {
                        Ok(()) => {}
                        // Idempotent: resetting a disposed unit is a no-op.
                        Err(UnitError::Disposed) => {}
                        Err(err) => {
                            return WorkerResponse::Error {
                                language,
                                correlation_id,
                                message: err.to_string(),
                            }
                        }
                    }
                    unit_status(unit)
                }
                None => UnitStatus {
                    state: UnitState::Unloaded,
                    ready: false,
                },
            };
            WorkerResponse::Status {
                language,
                correlation_id,
                status,
            }
        }

        WorkerMessage::Dispose {
            language,
            correlation_id,
        } => {
            let status = match units.get_mut(&language) {
                Some(unit) => {
                    match unit.dispose() {
                        Ok(()) => {}
                        // Idempotent: disposing twice is a no-op success.
                        Err(UnitError::Disposed) => {}
                        Err(err) => {
                            return WorkerResponse::Error {
                                language,
                                correlation_id,
                                message: err.to_string(),
                            }
                        }
                    }
                    unit_status(unit)
                }
                None => UnitStatus {
                    state: UnitState::Disposed,
                    ready: false,
                },
            };
            WorkerResponse::Status {
                language,
                correlation_id,
                status,
            }
        }

        WorkerMessage::Status {
            language,
            correlation_id,
        } => {
            let status = match units.get(&language) {
                Some(unit) => unit_status(unit),
                None => UnitStatus {
                    state: UnitState::Unloaded,
                    ready: false,
                },
            };
            WorkerResponse::Status {
                language,
                correlation_id,
                status,
            }
        }
    }
}

fn init_unit(config: UnitConfig) -> Result<WasmUnit, UnitError> {
    let mut unit = WasmUnit::new(config)?;
    unit.load()?;
    unit.create_instance()?;
    Ok(unit)
}

fn unit_status(unit: &WasmUnit) -> UnitStatus {
    UnitStatus {
        state: unit.state(),
        ready: unit.state() == UnitState::Instantiated,
    }
}
