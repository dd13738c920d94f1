//! Sandbox orchestration facade
//!
//! Registers language modules and enforces the caller side of the resource
//! contract: each language gets its own isolated worker context (so a hung
//! execution in one language never stalls another), every execution is raced
//! against the effective timeout, and a timed-out instance is reclaimed with
//! a queued reset once the worker surfaces again.

use crate::config::UnitConfig;
use crate::error::SandboxError;
use crate::worker::{UnitStatus, WorkerHandle};
use codebench_common::{ExecutionRequest, ExecutionResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

struct LanguageRuntime {
    config: UnitConfig,
    worker: Arc<WorkerHandle>,
}

/// Entry point for executing code in registered language modules.
#[derive(Default)]
pub struct Sandbox {
    runtimes: RwLock<HashMap<String, LanguageRuntime>>,
}

impl Sandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a language module: spawns its worker context, loads and
    /// instantiates the unit, and waits for the `ready` handshake.
    pub async fn register_language(&self, config: UnitConfig) -> Result<(), SandboxError> {
        tracing::info!(
            language = %config.language_id,
            module = %config.module_path.display(),
            memory_pages = config.memory_pages(),
            "registering language module"
        );
        let worker = Arc::new(WorkerHandle::spawn()?);
        worker.init(config.clone()).await?;
        self.runtimes.write().await.insert(
            config.language_id.clone(),
            LanguageRuntime { config, worker },
        );
        Ok(())
    }

    /// Execute code in a registered language.
    ///
    /// The effective timeout is the request override when present, else the
    /// unit's configured default. On timeout the call fails with `Timeout`,
    /// the late result is discarded by the worker controller, and a reset is
    /// queued so the instance is clean for the next caller.
    pub async fn execute(
        &self,
        language: &str,
        request: ExecutionRequest,
    ) -> Result<ExecutionResult, SandboxError> {
        let (worker, default_timeout_ms) = self.runtime(language).await?;

        let timeout_ms = request.timeout_ms.unwrap_or(default_timeout_ms);
        tracing::info!(
            language,
            timeout_ms,
            code_len = request.code.len(),
            "executing code"
        );

        match worker
            .execute(language, request, Duration::from_millis(timeout_ms))
            .await
        {
            Err(SandboxError::Timeout(elapsed)) => {
                tracing::warn!(
                    language,
                    timeout_ms = elapsed,
                    "execution abandoned after timeout; queueing reset"
                );
                worker.send_reset(language);
                Err(SandboxError::Timeout(elapsed))
            }
            other => other,
        }
    }

    /// Reset a language's instance (fresh interpreter state, same memory).
    pub async fn reset(&self, language: &str) -> Result<UnitStatus, SandboxError> {
        let (worker, _) = self.runtime(language).await?;
        worker.reset(language).await
    }

    /// Dispose a language's instance and forget its registration.
    pub async fn dispose(&self, language: &str) -> Result<UnitStatus, SandboxError> {
        let (worker, _) = self.runtime(language).await?;
        let status = worker.dispose(language).await?;
        self.runtimes.write().await.remove(language);
        Ok(status)
    }

    /// Current unit state for a language.
    pub async fn status(&self, language: &str) -> Result<UnitStatus, SandboxError> {
        let (worker, _) = self.runtime(language).await?;
        worker.status(language).await
    }

    /// Language ids currently registered.
    pub async fn languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self.runtimes.read().await.keys().cloned().collect();
        languages.sort_unstable();
        languages
    }

    async fn runtime(&self, language: &str) -> Result<(Arc<WorkerHandle>, u64), SandboxError> {
        let runtimes = self.runtimes.read().await;
        let runtime = runtimes
            .get(language)
            .ok_or_else(|| SandboxError::UnknownLanguage(language.to_string()))?;
        Ok((Arc::clone(&runtime.worker), runtime.config.timeout_ms))
    }
}
