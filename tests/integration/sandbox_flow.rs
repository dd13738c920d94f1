//! End-to-end sandbox flows: register, execute, timeout, reclaim.

use crate::support::{test_config, write_module, ECHO_GUEST, SLOW_ECHO_GUEST};
use codebench_common::ExecutionRequest;
use codebench_sandbox::{Sandbox, SandboxError, UnitState, WorkerHandle};
use std::time::Duration;

#[tokio::test]
async fn test_register_and_execute() {
    let (_dir, path) = write_module(ECHO_GUEST);
    let sandbox = Sandbox::new();
    sandbox.register_language(test_config("rust", path)).await.unwrap();

    let result = sandbox
        .execute("rust", ExecutionRequest::new("println!(\"hi\")"))
        .await
        .unwrap();
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "println!(\"hi\")");
    assert!(result.success());
}

#[tokio::test]
async fn test_unknown_language_refused() {
    let sandbox = Sandbox::new();
    assert!(matches!(
        sandbox.execute("cobol", ExecutionRequest::new("x")).await,
        Err(SandboxError::UnknownLanguage(name)) if name == "cobol"
    ));
}

#[tokio::test]
async fn test_timeout_abandons_and_discards_late_result() {
    let (_dir, path) = write_module(SLOW_ECHO_GUEST);
    let sandbox = Sandbox::new();
    sandbox.register_language(test_config("slow", path)).await.unwrap();

    // The guest needs tens of milliseconds; a 1 ms limit always fires.
    let request = ExecutionRequest::new("first").with_timeout_ms(1);
    let started = std::time::Instant::now();
    let outcome = sandbox.execute("slow", request).await;
    assert!(matches!(outcome, Err(SandboxError::Timeout(1))));
    assert!(started.elapsed() < Duration::from_millis(500));

    // Let the abandoned execution finish inside the worker; its late
    // response must be discarded, not applied to the next call.
    tokio::time::sleep(Duration::from_secs(2)).await;

    let second = sandbox
        .execute("slow", ExecutionRequest::new("second"))
        .await
        .unwrap();
    assert_eq!(second.stdout, "second");
}

#[tokio::test]
async fn test_same_language_executions_queue_in_order() {
    let (_dir, path) = write_module(ECHO_GUEST);
    let sandbox = std::sync::Arc::new(Sandbox::new());
    sandbox.register_language(test_config("rust", path)).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let sandbox = std::sync::Arc::clone(&sandbox);
        handles.push(tokio::spawn(async move {
            sandbox
                .execute("rust", ExecutionRequest::new(format!("req-{}", i)))
                .await
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap().unwrap();
        // Each queued request sees only its own output, never residue from
        // the one before it.
        assert_eq!(result.stdout, format!("req-{}", i));
    }
}

#[tokio::test]
async fn test_cross_language_isolation() {
    let (_dir_a, path_a) = write_module(ECHO_GUEST);
    let (_dir_b, path_b) = write_module(ECHO_GUEST);
    let sandbox = Sandbox::new();
    sandbox.register_language(test_config("rust", path_a)).await.unwrap();
    sandbox.register_language(test_config("cpp", path_b)).await.unwrap();
    assert_eq!(sandbox.languages().await, vec!["cpp", "rust"]);

    let rust = sandbox.execute("rust", ExecutionRequest::new("a")).await.unwrap();
    let cpp = sandbox.execute("cpp", ExecutionRequest::new("b")).await.unwrap();
    assert_eq!(rust.stdout, "a");
    assert_eq!(cpp.stdout, "b");
}

#[tokio::test]
async fn test_reset_and_dispose_lifecycle() {
    let (_dir, path) = write_module(ECHO_GUEST);
    let sandbox = Sandbox::new();
    sandbox.register_language(test_config("rust", path)).await.unwrap();

    let status = sandbox.reset("rust").await.unwrap();
    assert_eq!(status.state, UnitState::Instantiated);
    assert!(status.ready);

    let status = sandbox.dispose("rust").await.unwrap();
    assert_eq!(status.state, UnitState::Disposed);
    assert!(!status.ready);

    // The registration is gone with the instance.
    assert!(matches!(
        sandbox.execute("rust", ExecutionRequest::new("x")).await,
        Err(SandboxError::UnknownLanguage(_))
    ));
}

#[tokio::test]
async fn test_worker_execute_requires_ready() {
    let worker = WorkerHandle::spawn().unwrap();
    assert!(matches!(
        worker
            .execute("rust", ExecutionRequest::new("x"), Duration::from_secs(1))
            .await,
        Err(SandboxError::NotReady(_))
    ));
}

#[tokio::test]
async fn test_worker_reset_and_dispose_idempotent() {
    let (_dir, path) = write_module(ECHO_GUEST);
    let worker = WorkerHandle::spawn().unwrap();
    worker.init(test_config("rust", path)).await.unwrap();

    // Reset on an uninitialized language is a no-op success.
    let status = worker.reset("never-initialized").await.unwrap();
    assert_eq!(status.state, UnitState::Unloaded);

    let first = worker.dispose("rust").await.unwrap();
    assert_eq!(first.state, UnitState::Disposed);
    let second = worker.dispose("rust").await.unwrap();
    assert_eq!(second.state, UnitState::Disposed);
}

#[tokio::test]
async fn test_worker_init_failure_reported() {
    let worker = WorkerHandle::spawn().unwrap();
    let config = test_config("ghost", "/nonexistent/ghost.wasm");
    assert!(matches!(
        worker.init(config).await,
        Err(SandboxError::Worker(message)) if message.contains("load")
    ));

    // The worker context survives a failed init and serves later requests.
    let (_dir, path) = write_module(ECHO_GUEST);
    worker.init(test_config("rust", path)).await.unwrap();
    let result = worker
        .execute("rust", ExecutionRequest::new("alive"), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(result.stdout, "alive");
}
