//! Dependency install flows: retry loop driven the way an orchestrator
//! would drive it, with failures injected by a fake installer.

use codebench_deps::{InstallFailure, PackageStore, MAX_INSTALL_ATTEMPTS};

/// Drive one install attempt against a fake installer outcome.
fn attempt(
    store: &mut PackageStore,
    name: &str,
    outcome: Result<&str, (&str, &str)>,
) -> Result<(), InstallFailure> {
    store.begin_install(name)?;
    match outcome {
        Ok(version) => store.set_installed(name, Some(version)),
        Err((code, message)) => store.set_package_error(name, Some(message), Some(code)),
    }
    Ok(())
}

#[test]
fn test_retry_loop_succeeds_on_second_attempt() {
    let mut store = PackageStore::new();
    store.add_package("serde");

    attempt(&mut store, "serde", Err(("E_NET", "registry unreachable"))).unwrap();
    assert!(store.can_retry_install("serde"));

    attempt(&mut store, "serde", Ok("1.0.210")).unwrap();
    let record = store.get("serde").unwrap();
    assert!(record.is_installed);
    assert_eq!(record.version.as_deref(), Some("1.0.210"));
    assert!(record.error.is_none());
    assert_eq!(record.install_attempts, 2);
    assert!(store.pending_packages().is_empty());
}

#[test]
fn test_exhausted_record_needs_explicit_reset() {
    let mut store = PackageStore::new();
    store.add_package("flaky");

    for _ in 0..MAX_INSTALL_ATTEMPTS {
        attempt(&mut store, "flaky", Err(("E_BUILD", "compile failed"))).unwrap();
    }
    assert!(matches!(
        store.begin_install("flaky"),
        Err(InstallFailure::AttemptsExhausted(_))
    ));
    // The frozen record still shows what went wrong.
    assert_eq!(
        store.get("flaky").unwrap().error.as_ref().unwrap().code,
        "E_BUILD"
    );

    store.reset_attempts("flaky");
    attempt(&mut store, "flaky", Ok("0.3.1")).unwrap();
    assert!(store.get("flaky").unwrap().is_installed);
}

#[test]
fn test_aggregate_flag_tracks_overlapping_installs() {
    let mut store = PackageStore::new();
    store.add_package("a");
    store.add_package("b");
    assert!(!store.any_installing());

    store.begin_install("a").unwrap();
    store.begin_install("b").unwrap();
    // The second begin on "a" is refused while its install is running.
    assert!(matches!(
        store.begin_install("a"),
        Err(InstallFailure::AlreadyInstalling(_))
    ));

    store.set_installed("a", Some("1.0.0"));
    assert!(store.any_installing());
    store.set_package_error("b", Some("timed out"), None);
    assert!(!store.any_installing());
}

#[test]
fn test_reregistering_failed_package_clears_stale_error() {
    let mut store = PackageStore::new();
    store.add_package("left-pad");
    attempt(&mut store, "left-pad", Err(("E_NET", "offline"))).unwrap();

    // The next editor session declares the same dependency again; the old
    // failure must not leak into the fresh registration.
    store.add_package("left-pad");
    let record = store.get("left-pad").unwrap();
    assert!(record.last_error.is_none());
    assert!(record.error.is_none());
    assert_eq!(store.pending_packages(), vec!["left-pad"]);
}
