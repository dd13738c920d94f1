//! Module access denylist
//!
//! When untrusted script code runs in-process with interpreter-level
//! privileges, every module resolution passes through this predicate. A
//! fixed set of high-risk Node built-ins (process spawning, low-level
//! process control, dynamic code loading/inspection, worker spawning) is
//! blocked; every other name, including third-party packages and relative
//! paths, is allowed. Pure and total; re-evaluated on every resolution
//! attempt, never cached per session.

/// Prefix used by explicitly-namespaced built-in modules.
const BUILTIN_PREFIX: &str = "node:";

/// High-risk built-in modules untrusted code may never load.
const BLOCKED_MODULES: &[&str] = &[
    "child_process",
    "process",
    "cluster",
    "worker_threads",
    "vm",
    "v8",
    "inspector",
];

/// Canonicalize a requested module name: strip the built-in prefix and
/// truncate at the first path separator, so any subpath of a built-in
/// resolves to its root module name.
pub fn normalize(name: &str) -> &str {
    let name = name.strip_prefix(BUILTIN_PREFIX).unwrap_or(name);
    match name.find('/') {
        Some(index) => &name[..index],
        None => name,
    }
}

/// Whether the canonical name is in the blocked set.
pub fn is_blocked(name: &str) -> bool {
    BLOCKED_MODULES.contains(&normalize(name))
}
