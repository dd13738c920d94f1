//! Shared helpers: WAT guest modules compiled to temp files.

use codebench_sandbox::{UnitConfig, WASM_PAGE_SIZE};
use std::io::Write;
use std::path::PathBuf;

/// Echo guest: allocator pair plus a `run` entry that copies its input to
/// stdout through the `host_write` capability import.
pub const ECHO_GUEST: &str = r#"
    (module
      (import "env" "memory" (memory 1 16))
      (import "env" "host_write" (func $host_write (param i32 i32 i32)))
      (global $next (mut i32) (i32.const 4096))
      (func (export "allocate") (param $len i32) (result i32)
        (local $ptr i32)
        (local.set $ptr (global.get $next))
        (global.set $next (i32.add (global.get $next) (local.get $len)))
        (local.get $ptr))
      (func (export "deallocate") (param i32) (param i32))
      (func (export "run") (param $ptr i32) (param $len i32) (result i32)
        (call $host_write (i32.const 1) (local.get $ptr) (local.get $len))
        (i32.const 0))
      (func (export "reset")
        (global.set $next (i32.const 4096))))
"#;

/// Slow guest: burns tens of milliseconds of CPU before echoing, so a short
/// caller-side timeout reliably fires while the guest still completes later.
pub const SLOW_ECHO_GUEST: &str = r#"
    (module
      (import "env" "memory" (memory 1 16))
      (import "env" "host_write" (func $host_write (param i32 i32 i32)))
      (global $next (mut i32) (i32.const 4096))
      (func (export "allocate") (param $len i32) (result i32)
        (local $ptr i32)
        (local.set $ptr (global.get $next))
        (global.set $next (i32.add (global.get $next) (local.get $len)))
        (local.get $ptr))
      (func (export "deallocate") (param i32) (param i32))
      (func (export "run") (param $ptr i32) (param $len i32) (result i32)
        (local $i i32)
        (local.set $i (i32.const 80000000))
        (block $done
          (loop $spin
            (br_if $done (i32.eqz (local.get $i)))
            (local.set $i (i32.sub (local.get $i) (i32.const 1)))
            (br $spin)))
        (call $host_write (i32.const 1) (local.get $ptr) (local.get $len))
        (i32.const 0))
      (func (export "reset")
        (global.set $next (i32.const 4096))))
"#;

/// Compile a WAT guest and write it next to a fresh temp dir.
pub fn write_module(wat_src: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("module.wasm");
    let bytes = wat::parse_str(wat_src).expect("compile wat guest");
    let mut file = std::fs::File::create(&path).expect("create module file");
    file.write_all(&bytes).expect("write module file");
    (dir, path)
}

/// A 1 MiB config for the test guests (they import at most 16 pages).
pub fn test_config(language: &str, path: impl Into<PathBuf>) -> UnitConfig {
    UnitConfig::new(language, language.to_uppercase(), path)
        .with_memory_limit(16 * WASM_PAGE_SIZE)
}
