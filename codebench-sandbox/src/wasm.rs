//! WASM execution unit backed by wasmtime
//!
//! Loads a compiled language module, instantiates it against a page-limited
//! linear memory with the host capability imports (output capture, abort),
//! and drives executions through a fixed, ordered probe of entry-point and
//! allocator conventions so modules built by differing toolchains all work.

use crate::config::{UnitConfig, WASM_PAGE_SIZE};
use crate::error::UnitError;
use crate::unit::{BufferSink, OutputSink, StreamKind, UnitState};
use codebench_common::{ExecutionRequest, ExecutionResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use wasmtime::{
    Caller, Config, Engine, ExternType, Instance, Linker, Memory, MemoryType, Module, Store,
    StoreLimits, StoreLimitsBuilder, TypedFunc,
};

/// Accepted entry-point export names, probed in order, first match wins.
pub const ENTRY_POINTS: &[&str] = &["run_code", "run", "main", "execute", "_start"];

/// Accepted allocate/deallocate export pairs, probed in order. Covers
/// wasm-bindgen and emscripten toolchain conventions.
pub const ALLOCATOR_PAIRS: &[(&str, &str)] = &[
    ("allocate", "deallocate"),
    ("alloc", "dealloc"),
    ("malloc", "free"),
];

/// Stream codes used by the `host_write` import.
const STREAM_STDOUT: i32 = 1;
const STREAM_STDERR: i32 = 2;

struct StoreState {
    limits: StoreLimits,
    buffer: Arc<BufferSink>,
    forward: Option<Arc<dyn OutputSink>>,
    memory: Option<Memory>,
}

struct LiveInstance {
    store: Store<StoreState>,
    instance: Instance,
    memory: Memory,
    /// Page-aligned ceiling this instance was created with.
    limit_bytes: u64,
}

/// A loadable, instantiable, disposable execution engine for one language.
pub struct WasmUnit {
    config: UnitConfig,
    engine: Engine,
    state: UnitState,
    module: Option<Module>,
    live: Option<LiveInstance>,
    buffer: Arc<BufferSink>,
    forward: Option<Arc<dyn OutputSink>>,
}

impl WasmUnit {
    pub fn new(config: UnitConfig) -> Result<Self, UnitError> {
        let engine_config = Config::new();
        let engine =
            Engine::new(&engine_config).map_err(|err| UnitError::Load(err.to_string()))?;
        Ok(Self {
            config,
            engine,
            state: UnitState::Unloaded,
            module: None,
            live: None,
            buffer: Arc::new(BufferSink::new()),
            forward: None,
        })
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn config(&self) -> &UnitConfig {
        &self.config
    }

    /// Compile the binary module from its configured path.
    ///
    /// Fails with `Load` if the artifact is missing or malformed, or if the
    /// module declares a memory minimum above the configured ceiling.
    pub fn load(&mut self) -> Result<(), UnitError> {
        self.check_not_disposed()?;
        let module = Module::from_file(&self.engine, &self.config.module_path)
            .map_err(|err| UnitError::Load(err.to_string()))?;

        let ceiling_pages = self.config.memory_pages();
        for import in module.imports() {
            if let ExternType::Memory(memory) = import.ty() {
                if memory.minimum() > ceiling_pages {
                    return Err(UnitError::Load(format!(
                        "module requires at least {} pages of memory, ceiling is {} pages",
                        memory.minimum(),
                        ceiling_pages
                    )));
                }
            }
        }
        for export in module.exports() {
            if let ExternType::Memory(memory) = export.ty() {
                if memory.minimum() > ceiling_pages {
                    return Err(UnitError::Load(format!(
                        "module declares {} pages of memory, ceiling is {} pages",
                        memory.minimum(),
                        ceiling_pages
                    )));
                }
            }
        }

        tracing::debug!(
            language = %self.config.language_id,
            path = %self.config.module_path.display(),
            "loaded language module"
        );
        self.module = Some(module);
        self.state = UnitState::Loaded;
        Ok(())
    }

    /// Allocate the page-limited linear memory, wire the capability imports
    /// and instantiate the compiled module. The default buffering sink
    /// captures output for the returned results.
    pub fn create_instance(&mut self) -> Result<(), UnitError> {
        self.create_instance_with_sink(None)
    }

    /// Like `create_instance`, with an additional sink that observes output
    /// as it is written (streaming consumers).
    pub fn create_instance_with_sink(
        &mut self,
        forward: Option<Arc<dyn OutputSink>>,
    ) -> Result<(), UnitError> {
        self.check_not_disposed()?;
        self.forward = forward;
        self.instantiate_with_limit(self.config.page_aligned_limit())?;
        self.state = UnitState::Instantiated;
        Ok(())
    }

    /// Build a live instance against a page-aligned ceiling. On failure the
    /// previous instance, if any, is left in place.
    fn instantiate_with_limit(&mut self, limit_bytes: u64) -> Result<(), UnitError> {
        let module = self.module.as_ref().ok_or(UnitError::NotLoaded)?;

        let pages = u32::try_from(limit_bytes / WASM_PAGE_SIZE)
            .map_err(|_| UnitError::Instantiation("memory ceiling exceeds 4 GiB".to_string()))?;
        let limits = StoreLimitsBuilder::new()
            .memory_size(limit_bytes as usize)
            .build();

        let state = StoreState {
            limits,
            buffer: Arc::clone(&self.buffer),
            forward: self.forward.clone(),
            memory: None,
        };
        let mut store = Store::new(&self.engine, state);
        store.limiter(|state| &mut state.limits);

        let memory = Memory::new(&mut store, MemoryType::new(pages, Some(pages)))
            .map_err(|err| UnitError::Instantiation(err.to_string()))?;
        store.data_mut().memory = Some(memory);

        let mut linker: Linker<StoreState> = Linker::new(&self.engine);
        linker
            .define(&mut store, "env", "memory", memory)
            .map_err(|err| UnitError::Instantiation(err.to_string()))?;
        linker
            .func_wrap("env", "host_write", host_write)
            .map_err(|err| UnitError::Instantiation(err.to_string()))?;
        linker
            .func_wrap(
                "env",
                "abort",
                |_caller: Caller<'_, StoreState>, code: i32| -> wasmtime::Result<()> {
                    Err(anyhow::anyhow!("abort called with code {code}"))
                },
            )
            .map_err(|err| UnitError::Instantiation(err.to_string()))?;

        let instance = linker
            .instantiate(&mut store, module)
            .map_err(|err| UnitError::Instantiation(err.to_string()))?;

        // Modules that define their own memory take precedence over the
        // imported one for host reads and writes.
        let memory = match instance.get_memory(&mut store, "memory") {
            Some(exported) => {
                store.data_mut().memory = Some(exported);
                exported
            }
            None => memory,
        };

        self.live = Some(LiveInstance {
            store,
            instance,
            memory,
            limit_bytes,
        });
        Ok(())
    }

    /// Run source text through the instance and report the outcome.
    ///
    /// Traps, aborts and missing entry points are reported conditions (exit
    /// code 1 with detail on stderr), never errors. Timeout and memory-limit
    /// enforcement happen around this call: memory at instance creation,
    /// timeout by the caller racing this execution. A request carrying a
    /// memory override (capped at the configured ceiling) runs against a
    /// fresh instance sized to the effective limit.
    pub fn execute(&mut self, request: &ExecutionRequest) -> Result<ExecutionResult, UnitError> {
        match self.state {
            UnitState::Disposed => return Err(UnitError::Disposed),
            UnitState::Instantiated => {}
            _ => return Err(UnitError::NotInstantiated),
        }

        let effective_limit = request
            .memory_limit_bytes
            .unwrap_or(self.config.memory_limit_bytes)
            .min(self.config.memory_limit_bytes)
            .div_ceil(WASM_PAGE_SIZE)
            * WASM_PAGE_SIZE;
        if self.live.as_ref().map(|live| live.limit_bytes) != Some(effective_limit) {
            self.instantiate_with_limit(effective_limit)?;
        }

        let start = Instant::now();
        self.buffer.clear();
        self.buffer
            .set_capture(request.capture_stdout, request.capture_stderr);

        self.state = UnitState::Executing;
        let (outcome, peak_memory) = {
            let live = self.live.as_mut().ok_or(UnitError::NotInstantiated)?;
            let outcome = run_guest(live, &request.code, &request.env);
            let peak = live.memory.data_size(&live.store) as u64;
            (outcome, peak)
        };
        self.state = UnitState::Instantiated;

        let duration_ms = start.elapsed().as_millis() as u64;
        let (stdout, mut stderr) = self.buffer.contents();

        let result = match outcome {
            Ok(exit_code) => ExecutionResult {
                exit_code,
                stdout,
                stderr,
                error: (exit_code != 0)
                    .then(|| format!("program exited with code {}", exit_code)),
                duration_ms,
                peak_memory_bytes: Some(peak_memory),
            },
            Err(message) => {
                stderr.push_str(&message);
                stderr.push('\n');
                ExecutionResult {
                    exit_code: 1,
                    stdout,
                    stderr,
                    error: Some(message),
                    duration_ms,
                    peak_memory_bytes: Some(peak_memory),
                }
            }
        };
        Ok(result)
    }

    /// Restore the instance for a fresh `execute()` without re-allocating
    /// memory. Invokes the guest's exported `reset` hook when present.
    pub fn reset(&mut self) -> Result<(), UnitError> {
        match self.state {
            UnitState::Disposed => return Err(UnitError::Disposed),
            UnitState::Instantiated | UnitState::Executing => {}
            _ => return Err(UnitError::NotInstantiated),
        }
        self.buffer.clear();
        if let Some(live) = self.live.as_mut() {
            if let Ok(reset) = live
                .instance
                .get_typed_func::<(), ()>(&mut live.store, "reset")
            {
                if let Err(err) = reset.call(&mut live.store, ()) {
                    tracing::debug!(
                        language = %self.config.language_id,
                        error = %err.root_cause(),
                        "guest reset hook trapped"
                    );
                }
            }
        }
        self.state = UnitState::Instantiated;
        Ok(())
    }

    /// Release the memory region. The unit must not be reused afterward.
    pub fn dispose(&mut self) -> Result<(), UnitError> {
        self.check_not_disposed()?;
        self.live = None;
        self.module = None;
        self.buffer.clear();
        self.state = UnitState::Disposed;
        Ok(())
    }

    fn check_not_disposed(&self) -> Result<(), UnitError> {
        if self.state == UnitState::Disposed {
            Err(UnitError::Disposed)
        } else {
            Ok(())
        }
    }
}

fn host_write(caller: Caller<'_, StoreState>, stream: i32, ptr: i32, len: i32) {
    let Some(memory) = caller.data().memory else {
        return;
    };
    let kind = match stream {
        STREAM_STDOUT => StreamKind::Stdout,
        STREAM_STDERR => StreamKind::Stderr,
        // Unknown stream codes are dropped.
        _ => return,
    };
    if ptr < 0 || len < 0 {
        return;
    }
    let mut bytes = vec![0u8; len as usize];
    if memory.read(&caller, ptr as usize, &mut bytes).is_err() {
        return;
    }
    caller.data().buffer.write(kind, &bytes);
    if let Some(forward) = &caller.data().forward {
        forward.write(kind, &bytes);
    }
}

enum Dealloc {
    PtrLen(TypedFunc<(i32, i32), ()>),
    Ptr(TypedFunc<i32, ()>),
}

struct GuestBuf {
    ptr: i32,
    len: i32,
    dealloc: Option<Dealloc>,
}

/// Place bytes into guest memory using the instance's allocator convention:
/// a dedicated allocate/deallocate pair when exported, else a scratch region
/// at the top of linear memory.
fn write_guest_bytes(live: &mut LiveInstance, bytes: &[u8]) -> Result<GuestBuf, String> {
    let len = i32::try_from(bytes.len()).map_err(|_| "source text too large".to_string())?;

    for (alloc_name, dealloc_name) in ALLOCATOR_PAIRS {
        let alloc = match live
            .instance
            .get_typed_func::<i32, i32>(&mut live.store, alloc_name)
        {
            Ok(func) => func,
            Err(_) => continue,
        };
        let ptr = alloc
            .call(&mut live.store, len)
            .map_err(|err| format!("allocator '{}' trapped: {}", alloc_name, err.root_cause()))?;
        live.memory
            .write(&mut live.store, ptr as u32 as usize, bytes)
            .map_err(|err| format!("failed to write source into guest memory: {}", err))?;
        let dealloc = live
            .instance
            .get_typed_func::<(i32, i32), ()>(&mut live.store, dealloc_name)
            .map(Dealloc::PtrLen)
            .or_else(|_| {
                live.instance
                    .get_typed_func::<i32, ()>(&mut live.store, dealloc_name)
                    .map(Dealloc::Ptr)
            })
            .ok();
        return Ok(GuestBuf { ptr, len, dealloc });
    }

    // No allocator exported: direct pass through a scratch region at the top
    // of linear memory.
    let size = live.memory.data_size(&live.store);
    if bytes.len() + 64 > size {
        return Err("guest memory too small for source text".to_string());
    }
    let ptr = (size - bytes.len()) & !7;
    live.memory
        .write(&mut live.store, ptr, bytes)
        .map_err(|err| format!("failed to write source into guest memory: {}", err))?;
    Ok(GuestBuf {
        ptr: ptr as i32,
        len,
        dealloc: None,
    })
}

fn release_guest_buf(live: &mut LiveInstance, buf: GuestBuf) {
    match buf.dealloc {
        Some(Dealloc::PtrLen(func)) => {
            let _ = func.call(&mut live.store, (buf.ptr, buf.len));
        }
        Some(Dealloc::Ptr(func)) => {
            let _ = func.call(&mut live.store, buf.ptr);
        }
        None => {}
    }
}

/// Resolve the entry point and invoke it. `Err` is a reported execution
/// failure, not a lifecycle error.
fn run_guest(
    live: &mut LiveInstance,
    code: &str,
    env: &HashMap<String, String>,
) -> Result<i32, String> {
    let entry = ENTRY_POINTS
        .iter()
        .copied()
        .find(|name| live.instance.get_func(&mut live.store, name).is_some());
    let Some(entry) = entry else {
        return Err(format!(
            "no entry point exported; expected one of: {}",
            ENTRY_POINTS.join(", ")
        ));
    };

    push_env(live, env);

    if let Ok(func) = live
        .instance
        .get_typed_func::<(i32, i32), i32>(&mut live.store, entry)
    {
        let buf = write_guest_bytes(live, code.as_bytes())?;
        let outcome = func.call(&mut live.store, (buf.ptr, buf.len));
        release_guest_buf(live, buf);
        return outcome.map_err(|err| format!("execution trapped: {}", err.root_cause()));
    }
    if let Ok(func) = live
        .instance
        .get_typed_func::<(), i32>(&mut live.store, entry)
    {
        return func
            .call(&mut live.store, ())
            .map_err(|err| format!("execution trapped: {}", err.root_cause()));
    }
    if let Ok(func) = live
        .instance
        .get_typed_func::<(), ()>(&mut live.store, entry)
    {
        return func
            .call(&mut live.store, ())
            .map(|_| 0)
            .map_err(|err| format!("execution trapped: {}", err.root_cause()));
    }
    Err(format!(
        "entry point '{}' has an unsupported signature",
        entry
    ))
}

/// Hand the environment map to guests that accept one. Best effort: guests
/// without a `set_env` export simply do not see the variables.
fn push_env(live: &mut LiveInstance, env: &HashMap<String, String>) {
    if env.is_empty() {
        return;
    }
    let Ok(set_env) = live
        .instance
        .get_typed_func::<(i32, i32), ()>(&mut live.store, "set_env")
    else {
        return;
    };
    let mut pairs: Vec<_> = env.iter().collect();
    pairs.sort_by_key(|(key, _)| key.as_str());
    let blob: String = pairs
        .iter()
        .map(|(key, value)| format!("{}={}\n", key, value))
        .collect();
    match write_guest_bytes(live, blob.as_bytes()) {
        Ok(buf) => {
            let _ = set_env.call(&mut live.store, (buf.ptr, buf.len));
            release_guest_buf(live, buf);
        }
        Err(err) => {
            tracing::debug!(error = %err, "failed to pass environment to guest");
        }
    }
}
