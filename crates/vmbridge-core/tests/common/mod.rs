//! In-process fake VM module shared by the integration tests.
//!
//! The fake exports the same five entry points as the real module. Scripts
//! drive its behavior:
//!
//! - `1 + 1` logs `2`
//! - `echo <text>` logs every line of `<text>`
//! - `repeat <n>` logs `line 0` .. `line <n-1>`
//! - `sleep <ms>` sleeps, then logs `done`
//! - `parse error` logs a diagnostic and returns -3
//! - `internal` returns -5
//! - `status <n>` returns `<n>`
//!
//! Anything else is logged back verbatim.

#![allow(dead_code)]

use std::path::Path;
use std::slice;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use libc::{c_char, c_float, c_void};

use vmbridge_core::native::ffi::{EntryPoints, LogCallbackFn};
use vmbridge_core::{CommandRunner, Config, Error, LoadedModule, ModuleLoader, Result, StageCommand};

static CREATED: AtomicUsize = AtomicUsize::new(0);
static DESTROYED: AtomicUsize = AtomicUsize::new(0);
static REFUSE_INSTANCES: AtomicBool = AtomicBool::new(false);
static VM_ENTRIES: AtomicUsize = AtomicUsize::new(0);
static MAX_VM_ENTRIES: AtomicUsize = AtomicUsize::new(0);

static SERIAL: Mutex<()> = Mutex::new(());

/// Serialize tests that read the global instance counters.
///
/// Resets the counters on entry.
pub fn serial() -> MutexGuard<'static, ()> {
    let guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    CREATED.store(0, Ordering::SeqCst);
    DESTROYED.store(0, Ordering::SeqCst);
    REFUSE_INSTANCES.store(false, Ordering::SeqCst);
    VM_ENTRIES.store(0, Ordering::SeqCst);
    MAX_VM_ENTRIES.store(0, Ordering::SeqCst);
    guard
}

pub fn instances_created() -> usize {
    CREATED.load(Ordering::SeqCst)
}

pub fn instances_destroyed() -> usize {
    DESTROYED.load(Ordering::SeqCst)
}

/// Highest number of calls, loads and unloads seen inside the module at once.
pub fn max_concurrent_entries() -> usize {
    MAX_VM_ENTRIES.load(Ordering::SeqCst)
}

/// Counts as one entry into the module while alive.
struct VmEntry;

impl VmEntry {
    fn enter() -> Self {
        let running = VM_ENTRIES.fetch_add(1, Ordering::SeqCst) + 1;
        MAX_VM_ENTRIES.fetch_max(running, Ordering::SeqCst);
        Self
    }
}

impl Drop for VmEntry {
    fn drop(&mut self) {
        VM_ENTRIES.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Make `create_instance` return null until the next [`serial`].
pub fn refuse_instances() {
    REFUSE_INSTANCES.store(true, Ordering::SeqCst);
}

struct FakeInstance {
    user_data: *mut c_void,
    log: LogCallbackFn,
    config: Option<String>,
}

impl FakeInstance {
    fn emit(&self, call_data: *mut c_void, line: &str) {
        unsafe {
            (self.log)(
                self.user_data,
                call_data,
                0,
                line.as_ptr() as *const c_char,
                line.len() as u32,
            )
        };
    }
}

unsafe extern "C" fn create_instance(
    user_data: *mut c_void,
    log: LogCallbackFn,
    _max_runtime: c_float,
) -> *mut c_void {
    if REFUSE_INSTANCES.load(Ordering::SeqCst) {
        return std::ptr::null_mut();
    }
    CREATED.fetch_add(1, Ordering::SeqCst);
    Box::into_raw(Box::new(FakeInstance {
        user_data,
        log,
        config: None,
    })) as *mut c_void
}

unsafe extern "C" fn destroy_instance(instance: *mut c_void) {
    DESTROYED.fetch_add(1, Ordering::SeqCst);
    drop(unsafe { Box::from_raw(instance as *mut FakeInstance) });
}

// Rejects configs containing "invalid" with -3.
unsafe extern "C" fn load_config(instance: *mut c_void, contents: *const c_char, length: u32) -> i32 {
    let instance = unsafe { &mut *(instance as *mut FakeInstance) };
    let contents = unsafe { slice::from_raw_parts(contents as *const u8, length as usize) };
    let contents = String::from_utf8_lossy(contents).into_owned();
    if contents.contains("invalid") {
        return -3;
    }
    instance.config = Some(contents);
    0
}

unsafe extern "C" fn call(
    instance: *mut c_void,
    call_data: *mut c_void,
    tag: c_char,
    code: *const c_char,
    length: u32,
) -> i32 {
    let _entry = VmEntry::enter();

    let instance = unsafe { &*(instance as *const FakeInstance) };
    let code = unsafe { slice::from_raw_parts(code as *const u8, length as usize) };
    let code = String::from_utf8_lossy(code);
    run_script(instance, call_data, tag as u8, &code)
}

fn run_script(instance: &FakeInstance, call_data: *mut c_void, tag: u8, code: &str) -> i32 {
    if tag == b'c' {
        instance.emit(call_data, "compiled");
        return 0;
    }

    match code.trim() {
        "1 + 1" => {
            instance.emit(call_data, "2");
            0
        }
        "config" => {
            instance.emit(call_data, instance.config.as_deref().unwrap_or("none"));
            0
        }
        "parse error" => {
            instance.emit(call_data, "[L1|C5] unexpected token");
            -3
        }
        "internal" => -5,
        code => {
            if let Some(text) = code.strip_prefix("echo ") {
                text.lines().for_each(|line| instance.emit(call_data, line));
                0
            } else if let Some(n) = code.strip_prefix("repeat ") {
                let n: usize = n.parse().unwrap_or(0);
                (0..n).for_each(|i| instance.emit(call_data, &format!("line {i}")));
                0
            } else if let Some(ms) = code.strip_prefix("sleep ") {
                std::thread::sleep(Duration::from_millis(ms.parse().unwrap_or(0)));
                instance.emit(call_data, "done");
                0
            } else if let Some(status) = code.strip_prefix("status ") {
                status.parse().unwrap_or(-5)
            } else {
                instance.emit(call_data, code);
                0
            }
        }
    }
}

unsafe extern "C" fn status(_instance: *mut c_void) -> i32 {
    0
}

pub fn entry_points() -> EntryPoints {
    EntryPoints {
        create_instance,
        destroy_instance,
        load_config,
        call,
        status,
    }
}

/// Time spent inside a fake load or unload, so overlaps are observable.
const SWAP_DELAY: Duration = Duration::from_millis(5);

/// Counts drops of the module handle as unloads.
struct UnloadCounter(Arc<AtomicUsize>);

impl Drop for UnloadCounter {
    fn drop(&mut self) {
        let _entry = VmEntry::enter();
        std::thread::sleep(SWAP_DELAY);
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Loader handing out the fake module for any path.
#[derive(Default)]
pub struct FakeLoader {
    loads: Arc<AtomicUsize>,
    unloads: Arc<AtomicUsize>,
    fail: AtomicBool,
}

impl FakeLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn unloads(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }

    /// Make every following load fail.
    pub fn fail_loads(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl ModuleLoader for FakeLoader {
    fn load(&self, path: &Path) -> Result<LoadedModule> {
        let _entry = VmEntry::enter();
        std::thread::sleep(SWAP_DELAY);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Load {
                path: path.to_path_buf(),
                message: "invalid ELF header".to_string(),
            });
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        let handle = UnloadCounter(Arc::clone(&self.unloads));
        Ok(unsafe { LoadedModule::new(entry_points(), handle) })
    }
}

/// Command runner that records commands instead of running them.
#[derive(Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl RecordingRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail when the command line equals `command`.
    pub fn failing_on(command: &str) -> Arc<Self> {
        Arc::new(Self {
            commands: Mutex::default(),
            fail_on: Some(command.to_string()),
        })
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, command: &StageCommand, _cwd: &Path) -> Result<()> {
        let line = command.to_string();
        self.commands.lock().unwrap().push(line.clone());
        if self.fail_on.as_deref() == Some(line.as_str()) {
            return Err(Error::Command {
                command: line,
                message: "exit status: 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Bridge over the fake module, with its module file in `dir`.
pub fn bridge_in(
    dir: &Path,
    loader: Arc<FakeLoader>,
    runner: Arc<RecordingRunner>,
) -> vmbridge_core::VmBridge {
    let mut config = Config::default();
    config.module.path = dir.join("libcsqfvm.so");
    config.rebuild.source_dir = dir.to_path_buf();
    vmbridge_core::VmBridge::with_parts(config, loader, runner).unwrap()
}
