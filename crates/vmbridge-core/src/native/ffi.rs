//! FFI type definitions for the VM module.
//!
//! This module defines the function pointer types of the five entry points
//! every VM module exports, plus the log callback the VM calls back into.

use libc::{c_char, c_float, c_void};

/// Names of the required entry points, without the configurable prefix.
pub const REQUIRED_SYMBOLS: [&str; 5] = [
    CREATE_INSTANCE,
    DESTROY_INSTANCE,
    LOAD_CONFIG,
    CALL,
    STATUS,
];

pub const CREATE_INSTANCE: &str = "create_instance";
pub const DESTROY_INSTANCE: &str = "destroy_instance";
pub const LOAD_CONFIG: &str = "load_config";
pub const CALL: &str = "call";
pub const STATUS: &str = "status";

/// Prefix the upstream VM puts in front of every exported symbol.
pub const DEFAULT_SYMBOL_PREFIX: &str = "sqfvm_";

/// Callback invoked by the VM once per emitted log record.
pub type LogCallbackFn = unsafe extern "C" fn(
    *mut c_void,   // user_data
    *mut c_void,   // call_data
    i32,           // severity
    *const c_char, // message
    u32,           // length
);

/// `void* create_instance(void* user_data, log_callback callback, float max_runtime_seconds)`
pub type CreateInstanceFn =
    unsafe extern "C" fn(*mut c_void, LogCallbackFn, c_float) -> *mut c_void;

/// `void destroy_instance(void* instance)`
pub type DestroyInstanceFn = unsafe extern "C" fn(*mut c_void);

/// `int32_t load_config(void* instance, const char* contents, uint32_t length)`
pub type LoadConfigFn = unsafe extern "C" fn(*mut c_void, *const c_char, u32) -> i32;

/// `int32_t call(void* instance, void* call_data, char type, const char* code, uint32_t length)`
pub type CallFn = unsafe extern "C" fn(*mut c_void, *mut c_void, c_char, *const c_char, u32) -> i32;

/// `int32_t status(void* instance)`
pub type StatusFn = unsafe extern "C" fn(*mut c_void) -> i32;

/// The resolved entry points of a loaded module.
///
/// Function pointers are only valid while the library they came from stays
/// loaded, so an `EntryPoints` value must never outlive its `LoadedModule`.
#[derive(Clone, Copy)]
pub struct EntryPoints {
    pub create_instance: CreateInstanceFn,
    pub destroy_instance: DestroyInstanceFn,
    pub load_config: LoadConfigFn,
    pub call: CallFn,
    pub status: StatusFn,
}

impl std::fmt::Debug for EntryPoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryPoints")
            .field("create_instance", &(self.create_instance as *const ()))
            .field("destroy_instance", &(self.destroy_instance as *const ()))
            .field("load_config", &(self.load_config as *const ()))
            .field("call", &(self.call as *const ()))
            .field("status", &(self.status as *const ()))
            .finish()
    }
}

/// Full symbol name for an entry point.
pub fn symbol_name(prefix: &str, name: &str) -> String {
    format!("{prefix}{name}")
}
