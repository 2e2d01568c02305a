//! One request/response cycle against a loaded VM module.
//!
//! Every call creates a fresh VM instance, registers a log callback that
//! appends each emitted record to a per-call accumulator, runs the code and
//! destroys the instance again. Destruction happens in a drop guard, so it
//! runs exactly once on every exit path.

use std::slice;

use libc::{c_char, c_void};

use crate::classify::StatusCategory;
use crate::error::{Error, Result};
use crate::request::ExecutionRequest;

use super::ffi::{DestroyInstanceFn, EntryPoints};
use super::module::NativeModule;

/// Raw outcome of a call: captured lines plus the VM status code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub lines: Vec<String>,
    pub status: i32,
}

/// Per-call output buffer handed to the VM as `user_data`.
#[derive(Debug, Default)]
struct OutputAccumulator {
    lines: Vec<String>,
}

/// Log callback registered with every instance.
///
/// # Safety
/// `user_data` must be the `OutputAccumulator` passed to `create_instance`
/// and `message` must point to `length` readable bytes.
unsafe extern "C" fn collect_log_line(
    user_data: *mut c_void,
    _call_data: *mut c_void,
    severity: i32,
    message: *const c_char,
    length: u32,
) {
    if user_data.is_null() {
        return;
    }
    let accumulator = unsafe { &mut *(user_data as *mut OutputAccumulator) };

    let bytes = if message.is_null() || length == 0 {
        &[][..]
    } else {
        unsafe { slice::from_raw_parts(message as *const u8, length as usize) }
    };
    let line = String::from_utf8_lossy(bytes).into_owned();

    tracing::trace!(severity, "VM output: {}", line);
    accumulator.lines.push(line);
}

/// RAII guard for a VM instance.
/// Ensures `destroy_instance` is called even if processing panics.
struct InstanceGuard {
    instance: *mut c_void,
    destroy: DestroyInstanceFn,
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        unsafe { (self.destroy)(self.instance) };
    }
}

/// Execute `request` against `module`.
///
/// Returns `Error::NotReady` without touching the native layer when no
/// module is loaded, and `Error::InstanceCreation` when the VM hands back a
/// null instance. Any status code, including failures, is returned as part
/// of the `Invocation`.
pub fn invoke(module: &NativeModule, request: &ExecutionRequest) -> Result<Invocation> {
    invoke_with_config(module, request, None)
}

/// Like [`invoke`], passing `config` through `load_config` before the call.
///
/// A non-zero `load_config` status skips the call and is returned as the
/// invocation status.
pub fn invoke_with_config(
    module: &NativeModule,
    request: &ExecutionRequest,
    config: Option<&[u8]>,
) -> Result<Invocation> {
    let Some(entry) = module.entry_points() else {
        return Err(Error::NotReady);
    };
    call_entry_points(entry, request, config)
}

fn call_entry_points(
    entry: &EntryPoints,
    request: &ExecutionRequest,
    config: Option<&[u8]>,
) -> Result<Invocation> {
    let source = request.source().as_bytes();
    let source_len = u32::try_from(source.len()).map_err(|_| Error::UserCode {
        category: StatusCategory::PreprocessingFailed,
        message: format!("source is too large ({} bytes)", source.len()),
    })?;

    // Declared before the guard so it outlives the instance.
    let mut output = OutputAccumulator::default();
    let user_data = &mut output as *mut OutputAccumulator as *mut c_void;

    let instance = unsafe {
        (entry.create_instance)(
            user_data,
            collect_log_line,
            request.timeout().as_secs_f32(),
        )
    };
    if instance.is_null() {
        return Err(Error::InstanceCreation);
    }
    let guard = InstanceGuard {
        instance,
        destroy: entry.destroy_instance,
    };

    let (status, vm_status) = 'call: {
        if let Some(config) = config {
            let config_status = unsafe {
                (entry.load_config)(
                    instance,
                    config.as_ptr() as *const c_char,
                    config.len() as u32,
                )
            };
            if config_status != 0 {
                tracing::warn!("VM rejected configuration with status {}", config_status);
                break 'call (config_status, None);
            }
        }

        let status = unsafe {
            (entry.call)(
                instance,
                std::ptr::null_mut(),
                request.tag().as_byte() as c_char,
                source.as_ptr() as *const c_char,
                source_len,
            )
        };
        (status, Some(unsafe { (entry.status)(instance) }))
    };

    drop(guard);

    tracing::debug!(
        "VM call finished: tag={} status={} vm_status={:?} lines={}",
        request.tag(),
        status,
        vm_status,
        output.lines.len()
    );

    Ok(Invocation {
        lines: output.lines,
        status,
    })
}
