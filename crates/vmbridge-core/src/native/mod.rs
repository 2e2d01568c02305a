//! Native layer: the loaded VM module and the call protocol into it.
//!
//! # Architecture
//!
//! ```text
//! ExecutionGate<NativeModule>
//!     │
//!     └── NativeModule ({Unloaded, Loaded})
//!             │
//!             ├── ModuleLoader (DylibLoader via libloading)
//!             │       └── EntryPoints (five bound symbols)
//!             │
//!             └── bridge::invoke
//!                     ├── create_instance(user_data = accumulator, collect_log_line, timeout)
//!                     ├── load_config (optional)
//!                     ├── call(tag, source)
//!                     └── destroy_instance (drop guard)
//! ```
//!
//! # Module Structure
//!
//! - `bridge` - One request/response cycle against a loaded module
//! - `ffi` - Entry point signatures and symbol names
//! - `module` - `NativeModule` state machine and loaders
//! - `shadow` - Shadow copies for hot reload on Windows

mod bridge;
pub mod ffi;
mod module;
mod shadow;

pub use bridge::{Invocation, invoke, invoke_with_config};
pub use ffi::EntryPoints;
pub use module::{DylibLoader, LoadedModule, ModuleLoader, ModuleState, NativeModule};
pub use shadow::{ShadowCopy, cleanup_stale_copies, default_shadow_dir};
