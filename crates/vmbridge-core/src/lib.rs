//! Native execution bridge for a dynamically loaded scripting VM.
//!
//! This crate provides:
//! - Loading and hot-swapping of the VM module (`native`)
//! - The call protocol into the module, with output capture
//! - Status code classification and size-capped rendering
//! - A FIFO gate serializing every access to the module
//! - A rebuild pipeline that syncs, configures, builds and reloads

pub mod classify;
pub mod config;
pub mod error;
pub mod gate;
pub mod native;
pub mod pipeline;
pub mod render;
pub mod request;
pub mod service;

pub use classify::{StatusCategory, classify};
pub use config::Config;
pub use error::{Error, Result};
pub use gate::ExecutionGate;
pub use native::{DylibLoader, Invocation, LoadedModule, ModuleLoader, NativeModule, invoke};
pub use pipeline::{
    CommandRunner, ProgressSink, RebuildOutcome, RebuildPipeline, RebuildProgress, RebuildStage,
    StageCommand, SystemRunner,
};
pub use request::{ExecutionRequest, ExecutionResult, TypeTag};
pub use service::VmBridge;
