//! The bridge facade used by front ends.
//!
//! Owns the gated module slot and exposes the two operations front ends need:
//! executing code and rebuilding the module.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::gate::ExecutionGate;
use crate::native::{
    DylibLoader, ModuleLoader, NativeModule, cleanup_stale_copies, invoke_with_config,
};
use crate::pipeline::{CommandRunner, ProgressSink, RebuildPipeline, RebuildProgress, SystemRunner};
use crate::request::{ExecutionRequest, ExecutionResult};

/// Calls running this many times past their timeout are reported.
const SLOW_CALL_FACTOR: u32 = 2;

/// Executes code on the VM module and rebuilds it on demand.
pub struct VmBridge {
    config: Config,
    gate: ExecutionGate<NativeModule>,
    pipeline: RebuildPipeline,
    /// Contents of the VM configuration file, passed before every call.
    vm_config: Option<Arc<[u8]>>,
}

impl VmBridge {
    /// Create a bridge loading modules from shared libraries.
    pub fn new(config: Config) -> Result<Self> {
        let shadow_dir = config.module.shadow_dir();
        if let Err(e) = cleanup_stale_copies(&shadow_dir) {
            tracing::warn!("Failed to clean {}: {}", shadow_dir.display(), e);
        }

        let loader = Arc::new(DylibLoader::new(
            config.module.symbol_prefix.clone(),
            shadow_dir,
        ));
        Self::with_parts(config, loader, Arc::new(SystemRunner))
    }

    /// Create a bridge with a custom module loader and command runner.
    pub fn with_parts(
        config: Config,
        loader: Arc<dyn ModuleLoader>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        config.validate()?;
        let vm_config = config.read_vm_config()?.map(Arc::from);

        let module = NativeModule::new(config.module.path.clone(), loader);
        let pipeline = RebuildPipeline::new(
            config.rebuild.clone(),
            config.module.path.clone(),
            runner,
        );

        Ok(Self {
            config,
            gate: ExecutionGate::new(module),
            pipeline,
            vm_config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn gate(&self) -> &ExecutionGate<NativeModule> {
        &self.gate
    }

    /// Load the configured module.
    ///
    /// A failure is logged and returned; the bridge stays usable and answers
    /// `NotReady` until a rebuild or another `start` succeeds.
    pub async fn start(&self) -> Result<()> {
        let path = self.config.module.path.clone();
        self.gate
            .with_gate(move |module| module.load(&path))
            .await
            .inspect_err(|e| tracing::error!("VM module not loaded: {}", e))
    }

    /// Whether a module is currently loaded.
    pub async fn ready(&self) -> bool {
        self.gate.inspect(NativeModule::ready).await
    }

    /// Execute `code` as `language`.
    ///
    /// `timeout` falls back to the configured default. Failing status codes
    /// are part of the returned result; errors are reserved for failures to
    /// reach the VM at all.
    pub async fn execute(
        &self,
        language: Option<&str>,
        code: &str,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult> {
        let language = language.unwrap_or(self.config.execution.default_language.as_str());
        let timeout = timeout.unwrap_or_else(|| self.config.execution.default_timeout());
        let request = ExecutionRequest::for_language(language, code, timeout)?;
        self.execute_request(request).await
    }

    /// Execute a prepared request.
    pub async fn execute_request(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        let tag = request.tag();
        let timeout = request.timeout();
        let vm_config = self.vm_config.clone();

        let started = Instant::now();
        let invocation = self
            .gate
            .with_gate(move |module| invoke_with_config(module, &request, vm_config.as_deref()))
            .await
            .inspect_err(|e| match e {
                Error::NotReady => tracing::warn!("Execution requested but no VM module is loaded"),
                e => tracing::error!("Execution failed: {}", e),
            })?;
        let elapsed = started.elapsed();

        if elapsed > timeout.saturating_mul(SLOW_CALL_FACTOR) {
            tracing::warn!(
                "VM call took {:.1}s with a timeout of {:.1}s",
                elapsed.as_secs_f64(),
                timeout.as_secs_f64()
            );
        }

        let result =
            ExecutionResult::from_invocation(invocation, tag, self.config.execution.output_budget);
        if let Some(e @ Error::Internal { .. }) = result.error() {
            tracing::error!("VM status {}: {}", result.status, e);
        }
        Ok(result)
    }

    /// Rebuild the module from source and swap it in.
    pub async fn rebuild(&self, sink: &dyn ProgressSink) -> RebuildProgress {
        self.pipeline.run(&self.gate, sink).await
    }
}
