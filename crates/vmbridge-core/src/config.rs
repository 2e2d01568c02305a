//! Configuration for the bridge.
//!
//! Loaded from a TOML file. Every field has a default, so an empty file is a
//! valid configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::native::ffi::DEFAULT_SYMBOL_PREFIX;
use crate::native::default_shadow_dir;
use crate::render::MESSAGE_BUDGET;

/// Location and binding of the VM module.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Path to the built module library.
    pub path: PathBuf,
    /// Prefix of the exported entry point symbols.
    pub symbol_prefix: String,
    /// Optional VM configuration file passed through `load_config`.
    pub config_file: Option<PathBuf>,
    /// Directory for shadow copies of the module (used on Windows).
    pub shadow_dir: Option<PathBuf>,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("../SQFvm/libcsqfvm.so"),
            symbol_prefix: DEFAULT_SYMBOL_PREFIX.to_string(),
            config_file: None,
            shadow_dir: None,
        }
    }
}

impl ModuleConfig {
    pub fn shadow_dir(&self) -> PathBuf {
        self.shadow_dir
            .clone()
            .unwrap_or_else(|| default_shadow_dir(&self.path))
    }
}

/// Execution defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Language used when the caller does not name one.
    pub default_language: String,
    /// Timeout handed to the VM when the caller does not give one.
    pub default_timeout_secs: f64,
    /// Byte budget of rendered output.
    pub output_budget: usize,
    /// Upper bound of the blocking worker pool.
    pub max_blocking_threads: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_language: "sqf".to_string(),
            default_timeout_secs: 10.0,
            output_budget: MESSAGE_BUDGET,
            max_blocking_threads: 4,
        }
    }
}

impl ExecutionConfig {
    /// The default timeout, saturating at `Duration::MAX` for values
    /// `Config::validate` would reject.
    pub fn default_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.default_timeout_secs).unwrap_or(Duration::MAX)
    }
}

/// Source checkout and build settings for rebuilds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RebuildConfig {
    /// Checkout of the VM sources.
    pub source_dir: PathBuf,
    /// Branch (or `remote/branch`) to build.
    pub branch: String,
    /// Remote used when `branch` has no remote part.
    pub remote: String,
    /// Build cache removed before configuring.
    pub cache_file: String,
    /// Build target producing the module.
    pub build_target: String,
    /// Parallel build jobs.
    pub jobs: usize,
    /// Environment overrides for the configure stage.
    pub env: BTreeMap<String, String>,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("../SQFvm"),
            branch: "master".to_string(),
            remote: "origin".to_string(),
            cache_file: "CMakeCache.txt".to_string(),
            build_target: "libcsqfvm".to_string(),
            jobs: 6,
            env: BTreeMap::new(),
        }
    }
}

impl RebuildConfig {
    /// The remote ref to hard-reset to.
    pub fn remote_branch(&self) -> String {
        if self.branch.contains('/') {
            self.branch.clone()
        } else {
            format!("{}/{}", self.remote, self.branch)
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub module: ModuleConfig,
    pub execution: ExecutionConfig,
    pub rebuild: RebuildConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment overrides.
    pub fn load_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(format!("config parse error: {e}")))
    }

    /// Default config file location (`<config dir>/vmbridge/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vmbridge").join("config.toml"))
    }

    /// Apply environment variable overrides.
    ///
    /// - `VMBRIDGE_MODULE_PATH`: module library path
    /// - `VMBRIDGE_SOURCE_DIR`: rebuild source checkout
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("VMBRIDGE_MODULE_PATH") {
            if !path.is_empty() {
                self.module.path = PathBuf::from(path);
            }
        }
        if let Ok(dir) = std::env::var("VMBRIDGE_SOURCE_DIR") {
            if !dir.is_empty() {
                self.rebuild.source_dir = PathBuf::from(dir);
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let timeout_secs = self.execution.default_timeout_secs;
        if !(timeout_secs > 0.0 && Duration::try_from_secs_f64(timeout_secs).is_ok()) {
            return Err(Error::Config(
                "execution.default_timeout_secs must be a positive number of seconds in range".to_string(),
            ));
        }
        // The fence and ellipsis alone take 15 bytes.
        if self.execution.output_budget < 32 {
            return Err(Error::Config(
                "execution.output_budget must be at least 32 bytes".to_string(),
            ));
        }
        if self.execution.max_blocking_threads == 0 {
            return Err(Error::Config(
                "execution.max_blocking_threads must be at least 1".to_string(),
            ));
        }
        if self.rebuild.jobs == 0 {
            return Err(Error::Config("rebuild.jobs must be at least 1".to_string()));
        }
        self.execution.default_language.parse::<crate::TypeTag>()?;
        Ok(())
    }

    /// Read the VM configuration file, if one is set.
    pub fn read_vm_config(&self) -> Result<Option<Vec<u8>>> {
        match &self.module.config_file {
            Some(path) => std::fs::read(path).map(Some).map_err(|e| {
                Error::Config(format!("cannot read VM config {}: {e}", path.display()))
            }),
            None => Ok(None),
        }
    }
}
