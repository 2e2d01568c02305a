//! vmbridge CLI - Execute code on the native VM module and rebuild it.

mod exec;
mod rebuild;
mod status;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::filter::{Directive, EnvFilter};
use vmbridge_core::{Config, VmBridge};

#[derive(Parser)]
#[command(name = "vmbridge")]
#[command(about = "Execute code on a native scripting VM module")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute code read from a file or stdin
    Exec {
        /// Source file (stdin when omitted)
        file: Option<PathBuf>,

        /// Language of the code (sqf, sqc)
        #[arg(short, long)]
        language: Option<String>,

        /// Maximum runtime in seconds
        #[arg(short, long, value_parser = exec::parse_timeout)]
        timeout: Option<std::time::Duration>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rebuild the VM module from source and reload it
    Rebuild,

    /// Load the VM module and report whether it is ready
    Status,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{}", format_error(&err));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config, cli.verbose)?;
    tracing::debug!("Using VM module {}", config.module.path.display());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .max_blocking_threads(config.execution.max_blocking_threads.max(1))
        .build()
        .context("Failed to start runtime")?;

    let bridge = VmBridge::new(config)?;
    let command = cli.command;

    runtime.block_on(async move {
        match command {
            Commands::Exec {
                file,
                language,
                timeout,
                json,
            } => exec::execute(&bridge, file.as_deref(), language.as_deref(), timeout, json).await,
            Commands::Rebuild => rebuild::execute(&bridge).await,
            Commands::Status => status::execute(&bridge).await,
        }
    })
}

/// Load the explicit config file, else the default one if present.
fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    let path = path
        .map(PathBuf::from)
        .or_else(|| Config::default_path().filter(|p| p.exists()));

    let config = match path {
        Some(path) => Config::load_with_env(&path)?,
        None => {
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };
    Ok(config)
}

fn init_logging(config: &Config, verbose: bool) -> anyhow::Result<()> {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let directive: Directive = level
        .parse()
        .with_context(|| format!("Invalid log level `{level}`"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Render bridge errors the way end users see them.
fn format_error(err: &anyhow::Error) -> String {
    match err.downcast_ref::<vmbridge_core::Error>() {
        Some(e) => e.user_message(),
        None => format!("Error: {err:#}"),
    }
}
