//! Exec command implementation.
//!
//! Reads code from a file or stdin, runs it and prints the rendered result.

use std::io::Read;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use vmbridge_core::VmBridge;

/// Execute code and print the result.
///
/// Exits with failure when the VM reports a non-zero status.
pub async fn execute(
    bridge: &VmBridge,
    file: Option<&Path>,
    language: Option<&str>,
    timeout: Option<Duration>,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let code = read_source(file)?;

    if bridge.start().await.is_err() {
        // Already logged; execute answers with the not-ready message.
        tracing::debug!("Executing without a loaded VM module");
    }
    let result = bridge.execute(language, &code, timeout).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.rendered);
    }

    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn read_source(file: Option<&Path>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut code = String::new();
            std::io::stdin()
                .read_to_string(&mut code)
                .context("Failed to read stdin")?;
            Ok(code)
        }
    }
}

/// Parse a positive number of seconds.
pub fn parse_timeout(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|_| format!("`{s}` is not a number"))?;
    if !(secs.is_finite() && secs > 0.0) {
        return Err("timeout must be a positive number of seconds".to_string());
    }
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}
