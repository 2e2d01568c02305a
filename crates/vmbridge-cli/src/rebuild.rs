//! Rebuild command implementation.

use std::process::ExitCode;

use vmbridge_core::{RebuildProgress, VmBridge};

/// Rebuild the module, printing each progress line as it happens.
pub async fn execute(bridge: &VmBridge) -> anyhow::Result<ExitCode> {
    let print_latest = |progress: &RebuildProgress| {
        if let Some(entry) = progress.entries().last() {
            println!("{}", entry.message);
        }
    };

    let progress = bridge.rebuild(&print_latest).await;

    Ok(if progress.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
