//! Status command implementation.

use std::process::ExitCode;

use vmbridge_core::VmBridge;

/// Load the module and report readiness.
///
/// Exits with failure when the module could not be loaded.
pub async fn execute(bridge: &VmBridge) -> anyhow::Result<ExitCode> {
    let loaded = bridge.start().await;
    let ready = bridge.ready().await;

    println!("module: {}", bridge.config().module.path.display());
    println!("ready: {}", if ready { "yes" } else { "no" });
    if let Err(e) = loaded {
        println!("reason: {e}");
    }

    Ok(if ready {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
