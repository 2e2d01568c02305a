//! Integration tests for executing code through the bridge.
//!
//! Uses the in-process fake module from `common`.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use common::{FakeLoader, RecordingRunner};
use vmbridge_core::error::{INTERNAL_FAILURE_MESSAGE, NOT_READY_MESSAGE};
use vmbridge_core::{Error, StatusCategory, VmBridge};

const TIMEOUT: Option<Duration> = Some(Duration::from_secs(10));

async fn started_bridge(temp: &TempDir) -> (VmBridge, Arc<FakeLoader>) {
    let loader = FakeLoader::new();
    let bridge = common::bridge_in(temp.path(), Arc::clone(&loader), RecordingRunner::new());
    bridge.start().await.unwrap();
    (bridge, loader)
}

#[tokio::test]
async fn test_simple_expression() {
    let _serial = common::serial();
    let temp = TempDir::new().unwrap();
    let (bridge, loader) = started_bridge(&temp).await;

    let result = bridge.execute(Some("script"), "1 + 1", TIMEOUT).await.unwrap();

    assert_eq!(result.text(), "2");
    assert_eq!(result.status, 0);
    assert_eq!(result.category, StatusCategory::Success);
    assert_eq!(result.rendered, "```sqf\n2```");
    assert_eq!(loader.loads(), 1);
    assert_eq!(common::instances_created(), 1);
    assert_eq!(common::instances_destroyed(), 1);
}

#[tokio::test]
async fn test_default_language_and_timeout() {
    let _serial = common::serial();
    let temp = TempDir::new().unwrap();
    let (bridge, _loader) = started_bridge(&temp).await;

    let result = bridge.execute(None, "echo hello\nworld", None).await.unwrap();
    assert_eq!(result.lines, ["hello", "world"]);
    assert_eq!(result.rendered, "```sqf\nhello\nworld```");
}

#[tokio::test]
async fn test_compiled_language() {
    let _serial = common::serial();
    let temp = TempDir::new().unwrap();
    let (bridge, _loader) = started_bridge(&temp).await;

    let result = bridge.execute(Some("sqc"), "1 + 1", TIMEOUT).await.unwrap();
    assert_eq!(result.text(), "compiled");
    assert_eq!(result.rendered, "```sqc\ncompiled```");
}

#[tokio::test]
async fn test_not_ready_before_start() {
    let _serial = common::serial();
    let temp = TempDir::new().unwrap();
    let bridge = common::bridge_in(temp.path(), FakeLoader::new(), RecordingRunner::new());

    assert!(!bridge.ready().await);
    let err = bridge.execute(None, "1 + 1", TIMEOUT).await.unwrap_err();
    assert!(matches!(err, Error::NotReady));
    assert_eq!(err.user_message(), NOT_READY_MESSAGE);
    assert_eq!(common::instances_created(), 0);
}

#[tokio::test]
async fn test_failed_start_is_not_ready() {
    let _serial = common::serial();
    let temp = TempDir::new().unwrap();
    let loader = FakeLoader::new();
    loader.fail_loads(true);
    let bridge = common::bridge_in(temp.path(), Arc::clone(&loader), RecordingRunner::new());

    assert!(bridge.start().await.is_err());
    assert!(!bridge.ready().await);
    assert!(matches!(
        bridge.execute(None, "1 + 1", TIMEOUT).await,
        Err(Error::NotReady)
    ));
}

#[tokio::test]
async fn test_not_ready_after_unload() {
    let _serial = common::serial();
    let temp = TempDir::new().unwrap();
    let (bridge, loader) = started_bridge(&temp).await;

    bridge
        .gate()
        .with_gate(|module| {
            module.unload();
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(loader.unloads(), 1);
    assert!(matches!(
        bridge.execute(None, "1 + 1", TIMEOUT).await,
        Err(Error::NotReady)
    ));
}

#[tokio::test]
async fn test_instance_creation_failure() {
    let _serial = common::serial();
    let temp = TempDir::new().unwrap();
    let (bridge, _loader) = started_bridge(&temp).await;
    common::refuse_instances();

    let err = bridge.execute(None, "1 + 1", TIMEOUT).await.unwrap_err();
    assert!(matches!(err, Error::InstanceCreation));
    assert_eq!(err.user_message(), INTERNAL_FAILURE_MESSAGE);
    assert_eq!(common::instances_destroyed(), 0);
}

#[tokio::test]
async fn test_user_error_shows_diagnostic() {
    let _serial = common::serial();
    let temp = TempDir::new().unwrap();
    let (bridge, _loader) = started_bridge(&temp).await;

    let result = bridge.execute(None, "parse error", TIMEOUT).await.unwrap();

    assert_eq!(result.status, -3);
    assert_eq!(result.category, StatusCategory::ParsingFailed);
    assert!(!result.is_success());
    assert_eq!(
        result.rendered,
        "```sqf\n[L1|C5] unexpected token\n\
         Error: VM encountered an error while executing the code: parsing failed```"
    );
    assert_eq!(common::instances_destroyed(), 1);
}

#[tokio::test]
async fn test_internal_error_is_generic() {
    let _serial = common::serial();
    let temp = TempDir::new().unwrap();
    let (bridge, _loader) = started_bridge(&temp).await;

    let result = bridge.execute(None, "internal", TIMEOUT).await.unwrap();

    assert_eq!(result.category, StatusCategory::InvalidType);
    assert!(result.rendered.contains(INTERNAL_FAILURE_MESSAGE));
    assert!(!result.rendered.contains("the provided type was invalid"));
}

#[tokio::test]
async fn test_unknown_status() {
    let _serial = common::serial();
    let temp = TempDir::new().unwrap();
    let (bridge, _loader) = started_bridge(&temp).await;

    let result = bridge.execute(None, "status 999", TIMEOUT).await.unwrap();
    assert_eq!(result.category, StatusCategory::Unknown(999));
    assert_eq!(result.category.message(), "Unknown error! Error code: 999");
}

#[tokio::test]
async fn test_long_output_is_capped() {
    let _serial = common::serial();
    let temp = TempDir::new().unwrap();
    let (bridge, _loader) = started_bridge(&temp).await;

    let result = bridge.execute(None, "repeat 500", TIMEOUT).await.unwrap();

    assert_eq!(result.lines.len(), 500);
    assert_eq!(result.rendered.len(), 2000);
    assert!(result.rendered.starts_with("```sqf\nline 0\nline 1\n"));
    assert!(result.rendered.ends_with("(...)```"));
}

#[tokio::test]
async fn test_empty_output() {
    let _serial = common::serial();
    let temp = TempDir::new().unwrap();
    let (bridge, _loader) = started_bridge(&temp).await;

    let result = bridge.execute(None, "status 0", TIMEOUT).await.unwrap();
    assert!(result.lines.is_empty());
    assert_eq!(result.rendered, "```\n```");
}

#[tokio::test]
async fn test_vm_config_is_loaded_before_call() {
    let _serial = common::serial();
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("vm.cfg");
    std::fs::write(&config_path, "maxRuntime = 5").unwrap();

    let mut config = vmbridge_core::Config::default();
    config.module.path = temp.path().join("libcsqfvm.so");
    config.module.config_file = Some(config_path);
    let bridge = VmBridge::with_parts(config, FakeLoader::new(), RecordingRunner::new()).unwrap();
    bridge.start().await.unwrap();

    let result = bridge.execute(None, "config", TIMEOUT).await.unwrap();
    assert_eq!(result.text(), "maxRuntime = 5");
}

#[tokio::test]
async fn test_rejected_vm_config_skips_call() {
    let _serial = common::serial();
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("vm.cfg");
    std::fs::write(&config_path, "invalid").unwrap();

    let mut config = vmbridge_core::Config::default();
    config.module.path = temp.path().join("libcsqfvm.so");
    config.module.config_file = Some(config_path);
    let bridge = VmBridge::with_parts(config, FakeLoader::new(), RecordingRunner::new()).unwrap();
    bridge.start().await.unwrap();

    let result = bridge.execute(None, "1 + 1", TIMEOUT).await.unwrap();
    assert_eq!(result.status, -3);
    assert!(result.lines.is_empty());
    assert_eq!(common::instances_destroyed(), 1);
}

#[tokio::test]
async fn test_missing_vm_config_file() {
    let temp = TempDir::new().unwrap();
    let mut config = vmbridge_core::Config::default();
    config.module.config_file = Some(temp.path().join("missing.cfg"));

    let result = VmBridge::with_parts(config, FakeLoader::new(), RecordingRunner::new());
    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_executions_are_serialized() {
    let _serial = common::serial();
    let temp = TempDir::new().unwrap();
    let (bridge, _loader) = started_bridge(&temp).await;
    let bridge = Arc::new(bridge);

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move {
                let code = if i % 2 == 0 { "sleep 5" } else { "1 + 1" };
                bridge.execute(None, code, TIMEOUT).await
            })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().unwrap().is_success());
    }

    assert_eq!(common::max_concurrent_entries(), 1);
    assert_eq!(common::instances_created(), 16);
    assert_eq!(common::instances_destroyed(), 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_execution_still_completes() {
    let _serial = common::serial();
    let temp = TempDir::new().unwrap();
    let (bridge, _loader) = started_bridge(&temp).await;

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        bridge.execute(None, "sleep 200", TIMEOUT),
    )
    .await;
    assert!(abandoned.is_err());

    // Queues behind the abandoned call, which still runs to completion.
    let result = bridge.execute(None, "1 + 1", TIMEOUT).await.unwrap();
    assert_eq!(result.text(), "2");
    assert_eq!(common::instances_created(), 2);
    assert_eq!(common::instances_destroyed(), 2);
    assert_eq!(common::max_concurrent_entries(), 1);
}

#[tokio::test]
async fn test_unbounded_timeout() {
    let _serial = common::serial();
    let temp = TempDir::new().unwrap();
    let (bridge, _loader) = started_bridge(&temp).await;

    let result = bridge
        .execute(None, "1 + 1", Some(Duration::MAX))
        .await
        .unwrap();
    assert_eq!(result.text(), "2");
}

#[test]
fn test_out_of_range_default_timeout_rejected() {
    let mut config = vmbridge_core::Config::default();
    config.execution.default_timeout_secs = 1e30;

    let result = VmBridge::with_parts(config, FakeLoader::new(), RecordingRunner::new());
    assert!(matches!(result, Err(Error::Config(_))));
}
