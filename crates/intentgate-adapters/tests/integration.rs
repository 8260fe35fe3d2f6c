//! Integration tests for the intentgate-adapters crate.
//!
//! These exercise capabilities through the `Capability` trait object, the
//! way the registry and dispatcher hold them.

use std::sync::Arc;
use std::time::Duration;

use intentgate_adapters::{
    AdapterError, Capability, CapabilityDescriptor, CapabilitySource, FnCapability, Interpreter,
    ParameterSpec, ProcessCapability,
};
use serde_json::json;

// ═══════════════════════════════════════════════════════════════════════
//  Native capabilities
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn native_capability_behind_trait_object() {
    let capability: Arc<dyn Capability> = Arc::new(FnCapability::new(
        CapabilityDescriptor::new("search_marketplace", "Search listings")
            .with_parameter(ParameterSpec::required("query", "Search terms")),
        |params, _| async move { Ok(json!({"results": [], "query": params["query"]})) },
    ));

    assert_eq!(capability.source(), CapabilitySource::Native);
    let out = capability
        .invoke(json!({"query": "standing desk"}), None)
        .await
        .unwrap();
    assert_eq!(out["query"], "standing desk");
}

// ═══════════════════════════════════════════════════════════════════════
//  Process workers
// ═══════════════════════════════════════════════════════════════════════

#[cfg(unix)]
fn shell_worker(dir: &std::path::Path, file: &str, script: &str) -> Arc<dyn Capability> {
    let path = dir.join(file);
    std::fs::write(&path, script).unwrap();
    Arc::new(ProcessCapability::new(
        CapabilityDescriptor::new("figma_export", "Export a frame").with_credential(),
        &path,
        "export_frame",
        Interpreter::for_path(&path).unwrap(),
    ))
}

#[cfg(unix)]
#[tokio::test]
async fn worker_receives_injected_credential_in_params() {
    let dir = tempfile::tempdir().unwrap();
    let capability = shell_worker(
        dir.path(),
        "figma.sh",
        "input=$(cat)\ncase \"$input\" in\n  *figd_secret*) echo '{\"ok\": {\"authorized\": true}}' ;;\n  *) echo '{\"error\": \"missing token\", \"status\": 401}' ;;\nesac\n",
    );

    let ok = capability
        .invoke(json!({"frame": "1:2", "api_key": "figd_secret"}), None)
        .await
        .unwrap();
    assert_eq!(ok, json!({"authorized": true}));

    let denied = capability.invoke(json!({"frame": "1:2"}), None).await;
    assert!(matches!(
        denied,
        Err(AdapterError::Provider { status: Some(401), .. })
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn dropped_invocation_kills_worker() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("finished");
    let capability = shell_worker(
        dir.path(),
        "slow.sh",
        "cat > /dev/null\nsleep 2\ntouch finished\necho '{\"ok\": null}'\n",
    );

    let result = tokio::time::timeout(
        Duration::from_millis(200),
        capability.invoke(json!({}), None),
    )
    .await;
    assert!(result.is_err(), "slow worker should not finish in time");

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(!marker.exists(), "worker kept running after the caller gave up");
}

#[cfg(unix)]
#[tokio::test]
async fn missing_program_is_execution_failure() {
    let dir = tempfile::tempdir().unwrap();
    let capability = ProcessCapability::new(
        CapabilityDescriptor::new("ghost", "Not there"),
        dir.path().join("ghost"),
        "run",
        Interpreter::Direct,
    );

    let err = capability.invoke(json!({}), None).await.unwrap_err();
    assert!(matches!(err, AdapterError::ExecutionFailed { .. }));
}
