//! Cluster CLI wrappers
//!
//! Every cluster interaction goes through `kubectl` run by a [`CommandRunner`]. Listing commands ask
//! for `-o json` and decode only the fields they need.

use serde::Deserialize;
use std::path::Path;
use tracing::debug;

use crate::error::{PrereqError, Result};
use crate::process::{CommandRunner, Invocation};

/// PVC phase reported once a volume is attached to the claim
pub const BOUND_PHASE: &str = "Bound";

const KUBECTL: &str = "kubectl";

#[derive(Debug, Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<Object>,
}

#[derive(Debug, Deserialize)]
struct Object {
    metadata: ObjectMeta,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Claim {
    #[serde(default)]
    status: Option<ClaimStatus>,
}

#[derive(Debug, Deserialize)]
struct ClaimStatus {
    #[serde(default)]
    phase: Option<String>,
}

fn kubectl(namespace: Option<&str>) -> Invocation {
    let invocation = Invocation::new(KUBECTL);
    match namespace {
        Some(namespace) => invocation.args(["-n", namespace]),
        None => invocation,
    }
}

/// `kubectl apply -f FILE`
pub async fn apply_file<R: CommandRunner>(
    runner: &R,
    manifest: &Path,
    namespace: Option<&str>,
) -> Result<()> {
    let invocation = kubectl(namespace).arg("apply").arg("-f").path_arg(manifest);
    runner.run(&invocation).await?.into_result(KUBECTL)?;
    debug!(manifest = %manifest.display(), "applied");
    Ok(())
}

/// `kubectl delete -f FILE`; deleting something already gone is not an error
pub async fn delete_file<R: CommandRunner>(
    runner: &R,
    manifest: &Path,
    namespace: Option<&str>,
) -> Result<()> {
    let invocation = kubectl(namespace)
        .arg("delete")
        .arg("-f")
        .path_arg(manifest)
        .arg("--ignore-not-found=true");
    runner.run(&invocation).await?.into_result(KUBECTL)?;
    debug!(manifest = %manifest.display(), "deleted");
    Ok(())
}

/// Names of every storage class in the cluster
pub async fn storage_class_names<R: CommandRunner>(runner: &R) -> Result<Vec<String>> {
    let invocation = Invocation::new(KUBECTL).args(["get", "storageclass", "-o", "json"]);
    let output = runner.run(&invocation).await?.into_result(KUBECTL)?;
    let list: ObjectList = serde_json::from_str(&output.stdout).map_err(|e| {
        PrereqError::command_failed(KUBECTL, format!("Unexpected storage class listing: {e}"))
    })?;
    Ok(list.items.into_iter().map(|item| item.metadata.name).collect())
}

/// Current phase of a claim, `None` while the cluster has not reported one
pub async fn pvc_phase<R: CommandRunner>(
    runner: &R,
    name: &str,
    namespace: Option<&str>,
) -> Result<Option<String>> {
    let invocation = kubectl(namespace).args(["get", "pvc", name, "-o", "json"]);
    let output = runner.run(&invocation).await?.into_result(KUBECTL)?;
    let claim: Claim = serde_json::from_str(&output.stdout).map_err(|e| {
        PrereqError::command_failed(KUBECTL, format!("Unexpected claim description: {e}"))
    })?;
    Ok(claim.status.and_then(|status| status.phase))
}

/// Whether the current context can list pods, i.e. the operator is logged in
pub async fn cluster_reachable<R: CommandRunner>(runner: &R) -> bool {
    let invocation = Invocation::new(KUBECTL).args(["get", "pods"]);
    runner.run(&invocation).await.is_ok_and(|output| output.success())
}
