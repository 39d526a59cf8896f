//! Storage Class Validation and Artifact Application
//!
//! # Storage Classes
//! A storage class passes when a throwaway `ReadWriteMany` claim against it reaches `Bound`
//! within the polling budget (`pvc_attempts` checks, `pvc_interval_secs` apart). A class missing
//! from the cluster's storage class list fails without creating a claim. When the list itself
//! cannot be read the claim is attempted anyway.
//!
//! The claim manifest lives in a scratch directory owned by the check. The claim is deleted and the
//! manifest removed on every path out of [`validate_storage_class`].
//!
//! # Artifacts
//! After a passing run the generated secrets (and SSL secrets, when generated) can be applied, then
//! the custom resource. The custom resource is refused unless every expected entity passed.

use serde::Serialize;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::certs::visible_files;
use crate::config::Workspace;
use crate::error::{PrereqError, Result};
use crate::kubectl::{self, BOUND_PHASE};
use crate::process::CommandRunner;
use crate::validate::{EntityKey, EntityOutcome, ValidationContext, ValidationResults};

/// Hint for classes that are absent or never bind
pub const STORAGE_HINT: &str =
    "check SLOW/MEDIUM/FAST_FILE_STORAGE_CLASSNAME in fncm_deployment.toml and the provisioner";

/// Claim manifest requesting a small `ReadWriteMany` volume from `storage_class`
#[must_use]
pub fn pvc_manifest(name: &str, storage_class: &str, namespace: Option<&str>) -> serde_json::Value {
    let mut metadata = json!({ "name": name });
    if let Some(namespace) = namespace {
        metadata["namespace"] = json!(namespace);
    }
    json!({
        "apiVersion": "v1",
        "kind": "PersistentVolumeClaim",
        "metadata": metadata,
        "spec": {
            "accessModes": ["ReadWriteMany"],
            "resources": { "requests": { "storage": "1Gi" } },
            "storageClassName": storage_class,
        }
    })
}

/// Validate one storage class by binding a throwaway claim against it
pub async fn validate_storage_class<R: CommandRunner>(
    ctx: &ValidationContext<'_, R>,
    storage_class: &str,
) -> EntityOutcome {
    match kubectl::storage_class_names(ctx.runner).await {
        Ok(names) if !names.iter().any(|n| n == storage_class) => {
            warn!(%storage_class, "storage class not present in the cluster");
            return EntityOutcome::failed(
                format!("Storage class \"{storage_class}\" was not found in the cluster"),
                STORAGE_HINT,
            );
        }
        Ok(_) => {}
        Err(e) => warn!(%storage_class, error = %e, "could not list storage classes, trying a claim anyway"),
    }

    let scratch = match tempfile::Builder::new().prefix("fncm-pvc-").tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            return EntityOutcome::from_error(&PrereqError::config_error(format!(
                "Could not create scratch directory: {e}"
            )))
        }
    };
    let manifest = scratch.path().join(format!("{storage_class}.json"));
    let outcome = bind_claim(ctx, storage_class, &manifest).await;

    let namespace = ctx.settings.namespace.as_deref();
    if let Err(e) = kubectl::delete_file(ctx.runner, &manifest, namespace).await {
        error!(%storage_class, error = %e, "could not delete the test claim");
    }
    if let Err(e) = fs::remove_file(&manifest) {
        debug!(path = %manifest.display(), error = %e, "manifest already gone");
    }
    drop(scratch);
    outcome
}

async fn bind_claim<R: CommandRunner>(
    ctx: &ValidationContext<'_, R>,
    storage_class: &str,
    manifest: &Path,
) -> EntityOutcome {
    let settings = ctx.settings;
    let namespace = settings.namespace.as_deref();
    let document = pvc_manifest(&settings.pvc_name, storage_class, namespace);

    let written = serde_json::to_vec_pretty(&document)
        .map_err(|e| PrereqError::invalid_input(e.to_string()))
        .and_then(|bytes| {
            fs::write(manifest, bytes).map_err(|e| {
                PrereqError::config_error(format!("Could not write {}: {e}", manifest.display()))
            })
        });
    if let Err(e) = written {
        return EntityOutcome::from_error(&e);
    }

    if let Err(e) = kubectl::apply_file(ctx.runner, manifest, namespace).await {
        error!(%storage_class, error = %e, "could not create the test claim");
        return EntityOutcome::failed(
            format!("Unable to create a PVC with storage class \"{storage_class}\""),
            STORAGE_HINT,
        );
    }

    for attempt in 1..=settings.pvc_attempts {
        match kubectl::pvc_phase(ctx.runner, &settings.pvc_name, namespace).await {
            Ok(Some(phase)) if phase == BOUND_PHASE => {
                info!(%storage_class, attempt, "test claim bound");
                return EntityOutcome::passed(format!(
                    "Created a PVC with storage class \"{storage_class}\" and it reached Bound"
                ));
            }
            Ok(phase) => debug!(%storage_class, attempt, ?phase, "test claim not bound yet"),
            Err(e) => warn!(%storage_class, attempt, error = %e, "could not read the claim phase"),
        }
        if attempt < settings.pvc_attempts {
            tokio::time::sleep(settings.pvc_interval()).await;
        }
    }

    let waited = settings.pvc_interval_secs * u64::from(settings.pvc_attempts.saturating_sub(1));
    EntityOutcome::failed(
        format!("PVC with storage class \"{storage_class}\" did not reach Bound after {waited}s"),
        STORAGE_HINT,
    )
}

/// Manifests applied by one artifact step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub applied: Vec<PathBuf>,

    /// Manifests `kubectl` rejected, with its error output
    pub failed: Vec<(PathBuf, String)>,
}

impl ApplyReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    async fn apply<R: CommandRunner>(&mut self, runner: &R, manifest: PathBuf, namespace: Option<&str>) {
        match kubectl::apply_file(runner, &manifest, namespace).await {
            Ok(()) => {
                info!(manifest = %manifest.display(), "applied");
                self.applied.push(manifest);
            }
            Err(e) => {
                error!(manifest = %manifest.display(), error = %e, "apply failed");
                self.failed.push((manifest, e.message()));
            }
        }
    }
}

fn yaml_files(dir: &Path) -> Vec<PathBuf> {
    visible_files(dir)
        .into_iter()
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        })
        .collect()
}

/// Apply the generated secrets, then the SSL secrets when that folder exists
pub async fn apply_secrets<R: CommandRunner>(
    runner: &R,
    workspace: &Workspace,
    namespace: Option<&str>,
) -> ApplyReport {
    let mut report = ApplyReport::default();
    let mut folders = vec![workspace.secrets_dir()];
    let ssl = workspace.ssl_secrets_dir();
    if ssl.is_dir() {
        folders.push(ssl);
    }

    for folder in folders {
        let manifests = yaml_files(&folder);
        if manifests.is_empty() {
            info!(folder = %folder.display(), "no manifests to apply");
        }
        for manifest in manifests {
            report.apply(runner, manifest, namespace).await;
        }
    }
    report
}

/// Apply the custom resource when every expected entity passed
pub async fn apply_custom_resource<R: CommandRunner>(
    runner: &R,
    workspace: &Workspace,
    namespace: Option<&str>,
    results: &ValidationResults,
    expected: &[EntityKey],
) -> Result<ApplyReport> {
    if !results.all_passed(expected) {
        let pending: Vec<String> = expected
            .iter()
            .filter(|key| !results.get(key).is_some_and(|o| o.passed))
            .map(ToString::to_string)
            .collect();
        return Err(PrereqError::preflight_failed(format!(
            "Custom resource not applied, validation has not passed for: {}",
            pending.join(", ")
        )));
    }

    let mut report = ApplyReport::default();
    report.apply(runner, workspace.custom_resource(), namespace).await;
    Ok(report)
}
