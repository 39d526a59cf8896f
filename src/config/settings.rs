//! Run settings
//!
//! Tuning knobs that are not part of the deployment itself: PVC polling budget, timeouts,
//! log location.
//!
//! # Resolution Precedence
//! 1. Command-line overrides (highest priority)
//! 2. Explicit `--settings` file
//! 3. Local file (`.fncm-prereq/settings.json` under the workspace root)
//! 4. Global file (`<config dir>/fncm-prereq/settings.json`)
//! 5. Built-in defaults

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PrereqError, Result};

/// Fully resolved settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    /// Number of PVC phase checks before giving up
    pub pvc_attempts: u32,

    /// Seconds between PVC phase checks
    pub pvc_interval_secs: u64,

    /// Name of the throwaway claim
    pub pvc_name: String,

    /// Namespace for the claim; `None` uses the current kubectl context
    pub namespace: Option<String>,

    /// Socket connect/handshake timeout in seconds
    pub connect_timeout_secs: u64,

    /// Kill external helpers after this many seconds; `None` waits indefinitely
    pub command_timeout_secs: Option<u64>,

    /// File receiving the full debug log
    pub log_file: PathBuf,

    /// Use the native PostgreSQL client instead of the JDBC helper where possible
    pub native_postgres: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pvc_attempts: 30,
            pvc_interval_secs: 10,
            pvc_name: "fncm-test-pvc".to_string(),
            namespace: None,
            connect_timeout_secs: 10,
            command_timeout_secs: None,
            log_file: PathBuf::from("prerequisites.log"),
            native_postgres: false,
        }
    }
}

impl Settings {
    #[must_use]
    pub const fn pvc_interval(&self) -> Duration {
        Duration::from_secs(self.pvc_interval_secs)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    /// Apply every field present in `layer`
    pub fn apply(&mut self, layer: SettingsLayer) {
        if let Some(v) = layer.pvc_attempts {
            self.pvc_attempts = v;
        }
        if let Some(v) = layer.pvc_interval_secs {
            self.pvc_interval_secs = v;
        }
        if let Some(v) = layer.pvc_name {
            self.pvc_name = v;
        }
        if layer.namespace.is_some() {
            self.namespace = layer.namespace;
        }
        if let Some(v) = layer.connect_timeout_secs {
            self.connect_timeout_secs = v;
        }
        if layer.command_timeout_secs.is_some() {
            self.command_timeout_secs = layer.command_timeout_secs;
        }
        if let Some(v) = layer.log_file {
            self.log_file = v;
        }
        if let Some(v) = layer.native_postgres {
            self.native_postgres = v;
        }
    }
}

/// A partial settings document; absent fields fall through to lower layers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsLayer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pvc_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pvc_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pvc_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_postgres: Option<bool>,
}

/// Get path to the local settings file under `root`
#[must_use]
pub fn local_settings_path(root: &Path) -> PathBuf {
    root.join(".fncm-prereq").join("settings.json")
}

/// Get path to the global settings file (`~/.config/fncm-prereq/settings.json` on Linux)
pub fn global_settings_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| PrereqError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("fncm-prereq").join("settings.json"))
}

/// Load one settings layer; a missing file is an empty layer
pub fn load_layer(path: &Path) -> Result<SettingsLayer> {
    if !path.exists() {
        return Ok(SettingsLayer::default());
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        PrereqError::config_error(format!("Could not read settings file {}: {e}", path.display()))
    })?;

    serde_json::from_str(&contents).map_err(|e| {
        PrereqError::config_error(format!("Invalid settings file {}: {e}", path.display()))
    })
}

/// Resolve settings with precedence (see module docs)
///
/// # Parameters
/// - `root`: Workspace root, used to locate the local settings file.
/// - `explicit`: Optional `--settings` file; unlike the implicit files it must exist.
/// - `overrides`: Values given on the command line.
pub fn resolve_settings(
    root: &Path,
    explicit: Option<&Path>,
    overrides: SettingsLayer,
) -> Result<Settings> {
    let mut settings = Settings::default();

    // A missing home directory only disables the global layer
    if let Ok(global) = global_settings_path() {
        settings.apply(load_layer(&global)?);
    }
    settings.apply(load_layer(&local_settings_path(root))?);

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(PrereqError::config_error(format!(
                "Settings file {} does not exist",
                path.display()
            )));
        }
        settings.apply(load_layer(path)?);
    }

    settings.apply(overrides);

    if settings.pvc_attempts == 0 {
        return Err(PrereqError::config_error("pvc_attempts must be at least 1"));
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_polling_budget() {
        let settings = Settings::default();
        assert_eq!(settings.pvc_attempts, 30);
        assert_eq!(settings.pvc_interval(), Duration::from_secs(10));
        assert_eq!(settings.pvc_name, "fncm-test-pvc");
        assert_eq!(settings.log_file, PathBuf::from("prerequisites.log"));
    }

    #[test]
    fn test_layer_overrides_only_present_fields() {
        let mut settings = Settings::default();
        settings.apply(SettingsLayer {
            pvc_attempts: Some(3),
            namespace: Some("fncm".into()),
            ..SettingsLayer::default()
        });
        assert_eq!(settings.pvc_attempts, 3);
        assert_eq!(settings.pvc_interval_secs, 10);
        assert_eq!(settings.namespace.as_deref(), Some("fncm"));
    }

    #[test]
    fn test_local_file_then_cli_override() {
        let dir = tempfile::tempdir().unwrap();
        let local = local_settings_path(dir.path());
        fs::create_dir_all(local.parent().unwrap()).unwrap();
        fs::write(&local, r#"{"pvc_attempts": 5, "pvc_interval_secs": 2}"#).unwrap();

        let overrides = SettingsLayer { pvc_interval_secs: Some(1), ..SettingsLayer::default() };
        let settings = resolve_settings(dir.path(), None, overrides).unwrap();
        assert_eq!(settings.pvc_attempts, 5);
        assert_eq!(settings.pvc_interval_secs, 1);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"pvc_attempt": 5}"#).unwrap();
        let err = load_layer(&path).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_explicit_settings_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        let err = resolve_settings(dir.path(), Some(&missing), SettingsLayer::default()).unwrap_err();
        assert!(err.message().contains("does not exist"));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = SettingsLayer { pvc_attempts: Some(0), ..SettingsLayer::default() };
        assert!(resolve_settings(dir.path(), None, overrides).is_err());
    }
}
