//! Validation result set

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::config::ConfigRecord;
use crate::error::PrereqError;
use crate::probe::{LatencyClass, ProbeKind};

/// Category of a validated entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Directory,
    StorageClass,
    Database,
    IdentityProvider,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::StorageClass => "storage_class",
            Self::Database => "database",
            Self::IdentityProvider => "identity_provider",
        }
    }

    /// Whether failures of this kind block applying artifacts
    #[must_use]
    pub const fn gates_apply(&self) -> bool {
        !matches!(self, Self::IdentityProvider)
    }
}

/// Key of one entry in the result set
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EntityKey {
    pub kind: EntityKind,

    /// Directory id, database id, storage class name or identity provider id
    pub name: String,
}

impl EntityKey {
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self { kind, name: name.into() }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(EntityKind::Directory, name)
    }

    pub fn database(name: impl Into<String>) -> Self {
        Self::new(EntityKind::Database, name)
    }

    pub fn storage_class(name: impl Into<String>) -> Self {
        Self::new(EntityKind::StorageClass, name)
    }

    pub fn identity_provider(name: impl Into<String>) -> Self {
        Self::new(EntityKind::IdentityProvider, name)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.as_str(), self.name)
    }
}

/// Outcome of validating one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityOutcome {
    pub passed: bool,

    /// One-line narration of what was checked
    pub detail: String,

    /// Remediation for failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_trip_ms: Option<u64>,

    /// Advisory only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencyClass>,
}

impl EntityOutcome {
    pub fn passed(detail: impl Into<String>) -> Self {
        Self { passed: true, detail: detail.into(), hint: None, round_trip_ms: None, latency: None }
    }

    pub fn failed(detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            passed: false,
            detail: detail.into(),
            hint: Some(hint.into()),
            round_trip_ms: None,
            latency: None,
        }
    }

    /// Failure derived from an error that stopped the check early
    #[must_use]
    pub fn from_error(error: &PrereqError) -> Self {
        Self::failed(error.message(), hint_for(error))
    }

    /// Attach a measured round trip and its latency rating
    #[must_use]
    pub fn with_round_trip(mut self, round_trip: Duration, kind: ProbeKind) -> Self {
        self.round_trip_ms = Some(u64::try_from(round_trip.as_millis()).unwrap_or(u64::MAX));
        self.latency = Some(LatencyClass::classify(round_trip, kind));
        self
    }
}

fn hint_for(error: &PrereqError) -> String {
    match error {
        PrereqError::MissingTool(tool) => format!("install missing tools: {tool}"),
        PrereqError::CertificateError(_) => {
            "check the certificate files under propertyFile/ssl-certs".to_string()
        }
        PrereqError::AuthenticationFailed(_) => "check the configured user name and password".to_string(),
        PrereqError::CommandFailed { .. } => {
            "see the log file for the full helper output".to_string()
        }
        PrereqError::ConnectionFailed(_) => "check that the server is reachable".to_string(),
        PrereqError::ConfigError(_) | PrereqError::InvalidInput(_) => {
            "check the property files under propertyFile".to_string()
        }
        PrereqError::PreflightFailed(_) => "resolve the reported deficiencies".to_string(),
    }
}

/// Every entity the run is expected to validate, in run order
///
/// Identity providers are advisory and not part of this set.
#[must_use]
pub fn expected_entities(record: &ConfigRecord) -> Vec<EntityKey> {
    let directories = record.directories.iter().map(|d| EntityKey::directory(&d.id));
    let storage = record.deployment.storage.distinct().into_iter().map(EntityKey::storage_class);
    let databases = record.databases.endpoints.iter().map(|e| EntityKey::database(&e.id));
    directories.chain(storage).chain(databases).collect()
}

/// Outcomes recorded so far
///
/// An entity is present only once its check has completed; absence means not attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResults {
    entries: BTreeMap<EntityKey, EntityOutcome>,
}

impl ValidationResults {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome, replacing any earlier one for the same entity
    pub fn record(&mut self, key: EntityKey, outcome: EntityOutcome) {
        self.entries.insert(key, outcome);
    }

    #[must_use]
    pub fn get(&self, key: &EntityKey) -> Option<&EntityOutcome> {
        self.entries.get(key)
    }

    /// Whether every expected entity has an outcome and every one passed
    #[must_use]
    pub fn all_passed(&self, expected: &[EntityKey]) -> bool {
        expected.iter().all(|key| self.entries.get(key).is_some_and(|o| o.passed))
    }

    /// Expected entities with no outcome yet
    #[must_use]
    pub fn missing<'a>(&self, expected: &'a [EntityKey]) -> Vec<&'a EntityKey> {
        expected.iter().filter(|key| !self.entries.contains_key(key)).collect()
    }

    /// Entries that failed, in key order
    pub fn failures(&self) -> impl Iterator<Item = (&EntityKey, &EntityOutcome)> {
        self.entries.iter().filter(|(_, outcome)| !outcome.passed)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityKey, &EntityOutcome)> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result set flattened for JSON output
#[derive(Debug, Clone, Serialize)]
pub struct ResultEntry<'a> {
    pub kind: EntityKind,
    pub name: &'a str,
    #[serde(flatten)]
    pub outcome: &'a EntityOutcome,
}

impl Serialize for ValidationResults {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.iter().map(|(key, outcome)| ResultEntry {
            kind: key.kind,
            name: &key.name,
            outcome,
        }))
    }
}
