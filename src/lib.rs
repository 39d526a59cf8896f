//! fncm-prereq - FileNet Content Manager Prerequisite Validation
//!
//! Checks that everything a FileNet Content Manager deployment depends on is in place before the
//! generated secrets and custom resource are applied to the cluster: directory servers accept the
//! bind credentials, the configured users and groups exist, storage classes provision volumes, and
//! every database accepts a connection through its JDBC driver.
//!
//! # Module Organization
//! - [`error`] - Error types and handling
//! - [`output`] - JSON output envelope types
//! - [`config`] - Property documents, typed record, run settings, workspace layout
//! - [`process`] - External command seam
//! - [`certs`] - Certificate classification, conversion and folder checks
//! - [`probe`] - TCP/TLS reachability and latency classes
//! - [`ldap`] - Directory bind and identity search
//! - [`engine`] - Database families and JDBC helper invocation
//! - [`kubectl`], [`storage`] - Cluster access, storage class checks, artifact application
//! - [`preflight`] - Local tool and Java version checks
//! - [`idp`] - Identity provider reachability
//! - [`validate`] - Orchestration and the result set
//! - [`logging`] - Subscriber setup for the binary

pub mod certs;
pub mod config;
pub mod engine;
pub mod error;
pub mod idp;
pub mod kubectl;
pub mod ldap;
pub mod logging;
pub mod output;
pub mod preflight;
pub mod probe;
pub mod process;
pub mod storage;
pub mod validate;

// Re-export commonly used types for convenience
pub use config::{load_record, resolve_settings, ConfigRecord, LoadedConfig, Settings, SettingsLayer, Workspace};
pub use engine::DatabaseFamily;
pub use error::{PrereqError, Result};
pub use ldap::{DirectoryClient, DirectorySession, IdentityStatus, IdentityTally, LdapClient};
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use process::{CommandOutput, CommandRunner, Invocation, SystemRunner};
pub use validate::{
    assess, run, run_validation, Assessment, ConsoleProgress, Deficiencies, EntityKey, EntityKind,
    EntityOutcome, Outcome, Progress, ProgressEvent, RecordingProgress, Report, ValidationContext,
    ValidationResults,
};
