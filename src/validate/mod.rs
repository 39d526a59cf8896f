//! Validation Orchestration
//!
//! # Run Order
//! 1. [`assess`]: load the property documents, check the environment and the certificate folders.
//!    Any unfilled field, missing tool or certificate problem is a deficiency, and no validator
//!    runs while deficiencies remain.
//! 2. [`run_validation`]: directories, identity search, storage classes, databases, identity
//!    providers, one entity at a time. Every check records exactly one outcome; one entity failing
//!    never stops the others.
//!
//! # Gate
//! A run passes when every [`expected_entities`] key has a passing outcome. Identity search
//! findings and identity provider outcomes are reported but do not take part.

mod progress;
mod results;

pub use progress::{ConsoleProgress, Phase, Progress, ProgressEvent, RecordingProgress};
pub use results::{expected_entities, EntityKey, EntityKind, EntityOutcome, ResultEntry, ValidationResults};

use serde::Serialize;
use tracing::info;

use crate::certs::{check_certificates, CertificateIssue};
use crate::config::{load_record, ConfigRecord, LoadedConfig, RequiredField, Settings, Workspace};
use crate::engine::validate_database;
use crate::error::Result;
use crate::idp::validate_provider;
use crate::ldap::{self, DirectoryClient, DirectoryTarget, IdentityTally};
use crate::preflight::{check_environment, missing_tools_hint, Requirement};
use crate::process::CommandRunner;
use crate::storage::validate_storage_class;

/// Everything a validator needs, borrowed for the length of a run
pub struct ValidationContext<'a, R> {
    pub record: &'a ConfigRecord,
    pub workspace: &'a Workspace,
    pub settings: &'a Settings,
    pub runner: &'a R,
}

/// Problems that must be fixed before validation can start
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Deficiencies {
    pub required_fields: Vec<RequiredField>,
    pub requirements: Vec<Requirement>,
    pub certificates: Vec<CertificateIssue>,
}

impl Deficiencies {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.required_fields.is_empty() && self.requirements.is_empty() && self.certificates.is_empty()
    }

    /// One line per deficiency, for the terminal; missing tools share a single line
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let fields = self
            .required_fields
            .iter()
            .map(|field| format!("{}: {} is required", field.file, field.dotted()));
        let tools = missing_tools_hint(&self.requirements);
        let requirements = self
            .requirements
            .iter()
            .filter(|r| !matches!(r, Requirement::Tool { .. }))
            .map(|r| format!("{r}: {}", r.hint()));
        let certificates = self.certificates.iter().map(CertificateIssue::hint);
        fields.chain(tools).chain(requirements).chain(certificates).collect()
    }
}

/// Result of [`assess`]
#[derive(Debug, Clone)]
pub enum Assessment {
    Ready(ConfigRecord),
    Deficient(Deficiencies),
}

/// Load the configuration and look for deficiencies
///
/// Returns `Err` only when a property document is unreadable or malformed.
pub async fn assess<R: CommandRunner>(workspace: &Workspace, runner: &R) -> Result<Assessment> {
    match load_record(workspace)? {
        LoadedConfig::Incomplete(required_fields) => {
            let requirements = check_environment(runner, None).await;
            Ok(Assessment::Deficient(Deficiencies {
                required_fields,
                requirements,
                certificates: Vec::new(),
            }))
        }
        LoadedConfig::Complete(record) => {
            let deficiencies = Deficiencies {
                required_fields: Vec::new(),
                requirements: check_environment(runner, Some(record.deployment.release)).await,
                certificates: check_certificates(&record, workspace),
            };
            if deficiencies.is_empty() {
                Ok(Assessment::Ready(record))
            } else {
                Ok(Assessment::Deficient(deficiencies))
            }
        }
    }
}

/// Outcome of a completed validation run
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Whether every expected entity passed
    pub passed: bool,

    pub results: ValidationResults,

    /// Where each configured user and group was found
    pub identities: IdentityTally,

    #[serde(skip)]
    pub expected: Vec<EntityKey>,
}

/// Result of [`run`]
#[derive(Debug, Clone)]
pub enum Outcome {
    Deficient(Deficiencies),
    Completed(Report),
}

fn finish<P: Progress + ?Sized>(
    results: &mut ValidationResults,
    progress: &P,
    key: EntityKey,
    outcome: EntityOutcome,
) {
    progress.event(ProgressEvent::EntityFinished { key: key.clone(), outcome: outcome.clone() });
    results.record(key, outcome);
}

/// Run every validator against a deficiency-free configuration
pub async fn run_validation<R, C, P>(
    ctx: &ValidationContext<'_, R>,
    client: &C,
    progress: &P,
) -> Report
where
    R: CommandRunner,
    C: DirectoryClient,
    P: Progress + ?Sized,
{
    let record = ctx.record;
    let timeout = ctx.settings.connect_timeout();
    let mut results = ValidationResults::new();

    let targets = DirectoryTarget::resolve_all(record, ctx.workspace);
    progress.event(ProgressEvent::PhaseStarted { phase: Phase::Directories, total: targets.len() });
    let outcomes = ldap::validate_all(&targets, client, timeout, progress).await;
    let bound: Vec<DirectoryTarget<'_>> = targets
        .iter()
        .zip(&outcomes)
        .filter(|(_, (_, outcome))| outcome.passed)
        .map(|(target, _)| target.clone())
        .collect();
    for (key, outcome) in outcomes {
        results.record(key, outcome);
    }

    let identities = if record.identities.is_empty() || bound.is_empty() {
        IdentityTally::new(&record.identities)
    } else {
        progress.event(ProgressEvent::PhaseStarted {
            phase: Phase::Identities,
            total: record.identities.len(),
        });
        let tally = ldap::search_all(&bound, &record.identities, client).await;
        for (entry, status) in tally.warnings() {
            progress.event(ProgressEvent::IdentityWarning {
                name: entry.name.clone(),
                status,
                directories: entry.directories.clone(),
            });
        }
        tally
    };

    let classes = record.deployment.storage.distinct();
    progress.event(ProgressEvent::PhaseStarted { phase: Phase::StorageClasses, total: classes.len() });
    for class in classes {
        let key = EntityKey::storage_class(&class);
        progress.event(ProgressEvent::EntityStarted { key: key.clone() });
        let outcome = validate_storage_class(ctx, &class).await;
        finish(&mut results, progress, key, outcome);
    }

    let databases = record.databases.ids();
    progress.event(ProgressEvent::PhaseStarted { phase: Phase::Databases, total: databases.len() });
    for id in databases {
        let key = EntityKey::database(&id);
        progress.event(ProgressEvent::EntityStarted { key: key.clone() });
        let outcome = validate_database(ctx, &id).await;
        finish(&mut results, progress, key, outcome);
    }

    if !record.identity_providers.is_empty() {
        progress.event(ProgressEvent::PhaseStarted {
            phase: Phase::IdentityProviders,
            total: record.identity_providers.len(),
        });
        for provider in &record.identity_providers {
            let key = EntityKey::identity_provider(&provider.id);
            progress.event(ProgressEvent::EntityStarted { key: key.clone() });
            let outcome = validate_provider(provider, timeout).await;
            finish(&mut results, progress, key, outcome);
        }
    }

    let expected = expected_entities(record);
    let passed = results.all_passed(&expected);
    info!(passed, checked = results.len(), "validation finished");
    Report { passed, results, identities, expected }
}

/// Assess, then validate when nothing is deficient
pub async fn run<R, C, P>(
    workspace: &Workspace,
    settings: &Settings,
    runner: &R,
    client: &C,
    progress: &P,
) -> Result<Outcome>
where
    R: CommandRunner,
    C: DirectoryClient,
    P: Progress + ?Sized,
{
    let record = match assess(workspace, runner).await? {
        Assessment::Deficient(deficiencies) => return Ok(Outcome::Deficient(deficiencies)),
        Assessment::Ready(record) => record,
    };
    let ctx = ValidationContext { record: &record, workspace, settings, runner };
    Ok(Outcome::Completed(run_validation(&ctx, client, progress).await))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{
        DbEndpoint, DbTopology, Deployment, Identity, LdapServer, ProductRelease, StorageTiers,
    };
    use crate::engine::DatabaseFamily;
    use crate::preflight::Tool;
    use crate::process::{CommandOutput, Invocation};

    /// A minimal DB2 record with one directory and one storage class
    pub(crate) fn fixture() -> (ConfigRecord, Workspace) {
        let record = ConfigRecord {
            databases: DbTopology {
                family: DatabaseFamily::Db2,
                ssl_enabled: false,
                ssl_mode: None,
                endpoints: vec![DbEndpoint {
                    id: "GCD".into(),
                    server: Some("127.0.0.1".into()),
                    port: Some(50000),
                    database: "GCDDB".into(),
                    username: "db2inst1".into(),
                    password: "secret".into(),
                    oracle_jdbc_url: None,
                }],
            },
            directories: vec![LdapServer {
                id: "LDAP".into(),
                kind: None,
                server: "127.0.0.1".into(),
                port: 389,
                ssl_enabled: false,
                bind_dn: "cn=admin".into(),
                bind_password: "secret".into(),
                base_dn: "dc=example,dc=com".into(),
                group_base_dn: None,
                user_filter: None,
                group_filter: None,
            }],
            deployment: Deployment {
                release: ProductRelease::V5_5_12,
                platform: Some("OCP".into()),
                storage: StorageTiers {
                    slow: "nfs-client".into(),
                    medium: "nfs-client".into(),
                    fast: "nfs-client".into(),
                },
            },
            identity_providers: Vec::new(),
            identities: vec![Identity::user("ceadmin")],
        };
        (record, Workspace::new(std::env::temp_dir()))
    }

    struct NothingInstalled;

    impl CommandRunner for NothingInstalled {
        async fn run(&self, _invocation: &Invocation) -> Result<CommandOutput> {
            Ok(CommandOutput::failed(1, ""))
        }
    }

    #[test]
    fn test_deficiency_lines() {
        let deficiencies = Deficiencies {
            required_fields: vec![RequiredField {
                file: "fncm_db_server.toml".into(),
                path: vec!["GCD".into(), "DATABASE_PASSWORD".into()],
            }],
            requirements: vec![
                Requirement::Tool { tool: Tool::Keytool },
                Requirement::JavaVersion { required: 17, found: Some(11) },
                Requirement::Tool { tool: Tool::Java },
            ],
            certificates: Vec::new(),
        };
        assert!(!deficiencies.is_empty());
        assert_eq!(
            deficiencies.lines(),
            vec![
                "fncm_db_server.toml: GCD.DATABASE_PASSWORD is required".to_string(),
                "install missing tools: keytool, java".to_string(),
                "Java 17 is required, found Java 11: install Java 17 and put it first on the PATH".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_assess_reports_unfilled_fields_and_tools() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        let props = workspace.property_dir();
        std::fs::create_dir_all(&props).unwrap();
        std::fs::write(
            props.join("fncm_db_server.toml"),
            "DATABASE_TYPE = \"db2\"\n[GCD]\nDATABASE_NAME = \"GCDDB\"\nDATABASE_USERNAME = \"u\"\nDATABASE_PASSWORD = \"<Required>\"\n",
        )
        .unwrap();
        std::fs::write(props.join("fncm_ldap_server.toml"), "[LDAP]\nLDAP_SERVER = \"\"\n").unwrap();
        std::fs::write(props.join("fncm_deployment.toml"), "FNCM_Version = \"5.5.12\"\n").unwrap();

        let Assessment::Deficient(deficiencies) = assess(&workspace, &NothingInstalled).await.unwrap() else {
            panic!("expected deficiencies");
        };
        let fields: Vec<String> = deficiencies.required_fields.iter().map(RequiredField::dotted).collect();
        assert_eq!(fields, vec!["GCD.DATABASE_PASSWORD", "LDAP.LDAP_SERVER"]);
        assert_eq!(deficiencies.requirements.len(), 3);
    }
}
