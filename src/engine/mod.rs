//! Database Connectivity
//!
//! Each configured database (GCD, ICN, object stores) is checked by running the family's JDBC
//! connection helper through the [`CommandRunner`].
//!
//! # Families
//! The closed set [`DatabaseFamily`] carries everything that differs between engines: the helper
//! class, whether SSL needs a Java trust store, and the argument vector. Each family builds its
//! arguments in its own submodule; nothing is shared between them beyond the `java` prefix.
//!
//! # Scratch Material
//! DER certificates, trust stores and PKCS#8 keys derived for one database live in a
//! [`tempfile::TempDir`] owned by that validation call and are removed when it returns, whatever
//! the outcome.
//!
//! # PostgreSQL
//! PostgreSQL with SSL is not socket-probed first; the helper negotiates TLS itself. Without SSL,
//! and with the `native-postgres` feature and setting enabled, the check runs in-process with
//! `tokio-postgres` instead of the helper.

mod db2;
mod oracle;
pub mod postgres;
mod sqlserver;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::certs::{
    self, build_trust_store, convert_cert_to_der, convert_key_to_pkcs8_der,
    first_file_with_extension, postgres_material, StoreType, CERT_EXTENSIONS,
    DEFAULT_STORE_PASSWORD,
};
use crate::config::{DbEndpoint, SslMode, Workspace};
use crate::error::{PrereqError, Result};
use crate::probe::{check_reachable, ProbeKind};
use crate::process::{join_classpath, CommandRunner, Invocation};
use crate::validate::{EntityOutcome, ValidationContext};

/// Marker the helpers print before the measured round trip in milliseconds
pub const ROUND_TRIP_MARKER: &str = "Round Trip time:";

/// Supported database engine families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseFamily {
    Db2,
    Oracle,
    #[serde(rename = "sqlserver")]
    SqlServer,
    #[serde(rename = "postgresql")]
    Postgres,
}

impl DatabaseFamily {
    /// Value used in `DATABASE_TYPE`
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Db2 => "db2",
            Self::Oracle => "oracle",
            Self::SqlServer => "sqlserver",
            Self::Postgres => "postgresql",
        }
    }

    /// Folder name under the JDBC and helper jar directories
    #[must_use]
    pub const fn dir_name(&self) -> &'static str {
        self.as_str()
    }

    /// Main class of the connection helper
    #[must_use]
    pub const fn helper_class(&self) -> &'static str {
        match self {
            Self::Db2 => "DB2Connection",
            Self::Oracle => "OracleConnection",
            Self::SqlServer => "SQLConnection",
            Self::Postgres => "PostgresConnection",
        }
    }

    /// Whether SSL material must be wrapped in a PKCS#12 trust store for the helper
    #[must_use]
    pub const fn requires_trust_store(&self) -> bool {
        matches!(self, Self::Oracle | Self::SqlServer)
    }

    /// Alias under which the server certificate is imported
    #[must_use]
    pub fn trust_alias(&self) -> String {
        format!("cp4ba{}Certs", self.as_str().to_uppercase())
    }

    /// Build the helper invocation for one database
    pub fn build_probe_command(&self, request: &ProbeRequest<'_>) -> Result<Invocation> {
        let mut base = Invocation::new("java").args(["-Duser.language=en", "-Duser.country=US"]);
        if *self == Self::Postgres {
            base = base.arg("-Dcom.ibm.jsse2.overrideDefaultTLS=true");
        }
        let base = base.arg("-cp").arg(request.classpath.as_str()).arg(self.helper_class());

        match self {
            Self::Db2 => db2::probe_args(base, request),
            Self::Oracle => oracle::probe_args(base, request),
            Self::SqlServer => sqlserver::probe_args(base, request),
            Self::Postgres => postgres::probe_args(base, request),
        }
    }
}

impl fmt::Display for DatabaseFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DatabaseFamily {
    type Err = PrereqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "db2" => Ok(Self::Db2),
            "oracle" => Ok(Self::Oracle),
            "sqlserver" => Ok(Self::SqlServer),
            "postgresql" | "postgres" => Ok(Self::Postgres),
            other => Err(PrereqError::config_error(format!(
                "Unsupported DATABASE_TYPE '{other}' (expected db2, oracle, sqlserver or postgresql)"
            ))),
        }
    }
}

/// SSL material handed to a helper
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeTls {
    /// SSL disabled for the topology
    Disabled,

    /// CA certificate passed as a file (DB2)
    CaFile(PathBuf),

    /// Server certificate imported into a trust store (Oracle, SQL Server)
    TrustStore { path: PathBuf, store_type: StoreType, password: String },

    /// PostgreSQL `sslmode` with optional server CA and client identity
    Postgres { mode: SslMode, server_ca: Option<PathBuf>, client: Option<ClientIdentity> },
}

/// PostgreSQL client certificate and its PKCS#8 DER key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub key_der: PathBuf,
    pub cert: PathBuf,
}

/// Everything a family needs to build its helper invocation
#[derive(Debug, Clone)]
pub struct ProbeRequest<'a> {
    pub endpoint: &'a DbEndpoint,

    /// JDBC driver and helper jars joined with the platform separator
    pub classpath: String,

    pub tls: ProbeTls,
}

impl ProbeRequest<'_> {
    /// Server and port, required by every family except Oracle
    pub(crate) fn host_and_port(&self) -> Result<(&str, u16)> {
        match (self.endpoint.server.as_deref(), self.endpoint.port) {
            (Some(server), Some(port)) if !server.is_empty() => Ok((server, port)),
            _ => Err(PrereqError::invalid_input(format!(
                "{} needs DATABASE_SERVERNAME and DATABASE_PORT",
                self.endpoint.id
            ))),
        }
    }

    pub(crate) fn unexpected_tls(&self, family: DatabaseFamily) -> PrereqError {
        PrereqError::invalid_input(format!(
            "{family} helper cannot use the SSL material prepared for {}",
            self.endpoint.id
        ))
    }
}

/// Extract the helper-reported round trip from its standard output
///
/// The value after [`ROUND_TRIP_MARKER`] is read as milliseconds; a trailing unit is ignored.
#[must_use]
pub fn parse_round_trip(stdout: &str) -> Option<Duration> {
    let (_, rest) = stdout.split_once(ROUND_TRIP_MARKER)?;
    let number: String =
        rest.trim_start().chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
    let millis: f64 = number.parse().ok()?;
    Duration::try_from_secs_f64(millis / 1000.0).ok()
}

/// Jar files in `dir`, sorted by name
fn jars_in(dir: &Path) -> Vec<PathBuf> {
    certs::visible_files(dir)
        .into_iter()
        .filter(|p| p.extension().is_some_and(|e| e.eq_ignore_ascii_case("jar")))
        .collect()
}

/// JDBC driver jars followed by the connection-helper jars for `family`
pub fn helper_classpath(
    workspace: &Workspace,
    release: crate::config::ProductRelease,
    family: DatabaseFamily,
) -> Result<String> {
    let drivers = workspace.jdbc_dir(release, family);
    let helpers = workspace.connector_dir(family);

    let mut entries = jars_in(&drivers);
    if entries.is_empty() {
        return Err(PrereqError::config_error(format!(
            "No JDBC driver jar found in {}",
            drivers.display()
        )));
    }
    let connector = jars_in(&helpers);
    if connector.is_empty() {
        return Err(PrereqError::config_error(format!(
            "No connection helper jar found in {}",
            helpers.display()
        )));
    }
    entries.extend(connector);
    join_classpath(&entries)
}

/// Validate one configured database
///
/// Never fails: every problem becomes a failed [`EntityOutcome`] for `db_id`.
pub async fn validate_database<R: CommandRunner>(
    ctx: &ValidationContext<'_, R>,
    db_id: &str,
) -> EntityOutcome {
    match try_validate_database(ctx, db_id).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(database = %db_id, error = %e, "database validation failed");
            EntityOutcome::from_error(&e)
        }
    }
}

async fn try_validate_database<R: CommandRunner>(
    ctx: &ValidationContext<'_, R>,
    db_id: &str,
) -> Result<EntityOutcome> {
    let topology = &ctx.record.databases;
    let family = topology.family;
    let endpoint = ctx
        .record
        .database(db_id)
        .ok_or_else(|| PrereqError::invalid_input(format!("Unknown database id {db_id}")))?;
    let host = endpoint.display_host();

    let skip_socket_probe = family == DatabaseFamily::Postgres && topology.ssl_enabled;
    if !skip_socket_probe {
        let (probe_host, port) = endpoint.probe_target().ok_or_else(|| {
            PrereqError::invalid_input(format!("{db_id} has no server and port to probe"))
        })?;
        let probe = check_reachable(&probe_host, port, None, ctx.settings.connect_timeout()).await;
        if let Some(failure) = probe.failure {
            return Ok(EntityOutcome::failed(
                format!("Database server \"{probe_host}:{port}\" for {db_id} is unreachable: {failure}"),
                failure.hint(),
            ));
        }
    }

    #[cfg(feature = "native-postgres")]
    if family == DatabaseFamily::Postgres && !topology.ssl_enabled && ctx.settings.native_postgres {
        let round_trip = postgres::native_probe(endpoint, ctx.settings.connect_timeout()).await?;
        info!(database = %db_id, round_trip_ms = round_trip.as_millis(), "native PostgreSQL check passed");
        return Ok(EntityOutcome::passed(format!(
            "Checked DB connection for \"{}\" on database server \"{host}\"",
            endpoint.database
        ))
        .with_round_trip(round_trip, ProbeKind::Database));
    }

    let scratch = tempfile::Builder::new()
        .prefix(&format!("fncm-{}-", db_id.to_lowercase()))
        .tempdir()
        .map_err(|e| PrereqError::config_error(format!("Could not create scratch directory: {e}")))?;

    let tls = if topology.ssl_enabled {
        prepare_tls(ctx, family, endpoint, scratch.path()).await?
    } else {
        ProbeTls::Disabled
    };
    let classpath = helper_classpath(ctx.workspace, ctx.record.deployment.release, family)?;
    let request = ProbeRequest { endpoint, classpath, tls };
    let invocation = family.build_probe_command(&request)?;
    debug!(database = %db_id, command = %invocation, "invoking connection helper");

    let output = ctx.runner.run(&invocation).await?;
    if !output.success() {
        // Helper stack traces go to the log file only
        error!(database = %db_id, status = ?output.status, stderr = %output.stderr, "connection helper failed");
        return Ok(EntityOutcome::failed(
            format!("Unable to connect to database \"{}\" on database server \"{host}\"", endpoint.database),
            "check the settings for this database in fncm_db_server.toml",
        ));
    }

    let detail = format!(
        "Checked DB connection for \"{}\" on database server \"{host}\"",
        endpoint.database
    );
    info!(database = %db_id, "database connection passed");
    let outcome = EntityOutcome::passed(detail);
    Ok(match parse_round_trip(&output.stdout) {
        Some(round_trip) => outcome.with_round_trip(round_trip, ProbeKind::Database),
        None => {
            warn!(database = %db_id, "helper did not report a round trip time");
            outcome
        }
    })
}

/// Derive the SSL material a family's helper expects into `scratch`
async fn prepare_tls<R: CommandRunner>(
    ctx: &ValidationContext<'_, R>,
    family: DatabaseFamily,
    endpoint: &DbEndpoint,
    scratch: &Path,
) -> Result<ProbeTls> {
    let cert_dir = ctx.workspace.cert_dir(&endpoint.id);
    let server_cert = || {
        first_file_with_extension(&cert_dir, CERT_EXTENSIONS).ok_or_else(|| {
            PrereqError::certificate_error(format!("No certificate found in {}", cert_dir.display()))
        })
    };

    match family {
        DatabaseFamily::Db2 => Ok(ProbeTls::CaFile(server_cert()?)),
        DatabaseFamily::Oracle | DatabaseFamily::SqlServer => {
            let der = convert_cert_to_der(
                &server_cert()?,
                &scratch.join(format!("{}-db-cert.der", family.dir_name())),
            )?;
            let store = build_trust_store(
                ctx.runner,
                &der,
                &scratch.join(format!("{}-db-truststore.p12", family.dir_name())),
                &family.trust_alias(),
                StoreType::Pkcs12,
                DEFAULT_STORE_PASSWORD,
            )
            .await?;
            Ok(ProbeTls::TrustStore {
                path: store,
                store_type: StoreType::Pkcs12,
                password: DEFAULT_STORE_PASSWORD.to_string(),
            })
        }
        DatabaseFamily::Postgres => {
            let mode = ctx.record.databases.ssl_mode.unwrap_or(SslMode::Require);
            if mode == SslMode::Disable {
                return Ok(ProbeTls::Postgres { mode, server_ca: None, client: None });
            }
            let material = postgres_material(&cert_dir);
            let need = |part: Option<PathBuf>, name: &str| {
                part.ok_or_else(|| {
                    PrereqError::certificate_error(format!(
                        "No {name} material found under {}",
                        cert_dir.display()
                    ))
                })
            };

            if material.client_auth() {
                let key = need(material.client_key.clone(), "clientkey")?;
                let key_der = convert_key_to_pkcs8_der(&key, &scratch.join("postgresql-client-key.der"))?;
                let cert = need(material.client_cert.clone(), "clientcert")?;
                let server_ca = match mode {
                    SslMode::Require => None,
                    _ => Some(need(material.server_ca, "serverca")?),
                };
                Ok(ProbeTls::Postgres { mode, server_ca, client: Some(ClientIdentity { key_der, cert }) })
            } else {
                let server_ca = need(material.server_ca, "serverca")?;
                Ok(ProbeTls::Postgres { mode, server_ca: Some(server_ca), client: None })
            }
        }
    }
}
