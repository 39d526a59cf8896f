//! `PostgreSQL` Connectivity
//!
//! # Helper Arguments
//! `PostgresConnection -h HOST -p PORT -db NAME -u USER -pwd PASSWORD -sslmode MODE
//!  [-ca SERVER_CA] [-clientkey KEY_DER -clientcert CLIENT_CERT]`
//!
//! Client authentication is chosen when `clientcert/` holds a file. In that case `-ca` is only
//! passed when the mode is not `require`. The server CA stays in PEM form; only the client key is
//! re-encoded (PKCS#8 DER).
//!
//! # Native Check
//! With the `native-postgres` feature, [`native_probe`] connects with `tokio-postgres` and runs
//! `SELECT 1`. Only used for endpoints without SSL.

use super::{DatabaseFamily, ProbeRequest, ProbeTls};
use crate::error::Result;
use crate::process::Invocation;

#[cfg(feature = "native-postgres")]
use crate::config::DbEndpoint;
#[cfg(feature = "native-postgres")]
use crate::error::PrereqError;
#[cfg(feature = "native-postgres")]
use std::time::{Duration, Instant};
#[cfg(feature = "native-postgres")]
use tokio_postgres::{error::SqlState, Config, NoTls};

pub(super) fn probe_args(base: Invocation, request: &ProbeRequest<'_>) -> Result<Invocation> {
    let (host, port) = request.host_and_port()?;
    let endpoint = request.endpoint;
    let invocation = base
        .args(["-h", host, "-p"])
        .arg(port.to_string())
        .args(["-db", endpoint.database.as_str(), "-u", endpoint.username.as_str(), "-pwd"])
        .secret(endpoint.password.as_str())
        .arg("-sslmode");

    match &request.tls {
        ProbeTls::Disabled => Ok(invocation.arg("disable")),
        ProbeTls::Postgres { mode, server_ca, client } => {
            let mut invocation = invocation.arg(mode.as_str());
            if let Some(ca) = server_ca {
                invocation = invocation.arg("-ca").path_arg(ca);
            }
            if let Some(identity) = client {
                invocation = invocation
                    .arg("-clientkey")
                    .path_arg(&identity.key_der)
                    .arg("-clientcert")
                    .path_arg(&identity.cert);
            }
            Ok(invocation)
        }
        _ => Err(request.unexpected_tls(DatabaseFamily::Postgres)),
    }
}

/// Connect with `tokio-postgres` and run `SELECT 1`, returning the elapsed time
///
/// Rejected credentials map to [`PrereqError::AuthenticationFailed`]; anything else to
/// [`PrereqError::ConnectionFailed`].
#[cfg(feature = "native-postgres")]
pub async fn native_probe(endpoint: &DbEndpoint, timeout: Duration) -> Result<Duration> {
    let pg_config = build_pg_config(endpoint, timeout)?;
    let started = Instant::now();

    let (client, connection) = pg_config.connect(NoTls).await.map_err(|e| {
        let rejected = e.code().is_some_and(|code| {
            *code == SqlState::INVALID_PASSWORD
                || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION
        });
        if rejected {
            PrereqError::authentication_failed(format!(
                "PostgreSQL rejected the credentials for {}",
                endpoint.id
            ))
        } else {
            PrereqError::connection_failed(format!("Failed to connect to PostgreSQL: {e}"))
        }
    })?;

    // Connection errors are not logged to prevent credential leakage
    tokio::spawn(async move {
        let _ = connection.await;
    });

    client.query_one("SELECT 1", &[]).await.map_err(|e| {
        PrereqError::connection_failed(format!("Failed to query PostgreSQL: {e}"))
    })?;
    Ok(started.elapsed())
}

/// Build `tokio-postgres` config from a database endpoint
#[cfg(feature = "native-postgres")]
fn build_pg_config(endpoint: &DbEndpoint, timeout: Duration) -> Result<Config> {
    let host = endpoint
        .server
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PrereqError::invalid_input("PostgreSQL requires DATABASE_SERVERNAME"))?;

    let port = endpoint
        .port
        .ok_or_else(|| PrereqError::invalid_input("PostgreSQL requires DATABASE_PORT"))?;

    let mut pg_config = Config::new();
    pg_config
        .host(host)
        .port(port)
        .user(&endpoint.username)
        .password(&endpoint.password)
        .dbname(&endpoint.database)
        .connect_timeout(timeout);

    Ok(pg_config)
}

#[cfg(test)]
mod tests {
    use super::super::tests::endpoint;
    use super::super::ClientIdentity;
    use super::*;
    use crate::config::SslMode;
    use std::path::PathBuf;

    fn pg_request(tls: ProbeTls) -> Vec<String> {
        let mut endpoint = endpoint();
        endpoint.port = Some(5432);
        endpoint.database = "gcddb".into();
        let request = ProbeRequest { endpoint: &endpoint, classpath: "cp".into(), tls };
        probe_args(Invocation::new("java"), &request).unwrap().args
    }

    #[test]
    fn test_plain_connection_uses_disable() {
        let args = pg_request(ProbeTls::Disabled);
        assert_eq!(args[args.len() - 2..], ["-sslmode", "disable"]);
    }

    #[test]
    fn test_require_with_client_auth_omits_ca() {
        let args = pg_request(ProbeTls::Postgres {
            mode: SslMode::Require,
            server_ca: None,
            client: Some(ClientIdentity {
                key_der: PathBuf::from("/tmp/k.der"),
                cert: PathBuf::from("/certs/gcd/clientcert/client.crt"),
            }),
        });
        let tail: Vec<&str> = args.iter().skip_while(|a| *a != "-sslmode").map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "-sslmode",
                "require",
                "-clientkey",
                "/tmp/k.der",
                "-clientcert",
                "/certs/gcd/clientcert/client.crt"
            ]
        );
    }

    #[test]
    fn test_verify_full_server_auth() {
        let args = pg_request(ProbeTls::Postgres {
            mode: SslMode::VerifyFull,
            server_ca: Some(PathBuf::from("/certs/gcd/serverca/ca.crt")),
            client: None,
        });
        let tail: Vec<&str> = args.iter().skip_while(|a| *a != "-sslmode").map(String::as_str).collect();
        assert_eq!(tail, vec!["-sslmode", "verify-full", "-ca", "/certs/gcd/serverca/ca.crt"]);
    }

    #[cfg(feature = "native-postgres")]
    #[test]
    fn test_build_pg_config_requires_server() {
        let mut endpoint = endpoint();
        endpoint.server = None;
        let err = build_pg_config(&endpoint, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
    }

    #[cfg(feature = "native-postgres")]
    #[test]
    fn test_build_pg_config_sets_fields() {
        let endpoint = endpoint();
        let config = build_pg_config(&endpoint, Duration::from_secs(3)).unwrap();
        assert_eq!(config.get_ports(), &[50000]);
        assert_eq!(config.get_dbname(), Some("GCDDB"));
        assert_eq!(config.get_connect_timeout(), Some(&Duration::from_secs(3)));
    }

    #[cfg(feature = "native-postgres")]
    #[tokio::test]
    #[ignore = "Requires running PostgreSQL instance"]
    async fn test_native_probe_against_local_server() {
        let mut endpoint = endpoint();
        endpoint.server = Some("localhost".into());
        endpoint.port = Some(5432);
        endpoint.username = "postgres".into();
        endpoint.password = "postgres".into();
        endpoint.database = "postgres".into();
        let round_trip = native_probe(&endpoint, Duration::from_secs(5)).await.unwrap();
        assert!(round_trip > Duration::ZERO);
    }
}
