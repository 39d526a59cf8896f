//! Directory client backed by `ldap3`
//!
//! TLS goes through `native-tls` with the built-in roots disabled: the supplied certificate is the
//! only trust anchor. Hostname checks are off, matching the reachability probe.

use ldap3::{LdapConnAsync, LdapConnSettings, LdapError, Scope};
use native_tls::{Certificate, Protocol, TlsConnector};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use super::{DirectoryClient, DirectorySession};
use crate::config::LdapServer;
use crate::error::{PrereqError, Result};

/// LDAP result code for rejected credentials
const INVALID_CREDENTIALS: u32 = 49;

/// Production [`DirectoryClient`]
#[derive(Debug, Clone)]
pub struct LdapClient {
    timeout: Duration,
}

impl LdapClient {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn settings(&self, ca: Option<&Path>) -> Result<LdapConnSettings> {
        let settings = LdapConnSettings::new().set_conn_timeout(self.timeout);
        let Some(ca) = ca else {
            return Ok(settings);
        };

        let pem = fs::read(ca).map_err(|e| {
            PrereqError::certificate_error(format!("Could not read {}: {e}", ca.display()))
        })?;
        let certificate = Certificate::from_pem(&pem).map_err(|e| {
            PrereqError::certificate_error(format!("{} is not a PEM certificate: {e}", ca.display()))
        })?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .disable_built_in_roots(true)
            .danger_accept_invalid_hostnames(true)
            .min_protocol_version(Some(Protocol::Tlsv12))
            .build()
            .map_err(|e| PrereqError::certificate_error(format!("Invalid TLS setup: {e}")))?;
        Ok(settings.set_connector(connector))
    }
}

/// An open, bound directory connection
pub struct LdapSession {
    ldap: ldap3::Ldap,
}

impl DirectoryClient for LdapClient {
    type Session = LdapSession;

    async fn connect(&self, server: &LdapServer, ca: Option<&Path>) -> Result<LdapSession> {
        let url = server.url();
        let settings = self.settings(ca)?;

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| PrereqError::connection_failed(format!("{url}: {e}")))?;
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "directory connection closed with an error");
            }
        });

        let bound = ldap.simple_bind(&server.bind_dn, &server.bind_password).await.and_then(|r| r.success());
        match bound {
            Ok(_) => {
                debug!(directory = %server.id, "bind succeeded");
                Ok(LdapSession { ldap })
            }
            Err(LdapError::LdapResult { result }) if result.rc == INVALID_CREDENTIALS => {
                let _ = ldap.unbind().await;
                Err(PrereqError::authentication_failed(format!(
                    "{url} rejected bind DN \"{}\"",
                    server.bind_dn
                )))
            }
            Err(e) => {
                let _ = ldap.unbind().await;
                Err(PrereqError::connection_failed(format!("{url}: {e}")))
            }
        }
    }
}

impl DirectorySession for LdapSession {
    async fn count_matches(&mut self, base: &str, filter: &str) -> Result<usize> {
        let (entries, _) = self
            .ldap
            .search(base, Scope::Subtree, filter, vec!["dn"])
            .await
            .and_then(|r| r.success())
            .map_err(|e| PrereqError::connection_failed(format!("search {filter} under {base}: {e}")))?;
        Ok(entries.len())
    }

    async fn close(mut self) {
        let _ = self.ldap.unbind().await;
    }
}
