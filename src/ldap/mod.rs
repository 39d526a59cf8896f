//! Directory Validation
//!
//! Two checks run against every configured directory server:
//! 1. Reachability and bind ([`validate_all`]): a socket or TLS probe followed by an authenticated
//!    bind. A directory passes only when both succeed.
//! 2. Identity search ([`search_all`]): every user and group named by the configuration is looked
//!    up in every directory. The result is an [`IdentityTally`] that flags names found nowhere or
//!    in more than one directory. Tally findings are warnings; they never fail a directory.
//!
//! The directory protocol sits behind [`DirectoryClient`] so both checks can run against a
//! scripted directory in tests.

mod client;
mod tally;

pub use client::{LdapClient, LdapSession};
pub use tally::{IdentityStatus, IdentityTally, TallyEntry};

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::certs::{first_file_with_extension, CERT_EXTENSIONS};
use crate::config::{ConfigRecord, Identity, IdentityKind, LdapServer, Workspace};
use crate::error::{PrereqError, Result};
use crate::probe::{check_reachable, ProbeKind, TlsMaterial};
use crate::validate::{EntityKey, EntityOutcome, Progress, ProgressEvent};

/// Hint shown when a bind is rejected
pub const BIND_HINT: &str = "check LDAP_BIND_DN and LDAP_BIND_DN_PASSWORD";

/// Opens bound directory sessions
pub trait DirectoryClient: Send + Sync {
    type Session: DirectorySession;

    /// Connect to `server` and bind with its configured credentials
    ///
    /// `ca` is the only certificate trusted for `ldaps://` servers. Rejected credentials are
    /// reported as [`PrereqError::AuthenticationFailed`].
    fn connect(
        &self,
        server: &LdapServer,
        ca: Option<&Path>,
    ) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// A bound directory connection
pub trait DirectorySession: Send {
    /// Number of entries matching `filter` in the subtree under `base`
    fn count_matches(
        &mut self,
        base: &str,
        filter: &str,
    ) -> impl Future<Output = Result<usize>> + Send;

    /// Unbind and drop the connection
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// A directory plus the certificate it is validated with
#[derive(Debug, Clone)]
pub struct DirectoryTarget<'a> {
    pub server: &'a LdapServer,
    pub ca: Option<PathBuf>,
}

impl<'a> DirectoryTarget<'a> {
    /// Resolve every directory of `record` against its certificate folder
    ///
    /// SSL directories use the first certificate file in `ssl-certs/<id>/`.
    #[must_use]
    pub fn resolve_all(record: &'a ConfigRecord, workspace: &Workspace) -> Vec<Self> {
        record
            .directories
            .iter()
            .map(|server| {
                let ca = server
                    .ssl_enabled
                    .then(|| first_file_with_extension(&workspace.cert_dir(&server.id), CERT_EXTENSIONS))
                    .flatten();
                Self { server, ca }
            })
            .collect()
    }
}

/// Probe and bind one directory
pub async fn validate_directory<C: DirectoryClient>(
    target: &DirectoryTarget<'_>,
    client: &C,
    timeout: Duration,
) -> EntityOutcome {
    let server = target.server;
    let material = match tls_material(target) {
        Ok(material) => material,
        Err(e) => return EntityOutcome::from_error(&e),
    };

    let probe = check_reachable(&server.server, server.port, material.as_ref(), timeout).await;
    if let Some(failure) = &probe.failure {
        return EntityOutcome::failed(
            format!("Unable to reach LDAP server \"{}:{}\": {failure}", server.server, server.port),
            failure.hint(),
        );
    }

    match client.connect(server, target.ca.as_deref()).await {
        Ok(session) => {
            session.close().await;
            info!(directory = %server.id, "bind succeeded");
            EntityOutcome::passed(format!(
                "Connected to LDAP \"{}\" using BindDN \"{}\"",
                server.server, server.bind_dn
            ))
            .with_round_trip(probe.round_trip, ProbeKind::Network)
        }
        Err(PrereqError::AuthenticationFailed(detail)) => {
            warn!(directory = %server.id, %detail, "bind rejected");
            EntityOutcome::failed(
                format!("Unable to bind to LDAP server \"{}\" as \"{}\"", server.server, server.bind_dn),
                BIND_HINT,
            )
        }
        Err(e) => {
            warn!(directory = %server.id, error = %e, "directory connection failed");
            EntityOutcome::from_error(&e)
        }
    }
}

fn tls_material(target: &DirectoryTarget<'_>) -> Result<Option<TlsMaterial>> {
    if !target.server.ssl_enabled {
        return Ok(None);
    }
    let ca = target.ca.as_deref().ok_or_else(|| {
        PrereqError::certificate_error(format!("No certificate found for {}", target.server.id))
    })?;
    TlsMaterial::from_ca_file(ca).map(Some)
}

/// Probe and bind every directory, reporting each outcome as it completes
pub async fn validate_all<C, P>(
    targets: &[DirectoryTarget<'_>],
    client: &C,
    timeout: Duration,
    progress: &P,
) -> Vec<(EntityKey, EntityOutcome)>
where
    C: DirectoryClient,
    P: Progress + ?Sized,
{
    let mut outcomes = Vec::with_capacity(targets.len());
    for target in targets {
        let key = EntityKey::directory(&target.server.id);
        progress.event(ProgressEvent::EntityStarted { key: key.clone() });
        let outcome = validate_directory(target, client, timeout).await;
        progress.event(ProgressEvent::EntityFinished { key: key.clone(), outcome: outcome.clone() });
        outcomes.push((key, outcome));
    }
    outcomes
}

/// `(base, filter template)` pairs searched for one identity
fn searches_for<'s>(kind: IdentityKind, server: &'s LdapServer) -> Vec<(&'s str, &'s str)> {
    let user = (server.base_dn.as_str(), server.user_filter());
    let group = (server.group_base_dn(), server.group_filter());
    match kind {
        IdentityKind::User => vec![user],
        IdentityKind::Group => vec![group],
        IdentityKind::Either => vec![user, group],
    }
}

/// Substitute `%v` with the RFC 4515 escaped name
#[must_use]
pub fn render_filter(template: &str, name: &str) -> String {
    template.replace("%v", &ldap3::ldap_escape(name))
}

/// Search every identity in every directory and tally the hits
///
/// A directory that cannot be bound contributes no hits. A failed search for one identity is
/// logged and the remaining identities are still searched.
pub async fn search_all<C: DirectoryClient>(
    directories: &[DirectoryTarget<'_>],
    identities: &[Identity],
    client: &C,
) -> IdentityTally {
    let mut tally = IdentityTally::new(identities);

    for target in directories {
        let server = target.server;
        let mut session = match client.connect(server, target.ca.as_deref()).await {
            Ok(session) => session,
            Err(e) => {
                warn!(directory = %server.id, error = %e, "skipping identity search");
                continue;
            }
        };

        for identity in identities {
            for (base, template) in searches_for(identity.kind, server) {
                let filter = render_filter(template, &identity.name);
                match session.count_matches(base, &filter).await {
                    Ok(0) => {}
                    Ok(_) => {
                        tally = tally.with_hit(&identity.name, &server.id);
                        break;
                    }
                    Err(e) => {
                        warn!(directory = %server.id, identity = %identity.name, error = %e, "search failed");
                    }
                }
            }
        }
        session.close().await;
    }

    tally
}
