//! Identity provider reachability
//!
//! Each configured provider's discovery endpoint (token endpoint as fallback) is probed with the
//! network latency thresholds. `https` endpoints complete a TLS handshake without certificate
//! verification. These outcomes are advisory and never gate applying artifacts.

use std::time::Duration;
use tracing::info;
use url::Url;

use crate::config::IdentityProvider;
use crate::error::{PrereqError, Result};
use crate::probe::{check_reachable, ProbeKind, TlsMaterial};
use crate::validate::EntityOutcome;

/// Host, port and whether TLS is used for an endpoint URL
pub fn endpoint_target(endpoint: &str) -> Result<(String, u16, bool)> {
    let url = Url::parse(endpoint)
        .map_err(|e| PrereqError::invalid_input(format!("Invalid endpoint URL {endpoint}: {e}")))?;
    let secure = match url.scheme() {
        "https" => true,
        "http" => false,
        other => {
            return Err(PrereqError::invalid_input(format!(
                "Unsupported scheme '{other}' in {endpoint}"
            )))
        }
    };
    let host = url
        .host_str()
        .ok_or_else(|| PrereqError::invalid_input(format!("No host in {endpoint}")))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    let port = url
        .port_or_known_default()
        .ok_or_else(|| PrereqError::invalid_input(format!("No port in {endpoint}")))?;
    Ok((host, port, secure))
}

/// Probe one provider's endpoint
pub async fn validate_provider(provider: &IdentityProvider, timeout: Duration) -> EntityOutcome {
    let Some(endpoint) = provider.endpoint() else {
        return EntityOutcome::failed(
            format!("{} has no DISCOVERY_ENDPOINT or TOKEN_ENDPOINT", provider.id),
            "check fncm_identity_provider.toml",
        );
    };
    let (host, port, secure) = match endpoint_target(endpoint) {
        Ok(target) => target,
        Err(e) => return EntityOutcome::from_error(&e),
    };

    let material = secure.then(TlsMaterial::handshake_only);
    let probe = check_reachable(&host, port, material.as_ref(), timeout).await;
    match probe.failure {
        None => {
            info!(provider = %provider.id, %endpoint, "identity provider reachable");
            EntityOutcome::passed(format!("Reached identity provider endpoint \"{endpoint}\""))
                .with_round_trip(probe.round_trip, ProbeKind::Network)
        }
        Some(failure) => EntityOutcome::failed(
            format!("Unable to reach identity provider endpoint \"{endpoint}\": {failure}"),
            failure.hint(),
        ),
    }
}
