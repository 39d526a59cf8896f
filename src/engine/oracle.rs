//! Oracle helper arguments
//!
//! `OracleConnection -url JDBC_URL -u USER -pwd PASSWORD
//!  [-ssl -trustorefile STORE -trustoretype TYPE -trustorePwd STOREPASS]`
//!
//! Oracle endpoints are addressed by `ORACLE_JDBC_URL` alone; server and port may be absent.

use super::{DatabaseFamily, ProbeRequest, ProbeTls};
use crate::error::{PrereqError, Result};
use crate::process::Invocation;

pub(super) fn probe_args(base: Invocation, request: &ProbeRequest<'_>) -> Result<Invocation> {
    let endpoint = request.endpoint;
    let url = endpoint
        .oracle_jdbc_url
        .as_deref()
        .filter(|url| !url.is_empty())
        .ok_or_else(|| {
            PrereqError::invalid_input(format!("{} needs ORACLE_JDBC_URL", endpoint.id))
        })?;

    let invocation = base
        .args(["-url", url, "-u", endpoint.username.as_str(), "-pwd"])
        .secret(endpoint.password.as_str());

    match &request.tls {
        ProbeTls::Disabled => Ok(invocation),
        ProbeTls::TrustStore { path, store_type, password } => Ok(invocation
            .args(["-ssl", "-trustorefile"])
            .path_arg(path)
            .args(["-trustoretype", store_type.as_str(), "-trustorePwd"])
            .secret(password.as_str())),
        _ => Err(request.unexpected_tls(DatabaseFamily::Oracle)),
    }
}
