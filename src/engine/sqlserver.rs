//! SQL Server helper arguments
//!
//! `SQLConnection -h HOST -p PORT -d NAME -u USER -pwd PASSWORD -ssl OPTIONS`
//!
//! With SSL the driver always runs with `encrypt=true;trustServerCertificate=true`; the trust
//! store is supplied but chain and hostname validation are left off. Without SSL the options are
//! `encrypt=false`.

use super::{DatabaseFamily, ProbeRequest, ProbeTls};
use crate::error::Result;
use crate::process::Invocation;

pub(super) fn probe_args(base: Invocation, request: &ProbeRequest<'_>) -> Result<Invocation> {
    let (host, port) = request.host_and_port()?;
    let endpoint = request.endpoint;
    let invocation = base
        .args(["-h", host, "-p"])
        .arg(port.to_string())
        .args(["-d", endpoint.database.as_str(), "-u", endpoint.username.as_str(), "-pwd"])
        .secret(endpoint.password.as_str())
        .arg("-ssl");

    match &request.tls {
        ProbeTls::Disabled => Ok(invocation.arg("encrypt=false")),
        ProbeTls::TrustStore { path, password, .. } => Ok(invocation.secret(format!(
            "encrypt=true;trustServerCertificate=true;trustStore={};trustStorePassword={password}",
            path.display()
        ))),
        _ => Err(request.unexpected_tls(DatabaseFamily::SqlServer)),
    }
}
