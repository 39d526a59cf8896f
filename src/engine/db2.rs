//! DB2 helper arguments
//!
//! `DB2Connection -h HOST -p PORT -db NAME -u USER -pwd PASSWORD [-ssl -ca CERT]`

use super::{DatabaseFamily, ProbeRequest, ProbeTls};
use crate::error::Result;
use crate::process::Invocation;

pub(super) fn probe_args(base: Invocation, request: &ProbeRequest<'_>) -> Result<Invocation> {
    let (host, port) = request.host_and_port()?;
    let endpoint = request.endpoint;
    let invocation = base
        .args(["-h", host, "-p"])
        .arg(port.to_string())
        .args(["-db", endpoint.database.as_str(), "-u", endpoint.username.as_str(), "-pwd"])
        .secret(endpoint.password.as_str());

    match &request.tls {
        ProbeTls::Disabled => Ok(invocation),
        ProbeTls::CaFile(ca) => Ok(invocation.args(["-ssl", "-ca"]).path_arg(ca)),
        _ => Err(request.unexpected_tls(DatabaseFamily::Db2)),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::endpoint;
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_ssl_arguments() {
        let endpoint = endpoint();
        let request = ProbeRequest {
            endpoint: &endpoint,
            classpath: "cp".into(),
            tls: ProbeTls::CaFile(PathBuf::from("/certs/gcd/db2.crt")),
        };
        let invocation = probe_args(Invocation::new("java"), &request).unwrap();
        assert_eq!(
            invocation.args,
            vec![
                "-h", "db.example.com", "-p", "50000", "-db", "GCDDB", "-u", "db2inst1", "-pwd",
                "pa'ss word", "-ssl", "-ca", "/certs/gcd/db2.crt",
            ]
        );
    }

    #[test]
    fn test_trust_store_is_rejected() {
        let endpoint = endpoint();
        let request = ProbeRequest {
            endpoint: &endpoint,
            classpath: "cp".into(),
            tls: ProbeTls::TrustStore {
                path: PathBuf::from("x.p12"),
                store_type: crate::certs::StoreType::Pkcs12,
                password: "changeit".into(),
            },
        };
        assert!(probe_args(Invocation::new("java"), &request).is_err());
    }
}
