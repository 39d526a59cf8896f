//! TLS client configuration for reachability probes
//!
//! Trust is anchored on the certificates the operator supplied for an endpoint, never on the
//! system roots. A presented end certificate that is byte-identical to a supplied certificate is
//! accepted as is, so a self-signed server certificate works without being a CA. Hostname
//! mismatches are tolerated.

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{CertificateError, CipherSuite, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::{PrereqError, Result};

/// AEAD suites with forward secrecy; everything else is refused
const ALLOWED_SUITES: &[CipherSuite] = &[
    CipherSuite::TLS13_AES_256_GCM_SHA384,
    CipherSuite::TLS13_AES_128_GCM_SHA256,
    CipherSuite::TLS13_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
];

/// Certificates and optional client identity for one TLS probe
///
/// An empty trust list means the handshake is completed without verifying the server.
#[derive(Debug, Default)]
pub struct TlsMaterial {
    trusted: Vec<CertificateDer<'static>>,
    client_identity: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
}

impl TlsMaterial {
    /// Complete the handshake without verifying the server certificate
    #[must_use]
    pub fn handshake_only() -> Self {
        Self::default()
    }

    /// Trust exactly the given certificates
    #[must_use]
    pub fn from_certificates(trusted: Vec<CertificateDer<'static>>) -> Self {
        Self { trusted, client_identity: None }
    }

    /// Trust every certificate in a PEM file
    pub fn from_ca_file(path: &Path) -> Result<Self> {
        Ok(Self::from_certificates(read_certificates(path)?))
    }

    /// Present a client certificate chain and key during the handshake
    pub fn with_client_identity(mut self, cert_path: &Path, key_path: &Path) -> Result<Self> {
        let chain = read_certificates(cert_path)?;
        let bytes = read_bytes(key_path)?;
        let key = rustls_pemfile::private_key(&mut bytes.as_slice())
            .map_err(|e| {
                PrereqError::certificate_error(format!("{} is not valid PEM: {e}", key_path.display()))
            })?
            .ok_or_else(|| {
                PrereqError::certificate_error(format!(
                    "{} does not contain a private key",
                    key_path.display()
                ))
            })?;
        self.client_identity = Some((chain, key));
        Ok(self)
    }

    /// Whether the server certificate is checked against supplied material
    #[must_use]
    pub fn verifies_peer(&self) -> bool {
        !self.trusted.is_empty()
    }

    /// Build the client configuration for this material
    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut provider = rustls::crypto::ring::default_provider();
        provider.cipher_suites.retain(|suite| ALLOWED_SUITES.contains(&suite.suite()));
        let provider = Arc::new(provider);

        let verifier: Arc<dyn ServerCertVerifier> = if self.verifies_peer() {
            Arc::new(SuppliedCertVerifier::new(&self.trusted, Arc::clone(&provider))?)
        } else {
            Arc::new(HandshakeOnly { algorithms: provider.signature_verification_algorithms })
        };

        let builder = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])
            .map_err(|e| PrereqError::certificate_error(format!("Invalid TLS configuration: {e}")))?
            .dangerous()
            .with_custom_certificate_verifier(verifier);

        match &self.client_identity {
            Some((chain, key)) => builder
                .with_client_auth_cert(chain.clone(), key.clone_key())
                .map_err(|e| PrereqError::certificate_error(format!("Invalid client identity: {e}"))),
            None => Ok(builder.with_no_client_auth()),
        }
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        PrereqError::certificate_error(format!("Could not read {}: {e}", path.display()))
    })
}

fn read_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let bytes = read_bytes(path)?;
    let certs = rustls_pemfile::certs(&mut bytes.as_slice())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            PrereqError::certificate_error(format!("{} is not valid PEM: {e}", path.display()))
        })?;
    if certs.is_empty() {
        return Err(PrereqError::certificate_error(format!(
            "{} does not contain a PEM certificate",
            path.display()
        )));
    }
    Ok(certs)
}

/// Verifies against the supplied certificates only
#[derive(Debug)]
struct SuppliedCertVerifier {
    supplied: Vec<CertificateDer<'static>>,
    inner: Arc<WebPkiServerVerifier>,
}

impl SuppliedCertVerifier {
    fn new(supplied: &[CertificateDer<'static>], provider: Arc<CryptoProvider>) -> Result<Self> {
        let mut roots = RootCertStore::empty();
        for cert in supplied {
            // A leaf that cannot act as an anchor is still matched byte for byte
            let _ = roots.add(cert.clone());
        }
        if roots.is_empty() {
            return Err(PrereqError::certificate_error(
                "None of the supplied certificates can be used as a trust anchor",
            ));
        }

        let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
            .build()
            .map_err(|e| PrereqError::certificate_error(format!("Could not build verifier: {e}")))?;
        Ok(Self { supplied: supplied.to_vec(), inner })
    }
}

impl ServerCertVerifier for SuppliedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        if self.supplied.iter().any(|cert| cert.as_ref() == end_entity.as_ref()) {
            return Ok(ServerCertVerified::assertion());
        }

        match self.inner.verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now) {
            Err(rustls::Error::InvalidCertificate(
                CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. },
            )) => Ok(ServerCertVerified::assertion()),
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Accepts any server certificate; handshake signatures are still checked
#[derive(Debug)]
struct HandshakeOnly {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for HandshakeOnly {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suites_are_restricted() {
        let certified = rcgen::generate_simple_self_signed(vec!["ldap".to_string()]).unwrap();
        let material = TlsMaterial::from_certificates(vec![certified.cert.der().clone()]);
        let config = material.client_config().unwrap();
        assert!(config
            .crypto_provider()
            .cipher_suites
            .iter()
            .all(|suite| ALLOWED_SUITES.contains(&suite.suite())));
    }

    #[test]
    fn test_handshake_only_does_not_verify() {
        assert!(!TlsMaterial::handshake_only().verifies_peer());
        assert!(TlsMaterial::handshake_only().client_config().is_ok());
    }

    #[test]
    fn test_from_ca_file_rejects_key() {
        let certified = rcgen::generate_simple_self_signed(vec!["ldap".to_string()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ldap.crt");
        fs::write(&path, certified.signing_key.serialize_pem()).unwrap();
        let err = TlsMaterial::from_ca_file(&path).unwrap_err();
        assert_eq!(err.error_code(), "CERTIFICATE_ERROR");
    }

    #[test]
    fn test_client_identity_loaded() {
        let certified = rcgen::generate_simple_self_signed(vec!["pg".to_string()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("client.crt");
        let key = dir.path().join("client.key");
        fs::write(&cert, certified.cert.pem()).unwrap();
        fs::write(&key, certified.signing_key.serialize_pem()).unwrap();

        let material = TlsMaterial::handshake_only().with_client_identity(&cert, &key).unwrap();
        let config = material.client_config().unwrap();
        assert!(config.client_auth_cert_resolver.has_certs());
    }
}
