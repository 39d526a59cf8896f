//! Certificate Utilities
//!
//! Classification and conversion of the certificate and key material operators drop into
//! `propertyFile/ssl-certs/<id>/`.
//!
//! # Classification
//! [`classify_pem`] looks at the first PEM section only. A file is a certificate when that section
//! is an X.509 certificate that parses, a private key when it is an unencrypted PKCS#1, PKCS#8 or
//! SEC1 key that decodes, and unrecognized otherwise. Binary DER, encrypted keys and garbage are
//! all unrecognized; nothing here returns an error for bad input.
//!
//! # Conversion
//! The JDBC helpers want DER certificates wrapped in a Java trust store and client keys as
//! unencrypted PKCS#8 DER. Conversions overwrite any previous output at the target path.

mod folders;

pub use folders::{
    check_certificates, first_file_with_extension, postgres_material, visible_files,
    CertificateIssue, IssueKind, PostgresMaterial, CERT_AND_KEY_EXTENSIONS, CERT_EXTENSIONS,
};

use pkcs8::der::asn1::AnyRef;
use pkcs8::der::Encode;
use pkcs8::{AlgorithmIdentifierRef, ObjectIdentifier, PrivateKeyInfo};
use rustls_pemfile::Item;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PrereqError, Result};
use crate::process::{CommandRunner, Invocation};

/// Password used for every ephemeral trust store
pub const DEFAULT_STORE_PASSWORD: &str = "changeit";

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// What the first PEM section of a file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PemKind {
    Certificate,
    PrivateKey,
    Unrecognized,
}

/// Classify PEM bytes by their first section
#[must_use]
pub fn classify_pem(bytes: &[u8]) -> PemKind {
    match rustls_pemfile::read_one_from_slice(bytes) {
        Ok(Some((Item::X509Certificate(der), _))) => {
            if x509_parser::parse_x509_certificate(der.as_ref()).is_ok() {
                PemKind::Certificate
            } else {
                PemKind::Unrecognized
            }
        }
        Ok(Some((Item::Pkcs8Key(key), _))) => {
            key_kind(PrivateKeyInfo::try_from(key.secret_pkcs8_der()).is_ok())
        }
        Ok(Some((Item::Pkcs1Key(key), _))) => {
            key_kind(pkcs8::der::Document::try_from(key.secret_pkcs1_der()).is_ok())
        }
        Ok(Some((Item::Sec1Key(key), _))) => {
            key_kind(sec1::EcPrivateKey::try_from(key.secret_sec1_der()).is_ok())
        }
        _ => PemKind::Unrecognized,
    }
}

const fn key_kind(decodes: bool) -> PemKind {
    if decodes {
        PemKind::PrivateKey
    } else {
        PemKind::Unrecognized
    }
}

/// Classify a file; unreadable files are unrecognized
#[must_use]
pub fn classify_file(path: &Path) -> PemKind {
    fs::read(path).map_or(PemKind::Unrecognized, |bytes| classify_pem(&bytes))
}

/// Whether `path` holds a PEM X.509 certificate
#[must_use]
pub fn is_pem_certificate(path: &Path) -> bool {
    classify_file(path) == PemKind::Certificate
}

/// Whether `path` holds an unencrypted PEM private key
#[must_use]
pub fn is_pem_private_key(path: &Path) -> bool {
    classify_file(path) == PemKind::PrivateKey
}

/// Load the first PEM certificate in `input` and write it as DER to `output`
pub fn convert_cert_to_der(input: &Path, output: &Path) -> Result<PathBuf> {
    let bytes = read_material(input)?;
    let mut reader = bytes.as_slice();
    let der = rustls_pemfile::certs(&mut reader)
        .next()
        .ok_or_else(|| {
            PrereqError::certificate_error(format!(
                "{} does not contain a PEM certificate",
                input.display()
            ))
        })?
        .map_err(|e| {
            PrereqError::certificate_error(format!("{} is not valid PEM: {e}", input.display()))
        })?;

    x509_parser::parse_x509_certificate(der.as_ref()).map_err(|e| {
        PrereqError::certificate_error(format!(
            "{} is not a valid X.509 certificate: {e}",
            input.display()
        ))
    })?;

    write_replacing(output, der.as_ref())?;
    debug!(input = %input.display(), output = %output.display(), "converted certificate to DER");
    Ok(output.to_path_buf())
}

/// Load the first unencrypted PEM private key in `input` and write it as PKCS#8 DER to `output`
///
/// PKCS#1 (RSA) and SEC1 (EC) keys are wrapped in a PKCS#8 `PrivateKeyInfo`; PKCS#8 keys are
/// written as they are.
pub fn convert_key_to_pkcs8_der(input: &Path, output: &Path) -> Result<PathBuf> {
    let bytes = read_material(input)?;
    let mut reader = bytes.as_slice();
    let key = rustls_pemfile::private_key(&mut reader)
        .map_err(|e| {
            PrereqError::certificate_error(format!("{} is not valid PEM: {e}", input.display()))
        })?
        .ok_or_else(|| {
            PrereqError::certificate_error(format!(
                "{} does not contain an unencrypted PEM private key",
                input.display()
            ))
        })?;

    let pkcs8 = match &key {
        rustls::pki_types::PrivateKeyDer::Pkcs8(der) => {
            PrivateKeyInfo::try_from(der.secret_pkcs8_der()).map_err(|e| {
                PrereqError::certificate_error(format!("Invalid PKCS#8 key: {e}"))
            })?;
            der.secret_pkcs8_der().to_vec()
        }
        rustls::pki_types::PrivateKeyDer::Pkcs1(der) => pkcs8_from_pkcs1(der.secret_pkcs1_der())?,
        rustls::pki_types::PrivateKeyDer::Sec1(der) => pkcs8_from_sec1(der.secret_sec1_der())?,
        _ => {
            return Err(PrereqError::certificate_error(format!(
                "{} holds an unsupported key encoding",
                input.display()
            )))
        }
    };

    write_replacing(output, &pkcs8)?;
    debug!(input = %input.display(), output = %output.display(), "converted key to PKCS#8 DER");
    Ok(output.to_path_buf())
}

/// Wrap an RSA `RSAPrivateKey` structure in a PKCS#8 `PrivateKeyInfo`
pub fn pkcs8_from_pkcs1(pkcs1: &[u8]) -> Result<Vec<u8>> {
    pkcs8::der::Document::try_from(pkcs1)
        .map_err(|e| PrereqError::certificate_error(format!("Invalid PKCS#1 key: {e}")))?;

    let algorithm = AlgorithmIdentifierRef { oid: RSA_ENCRYPTION, parameters: Some(AnyRef::NULL) };
    PrivateKeyInfo::new(algorithm, pkcs1)
        .to_der()
        .map_err(|e| PrereqError::certificate_error(format!("Could not encode PKCS#8 key: {e}")))
}

/// Wrap a SEC1 `ECPrivateKey` structure in a PKCS#8 `PrivateKeyInfo`
///
/// The curve is taken from the key's own parameters.
pub fn pkcs8_from_sec1(sec1_der: &[u8]) -> Result<Vec<u8>> {
    let key = sec1::EcPrivateKey::try_from(sec1_der)
        .map_err(|e| PrereqError::certificate_error(format!("Invalid SEC1 key: {e}")))?;
    let curve = key.parameters.and_then(|p| p.named_curve()).ok_or_else(|| {
        PrereqError::certificate_error("EC private key does not name its curve")
    })?;

    let algorithm =
        AlgorithmIdentifierRef { oid: EC_PUBLIC_KEY, parameters: Some(AnyRef::from(&curve)) };
    PrivateKeyInfo::new(algorithm, sec1_der)
        .to_der()
        .map_err(|e| PrereqError::certificate_error(format!("Could not encode PKCS#8 key: {e}")))
}

/// Java key store formats produced by `keytool`
///
/// Only the JDBC helpers take a store; directory servers are verified against the PEM directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    Pkcs12,
}

impl StoreType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pkcs12 => "PKCS12",
        }
    }
}

impl std::fmt::Display for StoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Import a DER certificate into a fresh trust store with `keytool`
///
/// Any existing store at `output` is removed first. A missing `keytool` surfaces as
/// [`PrereqError::MissingTool`]; the preflight check normally catches that earlier.
pub async fn build_trust_store<R: CommandRunner>(
    runner: &R,
    der_path: &Path,
    output: &Path,
    alias: &str,
    store_type: StoreType,
    password: &str,
) -> Result<PathBuf> {
    remove_existing(output)?;

    let invocation = Invocation::new("keytool")
        .args(["-import", "-alias", alias, "-keystore"])
        .path_arg(output)
        .arg("-file")
        .path_arg(der_path)
        .arg("-storepass")
        .secret(password)
        .args(["-storetype", store_type.as_str(), "-noprompt"]);

    runner.run(&invocation).await?.into_result("keytool")?;
    debug!(store = %output.display(), %alias, %store_type, "created trust store");
    Ok(output.to_path_buf())
}

fn read_material(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        PrereqError::certificate_error(format!("Could not read {}: {e}", path.display()))
    })
}

fn remove_existing(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PrereqError::certificate_error(format!(
            "Could not remove previous {}: {e}",
            path.display()
        ))),
    }
}

fn write_replacing(path: &Path, contents: &[u8]) -> Result<()> {
    remove_existing(path)?;
    fs::write(path, contents).map_err(|e| {
        PrereqError::certificate_error(format!("Could not write {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use std::sync::Mutex;

    fn self_signed() -> (String, String) {
        let certified = rcgen::generate_simple_self_signed(vec!["db.example.com".to_string()]).unwrap();
        (certified.cert.pem(), certified.signing_key.serialize_pem())
    }

    #[test]
    fn test_classify_certificate_and_key() {
        let (cert, key) = self_signed();
        assert_eq!(classify_pem(cert.as_bytes()), PemKind::Certificate);
        assert_eq!(classify_pem(key.as_bytes()), PemKind::PrivateKey);
    }

    #[test]
    fn test_classify_rejects_garbage_and_der() {
        let certified = rcgen::generate_simple_self_signed(vec!["x".to_string()]).unwrap();
        assert_eq!(classify_pem(certified.cert.der()), PemKind::Unrecognized);
        assert_eq!(classify_pem(b"not a certificate"), PemKind::Unrecognized);
        assert_eq!(classify_pem(b""), PemKind::Unrecognized);
    }

    #[test]
    fn test_classify_corrupt_certificate_body() {
        let corrupt = "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n";
        assert_eq!(classify_pem(corrupt.as_bytes()), PemKind::Unrecognized);
    }

    #[test]
    fn test_classify_uses_first_section_only() {
        let (cert, key) = self_signed();
        let bundle = format!("{cert}{key}");
        assert_eq!(classify_pem(bundle.as_bytes()), PemKind::Certificate);
        let reversed = format!("{key}{cert}");
        assert_eq!(classify_pem(reversed.as_bytes()), PemKind::PrivateKey);
    }

    #[test]
    fn test_classification_is_exclusive_and_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let (cert, key) = self_signed();
        let samples = [
            ("cert.pem", cert.clone().into_bytes()),
            ("key.pem", key.into_bytes()),
            ("bundle.pem", format!("{cert}{cert}").into_bytes()),
            ("junk.crt", b"\x30\x82\x01\x00garbage".to_vec()),
        ];
        for (name, bytes) in samples {
            let path = dir.path().join(name);
            fs::write(&path, bytes).unwrap();
            let first = (is_pem_certificate(&path), is_pem_private_key(&path));
            assert!(!(first.0 && first.1), "{name} classified as both");
            let second = (is_pem_certificate(&path), is_pem_private_key(&path));
            assert_eq!(first, second, "{name} classified differently on rerun");
        }
    }

    #[test]
    fn test_missing_file_is_neither() {
        let path = Path::new("/definitely/not/here.pem");
        assert!(!is_pem_certificate(path));
        assert!(!is_pem_private_key(path));
    }

    #[test]
    fn test_convert_cert_to_der_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let certified = rcgen::generate_simple_self_signed(vec!["ldap".to_string()]).unwrap();
        let input = dir.path().join("ldap.crt");
        let output = dir.path().join("ldap.der");
        fs::write(&input, certified.cert.pem()).unwrap();
        fs::write(&output, b"stale").unwrap();

        let written = convert_cert_to_der(&input, &output).unwrap();
        assert_eq!(written, output);
        assert_eq!(fs::read(&output).unwrap(), certified.cert.der().to_vec());
    }

    #[test]
    fn test_convert_cert_rejects_key() {
        let dir = tempfile::tempdir().unwrap();
        let (_, key) = self_signed();
        let input = dir.path().join("wrong.crt");
        fs::write(&input, key).unwrap();
        let err = convert_cert_to_der(&input, &dir.path().join("out.der")).unwrap_err();
        assert_eq!(err.error_code(), "CERTIFICATE_ERROR");
    }

    #[test]
    fn test_convert_pkcs8_key_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let certified = rcgen::generate_simple_self_signed(vec!["pg".to_string()]).unwrap();
        let input = dir.path().join("client.key");
        let output = dir.path().join("client.der");
        fs::write(&input, certified.signing_key.serialize_pem()).unwrap();

        convert_key_to_pkcs8_der(&input, &output).unwrap();
        assert_eq!(fs::read(&output).unwrap(), certified.signing_key.serialize_der());
    }

    #[test]
    fn test_pkcs1_is_wrapped_with_rsa_oid() {
        // SEQUENCE { INTEGER 0, INTEGER 5 } stands in for an RSAPrivateKey body
        let pkcs1 = [0x30, 0x06, 0x02, 0x01, 0x00, 0x02, 0x01, 0x05];
        let wrapped = pkcs8_from_pkcs1(&pkcs1).unwrap();
        let info = PrivateKeyInfo::try_from(wrapped.as_slice()).unwrap();
        assert_eq!(info.algorithm.oid, RSA_ENCRYPTION);
        assert_eq!(info.private_key, &pkcs1);
    }

    #[test]
    fn test_sec1_is_wrapped_with_curve() {
        let certified = rcgen::generate_simple_self_signed(vec!["pg".to_string()]).unwrap();
        let pkcs8_der = certified.signing_key.serialize_der();
        let info = PrivateKeyInfo::try_from(pkcs8_der.as_slice()).unwrap();
        let curve = info.algorithm.parameters_oid().unwrap();

        let inner = sec1::EcPrivateKey::try_from(info.private_key).unwrap();
        let with_curve = sec1::EcPrivateKey {
            private_key: inner.private_key,
            parameters: Some(sec1::EcParameters::NamedCurve(curve)),
            public_key: inner.public_key,
        };
        let sec1_der = with_curve.to_der().unwrap();

        let wrapped = pkcs8_from_sec1(&sec1_der).unwrap();
        let rewrapped = PrivateKeyInfo::try_from(wrapped.as_slice()).unwrap();
        assert_eq!(rewrapped.algorithm.oid, EC_PUBLIC_KEY);
        assert_eq!(rewrapped.algorithm.parameters_oid().unwrap(), curve);
    }

    #[test]
    fn test_sec1_without_curve_rejected() {
        let certified = rcgen::generate_simple_self_signed(vec!["pg".to_string()]).unwrap();
        let pkcs8_der = certified.signing_key.serialize_der();
        let info = PrivateKeyInfo::try_from(pkcs8_der.as_slice()).unwrap();
        let inner = sec1::EcPrivateKey::try_from(info.private_key).unwrap();
        let bare = sec1::EcPrivateKey { parameters: None, ..inner }.to_der().unwrap();
        assert!(pkcs8_from_sec1(&bare).is_err());
    }

    struct RecordingRunner {
        seen: Mutex<Vec<Invocation>>,
    }

    impl CommandRunner for RecordingRunner {
        async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
            self.seen.lock().unwrap().push(invocation.clone());
            Ok(CommandOutput::ok(""))
        }
    }

    #[tokio::test]
    async fn test_build_trust_store_command_shape() {
        let dir = tempfile::tempdir().unwrap();
        let der = dir.path().join("oracle-db-cert.der");
        let store = dir.path().join("oracle-db-truststore.p12");
        fs::write(&store, b"old store").unwrap();

        let runner = RecordingRunner { seen: Mutex::new(Vec::new()) };
        build_trust_store(&runner, &der, &store, "cp4baORACLECerts", StoreType::Pkcs12, "changeit")
            .await
            .unwrap();

        assert!(!store.exists(), "previous store must be removed before keytool runs");
        let seen = runner.seen.lock().unwrap();
        let invocation = &seen[0];
        assert_eq!(invocation.program, "keytool");
        let expected: Vec<String> = vec![
            "-import".into(),
            "-alias".into(),
            "cp4baORACLECerts".into(),
            "-keystore".into(),
            store.display().to_string(),
            "-file".into(),
            der.display().to_string(),
            "-storepass".into(),
            "changeit".into(),
            "-storetype".into(),
            "PKCS12".into(),
            "-noprompt".into(),
        ];
        assert_eq!(invocation.args, expected);
        assert!(invocation.is_secret(8));
    }

    #[tokio::test]
    async fn test_build_trust_store_failure_propagates() {
        struct FailingRunner;
        impl CommandRunner for FailingRunner {
            async fn run(&self, _: &Invocation) -> Result<CommandOutput> {
                Ok(CommandOutput::failed(1, "keytool error: java.lang.Exception: Input not an X.509 certificate"))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let err = build_trust_store(
            &FailingRunner,
            &dir.path().join("a.der"),
            &dir.path().join("a.p12"),
            "cp4baORACLECerts",
            StoreType::Pkcs12,
            DEFAULT_STORE_PASSWORD,
        )
        .await
        .unwrap_err();
        assert!(err.message().contains("X.509"));
    }
}
