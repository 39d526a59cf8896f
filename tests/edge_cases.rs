//! Edge Case Tests
//!
//! Boundary behaviour that is easy to get subtly wrong:
//! - PEM classification of mixed, binary and garbage files
//! - Latency class boundaries
//! - Shell rendering of passwords containing quotes
//! - PostgreSQL certificate requirements per SSL mode
//! - Probe failure classification

use std::fs;
use std::path::Path;
use std::time::Duration;

use fncm_prereq::certs::{
    check_certificates, classify_pem, is_pem_certificate, is_pem_private_key, IssueKind, PemKind,
};
use fncm_prereq::config::{
    parse_oracle_address, ConfigRecord, DbEndpoint, DbTopology, Deployment, ProductRelease, SslMode,
    StorageTiers,
};
use fncm_prereq::probe::{check_reachable, LatencyClass, ProbeFailure, ProbeKind};
use fncm_prereq::process::{escape_single_quotes, shell_quote};
use fncm_prereq::{DatabaseFamily, Invocation, Workspace};

// ============================================================================
// Test Helpers
// ============================================================================

fn certified() -> rcgen::CertifiedKey<rcgen::KeyPair> {
    rcgen::generate_simple_self_signed(vec!["db.example.com".to_string()]).unwrap()
}

fn write(path: &Path, contents: impl AsRef<[u8]>) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn postgres_record(mode: SslMode) -> ConfigRecord {
    ConfigRecord {
        databases: DbTopology {
            family: DatabaseFamily::Postgres,
            ssl_enabled: true,
            ssl_mode: Some(mode),
            endpoints: vec![DbEndpoint {
                id: "GCD".into(),
                server: Some("pg.example.com".into()),
                port: Some(5432),
                database: "gcddb".into(),
                username: "gcd".into(),
                password: "pw".into(),
                oracle_jdbc_url: None,
            }],
        },
        directories: Vec::new(),
        deployment: Deployment {
            release: ProductRelease::V5_5_12,
            platform: None,
            storage: StorageTiers { slow: "a".into(), medium: "a".into(), fast: "a".into() },
        },
        identity_providers: Vec::new(),
        identities: Vec::new(),
    }
}

// ============================================================================
// PEM Classification
// ============================================================================

#[test]
fn test_classification_is_exclusive_and_stable() {
    let key = certified();
    let cert_pem = key.cert.pem();
    let key_pem = key.signing_key.serialize_pem();

    let samples: Vec<(Vec<u8>, PemKind)> = vec![
        (cert_pem.clone().into_bytes(), PemKind::Certificate),
        (key_pem.clone().into_bytes(), PemKind::PrivateKey),
        (format!("{cert_pem}{key_pem}").into_bytes(), PemKind::Certificate),
        (format!("{key_pem}{cert_pem}").into_bytes(), PemKind::PrivateKey),
        (key.cert.der().to_vec(), PemKind::Unrecognized),
        (b"hello world".to_vec(), PemKind::Unrecognized),
        (Vec::new(), PemKind::Unrecognized),
    ];

    let dir = tempfile::tempdir().unwrap();
    for (index, (bytes, expected)) in samples.into_iter().enumerate() {
        assert_eq!(classify_pem(&bytes), expected, "sample {index}");
        assert_eq!(classify_pem(&bytes), classify_pem(&bytes));

        let path = dir.path().join(format!("sample{index}.pem"));
        fs::write(&path, &bytes).unwrap();
        let (cert, key) = (is_pem_certificate(&path), is_pem_private_key(&path));
        assert!(!(cert && key), "sample {index} classified as both");
        assert_eq!((cert, key), (is_pem_certificate(&path), is_pem_private_key(&path)));
    }
}

#[test]
fn test_corrupt_certificate_body_is_unrecognized() {
    let pem = "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n";
    assert_eq!(classify_pem(pem.as_bytes()), PemKind::Unrecognized);
}

// ============================================================================
// Latency Boundaries
// ============================================================================

#[test]
fn test_latency_examples() {
    let ms = Duration::from_millis;
    assert_eq!(LatencyClass::classify(ms(50), ProbeKind::Network), LatencyClass::Acceptable);
    assert_eq!(LatencyClass::classify(ms(150), ProbeKind::Network), LatencyClass::PerformanceDegradation);
    assert_eq!(LatencyClass::classify(ms(400), ProbeKind::Network), LatencyClass::PotentialFailure);
    assert_eq!(LatencyClass::classify(ms(5), ProbeKind::Database), LatencyClass::Acceptable);
    assert_eq!(LatencyClass::classify(ms(20), ProbeKind::Database), LatencyClass::PerformanceDegradation);
    assert_eq!(LatencyClass::classify(ms(40), ProbeKind::Database), LatencyClass::PotentialFailure);
}

#[test]
fn test_latency_is_monotonic() {
    for kind in [ProbeKind::Network, ProbeKind::Database] {
        let mut previous = LatencyClass::Acceptable;
        for millis in 0..1000 {
            let class = LatencyClass::classify(Duration::from_millis(millis), kind);
            assert!(class >= previous, "{kind:?} at {millis}ms went from {previous:?} to {class:?}");
            previous = class;
        }
    }
}

// ============================================================================
// Credential Rendering
// ============================================================================

#[test]
fn test_single_quote_escaping() {
    assert_eq!(escape_single_quotes("a'b"), r"a'\''b");
    assert_eq!(shell_quote("a'b"), r"'a'\''b'");
    assert_eq!(shell_quote(""), "''");
    assert_eq!(shell_quote("plain"), "plain");
}

#[test]
fn test_secret_reaches_argv_verbatim() {
    let password = "p'a\"ss $(whoami) `id`";
    let invocation = Invocation::new("java").arg("-pwd").secret(password);

    assert_eq!(invocation.args[1], password);
    assert!(invocation.is_secret(1));
    assert!(!invocation.to_string().contains("whoami"));
    assert!(invocation.to_shell_line().contains(&format!("'{}'", escape_single_quotes(password))));
}

// ============================================================================
// PostgreSQL Certificate Matrix
// ============================================================================

#[test]
fn test_require_with_client_material_does_not_need_server_ca() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::new(dir.path());
    let key = certified();
    let gcd = workspace.cert_dir("GCD");
    write(&gcd.join("clientcert").join("client.crt"), key.cert.pem());
    write(&gcd.join("clientkey").join("client.key"), key.signing_key.serialize_pem());

    assert!(check_certificates(&postgres_record(SslMode::Require), &workspace).is_empty());

    let issues = check_certificates(&postgres_record(SslMode::VerifyFull), &workspace);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, IssueKind::Missing);
    assert!(issues[0].path.ends_with("serverca"));
}

#[test]
fn test_key_in_certificate_folder_is_incorrect() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::new(dir.path());
    let key = certified();
    write(&workspace.cert_dir("GCD").join("serverca").join("ca.crt"), key.signing_key.serialize_pem());

    let issues = check_certificates(&postgres_record(SslMode::VerifyCa), &workspace);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, IssueKind::Incorrect);
}

#[test]
fn test_certificate_with_unaccepted_extension_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::new(dir.path());
    let key = certified();
    let serverca = workspace.cert_dir("GCD").join("serverca");
    write(&serverca.join("ca.txt"), key.cert.pem());

    let issues = check_certificates(&postgres_record(SslMode::VerifyCa), &workspace);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, IssueKind::Missing);
    assert_eq!(issues[0].path, serverca);

    write(&serverca.join("ca.crt"), key.cert.pem());
    assert!(check_certificates(&postgres_record(SslMode::VerifyCa), &workspace).is_empty());
}

#[test]
fn test_half_client_identity_requires_both_parts() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::new(dir.path());
    let key = certified();
    write(&workspace.cert_dir("GCD").join("clientcert").join("client.crt"), key.cert.pem());

    let issues = check_certificates(&postgres_record(SslMode::Require), &workspace);
    assert_eq!(issues.len(), 1);
    assert!(issues[0].path.ends_with("clientkey"));
}

#[test]
fn test_disable_mode_needs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Workspace::new(dir.path());
    assert!(check_certificates(&postgres_record(SslMode::Disable), &workspace).is_empty());
}

// ============================================================================
// Oracle Addresses
// ============================================================================

#[test]
fn test_oracle_url_forms() {
    let descriptor = "jdbc:oracle:thin:@(DESCRIPTION=(ADDRESS=(PROTOCOL=TCPS)(HOST=ora.example.com)(PORT=2484))(CONNECT_DATA=(SERVICE_NAME=orcl)))";
    assert_eq!(parse_oracle_address(descriptor), Some(("ora.example.com".to_string(), 2484)));
    assert_eq!(
        parse_oracle_address("jdbc:oracle:thin:@//ora.example.com:1521/orclpdb"),
        Some(("ora.example.com".to_string(), 1521))
    );
    assert_eq!(
        parse_oracle_address("jdbc:oracle:thin:@ora.example.com:1521:ORCL"),
        Some(("ora.example.com".to_string(), 1521))
    );
}

#[test]
fn test_oracle_url_without_port_is_rejected() {
    assert_eq!(parse_oracle_address("jdbc:oracle:thin:@ora.example.com"), None);
    assert_eq!(parse_oracle_address("not a url"), None);
    assert_eq!(parse_oracle_address("jdbc:oracle:thin:@(DESCRIPTION=(HOST=ora)(PORT=abc))"), None);
}

// ============================================================================
// Probe Failures
// ============================================================================

#[tokio::test]
async fn test_unknown_host_is_classified() {
    let probe = check_reachable("no-such-host.invalid", 389, None, Duration::from_secs(5)).await;
    match probe.failure {
        Some(ProbeFailure::HostUnknown(host)) => assert_eq!(host, "no-such-host.invalid"),
        // Some resolvers time out instead of answering NXDOMAIN
        Some(ProbeFailure::TimedOut(_)) => {}
        other => panic!("unexpected probe result: {other:?}"),
    }
}

#[tokio::test]
async fn test_closed_port_is_connection_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let probe = check_reachable("127.0.0.1", port, None, Duration::from_secs(2)).await;
    assert!(matches!(probe.failure, Some(ProbeFailure::ConnectionFailed(_))));
    assert!(!probe.connected());
}
