//! Certificate folder discovery and deficiency checks

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::{classify_file, PemKind};
use crate::config::{ConfigRecord, SslMode, Workspace};
use crate::engine::DatabaseFamily;

/// Extensions accepted for certificates
pub const CERT_EXTENSIONS: &[&str] = &["crt", "cer", "pem", "cert"];

/// Extensions accepted where a private key may appear
pub const CERT_AND_KEY_EXTENSIONS: &[&str] = &["crt", "cer", "pem", "cert", "key"];

const SERVER_CA: &str = "serverca";
const CLIENT_CERT: &str = "clientcert";
const CLIENT_KEY: &str = "clientkey";

/// Non-hidden regular files in `dir`, sorted by name; a missing folder is empty
#[must_use]
pub fn visible_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    files
}

/// First visible file in `dir` whose extension is one of `extensions`
#[must_use]
pub fn first_file_with_extension(dir: &Path, extensions: &[&str]) -> Option<PathBuf> {
    visible_files(dir).into_iter().find(|path| {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
    })
}

/// PostgreSQL certificate material found under one database folder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostgresMaterial {
    pub server_ca: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
}

impl PostgresMaterial {
    /// Client authentication is selected by a non-empty `clientcert/` folder
    #[must_use]
    pub const fn client_auth(&self) -> bool {
        self.client_cert.is_some()
    }
}

/// Resolve the `serverca/`, `clientcert/` and `clientkey/` material under `dir`
///
/// All three folders accept `.key` alongside the certificate extensions; the content check
/// decides whether the file holds the right kind of material.
#[must_use]
pub fn postgres_material(dir: &Path) -> PostgresMaterial {
    PostgresMaterial {
        server_ca: first_file_with_extension(&dir.join(SERVER_CA), CERT_AND_KEY_EXTENSIONS),
        client_cert: first_file_with_extension(&dir.join(CLIENT_CERT), CERT_AND_KEY_EXTENSIONS),
        client_key: first_file_with_extension(&dir.join(CLIENT_KEY), CERT_AND_KEY_EXTENSIONS),
    }
}

/// Category of a certificate deficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Nothing was supplied where material is required
    Missing,
    /// A file is present but holds the wrong kind of material
    Incorrect,
}

/// A certificate problem that blocks validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateIssue {
    /// Entity id the material belongs to (`LDAP`, `GCD`, ...)
    pub entity: String,

    pub kind: IssueKind,

    /// Folder (missing) or file (incorrect) concerned
    pub path: PathBuf,
}

impl CertificateIssue {
    /// Remediation text shown to the operator
    #[must_use]
    pub fn hint(&self) -> String {
        match self.kind {
            IssueKind::Missing => format!(
                "Missing certificate for {}: add the PEM file to {}",
                self.entity,
                self.path.display()
            ),
            IssueKind::Incorrect => format!(
                "Incorrect certificate for {}: re-export {} in PEM format",
                self.entity,
                self.path.display()
            ),
        }
    }
}

/// Check the certificate folders every SSL-enabled entity depends on
///
/// Presence and content are judged on the same file the connection helpers load: the first
/// visible file with an accepted extension. Anything else in the folder is ignored.
///
/// Directory servers and non-PostgreSQL databases need a PEM certificate in their folder.
/// PostgreSQL follows its `SSL_MODE`:
///
/// | mode          | required                                                   |
/// |---------------|------------------------------------------------------------|
/// | `verify-full` | `serverca`, `clientcert`, `clientkey`                      |
/// | `verify-ca`   | `serverca`, plus both client parts if either is present    |
/// | `require`     | both client parts if either is present, else `serverca`    |
/// | `disable`     | nothing                                                    |
#[must_use]
pub fn check_certificates(record: &ConfigRecord, workspace: &Workspace) -> Vec<CertificateIssue> {
    let mut issues = Vec::new();

    for directory in record.directories.iter().filter(|d| d.ssl_enabled) {
        check_single_folder(&directory.id, &workspace.cert_dir(&directory.id), &mut issues);
    }

    let databases = &record.databases;
    if databases.ssl_enabled {
        for endpoint in &databases.endpoints {
            let dir = workspace.cert_dir(&endpoint.id);
            match databases.family {
                DatabaseFamily::Postgres => check_postgres_folder(
                    &endpoint.id,
                    &dir,
                    databases.ssl_mode.unwrap_or(SslMode::Require),
                    &mut issues,
                ),
                _ => check_single_folder(&endpoint.id, &dir, &mut issues),
            }
        }
    }

    issues
}

fn check_single_folder(entity: &str, dir: &Path, issues: &mut Vec<CertificateIssue>) {
    let found = first_file_with_extension(dir, CERT_EXTENSIONS);
    check_part(entity, dir, found.as_deref(), PemKind::Certificate, true, issues);
}

fn check_postgres_folder(entity: &str, dir: &Path, mode: SslMode, issues: &mut Vec<CertificateIssue>) {
    let material = postgres_material(dir);
    let parts = [
        (SERVER_CA, material.server_ca.as_deref(), PemKind::Certificate),
        (CLIENT_CERT, material.client_cert.as_deref(), PemKind::Certificate),
        (CLIENT_KEY, material.client_key.as_deref(), PemKind::PrivateKey),
    ];
    let any_client = parts[1].1.is_some() || parts[2].1.is_some();

    let required: &[usize] = match mode {
        SslMode::Disable => return,
        SslMode::VerifyFull => &[0, 1, 2],
        SslMode::VerifyCa if any_client => &[0, 1, 2],
        SslMode::VerifyCa => &[0],
        SslMode::Require if any_client => &[1, 2],
        SslMode::Require => &[0],
    };

    for (index, (name, found, expected)) in parts.into_iter().enumerate() {
        check_part(entity, &dir.join(name), found, expected, required.contains(&index), issues);
    }
}

/// `found` is the file the connection helpers will load from `dir`, so only it is inspected
fn check_part(
    entity: &str,
    dir: &Path,
    found: Option<&Path>,
    expected: PemKind,
    required: bool,
    issues: &mut Vec<CertificateIssue>,
) {
    match found {
        None if required => issues.push(missing(entity, dir)),
        None => {}
        Some(file) if classify_file(file) != expected => issues.push(CertificateIssue {
            entity: entity.to_string(),
            kind: IssueKind::Incorrect,
            path: file.to_path_buf(),
        }),
        Some(_) => {}
    }
}

fn missing(entity: &str, dir: &Path) -> CertificateIssue {
    CertificateIssue { entity: entity.to_string(), kind: IssueKind::Missing, path: dir.to_path_buf() }
}
