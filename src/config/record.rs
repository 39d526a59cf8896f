//! Typed configuration record
//!
//! The property documents are edited by hand, so the typed layer is lenient about representation
//! (ports as integers or strings, flags as booleans or `"true"`/`"false"`) and strict about meaning
//! (unknown database families, SSL modes or product releases are configuration errors).

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::engine::DatabaseFamily;
use crate::error::{PrereqError, Result};

/// Default directory filter for users when `LC_USER_FILTER` is absent
pub const DEFAULT_USER_FILTER: &str = "(&(cn=%v)(objectclass=person))";

/// Default directory filter for groups when `LC_GROUP_FILTER` is absent
pub const DEFAULT_GROUP_FILTER: &str =
    "(&(cn=%v)(|(objectclass=groupofnames)(objectclass=groupofuniquenames)(objectclass=groupofurls)))";

/// The finalized configuration consumed by the validators
#[derive(Debug, Clone)]
pub struct ConfigRecord {
    /// Database topology (`fncm_db_server.toml`)
    pub databases: DbTopology,

    /// Directory servers (`fncm_ldap_server.toml`), in id order
    pub directories: Vec<LdapServer>,

    /// Deployment flags (`fncm_deployment.toml`)
    pub deployment: Deployment,

    /// Identity providers (`fncm_identity_provider.toml`), possibly empty
    pub identity_providers: Vec<IdentityProvider>,

    /// Every distinct user or group named in the user/group and component documents
    pub identities: Vec<Identity>,
}

impl ConfigRecord {
    /// Look up a directory by id
    #[must_use]
    pub fn directory(&self, id: &str) -> Option<&LdapServer> {
        self.directories.iter().find(|d| d.id == id)
    }

    /// Look up a database endpoint by id
    #[must_use]
    pub fn database(&self, id: &str) -> Option<&DbEndpoint> {
        self.databases.endpoints.iter().find(|e| e.id == id)
    }
}

/// PostgreSQL `sslmode` values accepted by the helper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disable => "disable",
            Self::Require => "require",
            Self::VerifyCa => "verify-ca",
            Self::VerifyFull => "verify-full",
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SslMode {
    type Err = PrereqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disable" => Ok(Self::Disable),
            "require" => Ok(Self::Require),
            "verify-ca" => Ok(Self::VerifyCa),
            "verify-full" => Ok(Self::VerifyFull),
            other => Err(PrereqError::config_error(format!(
                "Unsupported SSL_MODE '{other}' (expected disable, require, verify-ca or verify-full)"
            ))),
        }
    }
}

/// Database section of the record
#[derive(Debug, Clone)]
pub struct DbTopology {
    /// Engine family shared by every database
    pub family: DatabaseFamily,

    /// `DATABASE_SSL_ENABLE`
    pub ssl_enabled: bool,

    /// `SSL_MODE`, PostgreSQL only
    pub ssl_mode: Option<SslMode>,

    /// GCD, ICN, then object stores in numeric order
    pub endpoints: Vec<DbEndpoint>,
}

impl DbTopology {
    /// Build from the parsed `fncm_db_server.toml`
    ///
    /// Every table-valued entry is an endpoint section. `GCD` and `ICN` come first, then sections
    /// whose id starts with `OS` ordered by their numeric suffix.
    pub fn from_table(table: &toml::Table) -> Result<Self> {
        let family = table
            .get("DATABASE_TYPE")
            .and_then(toml::Value::as_str)
            .ok_or_else(|| PrereqError::config_error("DATABASE_TYPE is not set"))?
            .parse::<DatabaseFamily>()?;

        let ssl_enabled = match table.get("DATABASE_SSL_ENABLE") {
            Some(value) => value_as_flag(value).ok_or_else(|| {
                PrereqError::config_error("DATABASE_SSL_ENABLE must be true or false")
            })?,
            None => false,
        };

        let ssl_mode = match (family, table.get("SSL_MODE").and_then(toml::Value::as_str)) {
            (DatabaseFamily::Postgres, Some(mode)) => Some(mode.parse::<SslMode>()?),
            (DatabaseFamily::Postgres, None) if ssl_enabled => Some(SslMode::Require),
            _ => None,
        };

        let mut ids: Vec<&String> = table
            .iter()
            .filter(|(key, value)| value.is_table() && is_database_section(key))
            .map(|(key, _)| key)
            .collect();
        ids.sort_by_key(|id| database_section_rank(id));

        let mut endpoints = Vec::with_capacity(ids.len());
        for id in ids {
            let section = table[id.as_str()].clone();
            let mut endpoint: DbEndpoint = section.try_into().map_err(|e| {
                PrereqError::config_error(format!("Invalid database section [{id}]: {e}"))
            })?;
            endpoint.id = id.clone();
            if family == DatabaseFamily::Postgres {
                endpoint.database = endpoint.database.to_lowercase();
            }
            endpoints.push(endpoint);
        }

        if endpoints.is_empty() {
            return Err(PrereqError::config_error("No database sections found in fncm_db_server.toml"));
        }

        Ok(Self { family, ssl_enabled, ssl_mode, endpoints })
    }

    /// Ids of every configured database, in validation order
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| e.id.clone()).collect()
    }
}

fn is_database_section(key: &str) -> bool {
    key == "GCD" || key == "ICN" || key.starts_with("OS")
}

fn database_section_rank(key: &str) -> (u8, u32, String) {
    match key {
        "GCD" => (0, 0, String::new()),
        "ICN" => (1, 0, String::new()),
        os => {
            let suffix = os.trim_start_matches("OS");
            let index = if suffix.is_empty() { 1 } else { suffix.parse().unwrap_or(u32::MAX) };
            (2, index, os.to_string())
        }
    }
}

/// One logical database
///
/// Password is sensitive: never log a `DbEndpoint` with `{:?}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DbEndpoint {
    /// Section id (`GCD`, `ICN`, `OS`, `OS2`, ...)
    #[serde(skip)]
    pub id: String,

    #[serde(rename = "DATABASE_SERVERNAME", default)]
    pub server: Option<String>,

    #[serde(rename = "DATABASE_PORT", default, deserialize_with = "optional_port")]
    pub port: Option<u16>,

    #[serde(rename = "DATABASE_NAME")]
    pub database: String,

    #[serde(rename = "DATABASE_USERNAME")]
    pub username: String,

    #[serde(rename = "DATABASE_PASSWORD")]
    pub password: String,

    #[serde(rename = "ORACLE_JDBC_URL", default)]
    pub oracle_jdbc_url: Option<String>,
}

impl DbEndpoint {
    /// Host and port to probe before invoking the helper
    ///
    /// Falls back to the address embedded in `ORACLE_JDBC_URL` when server or port are absent.
    #[must_use]
    pub fn probe_target(&self) -> Option<(String, u16)> {
        match (&self.server, self.port) {
            (Some(server), Some(port)) if !server.is_empty() => Some((server.clone(), port)),
            _ => self.oracle_jdbc_url.as_deref().and_then(parse_oracle_address),
        }
    }

    /// Host used in narration
    #[must_use]
    pub fn display_host(&self) -> String {
        self.probe_target().map_or_else(|| "<unknown host>".to_string(), |(host, _)| host)
    }
}

/// Extract host and port from an Oracle thin JDBC URL
///
/// Handles the descriptor form `(HOST=h)(PORT=p)`, EZConnect `@//h:p/service` and `@h:p:sid`.
#[must_use]
pub fn parse_oracle_address(url: &str) -> Option<(String, u16)> {
    let upper = url.to_ascii_uppercase();
    if let (Some(h), Some(p)) = (upper.find("(HOST="), upper.find("(PORT=")) {
        let host = descriptor_value(url, h + "(HOST=".len())?;
        let port = descriptor_value(url, p + "(PORT=".len())?.parse().ok()?;
        return Some((host, port));
    }

    let (_, rest) = url.split_once('@')?;
    let rest = rest.trim_start_matches("//");
    let (host, rest) = rest.split_once(':')?;
    let port: String = rest.chars().take_while(char::is_ascii_digit).collect();
    Some((host.to_string(), port.parse().ok()?))
}

fn descriptor_value(url: &str, start: usize) -> Option<String> {
    let tail = url.get(start..)?;
    let end = tail.find(')')?;
    Some(tail[..end].trim().to_string())
}

/// One directory server
///
/// Bind password is sensitive: never log an `LdapServer` with `{:?}`.
#[derive(Debug, Clone, Deserialize)]
pub struct LdapServer {
    /// Section id (`LDAP`, `LDAP2`, ...)
    #[serde(skip)]
    pub id: String,

    #[serde(rename = "LDAP_TYPE", default)]
    pub kind: Option<String>,

    #[serde(rename = "LDAP_SERVER")]
    pub server: String,

    #[serde(rename = "LDAP_PORT", deserialize_with = "port")]
    pub port: u16,

    #[serde(rename = "LDAP_SSL_ENABLED", default, deserialize_with = "flag")]
    pub ssl_enabled: bool,

    #[serde(rename = "LDAP_BIND_DN")]
    pub bind_dn: String,

    #[serde(rename = "LDAP_BIND_DN_PASSWORD")]
    pub bind_password: String,

    #[serde(rename = "LDAP_BASE_DN")]
    pub base_dn: String,

    #[serde(rename = "LDAP_GROUP_BASE_DN", default)]
    pub group_base_dn: Option<String>,

    #[serde(rename = "LC_USER_FILTER", default)]
    pub user_filter: Option<String>,

    #[serde(rename = "LC_GROUP_FILTER", default)]
    pub group_filter: Option<String>,
}

impl LdapServer {
    /// `ldap://` or `ldaps://` URL for this server
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.ssl_enabled { "ldaps" } else { "ldap" };
        format!("{scheme}://{}:{}", self.server, self.port)
    }

    #[must_use]
    pub fn user_filter(&self) -> &str {
        self.user_filter.as_deref().filter(|f| !f.is_empty()).unwrap_or(DEFAULT_USER_FILTER)
    }

    #[must_use]
    pub fn group_filter(&self) -> &str {
        self.group_filter.as_deref().filter(|f| !f.is_empty()).unwrap_or(DEFAULT_GROUP_FILTER)
    }

    /// Search base for groups, falling back to the user base DN
    #[must_use]
    pub fn group_base_dn(&self) -> &str {
        self.group_base_dn.as_deref().filter(|b| !b.is_empty()).unwrap_or(&self.base_dn)
    }
}

/// Parse every `LDAP…` section of `fncm_ldap_server.toml`
pub fn directories_from_table(table: &toml::Table) -> Result<Vec<LdapServer>> {
    let mut ids: Vec<&String> = table
        .iter()
        .filter(|(key, value)| value.is_table() && key.starts_with("LDAP"))
        .map(|(key, _)| key)
        .collect();
    ids.sort_by_key(|id| numbered_rank(id, "LDAP"));

    let mut directories = Vec::with_capacity(ids.len());
    for id in ids {
        let mut server: LdapServer = table[id.as_str()].clone().try_into().map_err(|e| {
            PrereqError::config_error(format!("Invalid directory section [{id}]: {e}"))
        })?;
        server.id = id.clone();
        directories.push(server);
    }

    if directories.is_empty() {
        return Err(PrereqError::config_error("No LDAP sections found in fncm_ldap_server.toml"));
    }
    Ok(directories)
}

fn numbered_rank(id: &str, prefix: &str) -> (u32, String) {
    let suffix = id.trim_start_matches(prefix);
    let index = if suffix.is_empty() { 1 } else { suffix.parse().unwrap_or(u32::MAX) };
    (index, id.to_string())
}

/// Supported product releases and the Java major each one needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ProductRelease {
    #[serde(rename = "5.5.8")]
    V5_5_8,
    #[serde(rename = "5.5.11")]
    V5_5_11,
    #[serde(rename = "5.5.12")]
    V5_5_12,
}

impl ProductRelease {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::V5_5_8 => "5.5.8",
            Self::V5_5_11 => "5.5.11",
            Self::V5_5_12 => "5.5.12",
        }
    }

    /// Java major version the release's JDBC drivers are built for
    #[must_use]
    pub const fn java_major(&self) -> u32 {
        match self {
            Self::V5_5_8 => 8,
            Self::V5_5_11 => 11,
            Self::V5_5_12 => 17,
        }
    }

    /// Folder under `helper_scripts/validate/jdbc` holding the matching drivers
    #[must_use]
    pub const fn jdbc_folder(&self) -> &'static str {
        match self {
            Self::V5_5_8 => "java8",
            Self::V5_5_11 => "java11",
            Self::V5_5_12 => "java17",
        }
    }
}

impl fmt::Display for ProductRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProductRelease {
    type Err = PrereqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "5.5.8" => Ok(Self::V5_5_8),
            "5.5.11" => Ok(Self::V5_5_11),
            "5.5.12" => Ok(Self::V5_5_12),
            other => Err(PrereqError::config_error(format!(
                "Unsupported FNCM_Version '{other}' (expected 5.5.8, 5.5.11 or 5.5.12)"
            ))),
        }
    }
}

/// Slow, medium and fast file storage class names
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageTiers {
    #[serde(rename = "SLOW_FILE_STORAGE_CLASSNAME")]
    pub slow: String,

    #[serde(rename = "MEDIUM_FILE_STORAGE_CLASSNAME")]
    pub medium: String,

    #[serde(rename = "FAST_FILE_STORAGE_CLASSNAME")]
    pub fast: String,
}

impl StorageTiers {
    /// Distinct class names, first occurrence order (slow, medium, fast)
    #[must_use]
    pub fn distinct(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::with_capacity(3);
        for name in [&self.slow, &self.medium, &self.fast] {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }
}

/// Deployment section of the record
#[derive(Debug, Clone)]
pub struct Deployment {
    pub release: ProductRelease,
    pub platform: Option<String>,
    pub storage: StorageTiers,
}

impl Deployment {
    pub fn from_table(table: &toml::Table) -> Result<Self> {
        let release = table
            .get("FNCM_Version")
            .and_then(toml::Value::as_str)
            .ok_or_else(|| PrereqError::config_error("FNCM_Version is not set"))?
            .parse()?;
        let platform = table.get("PLATFORM").and_then(toml::Value::as_str).map(str::to_string);
        let storage: StorageTiers = toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e| PrereqError::config_error(format!("Invalid storage class settings: {e}")))?;
        Ok(Self { release, platform, storage })
    }
}

/// One identity provider section
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityProvider {
    #[serde(skip)]
    pub id: String,

    #[serde(rename = "DISCOVERY_ENDPOINT", default)]
    pub discovery_endpoint: Option<String>,

    #[serde(rename = "TOKEN_ENDPOINT", default)]
    pub token_endpoint: Option<String>,
}

impl IdentityProvider {
    /// Endpoint to probe: discovery if present, otherwise token
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.discovery_endpoint
            .as_deref()
            .filter(|e| !e.is_empty())
            .or_else(|| self.token_endpoint.as_deref().filter(|e| !e.is_empty()))
    }
}

/// Parse every `IDP…` section of `fncm_identity_provider.toml`
pub fn identity_providers_from_table(table: &toml::Table) -> Result<Vec<IdentityProvider>> {
    let mut providers = Vec::new();
    for (id, value) in table.iter().filter(|(k, v)| v.is_table() && k.starts_with("IDP")) {
        let mut provider: IdentityProvider = value.clone().try_into().map_err(|e| {
            PrereqError::config_error(format!("Invalid identity provider section [{id}]: {e}"))
        })?;
        provider.id = id.clone();
        providers.push(provider);
    }
    providers.sort_by_key(|p| numbered_rank(&p.id, "IDP"));
    Ok(providers)
}

/// What a directory name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKind {
    User,
    Group,
    /// Fields such as `..._ADMIN_USER_GROUPS` accept either
    Either,
}

impl IdentityKind {
    fn merge(self, other: Self) -> Self {
        if self == other {
            self
        } else {
            Self::Either
        }
    }
}

/// A user or group name referenced by the configuration
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Identity {
    pub name: String,
    pub kind: IdentityKind,
}

impl Identity {
    pub fn user(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: IdentityKind::User }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: IdentityKind::Group }
    }
}

/// Collect every user/group name from the given documents
///
/// Keys mentioning both `USER` and `GROUP` accept either kind, keys mentioning `GROUP` name
/// groups, keys mentioning `USER` name users. Password and secret keys are ignored. A name listed
/// under different kinds is merged into a single [`IdentityKind::Either`] entry.
#[must_use]
pub fn collect_identities(documents: &[&toml::Table]) -> Vec<Identity> {
    let mut found: BTreeMap<String, IdentityKind> = BTreeMap::new();
    for document in documents {
        collect_from_table(document, &mut found);
    }
    found.into_iter().map(|(name, kind)| Identity { name, kind }).collect()
}

fn collect_from_table(table: &toml::Table, found: &mut BTreeMap<String, IdentityKind>) {
    for (key, value) in table {
        if let toml::Value::Table(inner) = value {
            collect_from_table(inner, found);
            continue;
        }
        let Some(kind) = identity_kind_for_key(key) else { continue };
        let names: Vec<&str> = match value {
            toml::Value::String(name) => vec![name.as_str()],
            toml::Value::Array(items) => items.iter().filter_map(toml::Value::as_str).collect(),
            _ => continue,
        };
        for name in names.into_iter().map(str::trim) {
            if name.is_empty() || name == super::REQUIRED_MARKER {
                continue;
            }
            found
                .entry(name.to_string())
                .and_modify(|existing| *existing = existing.merge(kind))
                .or_insert(kind);
        }
    }
}

fn identity_kind_for_key(key: &str) -> Option<IdentityKind> {
    let key = key.to_ascii_uppercase();
    if key.contains("PASSWORD") || key.contains("SECRET") {
        return None;
    }
    match (key.contains("USER"), key.contains("GROUP")) {
        (true, true) => Some(IdentityKind::Either),
        (false, true) => Some(IdentityKind::Group),
        (true, false) => Some(IdentityKind::User),
        (false, false) => None,
    }
}

/// Interpret a TOML value as a boolean flag
pub(crate) fn value_as_flag(value: &toml::Value) -> Option<bool> {
    match value {
        toml::Value::Boolean(flag) => Some(*flag),
        toml::Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(i64),
    Text(String),
}

impl PortValue {
    fn into_port<E: serde::de::Error>(self) -> std::result::Result<u16, E> {
        let number = match self {
            Self::Number(n) => n,
            Self::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("port '{text}' is not a number")))?,
        };
        u16::try_from(number).map_err(|_| E::custom(format!("port {number} is out of range")))
    }
}

fn port<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u16, D::Error> {
    PortValue::deserialize(deserializer)?.into_port()
}

fn optional_port<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<u16>, D::Error> {
    PortValue::deserialize(deserializer)?.into_port().map(Some)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagValue {
    Bool(bool),
    Text(String),
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    match FlagValue::deserialize(deserializer)? {
        FlagValue::Bool(flag) => Ok(flag),
        FlagValue::Text(text) => value_as_flag(&toml::Value::String(text.clone()))
            .ok_or_else(|| serde::de::Error::custom(format!("'{text}' is not true or false"))),
    }
}
