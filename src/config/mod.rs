//! Configuration Management
//!
//! This module loads the property documents that describe a deployment and turns them into a
//! typed [`ConfigRecord`].
//!
//! # Property Documents
//! All documents live in `propertyFile/` under the workspace root:
//! - `fncm_db_server.toml` (required): database family, SSL flags, one section per database
//! - `fncm_ldap_server.toml` (required): one section per directory server
//! - `fncm_deployment.toml` (required): product release, platform, storage classes
//! - `fncm_user_group.toml`, `fncm_components_options.toml` (optional): user and group names
//! - `fncm_identity_provider.toml` (optional): identity provider endpoints
//!
//! # Required Fields
//! The gatherer writes `"<Required>"` into every value the operator still has to fill in.
//! [`scan_required_fields`] reports those (and empty strings) with their full key path. A record
//! is only built once nothing is left unfilled.
//!
//! # Workspace Layout
//! [`Workspace`] knows where certificate folders, JDBC drivers, helper jars and generated
//! artifacts live relative to the root.

mod record;
mod settings;

pub use record::{
    collect_identities, directories_from_table, identity_providers_from_table,
    parse_oracle_address, ConfigRecord, DbEndpoint, DbTopology, Deployment, Identity,
    IdentityKind, IdentityProvider, LdapServer, ProductRelease, SslMode, StorageTiers,
    DEFAULT_GROUP_FILTER, DEFAULT_USER_FILTER,
};
pub use settings::{
    global_settings_path, load_layer, local_settings_path, resolve_settings, Settings,
    SettingsLayer,
};

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::DatabaseFamily;
use crate::error::{PrereqError, Result};

/// Placeholder written by the gatherer for values the operator must supply
pub const REQUIRED_MARKER: &str = "<Required>";

pub const DB_PROPERTY_FILE: &str = "fncm_db_server.toml";
pub const LDAP_PROPERTY_FILE: &str = "fncm_ldap_server.toml";
pub const DEPLOYMENT_PROPERTY_FILE: &str = "fncm_deployment.toml";
pub const USER_GROUP_PROPERTY_FILE: &str = "fncm_user_group.toml";
pub const COMPONENTS_PROPERTY_FILE: &str = "fncm_components_options.toml";
pub const IDP_PROPERTY_FILE: &str = "fncm_identity_provider.toml";

/// Directory layout of a prerequisites workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Workspace rooted at the current working directory
    pub fn current() -> Result<Self> {
        let root = std::env::current_dir().map_err(|e| {
            PrereqError::config_error(format!("Could not determine current directory: {e}"))
        })?;
        Ok(Self::new(root))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `propertyFile/`
    #[must_use]
    pub fn property_dir(&self) -> PathBuf {
        self.root.join("propertyFile")
    }

    /// `propertyFile/ssl-certs/`
    #[must_use]
    pub fn ssl_certs_dir(&self) -> PathBuf {
        self.property_dir().join("ssl-certs")
    }

    /// Certificate folder for an entity id (`LDAP2` → `ssl-certs/ldap2`)
    #[must_use]
    pub fn cert_dir(&self, entity_id: &str) -> PathBuf {
        self.ssl_certs_dir().join(entity_id.to_lowercase())
    }

    /// JDBC driver folder for a release and family
    #[must_use]
    pub fn jdbc_dir(&self, release: ProductRelease, family: DatabaseFamily) -> PathBuf {
        self.helper_dir().join("jdbc").join(release.jdbc_folder()).join(family.dir_name())
    }

    /// Connection-helper jar folder for a family
    #[must_use]
    pub fn connector_dir(&self, family: DatabaseFamily) -> PathBuf {
        self.helper_dir().join("jars").join(family.dir_name())
    }

    /// `generatedFiles/`
    #[must_use]
    pub fn generated_dir(&self) -> PathBuf {
        self.root.join("generatedFiles")
    }

    /// `generatedFiles/secrets/`
    #[must_use]
    pub fn secrets_dir(&self) -> PathBuf {
        self.generated_dir().join("secrets")
    }

    /// `generatedFiles/ssl/`, only present when SSL secrets were generated
    #[must_use]
    pub fn ssl_secrets_dir(&self) -> PathBuf {
        self.generated_dir().join("ssl")
    }

    /// The generated custom resource manifest
    #[must_use]
    pub fn custom_resource(&self) -> PathBuf {
        self.generated_dir().join("ibm_fncm_cr_production.yaml")
    }

    fn helper_dir(&self) -> PathBuf {
        self.root.join("helper_scripts").join("validate")
    }
}

/// A value the operator has not filled in yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequiredField {
    /// Property document file name
    pub file: String,

    /// Key path inside the document, outermost first
    pub path: Vec<String>,
}

impl RequiredField {
    /// `SECTION.KEY` form used in reports
    #[must_use]
    pub fn dotted(&self) -> String {
        self.path.join(".")
    }
}

/// Read and parse one TOML property document
pub fn load_document(path: &Path) -> Result<toml::Table> {
    let contents = fs::read_to_string(path).map_err(|e| {
        PrereqError::config_error(format!("Could not read property file {}: {e}", path.display()))
    })?;

    contents.parse::<toml::Table>().map_err(|e| {
        PrereqError::config_error(format!("Invalid property file {}: {e}", path.display()))
    })
}

/// Recursively find values that still need operator input
///
/// A leaf is required when it equals `"<Required>"` or `""`; an array is required when it
/// contains `"<Required>"`.
#[must_use]
pub fn scan_required_fields(file: &str, table: &toml::Table) -> Vec<RequiredField> {
    let mut found = Vec::new();
    scan_table(file, table, &mut Vec::new(), &mut found);
    found
}

fn scan_table(
    file: &str,
    table: &toml::Table,
    history: &mut Vec<String>,
    found: &mut Vec<RequiredField>,
) {
    for (key, value) in table {
        history.push(key.clone());
        let required = match value {
            toml::Value::Table(inner) => {
                scan_table(file, inner, history, found);
                false
            }
            toml::Value::Array(items) => items.iter().any(|i| i.as_str() == Some(REQUIRED_MARKER)),
            toml::Value::String(text) => text.is_empty() || text == REQUIRED_MARKER,
            _ => false,
        };
        if required {
            found.push(RequiredField { file: file.to_string(), path: history.clone() });
        }
        history.pop();
    }
}

/// Every property document, parsed but not yet typed
#[derive(Debug, Clone)]
pub struct PropertyDocuments {
    pub db: toml::Table,
    pub ldap: toml::Table,
    pub deployment: toml::Table,
    pub user_group: Option<toml::Table>,
    pub components: Option<toml::Table>,
    pub identity_providers: Option<toml::Table>,
}

impl PropertyDocuments {
    /// Load the documents from `workspace`; optional documents may be absent
    pub fn load(workspace: &Workspace) -> Result<Self> {
        let dir = workspace.property_dir();
        let optional = |name: &str| -> Result<Option<toml::Table>> {
            let path = dir.join(name);
            if path.exists() {
                load_document(&path).map(Some)
            } else {
                Ok(None)
            }
        };

        Ok(Self {
            db: load_document(&dir.join(DB_PROPERTY_FILE))?,
            ldap: load_document(&dir.join(LDAP_PROPERTY_FILE))?,
            deployment: load_document(&dir.join(DEPLOYMENT_PROPERTY_FILE))?,
            user_group: optional(USER_GROUP_PROPERTY_FILE)?,
            components: optional(COMPONENTS_PROPERTY_FILE)?,
            identity_providers: optional(IDP_PROPERTY_FILE)?,
        })
    }

    /// Required fields across every loaded document, in file order
    #[must_use]
    pub fn required_fields(&self) -> Vec<RequiredField> {
        let mut fields = scan_required_fields(DB_PROPERTY_FILE, &self.db);
        fields.extend(scan_required_fields(LDAP_PROPERTY_FILE, &self.ldap));
        fields.extend(scan_required_fields(DEPLOYMENT_PROPERTY_FILE, &self.deployment));
        let optional = [
            (USER_GROUP_PROPERTY_FILE, &self.user_group),
            (COMPONENTS_PROPERTY_FILE, &self.components),
            (IDP_PROPERTY_FILE, &self.identity_providers),
        ];
        for (file, table) in optional {
            if let Some(table) = table {
                fields.extend(scan_required_fields(file, table));
            }
        }
        fields
    }

    /// Build the typed record
    pub fn into_record(self) -> Result<ConfigRecord> {
        let databases = DbTopology::from_table(&self.db)?;
        let directories = directories_from_table(&self.ldap)?;
        let deployment = Deployment::from_table(&self.deployment)?;
        let identity_providers = match &self.identity_providers {
            Some(table) => identity_providers_from_table(table)?,
            None => Vec::new(),
        };
        let identity_sources: Vec<&toml::Table> =
            [self.user_group.as_ref(), self.components.as_ref()].into_iter().flatten().collect();
        let identities = collect_identities(&identity_sources);

        Ok(ConfigRecord { databases, directories, deployment, identity_providers, identities })
    }
}

/// Outcome of loading the property documents
#[derive(Debug, Clone)]
pub enum LoadedConfig {
    /// Every value is filled in
    Complete(ConfigRecord),

    /// Some values still need operator input; no record was built
    Incomplete(Vec<RequiredField>),
}

/// Load the property documents and build the record when nothing is left unfilled
pub fn load_record(workspace: &Workspace) -> Result<LoadedConfig> {
    let documents = PropertyDocuments::load(workspace)?;
    let required = documents.required_fields();
    if !required.is_empty() {
        return Ok(LoadedConfig::Incomplete(required));
    }
    documents.into_record().map(LoadedConfig::Complete)
}
