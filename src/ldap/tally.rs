//! How many directories each configured user or group was found in

use serde::Serialize;

use crate::config::{Identity, IdentityKind};

/// Where one identity was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TallyEntry {
    pub name: String,
    pub kind: IdentityKind,

    /// Number of directories with at least one match
    pub count: usize,

    /// Ids of those directories, in search order
    pub directories: Vec<String>,
}

/// Classification of an identity after every directory was searched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStatus {
    /// Exactly one directory knows the name
    Found,
    /// No directory knows the name
    Missing,
    /// More than one directory knows the name; logins may resolve ambiguously
    Duplicated,
}

impl IdentityStatus {
    #[must_use]
    pub const fn from_count(count: usize) -> Self {
        match count {
            0 => Self::Missing,
            1 => Self::Found,
            _ => Self::Duplicated,
        }
    }
}

/// Per-identity hit counts across every configured directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdentityTally {
    entries: Vec<TallyEntry>,
}

impl IdentityTally {
    /// A tally with a zero count for every identity
    #[must_use]
    pub fn new(identities: &[Identity]) -> Self {
        let entries = identities
            .iter()
            .map(|identity| TallyEntry {
                name: identity.name.clone(),
                kind: identity.kind,
                count: 0,
                directories: Vec::new(),
            })
            .collect();
        Self { entries }
    }

    /// Return the tally with one more hit for `name` in `directory`
    #[must_use]
    pub fn with_hit(mut self, name: &str, directory: &str) -> Self {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) {
            if !entry.directories.iter().any(|d| d == directory) {
                entry.count += 1;
                entry.directories.push(directory.to_string());
            }
        }
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TallyEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn entries(&self) -> &[TallyEntry] {
        &self.entries
    }

    /// Classify every identity, in the order they were configured
    #[must_use]
    pub fn classify(&self) -> Vec<(&TallyEntry, IdentityStatus)> {
        self.entries.iter().map(|entry| (entry, IdentityStatus::from_count(entry.count))).collect()
    }

    /// Identities that are missing or duplicated
    #[must_use]
    pub fn warnings(&self) -> Vec<(&TallyEntry, IdentityStatus)> {
        self.classify().into_iter().filter(|(_, status)| *status != IdentityStatus::Found).collect()
    }
}
