//! Progress reporting
//!
//! Validators report what they are doing through a [`Progress`] sink instead of printing. The
//! binary narrates to the terminal with [`ConsoleProgress`]; tests collect events with
//! [`RecordingProgress`].

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{EntityKey, EntityOutcome};
use crate::ldap::IdentityStatus;

/// Validation phases, in run order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Directories,
    Identities,
    StorageClasses,
    Databases,
    IdentityProviders,
}

impl Phase {
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::Directories => "Checking LDAP connections",
            Self::Identities => "Checking LDAP users and groups",
            Self::StorageClasses => "Checking storage classes",
            Self::Databases => "Checking database connections",
            Self::IdentityProviders => "Checking identity providers",
        }
    }
}

/// Something worth telling the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    PhaseStarted { phase: Phase, total: usize },
    EntityStarted { key: EntityKey },
    EntityFinished { key: EntityKey, outcome: EntityOutcome },
    IdentityWarning { name: String, status: IdentityStatus, directories: Vec<String> },
}

/// Receives progress events
pub trait Progress: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

/// Narrates progress on a terminal stream
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    to_stderr: bool,
    done: AtomicUsize,
    total: AtomicUsize,
}

impl ConsoleProgress {
    /// Narrate on stdout
    #[must_use]
    pub fn stdout() -> Self {
        Self::default()
    }

    /// Narrate on stderr, keeping stdout free for machine-readable output
    #[must_use]
    pub fn stderr() -> Self {
        Self { to_stderr: true, ..Self::default() }
    }

    fn line(&self, text: &str) {
        // Narration is best effort; a closed terminal must not abort validation
        if self.to_stderr {
            let _ = writeln!(std::io::stderr(), "{text}");
        } else {
            let _ = writeln!(std::io::stdout(), "{text}");
        }
    }
}

impl Progress for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::PhaseStarted { phase, total } => {
                self.done.store(0, Ordering::Relaxed);
                self.total.store(total, Ordering::Relaxed);
                self.line(&format!("\n{}", phase.title()));
            }
            ProgressEvent::EntityStarted { .. } => {}
            ProgressEvent::EntityFinished { key, outcome } => {
                let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
                let total = self.total.load(Ordering::Relaxed);
                let mark = if outcome.passed { "PASSED" } else { "FAILED" };
                self.line(&format!("  [{done}/{total}] {mark} {key}: {}", outcome.detail));
                if let Some(latency) = outcome.latency {
                    let millis = outcome.round_trip_ms.unwrap_or_default();
                    self.line(&format!("          round trip {millis} ms ({latency})"));
                }
                if !outcome.passed {
                    if let Some(hint) = &outcome.hint {
                        self.line(&format!("          hint: {hint}"));
                    }
                }
            }
            ProgressEvent::IdentityWarning { name, status, directories } => match status {
                IdentityStatus::Missing => {
                    self.line(&format!("  WARNING \"{name}\" was not found in any LDAP"));
                }
                IdentityStatus::Duplicated => self.line(&format!(
                    "  WARNING \"{name}\" was found in more than one LDAP: {}",
                    directories.join(", ")
                )),
                IdentityStatus::Found => {}
            },
        }
    }
}

/// Keeps every event for later inspection
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Phases started so far, in order
    #[must_use]
    pub fn phases(&self) -> Vec<Phase> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::PhaseStarted { phase, .. } => Some(phase),
                _ => None,
            })
            .collect()
    }
}

impl Progress for RecordingProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_keeps_order() {
        let progress = RecordingProgress::new();
        progress.event(ProgressEvent::PhaseStarted { phase: Phase::Directories, total: 1 });
        progress.event(ProgressEvent::EntityStarted { key: EntityKey::directory("LDAP") });
        progress.event(ProgressEvent::PhaseStarted { phase: Phase::Databases, total: 2 });

        assert_eq!(progress.events().len(), 3);
        assert_eq!(progress.phases(), vec![Phase::Directories, Phase::Databases]);
    }
}
