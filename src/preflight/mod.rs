//! Environment Preflight
//!
//! Checks the local tooling the validators depend on: `java`, `keytool` and `kubectl` on the
//! `PATH`, a logged-in cluster context, and a Java runtime whose major version matches the product
//! release. Each gap is one [`Requirement`]; the list is empty when the environment is ready.

use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

use crate::config::ProductRelease;
use crate::kubectl;
use crate::process::{CommandRunner, Invocation};

/// External executables the validators run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Java,
    Keytool,
    Kubectl,
}

impl Tool {
    pub const ALL: [Self; 3] = [Self::Java, Self::Keytool, Self::Kubectl];

    #[must_use]
    pub const fn program(&self) -> &'static str {
        match self {
            Self::Java => "java",
            Self::Keytool => "keytool",
            Self::Kubectl => "kubectl",
        }
    }
}

/// Something the environment is missing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requirement {
    /// Executable not found on the `PATH`
    Tool { tool: Tool },

    /// `kubectl` cannot list pods in the current context
    ClusterLogin,

    /// Installed Java major differs from the release's; `found` is `None` when unreadable
    JavaVersion { required: u32, found: Option<u32> },
}

impl Requirement {
    /// Remediation text shown to the operator
    #[must_use]
    pub fn hint(&self) -> String {
        match self {
            Self::Tool { tool } => format!("install missing tools: {}", tool.program()),
            Self::ClusterLogin => "log in to the cluster (kubectl get pods must succeed)".to_string(),
            Self::JavaVersion { required, .. } => format!("install Java {required} and put it first on the PATH"),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tool { tool } => write!(f, "{} is not installed", tool.program()),
            Self::ClusterLogin => write!(f, "not logged in to a cluster"),
            Self::JavaVersion { required, found: Some(found) } => {
                write!(f, "Java {required} is required, found Java {found}")
            }
            Self::JavaVersion { required, found: None } => {
                write!(f, "Java {required} is required, the installed version could not be read")
            }
        }
    }
}

/// One remediation line covering every missing tool, e.g. `install missing tools: keytool, java`
#[must_use]
pub fn missing_tools_hint(requirements: &[Requirement]) -> Option<String> {
    let tools: Vec<&str> = requirements
        .iter()
        .filter_map(|r| match r {
            Requirement::Tool { tool } => Some(tool.program()),
            _ => None,
        })
        .collect();
    (!tools.is_empty()).then(|| format!("install missing tools: {}", tools.join(", ")))
}

/// Platform lookup command for `program` (`which`, or `where` on Windows)
#[must_use]
pub fn lookup_invocation(program: &str) -> Invocation {
    let finder = if cfg!(windows) { "where" } else { "which" };
    Invocation::new(finder).arg(program)
}

/// Whether `tool` resolves on the `PATH`
pub async fn tool_available<R: CommandRunner>(runner: &R, tool: Tool) -> bool {
    match runner.run(&lookup_invocation(tool.program())).await {
        Ok(output) => output.success() && !output.stdout.trim().is_empty(),
        Err(e) => {
            warn!(tool = tool.program(), error = %e, "tool lookup failed");
            false
        }
    }
}

/// Major version from `java -version` output
///
/// Handles the legacy `1.8.0_392` scheme as well as `11.0.21`, `17` and `21-ea`.
#[must_use]
pub fn parse_java_major(output: &str) -> Option<u32> {
    let line = output.lines().find(|l| l.contains("version"))?;
    let quoted = line.split('"').nth(1)?;
    let mut parts = quoted.split(|c: char| !c.is_ascii_digit()).filter(|p| !p.is_empty());
    let first: u32 = parts.next()?.parse().ok()?;
    if first == 1 {
        parts.next()?.parse().ok()
    } else {
        Some(first)
    }
}

/// Installed Java major, read from `java -version`
pub async fn java_major<R: CommandRunner>(runner: &R) -> Option<u32> {
    let output = runner.run(&Invocation::new("java").arg("-version")).await.ok()?;
    // The version banner goes to stderr
    parse_java_major(&output.stderr).or_else(|| parse_java_major(&output.stdout))
}

/// Every gap in the environment, tools first
///
/// The Java version is only compared when a release is known and `java` is present; cluster login
/// is only tried when `kubectl` is present.
pub async fn check_environment<R: CommandRunner>(
    runner: &R,
    release: Option<ProductRelease>,
) -> Vec<Requirement> {
    let mut requirements = Vec::new();
    let mut present = Vec::new();
    for tool in Tool::ALL {
        if tool_available(runner, tool).await {
            present.push(tool);
        } else {
            requirements.push(Requirement::Tool { tool });
        }
    }

    if present.contains(&Tool::Kubectl) && !kubectl::cluster_reachable(runner).await {
        requirements.push(Requirement::ClusterLogin);
    }

    if let (Some(release), true) = (release, present.contains(&Tool::Java)) {
        let required = release.java_major();
        let found = java_major(runner).await;
        debug!(%release, required, ?found, "java version");
        if found != Some(required) {
            requirements.push(Requirement::JavaVersion { required, found });
        }
    }

    requirements
}
