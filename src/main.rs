//! fncm-prereq CLI Entry Point
//!
//! Two subcommands:
//! - `check` - report deficiencies (unfilled fields, missing tools, certificate problems) only
//! - `validate` - run every validator and optionally apply the generated artifacts
//!
//! Narration goes to stdout, or to stderr with `--json` so stdout holds only the envelope.
//! Exit codes: 0 passed, 1 validation failed, 2 deficiencies found, 3 could not run.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::Confirm;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use fncm_prereq::storage::{apply_custom_resource, apply_secrets, ApplyReport};
use fncm_prereq::validate::{assess, run, Assessment, Deficiencies, Outcome, Report};
use fncm_prereq::{
    logging, resolve_settings, ConsoleProgress, ErrorEnvelope, LdapClient, Metadata, PrereqError,
    SettingsLayer, SuccessEnvelope, SystemRunner, Workspace,
};

/// FileNet Content Manager prerequisite validation
#[derive(Parser)]
#[command(name = "fncm-prereq")]
#[command(about = "Validates FNCM deployment prerequisites before applying generated artifacts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report configuration, tool and certificate deficiencies without connecting to anything
    Check {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Validate directories, storage classes and databases
    Validate {
        #[command(flatten)]
        common: CommonArgs,

        /// Apply secrets and the custom resource after a passing run without asking
        #[arg(long)]
        apply: bool,

        /// Number of PVC phase checks per storage class
        #[arg(long, value_name = "N")]
        pvc_attempts: Option<u32>,

        /// Seconds between PVC phase checks
        #[arg(long, value_name = "SECS")]
        pvc_interval: Option<u64>,

        /// Namespace for the test claim and applied artifacts
        #[arg(long, short = 'n')]
        namespace: Option<String>,

        /// Check PostgreSQL databases without SSL in-process instead of through the JDBC helper
        #[arg(long)]
        native_postgres: bool,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Workspace root holding propertyFile/ and generatedFiles/
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Settings file applied over the local and global settings
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Print a single JSON envelope on stdout
    #[arg(long)]
    json: bool,

    /// Echo debug logs on stderr
    #[arg(long, short = 'v')]
    verbose: bool,
}

const EXIT_FAILED: u8 = 1;
const EXIT_DEFICIENT: u8 = 2;
const EXIT_ERROR: u8 = 3;

#[derive(Serialize)]
struct CheckData<'a> {
    ready: bool,
    deficiencies: &'a Deficiencies,
}

#[derive(Serialize)]
struct ValidateData<'a> {
    deficiencies: Option<&'a Deficiencies>,
    report: Option<&'a Report>,
    applied: Vec<ApplyReport>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let (command, json) = match &cli.command {
        Commands::Check { common } => ("check", common.json),
        Commands::Validate { common, .. } => ("validate", common.json),
    };

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            if json {
                let envelope = match e.downcast_ref::<PrereqError>() {
                    Some(err) => ErrorEnvelope::from_error(command, err),
                    None => ErrorEnvelope::from_error(command, &PrereqError::invalid_input(format!("{e:#}"))),
                };
                println!("{}", serde_json::to_string(&envelope).unwrap_or_default());
            } else {
                eprintln!("error: {e:#}");
            }
            ExitCode::from(EXIT_ERROR)
        }
    }
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let started = Instant::now();
    match cli.command {
        Commands::Check { common } => {
            let workspace = workspace(&common)?;
            let settings = resolve_settings(workspace.root(), common.settings.as_deref(), SettingsLayer::default())?;
            let _guard = logging::init(&workspace.root().join(&settings.log_file), common.verbose)?;
            let runner = SystemRunner::new().with_timeout(settings.command_timeout()).in_dir(workspace.root());

            let deficiencies = match assess(&workspace, &runner).await? {
                Assessment::Ready(_) => Deficiencies::default(),
                Assessment::Deficient(deficiencies) => deficiencies,
            };
            let ready = deficiencies.is_empty();
            if common.json {
                let data = CheckData { ready, deficiencies: &deficiencies };
                print_envelope("check", &data, Metadata::new(elapsed_ms(started)))?;
            } else {
                print_deficiencies(&deficiencies);
            }
            Ok(if ready { ExitCode::SUCCESS } else { ExitCode::from(EXIT_DEFICIENT) })
        }
        Commands::Validate { common, apply, pvc_attempts, pvc_interval, namespace, native_postgres } => {
            let workspace = workspace(&common)?;
            let overrides = SettingsLayer {
                pvc_attempts,
                pvc_interval_secs: pvc_interval,
                namespace,
                native_postgres: native_postgres.then_some(true),
                ..SettingsLayer::default()
            };
            let settings = resolve_settings(workspace.root(), common.settings.as_deref(), overrides)?;
            let _guard = logging::init(&workspace.root().join(&settings.log_file), common.verbose)?;
            let runner = SystemRunner::new().with_timeout(settings.command_timeout()).in_dir(workspace.root());
            let client = LdapClient::new(settings.connect_timeout());
            let progress = if common.json { ConsoleProgress::stderr() } else { ConsoleProgress::stdout() };

            let outcome = run(&workspace, &settings, &runner, &client, &progress).await?;
            let report = match &outcome {
                Outcome::Deficient(deficiencies) => {
                    if common.json {
                        let data = ValidateData { deficiencies: Some(deficiencies), report: None, applied: Vec::new() };
                        print_envelope("validate", &data, Metadata::new(elapsed_ms(started)))?;
                    } else {
                        print_deficiencies(deficiencies);
                    }
                    return Ok(ExitCode::from(EXIT_DEFICIENT));
                }
                Outcome::Completed(report) => report,
            };

            if !common.json {
                print_summary(report);
            }

            let mut applied = Vec::new();
            if report.passed && (apply || !common.json) {
                let ns = settings.namespace.as_deref();
                if apply || confirm("Do you want to apply the SSL & Secrets?")? {
                    applied.push(apply_secrets(&runner, &workspace, ns).await);
                }
                if apply || confirm("Do you want to apply the CR?")? {
                    applied.push(apply_custom_resource(&runner, &workspace, ns, &report.results, &report.expected).await?);
                }
                if !common.json {
                    print_applied(&applied);
                }
            }

            if common.json {
                let data = ValidateData { deficiencies: None, report: Some(report), applied };
                let meta = Metadata::with_entities(elapsed_ms(started), report.results.len());
                print_envelope("validate", &data, meta)?;
            }
            Ok(if report.passed { ExitCode::SUCCESS } else { ExitCode::from(EXIT_FAILED) })
        }
    }
}

fn workspace(common: &CommonArgs) -> Result<Workspace> {
    match &common.root {
        Some(root) => Ok(Workspace::new(root)),
        None => Workspace::current().context("Could not locate the workspace"),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn confirm(prompt: &str) -> Result<bool> {
    Confirm::new().with_prompt(prompt).default(false).interact().context("Could not read the answer")
}

fn print_envelope<T: Serialize>(command: &str, data: &T, meta: Metadata) -> Result<()> {
    let envelope = SuccessEnvelope::new(command, data, meta);
    println!("{}", serde_json::to_string(&envelope).context("Could not serialize output")?);
    Ok(())
}

fn print_deficiencies(deficiencies: &Deficiencies) {
    if deficiencies.is_empty() {
        println!("No deficiencies found, ready to validate.");
        return;
    }
    println!("Resolve the following before validating:");
    for line in deficiencies.lines() {
        println!("  - {line}");
    }
}

fn print_summary(report: &Report) {
    println!();
    if report.passed {
        println!("All prerequisites passed ({} checks).", report.results.len());
        return;
    }
    let failures: Vec<_> = report.results.failures().collect();
    println!("{} of {} checks failed:", failures.len(), report.results.len());
    for (key, outcome) in failures {
        println!("  - {key}: {}", outcome.detail);
    }
    for key in report.results.missing(&report.expected) {
        println!("  - {key}: not checked");
    }
    println!("See the log file for details.");
}

fn print_applied(applied: &[ApplyReport]) {
    for report in applied {
        for path in &report.applied {
            println!("Applied {}", path.display());
        }
        for (path, detail) in &report.failed {
            println!("Failed to apply {}: {detail}", path.display());
        }
    }
}
