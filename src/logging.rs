//! Logging setup for the binary
//!
//! Two layers share one subscriber:
//! - stderr: silent unless `RUST_LOG` is set or `--verbose` is given, since the terminal already
//!   carries the progress narration
//! - log file: everything from this crate at DEBUG, including helper stderr and full error detail
//!
//! The returned guard flushes the file writer and must live until the process exits.

use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::error::{PrereqError, Result};

const FILE_FILTER: &str = "info,fncm_prereq=debug";

fn console_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "fncm_prereq=debug" } else { "off" })
    })
}

/// Install the global subscriber, appending to `log_file`
pub fn init(log_file: &Path, verbose: bool) -> Result<WorkerGuard> {
    let directory = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = log_file.file_name().ok_or_else(|| {
        PrereqError::config_error(format!("Log file {} has no file name", log_file.display()))
    })?;
    fs::create_dir_all(directory).map_err(|e| {
        PrereqError::config_error(format!("Could not create log directory {}: {e}", directory.display()))
    })?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter(verbose));
    let file = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(EnvFilter::new(FILE_FILTER));

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| PrereqError::config_error(format!("Could not initialise logging: {e}")))?;
    Ok(guard)
}
