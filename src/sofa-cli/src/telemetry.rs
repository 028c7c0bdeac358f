//! Tracing setup with file-based logging
//!
//! - JSON formatted logs to file
//! - Console output on stderr, so stdout stays clean for command output
//! - Size-based rotation (10MB per file) with daily rotation

use anyhow::Result;
use rolling_file::{RollingConditionBasic, RollingFileAppender};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing with file logging
///
/// Returns a guard that must be kept alive to ensure logs are flushed
pub fn init_telemetry(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    // Rotates when the file reaches 10MB or daily, whichever comes first
    let file_appender = RollingFileAppender::new(
        log_dir.join("sofa.log"),
        RollingConditionBasic::new()
            .daily()
            .max_size(10 * 1024 * 1024),
        9,
    )?;

    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sofa=info,sofa_rs=debug,sofa_core=debug"));

    let file_layer = fmt::layer()
        .json()
        .with_writer(non_blocking_file)
        .with_current_span(true)
        .with_target(true)
        .with_thread_ids(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    tracing::debug!("Telemetry initialized with file logging to {:?}", log_dir);

    Ok(guard)
}
