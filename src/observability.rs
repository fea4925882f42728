//! Logging setup and the lifecycle events shared by the binaries.

use std::env;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::pipeline::PipelineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            _ => Err(()),
        }
    }
}

/// Events always go to stderr so report output on stdout stays clean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            include_target: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub fn logging_config_from_env() -> LoggingConfig {
    let mut config = LoggingConfig::default();

    if let Some(level) = non_empty_var("RANKCORR_LOG_LEVEL") {
        config.level = level;
    }
    if let Some(format) = non_empty_var("RANKCORR_LOG_FORMAT").and_then(|raw| raw.parse().ok()) {
        config.format = format;
    }
    if let Some(flag) = non_empty_var("RANKCORR_LOG_TARGET").and_then(|raw| flag_value(&raw)) {
        config.include_target = flag;
    }

    config
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.include_target)
        .with_writer(io::stderr);

    match config.format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(builder.json().with_ansi(false).finish())?
        }
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
        LogFormat::Compact => tracing::subscriber::set_global_default(builder.compact().finish())?,
    }

    Ok(())
}

pub fn log_app_start(config: &LoggingConfig, pipeline: &PipelineConfig) {
    info!(
        component = "app",
        event = "app.start",
        log_level = %config.level,
        log_format = ?config.format,
        threshold = pipeline.threshold.value(),
        day_boundary_tz = %pipeline.aggregation.day_boundary_tz,
        gap_fill_policy = pipeline.gap_fill_policy.as_str()
    );
}

pub fn log_app_bind(bound_addr: SocketAddr) {
    info!(
        component = "dashboard_server",
        event = "app.bind",
        bind_addr = %bound_addr,
        routes = "/analysis,/dashboard"
    );
}

pub fn log_dataset_preload(path: &Path, outcome: Result<usize, &str>) {
    match outcome {
        Ok(identifiers) => info!(
            component = "dashboard_server",
            event = "dataset.preloaded",
            path = %path.display(),
            identifiers
        ),
        Err(reason) => warn!(
            component = "dashboard_server",
            event = "dataset.preload_failed",
            path = %path.display(),
            reason
        ),
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn flag_value(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Some(true),
        "0" | "false" | "off" => Some(false),
        _ => None,
    }
}
