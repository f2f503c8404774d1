//! Run context: configuration plus the log sink, created once at process start
//!
//! Library code never touches global configuration. The binary builds a
//! [`RunContext`], hands `&RunContext` (or the pieces it needs) down to each
//! component, and drops it at exit so buffered log lines are flushed.

use crate::config::PipelineConfig;
use crate::error::{CensusError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

/// Explicit process context
pub struct RunContext {
    config: PipelineConfig,
    log_file: Option<PathBuf>,
    _guard: Option<WorkerGuard>,
}

impl RunContext {
    /// Install the global subscriber (stdout + log file) and return the context.
    ///
    /// `RUST_LOG` wins over the configured filter when set.
    pub fn init(config: PipelineConfig) -> Result<Self> {
        let log_dir = config.paths.log_dir.clone();
        fs::create_dir_all(&log_dir)?;

        let file_name = log_file_name();
        let appender = tracing_appender::rolling::never(&log_dir, &file_name);
        let (file_writer, guard) = tracing_appender::non_blocking(appender);

        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(config.log_filter()))
            .map_err(|e| CensusError::Config(format!("invalid log filter: {}", e)))?;

        let stdout_layer = fmt::layer().with_target(false).with_writer(std::io::stdout);
        let file_layer = fmt::layer().with_ansi(false).with_writer(file_writer);

        let subscriber = Registry::default()
            .with(env_filter)
            .with(stdout_layer)
            .with(file_layer);
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| CensusError::Config(format!("cannot install subscriber: {}", e)))?;

        let log_file = log_dir.join(file_name);
        tracing::info!(path = %log_file.display(), "Logging initialized");

        Ok(Self {
            config,
            log_file: Some(log_file),
            _guard: Some(guard),
        })
    }

    /// Context without a log sink, for tests and embedding
    pub fn detached(config: PipelineConfig) -> Self {
        Self {
            config,
            log_file: None,
            _guard: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Path of this run's log file, if a sink was installed
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Flush the log sink. Equivalent to dropping the context.
    pub fn finish(self) {
        tracing::debug!("Flushing log sink");
    }
}

fn log_file_name() -> String {
    format!("{}.log", chrono::Local::now().format("%m_%d_%Y_%H_%M_%S"))
}
