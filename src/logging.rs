//! Logging setup for the binary.

use std::path::PathBuf;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogThreshold {
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl LogThreshold {
    fn directive(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Off => "off",
        }
    }
}

/// Explicit logging configuration; the environment is never consulted.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub threshold: LogThreshold,
    /// Write to this file (no ANSI) instead of stderr.
    pub log_file: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::new(self.threshold.directive())
    }
}

pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = config.filter();

    if let Some(log_path) = &config.log_file {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create log directory {}", parent.display()))?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .with_context(|| format!("cannot open log file {}", log_path.display()))?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();

        eprintln!("Logging to {}", log_path.display());
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}
