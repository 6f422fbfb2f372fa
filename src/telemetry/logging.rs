// Copyright 2024-2026 Workspace Arena Contributors
// SPDX-License-Identifier: Apache-2.0

//! Subscriber setup driven by [`LogConfig`].
//!
//! The config is part of [`EnvConfig`](crate::config::EnvConfig) and is read
//! from `WSA_LOG_FORMAT`, `WSA_LOG_LEVEL` and `WSA_LOG_FILE` or the matching
//! TOML keys. Without a file, events go to stderr so that reports printed on
//! stdout stay machine-readable.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LEVEL: &str = "warn";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Multi-line human-readable output.
    #[default]
    Pretty,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        }
    }
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(LogError::InvalidFormat(other.to_string())),
        }
    }
}

/// Logging section of the crate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub log_format: LogFormat,
    /// `EnvFilter` directive, e.g. `"info"` or `"workspace_arena=trace"`.
    pub log_level: String,
    /// Append events to this file instead of stderr.
    pub log_file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_level: DEFAULT_LEVEL.to_string(),
            log_file: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter '{directive}': {reason}")]
    InvalidFilter { directive: String, reason: String },
    #[error("Invalid log format: {0} (expected json or pretty)")]
    InvalidFormat(String),
    #[error("Failed to open log file {path}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

impl LogConfig {
    /// Same config with `log_level` replaced.
    pub fn with_level(self, level: impl Into<String>) -> Self {
        Self { log_level: level.into(), ..self }
    }

    fn filter(&self) -> Result<EnvFilter, LogError> {
        EnvFilter::try_new(&self.log_level).map_err(|e| LogError::InvalidFilter {
            directive: self.log_level.clone(),
            reason: e.to_string(),
        })
    }

    /// Check the filter directive without installing anything.
    pub fn validate(&self) -> Result<(), LogError> {
        self.filter().map(|_| ())
    }

    fn make_writer(&self) -> Result<BoxMakeWriter, LogError> {
        match &self.log_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| LogError::FileOpen { path: path.clone(), source })?;
                Ok(BoxMakeWriter::new(Mutex::new(file)))
            }
            None => Ok(BoxMakeWriter::new(std::io::stderr)),
        }
    }
}

/// Install the global tracing subscriber. Call once at startup.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = config.filter()?;
    let writer = config.make_writer()?;
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.log_format {
        LogFormat::Json => registry.with(fmt::layer().json().with_writer(writer)).try_init(),
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_ansi(config.log_file.is_none())
                    .with_writer(writer),
            )
            .try_init(),
    };
    installed.map_err(|_| LogError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" pretty ".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!(matches!("xml".parse::<LogFormat>(), Err(LogError::InvalidFormat(_))));
        assert_eq!(LogFormat::Json.as_str(), "json");
    }

    #[test]
    fn invalid_filter_is_rejected_before_install() {
        let config = LogConfig::default().with_level("workspace_arena=loud");
        assert!(matches!(config.validate(), Err(LogError::InvalidFilter { .. })));
        assert!(matches!(init_logging(&config), Err(LogError::InvalidFilter { .. })));
        assert!(LogConfig::default().validate().is_ok());
    }

    #[test]
    fn file_sink_is_created_in_append_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arena.log");
        std::fs::write(&path, "earlier\n").unwrap();
        let config = LogConfig { log_file: Some(path.clone()), ..Default::default() };
        assert!(config.make_writer().is_ok());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "earlier\n");

        let missing = LogConfig {
            log_file: Some(dir.path().join("no/such/dir/arena.log")),
            ..Default::default()
        };
        assert!(matches!(missing.make_writer(), Err(LogError::FileOpen { .. })));
    }

    #[test]
    fn deserializes_from_toml_keys() {
        let config: LogConfig = toml::from_str("log_format = \"json\"\nlog_file = \"/tmp/x.log\"").unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/x.log")));
    }
}
