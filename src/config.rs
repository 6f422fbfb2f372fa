// Copyright 2024-2026 Workspace Arena Contributors
// SPDX-License-Identifier: Apache-2.0

//! Default workspace configuration from environment variables and TOML files.
//!
//! Values are loaded from `WSA_*` environment variables with sensible
//! defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `WSA_INITIAL_SIZE` | 0 | Arena size at creation (bytes) |
//! | `WSA_MAX_SIZE` | 0 | Growth limit (bytes, 0 = unbounded) |
//! | `WSA_OVERALLOCATION_LIMIT` | 0.3 | Fraction added on resize |
//! | `WSA_ALLOCATION_POLICY` | overallocate | `strict` or `overallocate` |
//! | `WSA_LEARNING_POLICY` | first_loop | `none`, `first_loop` or `over_time` |
//! | `WSA_MIRRORING_POLICY` | full | `full` or `host_only` |
//! | `WSA_SPILL_POLICY` | external | `fail`, `reallocate` or `external` |
//! | `WSA_RECLAIMER_THREAD` | workspace-reclaimer | Reclaimer thread name |
//! | `WSA_SHUTDOWN_TIMEOUT` | 5 | Reclaimer drain timeout (secs) |
//! | `WSA_LOG_FORMAT` | pretty | `json` or `pretty` |
//! | `WSA_LOG_LEVEL` | warn | Log filter directive |
//! | `WSA_LOG_FILE` | (stderr) | Append logs to this file |

use std::path::{Path, PathBuf};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::WorkspaceError;
use crate::memory::{ManagerConfig, ReclaimerConfig, WorkspaceConfig};
use crate::telemetry::{LogConfig, LogError};

const DEFAULT_RECLAIMER_THREAD: &str = "workspace-reclaimer";
const DEFAULT_SHUTDOWN_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] WorkspaceError),
    #[error("Invalid logging configuration: {0}")]
    Logging(#[from] LogError),
}

/// Process-wide defaults for the workspace manager.
///
/// The TOML file layout uses the same names as the environment variables,
/// lower-cased and without the `WSA_` prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    #[serde(flatten)]
    pub workspace: WorkspaceConfig,
    pub reclaimer_thread: String,
    pub shutdown_timeout_secs: u64,
    #[serde(flatten)]
    pub logging: LogConfig,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            workspace: WorkspaceConfig::default(),
            reclaimer_thread: DEFAULT_RECLAIMER_THREAD.to_string(),
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_SECS,
            logging: LogConfig::default(),
        }
    }
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a finite, non-negative `f64` env var.
fn parse_fraction(key: &str, default: f64) -> f64 {
    match std::env::var(key) {
        Ok(val) => match val.trim().parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => v,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Parse a named-choice env var, logging and keeping `default` on unknown values.
fn parse_choice<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(val) => match val.parse::<T>() {
            Ok(policy) => policy,
            Err(e) => {
                tracing::warn!(key, error = %e, "ignoring invalid value");
                default
            }
        },
        Err(_) => default,
    }
}

fn load_workspace_config(base: WorkspaceConfig) -> WorkspaceConfig {
    let initial_size = parse_usize("WSA_INITIAL_SIZE", base.initial_size);
    let max_size = parse_usize("WSA_MAX_SIZE", base.max_size);
    // initial never above a set max
    let initial_size = if max_size > 0 { initial_size.min(max_size) } else { initial_size };
    WorkspaceConfig {
        initial_size,
        max_size,
        overallocation_limit: parse_fraction("WSA_OVERALLOCATION_LIMIT", base.overallocation_limit),
        allocation_policy: parse_choice("WSA_ALLOCATION_POLICY", base.allocation_policy),
        learning_policy: parse_choice("WSA_LEARNING_POLICY", base.learning_policy),
        mirroring_policy: parse_choice("WSA_MIRRORING_POLICY", base.mirroring_policy),
        spill_policy: parse_choice("WSA_SPILL_POLICY", base.spill_policy),
    }
}

fn load_log_config(base: LogConfig) -> LogConfig {
    let log_format = parse_choice("WSA_LOG_FORMAT", base.log_format);
    let log_level = match std::env::var("WSA_LOG_LEVEL") {
        Ok(level) if !level.trim().is_empty() => {
            let candidate = base.clone().with_level(level.trim());
            match candidate.validate() {
                Ok(()) => candidate.log_level,
                Err(e) => {
                    tracing::warn!(key = "WSA_LOG_LEVEL", error = %e, "ignoring invalid value");
                    base.log_level
                }
            }
        }
        _ => base.log_level,
    };
    let log_file = match std::env::var("WSA_LOG_FILE") {
        Ok(path) if !path.trim().is_empty() => Some(PathBuf::from(path.trim())),
        _ => base.log_file,
    };
    LogConfig { log_format, log_level, log_file }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    EnvConfig::default().with_env_overrides()
}

/// Load a TOML config file. Fields not present keep their defaults.
pub fn load_file(path: impl AsRef<Path>) -> Result<EnvConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: EnvConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

impl EnvConfig {
    /// Apply `WSA_*` variables on top of these values.
    pub fn with_env_overrides(self) -> Self {
        let reclaimer_thread = match std::env::var("WSA_RECLAIMER_THREAD") {
            Ok(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => self.reclaimer_thread,
        };
        let shutdown_timeout_secs = parse_u64("WSA_SHUTDOWN_TIMEOUT", self.shutdown_timeout_secs).max(1);
        Self {
            workspace: load_workspace_config(self.workspace),
            reclaimer_thread,
            shutdown_timeout_secs,
            logging: load_log_config(self.logging),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.workspace.validate()?;
        if self.reclaimer_thread.trim().is_empty() {
            return Err(WorkspaceError::InvalidArgument("reclaimer_thread must not be empty".into()).into());
        }
        self.logging.validate()?;
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Manager configuration with these defaults.
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            default_workspace: self.workspace,
            reclaimer: ReclaimerConfig {
                thread_name: self.reclaimer_thread.clone(),
                shutdown_timeout: self.shutdown_timeout(),
            },
        }
    }
}
