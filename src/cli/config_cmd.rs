// Copyright 2024-2026 Workspace Arena Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.

use std::path::Path;

use crate::config::{self, ConfigError, EnvConfig};

/// Load from `file` when given, then apply `WSA_*` overrides.
fn load_effective(file: Option<&Path>) -> Result<EnvConfig, ConfigError> {
    match file {
        Some(path) => Ok(config::load_file(path)?.with_env_overrides()),
        None => Ok(config::load()),
    }
}

/// Print the effective config as key-value pairs to stdout.
pub fn run_show(file: Option<&Path>) -> i32 {
    match load_effective(file) {
        Ok(cfg) => {
            print_config(&cfg);
            0
        }
        Err(e) => {
            eprintln!("ERROR: {}", e);
            2
        }
    }
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    print_config(&EnvConfig::default());
}

/// Validate configuration. Returns 0 if valid, 1 on warnings, 2 on errors.
pub fn run_validate(file: Option<&Path>) -> i32 {
    let cfg = match load_effective(file) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return 2;
        }
    };
    if let Err(e) = cfg.validate() {
        eprintln!("ERROR: {}", e);
        return 2;
    }

    let warnings = collect_warnings(&cfg);
    for w in &warnings {
        eprintln!("WARNING: {}", w);
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

fn collect_warnings(cfg: &EnvConfig) -> Vec<String> {
    use crate::memory::{LearningPolicy, SpillPolicy};

    let ws = &cfg.workspace;
    let mut warnings = Vec::new();
    if ws.initial_capacity() == 0 && ws.learning_policy == LearningPolicy::None {
        warnings.push("WSA_INITIAL_SIZE and WSA_MAX_SIZE are 0 with learning disabled; every allocation spills".to_string());
    }
    if ws.initial_capacity() == 0 && ws.spill_policy == SpillPolicy::Fail {
        warnings.push("WSA_SPILL_POLICY=fail with an empty arena rejects allocations".to_string());
    }
    warnings
}

fn print_config(cfg: &EnvConfig) {
    let ws = &cfg.workspace;
    println!("WSA_INITIAL_SIZE={}", ws.initial_size);
    println!("WSA_MAX_SIZE={}", ws.max_size);
    println!("WSA_OVERALLOCATION_LIMIT={}", ws.overallocation_limit);
    println!("WSA_ALLOCATION_POLICY={}", policy_name(&ws.allocation_policy));
    println!("WSA_LEARNING_POLICY={}", policy_name(&ws.learning_policy));
    println!("WSA_MIRRORING_POLICY={}", policy_name(&ws.mirroring_policy));
    println!("WSA_SPILL_POLICY={}", policy_name(&ws.spill_policy));
    println!("WSA_RECLAIMER_THREAD={}", cfg.reclaimer_thread);
    println!("WSA_SHUTDOWN_TIMEOUT={}", cfg.shutdown_timeout_secs);
    println!("WSA_LOG_FORMAT={}", cfg.logging.log_format.as_str());
    println!("WSA_LOG_LEVEL={}", cfg.logging.log_level);
    println!(
        "WSA_LOG_FILE={}",
        cfg.logging.log_file.as_ref().map(|p| p.display().to_string()).unwrap_or_default()
    );
}

/// The serde name of a policy, as accepted by the env vars.
fn policy_name<T: serde::Serialize>(policy: &T) -> String {
    match serde_json::to_value(policy) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::from("?"),
    }
}
