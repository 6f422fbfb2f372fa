// Copyright 2024-2026 Workspace Arena Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommands for `workspace-arena-cli`.
//!
//! ## Usage
//!
//! ```bash
//! workspace-arena-cli config show      # Effective configuration (env applied)
//! workspace-arena-cli config validate  # Exit 0 if the configuration is usable
//! workspace-arena-cli demo --threads 4 # Run a workload against a mock allocator
//! ```

pub mod config_cmd;
pub mod demo_cmd;

/// Value following `flag` in `args`, if any.
pub fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}
