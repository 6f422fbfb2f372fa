// Copyright 2024-2026 Workspace Arena Contributors
// SPDX-License-Identifier: Apache-2.0

//! Metric names and recording helpers.

use metrics::{counter, gauge};

pub const SPILLS: &str = "workspace_spills_total";
pub const SPILLED_BYTES: &str = "workspace_spilled_bytes_total";
pub const ARENA_RESIZES: &str = "workspace_arena_resizes_total";
pub const RECLAIMED_TOKENS: &str = "workspace_reclaimed_tokens_total";
pub const RECLAIMED_BYTES: &str = "workspace_reclaimed_bytes_total";
pub const RELEASE_FAILURES: &str = "workspace_release_failures_total";
const LAST_ARENA_BYTES: &str = "workspace_last_arena_bytes";

/// Record an allocation served outside the arena.
pub fn record_spill(size: usize) {
    counter!(SPILLS).increment(1);
    counter!(SPILLED_BYTES).increment(size as u64);
}

/// Record an arena replacement (reallocation or learned resize).
pub fn record_arena_resize(target: usize) {
    counter!(ARENA_RESIZES).increment(1);
    gauge!(LAST_ARENA_BYTES).set(target as f64);
}

/// Record released memory: whole tokens from the reclaimer, or single pairs
/// freed on a worker thread (`tokens == 0`).
pub fn record_reclaimed(tokens: u64, bytes_released: u64, release_failures: u64) {
    if tokens > 0 {
        counter!(RECLAIMED_TOKENS).increment(tokens);
    }
    counter!(RECLAIMED_BYTES).increment(bytes_released);
    if release_failures > 0 {
        counter!(RELEASE_FAILURES).increment(release_failures);
    }
}
