// Copyright 2024-2026 Workspace Arena Contributors
// SPDX-License-Identifier: Apache-2.0

//! Telemetry for workspace arenas.
//!
//! Structured logging through `tracing` and counters through the `metrics`
//! facade. No exporter is installed here; the embedding process decides.

mod logging;
mod metrics;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    record_arena_resize, record_reclaimed, record_spill, ARENA_RESIZES, RECLAIMED_BYTES,
    RECLAIMED_TOKENS, RELEASE_FAILURES, SPILLED_BYTES, SPILLS,
};
