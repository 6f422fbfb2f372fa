// Copyright 2024-2026 Workspace Arena Contributors
// SPDX-License-Identifier: Apache-2.0

//! Workspace usage statistics.

use std::collections::BTreeMap;

use serde::Serialize;

/// Point-in-time usage of one workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceStats {
    pub id: String,
    pub thread_id: u64,
    /// Primary arena capacity.
    pub arena_bytes: usize,
    /// Bytes consumed in the current cycle.
    pub used_bytes: usize,
    pub spilled_bytes: usize,
    pub pinned_bytes: usize,
    /// Served outside the arena while learning has not sized it yet.
    pub provisional_bytes: usize,
    pub spilled_count: usize,
    pub pinned_count: usize,
    pub generation: u64,
    pub active: bool,
}

/// Statistics for every workspace registered on one thread, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThreadStatistics {
    pub thread_id: u64,
    pub workspaces: BTreeMap<String, WorkspaceStats>,
}

impl ThreadStatistics {
    pub fn len(&self) -> usize {
        self.workspaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&WorkspaceStats> {
        self.workspaces.get(id)
    }

    /// `(arena, spilled, pinned)` bytes summed over all workspaces.
    pub fn totals(&self) -> (usize, usize, usize) {
        self.workspaces.values().fold((0, 0, 0), |(a, s, p), w| {
            (a + w.arena_bytes, s + w.spilled_bytes, p + w.pinned_bytes)
        })
    }

    /// Emit one log line per workspace at `info`.
    pub fn log(&self) {
        tracing::info!(thread_id = self.thread_id, workspaces = self.len(), "workspace statistics");
        for w in self.workspaces.values() {
            tracing::info!(
                workspace = %w.id,
                arena_bytes = w.arena_bytes,
                spilled_bytes = w.spilled_bytes,
                pinned_bytes = w.pinned_bytes,
                generation = w.generation,
                "workspace usage"
            );
        }
    }
}
