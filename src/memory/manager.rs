// Copyright 2024-2026 Workspace Arena Contributors
// SPDX-License-Identifier: Apache-2.0

//! Workspace manager and per-thread registries.
//!
//! The [`WorkspaceManager`] is process-wide: it owns the reclaimer, the
//! reference map and the default configuration. Each worker thread obtains a
//! [`ThreadContext`] once and performs every registry operation through it.
//! The context is `!Send`, so a registry never leaves its thread.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::allocator::MemoryAllocator;
use super::policy::WorkspaceConfig;
use super::reclaimer::{ReclaimSender, ReclaimShared, ReclaimStats, Reclaimer, ReclaimerConfig, ReclaimerState};
use super::scope::{ActiveMarker, CurrentWorkspace, OutOfScope, WorkspaceScope};
use super::stats::ThreadStatistics;
use super::token::ReferenceMap;
use super::workspace::{Workspace, WorkspaceHandle};
use crate::error::WorkspaceError;

/// Id used by the `default_*` shortcuts.
pub const DEFAULT_WORKSPACE_ID: &str = "DEFAULT";

/// Manager configuration.
#[derive(Debug, Clone, Default)]
pub struct ManagerConfig {
    pub default_workspace: WorkspaceConfig,
    pub reclaimer: ReclaimerConfig,
}

/// Process-wide coordinator for workspaces and their reclamation.
pub struct WorkspaceManager {
    shared: Arc<ReclaimShared>,
    reclaimer: Reclaimer,
    default_config: Arc<RwLock<WorkspaceConfig>>,
    next_thread_id: AtomicU64,
}

impl WorkspaceManager {
    /// Create a manager with default configuration and start its reclaimer.
    pub fn new(allocator: Arc<dyn MemoryAllocator>) -> Result<Self, WorkspaceError> {
        Self::with_config(allocator, ManagerConfig::default())
    }

    pub fn with_config(
        allocator: Arc<dyn MemoryAllocator>,
        config: ManagerConfig,
    ) -> Result<Self, WorkspaceError> {
        config.default_workspace.validate()?;
        let shared = Arc::new(ReclaimShared::new(allocator, Arc::new(ReferenceMap::new())));
        let reclaimer = Reclaimer::spawn(shared.clone(), config.reclaimer)?;
        Ok(Self {
            shared,
            reclaimer,
            default_config: Arc::new(RwLock::new(config.default_workspace)),
            next_thread_id: AtomicU64::new(1),
        })
    }

    /// Configuration used when no explicit configuration is given.
    pub fn set_default_configuration(&self, config: WorkspaceConfig) -> Result<(), WorkspaceError> {
        config.validate()?;
        *self.default_config.write() = config;
        Ok(())
    }

    pub fn default_configuration(&self) -> WorkspaceConfig {
        *self.default_config.read()
    }

    /// Registry for the calling thread with its own current-workspace marker.
    pub fn context(&self) -> ThreadContext {
        self.context_with_marker(Arc::new(ActiveMarker::new()))
    }

    /// Registry for the calling thread sharing an externally owned marker.
    pub fn context_with_marker(&self, marker: Arc<dyn CurrentWorkspace>) -> ThreadContext {
        let thread_id = self.next_thread_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(thread_id, "thread context created");
        ThreadContext {
            thread_id,
            registry: HashMap::new(),
            default_config: self.default_config.clone(),
            shared: self.shared.clone(),
            sender: self.reclaimer.sender(),
            marker,
            _not_send: PhantomData,
        }
    }

    pub fn reclaim_stats(&self) -> ReclaimStats {
        self.reclaimer.stats()
    }

    pub fn reclaimer_state(&self) -> ReclaimerState {
        self.reclaimer.state()
    }

    /// Workspaces whose memory has not been reclaimed yet, live ones included.
    pub fn registered_tokens(&self) -> usize {
        self.shared.references.len()
    }

    /// Bytes held by every workspace not yet reclaimed.
    pub fn outstanding_bytes(&self) -> usize {
        self.shared.references.outstanding_bytes()
    }

    /// Drain pending reclamation and stop the reclaimer.
    ///
    /// Workspaces dropped afterwards release their memory on the dropping
    /// thread.
    pub fn shutdown(self) -> ReclaimStats {
        self.reclaimer.shutdown()
    }
}

/// One thread's workspace registry.
pub struct ThreadContext {
    thread_id: u64,
    registry: HashMap<String, WorkspaceHandle>,
    default_config: Arc<RwLock<WorkspaceConfig>>,
    shared: Arc<ReclaimShared>,
    sender: ReclaimSender,
    marker: Arc<dyn CurrentWorkspace>,
    _not_send: PhantomData<Rc<()>>,
}

impl ThreadContext {
    pub fn thread_id(&self) -> u64 {
        self.thread_id
    }

    /// Look up `id`, creating it with `config` on first use.
    ///
    /// An existing workspace keeps the configuration it was created with.
    pub fn get_or_create(
        &mut self,
        config: &WorkspaceConfig,
        id: &str,
    ) -> Result<WorkspaceHandle, WorkspaceError> {
        if id.is_empty() {
            return Err(WorkspaceError::InvalidArgument("workspace id must not be empty".into()));
        }
        if let Some(existing) = self.registry.get(id) {
            return Ok(existing.clone());
        }
        let workspace = Workspace::create(
            id,
            self.thread_id,
            *config,
            self.shared.clone(),
            self.sender.clone(),
        )?;
        let handle = WorkspaceHandle::new(workspace);
        self.registry.insert(id.to_string(), handle.clone());
        Ok(handle)
    }

    /// Look up `id`, creating it with the manager default configuration.
    pub fn workspace(&mut self, id: &str) -> Result<WorkspaceHandle, WorkspaceError> {
        let config = *self.default_config.read();
        self.get_or_create(&config, id)
    }

    pub fn default_workspace(&mut self) -> Result<WorkspaceHandle, WorkspaceError> {
        self.workspace(DEFAULT_WORKSPACE_ID)
    }

    /// Look up (or create) `id` and enter a scope cycle on it.
    pub fn activate(&mut self, id: &str) -> Result<WorkspaceScope, WorkspaceError> {
        let workspace = self.workspace(id)?;
        WorkspaceScope::enter(workspace, self.marker.clone())
    }

    pub fn activate_with(
        &mut self,
        config: &WorkspaceConfig,
        id: &str,
    ) -> Result<WorkspaceScope, WorkspaceError> {
        let workspace = self.get_or_create(config, id)?;
        WorkspaceScope::enter(workspace, self.marker.clone())
    }

    /// Bind an existing workspace under `id`, returning the instance it
    /// replaces. The workspace must have been created on this thread.
    pub fn set_workspace(
        &mut self,
        id: &str,
        workspace: WorkspaceHandle,
    ) -> Result<Option<WorkspaceHandle>, WorkspaceError> {
        if id.is_empty() {
            return Err(WorkspaceError::InvalidArgument("workspace id must not be empty".into()));
        }
        workspace.ensure_owner()?;
        tracing::debug!(workspace = %id, thread_id = self.thread_id, "workspace bound");
        Ok(self.registry.insert(id.to_string(), workspace))
    }

    /// Remove the registry binding for `id`. Memory is reclaimed once no
    /// other owner remains. Returns false if nothing was bound.
    pub fn destroy(&mut self, id: &str) -> bool {
        let removed = self.registry.remove(id).is_some();
        if removed {
            tracing::debug!(workspace = %id, thread_id = self.thread_id, "workspace destroyed");
        }
        removed
    }

    /// Remove every binding of `workspace`: its own id, and any id it was
    /// bound under with [`set_workspace`](Self::set_workspace).
    pub fn destroy_workspace(&mut self, workspace: &WorkspaceHandle) -> bool {
        let bound: Vec<String> = self
            .registry
            .iter()
            .filter(|(_, ws)| ws.ptr_eq(workspace))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &bound {
            self.destroy(id);
        }
        !bound.is_empty()
    }

    /// Destroy every workspace of this thread. Returns how many were bound.
    pub fn destroy_all(&mut self) -> usize {
        let count = self.registry.len();
        self.registry.clear();
        tracing::debug!(thread_id = self.thread_id, count, "all workspaces destroyed");
        count
    }

    pub fn exists(&self, id: &str) -> bool {
        self.registry.contains_key(id)
    }

    pub fn workspace_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.registry.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn current_workspace(&self) -> Option<WorkspaceHandle> {
        self.marker.current()
    }

    /// Suspend the current workspace until the returned guard is dropped.
    pub fn scope_out_of_workspaces(&self) -> OutOfScope {
        OutOfScope::enter(self.marker.clone())
    }

    pub fn statistics(&self) -> ThreadStatistics {
        ThreadStatistics {
            thread_id: self.thread_id,
            workspaces: self
                .registry
                .iter()
                .map(|(id, ws)| (id.clone(), ws.stats()))
                .collect(),
        }
    }

    pub fn print_statistics(&self) {
        self.statistics().log();
    }
}

impl Drop for ThreadContext {
    fn drop(&mut self) {
        if !self.registry.is_empty() {
            tracing::debug!(thread_id = self.thread_id, count = self.registry.len(), "thread registry discarded");
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
