// Copyright 2024-2026 Workspace Arena Contributors
// SPDX-License-Identifier: Apache-2.0

//! A single workspace arena.
//!
//! Allocations inside the arena are a bump of `offset` and never reach the
//! allocator. Overflow is handled per [`SpillPolicy`]. The arena resets on
//! every scope entry and may resize itself on scope exit per
//! [`LearningPolicy`]. Native memory is handed to the reclaimer when the
//! last [`WorkspaceHandle`] is dropped.

use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use super::pointers::PointerPair;
use super::policy::{AllocationPolicy, LearningPolicy, SpillPolicy, WorkspaceConfig};
use super::reclaimer::{ReclaimSender, ReclaimShared};
use super::stats::WorkspaceStats;
use super::token::{token_key, DeallocationToken};
use crate::error::WorkspaceError;
use crate::telemetry;

/// Arena allocations are rounded up to this many bytes.
pub const ALIGNMENT: usize = 8;

fn align_up(size: usize) -> Option<usize> {
    size.checked_add(ALIGNMENT - 1).map(|s| s & !(ALIGNMENT - 1))
}

pub(crate) struct Workspace {
    id: String,
    thread_id: u64,
    key: String,
    owner: ThreadId,
    serial: u64,
    config: WorkspaceConfig,
    primary: PointerPair,
    capacity: usize,
    offset: usize,
    spilled: Vec<PointerPair>,
    pinned: VecDeque<PointerPair>,
    retired: Vec<PointerPair>,
    provisional: Vec<PointerPair>,
    generation: u64,
    cycle_demand: usize,
    peak_demand: usize,
    learned: bool,
    active: bool,
    shared: Arc<ReclaimShared>,
    sender: ReclaimSender,
}

impl Workspace {
    pub(crate) fn create(
        id: &str,
        thread_id: u64,
        config: WorkspaceConfig,
        shared: Arc<ReclaimShared>,
        sender: ReclaimSender,
    ) -> Result<Self, WorkspaceError> {
        if id.is_empty() {
            return Err(WorkspaceError::InvalidArgument("workspace id must not be empty".into()));
        }
        config.validate()?;

        let capacity = config.initial_capacity();
        let primary = if capacity > 0 {
            PointerPair::allocate(shared.allocator.as_ref(), capacity, config.is_mirrored())?
        } else {
            PointerPair::default()
        };

        let workspace = Self {
            id: id.to_string(),
            thread_id,
            key: token_key(id, thread_id),
            owner: thread::current().id(),
            serial: super::token::next_serial(),
            config,
            primary,
            capacity,
            offset: 0,
            spilled: Vec::new(),
            pinned: VecDeque::new(),
            retired: Vec::new(),
            provisional: Vec::new(),
            generation: 0,
            cycle_demand: 0,
            peak_demand: 0,
            learned: false,
            active: false,
            shared,
            sender,
        };
        workspace.shared.references.register(workspace.snapshot());
        tracing::debug!(workspace = %workspace.id, thread_id, capacity, "workspace created");
        Ok(workspace)
    }

    fn ensure_owner(&self) -> Result<(), WorkspaceError> {
        if thread::current().id() != self.owner {
            return Err(WorkspaceError::CrossThreadAccess { id: self.id.clone() });
        }
        Ok(())
    }

    fn learning_pending(&self) -> bool {
        self.config.learning_policy != LearningPolicy::None && !self.learned
    }

    fn snapshot(&self) -> DeallocationToken {
        DeallocationToken {
            workspace_id: self.id.clone(),
            thread_id: self.thread_id,
            serial: self.serial,
            primary: self.primary,
            spilled: self.spilled.clone(),
            pinned: self.pinned.clone(),
            retired: self.retired.clone(),
            provisional: self.provisional.clone(),
        }
    }

    /// Mirror a change into this workspace's reference-map entry.
    ///
    /// A no-op once a newer workspace has taken over the key.
    fn update_token(&self, edit: impl FnOnce(&mut DeallocationToken)) {
        self.shared.references.update(&self.key, self.serial, edit);
    }

    pub(crate) fn allocate(&mut self, size: usize) -> Result<PointerPair, WorkspaceError> {
        self.ensure_owner()?;
        if size == 0 {
            return Err(WorkspaceError::InvalidArgument("allocation size must be > 0".into()));
        }
        let aligned = align_up(size)
            .ok_or_else(|| WorkspaceError::InvalidArgument(format!("allocation size {} overflows", size)))?;

        if self.fits(aligned) {
            return self.carve(size, aligned);
        }

        if self.capacity == 0 && self.learning_pending() {
            // Arena not sized yet: serve directly for this cycle only.
            let pair = self.allocate_external(size)?;
            self.provisional.push(pair);
            self.cycle_demand = self.cycle_demand.saturating_add(aligned);
            self.update_token(|t| t.provisional.push(pair));
            return Ok(pair);
        }

        match self.config.spill_policy {
            SpillPolicy::Fail => Err(self.out_of_arena(size)),
            SpillPolicy::Reallocate => {
                self.grow(size, aligned)?;
                self.carve(size, aligned)
            }
            SpillPolicy::External => {
                let pair = self.allocate_external(size)?;
                self.spilled.push(pair);
                self.cycle_demand = self.cycle_demand.saturating_add(aligned);
                self.update_token(|t| t.spilled.push(pair));
                telemetry::record_spill(size);
                tracing::debug!(workspace = %self.id, size, offset = self.offset, capacity = self.capacity, "arena exhausted, spilled");
                Ok(pair)
            }
        }
    }

    fn fits(&self, aligned: usize) -> bool {
        self.offset
            .checked_add(aligned)
            .is_some_and(|end| end <= self.capacity)
    }

    fn out_of_arena(&self, requested: usize) -> WorkspaceError {
        WorkspaceError::OutOfArenaMemory {
            requested,
            available: self.capacity.saturating_sub(self.offset),
        }
    }

    fn carve(&mut self, size: usize, aligned: usize) -> Result<PointerPair, WorkspaceError> {
        let end = match self.offset.checked_add(aligned) {
            Some(end) if end <= self.capacity => end,
            _ => return Err(self.out_of_arena(size)),
        };
        let pair = self.primary.slice(self.offset, size);
        self.offset = end;
        self.cycle_demand = self.cycle_demand.saturating_add(aligned);
        Ok(pair)
    }

    fn allocate_external(&self, size: usize) -> Result<PointerPair, WorkspaceError> {
        let pair = PointerPair::allocate(self.shared.allocator.as_ref(), size, self.config.is_mirrored())?;
        Ok(pair)
    }

    /// Replace the arena with a larger one, keeping the offset.
    fn grow(&mut self, size: usize, aligned: usize) -> Result<(), WorkspaceError> {
        let needed = self
            .offset
            .checked_add(aligned)
            .ok_or_else(|| self.out_of_arena(size))?;
        let max_size = self.config.max_size;
        let grown = if max_size > 0 {
            max_size
        } else {
            self.config.overallocated(self.capacity)
        };
        let mut target = needed.max(grown);
        if max_size > 0 && needed > max_size {
            match self.config.allocation_policy {
                AllocationPolicy::Strict => {
                    return Err(WorkspaceError::OutOfArenaMemory {
                        requested: size,
                        available: max_size.saturating_sub(self.offset),
                    });
                }
                AllocationPolicy::Overallocate => target = self.config.overallocated(needed),
            }
        }

        let replacement =
            PointerPair::allocate(self.shared.allocator.as_ref(), target, self.config.is_mirrored())?;
        let old = mem::replace(&mut self.primary, replacement);
        let primary = self.primary;
        // Pairs handed out this cycle may still point into the old arena.
        let retire = !old.is_empty();
        if retire {
            self.retired.push(old);
        }
        self.update_token(|t| {
            t.primary = primary;
            if retire {
                t.retired.push(old);
            }
        });
        tracing::info!(workspace = %self.id, from = self.capacity, to = target, "arena reallocated");
        self.capacity = target;
        telemetry::record_arena_resize(target);
        Ok(())
    }

    pub(crate) fn allocate_pinned(&mut self, size: usize) -> Result<PointerPair, WorkspaceError> {
        self.ensure_owner()?;
        if size == 0 {
            return Err(WorkspaceError::InvalidArgument("allocation size must be > 0".into()));
        }
        let pair = self.allocate_external(size)?;
        self.pinned.push_back(pair);
        self.update_token(|t| t.pinned.push_back(pair));
        Ok(pair)
    }

    pub(crate) fn pin(&mut self, pair: &PointerPair) -> Result<(), WorkspaceError> {
        self.ensure_owner()?;
        if self.pinned.iter().any(|p| p.same_allocation(pair)) {
            return Ok(());
        }
        if let Some(pos) = self.spilled.iter().position(|p| p.same_allocation(pair)) {
            let pair = self.spilled.remove(pos);
            self.pinned.push_back(pair);
            self.update_token(|t| {
                t.spilled.retain(|p| !p.same_allocation(&pair));
                t.pinned.push_back(pair);
            });
            return Ok(());
        }
        if !self.primary.is_empty() && self.primary.overlaps(pair) {
            return Err(WorkspaceError::InvalidArgument(format!(
                "allocation inside the arena of '{}' cannot be pinned",
                self.id
            )));
        }
        Err(WorkspaceError::InvalidArgument(format!(
            "allocation is not owned by workspace '{}'",
            self.id
        )))
    }

    pub(crate) fn notify_scope_entered(&mut self) -> Result<(), WorkspaceError> {
        self.ensure_owner()?;
        if self.active {
            return Err(WorkspaceError::AlreadyActive { id: self.id.clone() });
        }
        self.active = true;
        self.offset = 0;
        self.cycle_demand = 0;
        self.generation += 1;
        tracing::trace!(workspace = %self.id, generation = self.generation, "scope entered");
        Ok(())
    }

    pub(crate) fn notify_scope_left(&mut self) -> Result<(), WorkspaceError> {
        self.ensure_owner()?;
        if !self.active {
            return Err(WorkspaceError::NotActive { id: self.id.clone() });
        }
        self.active = false;
        self.release_cycle_memory();
        tracing::trace!(
            workspace = %self.id,
            generation = self.generation,
            demand = self.cycle_demand,
            "scope left"
        );
        self.learn()
    }

    fn learn(&mut self) -> Result<(), WorkspaceError> {
        let demand = self.cycle_demand;
        let result = match self.config.learning_policy {
            LearningPolicy::None => Ok(()),
            LearningPolicy::FirstLoop if !self.learned => {
                self.learned = true;
                self.resize_to(self.config.cap(self.config.overallocated(demand)))
            }
            LearningPolicy::FirstLoop => Ok(()),
            LearningPolicy::OverTime if demand > self.peak_demand => {
                self.learned = true;
                self.resize_to(self.config.cap(self.config.overallocated(demand)))
            }
            LearningPolicy::OverTime => Ok(()),
        };
        self.peak_demand = self.peak_demand.max(demand);
        result
    }

    /// Grow the arena at a cycle boundary. Never shrinks.
    fn resize_to(&mut self, target: usize) -> Result<(), WorkspaceError> {
        if target <= self.capacity {
            return Ok(());
        }
        let replacement =
            PointerPair::allocate(self.shared.allocator.as_ref(), target, self.config.is_mirrored())?;
        let old = mem::replace(&mut self.primary, replacement);
        let from = mem::replace(&mut self.capacity, target);
        self.offset = 0;
        let primary = self.primary;
        self.update_token(|t| t.primary = primary);
        // No pair from the finished cycle may be used past this point.
        self.shared.release_now(&old);
        telemetry::record_arena_resize(target);
        tracing::info!(workspace = %self.id, from, to = target, "arena resized from observed demand");
        Ok(())
    }

    /// Free replaced arenas and provisional pairs of the finished cycle.
    fn release_cycle_memory(&mut self) {
        if self.retired.is_empty() && self.provisional.is_empty() {
            return;
        }
        let retired = mem::take(&mut self.retired);
        let provisional = mem::take(&mut self.provisional);
        self.update_token(|t| {
            t.retired.clear();
            t.provisional.clear();
        });
        for pair in retired.iter().chain(&provisional) {
            self.shared.release_now(pair);
        }
    }

    pub(crate) fn reset(&mut self) -> Result<(), WorkspaceError> {
        self.ensure_owner()?;
        self.offset = 0;
        Ok(())
    }

    pub(crate) fn stats(&self) -> WorkspaceStats {
        WorkspaceStats {
            id: self.id.clone(),
            thread_id: self.thread_id,
            arena_bytes: self.capacity,
            used_bytes: self.offset,
            spilled_bytes: self.spilled.iter().map(PointerPair::len).sum(),
            pinned_bytes: self.pinned.iter().map(PointerPair::len).sum(),
            provisional_bytes: self.provisional.iter().map(PointerPair::len).sum(),
            spilled_count: self.spilled.len(),
            pinned_count: self.pinned.len(),
            generation: self.generation,
            active: self.active,
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let token = DeallocationToken {
            workspace_id: mem::take(&mut self.id),
            thread_id: self.thread_id,
            serial: self.serial,
            primary: mem::take(&mut self.primary),
            spilled: mem::take(&mut self.spilled),
            pinned: mem::take(&mut self.pinned),
            retired: mem::take(&mut self.retired),
            provisional: mem::take(&mut self.provisional),
        };
        tracing::debug!(workspace = %token.workspace_id, thread_id = token.thread_id, "last owner dropped, queueing reclamation");
        if let Err(token) = self.sender.send(token) {
            tracing::warn!(workspace = %token.workspace_id, "reclaimer stopped, releasing workspace memory inline");
            self.shared.reclaim(token);
        }
    }
}

/// Shared owning handle to a workspace.
///
/// Clones share one arena. Mutating calls must come from the thread that
/// created the workspace; statistics can be read from anywhere.
#[derive(Clone)]
pub struct WorkspaceHandle {
    inner: Arc<Mutex<Workspace>>,
}

impl WorkspaceHandle {
    pub(crate) fn new(workspace: Workspace) -> Self {
        Self { inner: Arc::new(Mutex::new(workspace)) }
    }

    pub fn id(&self) -> String {
        self.inner.lock().id.clone()
    }

    pub fn config(&self) -> WorkspaceConfig {
        self.inner.lock().config
    }

    /// `CrossThreadAccess` unless called on the thread that created it.
    pub fn ensure_owner(&self) -> Result<(), WorkspaceError> {
        self.inner.lock().ensure_owner()
    }

    /// Allocate `size` bytes from the arena, spilling per policy.
    pub fn allocate(&self, size: usize) -> Result<PointerPair, WorkspaceError> {
        self.inner.lock().allocate(size)
    }

    /// Allocate outside the arena and keep the memory until the workspace dies.
    pub fn allocate_pinned(&self, size: usize) -> Result<PointerPair, WorkspaceError> {
        self.inner.lock().allocate_pinned(size)
    }

    /// Move a spilled allocation into the pinned queue.
    pub fn pin(&self, pair: &PointerPair) -> Result<(), WorkspaceError> {
        self.inner.lock().pin(pair)
    }

    pub fn notify_scope_entered(&self) -> Result<(), WorkspaceError> {
        self.inner.lock().notify_scope_entered()
    }

    pub fn notify_scope_left(&self) -> Result<(), WorkspaceError> {
        self.inner.lock().notify_scope_left()
    }

    /// Rewind the arena offset without a scope transition.
    pub fn reset(&self) -> Result<(), WorkspaceError> {
        self.inner.lock().reset()
    }

    pub fn stats(&self) -> WorkspaceStats {
        self.inner.lock().stats()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    pub fn current_offset(&self) -> usize {
        self.inner.lock().offset
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    pub fn primary(&self) -> PointerPair {
        self.inner.lock().primary
    }

    pub fn spilled(&self) -> Vec<PointerPair> {
        self.inner.lock().spilled.clone()
    }

    pub fn pinned(&self) -> Vec<PointerPair> {
        self.inner.lock().pinned.iter().copied().collect()
    }

    /// Pairs served before the arena was sized, freed at the next scope exit.
    pub fn provisional(&self) -> Vec<PointerPair> {
        self.inner.lock().provisional.clone()
    }

    /// True if both handles refer to the same workspace instance.
    pub fn ptr_eq(&self, other: &WorkspaceHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live handles (registry, guards and markers included).
    pub fn owner_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl std::fmt::Debug for WorkspaceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ws = self.inner.lock();
        f.debug_struct("WorkspaceHandle")
            .field("id", &ws.id)
            .field("thread_id", &ws.thread_id)
            .field("capacity", &ws.capacity)
            .field("offset", &ws.offset)
            .field("generation", &ws.generation)
            .finish()
    }
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
