// Copyright 2024-2026 Workspace Arena Contributors
// SPDX-License-Identifier: Apache-2.0

//! RAII scope guards and the "current workspace" marker.

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;

use super::workspace::WorkspaceHandle;
use crate::error::WorkspaceError;

/// Marker naming the workspace the array layer should allocate from.
///
/// One marker exists per hardware context. The default [`ActiveMarker`] is an
/// in-process slot; embedders can supply their own.
pub trait CurrentWorkspace: Send + Sync {
    fn current(&self) -> Option<WorkspaceHandle>;

    /// Install `workspace`, returning the previous one.
    fn replace(&self, workspace: Option<WorkspaceHandle>) -> Option<WorkspaceHandle>;

    /// Install `workspace` only while `expected` is current.
    fn replace_if_current(&self, expected: &WorkspaceHandle, workspace: Option<WorkspaceHandle>) -> bool {
        match self.current() {
            Some(current) if current.ptr_eq(expected) => {
                self.replace(workspace);
                true
            }
            _ => false,
        }
    }
}

#[derive(Default)]
pub struct ActiveMarker {
    slot: Mutex<Option<WorkspaceHandle>>,
}

impl ActiveMarker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CurrentWorkspace for ActiveMarker {
    fn current(&self) -> Option<WorkspaceHandle> {
        self.slot.lock().clone()
    }

    fn replace(&self, workspace: Option<WorkspaceHandle>) -> Option<WorkspaceHandle> {
        std::mem::replace(&mut *self.slot.lock(), workspace)
    }

    fn replace_if_current(&self, expected: &WorkspaceHandle, workspace: Option<WorkspaceHandle>) -> bool {
        let mut slot = self.slot.lock();
        match slot.as_ref() {
            Some(current) if current.ptr_eq(expected) => {
                *slot = workspace;
                true
            }
            _ => false,
        }
    }
}

/// Guard for one scope cycle of a workspace.
///
/// Dropping it leaves the scope and restores whichever workspace was current
/// before, on every exit path including unwinding. If guards are dropped out
/// of order, the marker is only touched while it still names this guard's
/// workspace, and a previous workspace whose scope has ended is not restored.
#[must_use = "the scope ends as soon as the guard is dropped"]
pub struct WorkspaceScope {
    workspace: WorkspaceHandle,
    marker: Arc<dyn CurrentWorkspace>,
    previous: Option<WorkspaceHandle>,
}

impl WorkspaceScope {
    pub(crate) fn enter(
        workspace: WorkspaceHandle,
        marker: Arc<dyn CurrentWorkspace>,
    ) -> Result<Self, WorkspaceError> {
        workspace.notify_scope_entered()?;
        let previous = marker.replace(Some(workspace.clone()));
        Ok(Self { workspace, marker, previous })
    }

    pub fn workspace(&self) -> &WorkspaceHandle {
        &self.workspace
    }
}

impl Deref for WorkspaceScope {
    type Target = WorkspaceHandle;

    fn deref(&self) -> &WorkspaceHandle {
        &self.workspace
    }
}

impl Drop for WorkspaceScope {
    fn drop(&mut self) {
        let previous = self.previous.take().filter(WorkspaceHandle::is_active);
        if !self.marker.replace_if_current(&self.workspace, previous) {
            tracing::debug!(workspace = %self.workspace.id(), "scope guard dropped out of order, marker left as is");
        }
        if let Err(e) = self.workspace.notify_scope_left() {
            tracing::warn!(workspace = %self.workspace.id(), error = %e, "scope exit failed");
        }
    }
}

/// Guard for a block that must allocate outside every workspace.
#[must_use = "the current workspace is restored as soon as the guard is dropped"]
pub struct OutOfScope {
    marker: Arc<dyn CurrentWorkspace>,
    suspended: Option<WorkspaceHandle>,
}

impl OutOfScope {
    pub(crate) fn enter(marker: Arc<dyn CurrentWorkspace>) -> Self {
        let suspended = marker.replace(None);
        Self { marker, suspended }
    }

    /// True if no workspace was current, so dropping the guard does nothing.
    pub fn is_noop(&self) -> bool {
        self.suspended.is_none()
    }

    pub fn suspended(&self) -> Option<&WorkspaceHandle> {
        self.suspended.as_ref()
    }
}

impl Drop for OutOfScope {
    fn drop(&mut self) {
        if let Some(workspace) = self.suspended.take() {
            self.marker.replace(Some(workspace));
        }
    }
}
