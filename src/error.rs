// Copyright 2024-2026 Workspace Arena Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error types for workspace operations.
//!
//! Caller bugs fail fast. Allocator failures are propagated unchanged and
//! never retried here. Reclamation failures never reach this type: the
//! reclaimer logs them and moves on.

use thiserror::Error;

/// Errors reported by a [`MemoryAllocator`](crate::memory::MemoryAllocator).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AllocatorError {
    #[error("allocator out of memory: requested {requested} bytes, available {available} bytes")]
    OutOfMemory { requested: usize, available: usize },

    #[error("unknown or already released address handle={0}")]
    UnknownAddress(u64),

    #[error("allocator backend error: {0}")]
    Backend(String),
}

/// Errors that can occur while using a workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Workspace arena exhausted: requested {requested} bytes, available {available} bytes")]
    OutOfArenaMemory { requested: usize, available: usize },

    #[error("External allocation failed: {0}")]
    ExternalAllocation(#[from] AllocatorError),

    #[error("Workspace '{id}' used from a thread that does not own it")]
    CrossThreadAccess { id: String },

    #[error("Workspace '{id}' is already active")]
    AlreadyActive { id: String },

    #[error("Workspace '{id}' is not active")]
    NotActive { id: String },

    #[error("Failed to start reclaimer: {0}")]
    ReclaimerStart(#[from] std::io::Error),
}

impl WorkspaceError {
    /// Returns true if the error stems from incorrect use of the API.
    pub fn is_caller_bug(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::CrossThreadAccess { .. }
                | Self::AlreadyActive { .. }
                | Self::NotActive { .. }
        )
    }

    /// Returns true if the caller can recover, e.g. by allocating directly.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::OutOfArenaMemory { .. } | Self::ExternalAllocation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_error_converts_unchanged() {
        let err: WorkspaceError = AllocatorError::OutOfMemory { requested: 64, available: 8 }.into();
        assert!(matches!(
            err,
            WorkspaceError::ExternalAllocation(AllocatorError::OutOfMemory { requested: 64, available: 8 })
        ));
        assert!(err.is_recoverable());
        assert!(!err.is_caller_bug());
    }

    #[test]
    fn usage_errors_are_caller_bugs() {
        assert!(WorkspaceError::InvalidArgument("empty id".into()).is_caller_bug());
        assert!(WorkspaceError::CrossThreadAccess { id: "ws".into() }.is_caller_bug());
        assert!(!WorkspaceError::OutOfArenaMemory { requested: 1, available: 0 }.is_caller_bug());
    }

    #[test]
    fn messages_name_the_workspace() {
        let msg = WorkspaceError::AlreadyActive { id: "loop".into() }.to_string();
        assert!(msg.contains("'loop'"));
    }
}
