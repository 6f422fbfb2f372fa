//! Workspace Arena
//!
//! Scoped arena workspaces for paired host/device buffers. Code inside a
//! workspace scope allocates by bumping an offset into one preallocated
//! arena; the arena is reset on every scope entry, so steady-state loops never
//! touch the underlying allocator.
//!
//! # Design Principles
//!
//! - **Scoped**: arena reuse is tied to RAII scope guards, restored on every exit path
//! - **Thread-confined**: each worker owns a `ThreadContext` registry that never leaves it
//! - **Deferred release**: the last owner of a workspace hands its native memory to a
//!   background reclaimer; callers never free explicitly
//! - **Policy-driven**: spill, learning, allocation and mirroring behavior is fixed per
//!   workspace at creation
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use workspace_arena::memory::{MockAllocator, WorkspaceConfig, WorkspaceManager};
//!
//! let manager = WorkspaceManager::new(Arc::new(MockAllocator::unbounded()))?;
//! let mut ctx = manager.context();
//! for _ in 0..10 {
//!     let scope = ctx.activate_with(&WorkspaceConfig::fixed(1 << 20), "loop")?;
//!     let _buffer = scope.allocate(4096)?;
//! }
//! ctx.destroy_all();
//! let stats = manager.shutdown();
//! assert_eq!(stats.tokens, 1);
//! # Ok::<(), workspace_arena::WorkspaceError>(())
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod memory;
pub mod telemetry;

pub use config::{ConfigError, EnvConfig};
pub use error::{AllocatorError, WorkspaceError};
pub use memory::{ThreadContext, WorkspaceHandle, WorkspaceManager, WorkspaceScope};
