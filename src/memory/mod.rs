//! Memory management module.
//!
//! Provides scoped arena workspaces, per-thread registries and deferred
//! reclamation of the native memory behind them.

mod allocator;
mod manager;
mod pointers;
mod policy;
mod reclaimer;
mod scope;
mod stats;
mod token;
mod workspace;

pub use allocator::{Address, MemoryAllocator, MemoryKind, MockAllocator};
pub use manager::{ManagerConfig, ThreadContext, WorkspaceManager, DEFAULT_WORKSPACE_ID};
pub use pointers::PointerPair;
pub use policy::{AllocationPolicy, LearningPolicy, MirroringPolicy, SpillPolicy, WorkspaceConfig};
pub use reclaimer::{ReclaimStats, Reclaimer, ReclaimerConfig, ReclaimerState};
pub use scope::{ActiveMarker, CurrentWorkspace, OutOfScope, WorkspaceScope};
pub use stats::{ThreadStatistics, WorkspaceStats};
pub use token::{token_key, DeallocationToken, ReferenceMap};
pub use workspace::{WorkspaceHandle, ALIGNMENT};
