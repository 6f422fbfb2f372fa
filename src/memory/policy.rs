// Copyright 2024-2026 Workspace Arena Contributors
// SPDX-License-Identifier: Apache-2.0

//! Workspace configuration and the policies that drive arena behavior.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WorkspaceError;

/// Whether the arena may grow past `max_size` to satisfy a single request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPolicy {
    Strict,
    #[default]
    Overallocate,
}

/// When the arena resizes itself from observed per-cycle demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningPolicy {
    None,
    /// Resize once after the first scope cycle, then freeze.
    #[default]
    FirstLoop,
    /// Resize after every cycle whose demand exceeds the previous peak.
    OverTime,
}

/// Whether allocations get a paired device buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirroringPolicy {
    #[default]
    Full,
    HostOnly,
}

/// What happens once the primary arena is exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpillPolicy {
    Fail,
    Reallocate,
    #[default]
    External,
}

macro_rules! impl_policy_from_str {
    ($ty:ty, $($name:literal => $variant:expr),+ $(,)?) => {
        impl FromStr for $ty {
            type Err = WorkspaceError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
                    $($name => Ok($variant),)+
                    other => Err(WorkspaceError::InvalidArgument(format!(
                        "unknown {} '{}'",
                        stringify!($ty),
                        other
                    ))),
                }
            }
        }
    };
}

impl_policy_from_str!(AllocationPolicy, "strict" => AllocationPolicy::Strict, "overallocate" => AllocationPolicy::Overallocate);
impl_policy_from_str!(LearningPolicy, "none" => LearningPolicy::None, "first_loop" => LearningPolicy::FirstLoop, "over_time" => LearningPolicy::OverTime);
impl_policy_from_str!(MirroringPolicy, "full" => MirroringPolicy::Full, "host_only" => MirroringPolicy::HostOnly);
impl_policy_from_str!(SpillPolicy, "fail" => SpillPolicy::Fail, "reallocate" => SpillPolicy::Reallocate, "external" => SpillPolicy::External);

/// Immutable policy bundle attached to a workspace at creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Arena size at creation (bytes). 0 defers to `max_size` or learning.
    pub initial_size: usize,
    /// Upper bound for growth (bytes). 0 means unbounded.
    pub max_size: usize,
    /// Fraction added on top of learned or grown sizes.
    pub overallocation_limit: f64,
    pub allocation_policy: AllocationPolicy,
    pub learning_policy: LearningPolicy,
    pub mirroring_policy: MirroringPolicy,
    pub spill_policy: SpillPolicy,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            initial_size: 0,
            max_size: 0,
            overallocation_limit: 0.3,
            allocation_policy: AllocationPolicy::Overallocate,
            learning_policy: LearningPolicy::FirstLoop,
            mirroring_policy: MirroringPolicy::Full,
            spill_policy: SpillPolicy::External,
        }
    }
}

impl WorkspaceConfig {
    /// Fixed-size arena that never learns and spills externally.
    pub fn fixed(size: usize) -> Self {
        Self {
            initial_size: size,
            max_size: size,
            learning_policy: LearningPolicy::None,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), WorkspaceError> {
        if !self.overallocation_limit.is_finite() || self.overallocation_limit < 0.0 {
            return Err(WorkspaceError::InvalidArgument(format!(
                "overallocation_limit must be finite and >= 0, got {}",
                self.overallocation_limit
            )));
        }
        if self.max_size > 0 && self.initial_size > self.max_size {
            return Err(WorkspaceError::InvalidArgument(format!(
                "initial_size {} exceeds max_size {}",
                self.initial_size, self.max_size
            )));
        }
        Ok(())
    }

    /// Arena capacity allocated when the workspace is created.
    pub fn initial_capacity(&self) -> usize {
        if self.initial_size > 0 {
            self.initial_size
        } else {
            self.max_size
        }
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirroring_policy == MirroringPolicy::Full
    }

    /// `bytes * (1 + overallocation_limit)`, rounded up.
    pub fn overallocated(&self, bytes: usize) -> usize {
        (bytes as f64 * (1.0 + self.overallocation_limit)).ceil() as usize
    }

    /// Clamp a learned size to `max_size` when one is set.
    pub(crate) fn cap(&self, bytes: usize) -> usize {
        if self.max_size > 0 {
            bytes.min(self.max_size)
        } else {
            bytes
        }
    }
}
