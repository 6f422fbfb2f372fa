// Copyright 2024-2026 Workspace Arena Contributors
// SPDX-License-Identifier: Apache-2.0

//! Host/device pointer pairs.

use super::allocator::{Address, MemoryAllocator, MemoryKind};
use crate::error::AllocatorError;

/// One allocation, tracked as an optional host side and optional device side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointerPair {
    pub host: Option<Address>,
    pub device: Option<Address>,
}

impl PointerPair {
    pub fn new(host: Option<Address>, device: Option<Address>) -> Self {
        Self { host, device }
    }

    pub fn host_only(host: Address) -> Self {
        Self { host: Some(host), device: None }
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_none() && self.device.is_none()
    }

    /// Byte length of the allocation (the larger side when mirrored).
    pub fn len(&self) -> usize {
        let host = self.host.map_or(0, |a| a.len);
        let device = self.device.map_or(0, |a| a.len);
        host.max(device)
    }

    /// Sub-pair covering `len` bytes at `offset` on every present side.
    pub fn slice(&self, offset: usize, len: usize) -> Self {
        Self {
            host: self.host.map(|a| a.slice(offset, len)),
            device: self.device.map(|a| a.slice(offset, len)),
        }
    }

    /// True if any side of `self` intersects the same side of `other`.
    pub fn overlaps(&self, other: &PointerPair) -> bool {
        let host = matches!((self.host, other.host), (Some(a), Some(b)) if a.overlaps(&b));
        let device = matches!((self.device, other.device), (Some(a), Some(b)) if a.overlaps(&b));
        host || device
    }

    /// True if both pairs were produced by the same native allocation(s).
    pub fn same_allocation(&self, other: &PointerPair) -> bool {
        self.host.map(|a| a.handle) == other.host.map(|a| a.handle)
            && self.device.map(|a| a.handle) == other.device.map(|a| a.handle)
    }

    /// Allocate a pair of `size` bytes, with a device side when `mirrored`.
    ///
    /// On device failure the freshly allocated host side is handed back.
    pub(crate) fn allocate(
        allocator: &dyn MemoryAllocator,
        size: usize,
        mirrored: bool,
    ) -> Result<Self, AllocatorError> {
        let host = allocator.allocate(size, MemoryKind::Host)?;
        if !mirrored {
            return Ok(Self::host_only(host));
        }
        match allocator.allocate(size, MemoryKind::Device) {
            Ok(device) => Ok(Self::new(Some(host), Some(device))),
            Err(e) => {
                if let Err(release_err) = allocator.release(&host, MemoryKind::Host) {
                    tracing::warn!(handle = host.handle, error = %release_err, "failed to roll back host allocation");
                }
                Err(e)
            }
        }
    }
}
