// Copyright 2024-2026 Workspace Arena Contributors
// SPDX-License-Identifier: Apache-2.0

//! Memory-kind allocator seam and a tracking mock implementation.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::AllocatorError;

/// Which side of a pointer pair an address lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryKind {
    Host,
    Device,
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryKind::Host => write!(f, "host"),
            MemoryKind::Device => write!(f, "device"),
        }
    }
}

/// An opaque native memory handle plus the byte range it covers.
///
/// Addresses returned by an allocator start at offset 0. Addresses carved
/// from an arena share the arena's handle and cover a sub-range of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub handle: u64,
    pub offset: usize,
    pub len: usize,
}

impl Address {
    pub fn new(handle: u64, len: usize) -> Self {
        Self { handle, offset: 0, len }
    }

    /// Sub-range of this address starting `offset` bytes in.
    pub fn slice(&self, offset: usize, len: usize) -> Self {
        Self {
            handle: self.handle,
            offset: self.offset + offset,
            len,
        }
    }

    /// One past the last byte covered.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    /// True if both addresses share a handle and their ranges intersect.
    pub fn overlaps(&self, other: &Address) -> bool {
        self.handle == other.handle && self.offset < other.end() && other.offset < self.end()
    }
}

/// Raw host/device allocation, injected into the workspace manager.
///
/// `release` may be called from the reclaimer thread and must tolerate it.
pub trait MemoryAllocator: Send + Sync {
    fn allocate(&self, size: usize, kind: MemoryKind) -> Result<Address, AllocatorError>;
    fn release(&self, address: &Address, kind: MemoryKind) -> Result<(), AllocatorError>;
    fn allocated_bytes(&self) -> usize;
}

// -- Mock allocator (testing + demo CLI) --------------------------------------

struct MockState {
    live: HashMap<u64, (usize, MemoryKind)>,
    total: usize,
    allocations: usize,
    releases: Vec<(u64, MemoryKind)>,
    failing: HashSet<u64>,
}

/// Tracking allocator that hands out fake handles and records every call.
pub struct MockAllocator {
    capacity: usize,
    next_id: AtomicU64,
    state: Mutex<MockState>,
}

impl MockAllocator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_id: AtomicU64::new(1),
            state: Mutex::new(MockState {
                live: HashMap::new(),
                total: 0,
                allocations: 0,
                releases: Vec::new(),
                failing: HashSet::new(),
            }),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    /// Count of live (un-released) allocations, useful for leak detection.
    pub fn leak_count(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Number of successful `allocate` calls so far.
    pub fn allocation_count(&self) -> usize {
        self.state.lock().allocations
    }

    /// Every successful release in call order.
    pub fn release_log(&self) -> Vec<(u64, MemoryKind)> {
        self.state.lock().releases.clone()
    }

    pub fn is_live(&self, handle: u64) -> bool {
        self.state.lock().live.contains_key(&handle)
    }

    /// Make every future release of `handle` fail with a backend error.
    pub fn fail_release_of(&self, handle: u64) {
        self.state.lock().failing.insert(handle);
    }
}

impl MemoryAllocator for MockAllocator {
    fn allocate(&self, size: usize, kind: MemoryKind) -> Result<Address, AllocatorError> {
        let mut s = self.state.lock();
        if size > self.capacity - s.total {
            return Err(AllocatorError::OutOfMemory {
                requested: size,
                available: self.capacity - s.total,
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        s.live.insert(id, (size, kind));
        s.total += size;
        s.allocations += 1;
        Ok(Address::new(id, size))
    }

    fn release(&self, address: &Address, kind: MemoryKind) -> Result<(), AllocatorError> {
        let mut s = self.state.lock();
        if s.failing.contains(&address.handle) {
            return Err(AllocatorError::Backend(format!(
                "injected release failure handle={}",
                address.handle
            )));
        }
        match s.live.get(&address.handle) {
            Some(&(size, live_kind)) if live_kind == kind => {
                s.live.remove(&address.handle);
                s.total -= size;
                s.releases.push((address.handle, kind));
                Ok(())
            }
            _ => Err(AllocatorError::UnknownAddress(address.handle)),
        }
    }

    fn allocated_bytes(&self) -> usize {
        self.state.lock().total
    }
}

#[cfg(test)]
#[path = "allocator_tests.rs"]
mod tests;
