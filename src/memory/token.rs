// Copyright 2024-2026 Workspace Arena Contributors
// SPDX-License-Identifier: Apache-2.0

//! Deallocation tokens and the shared reference map.
//!
//! A token is a snapshot of every native pointer a workspace owns. The
//! reclaimer acts only on the token; it never sees the workspace itself.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::pointers::PointerPair;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Process-unique serial for a newly created workspace.
pub(crate) fn next_serial() -> u64 {
    NEXT_SERIAL.fetch_add(1, Ordering::Relaxed)
}

/// Release list for one workspace, delivered to the reclaimer after the
/// workspace's last owner is dropped.
#[derive(Debug, Clone, Default)]
pub struct DeallocationToken {
    pub workspace_id: String,
    pub thread_id: u64,
    pub serial: u64,
    pub primary: PointerPair,
    pub spilled: Vec<PointerPair>,
    pub pinned: VecDeque<PointerPair>,
    pub retired: Vec<PointerPair>,
    /// Served before the arena was sized; released at the next scope exit.
    pub provisional: Vec<PointerPair>,
}

impl DeallocationToken {
    /// Reference map key: `"{workspace_id}_{thread_id}"`.
    pub fn key(&self) -> String {
        token_key(&self.workspace_id, self.thread_id)
    }

    /// Number of native pointers this token will release.
    pub fn pointer_count(&self) -> usize {
        fn sides(pair: &PointerPair) -> usize {
            pair.host.is_some() as usize + pair.device.is_some() as usize
        }
        sides(&self.primary)
            + self.spilled.iter().map(sides).sum::<usize>()
            + self.pinned.iter().map(sides).sum::<usize>()
            + self.retired.iter().map(sides).sum::<usize>()
            + self.provisional.iter().map(sides).sum::<usize>()
    }

    /// Total bytes held, counting each side of a pair.
    pub fn total_bytes(&self) -> usize {
        fn bytes(pair: &PointerPair) -> usize {
            pair.host.map_or(0, |a| a.len) + pair.device.map_or(0, |a| a.len)
        }
        bytes(&self.primary)
            + self.spilled.iter().map(bytes).sum::<usize>()
            + self.pinned.iter().map(bytes).sum::<usize>()
            + self.retired.iter().map(bytes).sum::<usize>()
            + self.provisional.iter().map(bytes).sum::<usize>()
    }
}

pub fn token_key(workspace_id: &str, thread_id: u64) -> String {
    format!("{}_{}", workspace_id, thread_id)
}

/// Concurrent map of registered tokens, shared by every thread context and
/// the reclaimer.
#[derive(Debug, Default)]
pub struct ReferenceMap {
    tokens: DashMap<String, DeallocationToken>,
}

impl ReferenceMap {
    pub fn new() -> Self {
        Self { tokens: DashMap::new() }
    }

    /// Insert the snapshot for a workspace.
    ///
    /// An entry held by a newer instance (higher serial) is left alone and
    /// false is returned.
    pub fn register(&self, token: DeallocationToken) -> bool {
        match self.tokens.entry(token.key()) {
            Entry::Occupied(mut entry) => {
                if entry.get().serial > token.serial {
                    return false;
                }
                entry.insert(token);
            }
            Entry::Vacant(entry) => {
                entry.insert(token);
            }
        }
        true
    }

    /// Edit the entry for `key` in place if it still belongs to `serial`.
    pub fn update(&self, key: &str, serial: u64, edit: impl FnOnce(&mut DeallocationToken)) -> bool {
        match self.tokens.get_mut(key) {
            Some(mut token) if token.serial == serial => {
                edit(token.value_mut());
                true
            }
            _ => false,
        }
    }

    /// Remove the entry for `key` only if it still belongs to `serial`.
    ///
    /// A workspace re-created under the same key keeps its registration.
    pub fn unregister(&self, key: &str, serial: u64) -> bool {
        self.tokens.remove_if(key, |_, t| t.serial == serial).is_some()
    }

    pub fn get(&self, key: &str) -> Option<DeallocationToken> {
        self.tokens.get(key).map(|t| t.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tokens.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Bytes held by every registered token.
    pub fn outstanding_bytes(&self) -> usize {
        self.tokens.iter().map(|t| t.total_bytes()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::allocator::Address;

    fn token(id: &str, thread_id: u64, serial: u64) -> DeallocationToken {
        DeallocationToken {
            workspace_id: id.to_string(),
            thread_id,
            serial,
            primary: PointerPair::new(Some(Address::new(1, 100)), Some(Address::new(2, 100))),
            ..Default::default()
        }
    }

    #[test]
    fn key_joins_id_and_thread() {
        assert_eq!(token("loop", 3, 1).key(), "loop_3");
    }

    #[test]
    fn counts_pointers_and_bytes_across_lists() {
        let mut t = token("ws", 1, 1);
        t.spilled.push(PointerPair::host_only(Address::new(3, 50)));
        t.pinned.push_back(PointerPair::new(Some(Address::new(4, 10)), Some(Address::new(5, 10))));
        assert_eq!(t.pointer_count(), 5);
        assert_eq!(t.total_bytes(), 270);
    }

    #[test]
    fn unregister_ignores_newer_registration() {
        let map = ReferenceMap::new();
        map.register(token("ws", 1, 10));
        map.register(token("ws", 1, 11));
        assert!(!map.unregister("ws_1", 10));
        assert!(map.contains("ws_1"));
        assert!(map.unregister("ws_1", 11));
        assert!(map.is_empty());
    }

    #[test]
    fn update_edits_the_entry_in_place() {
        let map = ReferenceMap::new();
        map.register(token("ws", 2, 5));
        assert!(map.update("ws_2", 5, |t| t.spilled.push(PointerPair::host_only(Address::new(9, 64)))));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("ws_2").unwrap().spilled.len(), 1);
        assert_eq!(map.outstanding_bytes(), 264);
    }

    #[test]
    fn older_instance_cannot_touch_newer_entry() {
        let map = ReferenceMap::new();
        map.register(token("ws", 1, 10));
        map.register(token("ws", 1, 11));

        assert!(!map.register(token("ws", 1, 10)));
        assert!(!map.update("ws_1", 10, |t| t.spilled.push(PointerPair::host_only(Address::new(7, 8)))));

        let current = map.get("ws_1").unwrap();
        assert_eq!(current.serial, 11);
        assert!(current.spilled.is_empty());
        assert!(!map.update("missing_1", 11, |_| {}));
    }

    #[test]
    fn serials_are_unique() {
        assert_ne!(next_serial(), next_serial());
    }
}
