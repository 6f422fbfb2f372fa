//! Tests for the manager and per-thread registries.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::*;
use crate::memory::allocator::MockAllocator;
use crate::memory::policy::{LearningPolicy, SpillPolicy};

fn manager() -> (Arc<MockAllocator>, WorkspaceManager) {
    let alloc = Arc::new(MockAllocator::unbounded());
    let config = ManagerConfig {
        default_workspace: WorkspaceConfig::fixed(1024),
        ..Default::default()
    };
    let manager = WorkspaceManager::with_config(alloc.clone(), config).unwrap();
    (alloc, manager)
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[test]
fn empty_id_is_rejected() {
    let (_alloc, manager) = manager();
    let mut ctx = manager.context();
    assert!(matches!(ctx.workspace(""), Err(WorkspaceError::InvalidArgument(_))));
    assert!(!ctx.exists(""));
}

#[test]
fn get_or_create_returns_the_bound_instance() {
    let (_alloc, manager) = manager();
    let mut ctx = manager.context();
    let a = ctx.workspace("loop").unwrap();
    let other = WorkspaceConfig::fixed(64);
    let b = ctx.get_or_create(&other, "loop").unwrap();
    assert!(a.ptr_eq(&b));
    assert_eq!(b.capacity(), 1024);
    assert_eq!(ctx.workspace_ids(), vec!["loop".to_string()]);
}

#[test]
fn invalid_config_is_rejected_at_creation() {
    let (_alloc, manager) = manager();
    let mut ctx = manager.context();
    let bad = WorkspaceConfig { initial_size: 4096, max_size: 1024, ..Default::default() };
    assert!(ctx.get_or_create(&bad, "bad").is_err());
    assert!(!ctx.exists("bad"));
}

#[test]
fn destroy_is_idempotent_and_recreates_fresh() {
    let (_alloc, manager) = manager();
    let mut ctx = manager.context();
    let first = ctx.workspace("w").unwrap();
    first.allocate(512).unwrap();
    drop(first);

    assert!(ctx.destroy("w"));
    assert!(!ctx.destroy("w"));
    assert!(!ctx.exists("w"));

    let fresh = ctx.workspace("w").unwrap();
    assert_eq!(fresh.current_offset(), 0);
    assert_eq!(fresh.generation(), 0);
}

#[test]
fn destroy_workspace_only_removes_the_bound_instance() {
    let (_alloc, manager) = manager();
    let mut ctx = manager.context();
    let stale = ctx.workspace("w").unwrap();
    ctx.destroy("w");
    let current = ctx.workspace("w").unwrap();

    assert!(!ctx.destroy_workspace(&stale));
    assert!(ctx.exists("w"));
    assert!(ctx.destroy_workspace(&current));
    assert!(!ctx.exists("w"));
}

#[test]
fn set_workspace_binds_an_existing_instance() {
    let (_alloc, manager) = manager();
    let mut ctx = manager.context();
    let ws = ctx.workspace("original").unwrap();

    assert!(ctx.set_workspace("alias", ws.clone()).unwrap().is_none());
    assert!(ctx.workspace("alias").unwrap().ptr_eq(&ws));
    assert_eq!(ctx.workspace_ids(), vec!["alias".to_string(), "original".to_string()]);

    let other = ctx.workspace("other").unwrap();
    let replaced = ctx.set_workspace("alias", other.clone()).unwrap().unwrap();
    assert!(replaced.ptr_eq(&ws));
    assert!(ctx.workspace("alias").unwrap().ptr_eq(&other));

    assert!(matches!(ctx.set_workspace("", ws.clone()), Err(WorkspaceError::InvalidArgument(_))));

    assert!(ctx.destroy_workspace(&other));
    assert!(!ctx.exists("alias"));
    assert!(!ctx.exists("other"));
    assert!(ctx.exists("original"));
}

#[test]
fn set_workspace_rejects_a_workspace_from_another_thread() {
    let (_alloc, manager) = manager();
    let foreign = std::thread::scope(|s| {
        s.spawn(|| manager.context().workspace("remote").unwrap())
            .join()
            .unwrap()
    });

    let mut ctx = manager.context();
    assert!(matches!(
        ctx.set_workspace("remote", foreign),
        Err(WorkspaceError::CrossThreadAccess { .. })
    ));
    assert!(!ctx.exists("remote"));
}

#[test]
fn activate_sets_and_restores_the_current_workspace() {
    let (_alloc, manager) = manager();
    let mut ctx = manager.context();
    assert!(ctx.current_workspace().is_none());
    {
        let outer = ctx.activate("outer").unwrap();
        assert!(outer.is_active());
        assert!(ctx.current_workspace().unwrap().ptr_eq(&outer));
        {
            let inner = ctx.activate("inner").unwrap();
            assert!(ctx.current_workspace().unwrap().ptr_eq(&inner));
        }
        assert!(ctx.current_workspace().unwrap().ptr_eq(&outer));
        assert!(!ctx.workspace("inner").unwrap().is_active());
    }
    assert!(ctx.current_workspace().is_none());
    assert!(!ctx.workspace("outer").unwrap().is_active());
}

#[test]
fn scope_guards_dropped_out_of_order_leave_no_stale_marker() {
    let (_alloc, manager) = manager();
    let mut ctx = manager.context();
    let outer = ctx.activate("outer").unwrap();
    let inner = ctx.activate("inner").unwrap();

    drop(outer);
    assert!(ctx.current_workspace().unwrap().ptr_eq(&inner));

    drop(inner);
    assert!(ctx.current_workspace().is_none());
    assert!(!ctx.workspace("outer").unwrap().is_active());
}

#[test]
fn activating_an_active_workspace_fails() {
    let (_alloc, manager) = manager();
    let mut ctx = manager.context();
    let _scope = ctx.activate("w").unwrap();
    assert!(matches!(ctx.activate("w"), Err(WorkspaceError::AlreadyActive { .. })));
}

#[test]
fn scope_guard_resets_arena_each_cycle() {
    let (alloc, manager) = manager();
    let mut ctx = manager.context();
    let created = alloc.allocation_count();
    for _ in 0..3 {
        let scope = ctx.activate("loop").unwrap();
        scope.allocate(256).unwrap();
        scope.allocate(256).unwrap();
        assert_eq!(scope.current_offset(), 512);
    }
    assert_eq!(alloc.allocation_count(), created + 2);
    assert_eq!(ctx.workspace("loop").unwrap().generation(), 3);
}

#[test]
fn activate_with_uses_the_given_configuration() {
    let (_alloc, manager) = manager();
    let mut ctx = manager.context();
    let config = WorkspaceConfig {
        initial_size: 64,
        spill_policy: SpillPolicy::Fail,
        learning_policy: LearningPolicy::None,
        ..Default::default()
    };
    let scope = ctx.activate_with(&config, "small").unwrap();
    assert_eq!(scope.capacity(), 64);
    assert!(matches!(scope.allocate(128), Err(WorkspaceError::OutOfArenaMemory { .. })));
}

#[test]
fn scope_out_of_workspaces_without_current_is_noop() {
    let (_alloc, manager) = manager();
    let ctx = manager.context();
    let guard = ctx.scope_out_of_workspaces();
    assert!(guard.is_noop());
    drop(guard);
    assert!(ctx.current_workspace().is_none());
}

#[test]
fn scope_out_of_workspaces_suspends_and_restores() {
    let (_alloc, manager) = manager();
    let mut ctx = manager.context();
    let scope = ctx.activate("w").unwrap();
    {
        let guard = ctx.scope_out_of_workspaces();
        assert!(!guard.is_noop());
        assert!(guard.suspended().unwrap().ptr_eq(&scope));
        assert!(ctx.current_workspace().is_none());
        assert!(scope.is_active());
    }
    assert!(ctx.current_workspace().unwrap().ptr_eq(&scope));
}

#[test]
fn shared_marker_is_seen_by_both_contexts() {
    let (_alloc, manager) = manager();
    let marker: Arc<dyn CurrentWorkspace> = Arc::new(ActiveMarker::new());
    let mut a = manager.context_with_marker(marker.clone());
    let b = manager.context_with_marker(marker);
    assert_ne!(a.thread_id(), b.thread_id());

    let scope = a.activate("w").unwrap();
    assert!(b.current_workspace().unwrap().ptr_eq(&scope));
}

#[test]
fn statistics_cover_every_workspace() {
    let (_alloc, manager) = manager();
    let mut ctx = manager.context();
    ctx.workspace("a").unwrap().allocate(2048).unwrap();
    ctx.workspace("b").unwrap().allocate(16).unwrap();

    let stats = ctx.statistics();
    assert_eq!(stats.len(), 2);
    assert_eq!(stats.thread_id, ctx.thread_id());
    assert_eq!(stats.get("a").unwrap().spilled_count, 1);
    assert_eq!(stats.get("b").unwrap().used_bytes, 16);
    assert_eq!(stats.totals(), (2048, 2048, 0));
    ctx.print_statistics();
}

#[test]
fn destroy_all_reclaims_everything() {
    let (alloc, manager) = manager();
    let mut ctx = manager.context();
    for id in ["a", "b", "c"] {
        ctx.workspace(id).unwrap().allocate(4096).unwrap();
    }
    assert_eq!(manager.registered_tokens(), 3);
    assert!(manager.outstanding_bytes() > 0);

    assert_eq!(ctx.destroy_all(), 3);
    assert!(ctx.workspace_ids().is_empty());
    assert!(wait_until(|| alloc.leak_count() == 0));
    assert!(wait_until(|| manager.registered_tokens() == 0));

    let stats = manager.shutdown();
    assert_eq!(stats.tokens, 3);
    assert_eq!(stats.release_failures, 0);
}

#[test]
fn live_guard_keeps_destroyed_workspace_alive() {
    let (alloc, manager) = manager();
    let mut ctx = manager.context();
    let scope = ctx.activate("w").unwrap();
    ctx.destroy("w");
    // Marker and guard still own it.
    assert!(alloc.leak_count() > 0);
    scope.allocate(64).unwrap();
    drop(scope);
    assert!(wait_until(|| alloc.leak_count() == 0));
}

#[test]
fn default_configuration_can_be_replaced() {
    let (_alloc, manager) = manager();
    let replacement = WorkspaceConfig::fixed(128);
    manager.set_default_configuration(replacement).unwrap();
    assert_eq!(manager.default_configuration(), replacement);

    let mut ctx = manager.context();
    assert_eq!(ctx.default_workspace().unwrap().capacity(), 128);
    assert_eq!(ctx.workspace_ids(), vec![DEFAULT_WORKSPACE_ID.to_string()]);

    let bad = WorkspaceConfig { overallocation_limit: -1.0, ..Default::default() };
    assert!(manager.set_default_configuration(bad).is_err());
    assert_eq!(manager.default_configuration(), replacement);
}

#[test]
fn drops_after_shutdown_release_inline() {
    let (alloc, manager) = manager();
    let mut ctx = manager.context();
    let ws = ctx.workspace("late").unwrap();
    ctx.destroy("late");
    assert_eq!(manager.reclaimer_state(), ReclaimerState::Waiting);
    manager.shutdown();

    drop(ws);
    assert_eq!(alloc.leak_count(), 0);
}
