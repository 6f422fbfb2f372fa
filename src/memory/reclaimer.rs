// Copyright 2024-2026 Workspace Arena Contributors
// SPDX-License-Identifier: Apache-2.0

//! Background reclaimer for workspace native memory.
//!
//! One dedicated thread drives a current-thread tokio runtime that waits on
//! the token channel. Each token is released pointer by pointer; a failing
//! release is logged and skipped so that one bad pointer cannot stall the
//! rest. Shutdown is cooperative: cancel, close the channel, drain what is
//! buffered, stop.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::allocator::{Address, MemoryAllocator, MemoryKind};
use super::pointers::PointerPair;
use super::token::{DeallocationToken, ReferenceMap};
use crate::telemetry;

/// Reclaimer configuration.
#[derive(Debug, Clone)]
pub struct ReclaimerConfig {
    pub thread_name: String,
    /// How long `shutdown` waits for the drain to finish.
    pub shutdown_timeout: Duration,
}

impl Default for ReclaimerConfig {
    fn default() -> Self {
        Self {
            thread_name: "workspace-reclaimer".to_string(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Observable reclaimer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimerState {
    Waiting,
    Draining,
    Stopped,
}

const WAITING: u8 = 0;
const DRAINING: u8 = 1;
const STOPPED: u8 = 2;

/// Cumulative reclamation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReclaimStats {
    pub tokens: u64,
    pub pointers_released: u64,
    pub bytes_released: u64,
    pub release_failures: u64,
}

impl ReclaimStats {
    fn merge(&mut self, other: ReclaimStats) {
        self.tokens += other.tokens;
        self.pointers_released += other.pointers_released;
        self.bytes_released += other.bytes_released;
        self.release_failures += other.release_failures;
    }
}

#[derive(Default)]
struct Counters {
    state: AtomicU8,
    tokens: AtomicU64,
    pointers_released: AtomicU64,
    bytes_released: AtomicU64,
    release_failures: AtomicU64,
}

impl Counters {
    fn add(&self, delta: ReclaimStats) {
        self.tokens.fetch_add(delta.tokens, Ordering::SeqCst);
        self.pointers_released.fetch_add(delta.pointers_released, Ordering::SeqCst);
        self.bytes_released.fetch_add(delta.bytes_released, Ordering::SeqCst);
        self.release_failures.fetch_add(delta.release_failures, Ordering::SeqCst);
    }

    fn snapshot(&self) -> ReclaimStats {
        ReclaimStats {
            tokens: self.tokens.load(Ordering::SeqCst),
            pointers_released: self.pointers_released.load(Ordering::SeqCst),
            bytes_released: self.bytes_released.load(Ordering::SeqCst),
            release_failures: self.release_failures.load(Ordering::SeqCst),
        }
    }
}

/// Allocator, reference map and counters shared by the reclaimer thread and
/// every workspace (for the inline fallback after shutdown).
pub(crate) struct ReclaimShared {
    pub(crate) allocator: Arc<dyn MemoryAllocator>,
    pub(crate) references: Arc<ReferenceMap>,
    counters: Counters,
}

impl ReclaimShared {
    pub(crate) fn new(allocator: Arc<dyn MemoryAllocator>, references: Arc<ReferenceMap>) -> Self {
        Self {
            allocator,
            references,
            counters: Counters::default(),
        }
    }

    /// Release everything recorded in `token` and update the counters.
    pub(crate) fn reclaim(&self, token: DeallocationToken) {
        let delta = release_token(self.allocator.as_ref(), &self.references, token);
        self.record(delta);
    }

    /// Release one pair on the calling thread (arena replacement, end of
    /// cycle) and count it like reclaimer work.
    pub(crate) fn release_now(&self, pair: &PointerPair) -> ReclaimStats {
        let delta = release_pair(self.allocator.as_ref(), pair);
        self.record(delta);
        delta
    }

    fn record(&self, delta: ReclaimStats) {
        self.counters.add(delta);
        telemetry::record_reclaimed(delta.tokens, delta.bytes_released, delta.release_failures);
    }

    pub(crate) fn stats(&self) -> ReclaimStats {
        self.counters.snapshot()
    }
}

/// Sending half of the token channel, held by every workspace.
#[derive(Clone)]
pub(crate) struct ReclaimSender {
    tx: mpsc::UnboundedSender<DeallocationToken>,
}

impl ReclaimSender {
    /// Queue a token. Hands it back if the reclaimer has stopped.
    pub(crate) fn send(&self, token: DeallocationToken) -> Result<(), DeallocationToken> {
        self.tx.send(token).map_err(|e| e.0)
    }
}

/// Handle to the running reclaimer thread.
pub struct Reclaimer {
    sender: ReclaimSender,
    shared: Arc<ReclaimShared>,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
    config: ReclaimerConfig,
}

impl Reclaimer {
    /// Start the reclaimer thread.
    pub(crate) fn spawn(shared: Arc<ReclaimShared>, config: ReclaimerConfig) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let runtime = tokio::runtime::Builder::new_current_thread().build()?;

        let loop_shared = shared.clone();
        let loop_shutdown = shutdown.clone();
        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                runtime.block_on(reclaim_loop(rx, loop_shutdown, &loop_shared));
            })?;

        tracing::debug!(thread = %config.thread_name, "workspace reclaimer started");
        Ok(Self {
            sender: ReclaimSender { tx },
            shared,
            shutdown,
            handle: Some(handle),
            config,
        })
    }

    pub(crate) fn sender(&self) -> ReclaimSender {
        self.sender.clone()
    }

    pub fn state(&self) -> ReclaimerState {
        match self.shared.counters.state.load(Ordering::SeqCst) {
            WAITING => ReclaimerState::Waiting,
            DRAINING => ReclaimerState::Draining,
            _ => ReclaimerState::Stopped,
        }
    }

    pub fn stats(&self) -> ReclaimStats {
        self.shared.stats()
    }

    /// Stop accepting tokens, drain the queue and wait for the thread.
    pub fn shutdown(mut self) -> ReclaimStats {
        self.stop();
        self.stats()
    }

    fn stop(&mut self) {
        let Some(handle) = self.handle.take() else { return };
        self.shutdown.cancel();

        let deadline = Instant::now() + self.config.shutdown_timeout;
        let poll_interval = Duration::from_millis(5);
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!(
                    timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
                    "reclaimer did not drain before timeout; detaching"
                );
                return;
            }
            thread::sleep(poll_interval);
        }
        if handle.join().is_err() {
            tracing::warn!("reclaimer thread panicked");
        }
        let stats = self.stats();
        tracing::info!(
            tokens = stats.tokens,
            bytes = stats.bytes_released,
            failures = stats.release_failures,
            "workspace reclaimer stopped"
        );
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn reclaim_loop(
    mut rx: mpsc::UnboundedReceiver<DeallocationToken>,
    shutdown: CancellationToken,
    shared: &ReclaimShared,
) {
    let state = &shared.counters.state;
    loop {
        state.store(WAITING, Ordering::SeqCst);
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                tracing::debug!("reclaimer: shutdown requested, draining");
                break;
            }
            token = rx.recv() => match token {
                Some(token) => {
                    state.store(DRAINING, Ordering::SeqCst);
                    shared.reclaim(token);
                }
                None => break,
            }
        }
    }

    // Late senders now get their token back and release inline.
    rx.close();
    state.store(DRAINING, Ordering::SeqCst);
    while let Some(token) = rx.recv().await {
        shared.reclaim(token);
    }
    state.store(STOPPED, Ordering::SeqCst);
}

/// Release every pointer in `token`.
///
/// Order: primary device, primary host, reference-map removal, then each
/// spilled pair, the pinned queue front to back, retired arenas and
/// provisional pairs. Within a pair the device side goes first.
pub(crate) fn release_token(
    allocator: &dyn MemoryAllocator,
    references: &ReferenceMap,
    mut token: DeallocationToken,
) -> ReclaimStats {
    let mut stats = ReclaimStats { tokens: 1, ..Default::default() };
    tracing::debug!(
        workspace = %token.workspace_id,
        thread_id = token.thread_id,
        pointers = token.pointer_count(),
        "reclaiming workspace memory"
    );

    stats.merge(release_pair(allocator, &token.primary));
    references.unregister(&token.key(), token.serial);

    for pair in &token.spilled {
        stats.merge(release_pair(allocator, pair));
    }
    while let Some(pair) = token.pinned.pop_front() {
        stats.merge(release_pair(allocator, &pair));
    }
    for pair in token.retired.iter().chain(&token.provisional) {
        stats.merge(release_pair(allocator, pair));
    }
    stats
}

fn release_pair(allocator: &dyn MemoryAllocator, pair: &PointerPair) -> ReclaimStats {
    let mut stats = ReclaimStats::default();
    if let Some(device) = pair.device {
        stats.merge(release_one(allocator, &device, MemoryKind::Device));
    }
    if let Some(host) = pair.host {
        stats.merge(release_one(allocator, &host, MemoryKind::Host));
    }
    stats
}

fn release_one(allocator: &dyn MemoryAllocator, address: &Address, kind: MemoryKind) -> ReclaimStats {
    let outcome = catch_unwind(AssertUnwindSafe(|| allocator.release(address, kind)));
    match outcome {
        Ok(Ok(())) => ReclaimStats {
            pointers_released: 1,
            bytes_released: address.len as u64,
            ..Default::default()
        },
        Ok(Err(e)) => {
            tracing::warn!(handle = address.handle, %kind, error = %e, "release failed during reclamation");
            ReclaimStats { release_failures: 1, ..Default::default() }
        }
        Err(_) => {
            tracing::warn!(handle = address.handle, %kind, "allocator panicked during reclamation");
            ReclaimStats { release_failures: 1, ..Default::default() }
        }
    }
}
