// Copyright 2024-2026 Workspace Arena Contributors
// SPDX-License-Identifier: Apache-2.0

//! `demo` subcommand: run scoped loops on worker threads against a
//! [`MockAllocator`] and report what happened.

use std::sync::Arc;
use std::thread::ScopedJoinHandle;

use serde::Serialize;
use thiserror::Error;

use crate::config::EnvConfig;
use crate::error::WorkspaceError;
use crate::memory::{MemoryAllocator, MockAllocator, ReclaimStats, ThreadStatistics, WorkspaceManager};

#[derive(Debug, Clone)]
pub struct DemoOptions {
    pub threads: usize,
    pub cycles: usize,
    /// Largest single allocation the workload issues (bytes).
    pub max_request: usize,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self { threads: 2, cycles: 8, max_request: 4096 }
    }
}

impl DemoOptions {
    pub fn from_args(args: &[String]) -> Self {
        let defaults = Self::default();
        let parse = |flag: &str, default: usize| {
            super::flag_value(args, flag)
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(default)
                .max(1)
        };
        Self {
            threads: parse("--threads", defaults.threads),
            cycles: parse("--cycles", defaults.cycles),
            max_request: parse("--max-request", defaults.max_request),
        }
    }
}

#[derive(Debug, Error)]
pub enum DemoError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error("Demo worker {worker} panicked")]
    WorkerPanicked { worker: usize },
}

#[derive(Debug, Serialize)]
pub struct DemoReport {
    /// Statistics per worker, taken before its registry was destroyed.
    pub threads: Vec<ThreadStatistics>,
    pub reclaim: ReclaimStats,
    pub leaked_bytes: usize,
}

/// Run the workload and return its report.
pub fn run_workload(config: &EnvConfig, opts: &DemoOptions) -> Result<DemoReport, DemoError> {
    let allocator = Arc::new(MockAllocator::unbounded());
    let manager = WorkspaceManager::with_config(allocator.clone(), config.manager_config())?;

    let threads = std::thread::scope(|s| {
        let workers: Vec<_> = (0..opts.threads)
            .map(|worker| {
                let manager = &manager;
                s.spawn(move || worker_loop(manager, worker, opts))
            })
            .collect();
        join_workers(workers)
    })?;

    let reclaim = manager.shutdown();
    Ok(DemoReport {
        threads,
        reclaim,
        leaked_bytes: allocator.allocated_bytes(),
    })
}

/// Join every worker in order, keeping the first failure.
fn join_workers<T>(
    workers: Vec<ScopedJoinHandle<'_, Result<T, WorkspaceError>>>,
) -> Result<Vec<T>, DemoError> {
    let mut results = Vec::with_capacity(workers.len());
    let mut failure = None;
    for (worker, handle) in workers.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(value)) => results.push(value),
            Ok(Err(e)) => {
                failure.get_or_insert(DemoError::Workspace(e));
            }
            Err(_) => {
                tracing::error!(worker, "demo worker panicked");
                failure.get_or_insert(DemoError::WorkerPanicked { worker });
            }
        }
    }
    match failure {
        Some(e) => Err(e),
        None => Ok(results),
    }
}

fn worker_loop(
    manager: &WorkspaceManager,
    worker: usize,
    opts: &DemoOptions,
) -> Result<ThreadStatistics, WorkspaceError> {
    let mut ctx = manager.context();
    for cycle in 0..opts.cycles {
        let scope = ctx.activate("loop")?;
        // Demand grows for a while, then settles.
        let requests = 2 + cycle.min(6);
        for i in 0..requests {
            let size = 1 + (worker * 131 + cycle * 61 + i * 977) % opts.max_request;
            scope.allocate(size)?;
        }
        if cycle == 0 {
            scope.allocate_pinned(64)?;
        }
        let _outside = ctx.scope_out_of_workspaces();
    }
    let stats = ctx.statistics();
    ctx.print_statistics();
    ctx.destroy_all();
    Ok(stats)
}

/// CLI entry: returns the process exit code.
pub fn run(args: &[String]) -> i32 {
    let opts = DemoOptions::from_args(args);
    let config = match super::flag_value(args, "--file") {
        Some(path) => match crate::config::load_file(path) {
            Ok(cfg) => cfg.with_env_overrides(),
            Err(e) => {
                eprintln!("ERROR: {}", e);
                return 2;
            }
        },
        None => crate::config::load(),
    };

    match run_workload(&config, &opts) {
        Ok(report) => {
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("ERROR: failed to encode report: {}", e),
            }
            if report.leaked_bytes == 0 { 0 } else { 1 }
        }
        Err(e) => {
            eprintln!("ERROR: {}", e);
            1
        }
    }
}
