// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Poll-based scheduler for scheduled tasks (§4.9).
//!
//! Each tick fetches due tasks, re-checks their status (they may have been
//! paused since selection), and runs the survivors through the same
//! per-group lock the message dispatcher uses — a scheduled task and a
//! live chat message for the same group never execute concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nanoclaw_core::{next_run_after_fire, ScheduleKind};
use nanoclaw_dispatch::LockManager;
use nanoclaw_store::{ScheduledTask, StorePool, TaskStatus};
use tracing::{debug, error, warn};

/// Runs one due task to completion and returns a human-readable result
/// summary. The scheduler has no idea whether this ends up on the fast path
/// or in the sandbox runner — that choice belongs to whatever implements
/// this trait.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &ScheduledTask) -> anyhow::Result<String>;
}

const RESULT_SUMMARY_MAX_CHARS: usize = 200;

pub struct Scheduler {
    store: Arc<StorePool>,
    lock_manager: Arc<LockManager>,
    executor: Arc<dyn TaskExecutor>,
    poll_interval_ms: u64,
    maintenance_mode: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(
        store: Arc<StorePool>,
        lock_manager: Arc<LockManager>,
        executor: Arc<dyn TaskExecutor>,
        poll_interval_ms: u64,
    ) -> Self {
        Self {
            store,
            lock_manager,
            executor,
            poll_interval_ms,
            maintenance_mode: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_maintenance_mode(&self, active: bool) {
        self.maintenance_mode.store(active, Ordering::SeqCst);
    }

    /// Requests a stop. Any in-flight tick finishes; `run` returns after that.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Runs the poll loop until `stop()` is called.
    pub async fn run(&self) {
        while !self.stop.load(Ordering::SeqCst) {
            self.tick().await;
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(self.poll_interval_ms)).await;
        }
    }

    /// Runs a single poll iteration. Exposed directly so tests don't have to
    /// race a background loop against `stop()`.
    pub async fn tick(&self) {
        if self.maintenance_mode.load(Ordering::SeqCst) {
            debug!("scheduler tick skipped: maintenance mode active");
            return;
        }

        let now = chrono::Utc::now().timestamp_millis();
        let due = match self.store.due_tasks(now).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "failed to fetch due tasks");
                return;
            }
        };

        for task in due {
            self.run_one(task).await;
        }
    }

    async fn run_one(&self, task: ScheduledTask) {
        let id = task.id.clone();
        let folder = task.group_folder.clone();
        let store = self.store.clone();
        let executor = self.executor.clone();

        self.lock_manager
            .with_lock(&folder, move || async move {
                let current = match store.get_task(id.clone()).await {
                    Ok(Some(t)) => t,
                    Ok(None) => return,
                    Err(e) => {
                        error!(task_id = %id, error = %e, "failed to re-read task before running");
                        return;
                    }
                };
                if !matches!(current.status, TaskStatus::Active) {
                    debug!(task_id = %id, "task no longer active, skipping run");
                    return;
                }

                let start = chrono::Utc::now().timestamp_millis();
                let run_result = executor.execute(&current).await;
                let fired_at = chrono::Utc::now().timestamp_millis();
                let duration_ms = fired_at - start;

                let (log_status, summary) = match &run_result {
                    Ok(text) => ("success", truncate(text)),
                    Err(e) => ("error", truncate(&e.to_string())),
                };

                let next_run = ScheduleKind::parse(&current.schedule_kind)
                    .and_then(|kind| next_run_after_fire(kind, &current.schedule_value, fired_at));

                if let Err(e) = store
                    .update_after_run(id.clone(), next_run, fired_at, summary.clone())
                    .await
                {
                    error!(task_id = %id, error = %e, "failed to update task after run");
                }

                if let Err(e) = store
                    .append_run_log(id.clone(), log_status.to_string(), duration_ms, Some(summary), fired_at)
                    .await
                {
                    error!(task_id = %id, error = %e, "failed to append run log");
                }

                if let Err(e) = run_result {
                    warn!(task_id = %id, group = %current.group_folder, error = %e, "scheduled task run failed");
                }
            })
            .await;
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(RESULT_SUMMARY_MAX_CHARS).collect()
}
