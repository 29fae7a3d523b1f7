// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `schedule_task` (§4.8).

use std::sync::Arc;

use async_trait::async_trait;
use nanoclaw_core::{compute_next_run, ScheduleError, ScheduleKind};
use nanoclaw_store::{ContextMode, ScheduledTask, StorePool, TaskStatus};
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct ScheduleTaskTool {
    store: Arc<StorePool>,
}

impl ScheduleTaskTool {
    pub fn new(store: Arc<StorePool>) -> Self {
        Self { store }
    }
}

fn new_task_id(now_ms: i64) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("task-{now_ms}-{}", &suffix[..8])
}

#[async_trait]
impl Tool for ScheduleTaskTool {
    fn name(&self) -> &str {
        "schedule_task"
    }

    fn description(&self) -> &str {
        "Schedule a future prompt to run once, on an interval, or on a cron expression."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {"type": "string"},
                "schedule_type": {"type": "string", "enum": ["cron", "interval", "once"]},
                "schedule_value": {"type": "string"},
                "context_mode": {"type": "string", "enum": ["isolated", "group"]},
            },
            "required": ["prompt", "schedule_type", "schedule_value"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let prompt = match call.args.get("prompt").and_then(Value::as_str) {
            Some(p) => p.to_string(),
            None => return ToolOutput::error(&call.id, &call.name, "Missing field: prompt"),
        };
        let schedule_type = call.args.get("schedule_type").and_then(Value::as_str).unwrap_or("");
        let Some(kind) = ScheduleKind::parse(schedule_type) else {
            return ToolOutput::error(
                &call.id,
                &call.name,
                format!("Invalid schedule_type: {schedule_type:?}"),
            );
        };
        let schedule_value = call.args.get("schedule_value").and_then(Value::as_str).unwrap_or("");

        let now_ms = chrono::Utc::now().timestamp_millis();
        let next_run = match compute_next_run(kind, schedule_value, now_ms) {
            Ok(next) => next,
            Err(ScheduleError::InvalidInterval) => {
                return ToolOutput::error(&call.id, &call.name, "Invalid interval value")
            }
            Err(ScheduleError::InvalidTimestamp) => {
                return ToolOutput::error(&call.id, &call.name, "Invalid timestamp")
            }
            Err(ScheduleError::InvalidCron) => {
                return ToolOutput::error(&call.id, &call.name, "Invalid cron expression")
            }
        };

        let context_mode = match call.args.get("context_mode").and_then(Value::as_str) {
            Some("group") => ContextMode::Group,
            _ => ContextMode::Isolated,
        };

        let task = ScheduledTask {
            id: new_task_id(now_ms),
            group_folder: call.group_folder.clone(),
            chat_id: call.chat_id.clone(),
            prompt,
            schedule_kind: kind.as_str().to_string(),
            schedule_value: schedule_value.to_string(),
            context_mode,
            next_run,
            last_run: None,
            last_result: None,
            status: TaskStatus::Active,
            created_at: now_ms,
        };

        let task_id = task.id.clone();
        match self.store.create_task(task).await {
            Ok(()) => ToolOutput::ok(
                &call.id,
                &call.name,
                json!({"success": true, "task_id": task_id, "next_run": next_run}),
            ),
            Err(e) => {
                tracing::error!(error = %e, "schedule_task: store write failed");
                ToolOutput::error(&call.id, &call.name, "Function execution failed")
            }
        }
    }
}
