// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `pause_task`, `resume_task`, `cancel_task` (§4.8).

use std::sync::Arc;

use async_trait::async_trait;
use nanoclaw_store::{ScheduledTask, StorePool, TaskStatus};
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolOutput};

fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "task_id": {"type": "string"},
        },
        "required": ["task_id"],
    })
}

/// A caller may act on a task if they created it or if they are main.
fn is_authorized(call: &ToolCall, task: &ScheduledTask) -> bool {
    call.is_main || task.group_folder == call.group_folder
}

async fn find_owned_task(store: &StorePool, call: &ToolCall) -> Result<ScheduledTask, ToolOutput> {
    let task_id = match call.args.get("task_id").and_then(Value::as_str) {
        Some(id) => id.to_string(),
        None => return Err(ToolOutput::error(&call.id, &call.name, "Missing field: task_id")),
    };
    match store.get_task(task_id.clone()).await {
        Ok(Some(task)) if is_authorized(call, &task) => Ok(task),
        Ok(Some(_)) => Err(ToolOutput::error(&call.id, &call.name, "Permission denied")),
        Ok(None) => Err(ToolOutput::error(&call.id, &call.name, format!("No such task: {task_id}"))),
        Err(e) => {
            tracing::error!(error = %e, "task lookup failed");
            Err(ToolOutput::error(&call.id, &call.name, "Function execution failed"))
        }
    }
}

pub struct PauseTaskTool {
    store: Arc<StorePool>,
}

impl PauseTaskTool {
    pub fn new(store: Arc<StorePool>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for PauseTaskTool {
    fn name(&self) -> &str {
        "pause_task"
    }

    fn description(&self) -> &str {
        "Pause an active scheduled task so it no longer fires."
    }

    fn parameters_schema(&self) -> Value {
        schema()
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let task = match find_owned_task(&self.store, call).await {
            Ok(task) => task,
            Err(out) => return out,
        };
        match self.store.set_task_status(task.id.clone(), TaskStatus::Paused).await {
            Ok(()) => ToolOutput::ok(&call.id, &call.name, json!({"success": true, "task_id": task.id})),
            Err(e) => {
                tracing::error!(error = %e, task_id = %task.id, "pause_task: store write failed");
                ToolOutput::error(&call.id, &call.name, "Function execution failed")
            }
        }
    }
}

pub struct ResumeTaskTool {
    store: Arc<StorePool>,
}

impl ResumeTaskTool {
    pub fn new(store: Arc<StorePool>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ResumeTaskTool {
    fn name(&self) -> &str {
        "resume_task"
    }

    fn description(&self) -> &str {
        "Resume a paused scheduled task."
    }

    fn parameters_schema(&self) -> Value {
        schema()
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let task = match find_owned_task(&self.store, call).await {
            Ok(task) => task,
            Err(out) => return out,
        };
        match self.store.set_task_status(task.id.clone(), TaskStatus::Active).await {
            Ok(()) => ToolOutput::ok(&call.id, &call.name, json!({"success": true, "task_id": task.id})),
            Err(e) => {
                tracing::error!(error = %e, task_id = %task.id, "resume_task: store write failed");
                ToolOutput::error(&call.id, &call.name, "Function execution failed")
            }
        }
    }
}

pub struct CancelTaskTool {
    store: Arc<StorePool>,
}

impl CancelTaskTool {
    pub fn new(store: Arc<StorePool>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CancelTaskTool {
    fn name(&self) -> &str {
        "cancel_task"
    }

    fn description(&self) -> &str {
        "Permanently cancel a scheduled task, removing it."
    }

    fn parameters_schema(&self) -> Value {
        schema()
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let task = match find_owned_task(&self.store, call).await {
            Ok(task) => task,
            Err(out) => return out,
        };
        match self.store.delete_task(task.id.clone()).await {
            Ok(()) => ToolOutput::ok(&call.id, &call.name, json!({"success": true, "task_id": task.id})),
            Err(e) => {
                tracing::error!(error = %e, task_id = %task.id, "cancel_task: store write failed");
                ToolOutput::error(&call.id, &call.name, "Function execution failed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(group_folder: &str, is_main: bool, task_id: &str) -> ToolCall {
        ToolCall {
            id: "1".into(),
            name: "pause_task".into(),
            args: json!({"task_id": task_id}),
            group_folder: group_folder.into(),
            chat_id: "c1".into(),
            is_main,
        }
    }

    fn sample(id: &str, group_folder: &str) -> ScheduledTask {
        ScheduledTask {
            id: id.into(),
            group_folder: group_folder.into(),
            chat_id: "c1".into(),
            prompt: "ping".into(),
            schedule_kind: "interval".into(),
            schedule_value: "1000".into(),
            context_mode: nanoclaw_store::ContextMode::Isolated,
            next_run: Some(1000),
            last_run: None,
            last_result: None,
            status: TaskStatus::Active,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn pause_then_resume_round_trips_status() {
        let store = Arc::new(StorePool::open_in_memory().await.unwrap());
        store.create_task(sample("t1", "main")).await.unwrap();

        let pause = PauseTaskTool::new(store.clone());
        let out = pause.execute(&call("main", true, "t1")).await;
        assert!(!out.is_error(), "{:?}", out.response);
        let task = store.get_task("t1".into()).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Paused);

        let resume = ResumeTaskTool::new(store.clone());
        let out = resume.execute(&call("main", true, "t1")).await;
        assert!(!out.is_error());
        let task = store.get_task("t1".into()).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Active);
    }

    #[tokio::test]
    async fn cancel_deletes_task() {
        let store = Arc::new(StorePool::open_in_memory().await.unwrap());
        store.create_task(sample("t1", "main")).await.unwrap();
        let cancel = CancelTaskTool::new(store.clone());
        let out = cancel.execute(&call("main", true, "t1")).await;
        assert!(!out.is_error());
        assert!(store.get_task("t1".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_owner_non_main_is_denied() {
        let store = Arc::new(StorePool::open_in_memory().await.unwrap());
        store.create_task(sample("t1", "groupA")).await.unwrap();
        let pause = PauseTaskTool::new(store.clone());
        let out = pause.execute(&call("groupB", false, "t1")).await;
        assert!(out.is_error());
        assert_eq!(out.response["error"], "Permission denied");
    }

    #[tokio::test]
    async fn owner_group_may_act_without_being_main() {
        let store = Arc::new(StorePool::open_in_memory().await.unwrap());
        store.create_task(sample("t1", "groupA")).await.unwrap();
        let pause = PauseTaskTool::new(store.clone());
        let out = pause.execute(&call("groupA", false, "t1")).await;
        assert!(!out.is_error());
    }

    #[tokio::test]
    async fn missing_task_reports_error() {
        let store = Arc::new(StorePool::open_in_memory().await.unwrap());
        let pause = PauseTaskTool::new(store.clone());
        let out = pause.execute(&call("main", true, "nope")).await;
        assert!(out.is_error());
    }
}
