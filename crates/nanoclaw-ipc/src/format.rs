// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! On-disk JSON shapes written by sandboxed agents into the IPC directories
//! (§6.2).

use serde::Deserialize;
use serde_json::Value;

/// `.../messages/*.json`: a message to relay to a chat on the agent's behalf.
#[derive(Debug, Clone, Deserialize)]
pub struct IpcMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "chatJid")]
    pub chat_jid: String,
    pub text: String,
    #[allow(dead_code)]
    pub timestamp: i64,
}

/// `.../tasks/*.json`: a function-call request routed through the same
/// handlers the fast path and sandbox runner use in-band.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum IpcTask {
    #[serde(rename = "schedule_task", rename_all = "camelCase")]
    ScheduleTask {
        prompt: String,
        schedule_type: String,
        schedule_value: String,
        #[serde(default)]
        chat_jid: Option<String>,
        #[serde(default)]
        context_mode: Option<String>,
    },
    #[serde(rename = "pause_task", rename_all = "camelCase")]
    PauseTask { task_id: String },
    #[serde(rename = "resume_task", rename_all = "camelCase")]
    ResumeTask { task_id: String },
    #[serde(rename = "cancel_task", rename_all = "camelCase")]
    CancelTask { task_id: String },
    #[serde(rename = "register_group")]
    RegisterGroup {
        jid: String,
        name: String,
        folder: String,
        trigger: String,
    },
    #[serde(rename = "generate_image", rename_all = "camelCase")]
    GenerateImage { prompt: String, chat_jid: String },
}

impl IpcTask {
    /// The name of the in-band tool this task maps to — used both to build
    /// the `ToolCall` and to report unroutable tasks.
    pub fn tool_name(&self) -> &'static str {
        match self {
            IpcTask::ScheduleTask { .. } => "schedule_task",
            IpcTask::PauseTask { .. } => "pause_task",
            IpcTask::ResumeTask { .. } => "resume_task",
            IpcTask::CancelTask { .. } => "cancel_task",
            IpcTask::RegisterGroup { .. } => "register_group",
            IpcTask::GenerateImage { .. } => "generate_image",
        }
    }

    /// Render into the `args` object the matching `Tool::execute` expects.
    pub fn to_args(&self) -> Value {
        match self {
            IpcTask::ScheduleTask {
                prompt,
                schedule_type,
                schedule_value,
                context_mode,
                ..
            } => serde_json::json!({
                "prompt": prompt,
                "schedule_type": schedule_type,
                "schedule_value": schedule_value,
                "context_mode": context_mode,
            }),
            IpcTask::PauseTask { task_id }
            | IpcTask::ResumeTask { task_id }
            | IpcTask::CancelTask { task_id } => serde_json::json!({ "task_id": task_id }),
            IpcTask::RegisterGroup { jid, name, folder, trigger } => serde_json::json!({
                "chat_id": jid,
                "name": name,
                "folder": folder,
                "trigger": trigger,
            }),
            IpcTask::GenerateImage { prompt, chat_jid } => serde_json::json!({
                "prompt": prompt,
                "chat_jid": chat_jid,
            }),
        }
    }

    /// Chat id the resulting tool call should be attributed to, when the task
    /// itself carries one (falls back to the group's own chat id otherwise).
    pub fn chat_jid(&self) -> Option<&str> {
        match self {
            IpcTask::ScheduleTask { chat_jid, .. } => chat_jid.as_deref(),
            IpcTask::GenerateImage { chat_jid, .. } => Some(chat_jid),
            IpcTask::RegisterGroup { jid, .. } => Some(jid),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_message_file() {
        let raw = r#"{"type":"message","chatJid":"123@g.us","text":"hello","timestamp":1000}"#;
        let msg: IpcMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.kind, "message");
        assert_eq!(msg.chat_jid, "123@g.us");
    }

    #[test]
    fn parses_schedule_task_file() {
        let raw = r#"{"type":"schedule_task","prompt":"ping","scheduleType":"interval","scheduleValue":"1000"}"#;
        let task: IpcTask = serde_json::from_str(raw).unwrap();
        assert_eq!(task.tool_name(), "schedule_task");
        assert_eq!(task.to_args()["schedule_value"], "1000");
    }

    #[test]
    fn parses_pause_task_file() {
        let raw = r#"{"type":"pause_task","taskId":"task-1"}"#;
        let task: IpcTask = serde_json::from_str(raw).unwrap();
        assert_eq!(task.tool_name(), "pause_task");
        assert_eq!(task.to_args()["task_id"], "task-1");
    }

    #[test]
    fn parses_register_group_file() {
        let raw = r#"{"type":"register_group","jid":"jid1","name":"Team","folder":"team","trigger":"@Andy"}"#;
        let task: IpcTask = serde_json::from_str(raw).unwrap();
        assert_eq!(task.tool_name(), "register_group");
        assert_eq!(task.chat_jid(), Some("jid1"));
    }

    #[test]
    fn rejects_unknown_type() {
        let raw = r#"{"type":"unknown_thing","foo":"bar"}"#;
        assert!(serde_json::from_str::<IpcTask>(raw).is_err());
    }
}
