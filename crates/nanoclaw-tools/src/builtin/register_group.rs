// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `register_group` (§4.8), main-only.

use std::sync::Arc;

use async_trait::async_trait;
use nanoclaw_core::{folder_name_from_display_name, GroupRecord, GroupStore};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::ports::GroupRegistrar;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct RegisterGroupTool {
    groups: Arc<GroupStore>,
    registrar: Option<Arc<dyn GroupRegistrar>>,
}

impl RegisterGroupTool {
    pub fn new(groups: Arc<GroupStore>, registrar: Option<Arc<dyn GroupRegistrar>>) -> Self {
        Self { groups, registrar }
    }
}

#[async_trait]
impl Tool for RegisterGroupTool {
    fn name(&self) -> &str {
        "register_group"
    }

    fn description(&self) -> &str {
        "Register a new chat as a tenant group, giving it its own folder and trigger."
    }

    fn main_only(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "chat_id": {"type": "string"},
                "name": {"type": "string"},
                "trigger": {"type": "string"},
            },
            "required": ["chat_id", "name", "trigger"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        if !call.is_main {
            return ToolOutput::error(&call.id, &call.name, "Permission denied");
        }
        let chat_id = match call.args.get("chat_id").and_then(Value::as_str) {
            Some(v) => v.to_string(),
            None => return ToolOutput::error(&call.id, &call.name, "Missing field: chat_id"),
        };
        let name = match call.args.get("name").and_then(Value::as_str) {
            Some(v) => v.to_string(),
            None => return ToolOutput::error(&call.id, &call.name, "Missing field: name"),
        };
        let trigger = match call.args.get("trigger").and_then(Value::as_str) {
            Some(v) => v.to_string(),
            None => return ToolOutput::error(&call.id, &call.name, "Missing field: trigger"),
        };

        let Some(registrar) = &self.registrar else {
            return ToolOutput::error(&call.id, &call.name, "Registrar not available");
        };

        let mut folder = folder_name_from_display_name(&name);
        if self.groups.get_by_folder(&folder).is_some() {
            folder = format!("{folder}_{}", &Uuid::new_v4().simple().to_string()[..6]);
        }

        if let Err(e) = registrar.register(&chat_id, &name, &folder, &trigger).await {
            tracing::error!(error = %e, "register_group: registrar failed");
            return ToolOutput::error(&call.id, &call.name, "Function execution failed");
        }

        let record = GroupRecord {
            chat_id: chat_id.clone(),
            folder: folder.clone(),
            name,
            trigger,
            persona_key: None,
            system_prompt: None,
            model_override: None,
            enable_web_search: true,
            enable_fast_path: true,
            enable_follow_up: true,
            require_trigger: false,
            extra_mounts: vec![],
        };
        match self.groups.register(record) {
            Ok(()) => ToolOutput::ok(&call.id, &call.name, json!({"success": true, "folder": folder})),
            Err(e) => {
                tracing::error!(error = %e, "register_group: group registration failed");
                ToolOutput::error(&call.id, &call.name, "Function execution failed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StubRegistrar {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl GroupRegistrar for StubRegistrar {
        async fn register(&self, jid: &str, _name: &str, _folder: &str, _trigger: &str) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("backend unreachable");
            }
            self.calls.lock().unwrap().push(jid.to_string());
            Ok(())
        }
    }

    fn call(args: Value, is_main: bool) -> ToolCall {
        ToolCall {
            id: "1".into(),
            name: "register_group".into(),
            args,
            group_folder: "main".into(),
            chat_id: "c1".into(),
            is_main,
        }
    }

    fn groups() -> Arc<GroupStore> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(GroupStore::load(dir.path().join("registered_groups.json"), "main").unwrap())
    }

    #[tokio::test]
    async fn registers_new_group_and_derives_folder() {
        let registrar = Arc::new(StubRegistrar { calls: Mutex::new(vec![]), fail: false });
        let tool = RegisterGroupTool::new(groups(), Some(registrar.clone()));
        let out = tool
            .execute(&call(json!({"chat_id": "jid1", "name": "Team Alpha", "trigger": "@Andy"}), true))
            .await;
        assert!(!out.is_error(), "{:?}", out.response);
        assert_eq!(out.response["folder"], "team_alpha");
        assert_eq!(registrar.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn non_main_caller_is_denied() {
        let registrar = Arc::new(StubRegistrar { calls: Mutex::new(vec![]), fail: false });
        let tool = RegisterGroupTool::new(groups(), Some(registrar));
        let out = tool
            .execute(&call(json!({"chat_id": "jid1", "name": "Team Alpha", "trigger": "@Andy"}), false))
            .await;
        assert!(out.is_error());
        assert_eq!(out.response["error"], "Permission denied");
    }

    #[tokio::test]
    async fn missing_registrar_is_reported() {
        let tool = RegisterGroupTool::new(groups(), None);
        let out = tool
            .execute(&call(json!({"chat_id": "jid1", "name": "Team Alpha", "trigger": "@Andy"}), true))
            .await;
        assert!(out.is_error());
        assert_eq!(out.response["error"], "Registrar not available");
    }

    #[tokio::test]
    async fn colliding_folder_names_are_disambiguated() {
        let registrar = Arc::new(StubRegistrar { calls: Mutex::new(vec![]), fail: false });
        let store = groups();
        let tool = RegisterGroupTool::new(store.clone(), Some(registrar.clone()));
        tool.execute(&call(json!({"chat_id": "jid1", "name": "Team Alpha", "trigger": "@Andy"}), true))
            .await;
        let out = tool
            .execute(&call(json!({"chat_id": "jid2", "name": "Team Alpha", "trigger": "@Andy"}), true))
            .await;
        assert!(!out.is_error());
        assert_ne!(out.response["folder"], "team_alpha");
        assert!(out.response["folder"].as_str().unwrap().starts_with("team_alpha_"));
    }
}
