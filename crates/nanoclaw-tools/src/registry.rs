// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use crate::{Tool, ToolCall, ToolOutput};

/// A tool schema handed to the model's function-calling API.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Central registry of the fixed tool catalogue (§4.8). Non-main groups see
/// six tools; the main group additionally sees `register_group`.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Schemas visible to a caller, filtered by `is_main`.
    pub fn schemas_for(&self, is_main: bool) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .filter(|t| is_main || !t.main_only())
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Execute a call. Unknown names and main-only violations both surface as
    /// `{error: "..."}` responses rather than an `Err`, per §4.8.
    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.tools.get(&call.name) {
            Some(tool) if tool.main_only() && !call.is_main => {
                ToolOutput::error(&call.id, &call.name, "Permission denied")
            }
            Some(tool) => tool.execute(call).await,
            None => ToolOutput::error(&call.id, &call.name, format!("Unknown function: {}", call.name)),
        }
    }

    pub fn names_for(&self, is_main: bool) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .values()
            .filter(|t| is_main || !t.main_only())
            .map(|t| t.name().to_string())
            .collect();
        names.sort();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::tool::{Tool, ToolCall, ToolOutput};

    struct EchoTool {
        name: &'static str,
        main_only: bool,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        fn main_only(&self) -> bool {
            self.main_only
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, &call.name, json!({"echo": call.args}))
        }
    }

    fn call(name: &str, is_main: bool) -> ToolCall {
        ToolCall {
            id: "1".into(),
            name: name.into(),
            args: json!({}),
            group_folder: "main".into(),
            chat_id: "c1".into(),
            is_main,
        }
    }

    #[test]
    fn register_and_get() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo", main_only: false });
        assert!(reg.get("echo").is_some());
    }

    #[test]
    fn schemas_for_non_main_excludes_main_only_tool() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "register_group", main_only: true });
        reg.register(EchoTool { name: "set_preference", main_only: false });
        let schemas = reg.schemas_for(false);
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "set_preference");
    }

    #[test]
    fn schemas_for_main_includes_main_only_tool() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "register_group", main_only: true });
        let schemas = reg.schemas_for(true);
        assert_eq!(schemas.len(), 1);
    }

    #[tokio::test]
    async fn execute_main_only_tool_from_non_main_is_denied() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "register_group", main_only: true });
        let out = reg.execute(&call("register_group", false)).await;
        assert_eq!(out.response["error"], "Permission denied");
    }

    #[tokio::test]
    async fn execute_main_only_tool_from_main_succeeds() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "register_group", main_only: true });
        let out = reg.execute(&call("register_group", true)).await;
        assert!(!out.is_error());
    }

    #[tokio::test]
    async fn execute_unknown_tool_returns_named_error() {
        let reg = ToolRegistry::new();
        let out = reg.execute(&call("missing", true)).await;
        assert_eq!(out.response["error"], "Unknown function: missing");
    }

    #[test]
    fn registering_same_name_twice_overwrites() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "t", main_only: false });
        reg.register(EchoTool { name: "t", main_only: false });
        assert_eq!(reg.names_for(true).len(), 1);
    }
}
