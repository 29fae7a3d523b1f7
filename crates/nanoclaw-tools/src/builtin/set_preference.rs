// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `set_preference` (§4.8).

use std::sync::Arc;

use async_trait::async_trait;
use nanoclaw_store::{is_allowed_preference_key, StorePool, ALLOWED_PREFERENCE_KEYS};
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct SetPreferenceTool {
    store: Arc<StorePool>,
}

impl SetPreferenceTool {
    pub fn new(store: Arc<StorePool>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SetPreferenceTool {
    fn name(&self) -> &str {
        "set_preference"
    }

    fn description(&self) -> &str {
        "Remember a preference for this group, such as a nickname or preferred language."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": {"type": "string", "enum": ALLOWED_PREFERENCE_KEYS},
                "value": {"type": "string"},
            },
            "required": ["key", "value"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let key = call.args.get("key").and_then(Value::as_str).unwrap_or("");
        if !is_allowed_preference_key(key) {
            return ToolOutput::error(&call.id, &call.name, format!("Invalid key: {key}"));
        }
        let value = match call.args.get("value").and_then(Value::as_str) {
            Some(v) => v.to_string(),
            None => return ToolOutput::error(&call.id, &call.name, "Missing field: value"),
        };

        let now = chrono::Utc::now().timestamp_millis();
        match self
            .store
            .set_preference(call.group_folder.clone(), key.to_string(), value, now)
            .await
        {
            Ok(()) => ToolOutput::ok(&call.id, &call.name, json!({"success": true})),
            Err(e) => {
                tracing::error!(error = %e, "set_preference: store write failed");
                ToolOutput::error(&call.id, &call.name, "Function execution failed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(args: Value) -> ToolCall {
        ToolCall {
            id: "1".into(),
            name: "set_preference".into(),
            args,
            group_folder: "main".into(),
            chat_id: "c1".into(),
            is_main: true,
        }
    }

    #[tokio::test]
    async fn sets_allowed_key() {
        let store = Arc::new(StorePool::open_in_memory().await.unwrap());
        let tool = SetPreferenceTool::new(store.clone());
        let out = tool
            .execute(&call(json!({"key": "nickname", "value": "Andy"})))
            .await;
        assert!(!out.is_error(), "{:?}", out.response);
        let value = store.get_preference("main".into(), "nickname".into()).await.unwrap();
        assert_eq!(value.as_deref(), Some("Andy"));
    }

    #[tokio::test]
    async fn rejects_disallowed_key() {
        let store = Arc::new(StorePool::open_in_memory().await.unwrap());
        let tool = SetPreferenceTool::new(store);
        let out = tool
            .execute(&call(json!({"key": "favorite_color", "value": "blue"})))
            .await;
        assert!(out.is_error());
        assert_eq!(out.response["error"], "Invalid key: favorite_color");
    }

    #[tokio::test]
    async fn missing_value_is_rejected() {
        let store = Arc::new(StorePool::open_in_memory().await.unwrap());
        let tool = SetPreferenceTool::new(store);
        let out = tool.execute(&call(json!({"key": "nickname"}))).await;
        assert!(out.is_error());
    }
}
