// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

/// A single function-call invocation requested by the model (§4.8).
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier returned by the model, forwarded verbatim.
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments.
    pub args: Value,
    /// Folder of the group that issued this call.
    pub group_folder: String,
    /// Chat the call originated from.
    pub chat_id: String,
    /// True when `group_folder` is the configured main group.
    pub is_main: bool,
}

/// The result of executing a tool: always a `{name, response}` pair per §4.8,
/// where `response` is an arbitrary JSON object (usually containing either a
/// success payload or `{error: "..."}`).
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub name: String,
    pub response: Value,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, name: impl Into<String>, response: Value) -> Self {
        Self { call_id: call_id.into(), name: name.into(), response }
    }

    pub fn error(call_id: impl Into<String>, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            response: serde_json::json!({ "error": message.into() }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.response.get("error").is_some()
    }
}

/// Trait every built-in function-call handler implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the call's `args`.
    fn parameters_schema(&self) -> Value;
    /// Restricted to the main group (currently only `register_group`, §4.8).
    fn main_only(&self) -> bool {
        false
    }
    /// Execute the call. Validation/authorisation failures are returned as
    /// `{error: "..."}` responses, never as an `Err` — per §4.8 "any thrown
    /// error from a handler is converted to a generic failure response".
    async fn execute(&self, call: &ToolCall) -> ToolOutput;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
