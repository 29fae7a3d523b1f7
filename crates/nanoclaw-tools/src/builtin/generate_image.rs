// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `generate_image` (§4.8).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::ports::{ImageGenerator, PhotoSender};
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct GenerateImageTool {
    generator: Arc<dyn ImageGenerator>,
    sender: Option<Arc<dyn PhotoSender>>,
}

impl GenerateImageTool {
    pub fn new(generator: Arc<dyn ImageGenerator>, sender: Option<Arc<dyn PhotoSender>>) -> Self {
        Self { generator, sender }
    }
}

#[async_trait]
impl Tool for GenerateImageTool {
    fn name(&self) -> &str {
        "generate_image"
    }

    fn description(&self) -> &str {
        "Generate an image from a text prompt and send it to this chat."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {"type": "string"},
                "caption": {"type": "string"},
            },
            "required": ["prompt"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let prompt = match call.args.get("prompt").and_then(Value::as_str) {
            Some(p) => p,
            None => return ToolOutput::error(&call.id, &call.name, "Missing field: prompt"),
        };
        let caption = call.args.get("caption").and_then(Value::as_str);

        let Some(sender) = &self.sender else {
            return ToolOutput::error(&call.id, &call.name, "No bot instance available");
        };

        let image = match self.generator.generate(prompt).await {
            Ok(bytes) => bytes,
            Err(e) => return ToolOutput::error(&call.id, &call.name, format!("Image generation failed: {e}")),
        };

        match sender.send_photo(&call.chat_id, image, caption).await {
            Ok(()) => ToolOutput::ok(&call.id, &call.name, json!({"sent": true})),
            Err(e) => ToolOutput::error(&call.id, &call.name, format!("Failed to send photo: {e}")),
        }
    }
}
