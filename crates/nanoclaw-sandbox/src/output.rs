// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Parses the sentinel-framed result a sandboxed agent writes to stdout
//! (§4.6 step 5, §6.1).

use serde::{Deserialize, Serialize};

const SENTINEL_START: &str = "---NANOCLAW_OUTPUT_START---";
const SENTINEL_END: &str = "---NANOCLAW_OUTPUT_END---";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxOutput {
    pub status: SandboxStatus,
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SandboxOutput {
    fn parse_failure(message: impl Into<String>) -> Self {
        Self {
            status: SandboxStatus::Error,
            result: None,
            new_session_id: None,
            error: Some(format!("Failed to parse container output: {}", message.into())),
        }
    }
}

/// Recovers the authoritative result from a sandboxed agent's combined
/// stdout buffer. Prefers the sentinel window; falls back to the last
/// non-empty line if the sentinels are absent (§4.6 step 5).
pub fn parse_sandbox_output(stdout: &str) -> SandboxOutput {
    if let Some(start) = stdout.find(SENTINEL_START) {
        let after_start = &stdout[start + SENTINEL_START.len()..];
        if let Some(end) = after_start.find(SENTINEL_END) {
            let json_slice = after_start[..end].trim();
            return parse_json(json_slice);
        }
    }

    let last_line = stdout.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
    parse_json(last_line)
}

fn parse_json(raw: &str) -> SandboxOutput {
    if raw.trim().is_empty() {
        return SandboxOutput::parse_failure("empty output");
    }
    match serde_json::from_str::<SandboxOutput>(raw) {
        Ok(out) => out,
        Err(e) => SandboxOutput::parse_failure(e.to_string()),
    }
}
