// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Sandboxed agent process runner (§4.6-4.7): assembles the mount set and
//! CLI arguments for an OS-level container runtime, supervises the child
//! process under a timeout, and recovers the structured result it wrote to
//! stdout. Nothing here links a container-engine API client — the runtime
//! is invoked purely as an external CLI, matching how [`nanoclaw_dispatch`]
//! keeps every external effect behind a narrow seam.

mod args;
mod error;
mod input;
mod mounts;
mod output;
mod process;
mod runlog;

pub use error::SandboxError;
pub use input::SandboxInput;
pub use mounts::{Mount, MountContext};
pub use output::{parse_sandbox_output, SandboxOutput, SandboxStatus};

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use nanoclaw_core::is_valid_folder_name;
use tracing::{error, info};

/// Everything one sandbox invocation needs: the stdin payload plus enough
/// context to assemble mounts, arguments, and the run log.
pub struct SandboxRequest<'a> {
    pub group_folder: &'a str,
    pub chat_id: &'a str,
    pub is_main: bool,
    pub input: SandboxInput,
    pub mount_ctx: MountContext<'a>,
    pub extra_mounts: Vec<Mount>,
    pub env: Vec<(String, String)>,
    pub logs_dir: &'a Path,
}

/// Outcome of one sandbox invocation, ready for the surrounding dispatch
/// code to attach timing and token metadata (§4.6 step 7).
pub struct SandboxOutcome {
    pub status: SandboxStatus,
    pub result: Option<String>,
    pub new_session_id: Option<String>,
    pub error: Option<String>,
    pub duration_ms: i64,
    pub output_truncated: bool,
    pub log_path: Option<PathBuf>,
}

impl SandboxOutcome {
    fn failure(error: impl Into<String>, duration_ms: i64) -> Self {
        Self {
            status: SandboxStatus::Error,
            result: None,
            new_session_id: None,
            error: Some(error.into()),
            duration_ms,
            output_truncated: false,
            log_path: None,
        }
    }
}

/// Fixed configuration for the sandbox runner, sourced from `ContainerConfig`.
pub struct SandboxRunner {
    pub runtime_bin: String,
    pub image: String,
    pub timeout: Duration,
    pub graceful_shutdown_delay: Duration,
    pub max_output_size: usize,
    pub debug_mode: bool,
}

impl SandboxRunner {
    pub fn new(
        runtime_bin: impl Into<String>,
        image: impl Into<String>,
        timeout: Duration,
        graceful_shutdown_delay: Duration,
        max_output_size: usize,
        debug_mode: bool,
    ) -> Self {
        Self {
            runtime_bin: runtime_bin.into(),
            image: image.into(),
            timeout,
            graceful_shutdown_delay,
            max_output_size,
            debug_mode,
        }
    }

    /// Runs one sandboxed agent invocation end to end (§4.6 steps 1-7).
    pub async fn run(&self, req: SandboxRequest<'_>) -> SandboxOutcome {
        let started_at = Utc::now();

        if !is_valid_folder_name(req.group_folder) {
            let err = SandboxError::InvalidFolderName(req.group_folder.to_string());
            error!(folder = req.group_folder, "rejecting sandbox run for invalid folder name");
            return SandboxOutcome::failure(err.to_string(), 0);
        }

        let mut all_mounts = mounts::build_base_mounts(&req.mount_ctx);
        all_mounts.extend(req.extra_mounts);

        let args = args::build_args(&self.image, &all_mounts, &req.env);

        let stdin_payload = match serde_json::to_vec(&req.input) {
            Ok(bytes) => bytes,
            Err(e) => return SandboxOutcome::failure(format!("failed to serialize sandbox input: {e}"), 0),
        };

        info!(group = req.group_folder, chat = req.chat_id, "starting sandbox run");

        let outcome = process::run_container(
            &self.runtime_bin,
            &args,
            &stdin_payload,
            self.timeout,
            self.graceful_shutdown_delay,
            self.max_output_size,
        )
        .await;

        let duration_ms = (Utc::now() - started_at).num_milliseconds();

        let process_outcome = match outcome {
            Ok(o) => o,
            Err(SandboxError::Timeout) => {
                return SandboxOutcome::failure("sandbox execution timed out", duration_ms);
            }
            Err(e) => {
                error!(group = req.group_folder, error = %e, "sandbox process failed");
                return SandboxOutcome::failure(e.to_string(), duration_ms);
            }
        };

        let parsed = output::parse_sandbox_output(&process_outcome.stdout);

        let log_path = match runlog::write_run_log(
            req.logs_dir,
            req.group_folder,
            req.chat_id,
            process_outcome.exit_code,
            self.debug_mode,
            &process_outcome.stdout,
            &process_outcome.stderr,
            &parsed,
            started_at,
            duration_ms,
        )
        .await
        {
            Ok(path) => Some(path),
            Err(e) => {
                error!(group = req.group_folder, error = %e, "failed to write sandbox run log");
                None
            }
        };

        SandboxOutcome {
            status: parsed.status,
            result: parsed.result,
            new_session_id: parsed.new_session_id,
            error: parsed.error,
            duration_ms,
            output_truncated: process_outcome.stdout_truncated || process_outcome.stderr_truncated,
            log_path,
        }
    }
}
