// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Writes one log file per container run (§4.6 step 6, §6.3).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::output::SandboxOutput;

/// Tail kept from stderr when the run failed and debug mode is off.
const STDERR_TAIL_BYTES: usize = 500;

#[allow(clippy::too_many_arguments)]
pub async fn write_run_log(
    logs_dir: &Path,
    group_folder: &str,
    chat_id: &str,
    exit_code: Option<i32>,
    debug_mode: bool,
    stdout: &str,
    stderr: &str,
    parsed: &SandboxOutput,
    started_at: DateTime<Utc>,
    duration_ms: i64,
) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(logs_dir).await?;

    let filename = format!(
        "container-{}.log",
        started_at.to_rfc3339().replace(':', "-")
    );
    let path = logs_dir.join(filename);

    let mut body = String::new();
    body.push_str(&format!("group: {group_folder}\n"));
    body.push_str(&format!("chat: {chat_id}\n"));
    body.push_str(&format!("started_at: {}\n", started_at.to_rfc3339()));
    body.push_str(&format!("duration_ms: {duration_ms}\n"));
    body.push_str(&format!("exit_code: {:?}\n", exit_code));
    body.push_str(&format!("status: {:?}\n", parsed.status));
    if let Some(err) = &parsed.error {
        body.push_str(&format!("error: {err}\n"));
    }
    body.push('\n');

    if debug_mode {
        body.push_str("--- stdout ---\n");
        body.push_str(stdout);
        body.push_str("\n--- stderr ---\n");
        body.push_str(stderr);
        body.push('\n');
    } else if exit_code != Some(0) {
        body.push_str("--- stderr (tail) ---\n");
        body.push_str(tail_bytes(stderr, STDERR_TAIL_BYTES));
        body.push('\n');
    }

    tokio::fs::write(&path, body).await?;
    Ok(path)
}

/// Returns the last `limit` bytes of `s`, cut on a UTF-8 boundary.
fn tail_bytes(s: &str, limit: usize) -> &str {
    if s.len() <= limit {
        return s;
    }
    let start = s.len() - limit;
    let mut boundary = start;
    while boundary < s.len() && !s.is_char_boundary(boundary) {
        boundary += 1;
    }
    &s[boundary..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SandboxStatus;

    fn sample_output(status: SandboxStatus, error: Option<&str>) -> SandboxOutput {
        SandboxOutput {
            status,
            result: Some("done".to_string()),
            new_session_id: None,
            error: error.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn writes_summary_without_full_output_when_successful() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_run_log(
            dir.path(),
            "main",
            "chat1",
            Some(0),
            false,
            "full stdout contents",
            "",
            &sample_output(SandboxStatus::Success, None),
            Utc::now(),
            1200,
        )
        .await
        .unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains("group: main"));
        assert!(!contents.contains("full stdout contents"));
    }

    #[tokio::test]
    async fn includes_stderr_tail_on_nonzero_exit_when_not_debugging() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_run_log(
            dir.path(),
            "main",
            "chat1",
            Some(1),
            false,
            "",
            "some failure detail",
            &sample_output(SandboxStatus::Error, Some("boom")),
            Utc::now(),
            500,
        )
        .await
        .unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains("some failure detail"));
        assert!(contents.contains("error: boom"));
    }

    #[tokio::test]
    async fn debug_mode_includes_full_stdout_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_run_log(
            dir.path(),
            "main",
            "chat1",
            Some(0),
            true,
            "full stdout here",
            "full stderr here",
            &sample_output(SandboxStatus::Success, None),
            Utc::now(),
            900,
        )
        .await
        .unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains("full stdout here"));
        assert!(contents.contains("full stderr here"));
    }

    #[tokio::test]
    async fn creates_logs_directory_if_missing() {
        let dir = tempfile::tempdir().unwrap();
        let logs_dir = dir.path().join("nested").join("logs");
        write_run_log(
            &logs_dir,
            "main",
            "chat1",
            Some(0),
            false,
            "",
            "",
            &sample_output(SandboxStatus::Success, None),
            Utc::now(),
            10,
        )
        .await
        .unwrap();
        assert!(logs_dir.is_dir());
    }

    #[test]
    fn tail_bytes_keeps_only_the_last_n_bytes() {
        let s = "0123456789";
        assert_eq!(tail_bytes(s, 4), "6789");
        assert_eq!(tail_bytes(s, 20), "0123456789");
    }
}
