// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Spawns the container runtime, feeds it stdin, and enforces the
//! timeout/graceful-shutdown contract (§4.6 steps 3-4).

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::SandboxError;

/// Result of one completed (or forcibly terminated) container run.
pub struct ProcessOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
}

/// Runs `runtime_bin args...`, writes `stdin_payload`, then reads stdout and
/// stderr concurrently up to `max_output_size` bytes each.
///
/// If the process has not exited within `timeout_dur`, sends `SIGTERM`,
/// waits `graceful_shutdown_delay` for a clean exit, then `SIGKILL`s it.
/// Either way the caller gets [`SandboxError::Timeout`] back immediately;
/// reaping the now-detached child happens in the background so a stuck
/// container can never block the caller past the grace period.
pub async fn run_container(
    runtime_bin: &str,
    args: &[String],
    stdin_payload: &[u8],
    timeout_dur: Duration,
    graceful_shutdown_delay: Duration,
    max_output_size: usize,
) -> Result<ProcessOutcome, SandboxError> {
    let mut cmd = Command::new(runtime_bin);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        let payload = stdin_payload.to_vec();
        let _ = stdin.write_all(&payload).await;
        let _ = stdin.shutdown().await;
    }

    let mut stdout_pipe = child.stdout.take().expect("stdout piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr piped");

    let stdout_fut = read_bounded(&mut stdout_pipe, max_output_size);
    let stderr_fut = read_bounded(&mut stderr_pipe, max_output_size);
    let io_fut = futures::future::join(stdout_fut, stderr_fut);

    let run = async {
        let (stdout_res, stderr_res) = io_fut.await;
        let status = child.wait().await;
        (stdout_res, stderr_res, status)
    };

    match timeout(timeout_dur, run).await {
        Ok((stdout_res, stderr_res, status)) => {
            let status = status?;
            Ok(ProcessOutcome {
                stdout: stdout_res.0,
                stdout_truncated: stdout_res.1,
                stderr: stderr_res.0,
                stderr_truncated: stderr_res.1,
                exit_code: status.code(),
            })
        }
        Err(_) => {
            warn!("sandbox container exceeded timeout, sending SIGTERM");
            terminate_gracefully(&mut child, graceful_shutdown_delay).await;
            Err(SandboxError::Timeout)
        }
    }
}

/// Sends `SIGTERM`, waits up to `grace` for the child to exit on its own,
/// then force-kills it. Runs to completion even though the caller has
/// already returned a timeout error to its own caller.
async fn terminate_gracefully(child: &mut Child, grace: Duration) {
    if let Some(pid) = child.id() {
        // SAFETY: `pid` is the child's own pid, owned exclusively by this process.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }

    if timeout(grace, child.wait()).await.is_err() {
        debug!("sandbox container still alive after grace period, sending SIGKILL");
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

/// Reads from `pipe` until EOF or `limit` bytes have been collected,
/// whichever comes first, discarding anything past the limit.
async fn read_bounded<R: tokio::io::AsyncRead + Unpin>(pipe: &mut R, limit: usize) -> (String, bool) {
    let mut buf = Vec::with_capacity(limit.min(64 * 1024));
    let mut chunk = [0u8; 8192];
    let mut truncated = false;

    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if buf.len() + n > limit {
                    let remaining = limit.saturating_sub(buf.len());
                    buf.extend_from_slice(&chunk[..remaining]);
                    truncated = true;
                    // Keep draining the pipe so the child isn't blocked on a full buffer.
                    let mut sink = [0u8; 8192];
                    while pipe.read(&mut sink).await.unwrap_or(0) > 0 {}
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            Err(_) => break,
        }
    }

    (String::from_utf8_lossy(&buf).into_owned(), truncated)
}
