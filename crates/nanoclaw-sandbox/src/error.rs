// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

/// Typed sandbox errors (§7 taxonomy: Timeout / Integrity / Validation).
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox execution timed out")]
    Timeout,
    #[error("failed to spawn container process: {0}")]
    SpawnFailed(#[from] std::io::Error),
    #[error("invalid group folder name: {0:?}")]
    InvalidFolderName(String),
}
