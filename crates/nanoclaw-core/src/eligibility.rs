// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Execution eligibility (§4.4): decides fast-path vs. sandbox per incoming
//! message. Scheduled tasks always use the sandbox — they may reference
//! filesystem artefacts the sandbox mounts and the fast path cannot see.

/// Inputs to the fast-path/sandbox decision. Kept as plain booleans rather
/// than a reference to `GroupRecord`/`Config` so this module has no
/// dependency on their shapes — callers project the fields they need.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityInput {
    /// `FAST_PATH.ENABLED` (global).
    pub fast_path_globally_enabled: bool,
    /// The group's `enable_fast_path` flag (defaults to `true`).
    pub group_allows_fast_path: bool,
    /// The incoming message carries an attached media file.
    pub has_media: bool,
    /// A usable AI provider API key is configured.
    pub provider_available: bool,
    /// This execution originates from the scheduler, not a live message.
    pub is_scheduled_task: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    FastPath,
    Sandbox,
}

/// Decide which path handles one execution.
pub fn choose_path(input: EligibilityInput) -> ExecutionPath {
    if input.is_scheduled_task {
        return ExecutionPath::Sandbox;
    }
    let fast_path_eligible = input.fast_path_globally_enabled
        && input.group_allows_fast_path
        && !input.has_media
        && input.provider_available;
    if fast_path_eligible {
        ExecutionPath::FastPath
    } else {
        ExecutionPath::Sandbox
    }
}
