// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Mount allowlist (§4.7) — validates additional sandbox mounts declared on
//! a group against a JSON-configured set of allowed host roots.

use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

/// Directory names that must never be exposed to a sandboxed agent,
/// regardless of what an allowed root permits. Merged with user-supplied
/// `blocked_patterns` rather than replaced by them.
const DEFAULT_BLOCKED_PATTERNS: &[&str] = &[
    ".ssh", ".aws", ".gnupg", ".docker", ".kube", "credentials", ".env", ".git",
];

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllowedRoot {
    pub path: String,
    #[serde(default = "default_true")]
    pub allow_read_write: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MountAllowlist {
    #[serde(default)]
    pub allowed_roots: Vec<AllowedRoot>,
    #[serde(default)]
    pub blocked_patterns: Vec<String>,
    #[serde(default)]
    pub non_main_read_only: bool,
}

impl MountAllowlist {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let list: MountAllowlist = serde_json::from_str(&raw)?;
        Ok(list)
    }

    fn merged_blocked_patterns(&self) -> Vec<String> {
        let mut merged: Vec<String> = DEFAULT_BLOCKED_PATTERNS.iter().map(|s| s.to_string()).collect();
        for p in &self.blocked_patterns {
            if !merged.contains(p) {
                merged.push(p.clone());
            }
        }
        merged
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMount {
    pub host_path: PathBuf,
    pub container_path: String,
    pub read_only: bool,
}

/// Validates and, on success, rewrites a single requested mount.
///
/// Returns `None` for any rejection: malformed `container_path`, a host
/// path that doesn't canonicalise, one that isn't a strict descendant of
/// any allowed root, or one containing a blocked path component.
pub fn validate_mount(
    list: &MountAllowlist,
    host_path: &Path,
    container_path: &str,
    requested_read_only: Option<bool>,
    group_folder: &str,
    main_group_folder: &str,
) -> Option<ResolvedMount> {
    if container_path.is_empty()
        || container_path.starts_with('/')
        || container_path.split('/').any(|seg| seg == "..")
    {
        return None;
    }

    let real_host = std::fs::canonicalize(host_path).ok()?;

    let blocked = list.merged_blocked_patterns();
    for component in real_host.components() {
        if let Component::Normal(c) = component {
            if let Some(name) = c.to_str() {
                if blocked.iter().any(|b| b == name) {
                    return None;
                }
            }
        }
    }

    let chosen_root = list.allowed_roots.iter().find(|root| {
        std::fs::canonicalize(&root.path)
            .map(|real_root| real_host.starts_with(&real_root) && real_host != real_root)
            .unwrap_or(false)
    })?;

    let read_only = if list.non_main_read_only && group_folder != main_group_folder {
        true
    } else if !chosen_root.allow_read_write {
        true
    } else {
        requested_read_only.unwrap_or(true)
    };

    Some(ResolvedMount {
        host_path: real_host,
        container_path: format!("/workspace/extra/{container_path}"),
        read_only,
    })
}
