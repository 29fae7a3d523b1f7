// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Builds the mount set for one sandbox invocation (§4.6 step 1).

use std::path::{Path, PathBuf};

use nanoclaw_dispatch::ResolvedMount;

/// One bind mount into the container, already resolved to an absolute host
/// path and a container-side target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host_path: PathBuf,
    pub container_path: String,
    pub read_only: bool,
}

impl From<ResolvedMount> for Mount {
    fn from(m: ResolvedMount) -> Self {
        Self {
            host_path: m.host_path,
            container_path: m.container_path,
            read_only: m.read_only,
        }
    }
}

/// Everything needed to assemble the base mount set for one group (§4.6
/// step 1) — additional mounts declared on the group go through the
/// mount-allowlist validator separately and are appended by the caller.
pub struct MountContext<'a> {
    pub is_main: bool,
    /// Project directory, mounted read-only for the main group only.
    pub project_dir: &'a Path,
    /// `<groups_dir>/<folder>`, mounted read-write for every group.
    pub group_dir: &'a Path,
    /// Shared global directory, mounted read-only for non-main groups when present.
    pub global_shared_dir: Option<&'a Path>,
    /// Shared provider-credentials directory, read-write (the container is ephemeral).
    pub credentials_dir: &'a Path,
    /// Per-group sessions directory.
    pub sessions_dir: &'a Path,
    /// Per-group IPC namespace root; `messages/` and `tasks/` are mounted individually.
    pub ipc_dir: &'a Path,
    /// Directory holding the env-file with only the allowed environment variable names.
    pub env_file_dir: &'a Path,
}

/// Container-side mount targets, fixed regardless of group.
pub const PROJECT_TARGET: &str = "/workspace/project";
pub const GROUP_TARGET: &str = "/workspace/group";
pub const SHARED_TARGET: &str = "/workspace/shared";
pub const CREDENTIALS_TARGET: &str = "/workspace/credentials";
pub const SESSIONS_TARGET: &str = "/workspace/sessions";
pub const IPC_MESSAGES_TARGET: &str = "/workspace/ipc/messages";
pub const IPC_TASKS_TARGET: &str = "/workspace/ipc/tasks";
pub const ENV_FILE_TARGET: &str = "/workspace/env";

pub fn build_base_mounts(ctx: &MountContext) -> Vec<Mount> {
    let mut mounts = Vec::new();

    if ctx.is_main {
        mounts.push(Mount {
            host_path: ctx.project_dir.to_path_buf(),
            container_path: PROJECT_TARGET.to_string(),
            read_only: true,
        });
    }

    mounts.push(Mount {
        host_path: ctx.group_dir.to_path_buf(),
        container_path: GROUP_TARGET.to_string(),
        read_only: false,
    });

    if !ctx.is_main {
        if let Some(shared) = ctx.global_shared_dir {
            mounts.push(Mount {
                host_path: shared.to_path_buf(),
                container_path: SHARED_TARGET.to_string(),
                read_only: true,
            });
        }
    }

    mounts.push(Mount {
        host_path: ctx.credentials_dir.to_path_buf(),
        container_path: CREDENTIALS_TARGET.to_string(),
        read_only: false,
    });
    mounts.push(Mount {
        host_path: ctx.sessions_dir.to_path_buf(),
        container_path: SESSIONS_TARGET.to_string(),
        read_only: false,
    });
    mounts.push(Mount {
        host_path: ctx.ipc_dir.join("messages"),
        container_path: IPC_MESSAGES_TARGET.to_string(),
        read_only: false,
    });
    mounts.push(Mount {
        host_path: ctx.ipc_dir.join("tasks"),
        container_path: IPC_TASKS_TARGET.to_string(),
        read_only: false,
    });
    mounts.push(Mount {
        host_path: ctx.env_file_dir.to_path_buf(),
        container_path: ENV_FILE_TARGET.to_string(),
        read_only: true,
    });

    mounts
}
