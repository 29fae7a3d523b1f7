// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Registered groups: chats promoted to tenants (§3, §6.3).
//!
//! Stored outside the database as `registered_groups.json`, keyed by chat id.
//! Loaded once at start and rewritten in full on every change — the file is
//! small (one entry per tenant) so there is no need for incremental updates.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A chat promoted to a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupRecord {
    pub chat_id: String,
    /// Stable folder name, must match `^[A-Za-z0-9_-]+$` (§4.6 step 2).
    pub folder: String,
    pub name: String,
    pub trigger: String,
    #[serde(default)]
    pub persona_key: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub model_override: Option<String>,
    #[serde(default = "default_true")]
    pub enable_web_search: bool,
    #[serde(default = "default_true")]
    pub enable_fast_path: bool,
    #[serde(default = "default_true")]
    pub enable_follow_up: bool,
    #[serde(default)]
    pub require_trigger: bool,
    #[serde(default)]
    pub extra_mounts: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Folder names are restricted to this alphabet everywhere they are used to
/// build filesystem paths or container mounts (§4.6 step 2).
pub fn is_valid_folder_name(folder: &str) -> bool {
    !folder.is_empty()
        && folder
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Derive a safe folder name from a display name: lowercase, non-alphanumeric
/// runs collapsed to a single underscore (§4.8 `register_group`).
pub fn folder_name_from_display_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "group".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GroupsFile {
    #[serde(flatten)]
    groups: HashMap<String, GroupRecord>,
}

/// In-memory registered-groups cache, backed by `registered_groups.json`.
///
/// Reads never touch disk; every mutation rewrites the whole file (§9: global
/// mutable state becomes a process-wide singleton with a narrow write API).
pub struct GroupStore {
    path: PathBuf,
    main_folder: String,
    groups: RwLock<HashMap<String, GroupRecord>>,
}

impl GroupStore {
    /// Load from `path`, creating an empty store if the file does not exist.
    pub fn load(path: impl Into<PathBuf>, main_folder: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let groups = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let file: GroupsFile = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            file.groups
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            main_folder: main_folder.into(),
            groups: RwLock::new(groups),
        })
    }

    fn persist(&self) -> Result<()> {
        let groups = self.groups.read().unwrap();
        let file = GroupsFile {
            groups: groups.clone(),
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&file)?;
        fs::write(&self.path, content)
            .with_context(|| format!("writing {}", self.path.display()))
    }

    pub fn get(&self, chat_id: &str) -> Option<GroupRecord> {
        self.groups.read().unwrap().get(chat_id).cloned()
    }

    pub fn get_by_folder(&self, folder: &str) -> Option<GroupRecord> {
        self.groups
            .read()
            .unwrap()
            .values()
            .find(|g| g.folder == folder)
            .cloned()
    }

    pub fn all(&self) -> Vec<GroupRecord> {
        self.groups.read().unwrap().values().cloned().collect()
    }

    /// `true` iff `folder` is the distinguished main group.
    pub fn is_main(&self, folder: &str) -> bool {
        folder == self.main_folder
    }

    pub fn register(&self, record: GroupRecord) -> Result<()> {
        anyhow::ensure!(
            is_valid_folder_name(&record.folder),
            "folder name {:?} must match ^[A-Za-z0-9_-]+$",
            record.folder
        );
        self.groups
            .write()
            .unwrap()
            .insert(record.chat_id.clone(), record);
        self.persist()
    }

    pub fn unregister(&self, chat_id: &str) -> Result<bool> {
        let removed = self.groups.write().unwrap().remove(chat_id).is_some();
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }
}
