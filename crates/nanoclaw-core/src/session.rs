// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-group sandbox session tokens: `sessions.json` (§3, §6.3).
//!
//! The sandbox runner returns an opaque `new_session_id` on success; the next
//! run against the same group (context-mode "group") resumes it. Lost on
//! restart is not acceptable here — unlike the rate-limit windows or lock
//! registry, this map is durable.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionsFile {
    #[serde(flatten)]
    sessions: HashMap<String, String>,
}

pub struct SessionStore {
    path: PathBuf,
    sessions: RwLock<HashMap<String, String>>,
}

impl SessionStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let sessions = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let file: SessionsFile = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            file.sessions
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            sessions: RwLock::new(sessions),
        })
    }

    fn persist(&self) -> Result<()> {
        let file = SessionsFile {
            sessions: self.sessions.read().unwrap().clone(),
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&file)?;
        fs::write(&self.path, content).with_context(|| format!("writing {}", self.path.display()))
    }

    pub fn get(&self, folder: &str) -> Option<String> {
        self.sessions.read().unwrap().get(folder).cloned()
    }

    pub fn set(&self, folder: &str, session_id: impl Into<String>) -> Result<()> {
        self.sessions
            .write()
            .unwrap()
            .insert(folder.to_string(), session_id.into());
        self.persist()
    }

    pub fn clear(&self, folder: &str) -> Result<()> {
        self.sessions.write().unwrap().remove(folder);
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::load(dir.path().join("sessions.json")).unwrap();
        store.set("main", "sess-123").unwrap();
        assert_eq!(store.get("main").as_deref(), Some("sess-123"));
    }

    #[test]
    fn persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        {
            let store = SessionStore::load(&path).unwrap();
            store.set("main", "sess-123").unwrap();
        }
        let reloaded = SessionStore::load(&path).unwrap();
        assert_eq!(reloaded.get("main").as_deref(), Some("sess-123"));
    }

    #[test]
    fn clear_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::load(dir.path().join("sessions.json")).unwrap();
        store.set("main", "sess-123").unwrap();
        store.clear("main").unwrap();
        assert!(store.get("main").is_none());
    }

    #[test]
    fn missing_folder_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::load(dir.path().join("sessions.json")).unwrap();
        assert!(store.get("nope").is_none());
    }
}
