// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Router watermark state: `router_state.json` (§3, §6.3).
//!
//! `last_timestamp` is the newest message timestamp the poller has observed
//! from the chat transport; `last_agent_timestamp` is, per chat, the newest
//! message timestamp already handed to the executor. The gap between the two
//! is exactly the set of messages still awaiting dispatch.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct RouterStateFile {
    #[serde(default)]
    last_timestamp: i64,
    #[serde(default)]
    last_agent_timestamp: HashMap<String, i64>,
}

pub struct RouterState {
    path: PathBuf,
    inner: RwLock<RouterStateFile>,
}

impl RouterState {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let inner = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?
        } else {
            RouterStateFile::default()
        };
        Ok(Self {
            path,
            inner: RwLock::new(inner),
        })
    }

    fn persist(&self) -> Result<()> {
        let snapshot = self.inner.read().unwrap().clone();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&snapshot)?;
        fs::write(&self.path, content).with_context(|| format!("writing {}", self.path.display()))
    }

    pub fn last_timestamp(&self) -> i64 {
        self.inner.read().unwrap().last_timestamp
    }

    /// Monotonic: refuses to move the watermark backwards.
    pub fn advance_last_timestamp(&self, ts: i64) -> Result<()> {
        {
            let mut inner = self.inner.write().unwrap();
            if ts <= inner.last_timestamp {
                return Ok(());
            }
            inner.last_timestamp = ts;
        }
        self.persist()
    }

    pub fn last_agent_timestamp(&self, chat_id: &str) -> i64 {
        self.inner
            .read()
            .unwrap()
            .last_agent_timestamp
            .get(chat_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn set_last_agent_timestamp(&self, chat_id: &str, ts: i64) -> Result<()> {
        {
            let mut inner = self.inner.write().unwrap();
            let entry = inner
                .last_agent_timestamp
                .entry(chat_id.to_string())
                .or_insert(0);
            if ts <= *entry {
                return Ok(());
            }
            *entry = ts;
        }
        self.persist()
    }
}
