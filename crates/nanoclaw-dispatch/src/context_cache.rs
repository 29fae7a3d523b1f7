// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Provider-side context cache (§4.11), keyed by group folder.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use nanoclaw_provider::ModelProvider;

struct CacheEntry {
    handle: String,
    model: String,
    content_hash: String,
}

pub struct ContextCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl_seconds: u64,
    min_cache_chars: usize,
}

impl ContextCache {
    pub fn new(ttl_seconds: u64, min_cache_chars: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl_seconds,
            min_cache_chars,
        }
    }

    /// Returns a cache handle for `content`, reusing the group's existing
    /// handle when the model and content hash both still match, otherwise
    /// creating a fresh one and best-effort deleting the stale handle.
    /// Returns `None` when `content` is below the configured minimum, or
    /// when cache creation fails for any reason (the fast path proceeds
    /// uncached either way).
    pub async fn obtain(
        &self,
        provider: &dyn ModelProvider,
        group_folder: &str,
        model: &str,
        content: &str,
    ) -> Option<String> {
        if content.len() < self.min_cache_chars {
            return None;
        }

        let hash = content_hash(content);
        {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(group_folder) {
                if entry.model == model && entry.content_hash == hash {
                    return Some(entry.handle.clone());
                }
            }
        }

        match provider.create_cache(content, self.ttl_seconds).await {
            Ok(handle) => {
                let stale = {
                    let mut entries = self.entries.lock().await;
                    entries.insert(
                        group_folder.to_string(),
                        CacheEntry {
                            handle: handle.clone(),
                            model: model.to_string(),
                            content_hash: hash,
                        },
                    )
                };
                if let Some(stale) = stale {
                    let _ = provider.delete_cache(&stale.handle).await;
                }
                Some(handle)
            }
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("not supported") || msg.contains("too few tokens") {
                    debug!(error = %msg, group = group_folder, "context cache unavailable");
                } else {
                    warn!(error = %msg, group = group_folder, "context cache creation failed");
                }
                None
            }
        }
    }
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
