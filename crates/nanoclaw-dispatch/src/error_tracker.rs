// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Consecutive-failure tracker per group (§4.14).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Notified at failure counts 1 and every multiple of 3 thereafter — a
/// webhook-style alert in production, a no-op or test spy in tests.
#[async_trait]
pub trait ErrorNotifier: Send + Sync {
    async fn notify(&self, group_folder: &str, consecutive_failures: u32, last_error: &str);
}

#[derive(Default, Clone)]
struct ErrorState {
    consecutive_failures: u32,
    last_error: Option<String>,
}

pub struct ErrorTracker {
    state: Mutex<HashMap<String, ErrorState>>,
    notifier: Option<Arc<dyn ErrorNotifier>>,
}

impl ErrorTracker {
    pub fn new(notifier: Option<Arc<dyn ErrorNotifier>>) -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
            notifier,
        }
    }

    /// Increments the group's consecutive-failure counter and notifies at
    /// count 1 and every multiple of 3 (1, 3, 6, 9, ...).
    pub async fn record_error(&self, group_folder: &str, error: &str) {
        let count = {
            let mut state = self.state.lock().await;
            let entry = state.entry(group_folder.to_string()).or_default();
            entry.consecutive_failures += 1;
            entry.last_error = Some(error.to_string());
            entry.consecutive_failures
        };

        if count == 1 || count % 3 == 0 {
            if let Some(notifier) = &self.notifier {
                notifier.notify(group_folder, count, error).await;
            }
        }
    }

    pub async fn reset_errors(&self, group_folder: &str) {
        self.state.lock().await.remove(group_folder);
    }

    pub async fn consecutive_failures(&self, group_folder: &str) -> u32 {
        self.state
            .lock()
            .await
            .get(group_folder)
            .map(|e| e.consecutive_failures)
            .unwrap_or(0)
    }

    pub async fn last_error(&self, group_folder: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .get(group_folder)
            .and_then(|e| e.last_error.clone())
    }
}
