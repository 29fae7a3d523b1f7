// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Folds a chat's oldest messages into a running narrative summary once a
//! group's message history crosses a size threshold (§4.12), keeping the
//! `messages` table bounded without losing long-range context entirely.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, warn};

use nanoclaw_provider::{CompletionRequest, Message, ModelProvider, ResponseEvent};
use nanoclaw_store::StorePool;

const SUMMARIZE_TIMEOUT: Duration = Duration::from_secs(60);
const SENDER_NAME_MAX_CHARS: usize = 50;

/// Outcome of a single summarization pass over one chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummarizeOutcome {
    /// The chat was below threshold; nothing was done.
    BelowThreshold,
    /// Messages were folded into the running summary.
    Summarized { messages_archived: i64, chars_archived: i64 },
    /// The provider call failed or timed out; the chat's messages are left
    /// untouched so they can be retried on the next pass.
    Failed(String),
}

/// Drives memory consolidation for one group's chat against its configured
/// thresholds, one AI-provider call at a time.
pub struct MemorySummarizer {
    store: Arc<StorePool>,
    provider: Arc<dyn ModelProvider>,
    summarize_threshold_chars: usize,
    max_context_messages: usize,
    max_prompt_length: usize,
    summary_prompt: String,
}

impl MemorySummarizer {
    pub fn new(
        store: Arc<StorePool>,
        provider: Arc<dyn ModelProvider>,
        summarize_threshold_chars: usize,
        max_context_messages: usize,
        max_prompt_length: usize,
        summary_prompt: String,
    ) -> Self {
        Self {
            store,
            provider,
            summarize_threshold_chars,
            max_context_messages,
            max_prompt_length,
            summary_prompt,
        }
    }

    /// Checks `chat_id`'s accumulated size against both thresholds and, if
    /// either is crossed, summarizes the oldest batch and deletes it from
    /// `messages`. Returns `BelowThreshold` without calling the provider if
    /// neither threshold is crossed.
    pub async fn maybe_summarize(&self, group_folder: &str, chat_id: &str) -> SummarizeOutcome {
        let (chars, count) = match self.store.chat_message_stats(chat_id.to_string()).await {
            Ok(stats) => stats,
            Err(e) => return SummarizeOutcome::Failed(format!("failed to read message stats: {e}")),
        };

        if (chars as usize) < self.summarize_threshold_chars && (count as usize) < self.max_context_messages {
            return SummarizeOutcome::BelowThreshold;
        }

        self.summarize_batch(group_folder, chat_id).await
    }

    async fn summarize_batch(&self, group_folder: &str, chat_id: &str) -> SummarizeOutcome {
        let batch = match self
            .store
            .oldest_messages(chat_id.to_string(), self.max_context_messages)
            .await
        {
            Ok(b) => b,
            Err(e) => return SummarizeOutcome::Failed(format!("failed to fetch oldest messages: {e}")),
        };

        let Some(newest) = batch.last() else {
            return SummarizeOutcome::BelowThreshold;
        };
        let newest_processed_timestamp = newest.timestamp;
        let chars_archived: i64 = batch.iter().map(|m| m.content.len() as i64).sum();
        let messages_archived = batch.len() as i64;

        let previous_summary = match self.store.get_memory_summary(group_folder.to_string()).await {
            Ok(s) => s.map(|s| s.summary),
            Err(e) => {
                warn!(group_folder, error = %e, "failed to load previous memory summary, proceeding without it");
                None
            }
        };

        let prompt = self.build_prompt(&batch, previous_summary.as_deref());

        let narrative = match self.generate_summary(&prompt).await {
            Ok(text) => text,
            Err(e) => return SummarizeOutcome::Failed(e),
        };

        let now_ms = current_unix_ms();
        if let Err(e) = self
            .store
            .upsert_memory_summary(
                group_folder.to_string(),
                narrative,
                messages_archived,
                chars_archived,
                now_ms,
            )
            .await
        {
            return SummarizeOutcome::Failed(format!("failed to persist summary: {e}"));
        }

        // delete_messages_older_than deletes strictly-less-than; +1 so the
        // newest message in the archived batch is deleted too.
        if let Err(e) = self
            .store
            .delete_messages_older_than(chat_id.to_string(), newest_processed_timestamp + 1)
            .await
        {
            warn!(group_folder, chat_id, error = %e, "summary persisted but archived messages were not deleted");
        }

        debug!(group_folder, chat_id, messages_archived, chars_archived, "memory summarized");
        SummarizeOutcome::Summarized { messages_archived, chars_archived }
    }

    fn build_prompt(&self, batch: &[nanoclaw_store::Message], previous_summary: Option<&str>) -> String {
        let body = batch
            .iter()
            .map(|m| {
                let name = sanitize_sender_name(&m.sender_name);
                let content = strip_control_chars(&m.content);
                format!("{name}: {content}")
            })
            .collect::<Vec<_>>()
            .join("\n");

        let body = match previous_summary {
            Some(prev) if !prev.is_empty() => format!("PREVIOUS_SUMMARY:\n{prev}\n\n{body}"),
            _ => body,
        };

        let truncated = truncate_preserving_header(&body, self.max_prompt_length);
        format!("{}\n\n{}", self.summary_prompt, truncated)
    }

    async fn generate_summary(&self, prompt: &str) -> Result<String, String> {
        let req = CompletionRequest {
            messages: vec![Message::user(prompt.to_string())],
            tools: Vec::new(),
            stream: true,
            system_dynamic_suffix: None,
        };

        let fut = async {
            let mut stream = self
                .provider
                .complete(req)
                .await
                .map_err(|e| format!("provider call failed: {e}"))?;

            let mut text = String::new();
            while let Some(event) = stream.next().await {
                match event {
                    Ok(ResponseEvent::TextDelta(delta)) => text.push_str(&delta),
                    Ok(ResponseEvent::Done) => break,
                    Ok(ResponseEvent::Error(msg)) => return Err(format!("provider stream error: {msg}")),
                    Ok(_) => {}
                    Err(e) => return Err(format!("provider stream error: {e}")),
                }
            }
            Ok(text)
        };

        // tokio::time::timeout drops the losing branch, so only one of
        // {timeout, stream completion} ever produces a result here — there
        // is no separate "already settled" flag to maintain.
        match tokio::time::timeout(SUMMARIZE_TIMEOUT, fut).await {
            Ok(result) => result,
            Err(_) => Err("summarization timed out after 60s".to_string()),
        }
    }
}

fn sanitize_sender_name(name: &str) -> String {
    name.chars().take(SENDER_NAME_MAX_CHARS).collect()
}

fn strip_control_chars(content: &str) -> String {
    content.chars().filter(|c| !c.is_control() || *c == '\n').collect()
}

fn truncate_preserving_header(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    body.chars().take(max_chars).collect()
}

fn current_unix_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
