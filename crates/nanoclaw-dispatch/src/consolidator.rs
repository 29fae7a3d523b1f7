// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Message consolidator (§4.2) — buffers rapid consecutive text messages
//! from one chat so the AI sees one combined prompt.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const DEFAULT_DEBOUNCE_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct BufferedMessage {
    pub message_id: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ConsolidatedEvent {
    pub chat_id: String,
    pub messages: Vec<BufferedMessage>,
    pub combined_text: String,
}

/// Receives consolidated batches as they fire. A trait object so the
/// consolidator has no knowledge of the dispatcher that consumes its
/// output.
#[async_trait]
pub trait ConsolidationSink: Send + Sync {
    async fn on_consolidated(&self, event: ConsolidatedEvent);
}

struct Buffer {
    messages: Vec<BufferedMessage>,
    timer: JoinHandle<()>,
}

pub struct Consolidator {
    buffers: Mutex<HashMap<String, Buffer>>,
    streaming: Mutex<HashSet<String>>,
    default_debounce_ms: u64,
    sink: Arc<dyn ConsolidationSink>,
}

impl Consolidator {
    pub fn new(sink: Arc<dyn ConsolidationSink>) -> Arc<Self> {
        Self::with_default_debounce(sink, DEFAULT_DEBOUNCE_MS)
    }

    pub fn with_default_debounce(sink: Arc<dyn ConsolidationSink>, default_debounce_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            buffers: Mutex::new(HashMap::new()),
            streaming: Mutex::new(HashSet::new()),
            default_debounce_ms,
            sink,
        })
    }

    fn combine(messages: &[BufferedMessage]) -> String {
        messages
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Appends `text` to the chat's buffer and (re)starts its debounce timer.
    /// Returns `false` — bypassing the buffer entirely — for media messages
    /// or while the chat is marked streaming.
    pub async fn add(
        self: &Arc<Self>,
        chat_id: &str,
        text: &str,
        message_id: Option<String>,
        is_media: bool,
        debounce_ms: Option<u64>,
    ) -> bool {
        if is_media {
            return false;
        }
        if self.streaming.lock().await.contains(chat_id) {
            return false;
        }

        let mut buffers = self.buffers.lock().await;
        let debounce = debounce_ms.unwrap_or(self.default_debounce_ms);
        let this = self.clone();
        let chat = chat_id.to_string();
        let new_timer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(debounce)).await;
            this.fire(&chat).await;
        });

        match buffers.get_mut(chat_id) {
            Some(buf) => {
                buf.timer.abort();
                buf.timer = new_timer;
                buf.messages.push(BufferedMessage {
                    message_id,
                    text: text.to_string(),
                });
            }
            None => {
                buffers.insert(
                    chat_id.to_string(),
                    Buffer {
                        messages: vec![BufferedMessage {
                            message_id,
                            text: text.to_string(),
                        }],
                        timer: new_timer,
                    },
                );
            }
        }
        true
    }

    async fn fire(&self, chat_id: &str) {
        let fired = self.buffers.lock().await.remove(chat_id);
        if let Some(buf) = fired {
            if !buf.messages.is_empty() {
                let combined_text = Self::combine(&buf.messages);
                self.sink
                    .on_consolidated(ConsolidatedEvent {
                        chat_id: chat_id.to_string(),
                        messages: buf.messages,
                        combined_text,
                    })
                    .await;
            }
        }
    }

    /// Emits the chat's buffer immediately, cancelling its pending timer.
    /// Returns `None` if the buffer was empty or absent.
    pub async fn flush(&self, chat_id: &str) -> Option<ConsolidatedEvent> {
        let fired = self.buffers.lock().await.remove(chat_id);
        let buf = fired?;
        buf.timer.abort();
        if buf.messages.is_empty() {
            return None;
        }
        let combined_text = Self::combine(&buf.messages);
        Some(ConsolidatedEvent {
            chat_id: chat_id.to_string(),
            messages: buf.messages,
            combined_text,
        })
    }

    pub async fn set_streaming(&self, chat_id: &str, streaming: bool) {
        let mut set = self.streaming.lock().await;
        if streaming {
            set.insert(chat_id.to_string());
        } else {
            set.remove(chat_id);
        }
    }

    /// Cancels every pending timer and clears all buffered state.
    pub async fn destroy(&self) {
        let mut buffers = self.buffers.lock().await;
        for (_, buf) in buffers.drain() {
            buf.timer.abort();
        }
        self.streaming.lock().await.clear();
    }
}
