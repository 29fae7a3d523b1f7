// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! In-process streaming fast path (§4.5).
//!
//! Runs entirely inside the orchestrator process — no container, no IPC
//! round-trip. Composes the system instruction, folds in a knowledge-base
//! lookup and the group's memory summary, streams the model's reply through
//! a caller-supplied progress callback, and — if the model asks for a tool —
//! executes it via the shared [`ToolRegistry`] and issues one follow-up
//! stream before returning.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, warn};

use nanoclaw_core::ProgressEvent;
use nanoclaw_dispatch::ContextCache;
use nanoclaw_provider::{
    CompletionRequest, FunctionCall, Message, MessageContent, ModelProvider, ResponseEvent, Role,
    Usage,
};
use nanoclaw_store::StorePool;
use nanoclaw_tools::{ToolCall, ToolRegistry};

/// Appended to the system instruction unless the group has explicitly turned
/// follow-up suggestions off (§4.5 step 1).
const FOLLOW_UP_SUFFIX: &str =
    "\n\nAfter answering, suggest one brief, relevant follow-up the user might want to ask next.";

/// Knowledge search uses only the first 200 HTML-stripped characters of the
/// prompt as its query (§4.5 step 2) — enough to capture intent without
/// dragging a long message through the search index.
const KNOWLEDGE_QUERY_MAX_CHARS: usize = 200;

/// A previously exchanged turn, replayed as conversation history (§4.5 step 4).
#[derive(Debug, Clone)]
pub enum HistoryTurn {
    User(String),
    Model(String),
}

/// Everything the fast path needs for one execution. Group/config
/// resolution (persona lookup, `enable_follow_up`, history loading) happens
/// upstream — this type carries only the already-resolved values.
#[derive(Debug, Clone)]
pub struct FastPathInput {
    pub group_folder: String,
    pub chat_id: String,
    pub is_main: bool,
    /// Persona or custom system prompt, already resolved for this group.
    pub system_prompt: String,
    pub enable_follow_up: bool,
    pub history: Vec<HistoryTurn>,
    pub prompt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastPathStatus {
    Ok,
    Timeout,
    Error,
}

#[derive(Debug, Clone)]
pub struct FastPathOutcome {
    pub status: FastPathStatus,
    pub result: Option<String>,
    pub prompt_tokens: Option<u32>,
    pub response_tokens: Option<u32>,
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Runs the fast path for one group at a time; holds no per-call state.
pub struct FastPathRunner {
    provider: Arc<dyn ModelProvider>,
    tools: Arc<ToolRegistry>,
    store: Arc<StorePool>,
    context_cache: Arc<ContextCache>,
    streaming_interval_ms: u64,
    timeout_ms: u64,
}

impl FastPathRunner {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        tools: Arc<ToolRegistry>,
        store: Arc<StorePool>,
        context_cache: Arc<ContextCache>,
        streaming_interval_ms: u64,
        timeout_ms: u64,
    ) -> Self {
        Self {
            provider,
            tools,
            store,
            context_cache,
            streaming_interval_ms,
            timeout_ms,
        }
    }

    /// Runs one execution end to end, wrapped in the overall timeout
    /// (§4.5 step 8). No partial result is returned on expiry.
    pub async fn run(&self, input: FastPathInput, on_progress: ProgressCallback) -> FastPathOutcome {
        match tokio::time::timeout(
            Duration::from_millis(self.timeout_ms),
            self.run_inner(input, on_progress),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => FastPathOutcome {
                status: FastPathStatus::Timeout,
                result: None,
                prompt_tokens: None,
                response_tokens: None,
            },
        }
    }

    async fn run_inner(&self, input: FastPathInput, on_progress: ProgressCallback) -> FastPathOutcome {
        // Step 1: system instruction.
        let mut system_instruction = input.system_prompt.clone();
        if input.enable_follow_up {
            system_instruction.push_str(FOLLOW_UP_SUFFIX);
        }

        // Step 2: knowledge search, failures swallowed.
        let query: String = strip_html_tags(&input.prompt)
            .chars()
            .take(KNOWLEDGE_QUERY_MAX_CHARS)
            .collect();
        let knowledge_prefix = match self.store.search_knowledge(input.group_folder.clone(), query).await {
            Ok(docs) if !docs.is_empty() => {
                let joined = docs
                    .iter()
                    .map(|d| format!("### {}\n{}", d.title, d.content))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                format!("Relevant knowledge:\n{joined}\n\n")
            }
            Ok(_) => String::new(),
            Err(e) => {
                debug!(error = %e, group = %input.group_folder, "knowledge search failed, continuing without it");
                String::new()
            }
        };

        // Step 3: cacheable static content — system instruction + memory summary.
        let memory_summary = self
            .store
            .get_memory_summary(input.group_folder.clone())
            .await
            .ok()
            .flatten()
            .map(|m| m.summary);

        let mut cacheable = system_instruction.clone();
        if let Some(summary) = &memory_summary {
            cacheable.push_str("\n\nPrior conversation memory:\n");
            cacheable.push_str(summary);
        }

        let model_name = self.provider.model_name().to_string();
        let cache_handle = self
            .context_cache
            .obtain(self.provider.as_ref(), &input.group_folder, &model_name, &cacheable)
            .await;

        // Step 4: build the content list. When the static content is cached
        // provider-side, the system message carries only the instruction —
        // the memory summary is already resident in the cache. Otherwise it
        // is folded into the system message on every call.
        let system_text = if cache_handle.is_some() {
            system_instruction.clone()
        } else {
            cacheable.clone()
        };

        let mut messages = vec![Message::system(system_text)];
        for turn in &input.history {
            match turn {
                HistoryTurn::User(text) => messages.push(Message::user(text.clone())),
                HistoryTurn::Model(text) => messages.push(Message::assistant(text.clone())),
            }
        }
        messages.push(Message::user(format!("{knowledge_prefix}{}", input.prompt)));

        let tool_schemas: Vec<nanoclaw_provider::ToolSchema> = self
            .tools
            .schemas_for(input.is_main)
            .into_iter()
            .map(|s| nanoclaw_provider::ToolSchema {
                name: s.name,
                description: s.description,
                parameters: s.parameters,
            })
            .collect();

        // Step 5: stream generate.
        let mut accumulated = String::new();
        let mut pending_calls: Vec<(String, String, String)> = Vec::new();
        let mut usage = Usage::default();
        let mut last_emit = Instant::now()
            .checked_sub(Duration::from_millis(self.streaming_interval_ms))
            .unwrap_or_else(Instant::now);

        let req = CompletionRequest {
            messages: messages.clone(),
            tools: tool_schemas.clone(),
            stream: true,
            system_dynamic_suffix: None,
        };
        let stream = match self.provider.complete(req).await {
            Ok(s) => s,
            Err(e) => {
                return FastPathOutcome {
                    status: FastPathStatus::Error,
                    result: Some(format!("model request failed: {e}")),
                    prompt_tokens: None,
                    response_tokens: None,
                };
            }
        };

        if let Some(outcome) = self
            .drain_stream(
                stream,
                &mut accumulated,
                &mut pending_calls,
                &mut usage,
                &mut last_emit,
                &on_progress,
            )
            .await
        {
            return outcome;
        }

        // Step 6: execute any requested tool calls, then one follow-up stream.
        if !pending_calls.is_empty() {
            for (_id, name, _arguments) in &pending_calls {
                on_progress(ProgressEvent::ToolUse { name: name.clone() });
            }

            let mut follow_up_messages = messages.clone();
            for (id, name, arguments) in &pending_calls {
                let args_value: Value = serde_json::from_str(arguments).unwrap_or_else(|_| json!({}));
                let call = ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    args: args_value,
                    group_folder: input.group_folder.clone(),
                    chat_id: input.chat_id.clone(),
                    is_main: input.is_main,
                };
                let output = self.tools.execute(&call).await;
                follow_up_messages.push(Message {
                    role: Role::Assistant,
                    content: MessageContent::ToolCall {
                        tool_call_id: id.clone(),
                        function: FunctionCall {
                            name: name.clone(),
                            arguments: arguments.clone(),
                        },
                    },
                });
                let response_text = serde_json::to_string(&output.response).unwrap_or_default();
                follow_up_messages.push(Message::tool_result(id.clone(), response_text));
            }

            let follow_up_req = CompletionRequest {
                messages: follow_up_messages,
                tools: tool_schemas,
                stream: true,
                system_dynamic_suffix: None,
            };
            match self.provider.complete(follow_up_req).await {
                Ok(stream) => {
                    let mut discard_calls = Vec::new();
                    if let Some(outcome) = self
                        .drain_stream(
                            stream,
                            &mut accumulated,
                            &mut discard_calls,
                            &mut usage,
                            &mut last_emit,
                            &on_progress,
                        )
                        .await
                    {
                        return outcome;
                    }
                }
                Err(e) => {
                    warn!(error = %e, group = %input.group_folder, "follow-up completion after tool call failed");
                }
            }
        }

        // Step 7: final progress callback.
        on_progress(ProgressEvent::Complete {
            result: Some(accumulated.clone()),
            prompt_tokens: Some(usage.input_tokens),
            response_tokens: Some(usage.output_tokens),
        });

        FastPathOutcome {
            status: FastPathStatus::Ok,
            result: Some(accumulated),
            prompt_tokens: Some(usage.input_tokens),
            response_tokens: Some(usage.output_tokens),
        }
    }

    /// Consumes one response stream into `accumulated`/`usage`, emitting a
    /// throttled `TextSnapshot` at most every `streaming_interval_ms`.
    /// Returns `Some(outcome)` if the stream ended in an error that should
    /// abort the whole execution; `None` on a clean `Done`.
    async fn drain_stream(
        &self,
        mut stream: nanoclaw_provider::ResponseStream,
        accumulated: &mut String,
        pending_calls: &mut Vec<(String, String, String)>,
        usage: &mut Usage,
        last_emit: &mut Instant,
        on_progress: &ProgressCallback,
    ) -> Option<FastPathOutcome> {
        while let Some(event) = stream.next().await {
            match event {
                Ok(ResponseEvent::TextDelta(text)) => {
                    accumulated.push_str(&text);
                    let now = Instant::now();
                    if now.duration_since(*last_emit) >= Duration::from_millis(self.streaming_interval_ms) {
                        *last_emit = now;
                        on_progress(ProgressEvent::TextSnapshot { text: accumulated.clone() });
                    }
                }
                Ok(ResponseEvent::ThinkingDelta(_)) => {}
                Ok(ResponseEvent::ToolCall { id, name, arguments }) => {
                    pending_calls.push((id, name, arguments));
                }
                Ok(ResponseEvent::Usage { input_tokens, output_tokens, cache_read_tokens, cache_write_tokens }) => {
                    usage.input_tokens += input_tokens;
                    usage.output_tokens += output_tokens;
                    usage.cache_read_tokens += cache_read_tokens;
                    usage.cache_write_tokens += cache_write_tokens;
                }
                Ok(ResponseEvent::Done) => return None,
                Ok(ResponseEvent::Error(message)) => {
                    return Some(FastPathOutcome {
                        status: FastPathStatus::Error,
                        result: Some(message),
                        prompt_tokens: Some(usage.input_tokens),
                        response_tokens: Some(usage.output_tokens),
                    });
                }
                Err(e) => {
                    return Some(FastPathOutcome {
                        status: FastPathStatus::Error,
                        result: Some(e.to_string()),
                        prompt_tokens: Some(usage.input_tokens),
                        response_tokens: Some(usage.output_tokens),
                    });
                }
            }
        }
        None
    }
}

/// Strips `<...>` tags for the knowledge-search query. Not a general HTML
/// sanitizer — just enough to keep markup out of the search index lookup.
fn strip_html_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
