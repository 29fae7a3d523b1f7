// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The hot dispatch path's mutable state: the per-group serial lock (§4.3),
//! the message consolidator (§4.2), the sliding-window rate limiter (§4.13),
//! the consecutive-failure error tracker (§4.14), the mount allowlist
//! validator (§4.7), and the provider-side context cache (§4.11).
//!
//! None of these depend on the chat transport or the AI provider concretely
//! — they take trait objects for the one or two external effects they
//! produce (emitting a consolidated batch, notifying on repeated failure),
//! matching how [`nanoclaw_core`] keeps the dispatcher's dependencies behind
//! interfaces rather than concrete types.

mod consolidator;
mod context_cache;
mod error_tracker;
mod lock;
mod memory_summarizer;
mod mount_allowlist;
mod rate_limit;

pub use consolidator::{BufferedMessage, ConsolidatedEvent, Consolidator, ConsolidationSink};
pub use context_cache::ContextCache;
pub use error_tracker::{ErrorNotifier, ErrorTracker};
pub use lock::LockManager;
pub use memory_summarizer::{MemorySummarizer, SummarizeOutcome};
pub use mount_allowlist::{validate_mount, AllowedRoot, MountAllowlist, ResolvedMount};
pub use rate_limit::{RateLimitResult, RateLimiter};
