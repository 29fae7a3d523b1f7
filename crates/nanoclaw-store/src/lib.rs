// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Persistent message/task/memory store for the nanoclaw orchestrator.
//!
//! A single embedded SQLite database behind a connection pool (§4.1). All
//! I/O goes through [`StorePool`]; the submodules attach their operations to
//! it as inherent `impl` blocks.

mod chat;
mod error;
mod knowledge;
mod memory;
mod messages;
mod pool;
mod preferences;
mod schema;
mod tasks;
mod usage;

pub use chat::Chat;
pub use error::StoreError;
pub use knowledge::KnowledgeDoc;
pub use memory::MemorySummary;
pub use messages::Message;
pub use pool::StorePool;
pub use preferences::{is_allowed_preference_key, ALLOWED_PREFERENCE_KEYS};
pub use tasks::{ContextMode, ScheduledTask, TaskStatus};
pub use usage::UsageRecord;
