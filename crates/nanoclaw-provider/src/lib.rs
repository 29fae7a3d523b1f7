// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Streaming model provider abstraction used by the fast path (§4.5).
//!
//! This crate carries exactly one concrete driver — Gemini, via
//! [`google::GoogleProvider`] — plus [`mock::MockProvider`] /
//! [`mock::ScriptedMockProvider`] for tests. The `ModelProvider` trait is the
//! seam the fast path dispatches through; a second real driver would slot in
//! here without touching callers.

pub mod catalog;
pub mod sanitize;
mod google;
mod mock;
mod provider;
mod types;

pub use catalog::{InputModality, ModelCatalogEntry};
pub use google::GoogleProvider;
pub use mock::{MockProvider, ScriptedMockProvider};
pub use provider::{ModelProvider, ResponseStream};
pub use types::*;

use std::sync::Arc;

/// Construct the [`ModelProvider`] used by the fast path.
///
/// Callers pass the configured model name (`config.gemini_model`) and an API
/// key resolved from the environment via [`resolve_gemini_api_key`] — secrets
/// never live in the YAML config tree.
pub fn google_provider(gemini_model: &str, api_key: Option<String>) -> Arc<dyn ModelProvider> {
    Arc::new(GoogleProvider::new(
        gemini_model.to_string(),
        api_key,
        None,
        None,
        None,
    ))
}

/// Resolve the Gemini API key from the environment, preferring
/// `GEMINI_API_KEY` and falling back to `GOOGLE_API_KEY`.
pub fn resolve_gemini_api_key() -> Option<String> {
    std::env::var("GEMINI_API_KEY")
        .ok()
        .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
}
