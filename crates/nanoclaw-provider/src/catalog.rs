// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Model catalog: static metadata for the Gemini models this orchestrator drives.

use serde::{Deserialize, Serialize};

/// Input modalities supported by a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputModality {
    Text,
    Image,
}

fn default_input_modalities() -> Vec<InputModality> {
    vec![InputModality::Text]
}

/// Metadata for a single model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelCatalogEntry {
    /// Provider-scoped model identifier (e.g. "gemini-2.0-flash")
    pub id: String,
    /// Human-readable display name
    pub name: String,
    /// Provider identifier: "google" | "mock"
    pub provider: String,
    /// Total context window in tokens (input + output)
    pub context_window: u32,
    /// Maximum output tokens per completion
    pub max_output_tokens: u32,
    /// Short description
    #[serde(default)]
    pub description: String,
    /// Supported input modalities. Defaults to `[text]`.
    #[serde(default = "default_input_modalities")]
    pub input_modalities: Vec<InputModality>,
}

impl ModelCatalogEntry {
    /// Return `true` if the model can accept image input.
    pub fn supports_images(&self) -> bool {
        self.input_modalities.contains(&InputModality::Image)
    }
}

/// Return all entries from the bundled static catalog.
///
/// Small and fixed, so it is kept inline rather than loaded from a bundled
/// file — this orchestrator talks to exactly one model family.
pub fn static_catalog() -> Vec<ModelCatalogEntry> {
    vec![
        ModelCatalogEntry {
            id: "gemini-2.0-flash".into(),
            name: "Gemini 2.0 Flash".into(),
            provider: "google".into(),
            context_window: 1_048_576,
            max_output_tokens: 8_192,
            description: "Fast multimodal Gemini model, default fast-path model.".into(),
            input_modalities: vec![InputModality::Text, InputModality::Image],
        },
        ModelCatalogEntry {
            id: "gemini-2.0-flash-lite".into(),
            name: "Gemini 2.0 Flash Lite".into(),
            provider: "google".into(),
            context_window: 1_048_576,
            max_output_tokens: 8_192,
            description: "Lower-cost Gemini model for simple fast-path turns.".into(),
            input_modalities: vec![InputModality::Text, InputModality::Image],
        },
        ModelCatalogEntry {
            id: "gemini-1.5-pro".into(),
            name: "Gemini 1.5 Pro".into(),
            provider: "google".into(),
            context_window: 2_097_152,
            max_output_tokens: 8_192,
            description: "Large-context Gemini model, used for memory summarisation.".into(),
            input_modalities: vec![InputModality::Text, InputModality::Image],
        },
        ModelCatalogEntry {
            id: "mock-model".into(),
            name: "Mock".into(),
            provider: "mock".into(),
            context_window: 32_768,
            max_output_tokens: 4_096,
            description: "Deterministic provider used by tests; no network access.".into(),
            input_modalities: vec![InputModality::Text],
        },
    ]
}

/// Look up a single model by provider and id (or name).
pub fn lookup(provider: &str, model_id: &str) -> Option<ModelCatalogEntry> {
    static_catalog()
        .into_iter()
        .find(|e| e.provider == provider && (e.id == model_id || e.name == model_id))
}

/// Look up a model by bare model name (without provider prefix).
pub fn lookup_by_model_name(model_name: &str) -> Option<ModelCatalogEntry> {
    static_catalog()
        .into_iter()
        .find(|e| e.id == model_name || e.name == model_name)
}

/// Return `true` if the model supports image input, defaulting to `false` when
/// the model is not found in the catalog.
pub fn supports_images(provider: &str, model_id: &str) -> bool {
    lookup(provider, model_id)
        .map(|e| e.supports_images())
        .unwrap_or(false)
}

/// Look up the context window for a model. Falls back to `default` if not in catalog.
pub fn context_window(provider: &str, model_id: &str, default: u32) -> u32 {
    lookup(provider, model_id)
        .map(|e| e.context_window)
        .unwrap_or(default)
}

/// Look up the max output tokens for a model. Falls back to `default` if not in catalog.
pub fn max_output_tokens(provider: &str, model_id: &str, default: u32) -> u32 {
    lookup(provider, model_id)
        .map(|e| e.max_output_tokens)
        .unwrap_or(default)
}
