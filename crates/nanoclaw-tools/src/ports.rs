// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;

/// Capability the `generate_image` tool needs from whatever image-generation
/// backend the deployment is wired to. Kept as a port here so this crate
/// never depends on a concrete provider (§3 REDESIGN: constructor-injected
/// interfaces instead of cyclic module references).
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> anyhow::Result<Vec<u8>>;
}

/// Capability the `generate_image` tool needs to deliver its result back to
/// the chat. `send_photo` returns `Ok(())` on successful delivery.
#[async_trait]
pub trait PhotoSender: Send + Sync {
    async fn send_photo(&self, chat_id: &str, image: Vec<u8>, caption: Option<&str>) -> anyhow::Result<()>;
}

/// Capability the main-only `register_group` tool needs to create a new
/// group registration.
#[async_trait]
pub trait GroupRegistrar: Send + Sync {
    async fn register(&self, jid: &str, name: &str, folder: &str, trigger: &str) -> anyhow::Result<()>;
}
