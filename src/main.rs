// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Entry point wiring the dispatch/execution core together (§1, §9).
//!
//! The chat-transport client and the sandboxed runtime's container engine are
//! out of scope (§1): this binary drives the scheduler and the sandbox-side
//! IPC bus, and logs where a chat reply would otherwise be sent, so the core
//! can run standalone against a real `config.yaml` and a real group tree.

mod cli;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use nanoclaw_config::Config;
use nanoclaw_core::{GroupStore, SessionStore};
use nanoclaw_dispatch::LockManager;
use nanoclaw_ipc::{IpcBus, IpcMessageSink};
use nanoclaw_sandbox::{Mount, MountContext, SandboxInput, SandboxOutput, SandboxRunner, SandboxStatus};
use nanoclaw_scheduler::{Scheduler, TaskExecutor};
use nanoclaw_store::{ScheduledTask, StorePool};
use nanoclaw_tools::{
    CancelTaskTool, PauseTaskTool, ResumeTaskTool, ScheduleTaskTool, SetPreferenceTool, ToolRegistry,
};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = nanoclaw_config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Some(Commands::Validate) => {
            println!("configuration is valid");
            Ok(())
        }
        Some(Commands::ShowConfig) => {
            println!("{}", serde_yaml::to_string(&config).context("serialising config")?);
            Ok(())
        }
        None => run(config).await,
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

/// Runs the daemon until `SIGINT`/`SIGTERM`: the scheduler poll loop and the
/// sandbox-to-host IPC bus, both backed by the same per-group lock the
/// (out-of-scope) message dispatcher would also acquire.
async fn run(config: Config) -> anyhow::Result<()> {
    let data_dir = PathBuf::from(&config.paths.data_dir);
    let groups_dir = PathBuf::from(&config.paths.groups_dir);
    let store_path = PathBuf::from(&config.paths.store_path);

    std::fs::create_dir_all(&data_dir).context("creating data directory")?;
    std::fs::create_dir_all(&groups_dir).context("creating groups directory")?;

    let store = Arc::new(StorePool::open(&store_path).await.context("opening persistent store")?);
    let groups = Arc::new(
        GroupStore::load(data_dir.join("registered_groups.json"), &config.main_group_folder)
            .context("loading registered groups")?,
    );
    let sessions = Arc::new(SessionStore::load(data_dir.join("sessions.json")).context("loading sessions")?);
    let lock_manager = Arc::new(LockManager::new());

    let mut registry = ToolRegistry::new();
    registry.register(ScheduleTaskTool::new(store.clone()));
    registry.register(PauseTaskTool::new(store.clone()));
    registry.register(ResumeTaskTool::new(store.clone()));
    registry.register(CancelTaskTool::new(store.clone()));
    registry.register(SetPreferenceTool::new(store.clone()));
    // `generate_image` and `register_group` depend on collaborators declared
    // out of scope here (image-gen backend, chat-transport registrar); they
    // are omitted from the catalogue rather than wired to a stub that always
    // errors, so `schemas_for` never advertises a tool that cannot work.
    let registry = Arc::new(registry);

    let ipc_root = data_dir.join("ipc");
    let ipc_bus = Arc::new(IpcBus::new(
        ipc_root,
        config.assistant_name.clone(),
        groups.clone(),
        registry.clone(),
        Arc::new(LoggingMessageSink),
        config.container.ipc_debounce_ms,
        config.ipc_poll_interval_ms,
        config.container.ipc_fallback_polling_multiplier,
    ));
    let ipc_handle = ipc_bus.start().context("starting IPC bus")?;

    let runner = Arc::new(SandboxRunner::new(
        "docker",
        config.container.image.clone(),
        Duration::from_millis(config.container.timeout_ms),
        Duration::from_millis(config.container.graceful_shutdown_delay_ms),
        config.container.max_output_size,
        false,
    ));
    let executor = Arc::new(SandboxTaskExecutor {
        runner,
        groups: groups.clone(),
        sessions: sessions.clone(),
        data_dir: data_dir.clone(),
        groups_dir: groups_dir.clone(),
        allowed_env_keys: config.allowed_container_env_keys.clone(),
    });

    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        lock_manager.clone(),
        executor,
        config.scheduler_poll_interval_ms,
    ));

    info!(groups = groups.all().len(), "nanoclaw dispatch core starting");

    let scheduler_handle = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run().await }
    });

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutdown signal received, stopping");

    scheduler.stop();
    ipc_handle.stop();
    let _ = scheduler_handle.await;

    Ok(())
}

/// Stands in for the (out-of-scope) chat-transport client: logs where a
/// relayed message would be sent instead of delivering it.
struct LoggingMessageSink;

#[async_trait]
impl IpcMessageSink for LoggingMessageSink {
    async fn send_message(&self, chat_id: &str, text: &str) -> anyhow::Result<()> {
        info!(chat_id, text, "chat transport not configured, dropping relayed message");
        Ok(())
    }
}

/// Runs a scheduled task's prompt through the sandbox (§4.9 always selects
/// the sandbox for scheduled work; see [`nanoclaw_core::choose_path`]).
struct SandboxTaskExecutor {
    runner: Arc<SandboxRunner>,
    groups: Arc<GroupStore>,
    sessions: Arc<SessionStore>,
    data_dir: PathBuf,
    groups_dir: PathBuf,
    allowed_env_keys: Vec<String>,
}

#[async_trait]
impl TaskExecutor for SandboxTaskExecutor {
    async fn execute(&self, task: &ScheduledTask) -> anyhow::Result<String> {
        let is_main = self.groups.is_main(&task.group_folder);
        let group_dir = self.groups_dir.join(&task.group_folder);
        let logs_dir = group_dir.join("logs");
        std::fs::create_dir_all(&group_dir).with_context(|| format!("creating group dir for {}", task.group_folder))?;

        let session_id = self.sessions.get(&task.group_folder);

        let input = SandboxInput {
            prompt: task.prompt.clone(),
            session_id,
            group_folder: task.group_folder.clone(),
            chat_jid: task.chat_id.clone(),
            is_main,
            is_scheduled_task: Some(true),
            system_prompt: None,
            enable_web_search: None,
            media_path: None,
            memory_context: None,
        };

        let ipc_dir = self.data_dir.join("ipc").join(&task.group_folder);
        let env: Vec<(String, String)> = self
            .allowed_env_keys
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|v| (key.clone(), v)))
            .collect();

        let request = nanoclaw_sandbox::SandboxRequest {
            group_folder: &task.group_folder,
            chat_id: &task.chat_id,
            is_main,
            input,
            mount_ctx: MountContext {
                is_main,
                project_dir: &self.data_dir,
                group_dir: &group_dir,
                global_shared_dir: None,
                credentials_dir: &self.data_dir.join("credentials"),
                sessions_dir: &self.data_dir.join("sessions"),
                ipc_dir: &ipc_dir,
                env_file_dir: &self.data_dir.join("envfiles").join(&task.group_folder),
            },
            extra_mounts: Vec::<Mount>::new(),
            env,
            logs_dir: &logs_dir,
        };

        let outcome = self.runner.run(request).await;

        if let Some(new_session) = &outcome.new_session_id {
            if let Err(e) = self.sessions.set(&task.group_folder, new_session.clone()) {
                warn!(group = %task.group_folder, error = %e, "failed to persist new session id");
            }
        }

        match outcome.status {
            SandboxStatus::Success => Ok(outcome.result.unwrap_or_default()),
            SandboxStatus::Error => {
                error!(task_id = %task.id, error = outcome.error.as_deref().unwrap_or("unknown"), "sandbox task run failed");
                Err(anyhow::anyhow!(outcome.error.unwrap_or_else(|| "sandbox execution failed".into())))
            }
        }
    }
}

#[allow(dead_code)]
fn unused_output_type_reference(_: SandboxOutput) {}
