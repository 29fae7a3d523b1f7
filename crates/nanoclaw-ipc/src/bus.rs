// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The sandbox-to-host IPC bus (§4.10).
//!
//! Sandboxed agents cannot call back into the host process directly; instead
//! they drop JSON files into a per-group `messages/` or `tasks/` directory.
//! This bus watches those directories (with a debounced filesystem watcher
//! backed by a polling safety net), routes each file to the same chat
//! transport or tool registry the in-band paths use, and unlinks or
//! quarantines it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nanoclaw_core::GroupStore;
use nanoclaw_tools::{ToolCall, ToolRegistry};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::format::{IpcMessage, IpcTask};

/// Capability the bus needs to relay a message on the agent's behalf.
#[async_trait]
pub trait IpcMessageSink: Send + Sync {
    async fn send_message(&self, chat_id: &str, text: &str) -> anyhow::Result<()>;
}

/// Handle to a running bus: lets the owner request a stop.
pub struct IpcHandle {
    stop: Arc<AtomicBool>,
    watcher: Arc<Mutex<Option<RecommendedWatcher>>>,
    debounce_task: JoinHandle<()>,
    poll_task: JoinHandle<()>,
}

impl IpcHandle {
    /// Request shutdown. Eventually consistent (§5): an iteration already in
    /// progress is allowed to finish; the watcher and poll loop stop at their
    /// next check.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.watcher.lock().unwrap().take();
    }
}

impl Drop for IpcHandle {
    fn drop(&mut self) {
        self.stop();
        self.debounce_task.abort();
        self.poll_task.abort();
    }
}

pub struct IpcBus {
    root: PathBuf,
    assistant_name: String,
    groups: Arc<GroupStore>,
    tools: Arc<ToolRegistry>,
    messenger: Arc<dyn IpcMessageSink>,
    debounce_ms: u64,
    poll_interval_ms: u64,
    poll_fallback_multiplier: u64,
    sent: Mutex<HashSet<String>>,
    stop: Arc<AtomicBool>,
}

impl IpcBus {
    pub fn new(
        root: impl Into<PathBuf>,
        assistant_name: impl Into<String>,
        groups: Arc<GroupStore>,
        tools: Arc<ToolRegistry>,
        messenger: Arc<dyn IpcMessageSink>,
        debounce_ms: u64,
        poll_interval_ms: u64,
        poll_fallback_multiplier: u64,
    ) -> Self {
        Self {
            root: root.into(),
            assistant_name: assistant_name.into(),
            groups,
            tools,
            messenger,
            debounce_ms,
            poll_interval_ms,
            poll_fallback_multiplier,
            sent: Mutex::new(HashSet::new()),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    fn messages_dir(&self, folder: &str) -> PathBuf {
        self.root.join(folder).join("messages")
    }

    fn tasks_dir(&self, folder: &str) -> PathBuf {
        self.root.join(folder).join("tasks")
    }

    fn errors_dir(&self) -> PathBuf {
        self.root.join("errors")
    }

    /// Create `messages/`, `tasks/`, and the shared `errors/` directory for
    /// every currently-registered group. Called at startup and re-checked on
    /// every scan so newly registered groups pick up watching lazily.
    fn ensure_dirs(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(self.errors_dir())?;
        for group in self.groups.all() {
            std::fs::create_dir_all(self.messages_dir(&group.folder))?;
            std::fs::create_dir_all(self.tasks_dir(&group.folder))?;
        }
        Ok(())
    }

    /// Start the watcher and polling fallback. Returns a handle the caller
    /// uses to request shutdown; dropping the handle also stops the bus.
    pub fn start(self: Arc<Self>) -> anyhow::Result<IpcHandle> {
        self.ensure_dirs()?;

        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let watcher_tx = tx.clone();
        let watcher_slot: Arc<Mutex<Option<RecommendedWatcher>>> = Arc::new(Mutex::new(None));
        let watcher_slot_for_err = watcher_slot.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(_) => {
                let _ = watcher_tx.send(());
            }
            Err(e) => {
                warn!("IPC file watcher error, falling back to polling only: {e}");
                watcher_slot_for_err.lock().unwrap().take();
            }
        })?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        *watcher_slot.lock().unwrap() = Some(watcher);

        let bus = self.clone();
        let debounce_task = tokio::spawn(async move {
            while !bus.stop.load(Ordering::Relaxed) {
                if rx.recv().await.is_none() {
                    break;
                }
                loop {
                    match tokio::time::timeout(
                        std::time::Duration::from_millis(bus.debounce_ms),
                        rx.recv(),
                    )
                    .await
                    {
                        Ok(Some(())) => continue,
                        _ => break,
                    }
                }
                bus.scan_all().await;
            }
        });

        let bus = self.clone();
        let poll_task = tokio::spawn(async move {
            let period = std::time::Duration::from_millis(
                bus.poll_interval_ms * bus.poll_fallback_multiplier,
            );
            while !bus.stop.load(Ordering::Relaxed) {
                tokio::time::sleep(period).await;
                if bus.stop.load(Ordering::Relaxed) {
                    break;
                }
                bus.scan_all().await;
            }
        });

        Ok(IpcHandle {
            stop: self.stop.clone(),
            watcher: watcher_slot,
            debounce_task,
            poll_task,
        })
    }

    pub async fn scan_all(&self) {
        if let Err(e) = self.ensure_dirs() {
            warn!("failed to ensure IPC directories: {e}");
        }
        for group in self.groups.all() {
            self.scan_group(&group.folder).await;
        }
    }

    async fn scan_group(&self, folder: &str) {
        self.scan_dir(folder, &self.messages_dir(folder), true).await;
        self.scan_dir(folder, &self.tasks_dir(folder), false).await;
    }

    async fn scan_dir(&self, folder: &str, dir: &Path, is_messages: bool) {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(_) => return,
        };
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("failed to read IPC directory {}: {e}", dir.display());
                    break;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if is_messages {
                self.process_message_file(folder, &path).await;
            } else {
                self.process_task_file(folder, &path).await;
            }
        }
    }

    async fn move_to_errors(&self, folder: &str, path: &Path) {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("unknown.json");
        let dest = self.errors_dir().join(format!("{folder}-{file_name}"));
        if let Err(e) = tokio::fs::rename(path, &dest).await {
            warn!("failed to quarantine IPC file {}: {e}", path.display());
        }
    }

    async fn process_message_file(&self, folder: &str, path: &Path) {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(_) => return,
        };
        let message: IpcMessage = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                warn!("unparseable IPC message file {}: {e}", path.display());
                self.move_to_errors(folder, path).await;
                return;
            }
        };

        let authorized = self.groups.is_main(folder)
            || self
                .groups
                .get(&message.chat_jid)
                .map(|g| g.folder == folder)
                .unwrap_or(false);

        if !authorized {
            warn!("unauthorised IPC message from group {folder} targeting {}", message.chat_jid);
            self.move_to_errors(folder, path).await;
            return;
        }

        let text = format!("{}: {}", self.assistant_name, message.text);
        match self.messenger.send_message(&message.chat_jid, &text).await {
            Ok(()) => {
                self.sent.lock().unwrap().insert(message.chat_jid.clone());
                let _ = tokio::fs::remove_file(path).await;
            }
            Err(e) => {
                warn!("failed to relay IPC message to {}: {e}", message.chat_jid);
                self.move_to_errors(folder, path).await;
            }
        }
    }

    /// Whether a message has already been relayed to this chat, for callers
    /// that want to avoid a duplicate in-band send (§4.10 `ipc_message_sent`).
    pub fn was_sent(&self, chat_id: &str) -> bool {
        self.sent.lock().unwrap().contains(chat_id)
    }

    async fn process_task_file(&self, folder: &str, path: &Path) {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(_) => return,
        };
        let task: IpcTask = match serde_json::from_str(&content) {
            Ok(t) => t,
            Err(e) => {
                warn!("unparseable IPC task file {}: {e}", path.display());
                self.move_to_errors(folder, path).await;
                return;
            }
        };

        let chat_id = task
            .chat_jid()
            .map(str::to_string)
            .or_else(|| self.groups.get_by_folder(folder).map(|g| g.chat_id))
            .unwrap_or_default();

        let call = ToolCall {
            id: format!("ipc-{}", uuid::Uuid::new_v4()),
            name: task.tool_name().to_string(),
            args: task.to_args(),
            group_folder: folder.to_string(),
            chat_id,
            is_main: self.groups.is_main(folder),
        };

        let output = self.tools.execute(&call).await;
        if output.is_error() {
            debug!("IPC task {} failed: {:?}", call.name, output.response);
            self.move_to_errors(folder, path).await;
        } else {
            let _ = tokio::fs::remove_file(path).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use nanoclaw_core::GroupRecord;
    use serde_json::{json, Value};

    use super::*;
    use nanoclaw_tools::{Tool, ToolOutput};

    struct RecordingSink {
        sent: StdMutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl IpcMessageSink for RecordingSink {
        async fn send_message(&self, chat_id: &str, text: &str) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("transport unavailable");
            }
            self.sent.lock().unwrap().push((chat_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    struct StubTool {
        ok: bool,
    }

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            "schedule_task"
        }
        fn description(&self) -> &str {
            "stub"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            if self.ok {
                ToolOutput::ok(&call.id, &call.name, json!({"success": true}))
            } else {
                ToolOutput::error(&call.id, &call.name, "boom")
            }
        }
    }

    fn group(chat_id: &str, folder: &str) -> GroupRecord {
        GroupRecord {
            chat_id: chat_id.into(),
            folder: folder.into(),
            name: "Group".into(),
            trigger: "@Andy".into(),
            persona_key: None,
            system_prompt: None,
            model_override: None,
            enable_web_search: true,
            enable_fast_path: true,
            enable_follow_up: true,
            require_trigger: false,
            extra_mounts: vec![],
        }
    }

    fn bus_with(groups: Arc<GroupStore>, tools: ToolRegistry, sink: Arc<dyn IpcMessageSink>, root: &Path) -> IpcBus {
        IpcBus::new(root.to_path_buf(), "Andy", groups, Arc::new(tools), sink, 50, 50, 1)
    }

    #[tokio::test]
    async fn main_group_message_is_relayed_and_unlinked() {
        let dir = tempfile::tempdir().unwrap();
        let groups = Arc::new(GroupStore::load(dir.path().join("groups.json"), "main").unwrap());
        groups.register(group("c-main", "main")).unwrap();
        let sink = Arc::new(RecordingSink { sent: StdMutex::new(vec![]), fail: false });
        let bus = bus_with(groups, ToolRegistry::new(), sink.clone(), dir.path());
        bus.ensure_dirs().unwrap();

        let file = bus.messages_dir("main").join("m1.json");
        tokio::fs::write(&file, r#"{"type":"message","chatJid":"c-other","text":"hi","timestamp":1}"#)
            .await
            .unwrap();

        bus.process_message_file("main", &file).await;

        assert!(!file.exists());
        assert_eq!(sink.sent.lock().unwrap()[0].0, "c-other");
        assert!(sink.sent.lock().unwrap()[0].1.starts_with("Andy: "));
        assert!(bus.was_sent("c-other"));
    }

    #[tokio::test]
    async fn non_main_message_to_foreign_chat_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let groups = Arc::new(GroupStore::load(dir.path().join("groups.json"), "main").unwrap());
        groups.register(group("c-a", "team_a")).unwrap();
        groups.register(group("c-b", "team_b")).unwrap();
        let sink = Arc::new(RecordingSink { sent: StdMutex::new(vec![]), fail: false });
        let bus = bus_with(groups, ToolRegistry::new(), sink.clone(), dir.path());
        bus.ensure_dirs().unwrap();

        let file = bus.messages_dir("team_a").join("m1.json");
        tokio::fs::write(&file, r#"{"type":"message","chatJid":"c-b","text":"hi","timestamp":1}"#)
            .await
            .unwrap();

        bus.process_message_file("team_a", &file).await;

        assert!(!file.exists());
        assert!(bus.errors_dir().join("team_a-m1.json").exists());
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_message_file_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let groups = Arc::new(GroupStore::load(dir.path().join("groups.json"), "main").unwrap());
        groups.register(group("c-main", "main")).unwrap();
        let sink = Arc::new(RecordingSink { sent: StdMutex::new(vec![]), fail: false });
        let bus = bus_with(groups, ToolRegistry::new(), sink, dir.path());
        bus.ensure_dirs().unwrap();

        let file = bus.messages_dir("main").join("bad.json");
        tokio::fs::write(&file, "{not json").await.unwrap();
        bus.process_message_file("main", &file).await;

        assert!(!file.exists());
        assert!(bus.errors_dir().join("main-bad.json").exists());
    }

    #[tokio::test]
    async fn task_file_routes_through_tool_registry() {
        let dir = tempfile::tempdir().unwrap();
        let groups = Arc::new(GroupStore::load(dir.path().join("groups.json"), "main").unwrap());
        groups.register(group("c-main", "main")).unwrap();
        let mut reg = ToolRegistry::new();
        reg.register(StubTool { ok: true });
        let sink = Arc::new(RecordingSink { sent: StdMutex::new(vec![]), fail: false });
        let bus = bus_with(groups, reg, sink, dir.path());
        bus.ensure_dirs().unwrap();

        let file = bus.tasks_dir("main").join("t1.json");
        tokio::fs::write(
            &file,
            r#"{"type":"schedule_task","prompt":"ping","scheduleType":"interval","scheduleValue":"1000"}"#,
        )
        .await
        .unwrap();

        bus.process_task_file("main", &file).await;
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn failing_task_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let groups = Arc::new(GroupStore::load(dir.path().join("groups.json"), "main").unwrap());
        groups.register(group("c-main", "main")).unwrap();
        let mut reg = ToolRegistry::new();
        reg.register(StubTool { ok: false });
        let sink = Arc::new(RecordingSink { sent: StdMutex::new(vec![]), fail: false });
        let bus = bus_with(groups, reg, sink, dir.path());
        bus.ensure_dirs().unwrap();

        let file = bus.tasks_dir("main").join("t1.json");
        tokio::fs::write(
            &file,
            r#"{"type":"schedule_task","prompt":"ping","scheduleType":"interval","scheduleValue":"1000"}"#,
        )
        .await
        .unwrap();

        bus.process_task_file("main", &file).await;
        assert!(!file.exists());
        assert!(bus.errors_dir().join("main-t1.json").exists());
    }

    #[tokio::test]
    async fn scan_all_processes_every_registered_group() {
        let dir = tempfile::tempdir().unwrap();
        let groups = Arc::new(GroupStore::load(dir.path().join("groups.json"), "main").unwrap());
        groups.register(group("c-main", "main")).unwrap();
        let sink = Arc::new(RecordingSink { sent: StdMutex::new(vec![]), fail: false });
        let bus = bus_with(groups, ToolRegistry::new(), sink.clone(), dir.path());
        bus.ensure_dirs().unwrap();

        let file = bus.messages_dir("main").join("m1.json");
        tokio::fs::write(&file, r#"{"type":"message","chatJid":"c-main","text":"hi","timestamp":1}"#)
            .await
            .unwrap();

        bus.scan_all().await;

        assert!(!file.exists());
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
    }
}
