// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `bool::default()`
/// (i.e. `false`), so fields that should be enabled unless explicitly turned
/// off need a named default function instead.
fn default_true() -> bool {
    true
}

fn default_assistant_name() -> String {
    "Nanoclaw".into()
}
fn default_gemini_model() -> String {
    "gemini-2.0-flash".into()
}
fn default_container_image() -> String {
    "nanoclaw-agent:latest".into()
}
fn default_main_group_folder() -> String {
    "main".into()
}
fn default_timezone() -> String {
    "UTC".into()
}

/// The nine environment variable names a sandboxed agent process is allowed
/// to see. Exactly this set — never more — is written into the container's
/// env-file (§4.6 step 1 / §6.5).
fn default_allowed_container_env_keys() -> Vec<String> {
    vec![
        "GEMINI_API_KEY".into(),
        "GOOGLE_API_KEY".into(),
        "GEMINI_MODEL".into(),
        "TZ".into(),
        "NODE_ENV".into(),
        "ASSISTANT_NAME".into(),
        "CONTAINER_TIMEOUT".into(),
        "ENABLE_WEB_SEARCH".into(),
        "MAIN_GROUP_FOLDER".into(),
    ]
}

/// Environment variable names that must never appear in
/// `allowed_container_env_keys`, regardless of configuration — leaking any of
/// these into a sandboxed process would hand it the chat-transport
/// credential, the host's home directory, or its executable search path.
pub const FORBIDDEN_CONTAINER_ENV_KEYS: &[&str] = &["TELEGRAM_BOT_TOKEN", "HOME", "PATH"];

/// Top-level configuration for the dispatch/execution core.
///
/// Loaded once at startup by [`crate::load`] and handed out as an
/// `Arc<Config>`; no component re-reads the environment or a config file
/// after that point (§12).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name the trigger pattern (§6.4) matches against, e.g. `@Nanoclaw`.
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,

    /// Model identifier forwarded to the Gemini-compatible provider.
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Distinguished group folder name with elevated permissions (§3).
    #[serde(default = "default_main_group_folder")]
    pub main_group_folder: String,

    /// IANA timezone name used to step cron schedules forward (§4.9).
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Interval between chat-transport long-poll cycles. Owned by the
    /// (out-of-scope) chat client; kept here because the scheduler and the
    /// IPC poll-fallback multiplier are defined relative to it.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_scheduler_poll_interval_ms")]
    pub scheduler_poll_interval_ms: u64,

    #[serde(default = "default_ipc_poll_interval_ms")]
    pub ipc_poll_interval_ms: u64,

    #[serde(default)]
    pub container: ContainerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub task_tracking: TaskTrackingConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub fast_path: FastPathConfig,
    #[serde(default)]
    pub paths: PathsConfig,

    /// Exactly 9 environment variable names a container may see (§6.5).
    #[serde(default = "default_allowed_container_env_keys")]
    pub allowed_container_env_keys: Vec<String>,
}

fn default_poll_interval_ms() -> u64 {
    2_000
}
fn default_scheduler_poll_interval_ms() -> u64 {
    30_000
}
fn default_ipc_poll_interval_ms() -> u64 {
    1_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            assistant_name: default_assistant_name(),
            gemini_model: default_gemini_model(),
            main_group_folder: default_main_group_folder(),
            timezone: default_timezone(),
            poll_interval_ms: default_poll_interval_ms(),
            scheduler_poll_interval_ms: default_scheduler_poll_interval_ms(),
            ipc_poll_interval_ms: default_ipc_poll_interval_ms(),
            container: ContainerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cleanup: CleanupConfig::default(),
            telegram: TelegramConfig::default(),
            alerts: AlertsConfig::default(),
            task_tracking: TaskTrackingConfig::default(),
            memory: MemoryConfig::default(),
            fast_path: FastPathConfig::default(),
            paths: PathsConfig::default(),
            allowed_container_env_keys: default_allowed_container_env_keys(),
        }
    }
}

impl Config {
    /// Validate cross-field invariants that `serde` alone cannot express.
    ///
    /// Called once right after loading, before the config is handed to any
    /// component. A validation failure is a startup-time error (§7: the only
    /// exceptions that terminate the process are those in `main`).
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.allowed_container_env_keys.len() == 9,
            "allowed_container_env_keys must list exactly 9 names, found {}",
            self.allowed_container_env_keys.len()
        );

        for required in ["GEMINI_API_KEY", "GOOGLE_API_KEY", "GEMINI_MODEL", "TZ", "NODE_ENV"] {
            anyhow::ensure!(
                self.allowed_container_env_keys.iter().any(|k| k == required),
                "allowed_container_env_keys must include {required}"
            );
        }

        for forbidden in FORBIDDEN_CONTAINER_ENV_KEYS {
            anyhow::ensure!(
                !self.allowed_container_env_keys.iter().any(|k| k == forbidden),
                "allowed_container_env_keys must not include {forbidden}"
            );
        }

        anyhow::ensure!(!self.main_group_folder.is_empty(), "main_group_folder must not be empty");
        anyhow::ensure!(
            self.main_group_folder
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "main_group_folder must match ^[A-Za-z0-9_-]+$"
        );

        anyhow::ensure!(self.telegram.max_message_length > 0, "telegram.max_message_length must be positive");
        anyhow::ensure!(self.fast_path.timeout_ms > 0, "fast_path.timeout_ms must be positive");
        anyhow::ensure!(self.container.timeout_ms > 0, "container.timeout_ms must be positive");

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    #[serde(default = "default_container_image")]
    pub image: String,
    /// Wall-clock bound on one sandbox invocation (§4.6 step 4).
    #[serde(default = "ContainerConfig::default_timeout_ms")]
    pub timeout_ms: u64,
    /// Bound on combined stdout+stderr buffered from the container (§4.6 step 3).
    #[serde(default = "ContainerConfig::default_max_output_size")]
    pub max_output_size: usize,
    /// Delay between `SIGTERM` and `SIGKILL` on timeout (§4.6 step 4).
    #[serde(default = "ContainerConfig::default_graceful_shutdown_delay_ms")]
    pub graceful_shutdown_delay_ms: u64,
    /// Debounce window collapsing bursts of IPC file-create events (§4.10).
    #[serde(default = "ContainerConfig::default_ipc_debounce_ms")]
    pub ipc_debounce_ms: u64,
    /// Multiplier applied to `ipc_poll_interval_ms` for the watcher's polling
    /// safety net (§4.10).
    #[serde(default = "ContainerConfig::default_ipc_fallback_polling_multiplier")]
    pub ipc_fallback_polling_multiplier: u64,
}

impl ContainerConfig {
    fn default_timeout_ms() -> u64 {
        120_000
    }
    fn default_max_output_size() -> usize {
        1_000_000
    }
    fn default_graceful_shutdown_delay_ms() -> u64 {
        5_000
    }
    fn default_ipc_debounce_ms() -> u64 {
        300
    }
    fn default_ipc_fallback_polling_multiplier() -> u64 {
        5
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            image: default_container_image(),
            timeout_ms: Self::default_timeout_ms(),
            max_output_size: Self::default_max_output_size(),
            graceful_shutdown_delay_ms: Self::default_graceful_shutdown_delay_ms(),
            ipc_debounce_ms: Self::default_ipc_debounce_ms(),
            ipc_fallback_polling_multiplier: Self::default_ipc_fallback_polling_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "RateLimitConfig::default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "RateLimitConfig::default_window_minutes")]
    pub window_minutes: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl RateLimitConfig {
    fn default_max_requests() -> u32 {
        20
    }
    fn default_window_minutes() -> u32 {
        1
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: Self::default_max_requests(),
            window_minutes: Self::default_window_minutes(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "CleanupConfig::default_media_max_age_days")]
    pub media_max_age_days: u32,
    #[serde(default = "CleanupConfig::default_media_cleanup_interval_hours")]
    pub media_cleanup_interval_hours: u32,
}

impl CleanupConfig {
    fn default_media_max_age_days() -> u32 {
        7
    }
    fn default_media_cleanup_interval_hours() -> u32 {
        24
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            media_max_age_days: Self::default_media_max_age_days(),
            media_cleanup_interval_hours: Self::default_media_cleanup_interval_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "TelegramConfig::default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,
    #[serde(default = "TelegramConfig::default_max_message_length")]
    pub max_message_length: usize,
}

impl TelegramConfig {
    fn default_rate_limit_delay_ms() -> u64 {
        50
    }
    fn default_max_message_length() -> usize {
        4096
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            rate_limit_delay_ms: Self::default_rate_limit_delay_ms(),
            max_message_length: Self::default_max_message_length(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "AlertsConfig::default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "AlertsConfig::default_alert_cooldown_minutes")]
    pub alert_cooldown_minutes: u32,
}

impl AlertsConfig {
    fn default_failure_threshold() -> u32 {
        1
    }
    fn default_alert_cooldown_minutes() -> u32 {
        30
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            failure_threshold: Self::default_failure_threshold(),
            alert_cooldown_minutes: Self::default_alert_cooldown_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTrackingConfig {
    #[serde(default = "TaskTrackingConfig::default_max_turns")]
    pub max_turns: u32,
    #[serde(default = "TaskTrackingConfig::default_step_timeout_ms")]
    pub step_timeout_ms: u64,
}

impl TaskTrackingConfig {
    fn default_max_turns() -> u32 {
        25
    }
    fn default_step_timeout_ms() -> u64 {
        60_000
    }
}

impl Default for TaskTrackingConfig {
    fn default() -> Self {
        Self {
            max_turns: Self::default_max_turns(),
            step_timeout_ms: Self::default_step_timeout_ms(),
        }
    }
}

fn default_summary_prompt() -> String {
    "Summarise the conversation below into a short narrative memory, \
     preserving names, commitments, and open questions."
        .into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "MemoryConfig::default_summarize_threshold_chars")]
    pub summarize_threshold_chars: usize,
    #[serde(default = "MemoryConfig::default_max_context_messages")]
    pub max_context_messages: usize,
    #[serde(default = "MemoryConfig::default_check_interval_hours")]
    pub check_interval_hours: u32,
    #[serde(default = "default_summary_prompt")]
    pub summary_prompt: String,
    #[serde(default = "MemoryConfig::default_max_prompt_length")]
    pub max_prompt_length: usize,
}

impl MemoryConfig {
    fn default_summarize_threshold_chars() -> usize {
        20_000
    }
    fn default_max_context_messages() -> usize {
        200
    }
    fn default_check_interval_hours() -> u32 {
        6
    }
    fn default_max_prompt_length() -> usize {
        30_000
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            summarize_threshold_chars: Self::default_summarize_threshold_chars(),
            max_context_messages: Self::default_max_context_messages(),
            check_interval_hours: Self::default_check_interval_hours(),
            summary_prompt: default_summary_prompt(),
            max_prompt_length: Self::default_max_prompt_length(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FastPathConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "FastPathConfig::default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "FastPathConfig::default_min_cache_chars")]
    pub min_cache_chars: usize,
    #[serde(default = "FastPathConfig::default_streaming_interval_ms")]
    pub streaming_interval_ms: u64,
    #[serde(default = "FastPathConfig::default_max_history_messages")]
    pub max_history_messages: usize,
    #[serde(default = "FastPathConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl FastPathConfig {
    fn default_cache_ttl_seconds() -> u64 {
        3_600
    }
    fn default_min_cache_chars() -> usize {
        4_096
    }
    fn default_streaming_interval_ms() -> u64 {
        400
    }
    fn default_max_history_messages() -> usize {
        40
    }
    fn default_timeout_ms() -> u64 {
        60_000
    }
}

impl Default for FastPathConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_ttl_seconds: Self::default_cache_ttl_seconds(),
            min_cache_chars: Self::default_min_cache_chars(),
            streaming_interval_ms: Self::default_streaming_interval_ms(),
            max_history_messages: Self::default_max_history_messages(),
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

fn default_data_dir() -> String {
    "./data".into()
}
fn default_groups_dir() -> String {
    "./data/groups".into()
}
fn default_store_path() -> String {
    "./data/messages.db".into()
}
fn default_mount_allowlist_path() -> String {
    "./config/mount-allowlist.json".into()
}

/// Filesystem layout (§6.3). Every path may be relative; components resolve
/// them against the current working directory at startup, once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_groups_dir")]
    pub groups_dir: String,
    #[serde(default = "default_store_path")]
    pub store_path: String,
    #[serde(default = "default_mount_allowlist_path")]
    pub mount_allowlist_path: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            groups_dir: default_groups_dir(),
            store_path: default_store_path(),
            mount_allowlist_path: default_mount_allowlist_path(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
