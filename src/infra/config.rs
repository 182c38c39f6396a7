// src/infra/config.rs - Configuration loading (TOML + environment overrides)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::infra::errors::BridgeError;
use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub shell: ShellConfig,

    #[serde(default)]
    pub files: FilesConfig,

    #[serde(default)]
    pub sessions: SessionsConfig,

    #[serde(default)]
    pub reply: ReplyConfig,

    #[serde(default)]
    pub screen: ScreenConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// The single chat id allowed to issue commands.
    pub allowed_chat_id: String,
    pub poll_timeout_secs: u64,
    /// Send a fixed denial notice to unauthorized chats instead of dropping silently.
    pub notify_denied: bool,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            allowed_chat_id: String::new(),
            poll_timeout_secs: 30,
            notify_denied: false,
        }
    }
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a coding assistant reachable from a mobile chat. \
You help with coding tasks, debugging, architecture, DevOps, scripting and general technical \
questions. Keep responses concise since they appear in a mobile chat. Use markdown formatting \
and fenced code blocks for code. The user may continue this conversation later in their IDE, \
so be thorough in your reasoning.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub system_prompt: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    /// Number of prior user/assistant turns sent as context.
    pub context_turns: usize,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.0-flash".into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            request_timeout_secs: 60,
            max_retries: 2,
            context_turns: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub program: String,
    pub timeout_secs: u64,
    pub max_output_chars: usize,
    pub blocked: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: "sh".into(),
            timeout_secs: 60,
            max_output_chars: 3800,
            blocked: default_blocked_commands(),
        }
    }
}

pub fn default_blocked_commands() -> Vec<String> {
    [
        "rm -rf /",
        "rm -rf /*",
        "mkfs",
        "dd if=",
        "shutdown",
        "reboot",
        "halt",
        ":(){:|:&};:",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Initial working directory (defaults to the home directory).
    pub project_dir: Option<String>,
    /// When set, `/file`, `/view`, `/ls` and `/project` may not leave this directory.
    pub allowed_root: Option<String>,
    pub max_send_bytes: u64,
    pub max_view_bytes: u64,
    pub max_list_entries: usize,
    /// Hold `/edit`, `/create` and `/task` proposals until the owner replies ✅.
    pub require_approval: bool,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            project_dir: None,
            allowed_root: None,
            max_send_bytes: 50 * 1024 * 1024,
            max_view_bytes: 100 * 1024,
            max_list_entries: 50,
            require_approval: true,
        }
    }
}

impl FilesConfig {
    pub fn project_dir(&self) -> PathBuf {
        self.project_dir
            .as_deref()
            .map(paths::expand_home)
            .unwrap_or_else(paths::dirs_home)
    }

    pub fn allowed_root(&self) -> Option<PathBuf> {
        self.allowed_root.as_deref().map(paths::expand_home)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    pub dir: Option<String>,
}

impl SessionsConfig {
    pub fn dir(&self) -> PathBuf {
        self.dir
            .as_deref()
            .map(paths::expand_home)
            .unwrap_or_else(paths::sessions_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyConfig {
    /// Transport single-message limit, in UTF-16 code units as Telegram counts them.
    pub chunk_chars: usize,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub progress_notices: bool,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            chunk_chars: 4096,
            max_attempts: 3,
            initial_backoff_ms: 500,
            progress_notices: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    /// Capture command; `{path}` is replaced with the output file.
    /// When unset a platform default is used.
    pub command: Option<Vec<String>>,
    pub timeout_secs: u64,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load config from the default location, falling back to defaults, then apply env overrides.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|k| std::env::var(k).ok());
        Ok(config)
    }

    /// Load config from an explicit file, then apply env overrides.
    pub fn load_path(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides(|k| std::env::var(k).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Secrets and identity may come from the environment instead of the file.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
        if let Some(v) = non_empty("ALLOWED_CHAT_ID") {
            self.telegram.allowed_chat_id = v;
        }
        if let Some(v) = non_empty("GEMINI_API_KEY") {
            self.gemini.api_key = v;
        }
        if let Some(v) = non_empty("GEMINI_MODEL") {
            self.gemini.model = v;
        }
    }

    /// Check everything the daemon needs before it opens a session.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(BridgeError::Config(
                "telegram.bot_token is not set (or TELEGRAM_BOT_TOKEN)".into(),
            ));
        }
        if self.telegram.allowed_chat_id.trim().is_empty() {
            return Err(BridgeError::Config(
                "telegram.allowed_chat_id is not set (or ALLOWED_CHAT_ID)".into(),
            ));
        }
        if self.gemini.api_key.trim().is_empty() {
            return Err(BridgeError::Config(
                "gemini.api_key is not set (or GEMINI_API_KEY)".into(),
            ));
        }
        if self.reply.chunk_chars == 0 {
            return Err(BridgeError::Config("reply.chunk_chars must be > 0".into()));
        }
        if self.shell.timeout_secs == 0 {
            return Err(BridgeError::Config("shell.timeout_secs must be > 0".into()));
        }
        Ok(())
    }
}

/// Mask a secret for display (`check` output, logs).
pub fn redact(secret: &str) -> String {
    let n = secret.chars().count();
    if n == 0 {
        "(unset)".into()
    } else if n <= 8 {
        "****".into()
    } else {
        let head: String = secret.chars().take(4).collect();
        format!("{head}****")
    }
}
