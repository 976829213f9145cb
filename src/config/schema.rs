use anyhow::{Context, Result};
use directories::UserDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

// ── Top-level config ──────────────────────────────────────────────

/// Top-level relaygram configuration, loaded from `config.toml`.
///
/// Resolution order: `RELAYGRAM_CONFIG_DIR` env → `~/.relaygram/config.toml`.
/// Environment overrides are applied after load; [`Config::validate`] is the
/// startup gate that refuses to run with missing credentials.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Telegram transport configuration (`[telegram]`).
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// OpenAI credential and per-capability model identifiers (`[openai]`).
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Conversation history bounds and retention (`[history]`).
    #[serde(default)]
    pub history: HistoryConfig,

    /// Assistant persona (`[persona]`).
    #[serde(default)]
    pub persona: PersonaConfig,

    /// Fixed user-facing reply strings (`[messages]`).
    #[serde(default)]
    pub messages: MessagesConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            telegram: TelegramConfig::default(),
            openai: OpenAiConfig::default(),
            history: HistoryConfig::default(),
            persona: PersonaConfig::default(),
            messages: MessagesConfig::default(),
        }
    }
}

// ── Telegram transport ───────────────────────────────────────────

/// Telegram transport configuration (`[telegram]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TelegramConfig {
    /// Bot token from @BotFather. Overridden by `TELEGRAM_BOT_TOKEN`.
    #[serde(default)]
    pub bot_token: String,
    /// Identities (usernames without '@') allowed to use the relay.
    /// Overridden by `ALLOWED_USERS` (comma-separated).
    #[serde(default)]
    pub allowed_users: Vec<String>,
    /// Seconds between keepalive typing indicators while a call is pending.
    #[serde(default = "default_typing_interval_secs")]
    pub typing_interval_secs: u64,
}

fn default_typing_interval_secs() -> u64 {
    3
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            allowed_users: Vec::new(),
            typing_interval_secs: default_typing_interval_secs(),
        }
    }
}

// ── OpenAI provider ──────────────────────────────────────────────

/// OpenAI provider configuration (`[openai]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OpenAiConfig {
    /// API key. Overridden by `OPENAI_API_KEY`.
    #[serde(default)]
    pub api_key: String,
    /// Base URL override for any OpenAI-compatible endpoint.
    /// Overridden by `RELAYGRAM_API_URL`.
    #[serde(default)]
    pub api_url: Option<String>,
    /// Chat completion model. Overridden by `OPENAI_MODEL`.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Speech synthesis model for `/tts`.
    #[serde(default = "default_tts_model")]
    pub tts_model: String,
    /// Synthesis voice for `/tts`.
    #[serde(default = "default_tts_voice")]
    pub tts_voice: String,
    /// Image generation model for `/image`.
    #[serde(default = "default_image_model")]
    pub image_model: String,
    /// Generated image size for `/image`.
    #[serde(default = "default_image_size")]
    pub image_size: String,
    /// Transcription model for inbound voice notes.
    #[serde(default = "default_transcribe_model")]
    pub transcribe_model: String,
}

fn default_chat_model() -> String {
    "gpt-4o-mini".into()
}

fn default_tts_model() -> String {
    "tts-1".into()
}

fn default_tts_voice() -> String {
    "alloy".into()
}

fn default_image_model() -> String {
    "dall-e-3".into()
}

fn default_image_size() -> String {
    "1024x1024".into()
}

fn default_transcribe_model() -> String {
    "whisper-1".into()
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: None,
            chat_model: default_chat_model(),
            tts_model: default_tts_model(),
            tts_voice: default_tts_voice(),
            image_model: default_image_model(),
            image_size: default_image_size(),
            transcribe_model: default_transcribe_model(),
        }
    }
}

// ── History ──────────────────────────────────────────────────────

/// Conversation history configuration (`[history]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HistoryConfig {
    /// Maximum messages retained per session window, preamble included.
    /// Overridden by `MAX_MESSAGES_IN_HISTORY`.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    /// Sliding idle duration in seconds before a session is discarded.
    /// Overridden by `MESSAGE_HISTORY_RETENTION_TIME`.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Roll the user turn back out of history when a completion fails,
    /// instead of letting the failed turn occupy a context slot.
    #[serde(default)]
    pub drop_failed_turn: bool,
}

fn default_max_messages() -> usize {
    20
}

fn default_retention_secs() -> u64 {
    3600
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            retention_secs: default_retention_secs(),
            drop_failed_turn: false,
        }
    }
}

// ── Persona & fixed replies ──────────────────────────────────────

/// Assistant persona configuration (`[persona]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PersonaConfig {
    /// System preamble injected at the head of every fresh session window.
    /// Overridden by `BOT_ROLE`.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_system_prompt() -> String {
    "You are a helpful assistant chatting over Telegram. Keep replies concise.".into()
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
        }
    }
}

/// Fixed user-facing reply strings (`[messages]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MessagesConfig {
    /// Reply to `/start`. Overridden by `MESSAGE_START`.
    #[serde(default = "default_message_start")]
    pub start: String,
    /// Reply to `/help` and unknown commands. Overridden by `MESSAGE_HELP`.
    #[serde(default = "default_message_help")]
    pub help: String,
    /// Reply to senders not on the allow-list. Overridden by `MESSAGE_UNKNOWN_USER`.
    #[serde(default = "default_message_unknown_user")]
    pub unknown_user: String,
    /// Generic reply when a remote call fails. Overridden by `MESSAGE_ERROR`.
    #[serde(default = "default_message_error")]
    pub error: String,
}

fn default_message_start() -> String {
    "Hi! Send me a message and I'll reply. Try /help for commands.".into()
}

fn default_message_help() -> String {
    "Send text or a voice note to chat.\n/tts <text> — read text aloud\n/image <prompt> — generate an image".into()
}

fn default_message_unknown_user() -> String {
    "Sorry, I don't know you.".into()
}

fn default_message_error() -> String {
    "Something went wrong, please try again.".into()
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            start: default_message_start(),
            help: default_message_help(),
            unknown_user: default_message_unknown_user(),
            error: default_message_error(),
        }
    }
}

// ── Load / save / overrides / validation ─────────────────────────

fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("RELAYGRAM_CONFIG_DIR") {
        let dir = dir.trim();
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let user_dirs = UserDirs::new().context("Could not determine home directory")?;
    Ok(user_dirs.home_dir().join(".relaygram"))
}

impl Config {
    pub async fn load_or_init() -> Result<Self> {
        let dir = config_dir()?;
        let config_path = dir.join("config.toml");

        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let mut config = if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path.clone();
            config
        } else {
            let mut config = Config::default();
            config.config_path = config_path.clone();
            config.save().await?;
            config
        };

        // Config may hold the bot token and API key.
        #[cfg(unix)]
        {
            use std::{fs::Permissions, os::unix::fs::PermissionsExt};
            let _ = std::fs::set_permissions(&config_path, Permissions::from_mode(0o600));
        }

        config.apply_env_overrides();
        tracing::info!(path = %config.config_path.display(), "Config loaded");
        Ok(config)
    }

    /// Apply environment variable overrides to config.
    ///
    /// The variable names match the original deployment surface
    /// (`TELEGRAM_BOT_TOKEN`, `ALLOWED_USERS`, `OPENAI_*`, `MESSAGE_*`), so
    /// an env-only deployment needs no config file at all.
    pub fn apply_env_overrides(&mut self) {
        fn nonempty(name: &str) -> Option<String> {
            std::env::var(name)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        }

        if let Some(token) = nonempty("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(users) = nonempty("ALLOWED_USERS") {
            self.telegram.allowed_users = users
                .split(',')
                .map(|user| user.trim().to_string())
                .filter(|user| !user.is_empty())
                .collect();
        }
        if let Some(key) = nonempty("OPENAI_API_KEY") {
            self.openai.api_key = key;
        }
        if let Some(url) = nonempty("RELAYGRAM_API_URL") {
            self.openai.api_url = Some(url);
        }
        if let Some(model) = nonempty("OPENAI_MODEL") {
            self.openai.chat_model = model;
        }
        if let Some(role) = nonempty("BOT_ROLE") {
            self.persona.system_prompt = role;
        }
        if let Some(raw) = nonempty("MAX_MESSAGES_IN_HISTORY") {
            match raw.parse::<usize>() {
                Ok(max) => self.history.max_messages = max,
                Err(_) => tracing::warn!(value = %raw, "Ignoring invalid MAX_MESSAGES_IN_HISTORY"),
            }
        }
        if let Some(raw) = nonempty("MESSAGE_HISTORY_RETENTION_TIME") {
            match raw.parse::<u64>() {
                Ok(secs) => self.history.retention_secs = secs,
                Err(_) => {
                    tracing::warn!(value = %raw, "Ignoring invalid MESSAGE_HISTORY_RETENTION_TIME");
                }
            }
        }
        if let Some(text) = nonempty("MESSAGE_START") {
            self.messages.start = text;
        }
        if let Some(text) = nonempty("MESSAGE_HELP") {
            self.messages.help = text;
        }
        if let Some(text) = nonempty("MESSAGE_UNKNOWN_USER") {
            self.messages.unknown_user = text;
        }
        if let Some(text) = nonempty("MESSAGE_ERROR") {
            self.messages.error = text;
        }
    }

    /// Validate configuration required to actually run the relay.
    ///
    /// Missing credentials are the one fatal class: refusing to start beats
    /// failing at an arbitrary point mid-conversation. Suspicious but safe
    /// values (an empty allow-list fails every gate check closed) only warn.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!(
                "telegram.bot_token is not set (config.toml or TELEGRAM_BOT_TOKEN)"
            );
        }
        if self.openai.api_key.trim().is_empty() {
            anyhow::bail!("openai.api_key is not set (config.toml or OPENAI_API_KEY)");
        }
        if self.telegram.typing_interval_secs == 0 {
            anyhow::bail!("telegram.typing_interval_secs must be greater than 0");
        }
        if self.history.max_messages == 0 {
            anyhow::bail!("history.max_messages must be greater than 0");
        }
        if self.history.max_messages < 3 {
            tracing::warn!(
                max = self.history.max_messages,
                "history.max_messages is below the preamble-plus-one-turn floor; \
                 every reply will be evicted immediately"
            );
        }
        if self.telegram.allowed_users.is_empty() {
            tracing::warn!(
                "allow-list is empty: every sender will be refused. \
                 Set telegram.allowed_users or ALLOWED_USERS"
            );
        }
        Ok(())
    }

    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir: &Path = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;
        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        // Write-then-rename so a crash mid-save never truncates the config.
        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("config.toml");
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));
        fs::write(&temp_path, toml_str)
            .await
            .context("Failed to write config temp file")?;
        fs::rename(&temp_path, &self.config_path)
            .await
            .context("Failed to move config into place")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_bounds() {
        let config = Config::default();
        assert_eq!(config.history.max_messages, 20);
        assert_eq!(config.history.retention_secs, 3600);
        assert_eq!(config.telegram.typing_interval_secs, 3);
        assert!(!config.history.drop_failed_turn);
        assert!(!config.persona.system_prompt.is_empty());
    }

    #[test]
    fn default_config_fails_validation_without_credentials() {
        let config = Config::default();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("bot_token"), "unexpected error: {err}");
    }

    #[test]
    fn validation_passes_with_credentials() {
        let mut config = Config::default();
        config.telegram.bot_token = "123:abc".into();
        config.openai.api_key = "sk-test".into();
        config.telegram.allowed_users = vec!["alice".into()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_rejects_zero_history_bound() {
        let mut config = Config::default();
        config.telegram.bot_token = "123:abc".into();
        config.openai.api_key = "sk-test".into();
        config.history.max_messages = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_roundtrip_preserves_sections() {
        let mut config = Config::default();
        config.telegram.bot_token = "123:abc".into();
        config.telegram.allowed_users = vec!["alice".into(), "bob".into()];
        config.history.max_messages = 8;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.telegram.bot_token, "123:abc");
        assert_eq!(parsed.telegram.allowed_users, vec!["alice", "bob"]);
        assert_eq!(parsed.history.max_messages, 8);
        assert_eq!(parsed.openai.chat_model, "gpt-4o-mini");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [telegram]
            bot_token = "123:abc"
            allowed_users = ["alice"]
            "#,
        )
        .unwrap();
        assert_eq!(parsed.history.max_messages, 20);
        assert_eq!(parsed.openai.transcribe_model, "whisper-1");
        assert!(!parsed.messages.error.is_empty());
    }

    #[test]
    fn env_overrides_replace_file_values() {
        // Single test touches the process environment to avoid racing
        // parallel tests over the same variables.
        let vars = [
            ("TELEGRAM_BOT_TOKEN", "env:token"),
            ("ALLOWED_USERS", "alice, bob ,"),
            ("OPENAI_API_KEY", "sk-env"),
            ("OPENAI_MODEL", "gpt-env"),
            ("MAX_MESSAGES_IN_HISTORY", "6"),
            ("MESSAGE_HISTORY_RETENTION_TIME", "120"),
            ("MESSAGE_UNKNOWN_USER", "go away"),
        ];
        for (name, value) in vars {
            std::env::set_var(name, value);
        }

        let mut config = Config::default();
        config.apply_env_overrides();

        for (name, _) in vars {
            std::env::remove_var(name);
        }

        assert_eq!(config.telegram.bot_token, "env:token");
        assert_eq!(config.telegram.allowed_users, vec!["alice", "bob"]);
        assert_eq!(config.openai.api_key, "sk-env");
        assert_eq!(config.openai.chat_model, "gpt-env");
        assert_eq!(config.history.max_messages, 6);
        assert_eq!(config.history.retention_secs, 120);
        assert_eq!(config.messages.unknown_user, "go away");
    }

    #[tokio::test]
    async fn save_writes_parseable_toml() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.config_path = dir.path().join("config.toml");
        config.telegram.bot_token = "123:abc".into();

        config.save().await.unwrap();

        let contents = std::fs::read_to_string(&config.config_path).unwrap();
        let parsed: Config = toml::from_str(&contents).unwrap();
        assert_eq!(parsed.telegram.bot_token, "123:abc");
    }
}
