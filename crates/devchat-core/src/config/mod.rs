use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DevchatError, Result};
use crate::llm::{ChatConfig, OpenAIChat};
use crate::store::FileStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub chat: ChatSettings,
    #[serde(default)]
    pub history: HistorySettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub user: UserSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub model: String,
    pub api_key_env: String,
    pub base_url: String,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// How many messages from earlier prompts may be folded into a new one.
    pub message_limit: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            stream: true,
            temperature: None,
            max_tokens: None,
        }
    }
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self { message_limit: 10 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Overrides for the identity otherwise read from git.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chat: ChatSettings::default(),
            history: HistorySettings::default(),
            store: StoreSettings::default(),
            user: UserSettings::default(),
        }
    }
}

impl Settings {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("devchat")
            .join("config.toml")
    }

    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Read settings from `path`, falling back to defaults when the file is
    /// missing or unparsable.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!("Ignoring invalid config {}: {}", path.display(), e),
                },
                Err(e) => tracing::warn!("Failed to read config {}: {}", path.display(), e),
            }
        }
        Self::default()
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| DevchatError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the API key from the environment variable specified in settings.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.chat.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }

    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig {
            model: self.chat.model.clone(),
            stream: self.chat.stream,
            temperature: self.chat.temperature,
            max_tokens: self.chat.max_tokens,
        }
    }

    pub fn build_chat(&self) -> OpenAIChat {
        OpenAIChat::new(self.chat_config())
            .with_api_key(self.api_key())
            .with_base_url(&self.chat.base_url)
    }

    pub fn build_store(&self) -> Result<FileStore> {
        match self.store.path {
            Some(ref path) => FileStore::with_dir(path),
            None => FileStore::new(),
        }
    }
}
