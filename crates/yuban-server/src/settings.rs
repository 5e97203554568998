//! Runtime configuration, persisted as a TOML document.
//!
//! The store re-reads the document on every access so edits made through
//! the config endpoints (or by hand) take effect on the next request
//! without a restart. Saving rewrites the whole document.

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::task;
use yuban_speech::EmotionAudioMap;

pub const DEFAULT_LLM_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_LLM_MODEL: &str = "qwen2.5:1.5b";
pub const DEFAULT_TTS_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TTS_SPEAKER: &str = "voices/jay_prompt.wav";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub default_model: String,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            default_model: DEFAULT_LLM_MODEL.to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsSettings {
    pub base_url: String,
    pub default_speaker: String,
    pub timeout_secs: u64,
    /// Emotion classifier service; keyword fallback only when unset.
    pub classifier_url: Option<String>,
    pub emotion_audio: EmotionAudioMap,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_TTS_BASE_URL.to_string(),
            default_speaker: DEFAULT_TTS_SPEAKER.to_string(),
            timeout_secs: 120,
            classifier_url: None,
            emotion_audio: EmotionAudioMap::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub tts: TtsSettings,
}

pub fn resolve_config_path() -> PathBuf {
    if let Ok(custom) = std::env::var("YUBAN_CONFIG_PATH") {
        if !custom.trim().is_empty() {
            return PathBuf::from(custom);
        }
    }

    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("yuban")
        .join("settings.toml")
}

#[derive(Clone)]
pub struct SettingsStore {
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn initialize() -> Self {
        Self::at(resolve_config_path())
    }

    pub fn at(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Current settings, read fresh from disk. A missing document yields
    /// the defaults; a corrupt document is an error rather than a silent
    /// reset.
    pub async fn load(&self) -> anyhow::Result<Settings> {
        let path = self.config_path.clone();
        task::spawn_blocking(move || load_settings(&path))
            .await
            .map_err(|err| anyhow!("Settings read worker failed: {err}"))?
    }

    /// Persists the full settings document, creating parent directories
    /// as needed.
    pub async fn save(&self, settings: Settings) -> anyhow::Result<()> {
        let path = self.config_path.clone();
        task::spawn_blocking(move || save_settings(&path, &settings))
            .await
            .map_err(|err| anyhow!("Settings write worker failed: {err}"))?
    }
}

fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
    toml::from_str(&raw)
        .with_context(|| format!("Failed to parse settings file: {}", path.display()))
}

fn save_settings(path: &Path, settings: &Settings) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create settings directory: {}", parent.display()))?;
    }

    let raw = toml::to_string_pretty(settings).context("Failed to serialize settings")?;
    std::fs::write(path, raw)
        .with_context(|| format!("Failed to write settings file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_document_yields_defaults() {
        let dir = TempDir::new().expect("temp dir");
        let store = SettingsStore::at(dir.path().join("settings.toml"));

        let settings = store.load().await.expect("load");
        assert_eq!(settings.llm.base_url, DEFAULT_LLM_BASE_URL);
        assert_eq!(settings.llm.default_model, DEFAULT_LLM_MODEL);
        assert_eq!(settings.tts.base_url, DEFAULT_TTS_BASE_URL);
    }

    #[tokio::test]
    async fn saved_settings_are_visible_on_the_next_load() {
        let dir = TempDir::new().expect("temp dir");
        let store = SettingsStore::at(dir.path().join("nested").join("settings.toml"));

        let mut settings = store.load().await.expect("load");
        settings.llm.default_model = "qwen2.5:7b".to_string();
        settings.tts.default_speaker = "voices/custom.wav".to_string();
        store.save(settings).await.expect("save");

        let reloaded = store.load().await.expect("reload");
        assert_eq!(reloaded.llm.default_model, "qwen2.5:7b");
        assert_eq!(reloaded.tts.default_speaker, "voices/custom.wav");
    }

    #[tokio::test]
    async fn partial_document_fills_in_defaults() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[llm]\ndefault_model = \"llama3\"\n").expect("write");

        let store = SettingsStore::at(path);
        let settings = store.load().await.expect("load");
        assert_eq!(settings.llm.default_model, "llama3");
        assert_eq!(settings.llm.base_url, DEFAULT_LLM_BASE_URL);
        assert_eq!(settings.tts.base_url, DEFAULT_TTS_BASE_URL);
    }

    #[tokio::test]
    async fn corrupt_document_is_an_error() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "this is not toml {{{").expect("write");

        let store = SettingsStore::at(path);
        assert!(store.load().await.is_err());
    }
}
