//! Application state: shared stores plus per-request pipeline wiring.

use crate::settings::{Settings, SettingsStore};
use crate::system_prompt_store::SystemPromptStore;
use crate::conversation_store::ConversationStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use yuban_agent::{Agent, AgentError, OllamaBackend, SystemPromptSource};
use yuban_speech::{
    EmotionAudioSelector, EmotionClassifier, HttpClassifier, IndexTtsBackend, TtsOrchestrator,
};

/// Shared application state with backpressure on inbound requests.
#[derive(Clone)]
pub struct AppState {
    /// SQLite-backed conversation/message store.
    pub conversation_store: Arc<ConversationStore>,
    /// SQLite-backed system prompt store.
    pub system_prompt_store: Arc<SystemPromptStore>,
    /// TOML-backed runtime configuration, re-read per request.
    pub settings: SettingsStore,
    /// Concurrency limiter to prevent resource exhaustion.
    pub request_semaphore: Arc<Semaphore>,
    /// Request timeout configuration (seconds).
    pub request_timeout_secs: u64,
}

impl AppState {
    pub fn new() -> anyhow::Result<Self> {
        let max_concurrent = std::env::var("MAX_CONCURRENT_REQUESTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100);

        let timeout = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(300);

        Ok(Self {
            conversation_store: Arc::new(ConversationStore::initialize()?),
            system_prompt_store: Arc::new(SystemPromptStore::initialize()?),
            settings: SettingsStore::initialize(),
            request_semaphore: Arc::new(Semaphore::new(max_concurrent)),
            request_timeout_secs: timeout,
        })
    }

    /// State wired to explicit paths, bypassing the env/XDG resolution.
    #[cfg(test)]
    pub(crate) fn with_paths(
        db_path: std::path::PathBuf,
        config_path: std::path::PathBuf,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            conversation_store: Arc::new(ConversationStore::initialize_at(db_path.clone())?),
            system_prompt_store: Arc::new(SystemPromptStore::initialize_at(db_path)?),
            settings: SettingsStore::at(config_path),
            request_semaphore: Arc::new(Semaphore::new(4)),
            request_timeout_secs: 30,
        })
    }

    /// Acquire a permit for concurrent request processing.
    pub async fn acquire_permit(&self) -> tokio::sync::SemaphorePermit<'_> {
        self.request_semaphore
            .acquire()
            .await
            .expect("Semaphore should never be closed")
    }

    /// Builds a chat agent from the current settings. Constructed per
    /// request so configuration and prompt changes apply to the next
    /// message without a restart.
    pub async fn agent(&self, user_id: i64, model_override: Option<String>) -> anyhow::Result<Agent> {
        let settings = self.settings.load().await?;
        let model = model_override.unwrap_or(settings.llm.default_model);
        let backend = OllamaBackend::new(
            &settings.llm.base_url,
            model,
            Duration::from_secs(settings.llm.timeout_secs),
        )?;

        Ok(Agent::new(
            user_id,
            Arc::new(backend),
            Arc::new(PromptSourceAdapter {
                store: self.system_prompt_store.clone(),
            }),
        ))
    }

    /// Builds the synthesis pipeline from the current settings.
    pub async fn tts_orchestrator(&self) -> anyhow::Result<TtsOrchestrator> {
        let settings = self.settings.load().await?;
        self.tts_orchestrator_with(&settings)
    }

    pub fn tts_orchestrator_with(&self, settings: &Settings) -> anyhow::Result<TtsOrchestrator> {
        let timeout = Duration::from_secs(settings.tts.timeout_secs);
        let classifier: Option<Arc<dyn EmotionClassifier>> = match &settings.tts.classifier_url {
            Some(url) => Some(Arc::new(HttpClassifier::new(url, timeout)?)),
            None => None,
        };
        let selector = EmotionAudioSelector::new(classifier, settings.tts.emotion_audio.clone());
        let backend = IndexTtsBackend::new(&settings.tts.base_url, timeout)?;

        Ok(TtsOrchestrator::new(
            selector,
            Arc::new(backend),
            settings.tts.default_speaker.clone(),
        ))
    }
}

/// Lets the agent read the active system prompt straight from storage.
struct PromptSourceAdapter {
    store: Arc<SystemPromptStore>,
}

#[async_trait]
impl SystemPromptSource for PromptSourceAdapter {
    async fn active_prompt(&self, user_id: i64) -> yuban_agent::Result<Option<String>> {
        let prompt = self
            .store
            .get_active_prompt(user_id)
            .await
            .map_err(|err| AgentError::PromptLookup(err.to_string()))?;
        Ok(prompt.map(|p| p.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn prompt_adapter_surfaces_the_active_prompt_content() {
        let dir = TempDir::new().expect("temp dir");
        let store = Arc::new(
            SystemPromptStore::initialize_at(dir.path().join("prompts.sqlite3"))
                .expect("store should initialize"),
        );
        let adapter = PromptSourceAdapter { store: store.clone() };

        assert!(adapter.active_prompt(1).await.expect("lookup").is_none());

        let prompt = store
            .create_prompt(
                1,
                crate::system_prompt_store::NewSystemPrompt {
                    name: "助手".to_string(),
                    content: "你是一位耐心的老师。".to_string(),
                    ..Default::default()
                },
            )
            .await
            .expect("create");
        store.set_active_prompt(prompt.id, 1).await.expect("activate");

        let resolved = adapter.active_prompt(1).await.expect("lookup");
        assert_eq!(resolved.as_deref(), Some("你是一位耐心的老师。"));
    }
}
