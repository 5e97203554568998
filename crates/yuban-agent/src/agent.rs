//! Per-user agent: resolve the active system prompt, build the generation
//! context, obtain a reply, and absorb every failure into a fallback string.

use crate::errors::Result;
use crate::model::{GenerateRequest, LlmBackend, SamplingOptions};
use crate::prompt::SystemPromptSource;
use std::sync::Arc;
use tracing::warn;

/// Process-wide default used when a user has no system prompt configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "你是一个有用的AI助手。";

/// Reply when the backend answered with an empty completion.
const EMPTY_REPLY_FALLBACK: &str = "抱歉，我现在无法生成回复。";
/// Reply when the backend is unreachable or returned a failure status.
const BACKEND_UNAVAILABLE_FALLBACK: &str = "抱歉，AI模型暂时不可用，请稍后再试。";
/// Reply when anything else in the turn pipeline failed.
const PIPELINE_FAILURE_FALLBACK: &str = "抱歉，处理您的消息时出现错误，请稍后再试。";

#[derive(Debug, Clone)]
pub struct AgentContext {
    pub user_prompt: String,
    pub system_prompt: String,
}

pub struct Agent {
    user_id: i64,
    backend: Arc<dyn LlmBackend>,
    prompts: Arc<dyn SystemPromptSource>,
    options: SamplingOptions,
}

impl Agent {
    pub fn new(
        user_id: i64,
        backend: Arc<dyn LlmBackend>,
        prompts: Arc<dyn SystemPromptSource>,
    ) -> Self {
        Self {
            user_id,
            backend,
            prompts,
            options: SamplingOptions::default(),
        }
    }

    /// Resolve the active system prompt and pair it with the user text.
    /// The prompt is re-read on every call, so an activation that happened
    /// after this agent was constructed is still honored.
    pub async fn build_context(&self, message: &str) -> Result<AgentContext> {
        let system_prompt = self
            .prompts
            .active_prompt(self.user_id)
            .await?
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        Ok(AgentContext {
            user_prompt: message.to_string(),
            system_prompt,
        })
    }

    /// Generate a reply for an already-built context. Backend failures are
    /// absorbed here: the caller always gets a user-facing string.
    pub async fn generate_reply(&self, context: &AgentContext) -> String {
        let request = GenerateRequest {
            user_prompt: context.user_prompt.clone(),
            system_prompt: Some(context.system_prompt.clone()),
            options: self.options,
        };

        match self.backend.generate(request).await {
            Ok(text) if text.trim().is_empty() => EMPTY_REPLY_FALLBACK.to_string(),
            Ok(text) => text,
            Err(err) => {
                warn!(user_id = self.user_id, error = %err, "LLM backend failed, using fallback reply");
                BACKEND_UNAVAILABLE_FALLBACK.to_string()
            }
        }
    }

    /// Full turn: build context, generate. Total by construction; any
    /// failure collapses into a generic fallback reply.
    pub async fn chat(&self, message: &str) -> String {
        let context = match self.build_context(message).await {
            Ok(context) => context,
            Err(err) => {
                warn!(user_id = self.user_id, error = %err, "Context construction failed");
                return PIPELINE_FAILURE_FALLBACK.to_string();
            }
        };

        self.generate_reply(&context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AgentError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedPromptSource(Mutex<Option<String>>);

    #[async_trait]
    impl SystemPromptSource for FixedPromptSource {
        async fn active_prompt(&self, _user_id: i64) -> Result<Option<String>> {
            Ok(self.0.lock().expect("lock").clone())
        }
    }

    struct FailingPromptSource;

    #[async_trait]
    impl SystemPromptSource for FailingPromptSource {
        async fn active_prompt(&self, _user_id: i64) -> Result<Option<String>> {
            Err(AgentError::PromptLookup("store offline".to_string()))
        }
    }

    struct EchoBackend;

    #[async_trait]
    impl LlmBackend for EchoBackend {
        async fn generate(&self, request: GenerateRequest) -> Result<String> {
            Ok(format!(
                "[{}] {}",
                request.system_prompt.unwrap_or_default(),
                request.user_prompt
            ))
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl LlmBackend for FailingBackend {
        async fn generate(&self, _request: GenerateRequest) -> Result<String> {
            Err(AgentError::Backend("connection refused".to_string()))
        }
    }

    struct EmptyBackend;

    #[async_trait]
    impl LlmBackend for EmptyBackend {
        async fn generate(&self, _request: GenerateRequest) -> Result<String> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn context_uses_active_prompt_when_present() {
        let agent = Agent::new(
            1,
            Arc::new(EchoBackend),
            Arc::new(FixedPromptSource(Mutex::new(Some("自定义".to_string())))),
        );
        let context = agent.build_context("你好").await.expect("context");
        assert_eq!(context.system_prompt, "自定义");
        assert_eq!(context.user_prompt, "你好");
    }

    #[tokio::test]
    async fn context_falls_back_to_default_prompt() {
        let agent = Agent::new(
            1,
            Arc::new(EchoBackend),
            Arc::new(FixedPromptSource(Mutex::new(None))),
        );
        let context = agent.build_context("你好").await.expect("context");
        assert_eq!(context.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn prompt_is_re_resolved_on_every_turn() {
        let source = Arc::new(FixedPromptSource(Mutex::new(None)));
        let agent = Agent::new(1, Arc::new(EchoBackend), source.clone());

        let first = agent.chat("你好").await;
        assert!(first.starts_with(&format!("[{DEFAULT_SYSTEM_PROMPT}]")));

        *source.0.lock().expect("lock") = Some("新激活".to_string());
        let second = agent.chat("你好").await;
        assert!(second.starts_with("[新激活]"));
    }

    #[tokio::test]
    async fn backend_failure_becomes_fallback_reply() {
        let agent = Agent::new(
            1,
            Arc::new(FailingBackend),
            Arc::new(FixedPromptSource(Mutex::new(None))),
        );
        assert_eq!(agent.chat("你好").await, BACKEND_UNAVAILABLE_FALLBACK);
    }

    #[tokio::test]
    async fn empty_completion_becomes_fallback_reply() {
        let agent = Agent::new(
            1,
            Arc::new(EmptyBackend),
            Arc::new(FixedPromptSource(Mutex::new(None))),
        );
        assert_eq!(agent.chat("你好").await, EMPTY_REPLY_FALLBACK);
    }

    #[tokio::test]
    async fn prompt_lookup_failure_never_raises() {
        let agent = Agent::new(1, Arc::new(EchoBackend), Arc::new(FailingPromptSource));
        assert_eq!(agent.chat("你好").await, PIPELINE_FAILURE_FALLBACK);
    }
}
