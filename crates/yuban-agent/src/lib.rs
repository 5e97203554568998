pub mod agent;
pub mod errors;
pub mod model;
pub mod ollama;
pub mod prompt;

pub use agent::{Agent, AgentContext, DEFAULT_SYSTEM_PROMPT};
pub use errors::{AgentError, Result};
pub use model::{GenerateRequest, LlmBackend, SamplingOptions};
pub use ollama::OllamaBackend;
pub use prompt::SystemPromptSource;
