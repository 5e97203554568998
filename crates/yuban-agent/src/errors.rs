use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Prompt lookup error: {0}")]
    PromptLookup(String),
    #[error("LLM backend error: {0}")]
    Backend(String),
}
