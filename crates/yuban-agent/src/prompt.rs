use crate::errors::Result;
use async_trait::async_trait;

/// Read-side seam over the system-prompt store. The agent re-resolves the
/// active prompt through this trait on every turn, so a prompt switched
/// mid-session takes effect on the next message.
#[async_trait]
pub trait SystemPromptSource: Send + Sync {
    async fn active_prompt(&self, user_id: i64) -> Result<Option<String>>;
}
