use async_trait::async_trait;
use serde_json::Value;

use super::NotifyError;

/// Delivers one stage's output back to the orchestrator that issued the task.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Report `output` for stage `stage` of playlist `slug` to the
    /// orchestrator at `url`. One attempt, no retry.
    async fn talkback(
        &self,
        url: &str,
        slug: &str,
        stage: &str,
        output: &Value,
    ) -> Result<(), NotifyError>;
}
