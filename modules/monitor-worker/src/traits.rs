// Trait seams between the pipeline and the outside world.
//
// PostSearcher abstracts the Bluesky client; NewsFilter (filter.rs) abstracts
// Gemini; Notifier (notify/) abstracts the orchestrator. Tests swap in the
// mocks from testing.rs.

use async_trait::async_trait;

use bluesky_client::{BlueskyClient, Post};

#[async_trait]
pub trait PostSearcher: Send + Sync {
    /// Search every term over the last `window_secs` seconds; results are
    /// flattened and free of duplicate records. Never fails: terms whose
    /// search fails contribute nothing.
    async fn search_multiple(&self, terms: &[String], window_secs: u64) -> Vec<Post>;
}

#[async_trait]
impl PostSearcher for BlueskyClient {
    async fn search_multiple(&self, terms: &[String], window_secs: u64) -> Vec<Post> {
        BlueskyClient::search_multiple(self, terms, window_secs).await
    }
}
