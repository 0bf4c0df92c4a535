//! Stage execution: search, screen, hydrate and report.

pub mod hydrate;
pub mod stage;

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use bluesky_client::Post;

use crate::filter::{FilterResult, NewsFilter};
use crate::notify::Notifier;
use crate::stats::{PipelineStats, StageOutcome};
use crate::traits::PostSearcher;

pub use hydrate::{hydrate, HydratedResult};
pub use stage::{ResolveError, SearchInput, StageJob, StageKind, StageRequest};

/// Runs resolved stage jobs against the shared service clients.
pub struct Pipeline {
    searcher: Arc<dyn PostSearcher>,
    filter: Arc<dyn NewsFilter>,
    notifier: Arc<dyn Notifier>,
    stats: Arc<PipelineStats>,
}

impl Pipeline {
    pub fn new(
        searcher: Arc<dyn PostSearcher>,
        filter: Arc<dyn NewsFilter>,
        notifier: Arc<dyn Notifier>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            searcher,
            filter,
            notifier,
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    /// Execute one stage and report its output. Never fails; the outcome is
    /// logged, counted and returned.
    pub async fn run(&self, job: StageJob) -> StageOutcome {
        let kind = job.kind();
        let StageJob {
            talkback,
            slug,
            request,
        } = job;

        let output = match request {
            StageRequest::Search(input) => self.search(&input).await.map(|posts| encode(&posts)),
            StageRequest::Filter(input) => Some(encode(&self.screen(&input.posts).await)),
            StageRequest::Hydrate(input) => Some(encode(&hydrate(input.filter, &input.posts))),
            StageRequest::Deliver(input) => {
                match input.hydrated.as_ref().and_then(|h| h.get("posts")).and_then(Value::as_array) {
                    Some(posts) => info!(slug = %slug, posts = posts.len(), "Delivering hydrated result"),
                    None => warn!(slug = %slug, "No hydrated posts in sequence, delivering placeholder"),
                }
                Some(Ok(json!({})))
            }
            StageRequest::Tutti(input) => match self.search(&input).await {
                Some(posts) => {
                    let filter = self.screen(&posts).await;
                    Some(encode(&hydrate(filter, &posts)))
                }
                None => None,
            },
        };

        let outcome = match output {
            None => StageOutcome::Skipped("no keywords"),
            Some(Err(e)) => {
                warn!(slug = %slug, stage = %kind, error = %e, "Could not encode stage output");
                StageOutcome::Skipped("unencodable output")
            }
            Some(Ok(output)) => self.report(&talkback, &slug, kind, &output).await,
        };

        self.stats.record(kind, &outcome);
        info!(slug = %slug, stage = %kind, outcome = ?outcome, "Stage finished");
        outcome
    }

    /// `None` when there is nothing to search for; the searcher is not called.
    async fn search(&self, input: &SearchInput) -> Option<Vec<Post>> {
        if input.keywords.is_empty() {
            return None;
        }
        let posts = self
            .searcher
            .search_multiple(&input.keywords, input.window_secs)
            .await;
        info!(terms = input.keywords.len(), posts = posts.len(), "Search complete");
        Some(posts)
    }

    async fn screen(&self, posts: &[Post]) -> FilterResult {
        FilterResult::from_model_output(self.filter.filter_newsworthy(posts).await)
    }

    async fn report(&self, talkback: &str, slug: &str, kind: StageKind, output: &Value) -> StageOutcome {
        match self.notifier.talkback(talkback, slug, kind.name(), output).await {
            Ok(()) => StageOutcome::Reported,
            Err(e) => {
                warn!(slug, stage = %kind, talkback, error = %e, "Talkback failed");
                StageOutcome::NotifyFailed
            }
        }
    }
}

fn encode<T: Serialize>(value: &T) -> serde_json::Result<Value> {
    serde_json::to_value(value)
}
