// Test mocks for the monitor pipeline.
//
// One mock per trait boundary:
// - MockSearcher (PostSearcher) — term→posts map, records every call
// - MockFilter (NewsFilter) — canned model output, records what it screened
// - RecordingNotifier (Notifier) — captures talkbacks, can be told to fail
//
// Plus small builders for posts and task payloads.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use bluesky_client::{dedup_posts, Post};

use crate::filter::NewsFilter;
use crate::notify::{Notifier, NotifyError};
use crate::traits::PostSearcher;

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// A search-result shaped post with the given cid and text.
pub fn post(cid: &str, text: &str) -> Post {
    serde_json::from_value(json!({
        "cid": cid,
        "uri": format!("at://did:plc:test/app.bsky.feed.post/{cid}"),
        "author": { "handle": "reporter.bsky.social" },
        "record": { "text": text, "createdAt": "2024-05-01T12:00:00Z" }
    }))
    .expect("valid post")
}

/// A serialized task as the orchestrator would send it.
pub fn task_payload(name: &str, slug: &str, talkback: &str, context: Value) -> String {
    json!({
        "name": name,
        "talkback": talkback,
        "playlist": { "slug": slug },
        "context": context
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// MockSearcher
// ---------------------------------------------------------------------------

/// HashMap-based searcher. Unregistered terms return no posts.
pub struct MockSearcher {
    results: HashMap<String, Vec<Post>>,
    calls: Mutex<Vec<(Vec<String>, u64)>>,
}

impl MockSearcher {
    pub fn new() -> Self {
        Self {
            results: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_term(mut self, term: &str, posts: Vec<Post>) -> Self {
        self.results.insert(term.to_string(), posts);
        self
    }

    /// Every `(terms, window_secs)` the pipeline searched with.
    pub fn calls(&self) -> Vec<(Vec<String>, u64)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockSearcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PostSearcher for MockSearcher {
    async fn search_multiple(&self, terms: &[String], window_secs: u64) -> Vec<Post> {
        self.calls
            .lock()
            .unwrap()
            .push((terms.to_vec(), window_secs));
        let found = terms
            .iter()
            .flat_map(|t| self.results.get(t).cloned().unwrap_or_default())
            .collect();
        dedup_posts(found)
    }
}

// ---------------------------------------------------------------------------
// MockFilter
// ---------------------------------------------------------------------------

/// Returns the same model output for every non-empty batch, and an empty
/// array for an empty one, like the real filter.
pub struct MockFilter {
    output: Value,
    screened: Mutex<Vec<Vec<String>>>,
}

impl MockFilter {
    pub fn returning(output: Value) -> Self {
        Self {
            output,
            screened: Mutex::new(Vec::new()),
        }
    }

    /// cids of each batch handed to the filter.
    pub fn screened(&self) -> Vec<Vec<String>> {
        self.screened.lock().unwrap().clone()
    }
}

#[async_trait]
impl NewsFilter for MockFilter {
    async fn filter_newsworthy(&self, posts: &[Post]) -> Value {
        self.screened
            .lock()
            .unwrap()
            .push(posts.iter().map(|p| p.cid.clone()).collect());
        if posts.is_empty() {
            return Value::Array(Vec::new());
        }
        self.output.clone()
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Talkback {
    pub url: String,
    pub slug: String,
    pub stage: String,
    pub output: Value,
}

/// Captures every talkback. `failing()` records and then returns an error.
pub struct RecordingNotifier {
    sent: Mutex<Vec<Talkback>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Talkback> {
        self.sent.lock().unwrap().clone()
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn talkback(
        &self,
        url: &str,
        slug: &str,
        stage: &str,
        output: &Value,
    ) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(Talkback {
            url: url.to_string(),
            slug: slug.to_string(),
            stage: stage.to_string(),
            output: output.clone(),
        });
        if self.fail {
            return Err(NotifyError::Rejected {
                status: 503,
                message: "orchestrator unavailable".to_string(),
            });
        }
        Ok(())
    }
}
