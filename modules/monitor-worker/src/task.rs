use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use bluesky_client::Post;

/// One unit of work as sent by the orchestrator in `PerformTask`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    /// Address of the orchestrator that receives this stage's output.
    pub talkback: String,
    pub playlist: Playlist,
    #[serde(default)]
    pub context: TaskContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub slug: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    #[serde(default)]
    pub metadata: Option<Metadata>,
    /// Outputs of earlier stages, oldest first.
    #[serde(default)]
    pub sequence: Option<Vec<Stage>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    /// Legacy single-keyword field, appended to `keywords` when present.
    #[serde(default)]
    pub keyword: Option<String>,
    /// Search window in seconds.
    #[serde(default)]
    pub since: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Metadata {
    /// Combined keyword list: `keywords` then `keyword`, trimmed, blanks and
    /// repeats removed, first occurrence wins.
    pub fn search_terms(&self) -> Vec<String> {
        let mut terms: Vec<String> = Vec::new();
        let candidates = self
            .keywords
            .iter()
            .flatten()
            .chain(self.keyword.iter());
        for raw in candidates {
            let term = raw.trim();
            if !term.is_empty() && !terms.iter().any(|t| t == term) {
                terms.push(term.to_string());
            }
        }
        terms
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    #[serde(default)]
    pub output: Value,
}

impl Task {
    pub fn slug(&self) -> &str {
        &self.playlist.slug
    }

    /// Output of the most recent stage named `name`, if any.
    pub fn stage_output(&self, name: &str) -> Option<&Value> {
        self.context
            .sequence
            .as_deref()
            .unwrap_or_default()
            .iter()
            .rev()
            .find(|stage| stage.name == name)
            .map(|stage| &stage.output)
    }
}

/// Parse a prior search stage's output into posts.
///
/// Entries that are not valid posts (no `cid`, wrong shape) are dropped with a
/// warning; a non-array output yields no posts.
pub fn parse_posts(output: Option<&Value>) -> Vec<Post> {
    let items = match output {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => return Vec::new(),
        Some(other) => {
            tracing::warn!(kind = json_kind(other), "Search output is not an array, ignoring");
            return Vec::new();
        }
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match Post::deserialize(item) {
            Ok(post) => Some(post),
            Err(e) => {
                tracing::warn!(index, error = %e, "Dropping malformed post");
                None
            }
        })
        .collect()
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(value: Value) -> Task {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn minimal_task_parses() {
        let t = task(json!({
            "name": "MonitorBluesky",
            "talkback": "orchestrator:50051",
            "playlist": { "slug": "news-1" }
        }));
        assert_eq!(t.slug(), "news-1");
        assert!(t.context.metadata.is_none());
        assert!(t.stage_output("MonitorBluesky").is_none());
    }

    #[test]
    fn task_without_slug_is_rejected() {
        let res: Result<Task, _> = serde_json::from_value(json!({
            "name": "MonitorBluesky",
            "talkback": "x",
            "playlist": {}
        }));
        assert!(res.is_err());
    }

    #[test]
    fn null_sequence_is_empty() {
        let t = task(json!({
            "name": "MonitorGemini",
            "talkback": "x",
            "playlist": { "slug": "s" },
            "context": { "metadata": null, "sequence": null }
        }));
        assert!(t.stage_output("MonitorBluesky").is_none());
    }

    #[test]
    fn stage_output_prefers_latest() {
        let t = task(json!({
            "name": "MonitorGemini",
            "talkback": "x",
            "playlist": { "slug": "s" },
            "context": { "sequence": [
                { "name": "MonitorBluesky", "output": [1] },
                { "name": "Other", "output": {} },
                { "name": "MonitorBluesky", "output": [2] }
            ] }
        }));
        assert_eq!(t.stage_output("MonitorBluesky"), Some(&json!([2])));
    }

    #[test]
    fn search_terms_merge_legacy_keyword() {
        let meta: Metadata = serde_json::from_value(json!({
            "keywords": ["flood", " storm ", "", "flood"],
            "keyword": "storm",
            "since": 600,
            "channel": "#news"
        }))
        .unwrap();
        assert_eq!(meta.search_terms(), vec!["flood", "storm"]);
        assert_eq!(meta.since, Some(600));
        assert_eq!(meta.extra["channel"], "#news");
    }

    #[test]
    fn search_terms_from_legacy_keyword_only() {
        let meta: Metadata = serde_json::from_value(json!({ "keyword": "quake" })).unwrap();
        assert_eq!(meta.search_terms(), vec!["quake"]);
        assert!(Metadata::default().search_terms().is_empty());
    }

    #[test]
    fn parse_posts_drops_entries_without_cid() {
        let output = json!([
            { "cid": "c1", "record": { "text": "a" } },
            { "record": { "text": "no cid" } },
            "not a post",
            { "cid": "c2" }
        ]);
        let posts = parse_posts(Some(&output));
        let cids: Vec<&str> = posts.iter().map(|p| p.cid.as_str()).collect();
        assert_eq!(cids, vec!["c1", "c2"]);
    }

    #[test]
    fn parse_posts_of_non_array_is_empty() {
        assert!(parse_posts(Some(&json!({ "cid": "c1" }))).is_empty());
        assert!(parse_posts(Some(&Value::Null)).is_empty());
        assert!(parse_posts(None).is_empty());
    }
}
