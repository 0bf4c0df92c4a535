//! Newsworthiness screening of search results through Gemini.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use bluesky_client::Post;
use gemini_client::{recover_json, GeminiClient};

use crate::task::json_kind;

/// Screens posts for newsworthiness.
///
/// Implementations never fail: any error is logged and reported as an empty
/// array. The returned JSON is whatever the model produced, usually a single
/// object but sometimes an array; [`FilterResult::from_model_output`] settles
/// the shape.
#[async_trait]
pub trait NewsFilter: Send + Sync {
    async fn filter_newsworthy(&self, posts: &[Post]) -> Value;
}

const INSTRUCTIONS: &str = "\
You are a news desk editor screening social media posts for a live news monitor.

Each post below is one JSON object with its content identifier (cid), author, \
creation time and text.

1. Identify posts that report newsworthy facts or events.
2. Among those, mark BREAKING news: developing events that need immediate \
attention. Consider the event type (disaster, accident, violence, public safety, \
politics, markets, infrastructure) and its urgency.
3. Exclude opinion, commentary, jokes, promotion and personal updates.

Respond with exactly one JSON object and nothing else:
{
  \"breaking\": [cid of each breaking news post],
  \"cids\": [cid of each other newsworthy post],
  \"keywords\": [at most 15 strings of the form \"category/keyword\", ranked by urgency then newsworthiness]
}

Use only cids that appear in the posts. If nothing is newsworthy, return empty arrays.

Posts:
";

/// The part of a post the model gets to see. Embeds are left out.
#[derive(Debug, Serialize)]
struct PostDigest<'a> {
    cid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<&'a str>,
    text: &'a str,
}

impl<'a> From<&'a Post> for PostDigest<'a> {
    fn from(post: &'a Post) -> Self {
        Self {
            cid: &post.cid,
            author: post.author_handle(),
            created_at: post.created_at(),
            text: post.text().unwrap_or_default(),
        }
    }
}

/// Instruction block followed by one digest line per post.
pub fn build_prompt(posts: &[Post]) -> String {
    let mut prompt = String::from(INSTRUCTIONS);
    for post in posts {
        match serde_json::to_string(&PostDigest::from(post)) {
            Ok(line) => {
                prompt.push_str(&line);
                prompt.push('\n');
            }
            Err(e) => tracing::warn!(cid = %post.cid, error = %e, "Could not encode post for prompt"),
        }
    }
    prompt
}

/// Gemini-backed [`NewsFilter`].
pub struct NewsworthinessFilter {
    gemini: GeminiClient,
}

impl NewsworthinessFilter {
    pub fn new(gemini: GeminiClient) -> Self {
        Self { gemini }
    }
}

#[async_trait]
impl NewsFilter for NewsworthinessFilter {
    async fn filter_newsworthy(&self, posts: &[Post]) -> Value {
        if posts.is_empty() {
            return Value::Array(Vec::new());
        }

        let prompt = build_prompt(posts);
        tracing::info!(posts = posts.len(), model = self.gemini.model(), "Screening posts for newsworthiness");

        match self.gemini.generate(&prompt).await {
            Ok(answer) => recover_json(&answer),
            Err(e) => {
                tracing::warn!(error = %e, "Newsworthiness request failed");
                Value::Array(Vec::new())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FilterResult
// ---------------------------------------------------------------------------

/// Screening verdict before hydration: cid lists plus ranked keywords.
/// Fields the model adds beyond these are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaking: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FilterResult {
    /// Settle the model's output shape: an object is used as is, an array
    /// contributes its first element, anything else is empty.
    pub fn from_model_output(output: Value) -> Self {
        match output {
            Value::Object(_) => Self::from_value(output),
            Value::Array(items) => items
                .into_iter()
                .next()
                .map(Self::from_value)
                .unwrap_or_default(),
            other => {
                tracing::warn!(kind = json_kind(&other), "Unexpected filter output shape");
                Self::default()
            }
        }
    }

    /// Field-by-field parse of a filter object.
    ///
    /// A known field that is not an array of strings is flagged and carried
    /// through untouched in `extra` instead of being interpreted.
    pub fn from_value(value: Value) -> Self {
        let mut map = match value {
            Value::Object(map) => map,
            other => {
                tracing::warn!(kind = json_kind(&other), "Filter result is not an object");
                return Self::default();
            }
        };

        let cids = take_string_list(&mut map, "cids");
        let breaking = take_string_list(&mut map, "breaking");
        let keywords = take_string_list(&mut map, "keywords");

        Self {
            cids,
            breaking,
            keywords,
            extra: map,
        }
    }
}

fn take_string_list(map: &mut Map<String, Value>, key: &str) -> Option<Vec<String>> {
    let value = map.remove(key)?;
    match value {
        Value::Null => None,
        Value::Array(ref items) if items.iter().all(Value::is_string) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        other => {
            tracing::warn!(field = key, kind = json_kind(&other), "Filter field is not a list of cids, leaving it as is");
            map.insert(key.to_string(), other);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post(value: Value) -> Post {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn prompt_lists_every_post_without_embeds() {
        let posts = vec![
            post(json!({
                "cid": "c1",
                "author": { "handle": "city.gov" },
                "record": { "text": "Evacuation ordered for Zone A", "createdAt": "2024-05-01T12:00:00Z",
                            "embed": { "images": [{ "alt": "secret-alt-text" }] } },
                "embed": { "external": { "uri": "https://example.com/embedded" } }
            })),
            post(json!({ "cid": "c2", "text": "Road closed" })),
        ];

        let prompt = build_prompt(&posts);
        assert!(prompt.starts_with(INSTRUCTIONS));
        assert!(prompt.contains("\"cid\":\"c1\""));
        assert!(prompt.contains("Evacuation ordered for Zone A"));
        assert!(prompt.contains("\"author\":\"city.gov\""));
        assert!(prompt.contains("Road closed"));
        assert!(!prompt.contains("secret-alt-text"));
        assert!(!prompt.contains("example.com/embedded"));
    }

    #[test]
    fn object_output_is_used_directly() {
        let result = FilterResult::from_model_output(json!({
            "cids": ["c1"],
            "breaking": ["c2"],
            "keywords": ["weather/flood"]
        }));
        assert_eq!(result.cids, Some(vec!["c1".to_string()]));
        assert_eq!(result.breaking, Some(vec!["c2".to_string()]));
        assert_eq!(result.keywords, Some(vec!["weather/flood".to_string()]));
        assert!(result.extra.is_empty());
    }

    #[test]
    fn array_output_takes_first_element() {
        let result = FilterResult::from_model_output(json!([
            { "cids": ["c1"] },
            { "cids": ["c9"] }
        ]));
        assert_eq!(result.cids, Some(vec!["c1".to_string()]));
    }

    #[test]
    fn empty_array_output_is_empty_object() {
        let result = FilterResult::from_model_output(json!([]));
        assert_eq!(result, FilterResult::default());
        assert_eq!(serde_json::to_value(&result).unwrap(), json!({}));
    }

    #[test]
    fn scalar_output_is_empty() {
        assert_eq!(FilterResult::from_model_output(json!("nope")), FilterResult::default());
    }

    #[test]
    fn malformed_fields_are_carried_through() {
        let result = FilterResult::from_value(json!({
            "cids": "c1",
            "breaking": [{ "cid": "c2", "text": "already hydrated" }],
            "keywords": null,
            "summary": "quiet day"
        }));
        assert_eq!(result.cids, None);
        assert_eq!(result.breaking, None);
        assert_eq!(result.keywords, None);
        assert_eq!(result.extra["cids"], json!("c1"));
        assert_eq!(result.extra["breaking"][0]["cid"], "c2");
        assert_eq!(result.extra["summary"], "quiet day");
    }

    #[test]
    fn serialization_round_trips_extra_fields() {
        let raw = json!({ "cids": ["a"], "keywords": [], "confidence": 0.9 });
        let result = FilterResult::from_value(raw.clone());
        assert_eq!(serde_json::to_value(&result).unwrap(), raw);
    }
}
