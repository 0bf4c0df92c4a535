use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// --- Session ---

/// Credential pair returned by createSession / refreshSession.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Session {
    #[serde(rename = "accessJwt")]
    pub access_token: String,
    #[serde(rename = "refreshJwt")]
    pub refresh_token: String,
    pub did: Option<String>,
    pub handle: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateSessionInput<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
}

/// How the client re-authenticates after the service reports an expired token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReauthStrategy {
    /// Fresh createSession with the stored credentials.
    #[default]
    Login,
    /// refreshSession first, falling back to a fresh login if refresh fails.
    Refresh,
}

impl std::str::FromStr for ReauthStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "login" => Ok(ReauthStrategy::Login),
            "refresh" => Ok(ReauthStrategy::Refresh),
            other => Err(format!("unknown reauth strategy: {other}")),
        }
    }
}

// --- Posts ---

/// A post view as returned by app.bsky.feed.searchPosts.
///
/// Only `cid` is modelled; every other platform field is carried verbatim so the
/// record can be handed back to the orchestrator unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub cid: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Post {
    pub fn uri(&self) -> Option<&str> {
        self.fields.get("uri").and_then(Value::as_str)
    }

    /// Post text. Search results nest it under `record.text`; flattened
    /// records keep it at the top level.
    pub fn text(&self) -> Option<&str> {
        self.fields
            .get("record")
            .and_then(|r| r.get("text"))
            .or_else(|| self.fields.get("text"))
            .and_then(Value::as_str)
    }

    pub fn author_handle(&self) -> Option<&str> {
        self.fields
            .get("author")
            .and_then(|a| a.get("handle"))
            .and_then(Value::as_str)
    }

    pub fn created_at(&self) -> Option<&str> {
        self.fields
            .get("record")
            .and_then(|r| r.get("createdAt"))
            .or_else(|| self.fields.get("indexedAt"))
            .and_then(Value::as_str)
    }

    /// Canonical serialization used for whole-record equality checks.
    /// Object keys serialize in sorted order, so equal records produce equal strings.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.cid.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SearchPostsResponse {
    #[serde(default)]
    pub posts: Vec<Post>,
}

/// XRPC error body, e.g. `{"error":"ExpiredToken","message":"Token has expired"}`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct XrpcErrorBody {
    pub error: Option<String>,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post(value: Value) -> Post {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn text_prefers_record_text() {
        let p = post(json!({
            "cid": "c1",
            "record": { "text": "from record", "createdAt": "2024-05-01T12:00:00Z" },
            "text": "top level"
        }));
        assert_eq!(p.text(), Some("from record"));
        assert_eq!(p.created_at(), Some("2024-05-01T12:00:00Z"));
    }

    #[test]
    fn text_falls_back_to_top_level() {
        let p = post(json!({ "cid": "c1", "text": "flat" }));
        assert_eq!(p.text(), Some("flat"));
        assert_eq!(p.author_handle(), None);
    }

    #[test]
    fn post_without_cid_is_rejected() {
        let res: Result<Post, _> = serde_json::from_value(json!({ "text": "orphan" }));
        assert!(res.is_err());
    }

    #[test]
    fn fingerprint_ignores_key_order() {
        let a = post(json!({ "cid": "c1", "a": 1, "b": { "x": 1, "y": 2 } }));
        let b = post(json!({ "b": { "y": 2, "x": 1 }, "a": 1, "cid": "c1" }));
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn post_round_trips_unknown_fields() {
        let raw = json!({ "cid": "c1", "uri": "at://x/app.bsky.feed.post/1", "likeCount": 3 });
        let p = post(raw.clone());
        assert_eq!(p.uri(), Some("at://x/app.bsky.feed.post/1"));
        assert_eq!(serde_json::to_value(&p).unwrap(), raw);
    }

    #[test]
    fn reauth_strategy_parses() {
        assert_eq!("login".parse::<ReauthStrategy>(), Ok(ReauthStrategy::Login));
        assert_eq!(" Refresh ".parse::<ReauthStrategy>(), Ok(ReauthStrategy::Refresh));
        assert!("magic".parse::<ReauthStrategy>().is_err());
    }
}
