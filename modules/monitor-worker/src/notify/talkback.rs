use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::backend::Notifier;
use super::NotifyError;

/// Port used when a talkback address does not name one.
pub const DEFAULT_TALKBACK_PORT: u16 = 50051;

const SEGUE_PLAYLIST_PATH: &str = "/rpc/SeguePlaylist";

/// Wire message of the orchestrator's `SeguePlaylist` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeguePlaylistRequest {
    pub slug: String,
    pub operation: String,
    /// JSON-encoded stage output.
    pub output: String,
}

/// Resolve a talkback address (`host`, `host:port`, `grpc://host:port`,
/// `dns:///host:port`, ...) to the plaintext SeguePlaylist endpoint.
pub fn talkback_endpoint(address: &str) -> Result<String, NotifyError> {
    let invalid = |reason: String| NotifyError::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    let trimmed = address.trim();
    let authority = trimmed
        .split_once("://")
        .map_or(trimmed, |(_, rest)| rest)
        .trim_start_matches('/');
    if authority.is_empty() {
        return Err(invalid("empty address".to_string()));
    }

    // A non-special scheme keeps explicit ports verbatim (no :80 elision).
    let parsed = Url::parse(&format!("grpc://{authority}")).map_err(|e| invalid(e.to_string()))?;
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| invalid("missing host".to_string()))?;
    let port = parsed.port().unwrap_or(DEFAULT_TALKBACK_PORT);

    Ok(format!("http://{host}:{port}{SEGUE_PLAYLIST_PATH}"))
}

/// Sends stage outputs to the orchestrator's SeguePlaylist RPC.
pub struct TalkbackClient {
    client: reqwest::Client,
}

impl TalkbackClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

impl Default for TalkbackClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for TalkbackClient {
    async fn talkback(
        &self,
        url: &str,
        slug: &str,
        stage: &str,
        output: &Value,
    ) -> Result<(), NotifyError> {
        let endpoint = talkback_endpoint(url)?;
        let request = SeguePlaylistRequest {
            slug: slug.to_string(),
            operation: stage.to_string(),
            output: serde_json::to_string(output)?,
        };

        let resp = self.client.post(&endpoint).json(&request).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        tracing::debug!(%endpoint, slug, stage, bytes = request.output.len(), "Talkback delivered");
        Ok(())
    }
}
