pub mod error;
pub mod types;

pub use error::{BlueskyError, Result};
pub use types::{Post, ReauthStrategy, Session};

use std::collections::HashSet;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tokio::sync::{Mutex, RwLock};
use types::{CreateSessionInput, SearchPostsResponse, XrpcErrorBody};

const BASE_URL: &str = "https://bsky.social";

const CREATE_SESSION: &str = "com.atproto.server.createSession";
const REFRESH_SESSION: &str = "com.atproto.server.refreshSession";
const SEARCH_POSTS: &str = "app.bsky.feed.searchPosts";

/// Longest accepted search window (100 years); larger values are clamped.
const MAX_WINDOW_SECS: u64 = 100 * 365 * 24 * 3600;

/// XRPC error name the service uses for an expired access token.
const EXPIRED_TOKEN: &str = "ExpiredToken";

/// Bluesky search client holding one renewable session.
///
/// The session starts unauthenticated; [`BlueskyClient::login`] moves it to
/// authenticated. A failed login clears the session and the client stays
/// unauthenticated: searches fail with [`BlueskyError::NotAuthenticated`] until
/// someone calls `login` again explicitly.
pub struct BlueskyClient {
    client: reqwest::Client,
    base_url: String,
    identifier: String,
    password: String,
    reauth: ReauthStrategy,
    session: RwLock<Option<Session>>,
    // Held for the duration of one re-authentication so concurrent expiries
    // share a single createSession call.
    reauth_lock: Mutex<()>,
}

impl BlueskyClient {
    pub fn new(identifier: &str, password: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: BASE_URL.to_string(),
            identifier: identifier.to_string(),
            password: password.to_string(),
            reauth: ReauthStrategy::default(),
            session: RwLock::new(None),
            reauth_lock: Mutex::new(()),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_reauth(mut self, strategy: ReauthStrategy) -> Self {
        self.reauth = strategy;
        self
    }

    /// Build a client and log in. A login failure is returned to the caller.
    pub async fn connect(identifier: &str, password: &str) -> Result<Self> {
        let client = Self::new(identifier, password);
        client.login().await?;
        Ok(client)
    }

    fn xrpc_url(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.base_url, method)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.is_some()
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// Exchange identifier/password for a fresh access/refresh token pair.
    pub async fn login(&self) -> Result<Session> {
        let resp = self
            .client
            .post(self.xrpc_url(CREATE_SESSION))
            .json(&CreateSessionInput {
                identifier: &self.identifier,
                password: &self.password,
            })
            .send()
            .await;

        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => {
                self.session.write().await.take();
                return Err(e.into());
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            self.session.write().await.take();
            return Err(BlueskyError::Authentication {
                status: status.as_u16(),
                message,
            });
        }

        let session: Session = match resp.json().await {
            Ok(session) => session,
            Err(e) => {
                self.session.write().await.take();
                return Err(BlueskyError::Parse(e.to_string()));
            }
        };

        tracing::info!(
            identifier = %self.identifier,
            handle = session.handle.as_deref().unwrap_or(""),
            "Bluesky session created"
        );
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    /// Trade the stored refresh token for a new token pair.
    pub async fn refresh(&self) -> Result<Session> {
        let refresh_token = match self.session.read().await.as_ref() {
            Some(s) => s.refresh_token.clone(),
            None => return Err(BlueskyError::NotAuthenticated),
        };

        let resp = self
            .client
            .post(self.xrpc_url(REFRESH_SESSION))
            .bearer_auth(&refresh_token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BlueskyError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let session: Session = resp.json().await?;
        tracing::debug!("Bluesky session refreshed");
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    async fn access_token(&self) -> Result<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
            .ok_or(BlueskyError::NotAuthenticated)
    }

    /// Renew the session after `stale` was rejected as expired.
    ///
    /// Only one renewal runs at a time. A caller that queued behind another
    /// renewal finds the token already replaced and reuses the new one.
    async fn reauthenticate(&self, stale: &str) -> Result<()> {
        let _guard = self.reauth_lock.lock().await;

        match self.session.read().await.as_ref() {
            Some(s) if s.access_token != stale => {
                tracing::debug!("Session already renewed by a concurrent caller");
                return Ok(());
            }
            Some(_) => {}
            None => return Err(BlueskyError::NotAuthenticated),
        }

        match self.reauth {
            ReauthStrategy::Login => self.login().await.map(|_| ()),
            ReauthStrategy::Refresh => match self.refresh().await {
                Ok(_) => Ok(()),
                Err(e) => {
                    tracing::warn!(error = %e, "Session refresh failed, falling back to login");
                    self.login().await.map(|_| ())
                }
            },
        }
    }

    async fn search_once(&self, term: &str, since: &str, token: &str) -> Result<Vec<Post>> {
        let resp = self
            .client
            .get(self.xrpc_url(SEARCH_POSTS))
            .bearer_auth(token)
            .query(&[("q", term), ("sort", "latest"), ("since", since)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let xrpc: Option<XrpcErrorBody> = serde_json::from_str(&body).ok();
            if xrpc.as_ref().and_then(|e| e.error.as_deref()) == Some(EXPIRED_TOKEN) {
                return Err(BlueskyError::ExpiredToken);
            }
            let message = xrpc.and_then(|e| e.message).unwrap_or(body);
            return Err(BlueskyError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: SearchPostsResponse = resp.json().await?;
        Ok(parsed.posts)
    }

    /// Search posts matching `term` created within the last `window_secs`
    /// seconds, newest first.
    ///
    /// An expired token triggers exactly one re-authentication and one retry
    /// with the same arguments; a failure of the retry is returned as is.
    pub async fn try_search(&self, term: &str, window_secs: u64) -> Result<Vec<Post>> {
        let since = since_timestamp(Utc::now(), window_secs);
        let token = self.access_token().await?;

        match self.search_once(term, &since, &token).await {
            Err(BlueskyError::ExpiredToken) => {
                tracing::info!(term, "Access token expired, re-authenticating");
                self.reauthenticate(&token).await?;
                let token = self.access_token().await?;
                self.search_once(term, &since, &token).await
            }
            other => other,
        }
    }

    /// Like [`BlueskyClient::try_search`], but failures are logged and
    /// reported as `None`.
    pub async fn search(&self, term: &str, window_secs: u64) -> Option<Vec<Post>> {
        match self.try_search(term, window_secs).await {
            Ok(posts) => {
                tracing::debug!(term, count = posts.len(), "Bluesky search complete");
                Some(posts)
            }
            Err(e) => {
                tracing::warn!(term, error = %e, "Bluesky search failed");
                None
            }
        }
    }

    /// Search every term, flatten, and drop structurally identical records.
    /// Posts sharing a cid but differing in any field are both kept.
    pub async fn search_multiple(&self, terms: &[String], window_secs: u64) -> Vec<Post> {
        if terms.is_empty() {
            return Vec::new();
        }

        let mut results = Vec::new();
        for term in terms {
            if let Some(posts) = self.search(term, window_secs).await {
                results.extend(posts);
            }
        }

        let deduped = dedup_posts(results);
        tracing::info!(terms = terms.len(), count = deduped.len(), "Bluesky multi-term search complete");
        deduped
    }
}

/// Absolute UTC lower bound for a search window, e.g. `2024-05-01T11:00:00Z`.
pub fn since_timestamp(now: DateTime<Utc>, window_secs: u64) -> String {
    let window = Duration::seconds(window_secs.min(MAX_WINDOW_SECS) as i64);
    let since = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);
    since.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Drop records equal to an earlier one, keeping first occurrences in order.
pub fn dedup_posts(posts: Vec<Post>) -> Vec<Post> {
    let mut seen = HashSet::new();
    posts
        .into_iter()
        .filter(|p| seen.insert(p.fingerprint()))
        .collect()
}
