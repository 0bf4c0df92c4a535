pub mod backend;
pub mod talkback;

pub use backend::Notifier;
pub use talkback::{talkback_endpoint, SeguePlaylistRequest, TalkbackClient, DEFAULT_TALKBACK_PORT};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid talkback address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("orchestrator rejected SeguePlaylist (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("could not encode stage output: {0}")]
    Encode(String),
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for NotifyError {
    fn from(err: serde_json::Error) -> Self {
        NotifyError::Encode(err.to_string())
    }
}
