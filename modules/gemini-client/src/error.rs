use thiserror::Error;

pub type Result<T> = std::result::Result<T, GeminiError>;

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Response contained no candidate text")]
    EmptyResponse,

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for GeminiError {
    fn from(err: reqwest::Error) -> Self {
        GeminiError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for GeminiError {
    fn from(err: serde_json::Error) -> Self {
        GeminiError::Parse(err.to_string())
    }
}
