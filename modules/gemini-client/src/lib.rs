pub mod error;
pub mod types;
pub mod util;

pub use error::{GeminiError, Result};
pub use types::{permissive_safety_settings, Content, SafetySetting};
pub use util::{recover_json, strip_code_fence};

use types::{GenerateContentRequest, GenerateContentResponse};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    safety_settings: Vec<SafetySetting>,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            safety_settings: permissive_safety_settings(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_safety_settings(mut self, settings: Vec<SafetySetting>) -> Self {
        self.safety_settings = settings;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a single-turn prompt and return the first candidate's text.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = GenerateContentRequest {
            contents: vec![Content::user(prompt)],
            safety_settings: self.safety_settings.clone(),
        };

        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "Gemini generateContent request");

        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(GeminiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = resp.text().await?;
        let body: GenerateContentResponse = serde_json::from_str(&text)?;
        body.first_text().ok_or(GeminiError::EmptyResponse)
    }
}
