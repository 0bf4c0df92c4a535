use serde::{Deserialize, Serialize};

// --- Request ---

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: Some(text.into()),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: String,
}

impl SafetySetting {
    pub fn new(category: &str, threshold: &str) -> Self {
        Self {
            category: category.to_string(),
            threshold: threshold.to_string(),
        }
    }
}

/// News monitoring reads reports of violence and disasters; blocking on those
/// categories would drop exactly the posts we are looking for.
pub fn permissive_safety_settings() -> Vec<SafetySetting> {
    [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ]
    .iter()
    .map(|category| SafetySetting::new(category, "BLOCK_NONE"))
    .collect()
}

// --- Response ---

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
}

impl GenerateContentResponse {
    /// Text of `candidates[0].content.parts[0]`.
    pub fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
    }
}
