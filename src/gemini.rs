use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};

use crate::{
    config::Config,
    models::MediaType,
    naming::{clean_name, NamingError, NamingService, NAMING_PROMPT},
};

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")] Http(String),
    #[error("status={status} body={body}")] Status { status: reqwest::StatusCode, body: String },
    #[error("parse error: {0}")] Parse(String),
    #[error("prompt blocked: {0}")] Blocked(String),
    #[error("no text content found in response")] EmptyReply,
}

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let serde_json::Value::String(s) = val {
                        if s.len() > 100 && s.chars().all(|c| c.is_alphanumeric() || c == '+' || c == '/' || c == '=') {
                            *val = serde_json::Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self, GeminiError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GeminiError::Http(e.to_string()))?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    pub fn build_request_body(image_b64: &str, media_type: &MediaType) -> serde_json::Value {
        json!({
            "contents": [{
                "parts": [
                    {"inlineData": {"mimeType": media_type.as_str(), "data": image_b64}},
                    {"text": NAMING_PROMPT}
                ]
            }]
        })
    }

    async fn perform_api_call(&self, request_body: &serde_json::Value) -> Result<String, GeminiError> {
        let url = format!("{}/models/{}:generateContent?key={}", self.base_url, self.model, self.api_key);

        info!("🔗 Making request to: {}", url.replace(&self.api_key, "***"));

        let mut logged_body = request_body.clone();
        truncate_base64_in_json(&mut logged_body);
        info!("📤 Request body: {}", serde_json::to_string(&logged_body).unwrap_or_default());

        let response = self.client
            .post(&url)
            .json(request_body)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string().replace(&self.api_key, "***")))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        let response_text = response.text().await
            .map_err(|e| GeminiError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(GeminiError::Status { status, body: response_text });
        }

        let parsed: GeminiResponse = serde_json::from_str(&response_text)
            .map_err(|e| GeminiError::Parse(format!("{}: {}", e, response_text)))?;

        if let Some(reason) = parsed.prompt_feedback.as_ref().and_then(|f| f.block_reason.clone()) {
            return Err(GeminiError::Blocked(reason));
        }

        extract_text(&parsed).ok_or(GeminiError::EmptyReply)
    }

    pub async fn request_name(&self, image: &[u8], media_type: &MediaType) -> Result<String, GeminiError> {
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(image);
        let body = Self::build_request_body(&image_b64, media_type);

        info!("🎯 Generating product name for {} image ({} bytes)", media_type, image.len());
        let reply = self.perform_api_call(&body).await?;

        let name = clean_name(&reply);
        if name.is_empty() {
            return Err(GeminiError::EmptyReply);
        }
        info!("✅ Generated product name: {}", name);
        Ok(name)
    }
}

#[async_trait]
impl NamingService for GeminiClient {
    async fn generate_name(&self, image: &[u8], media_type: &MediaType) -> Result<String, NamingError> {
        if image.is_empty() {
            return Err(NamingError::EmptyImage);
        }
        self.request_name(image, media_type).await.map_err(|e| {
            error!("❌ Error generating product name with Gemini: {}", e);
            NamingError::Unavailable
        })
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default, rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(default, rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: Content }

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
        #[serde(default)]
        thought: bool,
    },
    Other(serde::de::IgnoredAny),
}

/// Joins the non-thought text parts of the first candidate.
fn extract_text(resp: &GeminiResponse) -> Option<String> {
    let candidate = resp.candidates.first()?;
    let text: String = candidate
        .content
        .parts
        .iter()
        .filter_map(|p| match p {
            Part::Text { text, thought: false } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    if text.trim().is_empty() { None } else { Some(text) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(raw: &str) -> GeminiResponse {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn request_body_carries_image_then_prompt() {
        let media = MediaType::parse("image/jpeg").unwrap();
        let body = GeminiClient::build_request_body("QUJD", &media);
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], "QUJD");
        assert_eq!(parts[1]["text"], NAMING_PROMPT);
    }

    #[test]
    fn extracts_joined_text_and_skips_thoughts() {
        let resp = parse(r#"{"candidates":[{"content":{"parts":[
            {"text":"planning...","thought":true},
            {"text":"Nova"},
            {"text":"Brew"}
        ]}}]}"#);
        assert_eq!(extract_text(&resp).as_deref(), Some("NovaBrew"));
    }

    #[test]
    fn missing_text_yields_none() {
        assert!(extract_text(&parse(r#"{"candidates":[]}"#)).is_none());
        assert!(extract_text(&parse(r#"{"candidates":[{"content":{"parts":[{"inlineData":{"data":"x","mimeType":"image/png"}}]}}]}"#)).is_none());
        assert!(extract_text(&parse(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#)).is_none());
    }

    #[test]
    fn prompt_feedback_is_parsed() {
        let resp = parse(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#);
        assert_eq!(resp.prompt_feedback.and_then(|f| f.block_reason).as_deref(), Some("SAFETY"));
    }

    #[test]
    fn long_base64_is_truncated_for_logs() {
        let data = "A".repeat(400);
        let mut body = json!({"contents":[{"parts":[{"inlineData":{"data": data}}]}]});
        truncate_base64_in_json(&mut body);
        let logged = body["contents"][0]["parts"][0]["inlineData"]["data"].as_str().unwrap();
        assert!(logged.ends_with("...[truncated 350 chars]"));
    }
}
