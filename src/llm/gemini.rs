use std::fmt;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error};

use super::error::LlmError;
use super::provider::{ContentPart, GenerationRequest, ModelProvider};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_body(&self, request: &GenerationRequest) -> Value {
        let parts: Vec<Value> = request.parts.iter()
            .map(|part| match part {
                ContentPart::Text(text) => json!({ "text": text }),
                ContentPart::Image { mime_type, data } => json!({
                    "inlineData": { "mimeType": mime_type, "data": data }
                }),
            })
            .collect();

        let mut generation_config = serde_json::Map::new();
        if let Some(t) = request.temperature {
            generation_config.insert("temperature".into(), json!(t));
        }
        if let Some(max) = request.max_tokens {
            generation_config.insert("maxOutputTokens".into(), json!(max));
        }

        let mut body = json!({
            "systemInstruction": { "parts": [{ "text": request.system }] },
            "contents": [{ "role": "user", "parts": parts }]
        });
        if !generation_config.is_empty() {
            body["generationConfig"] = Value::Object(generation_config);
        }
        body
    }
}

/// Concatenates the text parts of the first candidate, skipping thought parts.
fn extract_text(response: &Value) -> Result<String, LlmError> {
    let parts = response["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or(LlmError::InvalidResponse { provider: "google", field: "candidates[0].content.parts" })?;

    Ok(parts.iter()
        .filter(|p| !p["thought"].as_bool().unwrap_or(false))
        .filter_map(|p| p["text"].as_str())
        .collect::<Vec<_>>()
        .join(""))
}

impl ModelProvider for GeminiProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        debug!("Sending {} parts to Gemini model {}", request.parts.len(), self.model);

        let response = self.client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&self.build_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            error!("Gemini API error {}: {}", status, body);
            return Err(LlmError::Api { provider: "google", status, body });
        }

        let response_json: Value = response.json().await?;
        extract_text(&response_json)
    }

    fn name(&self) -> &'static str {
        "google"
    }
}
