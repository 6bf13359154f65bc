use std::fmt;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error};

use super::error::LlmError;
use super::provider::{ContentPart, GenerationRequest, ModelProvider};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiProvider {
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
        let content: Vec<Value> = request.parts.iter()
            .map(|part| match part {
                ContentPart::Text(text) => json!({ "type": "text", "text": text }),
                ContentPart::Image { mime_type, data } => json!({
                    "type": "image_url",
                    "image_url": { "url": format!("data:{};base64,{}", mime_type, data) }
                }),
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": content }
            ]
        });

        if let Some(t) = request.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(max) = request.max_tokens {
            body["max_tokens"] = json!(max);
        }
        body
    }
}

impl ModelProvider for OpenAiProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let body = self.build_body(request);
        debug!("Sending {} parts to OpenAI model {}", request.parts.len(), self.model);

        let response = self.client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            error!("OpenAI API error {}: {}", status, body);
            return Err(LlmError::Api { provider: "openai", status, body });
        }

        let response_json: Value = response.json().await?;
        // A null content (e.g. refusal) is treated as an empty reply.
        match &response_json["choices"][0]["message"] {
            Value::Object(message) => Ok(message.get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()),
            _ => Err(LlmError::InvalidResponse { provider: "openai", field: "choices[0].message" }),
        }
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> GenerationRequest {
        GenerationRequest::new("be terse")
            .text("hello")
            .image("image/png", "AAAA")
            .temperature(0.2)
            .max_tokens(4000)
    }

    #[test]
    fn body_carries_system_and_image_data_uri() {
        let provider = OpenAiProvider::new("k".into(), "gpt-4o".into());
        let body = provider.build_body(&request());
        assert_eq!(body["messages"][0]["content"], "be terse");
        assert_eq!(body["messages"][1]["content"][0]["text"], "hello");
        assert_eq!(body["messages"][1]["content"][1]["image_url"]["url"], "data:image/png;base64,AAAA");
        assert_eq!(body["max_tokens"], 4000);
    }

    #[test]
    fn unset_sampling_fields_are_omitted() {
        let provider = OpenAiProvider::new("k".into(), "gpt-4o".into());
        let body = provider.build_body(&GenerationRequest::new("s").text("t"));
        assert!(body.get("temperature").is_none());
        assert!(body.get("max_tokens").is_none());
    }

    #[tokio::test]
    async fn returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer k"))
            .and(body_partial_json(serde_json::json!({ "model": "gpt-4o" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "<!DOCTYPE html>" } }]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("k".into(), "gpt-4o".into()).with_base_url(server.uri());
        assert_eq!(provider.generate(&request()).await.unwrap(), "<!DOCTYPE html>");
    }

    #[tokio::test]
    async fn http_error_surfaces_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("k".into(), "gpt-4o".into()).with_base_url(server.uri());
        let err = provider.generate(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Api { ref body, .. } if body == "boom"));
    }

    #[tokio::test]
    async fn missing_choices_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("k".into(), "gpt-4o".into()).with_base_url(server.uri());
        let err = provider.generate(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse { .. }));
    }
}
