use std::fmt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::error::LlmError;
use super::provider::{ContentPart, GenerationRequest, ModelProvider};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
// The messages API requires max_tokens on every request.
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Clone)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Serialize)]
struct RequestBody<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ApiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: Vec<Block<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Block<'a> {
    Text { text: &'a str },
    Image { source: ImageSource<'a> },
}

#[derive(Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'a str,
    data: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl AnthropicProvider {
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

    fn build_body<'a>(&'a self, request: &'a GenerationRequest) -> RequestBody<'a> {
        let content = request.parts.iter()
            .map(|part| match part {
                ContentPart::Text(text) => Block::Text { text },
                ContentPart::Image { mime_type, data } => Block::Image {
                    source: ImageSource { kind: "base64", media_type: mime_type, data },
                },
            })
            .collect();

        RequestBody {
            model: &self.model,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: &request.system,
            messages: vec![ApiMessage { role: "user", content }],
            temperature: request.temperature,
        }
    }
}

impl ModelProvider for AnthropicProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        debug!("Sending {} parts to Anthropic model {}", request.parts.len(), self.model);

        let response = self.client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.build_body(request))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!("Anthropic API error {}: {}", status, text);
            return Err(LlmError::Api { provider: "anthropic", status, body: text });
        }

        let resp: ApiResponse = serde_json::from_str(&text)?;
        Ok(resp.content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join(""))
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn body_defaults_max_tokens_and_encodes_images() {
        let provider = AnthropicProvider::new("k".into(), "claude-3-haiku-20240307".into());
        let request = GenerationRequest::new("sys").text("notes").image("image/jpeg", "QUJD");
        let body = serde_json::to_value(provider.build_body(&request)).unwrap();

        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["system"], "sys");
        assert!(body.get("temperature").is_none());
        assert_eq!(body["messages"][0]["content"][0], serde_json::json!({ "type": "text", "text": "notes" }));
        assert_eq!(
            body["messages"][0]["content"][1],
            serde_json::json!({
                "type": "image",
                "source": { "type": "base64", "media_type": "image/jpeg", "data": "QUJD" }
            })
        );
    }

    #[tokio::test]
    async fn joins_text_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "k"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(serde_json::json!({ "max_tokens": 4000 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    { "type": "text", "text": "<!DOCTYPE html>" },
                    { "type": "text", "text": "<html></html>" }
                ]
            })))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new("k".into(), "m".into()).with_base_url(server.uri());
        let request = GenerationRequest::new("sys").text("t").max_tokens(4000);
        assert_eq!(provider.generate(&request).await.unwrap(), "<!DOCTYPE html><html></html>");
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new("k".into(), "m".into()).with_base_url(server.uri());
        let err = provider.generate(&GenerationRequest::new("s").text("t")).await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}
