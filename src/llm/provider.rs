use std::future::Future;

use super::anthropic::AnthropicProvider;
use super::error::LlmError;
use super::gemini::GeminiProvider;
use super::openai::OpenAiProvider;

/// One piece of a multi-part user turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    /// Base64 payload without the `data:` prefix.
    Image { mime_type: String, data: String },
}

#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub system: String,
    pub parts: Vec<ContentPart>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            ..Self::default()
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(ContentPart::Text(text.into()));
        self
    }

    pub fn image(mut self, mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        self.parts.push(ContentPart::Image {
            mime_type: mime_type.into(),
            data: data.into(),
        });
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

pub trait ModelProvider: Send + Sync {
    /// Send the system instruction and a single user turn, returning the reply text.
    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;

    fn name(&self) -> &'static str;
}

/// The provider selected from user settings.
#[derive(Debug, Clone)]
pub enum AnyProvider {
    Gemini(GeminiProvider),
    OpenAi(OpenAiProvider),
    Anthropic(AnthropicProvider),
}

impl ModelProvider for AnyProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        match self {
            AnyProvider::Gemini(p) => p.generate(request).await,
            AnyProvider::OpenAi(p) => p.generate(request).await,
            AnyProvider::Anthropic(p) => p.generate(request).await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            AnyProvider::Gemini(p) => p.name(),
            AnyProvider::OpenAi(p) => p.name(),
            AnyProvider::Anthropic(p) => p.name(),
        }
    }
}
