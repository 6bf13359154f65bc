use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use reqwest::Client;
use lazy_static::lazy_static;
use anyhow::{Result, Context};
use tracing::{info, warn};

use super::anthropic::AnthropicProvider;
use super::error::LlmError;
use super::gemini::GeminiProvider;
use super::openai::OpenAiProvider;
use super::provider::AnyProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Google,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Fast,
    Reasoning,
}

/// Static description of a provider: display name and the model used per tier.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub id: ProviderId,
    pub name: &'static str,
    pub fast_model: &'static str,
    pub reasoning_model: &'static str,
}

impl ProviderProfile {
    pub fn model(&self, tier: ModelTier) -> &'static str {
        match tier {
            ModelTier::Fast => self.fast_model,
            ModelTier::Reasoning => self.reasoning_model,
        }
    }
}

lazy_static! {
    pub static ref PROVIDERS: HashMap<ProviderId, ProviderProfile> = {
        let mut m = HashMap::new();
        m.insert(ProviderId::Google, ProviderProfile {
            id: ProviderId::Google,
            name: "Google Gemini",
            fast_model: "gemini-2.5-flash",
            reasoning_model: "gemini-3-pro-preview",
        });
        m.insert(ProviderId::OpenAi, ProviderProfile {
            id: ProviderId::OpenAi,
            name: "OpenAI",
            fast_model: "gpt-4o-mini",
            reasoning_model: "gpt-4o",
        });
        m.insert(ProviderId::Anthropic, ProviderProfile {
            id: ProviderId::Anthropic,
            name: "Anthropic Claude",
            fast_model: "claude-3-haiku-20240307",
            reasoning_model: "claude-3-5-sonnet-20240620",
        });
        m
    };
}

impl ProviderId {
    pub const ALL: [ProviderId; 3] = [ProviderId::Google, ProviderId::OpenAi, ProviderId::Anthropic];

    pub fn profile(&self) -> &'static ProviderProfile {
        &PROVIDERS[self]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Google => "google",
            ProviderId::OpenAi => "openai",
            ProviderId::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "google" | "gemini" => Ok(ProviderId::Google),
            "openai" => Ok(ProviderId::OpenAi),
            "anthropic" | "claude" => Ok(ProviderId::Anthropic),
            other => Err(anyhow::anyhow!("Unsupported provider: {}", other)),
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelTier::Fast => f.write_str("fast"),
            ModelTier::Reasoning => f.write_str("reasoning"),
        }
    }
}

impl FromStr for ModelTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fast" => Ok(ModelTier::Fast),
            "reasoning" => Ok(ModelTier::Reasoning),
            other => Err(anyhow::anyhow!("Unknown model tier: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiKeys {
    #[serde(default)]
    pub google: String,
    #[serde(default)]
    pub openai: String,
    #[serde(default)]
    pub anthropic: String,
}

impl ApiKeys {
    pub fn get(&self, provider: ProviderId) -> &str {
        match provider {
            ProviderId::Google => &self.google,
            ProviderId::OpenAi => &self.openai,
            ProviderId::Anthropic => &self.anthropic,
        }
    }

    pub fn set(&mut self, provider: ProviderId, key: String) {
        match provider {
            ProviderId::Google => self.google = key,
            ProviderId::OpenAi => self.openai = key,
            ProviderId::Anthropic => self.anthropic = key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub active_provider: ProviderId,
    pub active_model_tier: ModelTier,
    #[serde(default)]
    pub api_keys: ApiKeys,
    /// Overrides the provider endpoint, e.g. a local OpenAI-compatible server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            active_provider: ProviderId::Google,
            active_model_tier: ModelTier::Reasoning,
            api_keys: ApiKeys::default(),
            base_url: None,
        }
    }
}

impl UserSettings {
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!("Failed to parse settings {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;
        info!("Saved settings to {}", path.display());
        Ok(())
    }

    pub fn active_model(&self) -> &'static str {
        self.active_provider.profile().model(self.active_model_tier)
    }
}

/// Resolves the active provider and tier into a ready-to-use client.
pub fn build_provider(settings: &UserSettings) -> Result<AnyProvider, LlmError> {
    let profile = settings.active_provider.profile();
    let api_key = settings.api_keys.get(profile.id);
    let model = profile.model(settings.active_model_tier).to_string();

    if api_key.is_empty() {
        return Err(LlmError::MissingApiKey(profile.name));
    }
    let api_key = api_key.to_string();

    let provider = match profile.id {
        ProviderId::Google => {
            let p = GeminiProvider::new(api_key, model);
            AnyProvider::Gemini(match &settings.base_url {
                Some(url) => p.with_base_url(url),
                None => p,
            })
        }
        ProviderId::OpenAi => {
            let p = OpenAiProvider::new(api_key, model);
            AnyProvider::OpenAi(match &settings.base_url {
                Some(url) => p.with_base_url(url),
                None => p,
            })
        }
        ProviderId::Anthropic => {
            let p = AnthropicProvider::new(api_key, model);
            AnyProvider::Anthropic(match &settings.base_url {
                Some(url) => p.with_base_url(url),
                None => p,
            })
        }
    };

    info!("Using {} model {}", profile.name, profile.model(settings.active_model_tier));
    Ok(provider)
}

#[derive(Debug, Deserialize)]
struct ModelResponse {
    data: Vec<Model>,
}

#[derive(Debug, Deserialize)]
struct Model {
    id: String,
    name: Option<String>,
}

/// Lists models exposed by an OpenAI-compatible `/models` endpoint.
pub async fn fetch_available_models(api_url: &str, api_key: Option<&str>) -> Result<Vec<String>> {
    let client = Client::new();
    let mut request = client.get(format!("{}/models", api_url.trim_end_matches('/')));

    if let Some(key) = api_key {
        request = request.header("Authorization", format!("Bearer {}", key));
    }

    let response = request.send().await
        .context("Failed to send request for model list")?;

    if !response.status().is_success() {
        return Err(anyhow::anyhow!("Failed to fetch models: {}", response.status()));
    }

    let model_response: ModelResponse = response.json().await
        .context("Failed to parse model list")?;

    Ok(model_response.data
        .into_iter()
        .map(|model| model.name.unwrap_or(model.id))
        .collect())
}
