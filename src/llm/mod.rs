pub mod anthropic;
pub mod config;
pub mod error;
pub mod gemini;
pub mod generator;
pub mod openai;
pub mod prompt;
pub mod provider;
#[cfg(test)]
pub mod mock;

pub use config::{build_provider, fetch_available_models, ModelTier, ProviderId, UserSettings};
pub use generator::{generate_kb, update_article};
pub use provider::{AnyProvider, ModelProvider};
