use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info};

use crate::ingest::EncodedFile;
use super::error::LlmError;
use super::prompt;
use super::provider::ModelProvider;

const GENERATE_FALLBACK: &str = "<!-- Failed to generate content -->";
const UPDATE_FALLBACK: &str = "<!-- Failed to update content -->";

lazy_static! {
    static ref LEADING_HTML_FENCE: Regex = Regex::new(r"^```html\s*").unwrap();
    static ref LEADING_FENCE: Regex = Regex::new(r"^```\s*").unwrap();
    static ref TRAILING_FENCE: Regex = Regex::new(r"```$").unwrap();
}

/// Strips the markdown fences models like to wrap HTML in. Each pattern is
/// applied once, in order, matching only at the very start or end of the reply.
pub fn clean_response(text: &str, fallback: &str) -> String {
    let text = if text.is_empty() { fallback } else { text };
    let text = LEADING_HTML_FENCE.replace(text, "");
    let text = LEADING_FENCE.replace(&text, "");
    TRAILING_FENCE.replace(&text, "").into_owned()
}

/// Generates a new article from the user's request, attached files and any text
/// extracted from them.
pub async fn generate_kb<P: ModelProvider>(
    provider: &P,
    prompt: &str,
    files: &[EncodedFile],
    extracted_text: &str,
) -> Result<String, LlmError> {
    let request = prompt::generation_request(prompt, files, extracted_text);
    info!(
        "Generating article with {} ({} files, {} chars of extracted text)",
        provider.name(),
        files.len(),
        extracted_text.len()
    );

    match provider.generate(&request).await {
        Ok(text) => Ok(clean_response(&text, GENERATE_FALLBACK)),
        Err(e) => {
            error!("AI generation error: {}", e);
            Err(LlmError::Other(format!("Generation failed: {}", e)))
        }
    }
}

/// Rewrites `current_html` according to `instructions` and returns the full new document.
pub async fn update_article<P: ModelProvider>(
    provider: &P,
    current_html: &str,
    instructions: &str,
) -> Result<String, LlmError> {
    let request = prompt::refine_request(current_html, instructions);
    info!("Refining article with {} ({} chars)", provider.name(), current_html.len());

    let text = provider.generate(&request).await.map_err(|e| {
        error!("AI update error: {}", e);
        e
    })?;
    Ok(clean_response(&text, UPDATE_FALLBACK))
}
