#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing API Key for {0}")]
    MissingApiKey(&'static str),

    #[error("{provider} API error (status {status}): {body}")]
    Api {
        provider: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("invalid response from {provider}: missing {field}")]
    InvalidResponse {
        provider: &'static str,
        field: &'static str,
    },

    #[error("{0}")]
    Other(String),
}
