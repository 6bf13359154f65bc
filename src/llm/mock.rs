//! Test-only scripted provider.

use std::sync::{Arc, Mutex};

use super::error::LlmError;
use super::provider::{GenerationRequest, ModelProvider};

#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
    pub fail: bool,
}

impl MockProvider {
    /// Replies are handed out front to back; once exhausted every call returns "".
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ModelProvider for MockProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(LlmError::Other("mock provider failure".into()));
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(String::new())
        } else {
            Ok(responses.remove(0))
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
