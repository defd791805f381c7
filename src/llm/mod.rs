pub mod gemini;
pub mod json;

use async_trait::async_trait;
use thiserror::Error;

pub use gemini::GeminiClient;

/// Failure talking to the model provider
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("provider response had no text: {0}")]
    EmptyResponse(String),
}

impl LlmError {
    /// Whether the provider is telling us the usage quota ran out.
    pub fn is_quota_exceeded(&self) -> bool {
        let message = self.to_string().to_lowercase();
        message.contains("quota") || message.contains("resource_exhausted")
    }
}

/// Plain text completion. The only seam between the pipeline and the model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses in order and remembers every prompt it saw.
    #[derive(Default)]
    pub struct ScriptedModel {
        responses: Mutex<VecDeque<Result<String, LlmError>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn replying(text: &str) -> Self {
            Self::new(vec![Ok(text.to_string())])
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::EmptyResponse("script exhausted".into())))
        }
    }

    pub fn quota_error() -> LlmError {
        LlmError::Api {
            status: 429,
            message: "Resource has been exhausted (e.g. check quota).".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_quota_messages() {
        assert!(testing::quota_error().is_quota_exceeded());
        assert!(LlmError::Api {
            status: 429,
            message: "RESOURCE_EXHAUSTED".into()
        }
        .is_quota_exceeded());
        assert!(!LlmError::Api {
            status: 500,
            message: "internal".into()
        }
        .is_quota_exceeded());
    }
}
