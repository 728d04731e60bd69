//! Language-model integration
//!
//! Features:
//! - OpenAI-compatible chat-completions backend with JSON mode
//! - Prompt assembly per conversational task
//! - Gateway operations with explicit degradation on failure
//! - Schema-validated structured replies

pub mod backend;
pub mod gateway;
pub mod prompt;

pub use backend::{
    FinishReason, GenerationOptions, GenerationResult, LlmBackend, OpenAIBackend, OpenAIConfig,
};
pub use gateway::{
    fallback_greeting, ChatEnvelope, ChatRequest, GreetingRequest, LlmGateway, Recommendation,
    SuggestionRequest,
};
pub use prompt::{Message, PromptBuilder, Role};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for bankbot_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Configuration(msg) => bankbot_core::Error::Configuration(msg),
            other => bankbot_core::Error::Llm(other.to_string()),
        }
    }
}
