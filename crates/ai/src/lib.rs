mod anthropic;
mod openai;

use std::sync::Arc;

use anyhow::Result;
use pullcheck_core::{
    clients::{ReviewError, Reviewer},
    config::{AiConfig, AiProvider},
};

pub use crate::{anthropic::AnthropicReviewer, openai::OpenAiReviewer};

pub const SYSTEM_PROMPT: &str =
    "You are a senior engineer reviewing a PR. Provide constructive feedback.";

pub fn user_prompt(diff: &str) -> String { format!("Review this PR diff:\n\n{diff}") }

/// The configured AI provider.
pub enum AiClient {
    OpenAi(OpenAiReviewer),
    Anthropic(AnthropicReviewer),
}

impl AiClient {
    pub fn new(config: &AiConfig) -> Result<Arc<Self>> {
        let client = match config.provider {
            AiProvider::OpenAi => Self::OpenAi(OpenAiReviewer::new(config)),
            AiProvider::Anthropic => Self::Anthropic(AnthropicReviewer::new(config)?),
        };
        tracing::info!("Using AI provider {:?} ({})", config.provider, client.model());
        Ok(Arc::new(client))
    }

    pub fn model(&self) -> &str {
        match self {
            Self::OpenAi(r) => r.model(),
            Self::Anthropic(r) => r.model(),
        }
    }
}

impl Reviewer for AiClient {
    async fn review(&self, diff: &str) -> Result<String, ReviewError> {
        match self {
            Self::OpenAi(r) => r.review(diff).await,
            Self::Anthropic(r) => r.review(diff).await,
        }
    }
}

/// Providers may answer with nothing, or with only whitespace; both count
/// as an empty review.
fn require_content(content: Option<String>) -> Result<String, ReviewError> {
    match content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ReviewError::EmptyResponse),
    }
}
