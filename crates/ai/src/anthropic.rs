use std::time::Duration;

use anyhow::{Context, Result};
use pullcheck_core::{clients::ReviewError, config::AiConfig};
use serde::Deserialize;

use crate::{SYSTEM_PROMPT, require_content, user_prompt};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Client for the Anthropic messages API.
pub struct AnthropicReviewer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicReviewer {
    pub fn new(config: &AiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone().unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    pub fn model(&self) -> &str { &self.model }

    pub async fn review(&self, diff: &str) -> Result<String, ReviewError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": SYSTEM_PROMPT,
            "messages": [{ "role": "user", "content": user_prompt(diff) }],
        });
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ReviewError::Provider(format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ReviewError::Provider(format!("API error {status}: {text}")));
        }
        let response: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ReviewError::Provider(format!("failed to parse response: {e}")))?;
        require_content(collect_text(response))
    }
}

fn collect_text(response: MessagesResponse) -> Option<String> {
    let parts = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>();
    (!parts.is_empty()).then(|| parts.join("\n"))
}
