use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
};
use pullcheck_core::{clients::ReviewError, config::AiConfig};

use crate::{SYSTEM_PROMPT, require_content, user_prompt};

const DEFAULT_MODEL: &str = "gpt-4o";

pub struct OpenAiReviewer {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiReviewer {
    pub fn new(config: &AiConfig) -> Self {
        let mut openai = OpenAIConfig::new().with_api_key(config.api_key.clone());
        if let Some(base_url) = &config.base_url {
            openai = openai.with_api_base(base_url.clone());
        }
        Self {
            client: Client::with_config(openai),
            model: config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    pub fn model(&self) -> &str { &self.model }

    fn request(&self, diff: &str) -> Result<CreateChatCompletionRequest, OpenAIError> {
        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(SYSTEM_PROMPT)
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user_prompt(diff))
                    .build()?
                    .into(),
            ])
            .build()
    }

    pub async fn review(&self, diff: &str) -> Result<String, ReviewError> {
        let request = self.request(diff).map_err(|e| ReviewError::Provider(e.to_string()))?;
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| ReviewError::Provider(e.to_string()))?;
        require_content(response.choices.into_iter().next().and_then(|c| c.message.content))
    }
}
