use std::sync::Arc;

use async_openai::{
    config::AzureConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;

use crate::error::TransportError;

/// A single chat completion call.
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_text: &str)
        -> Result<String, TransportError>;
}

pub struct AzureOpenAiChat {
    client: Arc<Client<AzureConfig>>,
    deployment: String,
    temperature: f32,
    max_tokens: u32,
}

impl AzureOpenAiChat {
    pub fn new(client: Arc<Client<AzureConfig>>, deployment: &str) -> Self {
        Self {
            client,
            deployment: deployment.to_string(),
            temperature: 0.0,
            max_tokens: 100,
        }
    }
}

#[async_trait]
impl ChatService for AzureOpenAiChat {
    #[allow(deprecated)]
    async fn complete(
        &self,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<String, TransportError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.deployment)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .messages([
                ChatCompletionRequestSystemMessage::from(system_prompt).into(),
                ChatCompletionRequestUserMessage::from(user_text).into(),
            ])
            .build()?;

        let response = self.client.chat().create(request).await?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .map(|content| content.trim().to_string())
            .ok_or_else(|| TransportError::Decode("No content found in chat response".into()))
    }
}
