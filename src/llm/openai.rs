use async_trait::async_trait;
use serde::Deserialize;

use super::{ModelProvider, checked};
use crate::errors::LlmError;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI chat completions client (also works against compatible gateways).
pub struct OpenAiProvider {
    api_base: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        if let Some(t) = self.temperature {
            body["temperature"] = serde_json::json!(t);
        }

        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "sending OpenAI request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = checked(self.name(), response).await?;

        let completion: ChatCompletion =
            response.json().await.map_err(|e| LlmError::Malformed {
                provider: self.name().to_string(),
                message: e.to_string(),
            })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content);
        match content {
            Some(text) => Ok(text),
            None => {
                tracing::warn!(model = %self.model, "OpenAI returned no content; storing empty answer");
                Ok(String::new())
            }
        }
    }
}
