use super::{http_client, read_json, transport_error, CompletionBackend};
use crate::config::{LlmProvider, ModelConfig, RunContext};
use async_trait::async_trait;
use parley_core::{ParleyError, ParleyResult, Turn};

/// OpenAI-compatible API backend.
///
/// Works with Mistral, OpenAI, OpenRouter, Groq and any other provider
/// that implements the OpenAI chat completions API.
pub struct OpenAiBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OpenAiBackend {
    /// Builds the backend and its HTTP client from `config`.
    pub fn new(config: ModelConfig) -> ParleyResult<Self> {
        let http = http_client(&config)?;
        Ok(Self { config, http })
    }

    fn build_messages(&self, turns: &[Turn], context: &RunContext) -> Vec<serde_json::Value> {
        let mut api_messages = Vec::with_capacity(turns.len() + 1);

        if let Some(sys) = &context.system_prompt {
            api_messages.push(serde_json::json!({
                "role": "system",
                "content": sys
            }));
        }

        for turn in turns {
            api_messages.push(serde_json::json!({
                "role": turn.role().as_str(),
                "content": turn.content()
            }));
        }

        api_messages
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.bearer_auth(&self.config.api_key);

        // OpenRouter requires extra headers
        if matches!(self.config.provider, LlmProvider::OpenRouter) {
            request
                .header("HTTP-Referer", "https://github.com/parley-rs/parley")
                .header("X-Title", "Parley")
        } else {
            request
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, turns: &[Turn], context: &RunContext) -> ParleyResult<String> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());

        let body = serde_json::json!({
            "model": context.model_id,
            "messages": self.build_messages(turns, context),
            "temperature": context.temperature,
            "max_tokens": context.max_tokens,
        });

        tracing::debug!(
            provider = %self.config.provider,
            model = %context.model_id,
            turns = turns.len(),
            "Sending chat completion request"
        );

        let resp = self
            .add_provider_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(self.config.provider, e))?;

        let resp_body = read_json(self.config.provider, resp).await?;
        parse_openai_response(&resp_body)
    }
}

/// Extracts the assistant text from a chat completions response.
pub fn parse_openai_response(body: &serde_json::Value) -> ParleyResult<String> {
    let message = &body["choices"][0]["message"];
    if message.is_null() {
        return Err(ParleyError::fatal("Missing choices in chat completion response"));
    }

    match &message["content"] {
        serde_json::Value::String(text) => Ok(text.clone()),
        // Some OpenAI-compatible servers (Mistral among them) may return
        // content as an array of typed chunks.
        serde_json::Value::Array(parts) => {
            let text: Vec<&str> = parts
                .iter()
                .filter(|p| p["type"].as_str().unwrap_or("text") == "text")
                .filter_map(|p| p["text"].as_str())
                .collect();
            if text.is_empty() {
                Err(ParleyError::fatal("Chat completion response has no text content"))
            } else {
                Ok(text.join(""))
            }
        }
        _ => Err(ParleyError::fatal("Chat completion response has no text content")),
    }
}
