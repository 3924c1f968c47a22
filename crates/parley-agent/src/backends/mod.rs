/// Anthropic Messages API.
pub mod claude;
/// OpenAI-compatible chat completions.
pub mod openai;

use crate::config::{LlmProvider, ModelConfig, RunContext};
use async_trait::async_trait;
use parley_core::{ParleyError, ParleyResult, Turn};
use std::sync::Arc;
use std::time::Duration;

/// Trait for completion provider backends.
///
/// A backend performs exactly one request; retrying is the job of
/// [`CompletionProvider`](crate::CompletionProvider). Errors must be
/// `ParleyError::Provider` with `fatal` set according to whether a retry
/// could succeed.
///
/// To add a new provider:
/// 1. Create a new module in `backends/`
/// 2. Implement `CompletionBackend` for your struct
/// 3. Add the variant to `LlmProvider` in `config.rs`
/// 4. Wire it up in [`build_backend`]
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Returns the assistant reply to `turns` under `context`.
    async fn complete(&self, turns: &[Turn], context: &RunContext) -> ParleyResult<String>;
}

/// Builds the HTTP backend matching `config.provider`.
pub fn build_backend(config: &ModelConfig) -> ParleyResult<Arc<dyn CompletionBackend>> {
    let backend: Arc<dyn CompletionBackend> = match config.provider {
        LlmProvider::Claude => Arc::new(claude::ClaudeBackend::new(config.clone())?),
        LlmProvider::Mistral
        | LlmProvider::OpenAi
        | LlmProvider::OpenRouter
        | LlmProvider::Groq => Arc::new(openai::OpenAiBackend::new(config.clone())?),
    };
    Ok(backend)
}

fn http_client(config: &ModelConfig) -> ParleyResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(|e| ParleyError::Configuration(format!("Failed to build HTTP client: {e}")))
}

/// Maps a failure to send the request or read its body.
///
/// Only request-construction errors are fatal; anything on the wire
/// (timeouts, refused or reset connections) may go away on retry.
fn transport_error(provider: LlmProvider, e: reqwest::Error) -> ParleyError {
    if e.is_builder() {
        ParleyError::fatal(format!("{provider} request could not be built: {e}"))
    } else if e.is_timeout() {
        ParleyError::transient(format!("{provider} request timeout: {e}"))
    } else {
        ParleyError::transient(format!("{provider} transport error: {e}"))
    }
}

/// Reads the response body and turns non-2xx statuses into classified
/// provider errors.
async fn read_json(
    provider: LlmProvider,
    resp: reqwest::Response,
) -> ParleyResult<serde_json::Value> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| transport_error(provider, e))?;

    if !status.is_success() {
        return Err(ParleyError::from_status(
            status.as_u16(),
            format!("{provider} API error {status}: {body}"),
        ));
    }

    serde_json::from_str(&body).map_err(|e| {
        ParleyError::fatal(format!("{provider} returned an undecodable body: {e}"))
    })
}
