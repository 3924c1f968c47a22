use super::{http_client, read_json, transport_error, CompletionBackend};
use crate::config::{ModelConfig, RunContext};
use async_trait::async_trait;
use parley_core::{ParleyError, ParleyResult, Role, Turn};
use serde::Serialize;

/// Claude (Anthropic) API backend.
pub struct ClaudeBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl ClaudeBackend {
    /// Builds the backend and its HTTP client from `config`.
    pub fn new(config: ModelConfig) -> ParleyResult<Self> {
        let http = http_client(&config)?;
        Ok(Self { config, http })
    }
}

/// Builds the Messages API body.
///
/// The API takes system text as a top-level field and requires the first
/// message to come from the user, so system turns are folded into `system`
/// and a window that starts mid-exchange drops its leading assistant turns.
fn build_body(turns: &[Turn], context: &RunContext) -> serde_json::Value {
    let mut system_parts: Vec<&str> = context.system_prompt.iter().map(String::as_str).collect();
    system_parts.extend(
        turns
            .iter()
            .filter(|t| t.role() == Role::System)
            .map(Turn::content),
    );

    let api_messages: Vec<ClaudeMessage<'_>> = turns
        .iter()
        .filter(|t| t.role() != Role::System)
        .skip_while(|t| t.role() != Role::User)
        .map(|t| ClaudeMessage {
            role: t.role().as_str(),
            content: t.content(),
        })
        .collect();

    let mut body = serde_json::json!({
        "model": context.model_id,
        "max_tokens": context.max_tokens,
        "temperature": context.temperature,
        "messages": api_messages,
    });

    if !system_parts.is_empty() {
        body["system"] = serde_json::json!(system_parts.join("\n\n"));
    }

    body
}

#[async_trait]
impl CompletionBackend for ClaudeBackend {
    async fn complete(&self, turns: &[Turn], context: &RunContext) -> ParleyResult<String> {
        let url = format!("{}/v1/messages", self.config.base_url());
        let body = build_body(turns, context);

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(self.config.provider, e))?;

        let resp_body = read_json(self.config.provider, resp).await?;
        parse_claude_response(&resp_body)
    }
}

// -- Claude wire types --

#[derive(Serialize)]
struct ClaudeMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Joins the text blocks of a Messages API response.
pub fn parse_claude_response(body: &serde_json::Value) -> ParleyResult<String> {
    let content = body["content"]
        .as_array()
        .ok_or_else(|| ParleyError::fatal("Missing content in Claude response"))?;

    let text_parts: Vec<&str> = content
        .iter()
        .filter(|block| block["type"].as_str() == Some("text"))
        .filter_map(|block| block["text"].as_str())
        .collect();

    if text_parts.is_empty() {
        return Err(ParleyError::fatal("Claude response has no text block"));
    }
    Ok(text_parts.join("\n"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn ctx(system: Option<&str>) -> RunContext {
        RunContext {
            system_prompt: system.map(str::to_string),
            model_id: "claude-test".into(),
            temperature: 0.3,
            max_tokens: 128,
        }
    }

    #[test]
    fn system_turns_fold_into_system_field() {
        let turns = vec![
            Turn::system("Réponds en français.", 0),
            Turn::user("Hello", 1),
        ];
        let body = build_body(&turns, &ctx(Some("Tu es conseiller voyage.")));
        assert_eq!(
            body["system"],
            "Tu es conseiller voyage.\n\nRéponds en français."
        );
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn leading_assistant_turns_are_dropped() {
        let turns = vec![Turn::assistant("earlier reply", 3), Turn::user("next", 4)];
        let body = build_body(&turns, &ctx(None));
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["content"], "next");
        assert!(body.get("system").is_none());
    }

    #[test]
    fn text_blocks_are_joined() {
        let body = serde_json::json!({
            "content": [
                {"type": "text", "text": "Chamonix"},
                {"type": "text", "text": "option fondue"}
            ],
            "stop_reason": "end_turn"
        });
        assert_eq!(parse_claude_response(&body).unwrap(), "Chamonix\noption fondue");
    }

    #[test]
    fn missing_text_is_fatal() {
        let body = serde_json::json!({"content": []});
        assert!(parse_claude_response(&body).unwrap_err().is_fatal());
        assert!(parse_claude_response(&serde_json::json!({}))
            .unwrap_err()
            .is_fatal());
    }
}
