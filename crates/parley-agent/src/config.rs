use crate::provider::RetryPolicy;
use parley_core::{ParleyError, ParleyResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hosted chat-completion service a [`ModelConfig`] talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Mistral AI, OpenAI-compatible chat completions.
    Mistral,
    /// OpenAI chat completions.
    OpenAi,
    /// OpenRouter: OpenAI-compatible, needs attribution headers.
    OpenRouter,
    /// Groq cloud inference over an OpenAI-compatible API.
    Groq,
    /// Anthropic Messages API.
    Claude,
}

impl LlmProvider {
    /// Parses a provider name as written in config or the environment.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "mistral" => Some(Self::Mistral),
            "openai" => Some(Self::OpenAi),
            "openrouter" => Some(Self::OpenRouter),
            "groq" => Some(Self::Groq),
            "claude" | "anthropic" => Some(Self::Claude),
            _ => None,
        }
    }

    /// Lowercase name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mistral => "mistral",
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
            Self::Groq => "groq",
            Self::Claude => "claude",
        }
    }

    /// Provider-specific environment variable holding the credential.
    pub fn api_key_env(self) -> &'static str {
        match self {
            Self::Mistral => "MISTRAL_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::Groq => "GROQ_API_KEY",
            Self::Claude => "ANTHROPIC_API_KEY",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection and sampling settings for the completion provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Which API to talk to.
    #[serde(default = "default_provider")]
    pub provider: LlmProvider,
    /// Model name as the provider spells it.
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Usually left empty in the file and filled from the environment.
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// Overrides the provider's default endpoint.
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Sampling temperature, `0.0..=2.0`.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Upper bound on generated tokens per reply.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Retry behaviour for transient failures.
    #[serde(default)]
    pub retry_policy: RetryPolicy,
}

fn default_provider() -> LlmProvider {
    LlmProvider::Mistral
}

fn default_model_id() -> String {
    "mistral-small-latest".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: String::new(),
            api_base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("model_id", &self.model_id)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("api_base_url", &self.api_base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

impl ModelConfig {
    /// Base URL of the provider API, honouring `api_base_url` overrides.
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url.trim_end_matches('/')
        } else {
            match self.provider {
                LlmProvider::Mistral => "https://api.mistral.ai",
                LlmProvider::OpenAi => "https://api.openai.com",
                LlmProvider::OpenRouter => "https://openrouter.ai/api",
                LlmProvider::Groq => "https://api.groq.com/openai",
                LlmProvider::Claude => "https://api.anthropic.com",
            }
        }
    }
}

/// Per-thread conversation policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Instruction sent ahead of every request.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// When set, only the most recent `n` turns are sent to the provider.
    /// Stored history is never truncated.
    #[serde(default)]
    pub max_turns_per_thread: Option<usize>,
}

/// Tracing toggle and run label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Verbose tracing of every send.
    #[serde(default)]
    pub enabled: bool,
    /// Project or run label attached to every send span.
    #[serde(default)]
    pub project: Option<String>,
}

/// Everything a [`SessionManager`](crate::SessionManager) needs, built
/// once at startup and read-only afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// `[model]`
    #[serde(default)]
    pub model: ModelConfig,
    /// `[session]`
    #[serde(default)]
    pub session: SessionConfig,
    /// `[telemetry]`
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AgentConfig {
    /// Parses a TOML document. Missing sections take their defaults.
    pub fn from_toml_str(s: &str) -> ParleyResult<Self> {
        toml::from_str(s).map_err(|e| ParleyError::Configuration(format!("Invalid config: {e}")))
    }

    /// Overlays values from an environment lookup.
    ///
    /// `PARLEY_PROVIDER` and `PARLEY_MODEL` replace the file values.
    /// `PARLEY_API_KEY` always wins for the credential; otherwise the
    /// provider-specific variable (e.g. `MISTRAL_API_KEY`) fills it when the
    /// file left it empty. `PARLEY_TRACING` and `PARLEY_PROJECT` drive
    /// telemetry.
    pub fn apply_env<F>(&mut self, lookup: F) -> ParleyResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(name) = var("PARLEY_PROVIDER") {
            self.model.provider = LlmProvider::parse(&name).ok_or_else(|| {
                ParleyError::Configuration(format!("Unknown PARLEY_PROVIDER '{name}'"))
            })?;
        }
        if let Some(model) = var("PARLEY_MODEL") {
            self.model.model_id = model;
        }
        if let Some(key) = var("PARLEY_API_KEY") {
            self.model.api_key = key;
        } else if self.model.api_key.is_empty() {
            if let Some(key) = var(self.model.provider.api_key_env()) {
                self.model.api_key = key;
            }
        }
        if let Some(flag) = var("PARLEY_TRACING") {
            self.telemetry.enabled = matches!(
                flag.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(project) = var("PARLEY_PROJECT") {
            self.telemetry.project = Some(project);
        }
        Ok(())
    }

    /// Checks the static configuration. Called eagerly by
    /// [`SessionManager`](crate::SessionManager) constructors.
    pub fn validate(&self) -> ParleyResult<()> {
        let model = &self.model;
        if model.api_key.trim().is_empty() {
            return Err(ParleyError::Configuration(format!(
                "No API key for provider '{}': set {} or PARLEY_API_KEY",
                model.provider,
                model.provider.api_key_env()
            )));
        }
        if model.model_id.trim().is_empty() {
            return Err(ParleyError::Configuration("model_id must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&model.temperature) {
            return Err(ParleyError::Configuration(format!(
                "temperature must be within 0.0..=2.0, got {}",
                model.temperature
            )));
        }
        if model.max_tokens == 0 {
            return Err(ParleyError::Configuration("max_tokens must be positive".into()));
        }
        if model.request_timeout_secs == 0 {
            return Err(ParleyError::Configuration(
                "request_timeout_secs must be positive".into(),
            ));
        }
        if self.session.max_turns_per_thread == Some(0) {
            return Err(ParleyError::Configuration(
                "max_turns_per_thread must be at least 1 when set".into(),
            ));
        }
        Ok(())
    }
}

/// Static parameters sent with every completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    /// Sent ahead of the turns when set.
    pub system_prompt: Option<String>,
    /// Model name.
    pub model_id: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Reply length cap.
    pub max_tokens: u32,
}

impl RunContext {
    /// Extracts the request parameters from a validated config.
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            system_prompt: config.session.system_prompt.clone(),
            model_id: config.model.model_id.clone(),
            temperature: config.model.temperature,
            max_tokens: config.model.max_tokens,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_target_mistral_small() {
        let config = AgentConfig::from_toml_str("").unwrap();
        assert_eq!(config.model.provider, LlmProvider::Mistral);
        assert_eq!(config.model.model_id, "mistral-small-latest");
        assert_eq!(config.model.base_url(), "https://api.mistral.ai");
        assert!(config.session.max_turns_per_thread.is_none());
        assert!(!config.telemetry.enabled);
    }

    #[test]
    fn provider_specific_key_fills_empty_credential() {
        let mut config = AgentConfig::default();
        config
            .apply_env(env(&[("MISTRAL_API_KEY", "mk"), ("OPENAI_API_KEY", "ok")]))
            .unwrap();
        assert_eq!(config.model.api_key, "mk");
        config.validate().unwrap();
    }

    #[test]
    fn parley_api_key_overrides_file_value() {
        let mut config = AgentConfig::from_toml_str(
            r#"
            [model]
            provider = "openai"
            model_id = "gpt-4o-mini"
            api_key = "from-file"
            "#,
        )
        .unwrap();
        config.apply_env(env(&[("OPENAI_API_KEY", "ignored")])).unwrap();
        assert_eq!(config.model.api_key, "from-file");

        config.apply_env(env(&[("PARLEY_API_KEY", "from-env")])).unwrap();
        assert_eq!(config.model.api_key, "from-env");
    }

    #[test]
    fn provider_override_changes_key_lookup() {
        let mut config = AgentConfig::default();
        config
            .apply_env(env(&[
                ("PARLEY_PROVIDER", "anthropic"),
                ("ANTHROPIC_API_KEY", "ak"),
                ("MISTRAL_API_KEY", "mk"),
            ]))
            .unwrap();
        assert_eq!(config.model.provider, LlmProvider::Claude);
        assert_eq!(config.model.api_key, "ak");
    }

    #[test]
    fn unknown_provider_is_a_configuration_error() {
        let mut config = AgentConfig::default();
        let err = config
            .apply_env(env(&[("PARLEY_PROVIDER", "skynet")]))
            .unwrap_err();
        assert!(matches!(err, ParleyError::Configuration(_)));
    }

    #[test]
    fn tracing_toggle_and_project_label() {
        let mut config = AgentConfig::default();
        config
            .apply_env(env(&[("PARLEY_TRACING", "TRUE"), ("PARLEY_PROJECT", "demo-run")]))
            .unwrap();
        assert!(config.telemetry.enabled);
        assert_eq!(config.telemetry.project.as_deref(), Some("demo-run"));

        config.apply_env(env(&[("PARLEY_TRACING", "false")])).unwrap();
        assert!(!config.telemetry.enabled);
    }

    #[test]
    fn missing_credential_fails_validation() {
        let err = AgentConfig::default().validate().unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, ParleyError::Configuration(_)));
        assert!(msg.contains("MISTRAL_API_KEY"), "{msg}");
    }

    #[test]
    fn blank_credential_fails_validation() {
        let mut config = AgentConfig::default();
        config.apply_env(env(&[("MISTRAL_API_KEY", "   ")])).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_values_fail_validation() {
        let mut config = AgentConfig::default();
        config.model.api_key = "k".into();

        config.model.temperature = 3.5;
        assert!(config.validate().is_err());
        config.model.temperature = 0.2;

        config.session.max_turns_per_thread = Some(0);
        assert!(config.validate().is_err());
        config.session.max_turns_per_thread = Some(4);

        config.model.max_tokens = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn base_url_override_drops_trailing_slash() {
        let config = ModelConfig {
            api_base_url: Some("http://localhost:8080/".into()),
            ..ModelConfig::default()
        };
        assert_eq!(config.base_url(), "http://localhost:8080");
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let config = ModelConfig {
            api_key: "sk-secret".into(),
            ..ModelConfig::default()
        };
        let printed = format!("{config:?}");
        assert!(!printed.contains("sk-secret"));
        assert!(printed.contains("***"));
    }

    #[test]
    fn full_file_round_trips_through_toml() {
        let config = AgentConfig::from_toml_str(
            r#"
            [model]
            provider = "groq"
            model_id = "llama-3.1-8b-instant"
            temperature = 0.1
            max_tokens = 256

            [model.retry_policy]
            max_retries = 5
            backoff_base_ms = 100
            backoff_max_ms = 2000

            [session]
            system_prompt = "Tu es conseiller voyage."
            max_turns_per_thread = 8

            [telemetry]
            enabled = true
            project = "voyage"
            "#,
        )
        .unwrap();
        assert_eq!(config.model.provider, LlmProvider::Groq);
        assert_eq!(config.model.retry_policy.max_retries, 5);
        assert_eq!(config.session.max_turns_per_thread, Some(8));
        assert_eq!(config.telemetry.project.as_deref(), Some("voyage"));

        let ctx = RunContext::from_config(&config);
        assert_eq!(ctx.model_id, "llama-3.1-8b-instant");
        assert_eq!(ctx.system_prompt.as_deref(), Some("Tu es conseiller voyage."));
        assert_eq!(ctx.max_tokens, 256);
    }
}
