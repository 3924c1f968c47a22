//! Session management and completion providers for Parley.
//!
//! [`SessionManager`] keeps one transcript per conversation thread and,
//! for every user message, asks a [`CompletionProvider`] for the reply.
//! The provider wraps a single [`CompletionBackend`] (Mistral, OpenAI,
//! OpenRouter, Groq or Claude) with retry on transient failures.

/// HTTP completion backends.
pub mod backends;
/// Static configuration and the environment overlay.
pub mod config;
/// Request windowing.
pub mod context;
/// Per-thread session management.
pub mod manager;
/// Retrying completion provider.
pub mod provider;

pub use backends::{build_backend, CompletionBackend};
pub use config::{
    AgentConfig, LlmProvider, ModelConfig, RunContext, SessionConfig, TelemetryConfig,
};
pub use context::ContextWindow;
pub use manager::SessionManager;
pub use provider::{CompletionProvider, RetryPolicy};
