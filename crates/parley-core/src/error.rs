/// Top-level error type for Parley.
///
/// Each variant corresponds to one failure class a caller may want to
/// handle differently.
#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    /// Missing or invalid static configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A turn was appended out of sequence. Indicates a programming defect.
    #[error("Ordering error: expected sequence index {expected}, got {got}")]
    Ordering {
        /// The index the transcript was ready to accept.
        expected: u64,
        /// The index carried by the rejected turn.
        got: u64,
    },

    /// The completion provider failed.
    ///
    /// `fatal` separates failures that are worth retrying (timeouts, rate
    /// limits, upstream 5xx) from those that are not (rejected credential,
    /// malformed request).
    #[error("Provider error ({}): {message}", failure_class(.fatal))]
    Provider {
        /// Human-readable description, usually including the upstream body.
        message: String,
        /// `true` when retrying cannot succeed.
        fatal: bool,
        /// HTTP status returned by the provider, when there was one.
        status: Option<u16>,
    },

    /// Saving or loading a transcript failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`ParleyError`].
pub type ParleyResult<T> = Result<T, ParleyError>;

fn failure_class(fatal: &bool) -> &'static str {
    if *fatal {
        "fatal"
    } else {
        "transient"
    }
}

impl ParleyError {
    /// A provider failure that may succeed if retried.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            fatal: false,
            status: None,
        }
    }

    /// A provider failure that must not be retried.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            fatal: true,
            status: None,
        }
    }

    /// Classifies an HTTP error status returned by a provider.
    ///
    /// 408, 429 and every 5xx are transient; everything else is fatal.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let transient = status == 408 || status == 429 || (500..600).contains(&status);
        Self::Provider {
            message: message.into(),
            fatal: !transient,
            status: Some(status),
        }
    }

    /// Returns `true` for provider errors that should be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Provider { fatal: false, .. })
    }

    /// Returns `true` for provider errors flagged as non-retryable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Provider { fatal: true, .. })
    }
}
