use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The role of the participant that authored a [`Turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human end-user.
    User,
    /// The AI assistant.
    Assistant,
    /// A system-level instruction.
    System,
}

impl Role {
    /// Wire name of the role, as used by chat-completion APIs.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message exchanged within a conversation thread.
///
/// Turns are immutable once created; the sequence index is assigned by the
/// transcript that will hold the turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: String,
    sequence_index: u64,
    timestamp: DateTime<Utc>,
}

impl Turn {
    /// Creates a turn stamped with the current time.
    pub fn new(role: Role, content: impl Into<String>, sequence_index: u64) -> Self {
        Self {
            role,
            content: content.into(),
            sequence_index,
            timestamp: Utc::now(),
        }
    }

    /// Creates a turn with [`Role::User`].
    pub fn user(content: impl Into<String>, sequence_index: u64) -> Self {
        Self::new(Role::User, content, sequence_index)
    }

    /// Creates a turn with [`Role::Assistant`].
    pub fn assistant(content: impl Into<String>, sequence_index: u64) -> Self {
        Self::new(Role::Assistant, content, sequence_index)
    }

    /// Creates a turn with [`Role::System`].
    pub fn system(content: impl Into<String>, sequence_index: u64) -> Self {
        Self::new(Role::System, content, sequence_index)
    }

    /// Author of the turn.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Text of the turn.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Position of the turn within its thread, starting at 0.
    pub fn sequence_index(&self) -> u64 {
        self.sequence_index
    }

    /// UTC time the turn was created.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
