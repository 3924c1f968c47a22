//! Conversation transcripts and the stores that checkpoint them.
//!
//! A [`Transcript`] is the ordered history of one thread. A
//! [`TranscriptStore`] saves and restores transcripts across process
//! restarts; using one is opt-in, and without it history is volatile.

/// Checkpoint stores.
pub mod store;
/// Ordered per-thread history.
pub mod transcript;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use store::{FileTranscriptStore, MemoryTranscriptStore, TranscriptStore};
pub use transcript::Transcript;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteTranscriptStore;
