use crate::transcript::Transcript;
use async_trait::async_trait;
use parley_core::{ParleyError, ParleyResult};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Durable checkpoint storage for transcripts, keyed by thread id.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Stores `transcript` as the latest state of `thread_id`, replacing
    /// any earlier checkpoint.
    async fn save(&self, thread_id: &str, transcript: &Transcript) -> ParleyResult<()>;
    /// Returns the latest checkpoint of `thread_id`, or `None` if there is
    /// none.
    async fn load(&self, thread_id: &str) -> ParleyResult<Option<Transcript>>;
    /// Removes the checkpoint of `thread_id`. Deleting an unknown thread is
    /// not an error.
    async fn delete(&self, thread_id: &str) -> ParleyResult<()>;
    /// Ids of every checkpointed thread, sorted.
    async fn list(&self) -> ParleyResult<Vec<String>>;
}

// ---------------------------------------------------------------------------
// MemoryTranscriptStore
// ---------------------------------------------------------------------------

/// Process-local store. Survives `reset` of a manager but not a restart.
#[derive(Default)]
pub struct MemoryTranscriptStore {
    transcripts: RwLock<HashMap<String, Transcript>>,
}

impl MemoryTranscriptStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TranscriptStore for MemoryTranscriptStore {
    async fn save(&self, thread_id: &str, transcript: &Transcript) -> ParleyResult<()> {
        self.transcripts
            .write()
            .await
            .insert(thread_id.to_string(), transcript.clone());
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> ParleyResult<Option<Transcript>> {
        Ok(self.transcripts.read().await.get(thread_id).cloned())
    }

    async fn delete(&self, thread_id: &str) -> ParleyResult<()> {
        self.transcripts.write().await.remove(thread_id);
        Ok(())
    }

    async fn list(&self) -> ParleyResult<Vec<String>> {
        let mut ids: Vec<String> = self.transcripts.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// FileTranscriptStore
// ---------------------------------------------------------------------------

/// Longest hex stem used verbatim as a file name.
const MAX_HEX_STEM: usize = 200;
/// Hex characters kept ahead of the digest for long ids.
const LONG_ID_PREFIX: usize = 64;

/// File stem for `thread_id`: its hex encoding, or a hex prefix plus the
/// SHA-256 of the id when the encoding would not fit in a file name.
fn file_stem(thread_id: &str) -> String {
    let encoded = hex::encode(thread_id);
    if encoded.len() <= MAX_HEX_STEM {
        return encoded;
    }
    let digest = Sha256::digest(thread_id.as_bytes());
    format!("{}-{}", &encoded[..LONG_ID_PREFIX], hex::encode(digest))
}

/// One pretty-printed JSON file per thread.
///
/// File names are derived from the thread id and stay under the usual
/// 255-byte limit. The id stored inside each file is authoritative.
pub struct FileTranscriptStore {
    dir: PathBuf,
}

impl FileTranscriptStore {
    /// Opens (and creates if needed) a store rooted at `dir`.
    pub async fn new(dir: PathBuf) -> ParleyResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn transcript_path(&self, thread_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(thread_id)))
    }
}

/// Thread id recorded in a checkpoint file, or `None` if the file is not a
/// readable checkpoint.
async fn stored_thread_id(path: &Path) -> Option<String> {
    let data = tokio::fs::read_to_string(path).await.ok()?;
    serde_json::from_str::<Transcript>(&data)
        .ok()
        .map(|t| t.thread_id().to_string())
}

#[async_trait]
impl TranscriptStore for FileTranscriptStore {
    async fn save(&self, thread_id: &str, transcript: &Transcript) -> ParleyResult<()> {
        let path = self.transcript_path(thread_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(transcript)?;
        // Write then rename so a crash never leaves a truncated checkpoint.
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> ParleyResult<Option<Transcript>> {
        let path = self.transcript_path(thread_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let transcript: Transcript = serde_json::from_str(&data).map_err(|e| {
            ParleyError::Persistence(format!(
                "Failed to parse checkpoint {}: {e}",
                path.display()
            ))
        })?;
        if transcript.thread_id() != thread_id {
            return Err(ParleyError::Persistence(format!(
                "Checkpoint {} belongs to thread '{}'",
                path.display(),
                transcript.thread_id()
            )));
        }
        Ok(Some(transcript))
    }

    async fn delete(&self, thread_id: &str) -> ParleyResult<()> {
        let path = self.transcript_path(thread_id);
        if path.exists() {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn list(&self) -> ParleyResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match stored_thread_id(&path).await {
                Some(id) => ids.push(id),
                None => tracing::debug!(
                    file = %path.display(),
                    "Ignoring foreign file in checkpoint dir"
                ),
            }
        }
        ids.sort();
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
