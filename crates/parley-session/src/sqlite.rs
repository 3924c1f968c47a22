//! SQLite-backed checkpoint store (feature `sqlite`).
//!
//! One row per thread holding the JSON-encoded transcript. Queries run on
//! the blocking pool so the async runtime never waits on disk I/O.

use crate::store::TranscriptStore;
use crate::transcript::Transcript;
use async_trait::async_trait;
use chrono::Utc;
use parley_core::{ParleyError, ParleyResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS transcripts (
    thread_id  TEXT PRIMARY KEY,
    body       TEXT NOT NULL,
    turn_count INTEGER NOT NULL,
    updated_at TEXT NOT NULL
)";

/// Transcript store backed by an embedded SQLite database.
#[derive(Clone)]
pub struct SqliteTranscriptStore {
    conn: Arc<Mutex<Connection>>,
}

fn db_err(e: rusqlite::Error) -> ParleyError {
    ParleyError::Persistence(format!("SQLite error: {e}"))
}

impl SqliteTranscriptStore {
    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> ParleyResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        Self::with_connection(conn)
    }

    /// A private in-memory database, mostly useful in tests.
    pub fn open_in_memory() -> ParleyResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> ParleyResult<Self> {
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, op: F) -> ParleyResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> ParleyResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| ParleyError::Persistence("SQLite connection poisoned".into()))?;
            op(&guard)
        })
        .await
        .map_err(|e| ParleyError::Persistence(format!("SQLite task failed: {e}")))?
    }
}

#[async_trait]
impl TranscriptStore for SqliteTranscriptStore {
    async fn save(&self, thread_id: &str, transcript: &Transcript) -> ParleyResult<()> {
        let thread_id = thread_id.to_string();
        let body = serde_json::to_string(transcript)?;
        let turn_count = transcript.len() as i64;
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO transcripts (thread_id, body, turn_count, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(thread_id) DO UPDATE SET
                    body = excluded.body,
                    turn_count = excluded.turn_count,
                    updated_at = excluded.updated_at",
                params![thread_id, body, turn_count, Utc::now().to_rfc3339()],
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await
    }

    async fn load(&self, thread_id: &str) -> ParleyResult<Option<Transcript>> {
        let thread_id = thread_id.to_string();
        let body: Option<String> = self
            .run(move |conn| {
                conn.query_row(
                    "SELECT body FROM transcripts WHERE thread_id = ?1",
                    params![thread_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)
            })
            .await?;

        body.map(|b| {
            serde_json::from_str(&b).map_err(|e| {
                ParleyError::Persistence(format!("Failed to parse stored transcript: {e}"))
            })
        })
        .transpose()
    }

    async fn delete(&self, thread_id: &str) -> ParleyResult<()> {
        let thread_id = thread_id.to_string();
        self.run(move |conn| {
            conn.execute(
                "DELETE FROM transcripts WHERE thread_id = ?1",
                params![thread_id],
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await
    }

    async fn list(&self) -> ParleyResult<Vec<String>> {
        self.run(|conn| {
            let mut stmt = conn
                .prepare("SELECT thread_id FROM transcripts ORDER BY thread_id")
                .map_err(db_err)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(db_err)?;
            let ids = rows.collect::<Result<Vec<_>, _>>().map_err(db_err)?;
            Ok(ids)
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use parley_core::Role;

    #[tokio::test]
    async fn upsert_replaces_previous_checkpoint() {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();
        let mut t = Transcript::new("42");
        t.push(Role::User, "one");
        store.save("42", &t).await.unwrap();

        t.push(Role::Assistant, "two");
        store.save("42", &t).await.unwrap();

        let loaded = store.load("42").await.unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(store.list().await.unwrap(), vec!["42".to_string()]);
    }

    #[tokio::test]
    async fn missing_thread_loads_as_none() {
        let store = SqliteTranscriptStore::open_in_memory().unwrap();
        assert!(store.load("nope").await.unwrap().is_none());
        store.delete("nope").await.unwrap();
    }

    #[tokio::test]
    async fn survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("db").join("threads.sqlite");
        {
            let store = SqliteTranscriptStore::open(&path).unwrap();
            let mut t = Transcript::new("a");
            t.push(Role::User, "persist me");
            store.save("a", &t).await.unwrap();
        }
        let store = SqliteTranscriptStore::open(&path).unwrap();
        let loaded = store.load("a").await.unwrap().unwrap();
        assert_eq!(loaded.get_all()[0].content(), "persist me");
    }
}
