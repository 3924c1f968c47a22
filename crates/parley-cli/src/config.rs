use parley_agent::AgentConfig;
use parley_session::{FileTranscriptStore, TranscriptStore};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Default config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "parley.toml";

/// Contents of `parley.toml`. The agent sections (`[model]`, `[session]`,
/// `[telemetry]`) sit at the top level next to the CLI-only ones.
#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// One JSON file per thread.
    #[default]
    File,
    /// A single SQLite database (needs the `sqlite` feature).
    Sqlite,
}

/// Checkpointing. Off unless `enabled = true`.
#[derive(Debug, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// JSON lines on stderr; `false` switches to the human-readable format.
    #[serde(default = "default_json")]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: default_json(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data/threads")
}
fn default_json() -> bool {
    true
}

impl AppConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Reads the config file, then overlays the process environment.
    ///
    /// An explicit `path` must exist. Without one, `parley.toml` is used if
    /// present and defaults otherwise, so an env-only setup works.
    pub async fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
                    anyhow::anyhow!("Failed to read config file '{}': {e}", path.display())
                })?;
                Self::from_toml_str(&raw)?
            }
            None => match tokio::fs::read_to_string(DEFAULT_CONFIG_PATH).await {
                Ok(raw) => Self::from_toml_str(&raw)?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
                Err(e) => anyhow::bail!("Failed to read {DEFAULT_CONFIG_PATH}: {e}"),
            },
        };

        config.agent.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Opens the configured checkpoint store, or `None` when persistence is
    /// disabled.
    pub async fn open_store(&self) -> anyhow::Result<Option<Arc<dyn TranscriptStore>>> {
        let persistence = &self.persistence;
        if !persistence.enabled {
            return Ok(None);
        }

        let store: Arc<dyn TranscriptStore> = match persistence.backend {
            StoreBackend::File => {
                Arc::new(FileTranscriptStore::new(persistence.path.clone()).await?)
            }
            #[cfg(feature = "sqlite")]
            StoreBackend::Sqlite => Arc::new(parley_session::SqliteTranscriptStore::open(
                &persistence.path,
            )?),
            #[cfg(not(feature = "sqlite"))]
            StoreBackend::Sqlite => {
                anyhow::bail!("sqlite persistence requires building with --features sqlite")
            }
        };

        info!(
            backend = ?persistence.backend,
            path = %persistence.path.display(),
            "Checkpoint store opened"
        );
        Ok(Some(store))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use parley_agent::LlmProvider;

    #[test]
    fn empty_file_gives_volatile_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert!(!config.persistence.enabled);
        assert_eq!(config.persistence.backend, StoreBackend::File);
        assert!(config.logging.json);
        assert!(matches!(config.agent.model.provider, LlmProvider::Mistral));
    }

    #[test]
    fn full_file_parses() {
        let config = AppConfig::from_toml_str(
            r#"
            [model]
            provider = "claude"
            model_id = "claude-sonnet-4"
            temperature = 0.2

            [model.retry_policy]
            max_retries = 5

            [session]
            system_prompt = "Tu es un conseiller voyage."
            max_turns_per_thread = 20

            [telemetry]
            enabled = true
            project = "voyage"

            [persistence]
            enabled = true
            backend = "sqlite"
            path = "/var/lib/parley/threads.db"

            [logging]
            json = false
            "#,
        )
        .unwrap();

        assert!(matches!(config.agent.model.provider, LlmProvider::Claude));
        assert_eq!(config.agent.model.retry_policy.max_retries, 5);
        assert_eq!(config.agent.model.retry_policy.backoff_base_ms, 500);
        assert_eq!(config.agent.session.max_turns_per_thread, Some(20));
        assert_eq!(config.agent.telemetry.project.as_deref(), Some("voyage"));
        assert_eq!(config.persistence.backend, StoreBackend::Sqlite);
        assert!(!config.logging.json);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err = AppConfig::from_toml_str("[persistence]\nbackend = \"redis\"\n");
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(AppConfig::load(Some(&missing)).await.is_err());
    }

    #[tokio::test]
    async fn disabled_persistence_opens_nothing() {
        let config = AppConfig::default();
        assert!(config.open_store().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_is_created_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.persistence.enabled = true;
        config.persistence.path = dir.path().join("threads");

        let store = config.open_store().await.unwrap().unwrap();
        assert!(store.list().await.unwrap().is_empty());
        assert!(dir.path().join("threads").is_dir());
    }
}
