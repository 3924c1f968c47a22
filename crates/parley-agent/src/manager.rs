use crate::backends::{build_backend, CompletionBackend};
use crate::config::{AgentConfig, RunContext};
use crate::context::{estimated_tokens, ContextWindow};
use crate::provider::CompletionProvider;
use parley_core::{ParleyError, ParleyResult, Role, Turn};
use parley_session::{Transcript, TranscriptStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, info_span, warn, Instrument};

/// Mutable state of one thread, guarded by the thread lock.
struct ThreadState {
    transcript: Transcript,
    /// Set once the store has been consulted for this thread.
    restored: bool,
    /// The stored checkpoint exists but could not be read. Saving would
    /// overwrite it, so checkpoints are skipped until the thread is reset.
    checkpoint_unreadable: bool,
}

struct ThreadSlot {
    state: Mutex<ThreadState>,
    /// Committed history, republished after every restore, commit and
    /// reset. `None` until the thread has been restored.
    published: RwLock<Option<Vec<Turn>>>,
}

impl ThreadSlot {
    fn new(thread_id: &str) -> Self {
        Self {
            state: Mutex::new(ThreadState {
                transcript: Transcript::new(thread_id),
                restored: false,
                checkpoint_unreadable: false,
            }),
            published: RwLock::new(None),
        }
    }

    async fn publish(&self, transcript: &Transcript) {
        *self.published.write().await = Some(transcript.get_all().to_vec());
    }
}

/// The session manager: owns one transcript per thread and drives the
/// append → complete → append cycle.
///
/// Sends on the same thread are serialised by a per-thread lock held for
/// the whole cycle, so sequence indices stay contiguous. Sends on different
/// threads never wait on each other beyond a brief map lookup. Readers see
/// the last committed history and never wait for an in-flight send.
///
/// Persistence is opt-in through [`SessionManager::with_store`]. Without a
/// store, history lives only as long as the manager.
pub struct SessionManager {
    provider: CompletionProvider,
    context: RunContext,
    window: ContextWindow,
    store: Option<Arc<dyn TranscriptStore>>,
    project: Option<String>,
    threads: RwLock<HashMap<String, Arc<ThreadSlot>>>,
}

impl SessionManager {
    /// Builds a manager talking to the provider named in `config`.
    ///
    /// Fails with [`ParleyError::Configuration`] if the configuration is
    /// incomplete, e.g. when no API key is present.
    pub fn new(config: &AgentConfig) -> ParleyResult<Self> {
        config.validate()?;
        let backend = build_backend(&config.model)?;
        Ok(Self::assemble(config, backend))
    }

    /// Builds a manager around a caller-supplied backend. The configuration
    /// is validated exactly as in [`SessionManager::new`].
    pub fn with_backend(
        config: &AgentConfig,
        backend: Arc<dyn CompletionBackend>,
    ) -> ParleyResult<Self> {
        config.validate()?;
        Ok(Self::assemble(config, backend))
    }

    fn assemble(config: &AgentConfig, backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            provider: CompletionProvider::new(backend, config.model.retry_policy.clone()),
            context: RunContext::from_config(config),
            window: ContextWindow::new(config.session.max_turns_per_thread),
            store: None,
            project: config.telemetry.project.clone(),
            threads: RwLock::new(HashMap::new()),
        }
    }

    /// Enables checkpointing: transcripts are restored from `store` on first
    /// use and saved after every successful send.
    pub fn with_store(mut self, store: Arc<dyn TranscriptStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Static request parameters.
    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Returns `true` when a checkpoint store is configured.
    pub fn is_durable(&self) -> bool {
        self.store.is_some()
    }

    async fn existing_slot(&self, thread_id: &str) -> Option<Arc<ThreadSlot>> {
        self.threads.read().await.get(thread_id).cloned()
    }

    async fn slot(&self, thread_id: &str) -> Arc<ThreadSlot> {
        if let Some(slot) = self.existing_slot(thread_id).await {
            return slot;
        }
        let mut threads = self.threads.write().await;
        let slot = threads.entry(thread_id.to_string()).or_insert_with(|| {
            debug!(thread_id = %thread_id, "Creating thread");
            Arc::new(ThreadSlot::new(thread_id))
        });
        Arc::clone(slot)
    }

    /// Loads the checkpoint of a thread the first time it is touched. A
    /// failed load leaves the thread empty and blocks further saves.
    async fn restore(&self, thread_id: &str, slot: &ThreadSlot, state: &mut ThreadState) {
        if state.restored {
            return;
        }
        state.restored = true;
        if let Some(store) = &self.store {
            match store.load(thread_id).await {
                Ok(Some(transcript)) => {
                    info!(
                        thread_id = %thread_id,
                        turns = transcript.len(),
                        "Restored thread from checkpoint"
                    );
                    state.transcript = transcript;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        thread_id = %thread_id,
                        error = %e,
                        "Checkpoint load failed, starting empty; saves are suspended until reset"
                    );
                    state.checkpoint_unreadable = true;
                }
            }
        }
        slot.publish(&state.transcript).await;
    }

    async fn checkpoint(&self, thread_id: &str, state: &ThreadState) {
        let Some(store) = &self.store else {
            return;
        };
        if state.checkpoint_unreadable {
            warn!(thread_id = %thread_id, "Checkpoint not saved: stored copy was unreadable");
            return;
        }
        if let Err(e) = store.save(thread_id, &state.transcript).await {
            warn!(thread_id = %thread_id, error = %e, "Checkpoint save failed");
        }
    }

    /// Removes the stored checkpoint. Returns `false` if the store refused.
    async fn delete_checkpoint(&self, thread_id: &str) -> bool {
        let Some(store) = &self.store else {
            return true;
        };
        match store.delete(thread_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(thread_id = %thread_id, error = %e, "Checkpoint delete failed");
                false
            }
        }
    }

    /// Sends `user_text` on `thread_id` and returns the assistant's reply.
    ///
    /// Both turns are committed together once the provider answers; on
    /// error the transcript is left as it was.
    pub async fn send(&self, thread_id: &str, user_text: &str) -> ParleyResult<Turn> {
        let span = info_span!(
            "send",
            thread_id = %thread_id,
            project = self.project.as_deref().unwrap_or("-")
        );
        self.send_in_span(thread_id, user_text).instrument(span).await
    }

    async fn send_in_span(&self, thread_id: &str, user_text: &str) -> ParleyResult<Turn> {
        if user_text.trim().is_empty() {
            return Err(ParleyError::fatal("malformed request: empty user message"));
        }

        let slot = self.slot(thread_id).await;
        let mut state = slot.state.lock().await;
        self.restore(thread_id, &slot, &mut state).await;

        let user_turn = Turn::user(user_text, state.transcript.next_index());
        let request = self.window.request(state.transcript.get_all(), &user_turn);
        debug!(
            request_turns = request.len(),
            stored_turns = state.transcript.len(),
            estimated_tokens = estimated_tokens(&self.context, &request),
            "Calling completion provider"
        );

        let reply = self.provider.complete(&request, &self.context).await?;

        state.transcript.append(user_turn)?;
        let assistant = state.transcript.push(Role::Assistant, reply);
        self.checkpoint(thread_id, &state).await;
        slot.publish(&state.transcript).await;

        debug!(sequence_index = assistant.sequence_index(), "Assistant turn appended");
        Ok(assistant)
    }

    /// Full history of `thread_id`, oldest first. Unknown threads are empty.
    pub async fn get_transcript(&self, thread_id: &str) -> Vec<Turn> {
        if let Some(slot) = self.existing_slot(thread_id).await {
            if let Some(turns) = slot.published.read().await.as_ref() {
                return turns.clone();
            }
            let mut state = slot.state.lock().await;
            self.restore(thread_id, &slot, &mut state).await;
            return state.transcript.get_all().to_vec();
        }

        let Some(store) = &self.store else {
            return Vec::new();
        };
        match store.load(thread_id).await {
            Ok(Some(transcript)) => transcript.get_all().to_vec(),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(thread_id = %thread_id, error = %e, "Checkpoint load failed");
                Vec::new()
            }
        }
    }

    /// Number of turns stored for `thread_id`.
    pub async fn turn_count(&self, thread_id: &str) -> usize {
        self.get_transcript(thread_id).await.len()
    }

    /// Discards the history of `thread_id`, including its checkpoint.
    /// Resetting an empty or unknown thread is a no-op.
    pub async fn reset(&self, thread_id: &str) {
        let known = self.existing_slot(thread_id).await;
        let slot = match known.as_ref() {
            Some(slot) => Arc::clone(slot),
            None => {
                if self.delete_checkpoint(thread_id).await {
                    debug!(thread_id = %thread_id, "Reset of unknown thread");
                    return;
                }
                // The stale checkpoint is still there; pin an empty thread
                // so it is not restored later.
                self.slot(thread_id).await
            }
        };

        let mut state = slot.state.lock().await;
        if known.is_some() {
            self.delete_checkpoint(thread_id).await;
        }
        state.transcript.clear();
        state.restored = true;
        state.checkpoint_unreadable = false;
        slot.publish(&state.transcript).await;
        info!(thread_id = %thread_id, "Thread reset");
    }

    /// Ids of the threads currently held in memory, sorted.
    pub async fn thread_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.threads.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
