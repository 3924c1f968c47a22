use parley_core::{ParleyError, ParleyResult, Role, Turn};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Transcript
// ---------------------------------------------------------------------------

/// Ordered history of the turns of a single thread.
///
/// Sequence indices are always `0..len()`, in order. Every mutation goes
/// through [`Transcript::append`] or removes turns from the tail, so the
/// invariant cannot be broken from outside; deserialization re-checks it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TranscriptRecord")]
pub struct Transcript {
    thread_id: String,
    turns: Vec<Turn>,
}

/// Unvalidated on-disk shape of a [`Transcript`].
#[derive(Deserialize)]
struct TranscriptRecord {
    thread_id: String,
    turns: Vec<Turn>,
}

impl TryFrom<TranscriptRecord> for Transcript {
    type Error = ParleyError;

    fn try_from(record: TranscriptRecord) -> ParleyResult<Self> {
        Transcript::from_turns(record.thread_id, record.turns)
    }
}

impl Transcript {
    /// An empty transcript for `thread_id`.
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            turns: Vec::new(),
        }
    }

    /// Rebuilds a transcript from previously stored turns, checking that
    /// their indices are contiguous from 0.
    pub fn from_turns(thread_id: impl Into<String>, turns: Vec<Turn>) -> ParleyResult<Self> {
        let mut transcript = Self::new(thread_id);
        transcript.turns.reserve(turns.len());
        for turn in turns {
            transcript.append(turn)?;
        }
        Ok(transcript)
    }

    /// Identifier of the thread this transcript belongs to.
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Appends `turn`, which must carry exactly the next sequence index.
    pub fn append(&mut self, turn: Turn) -> ParleyResult<()> {
        let expected = self.next_index();
        if turn.sequence_index() != expected {
            return Err(ParleyError::Ordering {
                expected,
                got: turn.sequence_index(),
            });
        }
        self.turns.push(turn);
        Ok(())
    }

    /// Creates a turn with the next sequence index, appends it and returns
    /// a copy.
    pub fn push(&mut self, role: Role, content: impl Into<String>) -> Turn {
        let turn = Turn::new(role, content, self.next_index());
        self.turns.push(turn.clone());
        turn
    }

    /// All turns, oldest first.
    pub fn get_all(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns `true` when the transcript holds no turns.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Sequence index the next appended turn must carry.
    pub fn next_index(&self) -> u64 {
        self.turns.len() as u64
    }

    /// Most recent turn, if any.
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Drops every turn. The next append starts again at index 0.
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn append_accepts_contiguous_indices() {
        let mut t = Transcript::new("a");
        t.append(Turn::user("hi", 0)).unwrap();
        t.append(Turn::assistant("hello", 1)).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.next_index(), 2);
        assert_eq!(t.last().unwrap().content(), "hello");
    }

    #[test]
    fn append_rejects_gap() {
        let mut t = Transcript::new("a");
        t.append(Turn::user("hi", 0)).unwrap();
        let err = t.append(Turn::assistant("skipped", 2)).unwrap_err();
        assert!(matches!(err, ParleyError::Ordering { expected: 1, got: 2 }));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn append_rejects_replay() {
        let mut t = Transcript::new("a");
        t.append(Turn::user("hi", 0)).unwrap();
        let err = t.append(Turn::user("again", 0)).unwrap_err();
        assert!(matches!(err, ParleyError::Ordering { expected: 1, got: 0 }));
    }

    #[test]
    fn push_assigns_next_index() {
        let mut t = Transcript::new("a");
        let first = t.push(Role::User, "one");
        let second = t.push(Role::Assistant, "two");
        assert_eq!(first.sequence_index(), 0);
        assert_eq!(second.sequence_index(), 1);
        let indices: Vec<u64> = t.get_all().iter().map(Turn::sequence_index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn clear_restarts_indices() {
        let mut t = Transcript::new("a");
        t.push(Role::User, "one");
        t.push(Role::Assistant, "two");
        assert_eq!(t.last().unwrap().content(), "two");

        t.clear();
        assert!(t.is_empty());
        assert_eq!(t.push(Role::User, "fresh").sequence_index(), 0);
    }

    #[test]
    fn from_turns_validates_order() {
        let ok = Transcript::from_turns("a", vec![Turn::user("x", 0), Turn::assistant("y", 1)]);
        assert_eq!(ok.unwrap().len(), 2);

        let bad = Transcript::from_turns("a", vec![Turn::user("x", 1)]);
        assert!(matches!(bad, Err(ParleyError::Ordering { .. })));
    }

    #[test]
    fn deserialization_rechecks_invariant() {
        let mut t = Transcript::new("thread-7");
        t.push(Role::User, "hi");
        t.push(Role::Assistant, "hello");
        let json = serde_json::to_string(&t).unwrap();
        let back: Transcript = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);

        let tampered = json.replace("\"sequence_index\":1", "\"sequence_index\":4");
        assert!(serde_json::from_str::<Transcript>(&tampered).is_err());
    }
}
