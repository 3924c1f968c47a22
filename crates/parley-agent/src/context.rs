use crate::config::RunContext;
use parley_core::Turn;

/// Chooses which turns of a thread are sent to the provider.
///
/// With a limit of `n`, only the `n` most recent turns go into the request.
/// The stored transcript is never touched.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextWindow {
    max_turns: Option<usize>,
}

impl ContextWindow {
    /// A window of `max_turns` turns; `None` sends the whole history.
    pub fn new(max_turns: Option<usize>) -> Self {
        Self { max_turns }
    }

    /// Request turns for a send: the windowed tail of `history` followed by
    /// the `pending` user turn, which is always included.
    pub fn request(&self, history: &[Turn], pending: &Turn) -> Vec<Turn> {
        let room = self
            .max_turns
            .map_or(history.len(), |max| max.saturating_sub(1));
        let start = history.len().saturating_sub(room);
        let mut turns = Vec::with_capacity(history.len() - start + 1);
        turns.extend_from_slice(&history[start..]);
        turns.push(pending.clone());
        turns
    }
}

/// Rough token estimation (4 chars ≈ 1 token).
pub fn estimated_tokens(context: &RunContext, turns: &[Turn]) -> usize {
    let sys_tokens = context
        .system_prompt
        .as_ref()
        .map(|s| s.len() / 4)
        .unwrap_or(0);
    let turn_tokens: usize = turns.iter().map(|t| t.content().len() / 4).sum();
    sys_tokens + turn_tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::Role;

    fn history(n: u64) -> Vec<Turn> {
        (0..n)
            .map(|i| {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                Turn::new(role, format!("turn {i}"), i)
            })
            .collect()
    }

    #[test]
    fn request_keeps_most_recent_turns() {
        let turns = history(5);
        let pending = Turn::user("next", 5);
        let req = ContextWindow::new(Some(2)).request(&turns, &pending);
        assert_eq!(req.len(), 2);
        assert_eq!(req[0].content(), "turn 4");
        assert_eq!(req[1].content(), "next");
        // Source history is untouched.
        assert_eq!(turns.len(), 5);
    }

    #[test]
    fn request_under_limit_sends_everything() {
        let turns = history(3);
        let pending = Turn::user("next", 3);
        assert_eq!(ContextWindow::new(Some(10)).request(&turns, &pending).len(), 4);
        assert_eq!(ContextWindow::default().request(&turns, &pending).len(), 4);
    }

    #[test]
    fn request_always_ends_with_pending_turn() {
        let turns = history(4);
        let pending = Turn::user("new question", 4);

        let req = ContextWindow::new(Some(3)).request(&turns, &pending);
        let indices: Vec<u64> = req.iter().map(Turn::sequence_index).collect();
        assert_eq!(indices, vec![2, 3, 4]);

        let req = ContextWindow::new(Some(1)).request(&turns, &pending);
        assert_eq!(req.len(), 1);
        assert_eq!(req[0].content(), "new question");

        let req = ContextWindow::new(None).request(&turns, &pending);
        assert_eq!(req.len(), 5);
    }

    #[test]
    fn token_estimate_counts_system_prompt() {
        let context = RunContext {
            system_prompt: Some("x".repeat(40)),
            model_id: "m".into(),
            temperature: 0.0,
            max_tokens: 1,
        };
        let turns = vec![Turn::user("y".repeat(80), 0)];
        assert_eq!(estimated_tokens(&context, &turns), 30);
    }
}
