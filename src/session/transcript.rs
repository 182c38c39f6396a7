// src/session/transcript.rs - In-memory transcript of the active session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }
}

/// Ordered, append-only list of turns.
///
/// Timestamps never go backwards: a turn stamped earlier than the last one
/// (clock adjustment, caller-provided stamp) is clamped to the last stamp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionTranscript {
    turns: Vec<Turn>,
}

impl SessionTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn count(&self, role: Role) -> usize {
        self.turns.iter().filter(|t| t.role == role).count()
    }

    /// Time range covered by the transcript.
    pub fn span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.turns.first()?;
        let last = self.turns.last()?;
        Some((first.timestamp, last.timestamp))
    }

    /// The last `n` user/assistant turns, oldest first. System notes are skipped.
    pub fn recent_dialogue(&self, n: usize) -> Vec<&Turn> {
        let mut recent: Vec<&Turn> = self
            .turns
            .iter()
            .rev()
            .filter(|t| t.role != Role::System)
            .take(n)
            .collect();
        recent.reverse();
        recent
    }

    /// The last `n` turns of any role, oldest first.
    pub fn tail(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// Clamp the turn's timestamp so ordering stays monotonic. Returns the stamped turn.
    pub(crate) fn stamp(&self, mut turn: Turn) -> Turn {
        if let Some(last) = self.turns.last() {
            if turn.timestamp < last.timestamp {
                turn.timestamp = last.timestamp;
            }
        }
        turn
    }

    pub(crate) fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_stamp_clamps_backwards_time() {
        let mut t = SessionTranscript::new();
        let first = Turn::user("a");
        let ts = first.timestamp;
        t.push(first);

        let mut late = Turn::assistant("b");
        late.timestamp = ts - Duration::seconds(30);
        let stamped = t.stamp(late);
        assert_eq!(stamped.timestamp, ts);
    }

    #[test]
    fn test_recent_dialogue_skips_system() {
        let mut t = SessionTranscript::new();
        t.push(Turn::user("q1"));
        t.push(Turn::assistant("a1"));
        t.push(Turn::system("ran ls"));
        t.push(Turn::user("q2"));

        let recent: Vec<&str> = t.recent_dialogue(2).iter().map(|x| x.text.as_str()).collect();
        assert_eq!(recent, vec!["a1", "q2"]);
        assert_eq!(t.count(Role::System), 1);
        assert_eq!(t.tail(2).len(), 2);
        assert_eq!(t.tail(10).len(), 4);
    }

    #[test]
    fn test_empty_span() {
        assert!(SessionTranscript::new().span().is_none());
    }
}
