// src/actions/history.rs - Transcript summary for /history

use crate::session::format::TIMESTAMP_FORMAT;
use crate::session::{Role, SessionFile, SessionTranscript};
use crate::util::preview;

pub const NO_HISTORY: &str = "📭 No history yet. Just type something!";
const PREVIEW_BYTES: usize = 200;

pub fn summarize(session: &SessionFile, transcript: &SessionTranscript, last: Option<usize>) -> String {
    let Some((from, to)) = transcript.span() else {
        return NO_HISTORY.to_string();
    };

    let mut out = format!(
        "📝 *Session:* `{}`\n\
         👤 {} messages · 🤖 {} replies · 📌 {} notes\n\
         🕒 {} → {}\n\
         💾 `{}`",
        session.id,
        transcript.count(Role::User),
        transcript.count(Role::Assistant),
        transcript.count(Role::System),
        from.format(TIMESTAMP_FORMAT),
        to.format(TIMESTAMP_FORMAT),
        session.path.display(),
    );

    if let Some(n) = last.filter(|n| *n > 0) {
        let turns = transcript.tail(n);
        out.push_str(&format!("\n\n*Last {} turns:*", turns.len()));
        for turn in turns {
            out.push_str(&format!(
                "\n{} {}: {}",
                turn.timestamp.format("%H:%M:%S"),
                turn.role.as_str(),
                preview(&turn.text, PREVIEW_BYTES)
            ));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStore;
    use crate::session::Turn;
    use tempfile::TempDir;

    #[test]
    fn test_empty_transcript_reports_no_history() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(dir.path(), dir.path()).unwrap();
        let text = summarize(store.current(), store.current_transcript(), None);
        assert_eq!(text, NO_HISTORY);
    }

    #[test]
    fn test_summary_counts_and_tail() {
        let dir = TempDir::new().unwrap();
        let mut store = SessionStore::open(dir.path(), dir.path()).unwrap();
        store.append(Turn::user("Hello")).unwrap();
        store.append(Turn::assistant("Hi")).unwrap();
        store.append(Turn::system("ran `ls`")).unwrap();

        let text = summarize(store.current(), store.current_transcript(), Some(2));
        assert!(text.contains("1 messages"));
        assert!(text.contains("1 replies"));
        assert!(text.contains("1 notes"));
        assert!(text.contains("*Last 2 turns:*"));
        assert!(text.contains("assistant: Hi"));
        assert!(!text.contains("user: Hello"));
    }

    #[test]
    fn test_long_turns_are_previewed() {
        let dir = TempDir::new().unwrap();
        let mut store = SessionStore::open(dir.path(), dir.path()).unwrap();
        store.append(Turn::user("x".repeat(500))).unwrap();
        let text = summarize(store.current(), store.current_transcript(), Some(1));
        assert!(text.ends_with('…'));
    }
}
