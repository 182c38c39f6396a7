// src/session/format.rs - Markdown layout of session files
//
// One header block per file, then one block per turn in append order. The
// rendered file is the concatenation of `render_header` and every
// `render_turn`, so appends never rewrite earlier bytes.

use std::path::Path;

use super::transcript::{Role, SessionTranscript, Turn};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

fn icon(role: Role) -> &'static str {
    match role {
        Role::User => "👤",
        Role::Assistant => "🤖",
        Role::System => "📌",
    }
}

pub fn render_header(session_id: &str, project_dir: &Path) -> String {
    format!(
        "# Chat Session {session_id}\n\
         \n\
         > Chat bridge continuity log. Reference this file to continue the conversation in your IDE.\n\
         > Project directory: `{}`\n\
         \n\
         ---\n\
         \n",
        project_dir.display()
    )
}

pub fn render_turn(turn: &Turn) -> String {
    format!(
        "## {} {} · {}\n\n{}\n\n",
        icon(turn.role),
        turn.role.as_str(),
        turn.timestamp.format(TIMESTAMP_FORMAT),
        turn.text.trim_end()
    )
}

/// Full file content for a transcript.
pub fn render(session_id: &str, project_dir: &Path, transcript: &SessionTranscript) -> String {
    let mut out = render_header(session_id, project_dir);
    for turn in transcript.turns() {
        out.push_str(&render_turn(turn));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_render_turn_block() {
        let turn = Turn {
            role: Role::Assistant,
            text: "Hi\n".into(),
            timestamp: chrono::Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        };
        assert_eq!(
            render_turn(&turn),
            "## 🤖 assistant · 2026-01-02 03:04:05 UTC\n\nHi\n\n"
        );
    }

    #[test]
    fn test_header_names_session_and_project() {
        let h = render_header("2026-01-02_030405_000", Path::new("/work"));
        assert!(h.starts_with("# Chat Session 2026-01-02_030405_000\n"));
        assert!(h.contains("`/work`"));
        assert!(h.ends_with("---\n\n"));
    }

    #[test]
    fn test_render_concatenates_blocks() {
        let mut t = SessionTranscript::new();
        t.push(Turn::user("Hello"));
        t.push(Turn::assistant("Hi"));
        let full = render("s", Path::new("/p"), &t);
        let expected = format!(
            "{}{}{}",
            render_header("s", Path::new("/p")),
            render_turn(&t.turns()[0]),
            render_turn(&t.turns()[1])
        );
        assert_eq!(full, expected);
    }
}
