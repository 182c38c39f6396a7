// src/cli/sessions.rs - Session listing and latest.md output

use std::path::Path;

use crate::session::{list_sessions, LATEST_FILE};

/// Session id named in the header of `latest.md`, if any.
fn current_session_id(dir: &Path) -> Option<String> {
    let content = std::fs::read_to_string(dir.join(LATEST_FILE)).ok()?;
    content
        .lines()
        .next()?
        .strip_prefix("# Chat Session ")
        .map(|id| id.trim().to_string())
}

pub fn run_sessions(dir: &Path, limit: usize) -> anyhow::Result<()> {
    if !dir.exists() {
        println!("No sessions yet ({} does not exist).", dir.display());
        return Ok(());
    }

    let sessions = list_sessions(dir)?;
    if sessions.is_empty() {
        println!("No sessions in {}.", dir.display());
        return Ok(());
    }

    let current = current_session_id(dir);
    for session in sessions.iter().take(limit) {
        let size = std::fs::metadata(&session.path).map(|m| m.len()).unwrap_or(0);
        let marker = if current.as_deref() == Some(session.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {}  {:>8}  {}",
            session.id,
            crate::actions::files::human_size(size),
            session.path.display()
        );
    }
    if sessions.len() > limit {
        println!("  ... and {} more", sessions.len() - limit);
    }
    Ok(())
}

pub fn run_latest(dir: &Path) -> anyhow::Result<()> {
    let path = dir.join(LATEST_FILE);
    let content = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
    print!("{content}");
    Ok(())
}
