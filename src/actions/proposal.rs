// src/actions/proposal.rs - AI-proposed file edits, new files and task plans
//
// A proposal is generated first and held until the owner approves it. Only
// an approved edit or create touches the filesystem.

use std::path::{Path, PathBuf};

use crate::infra::errors::BridgeError;

/// Proposal previews are cut here so the approval prompt fits one message.
pub const PREVIEW_CHARS: usize = 3000;
const MAX_DIFF_CELLS: usize = 4_000_000;
const PLAN_LISTING_ENTRIES: usize = 30;

/// A generated change waiting for ✅ or ❌.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    Edit {
        path: PathBuf,
        original: String,
        new_content: String,
        diff: String,
        instructions: String,
    },
    Create {
        path: PathBuf,
        content: String,
        description: String,
    },
    Task {
        description: String,
        plan: String,
    },
}

impl PendingAction {
    pub fn kind(&self) -> &'static str {
        match self {
            PendingAction::Edit { .. } => "edit",
            PendingAction::Create { .. } => "create",
            PendingAction::Task { .. } => "task",
        }
    }

    /// Approval prompt shown to the owner.
    pub fn preview(&self) -> String {
        match self {
            PendingAction::Edit { path, diff, .. } => format!(
                "✏️ *Proposed edit to* `{}`:\n\n```diff\n{}\n```\n\nReply ✅ to apply or ❌ to cancel.",
                display_name(path),
                cut(diff)
            ),
            PendingAction::Create { path, content, .. } => format!(
                "🆕 *New file:* `{}`\n\n```\n{}\n```\n\nReply ✅ to create or ❌ to cancel.",
                display_name(path),
                cut(content)
            ),
            PendingAction::Task { plan, .. } => format!(
                "🚀 *Task Plan:*\n\n{}\n\nReply ✅ to execute or ❌ to cancel.",
                cut(plan)
            ),
        }
    }
}

fn cut(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}\n... (truncated)", &text[..idx]),
        None => text.to_string(),
    }
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn edit_prompt(path: &Path, instructions: &str, original: &str) -> String {
    format!(
        "Edit the following file according to the instructions.\n\n\
         File: `{}`\n\
         Instructions: {instructions}\n\n\
         Current contents:\n```\n{original}\n```\n\n\
         Return ONLY the complete updated file contents, with no explanation \
         and no markdown code fences.",
        path.display()
    )
}

pub fn create_prompt(path: &Path, description: &str) -> String {
    format!(
        "Generate the contents of a new file.\n\n\
         File path: `{}`\n\
         Description: {description}\n\n\
         Return ONLY the complete file contents, with no explanation \
         and no markdown code fences.",
        path.display()
    )
}

pub fn plan_prompt(description: &str, project_dir: &Path, entries: &[String]) -> String {
    let listing = if entries.is_empty() {
        "  (empty or unreadable)".to_string()
    } else {
        entries
            .iter()
            .take(PLAN_LISTING_ENTRIES)
            .map(|e| format!("  - {e}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "Plan a coding task.\n\n\
         Task: {description}\n\
         Working directory: `{}`\n\
         Files in project:\n{listing}\n\n\
         Create a concise step-by-step plan. For each step give the action \
         (create file, edit file, run command), the file or command, and what \
         the change does. Format each step as: `STEP N: [ACTION] [target]: [description]`",
        project_dir.display()
    )
}

pub fn execute_prompt(plan: &str, project_dir: &Path) -> String {
    format!(
        "Execute this plan by providing the actual file contents and commands.\n\n\
         Plan:\n{plan}\n\n\
         Working directory: `{}`\n\n\
         For each step provide the COMPLETE implementation. For file creates \
         and edits use:\nFILE: <path>\n```\n<complete file contents>\n```\n\n\
         For commands use:\nRUN: <command>",
        project_dir.display()
    )
}

/// Drop a surrounding markdown fence (and its language tag) from model output.
pub fn strip_code_fences(text: &str) -> String {
    let mut body = text.trim();
    if body.starts_with("```") {
        body = match body.find('\n') {
            Some(nl) => &body[nl + 1..],
            None => "",
        };
    }
    if let Some(stripped) = body.strip_suffix("```") {
        body = stripped.trim_end();
    }
    body.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Keep,
    Remove,
    Add,
}

/// Line edit script from an LCS table. Very large inputs fall back to
/// "remove everything, add everything".
fn edit_script<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<(Op, &'a str)> {
    let (n, m) = (old.len(), new.len());
    if n.saturating_mul(m) > MAX_DIFF_CELLS {
        let mut ops: Vec<_> = old.iter().map(|l| (Op::Remove, *l)).collect();
        ops.extend(new.iter().map(|l| (Op::Add, *l)));
        return ops;
    }

    // lcs[i][j] = LCS length of old[i..] and new[j..]
    let mut lcs = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            ops.push((Op::Keep, old[i]));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            ops.push((Op::Remove, old[i]));
            i += 1;
        } else {
            ops.push((Op::Add, new[j]));
            j += 1;
        }
    }
    ops.extend(old[i..].iter().map(|l| (Op::Remove, *l)));
    ops.extend(new[j..].iter().map(|l| (Op::Add, *l)));
    ops
}

/// Unified diff with three lines of context. Empty when nothing changed.
pub fn unified_diff(original: &str, updated: &str, name: &str) -> String {
    const CONTEXT: usize = 3;

    let old: Vec<&str> = original.lines().collect();
    let new: Vec<&str> = updated.lines().collect();
    let ops = edit_script(&old, &new);
    if ops.iter().all(|(op, _)| *op == Op::Keep) {
        return String::new();
    }

    // Old/new line numbers at the start of every op.
    let mut positions = Vec::with_capacity(ops.len());
    let (mut o, mut n) = (0usize, 0usize);
    for (op, _) in &ops {
        positions.push((o, n));
        match op {
            Op::Keep => {
                o += 1;
                n += 1;
            }
            Op::Remove => o += 1,
            Op::Add => n += 1,
        }
    }

    // Group changed ops into hunks, merging ones whose context overlaps.
    let changed: Vec<usize> = (0..ops.len()).filter(|&k| ops[k].0 != Op::Keep).collect();
    let mut hunks: Vec<(usize, usize)> = Vec::new();
    for &k in &changed {
        let start = k.saturating_sub(CONTEXT);
        let end = (k + CONTEXT + 1).min(ops.len());
        match hunks.last_mut() {
            Some(last) if start <= last.1 => last.1 = end,
            _ => hunks.push((start, end)),
        }
    }

    let mut out = vec![format!("--- a/{name}"), format!("+++ b/{name}")];
    for (start, end) in hunks {
        let slice = &ops[start..end];
        let old_len = slice.iter().filter(|(op, _)| *op != Op::Add).count();
        let new_len = slice.iter().filter(|(op, _)| *op != Op::Remove).count();
        let (o, n) = positions[start];
        let old_start = if old_len == 0 { o } else { o + 1 };
        let new_start = if new_len == 0 { n } else { n + 1 };
        out.push(format!("@@ -{old_start},{old_len} +{new_start},{new_len} @@"));
        for (op, line) in slice {
            let sign = match op {
                Op::Keep => ' ',
                Op::Remove => '-',
                Op::Add => '+',
            };
            out.push(format!("{sign}{line}"));
        }
    }
    out.join("\n")
}

fn write_error(path: &Path, e: std::io::Error) -> BridgeError {
    BridgeError::local("edit", format!("cannot write `{}`: {e}", path.display()))
}

/// `<name>.bak` next to `path`.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}

/// Write `new_content` over `path`, keeping the previous bytes in `<name>.bak`.
///
/// Refuses when the file changed since the proposal was made. The new
/// content lands via temp file + rename.
pub async fn apply_edit(path: &Path, original: &str, new_content: &str) -> Result<PathBuf, BridgeError> {
    let current = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| BridgeError::local("edit", format!("cannot read `{}`: {e}", path.display())))?;
    if current != original {
        return Err(BridgeError::local(
            "edit",
            format!("`{}` changed since the edit was proposed", display_name(path)),
        ));
    }

    let backup = backup_path(path);
    tokio::fs::write(&backup, current.as_bytes())
        .await
        .map_err(|e| write_error(&backup, e))?;

    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(format!(".{}.tmp", uuid::Uuid::new_v4()));
    let tmp = path.with_file_name(tmp_name);
    if let Err(e) = tokio::fs::write(&tmp, new_content.as_bytes()).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(write_error(path, e));
    }
    if let Ok(meta) = tokio::fs::metadata(path).await {
        let _ = tokio::fs::set_permissions(&tmp, meta.permissions()).await;
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(write_error(path, e));
    }
    Ok(backup)
}

/// Create `path` (and missing parent directories). Never overwrites.
pub async fn create_file(path: &Path, content: &str) -> Result<(), BridgeError> {
    use tokio::io::AsyncWriteExt;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| write_error(parent, e))?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                BridgeError::local("create", format!("file already exists: `{}`", path.display()))
            } else {
                write_error(path, e)
            }
        })?;
    file.write_all(content.as_bytes())
        .await
        .map_err(|e| write_error(path, e))?;
    file.flush().await.map_err(|e| write_error(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```rust\nfn main() {}\n```"), "fn main() {}");
        assert_eq!(strip_code_fences("  plain text  "), "plain text");
        assert_eq!(strip_code_fences("```\n```"), "");
    }

    #[test]
    fn test_unified_diff_single_change() {
        let old = "a\nb\nc\nd\ne\nf\ng\nh\n";
        let new = "a\nb\nc\nd\nE\nf\ng\nh\n";
        assert_eq!(
            unified_diff(old, new, "x.txt"),
            "--- a/x.txt\n+++ b/x.txt\n@@ -2,7 +2,7 @@\n b\n c\n d\n-e\n+E\n f\n g\n h"
        );
    }

    #[test]
    fn test_unified_diff_separate_hunks_and_additions() {
        let old_lines: Vec<String> = (1..=20).map(|i| i.to_string()).collect();
        let mut new_lines = old_lines.clone();
        new_lines[1] = "two".into();
        new_lines.insert(19, "nineteen and a half".into());

        let diff = unified_diff(&old_lines.join("\n"), &new_lines.join("\n"), "n");
        assert_eq!(diff.matches("@@ -").count(), 2);
        assert!(diff.contains("@@ -1,5 +1,5 @@\n 1\n-2\n+two\n 3"));
        assert!(diff.contains("@@ -17,4 +17,5 @@\n 17\n 18\n 19\n+nineteen and a half\n 20"));
    }

    #[test]
    fn test_unified_diff_identical_is_empty() {
        assert_eq!(unified_diff("same\n", "same\n", "f"), "");
    }

    #[test]
    fn test_unified_diff_from_empty_file() {
        assert_eq!(unified_diff("", "new\n", "f"), "--- a/f\n+++ b/f\n@@ -0,0 +1,1 @@\n+new");
    }

    #[test]
    fn test_preview_is_truncated() {
        let action = PendingAction::Task {
            description: "big".into(),
            plan: "x".repeat(PREVIEW_CHARS + 10),
        };
        let preview = action.preview();
        assert!(preview.contains("... (truncated)"));
        assert!(preview.ends_with("Reply ✅ to execute or ❌ to cancel."));
    }

    #[tokio::test]
    async fn test_apply_edit_writes_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("main.rs");
        std::fs::write(&path, "old\n").unwrap();

        let backup = apply_edit(&path, "old\n", "new\n").await.unwrap();
        assert_eq!(backup, dir.path().join("main.rs.bak"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "old\n");
        // only the file and its backup remain
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_apply_edit_refuses_changed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("main.rs");
        std::fs::write(&path, "changed meanwhile\n").unwrap();

        let err = apply_edit(&path, "old\n", "new\n").await.unwrap_err();
        assert!(err.to_string().contains("changed since"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "changed meanwhile\n");
        assert!(!backup_path(&path).exists());
    }

    #[tokio::test]
    async fn test_create_file_makes_parents_and_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docs").join("todo.md");

        create_file(&path, "- [ ] ship\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "- [ ] ship\n");

        let err = create_file(&path, "other").await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "- [ ] ship\n");
    }
}
