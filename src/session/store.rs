// src/session/store.rs - On-disk session files and the `latest.md` pointer
//
// Exactly one session file is writable at a time. Appends go to the end of
// that file (flushed and synced before returning); `latest.md` is then
// replaced atomically (temp file + rename) with the same bytes. Rotation
// finalizes the current file (marked read-only) and opens a fresh one.

use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::format;
use super::transcript::{SessionTranscript, Turn};
use crate::infra::errors::BridgeError;

pub const LATEST_FILE: &str = "latest.md";
const LATEST_TMP: &str = ".latest.md.tmp";
const ID_FORMAT: &str = "%Y-%m-%d_%H%M%S_%3f";

/// Metadata for one persisted session file.
#[derive(Debug, Clone)]
pub struct SessionFile {
    pub id: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

pub struct SessionStore {
    dir: PathBuf,
    project_dir: PathBuf,
    current: SessionFile,
    transcript: SessionTranscript,
    /// Exact bytes of the current session file.
    content: String,
}

impl SessionStore {
    /// Open the sessions directory and start a new session file.
    ///
    /// Every process start gets its own file; earlier files are left untouched.
    pub fn open(dir: impl Into<PathBuf>, project_dir: impl Into<PathBuf>) -> Result<Self, BridgeError> {
        let dir = dir.into();
        let project_dir = project_dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            BridgeError::persistence(format!("cannot create {}: {e}", dir.display()))
        })?;

        let (current, content) = create_session_file(&dir, &project_dir, None)?;
        write_latest(&dir, &content)?;

        tracing::info!("Session started: {}", current.path.display());

        Ok(Self {
            dir,
            project_dir,
            current,
            transcript: SessionTranscript::new(),
            content,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn current(&self) -> &SessionFile {
        &self.current
    }

    pub fn current_transcript(&self) -> &SessionTranscript {
        &self.transcript
    }

    /// Rendered bytes of the current session file.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_FILE)
    }

    /// Project directory written into the header of future session files.
    pub fn set_project_dir(&mut self, project_dir: impl Into<PathBuf>) {
        self.project_dir = project_dir.into();
    }

    /// Append one turn to the current session.
    ///
    /// On a session-file write failure nothing is committed and any partial
    /// bytes are truncated away. If only the
    /// `latest.md` refresh fails, the turn is committed to the session file
    /// and transcript, the error is still returned, and the next write
    /// re-syncs `latest.md` from the full content.
    pub fn append(&mut self, turn: Turn) -> Result<&Turn, BridgeError> {
        let turn = self.transcript.stamp(turn);
        let block = format::render_turn(&turn);

        append_durably(&self.current.path, &block)?;

        self.content.push_str(&block);
        self.transcript.push(turn);

        write_latest(&self.dir, &self.content)?;

        tracing::debug!(
            session = %self.current.id,
            turns = self.transcript.len(),
            "Turn appended"
        );

        // push above guarantees a last element
        self.transcript
            .last()
            .ok_or_else(|| BridgeError::persistence("transcript empty after append"))
    }

    /// Finalize the current session file and start a new, empty one.
    ///
    /// The new file is created first; on any failure the current session
    /// stays active and unchanged.
    pub fn rotate(&mut self) -> Result<String, BridgeError> {
        let (next, content) =
            create_session_file(&self.dir, &self.project_dir, Some(&self.current.id))?;

        if let Err(e) = write_latest(&self.dir, &content) {
            let _ = std::fs::remove_file(&next.path);
            return Err(e);
        }

        let previous = std::mem::replace(&mut self.current, next);
        finalize_file(&previous.path);

        self.transcript = SessionTranscript::new();
        self.content = content;

        tracing::info!(
            "Session rotated: {} -> {}",
            previous.id,
            self.current.id
        );

        Ok(self.current.id.clone())
    }

    /// Mark the current file as finalized on shutdown.
    pub fn close(self) {
        finalize_file(&self.current.path);
        tracing::info!("Session closed: {}", self.current.path.display());
    }
}

fn session_file_name(id: &str) -> String {
    format!("session_{id}.md")
}

/// Create a new session file with create-new semantics.
///
/// Ids sort after `after` and never reuse an existing file name.
fn create_session_file(
    dir: &Path,
    project_dir: &Path,
    after: Option<&str>,
) -> Result<(SessionFile, String), BridgeError> {
    let created_at = Utc::now();
    let base = created_at.format(ID_FORMAT).to_string();

    let mut suffix = 0u32;
    loop {
        let id = if suffix == 0 {
            base.clone()
        } else {
            format!("{base}_{suffix}")
        };
        suffix += 1;

        if after.is_some_and(|prev| id.as_str() <= prev) {
            continue;
        }

        let path = dir.join(session_file_name(&id));
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(BridgeError::persistence(format!(
                    "cannot create {}: {e}",
                    path.display()
                )))
            }
        };

        let content = format::render_header(&id, project_dir);
        file.write_all(content.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| {
                let _ = std::fs::remove_file(&path);
                BridgeError::persistence(e)
            })?;

        return Ok((
            SessionFile {
                id,
                path,
                created_at,
            },
            content,
        ));
    }
}

fn append_durably(path: &Path, block: &str) -> Result<(), BridgeError> {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(BridgeError::persistence)?;
    let old_len = file.metadata().map_err(BridgeError::persistence)?.len();
    write_or_truncate(&mut file, old_len, |f| {
        f.write_all(block.as_bytes())?;
        f.flush()?;
        f.sync_data()
    })
    .map_err(BridgeError::persistence)
}

/// Run `write`; if it fails, cut the file back to `old_len`.
fn write_or_truncate(
    file: &mut std::fs::File,
    old_len: u64,
    write: impl FnOnce(&mut std::fs::File) -> std::io::Result<()>,
) -> std::io::Result<()> {
    let result = write(file);
    if result.is_err() {
        if let Err(e) = file.set_len(old_len) {
            tracing::warn!("Could not roll back partial session write: {}", e);
        }
    }
    result
}

/// Atomically replace `latest.md` (temp file + rename).
fn write_latest(dir: &Path, content: &str) -> Result<(), BridgeError> {
    let tmp = dir.join(LATEST_TMP);
    let dst = dir.join(LATEST_FILE);

    let write = || -> std::io::Result<()> {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(content.as_bytes())?;
        f.flush()?;
        f.sync_all()?;
        std::fs::rename(&tmp, &dst)
    };

    write().map_err(|e| BridgeError::persistence(format!("latest pointer: {e}")))
}

fn finalize_file(path: &Path) {
    let result = std::fs::metadata(path).and_then(|meta| {
        let mut perms = meta.permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(path, perms)
    });
    if let Err(e) = result {
        tracing::warn!("Could not mark {} read-only: {}", path.display(), e);
    }
}

/// All session files in `dir`, newest first.
pub fn list_sessions(dir: &Path) -> std::io::Result<Vec<SessionFile>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(id) = name
            .strip_prefix("session_")
            .and_then(|rest| rest.strip_suffix(".md"))
        else {
            continue;
        };
        let created_at = entry
            .metadata()
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        out.push(SessionFile {
            id: id.to_string(),
            path: entry.path(),
            created_at,
        });
    }
    out.sort_by(|a, b| b.id.cmp(&a.id));
    Ok(out)
}
