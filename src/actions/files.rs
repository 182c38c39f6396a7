// src/actions/files.rs - File retrieval, viewing and directory listing

use std::path::{Path, PathBuf};

use crate::infra::config::FilesConfig;
use crate::infra::errors::BridgeError;
use crate::integrations::types::Attachment;
use crate::security::confine::{self, AllowedRoot};

/// Filesystem access confined to an optional root, with size limits.
#[derive(Debug, Clone)]
pub struct FileAccess {
    root: AllowedRoot,
    max_send_bytes: u64,
    max_view_bytes: u64,
    max_list_entries: usize,
}

#[derive(Debug, Clone)]
pub struct FileView {
    pub path: PathBuf,
    pub line_count: usize,
    pub numbered: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct DirListing {
    pub path: PathBuf,
    /// At most `max_list_entries`, directories first.
    pub entries: Vec<DirEntry>,
    pub total: usize,
}

impl FileAccess {
    pub fn new(root: AllowedRoot, config: &FilesConfig) -> Self {
        Self {
            root,
            max_send_bytes: config.max_send_bytes,
            max_view_bytes: config.max_view_bytes,
            max_list_entries: config.max_list_entries,
        }
    }

    pub fn root(&self) -> &AllowedRoot {
        &self.root
    }

    /// Resolve `input` against `cwd` and enforce the allowed root.
    pub fn resolve(&self, action: &str, input: &str, cwd: &Path) -> Result<PathBuf, BridgeError> {
        let path = confine::resolve(input, cwd);
        self.root.check(action, &path)
    }

    /// Load a regular file for delivery as an attachment.
    pub async fn load(&self, input: &str, cwd: &Path) -> Result<(PathBuf, Attachment), BridgeError> {
        let path = self.resolve("file", input, cwd)?;
        let meta = regular_file_meta("file", &path).await?;

        if meta.len() > self.max_send_bytes {
            return Err(BridgeError::local(
                "file",
                format!(
                    "file too large ({}); the limit is {}",
                    human_size(meta.len()),
                    human_size(self.max_send_bytes)
                ),
            ));
        }

        let bytes = read_capped("file", &path, self.max_send_bytes).await?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".into());

        let attachment = Attachment {
            file_name,
            bytes,
            caption: Some(format!("📁 {}", path.display())),
        };
        Ok((path, attachment))
    }

    /// Read a UTF-8 file of at most `max_view_bytes`.
    pub async fn read_text(&self, action: &str, input: &str, cwd: &Path) -> Result<(PathBuf, String), BridgeError> {
        let path = self.resolve(action, input, cwd)?;
        let meta = regular_file_meta(action, &path).await?;

        if meta.len() > self.max_view_bytes {
            return Err(BridgeError::local(
                action,
                format!(
                    "file too large ({}); the limit is {}. Use /file to download it",
                    human_size(meta.len()),
                    human_size(self.max_view_bytes)
                ),
            ));
        }

        let bytes = read_capped(action, &path, self.max_view_bytes).await?;
        let text = String::from_utf8(bytes).map_err(|_| {
            BridgeError::local(action, "binary file, can't display. Use /file to download it")
        })?;
        Ok((path, text))
    }

    /// Read a UTF-8 file and number its lines.
    pub async fn view(&self, input: &str, cwd: &Path) -> Result<FileView, BridgeError> {
        let (path, text) = self.read_text("view", input, cwd).await?;

        let lines: Vec<&str> = text.split('\n').collect();
        let numbered = lines
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:4} │ {}", i + 1, line))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(FileView {
            path,
            line_count: lines.len(),
            numbered,
        })
    }

    /// List a directory (the project directory when `input` is `None`).
    pub async fn list(&self, input: Option<&str>, cwd: &Path) -> Result<DirListing, BridgeError> {
        let path = match input {
            Some(p) => self.resolve("ls", p, cwd)?,
            None => self.root.check("ls", cwd)?,
        };

        let mut reader = tokio::fs::read_dir(&path).await.map_err(|e| {
            BridgeError::local("ls", format!("not a readable directory `{}`: {e}", path.display()))
        })?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| BridgeError::local("ls", e.to_string()))?
        {
            let meta = entry.metadata().await.ok();
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: meta.as_ref().map(|m| m.is_dir()).unwrap_or(false),
                size: meta.as_ref().map(|m| m.len()).unwrap_or(0),
            });
        }

        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
        let total = entries.len();
        entries.truncate(self.max_list_entries);

        Ok(DirListing {
            path,
            entries,
            total,
        })
    }

    /// Validate a new project directory.
    pub async fn project_dir(&self, input: &str, cwd: &Path) -> Result<PathBuf, BridgeError> {
        let path = self.resolve("project", input, cwd)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(path),
            _ => Err(BridgeError::local(
                "project",
                format!("not a directory: `{}`", path.display()),
            )),
        }
    }
}

async fn regular_file_meta(action: &str, path: &Path) -> Result<std::fs::Metadata, BridgeError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|_| BridgeError::local(action, format!("file not found: `{}`", path.display())))?;
    if meta.is_dir() {
        return Err(BridgeError::local(
            action,
            "that's a directory. Use /ls instead",
        ));
    }
    // FIFOs and devices would block or never end.
    if !meta.is_file() {
        return Err(BridgeError::local(
            action,
            format!("not a regular file: `{}`", path.display()),
        ));
    }
    Ok(meta)
}

/// Read at most `limit` bytes. Files whose metadata understates their size
/// (procfs and the like) are refused once they cross the limit.
async fn read_capped(action: &str, path: &Path, limit: u64) -> Result<Vec<u8>, BridgeError> {
    use tokio::io::AsyncReadExt;

    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| BridgeError::local(action, format!("cannot read `{}`: {e}", path.display())))?;

    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1))
        .read_to_end(&mut bytes)
        .await
        .map_err(|e| BridgeError::local(action, format!("cannot read `{}`: {e}", path.display())))?;

    if bytes.len() as u64 > limit {
        return Err(BridgeError::local(
            action,
            format!("file too large; the limit is {}", human_size(limit)),
        ));
    }
    Ok(bytes)
}

pub fn human_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes < KB {
        format!("{bytes}B")
    } else if bytes < MB {
        format!("{}KB", bytes / KB)
    } else {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    }
}

impl DirListing {
    pub fn render(&self) -> String {
        let mut lines = vec![format!("📁 {}", self.path.display()), String::new()];
        for entry in &self.entries {
            if entry.is_dir {
                lines.push(format!("  📂 {}/", entry.name));
            } else {
                lines.push(format!("  📄 {} ({})", entry.name, human_size(entry.size)));
            }
        }
        if self.total == 0 {
            lines.push("  (empty)".into());
        }
        if self.total > self.entries.len() {
            lines.push(String::new());
            lines.push(format!("... and {} more", self.total - self.entries.len()));
        }
        lines.join("\n")
    }
}

impl FileView {
    pub fn render(&self) -> String {
        format!(
            "📄 `{}` ({} lines)\n\n```\n{}\n```",
            self.path.display(),
            self.line_count,
            self.numbered
        )
    }
}
