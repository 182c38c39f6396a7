// src/security/confine.rs - Path resolution and allowed-root confinement

use std::path::{Component, Path, PathBuf};

use crate::infra::errors::BridgeError;
use crate::infra::paths;

/// Resolve a user-supplied path against `cwd` without touching the filesystem.
///
/// Expands `~/`, joins relative paths onto `cwd` and folds `.`/`..` lexically.
pub fn resolve(input: &str, cwd: &Path) -> PathBuf {
    let expanded = paths::expand_home(input.trim());
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    };
    normalize(&joined)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Optional directory that every file action must stay inside.
#[derive(Debug, Clone, Default)]
pub struct AllowedRoot {
    root: Option<PathBuf>,
}

impl AllowedRoot {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root: root.map(|r| canonical_or_normal(&r)),
        }
    }

    pub fn unrestricted() -> Self {
        Self { root: None }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Ensure `path` (already resolved) lies under the root.
    ///
    /// Existing paths are canonicalized so symlinks cannot escape.
    pub fn check(&self, action: &str, path: &Path) -> Result<PathBuf, BridgeError> {
        let Some(ref root) = self.root else {
            return Ok(path.to_path_buf());
        };

        let candidate = canonical_or_normal(path);
        if candidate.starts_with(root) {
            Ok(path.to_path_buf())
        } else {
            tracing::warn!(
                "Rejected {} outside allowed root: {}",
                action,
                path.display()
            );
            Err(BridgeError::local(
                action,
                format!("`{}` is outside the allowed directory", path.display()),
            ))
        }
    }
}

/// Canonicalize the deepest existing ancestor and re-append the rest.
fn canonical_or_normal(path: &Path) -> PathBuf {
    let normal = normalize(path);
    let mut existing = normal.as_path();
    let mut rest = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return rest.iter().rev().fold(canonical, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return normal,
        }
    }
}
