// src/infra/paths.rs - XDG-compliant path management
//
// All paths respect the DESKRELAY_HOME environment variable for isolation.
// When DESKRELAY_HOME is set, config and data live under that directory.
// When unset, config uses ~/.deskrelay/ and data uses XDG_DATA_HOME/deskrelay.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

fn deskrelay_home() -> Option<PathBuf> {
    std::env::var_os("DESKRELAY_HOME").map(PathBuf::from)
}

/// Home directory, falling back to the current directory when it cannot be determined.
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|b| b.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration directory: $DESKRELAY_HOME/ or ~/.deskrelay/
pub fn config_dir() -> PathBuf {
    if let Some(home) = deskrelay_home() {
        return home;
    }
    dirs_home().join(".deskrelay")
}

/// Data directory: $DESKRELAY_HOME/data/ or ~/.local/share/deskrelay/
pub fn data_dir() -> PathBuf {
    if let Some(home) = deskrelay_home() {
        return home.join("data");
    }
    match ProjectDirs::from("", "", "deskrelay") {
        Some(dirs) => dirs.data_local_dir().to_path_buf(),
        None => config_dir().join("data"),
    }
}

/// Default sessions directory (overridable via `[sessions] dir`).
pub fn sessions_dir() -> PathBuf {
    data_dir().join("sessions")
}

pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn pid_file_path() -> PathBuf {
    data_dir().join("deskrelay.pid")
}

pub fn offset_file_path() -> PathBuf {
    data_dir().join("telegram.offset")
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs_home();
    }
    match path.strip_prefix("~/") {
        Some(rest) => dirs_home().join(rest),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("~/projects"), dirs_home().join("projects"));
        assert_eq!(expand_home("/tmp/x"), PathBuf::from("/tmp/x"));
        assert_eq!(expand_home("rel/path"), PathBuf::from("rel/path"));
    }

    #[test]
    fn test_derived_paths_share_data_dir() {
        assert!(pid_file_path().starts_with(data_dir()));
        assert!(offset_file_path().starts_with(data_dir()));
        assert!(sessions_dir().starts_with(data_dir()));
    }
}
