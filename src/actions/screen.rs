// src/actions/screen.rs - Screenshot capture via an OS tool

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::infra::errors::BridgeError;

/// Placeholder replaced with the output file in capture commands.
pub const PATH_PLACEHOLDER: &str = "{path}";

/// Captures the current display as image bytes (PNG).
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    async fn capture(&self) -> Result<Vec<u8>, BridgeError>;
}

pub struct OsScreenCapture {
    command: Option<Vec<String>>,
    timeout: Duration,
}

impl OsScreenCapture {
    /// `command` overrides platform detection; it must contain `{path}`.
    pub fn new(command: Option<Vec<String>>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    fn resolve_command(&self) -> Option<Vec<String>> {
        self.command
            .clone()
            .filter(|c| !c.is_empty())
            .or_else(detect_platform_tool)
    }
}

/// Pick the first screenshot tool present on PATH for this platform.
pub fn detect_platform_tool() -> Option<Vec<String>> {
    let candidates: &[&[&str]] = if cfg!(target_os = "macos") {
        &[&["screencapture", "-x", PATH_PLACEHOLDER]]
    } else {
        &[
            &["grim", PATH_PLACEHOLDER],
            &["gnome-screenshot", "-f", PATH_PLACEHOLDER],
            &["scrot", "--overwrite", PATH_PLACEHOLDER],
            &["import", "-window", "root", PATH_PLACEHOLDER],
        ]
    };

    candidates
        .iter()
        .find(|c| which::which(c[0]).is_ok())
        .map(|c| c.iter().map(|s| s.to_string()).collect())
}

fn substitute(command: &[String], path: &Path) -> Vec<String> {
    let path = path.to_string_lossy();
    command
        .iter()
        .map(|arg| arg.replace(PATH_PLACEHOLDER, &path))
        .collect()
}

fn capture_error(message: impl Into<String>) -> BridgeError {
    BridgeError::local("screenshot", message)
}

#[async_trait]
impl ScreenCapture for OsScreenCapture {
    async fn capture(&self) -> Result<Vec<u8>, BridgeError> {
        let template = self
            .resolve_command()
            .ok_or_else(|| capture_error("no screenshot tool found (set screen.command)"))?;

        let path: PathBuf =
            std::env::temp_dir().join(format!("deskrelay-screen-{}.png", uuid::Uuid::new_v4()));
        let argv = substitute(&template, &path);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| capture_error("empty screen.command"))?;

        tracing::debug!("Capturing screen with {}", program);
        let run = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => return Err(capture_error(format!("could not run {program}: {e}"))),
            Err(_) => {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(capture_error(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let _ = tokio::fs::remove_file(&path).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(capture_error(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|_| capture_error("no image was produced"))?;
        let _ = tokio::fs::remove_file(&path).await;

        if bytes.is_empty() {
            return Err(capture_error("captured image is empty"));
        }
        Ok(bytes)
    }
}
