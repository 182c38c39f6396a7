// src/actions/shell.rs - Bounded local shell execution

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::infra::errors::BridgeError;

/// Bytes kept per stream; the rest is drained and discarded.
const MAX_CAPTURE_BYTES: usize = 1024 * 1024;
/// How long to wait for pipe readers once the child is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Result of a shell command that was started.
#[derive(Debug, Clone, Default)]
pub struct ShellOutput {
    /// `None` when the process was killed or terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Runs a command string through a shell.
#[async_trait]
pub trait ShellExecutor: Send + Sync {
    async fn run(
        &self,
        command: &str,
        cwd: &Path,
        timeout: Duration,
    ) -> Result<ShellOutput, BridgeError>;
}

/// `sh -c` executor backed by `tokio::process`.
pub struct OsShell {
    program: String,
}

impl OsShell {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for OsShell {
    fn default() -> Self {
        Self::new("sh")
    }
}

#[async_trait]
impl ShellExecutor for OsShell {
    async fn run(
        &self,
        command: &str,
        cwd: &Path,
        timeout: Duration,
    ) -> Result<ShellOutput, BridgeError> {
        let started = Instant::now();

        let mut cmd = Command::new(&self.program);
        cmd.arg("-c")
            .arg(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group so a timeout can take down every descendant.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| BridgeError::local("run", format!("could not start shell: {e}")))?;
        let pid = child.id();

        let stdout_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let readers = [
            spawn_reader(child.stdout.take(), stdout_buf.clone()),
            spawn_reader(child.stderr.take(), stderr_buf.clone()),
        ];

        let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => (status.code(), false),
            Ok(Err(e)) => {
                tracing::warn!("Waiting for shell command failed: {}", e);
                (None, false)
            }
            Err(_) => {
                tracing::warn!("Shell command timed out after {:?}: {}", timeout, command);
                if let Some(pid) = pid {
                    kill_process_group(pid).await;
                }
                let _ = child.start_kill();
                let _ = tokio::time::timeout(DRAIN_GRACE, child.wait()).await;
                (None, true)
            }
        };

        // Background descendants may still hold the pipes open.
        if !drain(readers).await {
            if let Some(pid) = pid {
                kill_process_group(pid).await;
            }
        }

        Ok(ShellOutput {
            exit_code,
            stdout: take_lossy(&stdout_buf),
            stderr: take_lossy(&stderr_buf),
            timed_out,
            elapsed: started.elapsed(),
        })
    }
}

fn spawn_reader<R>(reader: Option<R>, buf: Arc<Mutex<Vec<u8>>>) -> Option<JoinHandle<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = reader?;
    Some(tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut out) = buf.lock() {
                        let room = MAX_CAPTURE_BYTES.saturating_sub(out.len());
                        out.extend_from_slice(&chunk[..n.min(room)]);
                    }
                }
            }
        }
    }))
}

/// Wait briefly for readers to hit EOF. Returns false if any had to be aborted.
async fn drain(readers: [Option<JoinHandle<()>>; 2]) -> bool {
    let deadline = tokio::time::Instant::now() + DRAIN_GRACE;
    let mut clean = true;
    for handle in readers.into_iter().flatten() {
        let abort = handle.abort_handle();
        if tokio::time::timeout_at(deadline, handle).await.is_err() {
            abort.abort();
            clean = false;
        }
    }
    clean
}

fn take_lossy(buf: &Arc<Mutex<Vec<u8>>>) -> String {
    buf.lock()
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_default()
}

#[cfg(unix)]
async fn kill_process_group(pid: u32) {
    let result = Command::new("kill")
        .args(["-KILL", "--", &format!("-{pid}")])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = result {
        tracing::debug!("kill -KILL -{} failed: {}", pid, e);
    }
}

#[cfg(not(unix))]
async fn kill_process_group(_pid: u32) {}

/// Truncate to `max_chars` characters, marking the cut.
pub fn truncate_output(output: &str, max_chars: usize) -> String {
    if output.chars().count() <= max_chars {
        return output.to_string();
    }
    let mut truncated: String = output.chars().take(max_chars).collect();
    truncated.push_str("\n... (truncated)");
    truncated
}

/// Render a finished command as a chat reply.
pub fn render_run_result(
    command: &str,
    output: &ShellOutput,
    timeout: Duration,
    max_chars: usize,
) -> String {
    let stdout = output.stdout.trim();
    let stderr = output.stderr.trim();
    let mut parts = Vec::new();

    if output.timed_out {
        parts.push(format!(
            "⏰ *Timed out* after {}s: `{}`",
            timeout.as_secs(),
            command
        ));
    } else {
        match output.exit_code {
            Some(0) => parts.push("✅ *Success*".to_string()),
            Some(code) => parts.push(format!("⚠️ *Exit code: {code}*")),
            None => parts.push("⚠️ *Terminated by signal*".to_string()),
        }
    }

    if !stdout.is_empty() {
        parts.push(format!("```\n{}\n```", truncate_output(stdout, max_chars)));
    }
    if !stderr.is_empty() {
        parts.push(format!(
            "*stderr:*\n```\n{}\n```",
            truncate_output(stderr, max_chars)
        ));
    }
    if stdout.is_empty() && stderr.is_empty() {
        parts.push(if output.timed_out {
            "_(no output before timeout)_".to_string()
        } else {
            "_(no output)_".to_string()
        });
    }

    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_stdout() {
        let shell = OsShell::default();
        let out = shell
            .run("echo hello", Path::new("."), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
        assert!(out.stderr.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_nonzero_exit_and_stderr() {
        let shell = OsShell::default();
        let out = shell
            .run("echo oops >&2; exit 3", Path::new("."), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stderr.trim(), "oops");
        assert!(!out.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_timeout_keeps_partial_output() {
        let shell = OsShell::default();
        let started = Instant::now();
        let out = shell
            .run("echo started; sleep 30", Path::new("."), Duration::from_millis(300))
            .await
            .unwrap();
        assert!(out.timed_out);
        assert_eq!(out.exit_code, None);
        assert!(out.stdout.contains("started"));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_background_child_does_not_hold_reply() {
        let shell = OsShell::default();
        let started = Instant::now();
        let out = shell
            .run("sleep 30 & echo done", Path::new("."), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(0));
        assert!(out.stdout.contains("done"));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_missing_cwd_is_local_action_error() {
        let shell = OsShell::default();
        let err = shell
            .run("true", Path::new("/definitely/not/here"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::LocalAction { .. }));
    }

    #[test]
    fn test_truncate_output() {
        assert_eq!(truncate_output("short", 10), "short");
        let t = truncate_output("ééééé", 2);
        assert!(t.starts_with("éé\n"));
        assert!(t.ends_with("(truncated)"));
    }

    #[test]
    fn test_render_success_and_empty() {
        let out = ShellOutput {
            exit_code: Some(0),
            ..Default::default()
        };
        let text = render_run_result("true", &out, Duration::from_secs(60), 100);
        assert!(text.contains("Success"));
        assert!(text.contains("(no output)"));
    }

    #[test]
    fn test_render_timeout_mentions_limit() {
        let out = ShellOutput {
            timed_out: true,
            stdout: "partial\n".into(),
            ..Default::default()
        };
        let text = render_run_result("sleep 99", &out, Duration::from_secs(60), 100);
        assert!(text.contains("Timed out"));
        assert!(text.contains("60s"));
        assert!(text.contains("partial"));
    }
}
