// src/actions/status.rs - Best-effort health report

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub hostname: Option<String>,
    pub process_uptime: Duration,
    pub system_uptime: Option<String>,
    pub battery: Option<String>,
    pub project_dir: PathBuf,
    pub session_id: String,
    pub turn_count: usize,
}

/// Run a probe command; any failure (missing tool, timeout, non-zero exit) is `None`.
pub async fn probe(program: &str, args: &[&str]) -> Option<String> {
    let run = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(PROBE_TIMEOUT, run).await {
        Ok(Ok(out)) if out.status.success() => {
            let text = String::from_utf8_lossy(&out.stdout).trim().to_string();
            (!text.is_empty()).then_some(text)
        }
        Ok(Ok(_)) | Ok(Err(_)) => None,
        Err(_) => {
            tracing::debug!("Status probe {} timed out", program);
            None
        }
    }
}

async fn battery() -> Option<String> {
    if cfg!(target_os = "macos") {
        return probe("pmset", &["-g", "batt"]).await;
    }
    let capacity = tokio::fs::read_to_string("/sys/class/power_supply/BAT0/capacity")
        .await
        .ok()?;
    let status = tokio::fs::read_to_string("/sys/class/power_supply/BAT0/status")
        .await
        .unwrap_or_default();
    Some(format!("{}% {}", capacity.trim(), status.trim()).trim().to_string())
}

/// Gather every probe concurrently.
pub async fn collect(
    process_uptime: Duration,
    project_dir: &Path,
    session_id: &str,
    turn_count: usize,
) -> StatusReport {
    let (hostname, system_uptime, battery) =
        tokio::join!(probe("hostname", &[]), probe("uptime", &[]), battery());

    StatusReport {
        hostname,
        process_uptime,
        system_uptime,
        battery,
        project_dir: project_dir.to_path_buf(),
        session_id: session_id.to_string(),
        turn_count,
    }
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (days, hours, mins, secs) = (secs / 86_400, secs / 3600 % 24, secs / 60 % 60, secs % 60);
    if days > 0 {
        format!("{days}d {hours}h {mins}m")
    } else if hours > 0 {
        format!("{hours}h {mins}m {secs}s")
    } else if mins > 0 {
        format!("{mins}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

impl StatusReport {
    pub fn render(&self) -> String {
        let or_unknown = |v: &Option<String>| v.clone().unwrap_or_else(|| UNKNOWN.into());
        format!(
            "✅ *Online*\n\n\
             🖥 `{}`\n\
             ⏱ Up {}\n\
             📈 {}\n\
             🔋 {}\n\n\
             📁 Project: `{}`\n\
             📝 Session: `{}` ({} turns)\n\
             🏷 deskrelay v{}",
            or_unknown(&self.hostname),
            format_duration(self.process_uptime),
            or_unknown(&self.system_uptime),
            or_unknown(&self.battery),
            self.project_dir.display(),
            self.session_id,
            self.turn_count,
            env!("CARGO_PKG_VERSION"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3 * 3600 + 61)), "3h 1m 1s");
        assert_eq!(format_duration(Duration::from_secs(2 * 86_400 + 3600)), "2d 1h 0m");
    }

    #[tokio::test]
    async fn test_missing_probe_is_none() {
        assert!(probe("deskrelay-no-such-binary", &[]).await.is_none());
    }

    #[test]
    fn test_render_reports_unknown() {
        let report = StatusReport {
            hostname: None,
            process_uptime: Duration::from_secs(5),
            system_uptime: Some("up 3 days".into()),
            battery: None,
            project_dir: PathBuf::from("/work"),
            session_id: "2026-01-01_000000_000".into(),
            turn_count: 4,
        };
        let text = report.render();
        assert!(text.contains("Online"));
        assert!(text.contains("`unknown`"));
        assert!(text.contains("up 3 days"));
        assert!(text.contains("(4 turns)"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_collect_never_fails() {
        let report = collect(Duration::from_secs(1), Path::new("/"), "id", 0).await;
        assert_eq!(report.turn_count, 0);
        assert!(!report.render().is_empty());
    }
}
