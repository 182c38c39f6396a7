// src/cli/check.rs - Configuration check

use crate::infra::config::{redact, Config};
use crate::infra::daemon::is_daemon_running;
use crate::infra::paths;

/// Validate `config` and print the effective settings with secrets masked.
pub fn run_check(config: &Config, config_path: &std::path::Path) -> anyhow::Result<()> {
    println!("deskrelay v{}", env!("CARGO_PKG_VERSION"));
    println!();

    if config_path.exists() {
        println!("  Config:       {}", config_path.display());
    } else {
        println!("  Config:       (defaults + environment)");
    }
    println!("  Bot token:    {}", redact(&config.telegram.bot_token));
    println!(
        "  Allowed chat: {}",
        if config.telegram.allowed_chat_id.is_empty() {
            "(unset)"
        } else {
            &config.telegram.allowed_chat_id
        }
    );
    println!("  Gemini key:   {}", redact(&config.gemini.api_key));
    println!("  Model:        {}", config.gemini.model);
    println!("  Project dir:  {}", config.files.project_dir().display());
    match config.files.allowed_root() {
        Some(root) => println!("  Allowed root: {}", root.display()),
        None => println!("  Allowed root: (unrestricted)"),
    }
    println!("  Sessions:     {}", config.sessions.dir().display());
    println!(
        "  Shell:        {} (timeout {}s, {} blocked patterns)",
        config.shell.program,
        config.shell.timeout_secs,
        config.shell.blocked.len()
    );

    let pid_path = paths::pid_file_path();
    if is_daemon_running(&pid_path) {
        println!("  Daemon:       running ({})", pid_path.display());
    } else {
        println!("  Daemon:       not running");
    }
    println!();

    config.validate()?;
    println!("Configuration OK.");
    Ok(())
}
