// src/cli/mod.rs - CLI definition (clap derive)

pub mod check;
pub mod sessions;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "deskrelay",
    about = "Telegram to Gemini bridge for your workstation",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Log level when DESKRELAY_LOG / RUST_LOG are unset
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the bridge (default)
    Serve,
    /// Validate the configuration and print the effective settings
    Check,
    /// List session files, newest first
    Sessions {
        /// Show at most this many
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Print the current session (latest.md)
    Latest,
}
