// src/main.rs - deskrelay entry point

use clap::Parser;
use std::path::PathBuf;

use deskrelay::cli::{Cli, Commands};
use deskrelay::infra::config::Config;
use deskrelay::infra::{daemon, logger, paths};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logger::init_logging(&cli.log_level);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli
        .config
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(paths::config_file_path);

    // An explicit --config must exist; the default location may be absent.
    let config = if cli.config.is_some() {
        Config::load_path(&config_path)?
    } else {
        Config::load()?
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => daemon::run_daemon(config).await,
        Commands::Check => deskrelay::cli::check::run_check(&config, &config_path),
        Commands::Sessions { limit } => {
            deskrelay::cli::sessions::run_sessions(&config.sessions.dir(), limit)
        }
        Commands::Latest => deskrelay::cli::sessions::run_latest(&config.sessions.dir()),
    }
}
