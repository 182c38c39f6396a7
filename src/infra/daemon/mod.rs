// src/infra/daemon/mod.rs - Process lifecycle and the receive loop

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::core::dispatcher::{DispatchOptions, Dispatcher};
use crate::core::reply::ReplySink;
use crate::core::router::{ActionRouter, Route};
use crate::infra::config::Config;
use crate::infra::errors::BridgeError;
use crate::infra::paths;
use crate::integrations::telegram::TelegramTransport;
use crate::integrations::types::ChatTransport;
use crate::provider::google::GoogleProvider;
use crate::provider::retry::{RetryConfig, RetryProvider};
use crate::provider::ModelProvider;
use crate::security::gate::SecurityGate;
use crate::session::SessionStore;

pub mod offset;
pub mod process;

pub use offset::OffsetStore;
pub use process::{is_daemon_running, remove_pid_file, write_pid_file};

const POLL_BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const POLL_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Receive loop settings.
#[derive(Debug, Clone, Copy)]
pub struct ServeOptions {
    pub poll_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl ServeOptions {
    pub fn with_poll_timeout(poll_timeout: Duration) -> Self {
        Self {
            poll_timeout,
            backoff_initial: POLL_BACKOFF_INITIAL,
            backoff_max: POLL_BACKOFF_MAX,
        }
    }
}

/// Poll the transport and handle events one at a time until `shutdown` resolves.
///
/// Each event runs to completion before the next poll, so commands never
/// interleave. The offset is saved after every handled event. Retriable poll
/// errors back off and retry; terminal ones (bad token, conflicting poller)
/// end the loop with an error.
pub async fn serve<R, S>(
    dispatcher: &mut Dispatcher<R>,
    transport: &dyn ChatTransport,
    offsets: &OffsetStore,
    options: ServeOptions,
    shutdown: S,
) -> Result<(), BridgeError>
where
    R: Route,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut offset = offsets.load();
    let mut backoff = options.backoff_initial;

    tracing::info!(offset, transport = transport.id(), "Receive loop started");

    loop {
        let polled = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            polled = transport.poll(offset, options.poll_timeout) => polled,
        };

        let batch = match polled {
            Ok(batch) => {
                backoff = options.backoff_initial;
                batch
            }
            Err(e) if e.is_retriable() => {
                tracing::warn!(delay_ms = backoff.as_millis() as u64, "Poll failed: {}", e);
                tokio::select! {
                    biased;
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(options.backoff_max);
                continue;
            }
            Err(e) => {
                tracing::error!("Poll failed permanently: {}", e);
                return Err(e);
            }
        };

        for event in batch.events {
            let next = event.update_id + 1;
            let outcome = dispatcher.handle(event).await;
            tracing::debug!(?outcome, "Event handled");
            offset = offset.max(next);
            persist_offset(offsets, offset);
        }

        if let Some(next) = batch.next_offset {
            if next > offset {
                offset = next;
                persist_offset(offsets, offset);
            }
        }
    }

    tracing::info!("Receive loop stopped");
    Ok(())
}

fn persist_offset(offsets: &OffsetStore, offset: i64) {
    if let Err(e) = offsets.save(offset) {
        tracing::warn!("Failed to save offset {} to {}: {}", offset, offsets.path().display(), e);
    }
}

/// Start the bridge: validate config, open the session, serve until Ctrl+C.
pub async fn run_daemon(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let pid_path = paths::pid_file_path();
    if is_daemon_running(&pid_path) {
        tracing::warn!(
            "Another instance appears to be running (PID file {})",
            pid_path.display()
        );
    }

    let transport = Arc::new(TelegramTransport::new(config.telegram.bot_token.clone()));
    match transport.validate().await {
        Ok(who) => tracing::info!("{}", who),
        Err(e) if e.is_retriable() => tracing::warn!("Could not reach Telegram yet: {}", e),
        Err(e) => return Err(anyhow::anyhow!("Telegram rejected the bot token: {e}")),
    }

    let project_dir = config.files.project_dir();
    let store = SessionStore::open(config.sessions.dir(), &project_dir)
        .map_err(|e| anyhow::anyhow!("cannot open session directory: {e}"))?;

    let google = GoogleProvider::new(
        config.gemini.api_key.clone(),
        Duration::from_secs(config.gemini.request_timeout_secs),
    );
    let provider: Arc<dyn ModelProvider> = Arc::new(RetryProvider::with_config(
        Arc::new(google),
        RetryConfig::with_max_retries(config.gemini.max_retries),
    ));

    let router = ActionRouter::from_config(store, provider, &config);
    let sink = ReplySink::new(transport.clone(), &config.reply);
    let mut dispatcher = Dispatcher::new(
        SecurityGate::new(config.telegram.allowed_chat_id.clone()),
        router,
        sink,
        DispatchOptions {
            notify_denied: config.telegram.notify_denied,
            progress_notices: config.reply.progress_notices,
        },
    );

    let pid_path = write_pid_file(&pid_path)?;
    let offsets = OffsetStore::new(paths::offset_file_path());

    println!("deskrelay running. Press Ctrl+C to stop.");
    let result = serve(
        &mut dispatcher,
        transport.as_ref(),
        &offsets,
        ServeOptions::with_poll_timeout(Duration::from_secs(config.telegram.poll_timeout_secs)),
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested");
        },
    )
    .await;

    dispatcher.into_router().into_store().close();
    remove_pid_file(&pid_path);

    result.map_err(Into::into)
}
