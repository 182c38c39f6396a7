// src/core/dispatcher.rs - Per-event pipeline: gate, classify, route, reply

use super::command::{classify, ClassifyError, Command};
use super::reply::{Reply, ReplySink};
use super::router::Route;
use crate::integrations::types::{AttachmentRef, InboundEvent};
use crate::security::gate::{Authorization, SecurityGate, DENIAL_NOTICE};

/// What the dispatcher did with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Sender not allowed; nothing classified or routed.
    Denied,
    /// Classification failed; usage sent back, nothing routed.
    Rejected(ClassifyError),
    /// Routed to the named handler and the reply was handed to the sink.
    Routed(&'static str),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOptions {
    pub notify_denied: bool,
    pub progress_notices: bool,
}

pub struct Dispatcher<R: Route> {
    gate: SecurityGate,
    router: R,
    sink: ReplySink,
    options: DispatchOptions,
}

/// Short notice sent before a slow handler starts.
pub fn progress_notice(command: &Command) -> Option<String> {
    match command {
        Command::Chat(_) | Command::Ask(_) => Some("🧠 Thinking...".into()),
        Command::Run(cmd) => Some(format!("⏳ Running: `{cmd}`")),
        Command::Screen => Some("📸 Taking screenshot...".into()),
        Command::Edit { path, .. } => Some(format!("🧠 Reading `{path}` and drafting the edit...")),
        Command::Create { path, .. } => Some(format!("🧠 Drafting `{path}`...")),
        Command::Task(_) => Some("🚀 Planning task...".into()),
        _ => None,
    }
}

/// Inbound files are never fetched; tell the owner which ones were skipped.
pub fn skipped_attachments(attachments: &[AttachmentRef]) -> Option<String> {
    if attachments.is_empty() {
        return None;
    }
    let names: Vec<&str> = attachments
        .iter()
        .map(|a| {
            tracing::debug!(file_id = %a.file_id, "Skipping inbound attachment");
            a.file_name
                .as_deref()
                .or(a.mime_type.as_deref())
                .unwrap_or("file")
        })
        .collect();
    Some(format!(
        "📎 Attachments are not downloaded. Ignored: {}",
        names.join(", ")
    ))
}

impl<R: Route> Dispatcher<R> {
    pub fn new(gate: SecurityGate, router: R, sink: ReplySink, options: DispatchOptions) -> Self {
        Self {
            gate,
            router,
            sink,
            options,
        }
    }

    pub fn router(&self) -> &R {
        &self.router
    }

    pub fn into_router(self) -> R {
        self.router
    }

    /// Run one event through the whole pipeline. Returns once the reply is sent.
    pub async fn handle(&mut self, event: InboundEvent) -> Outcome {
        if self.gate.authorize(&event) == Authorization::Denied {
            if self.options.notify_denied {
                self.sink
                    .send(&event.chat_id, &Reply::text(DENIAL_NOTICE))
                    .await;
            }
            return Outcome::Denied;
        }

        let command = match classify(&event.text) {
            Ok(command) => command,
            Err(e) => {
                tracing::debug!("Classification failed: {}", e);
                self.sink
                    .send(&event.chat_id, &Reply::text(format!("⚠️ {e}")))
                    .await;
                return Outcome::Rejected(e);
            }
        };

        let name = command.name();
        tracing::info!(command = name, "Handling command");

        if self.options.progress_notices {
            if let Some(notice) = progress_notice(&command) {
                self.sink.send(&event.chat_id, &Reply::text(notice)).await;
            }
        }

        let mut reply = self.router.route(command).await;
        if let Some(notice) = skipped_attachments(&event.attachments) {
            reply.push_text(notice);
        }
        let report = self.sink.send(&event.chat_id, &reply).await;
        if !report.complete() {
            tracing::warn!(command = name, dropped = report.dropped, "Reply not fully delivered");
        }

        Outcome::Routed(name)
    }
}
