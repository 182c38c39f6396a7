// src/integrations/types.rs - Chat transport seam

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::infra::errors::BridgeError;

/// An attachment carried by an inbound message (metadata only; never downloaded).
#[derive(Debug, Clone)]
pub struct AttachmentRef {
    pub file_id: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

/// A message delivered by the transport. Ephemeral: only its routed effect is logged.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Transport-level sequence id (Telegram `update_id`).
    pub update_id: i64,
    /// Identity checked by the security gate.
    pub sender_id: String,
    /// Where replies go.
    pub chat_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub attachments: Vec<AttachmentRef>,
}

impl InboundEvent {
    /// A text event from `sender`, replying to the same chat.
    pub fn text(sender: impl Into<String>, text: impl Into<String>) -> Self {
        let sender = sender.into();
        Self {
            update_id: 0,
            chat_id: sender.clone(),
            sender_id: sender,
            text: text.into(),
            timestamp: Utc::now(),
            attachments: Vec::new(),
        }
    }
}

/// A file or image to deliver through the transport's attachment mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub caption: Option<String>,
}

/// One long-poll result. `next_offset` also skips updates that carried no usable event.
#[derive(Debug, Clone, Default)]
pub struct PollBatch {
    pub events: Vec<InboundEvent>,
    pub next_offset: Option<i64>,
}

/// Long-poll chat transport (Telegram Bot API in production, mocks in tests).
///
/// Errors use `BridgeError::Transport` with the retryable flag set for
/// network failures and server errors.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    fn id(&self) -> &str;

    /// Wait up to `timeout` for events with `update_id >= offset`.
    async fn poll(&self, offset: i64, timeout: Duration) -> Result<PollBatch, BridgeError>;

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), BridgeError>;

    async fn send_document(&self, chat_id: &str, attachment: &Attachment) -> Result<(), BridgeError>;

    async fn send_photo(&self, chat_id: &str, attachment: &Attachment) -> Result<(), BridgeError>;
}
