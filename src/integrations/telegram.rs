// src/integrations/telegram.rs - Telegram transport (Bot API long-poll)
//
// Uses the Telegram Bot API (https://core.telegram.org/bots/api).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::infra::errors::BridgeError;
use crate::integrations::types::{Attachment, AttachmentRef, ChatTransport, InboundEvent, PollBatch};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const SEND_TIMEOUT: Duration = Duration::from_secs(120);
/// Slack on top of the long-poll timeout before the HTTP request itself gives up.
const POLL_SLACK: Duration = Duration::from_secs(10);

/// Telegram transport adapter.
pub struct TelegramTransport {
    client: Client,
    bot_token: String,
    base_url: String,
}

impl TelegramTransport {
    pub fn new(bot_token: String) -> Self {
        Self {
            client: Client::new(),
            bot_token,
            base_url: TELEGRAM_API_BASE.to_string(),
        }
    }

    /// Point the adapter at a different API host (local Bot API server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.bot_token)
    }

    /// Validate the bot token by calling getMe.
    pub async fn validate(&self) -> Result<String, BridgeError> {
        #[derive(Deserialize)]
        struct BotUser {
            username: Option<String>,
            first_name: Option<String>,
        }

        let bot: BotUser = self
            .call("getMe", self.client.get(self.api_url("getMe")).timeout(SEND_TIMEOUT))
            .await?;

        Ok(format!(
            "Authenticated as @{}",
            bot.username
                .unwrap_or_else(|| bot.first_name.unwrap_or_default())
        ))
    }

    /// Send a request and unwrap the Bot API envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        request: RequestBuilder,
    ) -> Result<T, BridgeError> {
        // reqwest errors carry the URL, which holds the bot token.
        let response = request.send().await.map_err(|e| {
            let retriable = e.is_timeout() || e.is_connect() || e.is_request();
            BridgeError::Transport {
                message: format!("telegram {method} request failed: {}", e.without_url()),
                retriable,
            }
        })?;

        let status = response.status();
        let body: TelegramResponse<T> = response.json().await.map_err(|e| BridgeError::Transport {
            message: format!(
                "telegram {method} decode failed (HTTP {status}): {}",
                e.without_url()
            ),
            retriable: status.is_server_error(),
        })?;

        if !body.ok || !status.is_success() {
            return Err(BridgeError::Transport {
                message: format!(
                    "telegram {method} failed (HTTP {status}): {}",
                    body.description.unwrap_or_else(|| "unknown".into())
                ),
                retriable: is_retriable_status(status),
            });
        }

        body.result.ok_or_else(|| BridgeError::Transport {
            message: format!("telegram {method} returned no result"),
            retriable: false,
        })
    }

    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: Option<&str>,
    ) -> Result<(), BridgeError> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(mode) = parse_mode {
            body["parse_mode"] = serde_json::json!(mode);
        }

        let _: serde_json::Value = self
            .call(
                "sendMessage",
                self.client
                    .post(self.api_url("sendMessage"))
                    .json(&body)
                    .timeout(SEND_TIMEOUT),
            )
            .await?;
        Ok(())
    }

    async fn send_multipart(
        &self,
        method: &str,
        field: &'static str,
        chat_id: &str,
        attachment: &Attachment,
    ) -> Result<(), BridgeError> {
        let part = Part::bytes(attachment.bytes.clone()).file_name(attachment.file_name.clone());
        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part(field, part);
        if let Some(ref caption) = attachment.caption {
            form = form.text("caption", caption.clone());
        }

        let _: serde_json::Value = self
            .call(
                method,
                self.client
                    .post(self.api_url(method))
                    .multipart(form)
                    .timeout(SEND_TIMEOUT),
            )
            .await?;
        Ok(())
    }
}

fn is_retriable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Telegram rejects malformed Markdown with a 400 "can't parse entities".
fn is_parse_error(err: &BridgeError) -> bool {
    matches!(err, BridgeError::Transport { message, .. } if message.contains("can't parse entities"))
}

// -- Telegram API response types --

#[derive(Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
}

#[derive(Deserialize)]
struct TgMessage {
    chat: TgChat,
    text: Option<String>,
    caption: Option<String>,
    date: i64,
    document: Option<TgDocument>,
    #[serde(default)]
    photo: Vec<TgPhotoSize>,
}

#[derive(Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Deserialize)]
struct TgDocument {
    file_id: String,
    file_name: Option<String>,
    mime_type: Option<String>,
}

#[derive(Deserialize)]
struct TgPhotoSize {
    file_id: String,
}

impl TgUpdate {
    /// Convert to an inbound event. Messages without text or caption yield `None`.
    fn into_event(self) -> Option<InboundEvent> {
        let message = self.message?;
        let text = message.text.or(message.caption)?;

        let mut attachments = Vec::new();
        if let Some(doc) = message.document {
            attachments.push(AttachmentRef {
                file_id: doc.file_id,
                file_name: doc.file_name,
                mime_type: doc.mime_type,
            });
        }
        // Telegram lists every size of one photo; the last is the largest.
        if let Some(photo) = message.photo.into_iter().last() {
            attachments.push(AttachmentRef {
                file_id: photo.file_id,
                file_name: None,
                mime_type: Some("image/jpeg".into()),
            });
        }

        let chat_id = message.chat.id.to_string();
        Some(InboundEvent {
            update_id: self.update_id,
            sender_id: chat_id.clone(),
            chat_id,
            text,
            timestamp: DateTime::<Utc>::from_timestamp(message.date, 0).unwrap_or_else(Utc::now),
            attachments,
        })
    }
}

fn into_batch(updates: Vec<TgUpdate>) -> PollBatch {
    let next_offset = updates.iter().map(|u| u.update_id + 1).max();
    let events = updates
        .into_iter()
        .filter_map(|u| {
            let id = u.update_id;
            let event = u.into_event();
            if event.is_none() {
                tracing::debug!("Skipping update {} without text", id);
            }
            event
        })
        .collect();
    PollBatch {
        events,
        next_offset,
    }
}

// -- ChatTransport implementation --

#[async_trait]
impl ChatTransport for TelegramTransport {
    fn id(&self) -> &str {
        "telegram"
    }

    async fn poll(&self, offset: i64, timeout: Duration) -> Result<PollBatch, BridgeError> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": timeout.as_secs(),
            "allowed_updates": ["message"],
        });

        let updates: Vec<TgUpdate> = self
            .call(
                "getUpdates",
                self.client
                    .post(self.api_url("getUpdates"))
                    .json(&body)
                    .timeout(timeout + POLL_SLACK),
            )
            .await?;

        Ok(into_batch(updates))
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), BridgeError> {
        match self.send_message(chat_id, text, Some("Markdown")).await {
            Err(e) if is_parse_error(&e) => {
                tracing::debug!("Markdown rejected, resending as plain text");
                self.send_message(chat_id, text, None).await
            }
            other => other,
        }
    }

    async fn send_document(&self, chat_id: &str, attachment: &Attachment) -> Result<(), BridgeError> {
        self.send_multipart("sendDocument", "document", chat_id, attachment)
            .await
    }

    async fn send_photo(&self, chat_id: &str, attachment: &Attachment) -> Result<(), BridgeError> {
        self.send_multipart("sendPhoto", "photo", chat_id, attachment)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_updates(json: &str) -> Vec<TgUpdate> {
        let resp: TelegramResponse<Vec<TgUpdate>> = serde_json::from_str(json).unwrap();
        resp.result.unwrap()
    }

    #[test]
    fn test_text_update_becomes_event() {
        let updates = parse_updates(
            r#"{"ok":true,"result":[
                {"update_id":10,"message":{"message_id":1,"chat":{"id":42},"date":1760000000,"text":"/status"}}
            ]}"#,
        );
        let batch = into_batch(updates);
        assert_eq!(batch.next_offset, Some(11));
        assert_eq!(batch.events.len(), 1);
        let ev = &batch.events[0];
        assert_eq!(ev.sender_id, "42");
        assert_eq!(ev.chat_id, "42");
        assert_eq!(ev.text, "/status");
        assert_eq!(ev.timestamp.timestamp(), 1_760_000_000);
    }

    #[test]
    fn test_textless_updates_still_advance_offset() {
        let updates = parse_updates(
            r#"{"ok":true,"result":[
                {"update_id":7,"message":{"message_id":1,"chat":{"id":42},"date":1,"sticker":{}}},
                {"update_id":8}
            ]}"#,
        );
        let batch = into_batch(updates);
        assert!(batch.events.is_empty());
        assert_eq!(batch.next_offset, Some(9));
    }

    #[test]
    fn test_caption_and_document_attachment() {
        let updates = parse_updates(
            r#"{"ok":true,"result":[
                {"update_id":3,"message":{"message_id":1,"chat":{"id":-5},"date":1,
                 "caption":"look at this","document":{"file_id":"F1","file_name":"a.log"}}}
            ]}"#,
        );
        let batch = into_batch(updates);
        let ev = &batch.events[0];
        assert_eq!(ev.text, "look at this");
        assert_eq!(ev.sender_id, "-5");
        assert_eq!(ev.attachments.len(), 1);
        assert_eq!(ev.attachments[0].file_name.as_deref(), Some("a.log"));
    }

    #[test]
    fn test_empty_batch_keeps_offset() {
        let batch = into_batch(Vec::new());
        assert!(batch.next_offset.is_none());
    }

    #[test]
    fn test_parse_error_detection() {
        let e = BridgeError::Transport {
            message: "telegram sendMessage failed (HTTP 400 Bad Request): Bad Request: can't parse entities: x".into(),
            retriable: false,
        };
        assert!(is_parse_error(&e));
        assert!(!is_parse_error(&BridgeError::Transport {
            message: "timeout".into(),
            retriable: true,
        }));
    }

    #[test]
    fn test_retriable_status() {
        assert!(is_retriable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retriable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retriable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retriable_status(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_network_errors_do_not_expose_token() {
        let transport = TelegramTransport::new("123456:SECRET-TOKEN".into())
            .with_base_url("http://127.0.0.1:1");

        let err = transport
            .poll(0, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_retriable());
        assert!(!err.to_string().contains("SECRET-TOKEN"), "leaked: {err}");

        let err = transport.send_text("42", "hi").await.unwrap_err();
        assert!(!err.to_string().contains("SECRET-TOKEN"), "leaked: {err}");
    }
}
