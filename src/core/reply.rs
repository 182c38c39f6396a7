// src/core/reply.rs - Reply values and the sink that delivers them

use std::sync::Arc;
use std::time::Duration;

use crate::infra::config::ReplyConfig;
use crate::infra::errors::BridgeError;
use crate::integrations::types::{Attachment, ChatTransport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyItem {
    Text(String),
    Document(Attachment),
    Photo(Attachment),
}

/// Everything a handler wants sent back, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    items: Vec<ReplyItem>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            items: vec![ReplyItem::Text(text.into())],
        }
    }

    pub fn document(attachment: Attachment) -> Self {
        Self {
            items: vec![ReplyItem::Document(attachment)],
        }
    }

    pub fn photo(attachment: Attachment) -> Self {
        Self {
            items: vec![ReplyItem::Photo(attachment)],
        }
    }

    pub fn push(&mut self, item: ReplyItem) {
        self.items.push(item);
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.items.push(ReplyItem::Text(text.into()));
    }

    pub fn items(&self) -> &[ReplyItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All text items joined by newlines (attachments skipped).
    pub fn text_content(&self) -> String {
        self.items
            .iter()
            .filter_map(|i| match i {
                ReplyItem::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Split `text` into chunks of at most `max_units` UTF-16 code units, the
/// unit Telegram measures message length in.
///
/// A chunk ends after the last newline that fits when there is one,
/// otherwise at the last character that fits. Concatenating the chunks
/// gives `text` back and no chunk is empty.
pub fn chunk_text(text: &str, max_units: usize) -> Vec<String> {
    let max_units = max_units.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let hard_end = match utf16_cut(rest, max_units) {
            Some(idx) => idx,
            None => {
                chunks.push(rest.to_string());
                break;
            }
        };

        let end = match rest[..hard_end].rfind('\n') {
            Some(pos) if pos > 0 => pos + 1,
            _ => hard_end,
        };

        chunks.push(rest[..end].to_string());
        rest = &rest[end..];
    }

    chunks
}

/// Byte index where `text` first exceeds `max_units`, or `None` if it fits.
/// Always at least one character in, so a chunk is never empty.
fn utf16_cut(text: &str, max_units: usize) -> Option<usize> {
    let mut units = 0;
    for (idx, ch) in text.char_indices() {
        units += ch.len_utf16();
        if units > max_units {
            return Some(if idx == 0 { ch.len_utf8() } else { idx });
        }
    }
    None
}

/// What happened to one reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Transport messages sent successfully.
    pub sent: usize,
    /// Messages given up on (the first failure also drops the rest of the reply).
    pub dropped: usize,
}

impl DeliveryReport {
    pub fn complete(&self) -> bool {
        self.dropped == 0
    }
}

enum Outgoing<'a> {
    Text(String),
    Document(&'a Attachment),
    Photo(&'a Attachment),
}

/// Sends replies through the transport with chunking and bounded retry.
pub struct ReplySink {
    transport: Arc<dyn ChatTransport>,
    chunk_chars: usize,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl ReplySink {
    pub fn new(transport: Arc<dyn ChatTransport>, config: &ReplyConfig) -> Self {
        Self {
            transport,
            chunk_chars: config.chunk_chars,
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        }
    }

    pub fn transport(&self) -> &Arc<dyn ChatTransport> {
        &self.transport
    }

    /// Deliver every item in order. Failures are logged, never returned.
    pub async fn send(&self, chat_id: &str, reply: &Reply) -> DeliveryReport {
        let mut outgoing = Vec::new();
        for item in reply.items() {
            match item {
                ReplyItem::Text(text) => outgoing.extend(
                    chunk_text(text, self.chunk_chars)
                        .into_iter()
                        .map(Outgoing::Text),
                ),
                ReplyItem::Document(a) => outgoing.push(Outgoing::Document(a)),
                ReplyItem::Photo(a) => outgoing.push(Outgoing::Photo(a)),
            }
        }

        let total = outgoing.len();
        let mut report = DeliveryReport::default();
        for message in &outgoing {
            match self.deliver(chat_id, message).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    report.dropped = total - report.sent;
                    tracing::error!(
                        chat_id,
                        dropped = report.dropped,
                        "Reply delivery failed: {}",
                        e
                    );
                    break;
                }
            }
        }
        report
    }

    async fn deliver(&self, chat_id: &str, message: &Outgoing<'_>) -> Result<(), BridgeError> {
        let mut attempt = 1;
        loop {
            let result = match message {
                Outgoing::Text(text) => self.transport.send_text(chat_id, text).await,
                Outgoing::Document(a) => self.transport.send_document(chat_id, a).await,
                Outgoing::Photo(a) => self.transport.send_photo(chat_id, a).await,
            };

            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retriable() && attempt < self.max_attempts => {
                    let delay = self.initial_backoff * 2u32.saturating_pow(attempt - 1);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Send failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::types::PollBatch;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[test]
    fn test_chunk_short_text_is_single() {
        assert_eq!(chunk_text("hello", 10), vec!["hello"]);
        assert!(chunk_text("", 10).is_empty());
    }

    #[test]
    fn test_chunk_prefers_newline() {
        let chunks = chunk_text("aaaa\nbbbb\ncccc", 11);
        assert_eq!(chunks, vec!["aaaa\nbbbb\n", "cccc"]);
    }

    #[test]
    fn test_chunk_hard_split_without_newline() {
        let chunks = chunk_text("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_chunk_multibyte_and_reassembly() {
        let text = "ü".repeat(10) + "\n" + &"ß".repeat(7);
        let chunks = chunk_text(&text, 4);
        assert!(chunks.iter().all(|c| !c.is_empty() && c.chars().count() <= 4));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_chunk_counts_utf16_units() {
        // each emoji is a surrogate pair: two units, one char
        let text = "😀".repeat(5) + "ab";
        let chunks = chunk_text(&text, 4);
        assert_eq!(chunks, vec!["😀😀", "😀😀", "😀ab"]);
        assert!(chunks.iter().all(|c| c.encode_utf16().count() <= 4));

        let at_limit = "😀".repeat(2048);
        assert_eq!(chunk_text(&at_limit, 4096).len(), 1);
        let over = "😀".repeat(2049);
        let chunks = chunk_text(&over, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks.concat(), over);
    }

    #[test]
    fn test_chunk_wide_char_over_tiny_limit_still_progresses() {
        let chunks = chunk_text("😀😀", 1);
        assert_eq!(chunks, vec!["😀", "😀"]);
    }

    #[test]
    fn test_chunk_leading_newline_not_empty() {
        let chunks = chunk_text("\nabcdef", 3);
        assert!(chunks.iter().all(|c| !c.is_empty()));
        assert_eq!(chunks.concat(), "\nabcdef");
    }

    #[test]
    fn test_reply_text_content() {
        let mut reply = Reply::text("a");
        reply.push(ReplyItem::Photo(Attachment {
            file_name: "s.png".into(),
            bytes: vec![1],
            caption: None,
        }));
        reply.push_text("b");
        assert_eq!(reply.text_content(), "a\nb");
        assert_eq!(reply.items().len(), 3);
    }

    /// Fails the first `failures` sends with the given retriable flag.
    struct FlakyTransport {
        failures: Mutex<u32>,
        retriable: bool,
        sent: Mutex<Vec<String>>,
    }

    impl FlakyTransport {
        fn new(failures: u32, retriable: bool) -> Arc<Self> {
            Arc::new(Self {
                failures: Mutex::new(failures),
                retriable,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatTransport for FlakyTransport {
        fn id(&self) -> &str {
            "flaky"
        }
        async fn poll(&self, _offset: i64, _timeout: Duration) -> Result<PollBatch, BridgeError> {
            Ok(PollBatch::default())
        }
        async fn send_text(&self, _chat_id: &str, text: &str) -> Result<(), BridgeError> {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(BridgeError::Transport {
                    message: "boom".into(),
                    retriable: self.retriable,
                });
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
        async fn send_document(&self, _chat_id: &str, a: &Attachment) -> Result<(), BridgeError> {
            self.sent.lock().unwrap().push(format!("doc:{}", a.file_name));
            Ok(())
        }
        async fn send_photo(&self, _chat_id: &str, a: &Attachment) -> Result<(), BridgeError> {
            self.sent.lock().unwrap().push(format!("photo:{}", a.file_name));
            Ok(())
        }
    }

    fn config(chunk_chars: usize) -> ReplyConfig {
        ReplyConfig {
            chunk_chars,
            max_attempts: 3,
            initial_backoff_ms: 1,
            progress_notices: false,
        }
    }

    #[tokio::test]
    async fn test_sink_chunks_in_order() {
        let transport = FlakyTransport::new(0, true);
        let sink = ReplySink::new(transport.clone(), &config(3));
        let report = sink.send("42", &Reply::text("abcdefg")).await;
        assert_eq!(report.sent, 3);
        assert!(report.complete());
        assert_eq!(*transport.sent.lock().unwrap(), vec!["abc", "def", "g"]);
    }

    #[tokio::test]
    async fn test_sink_retries_transient_failures() {
        let transport = FlakyTransport::new(2, true);
        let sink = ReplySink::new(transport.clone(), &config(100));
        let report = sink.send("42", &Reply::text("hi")).await;
        assert!(report.complete());
        assert_eq!(*transport.sent.lock().unwrap(), vec!["hi"]);
    }

    #[tokio::test]
    async fn test_sink_gives_up_after_budget() {
        let transport = FlakyTransport::new(5, true);
        let sink = ReplySink::new(transport.clone(), &config(2));
        let report = sink.send("42", &Reply::text("abcd")).await;
        assert_eq!(report.sent, 0);
        assert_eq!(report.dropped, 2);
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sink_no_retry_on_terminal_error() {
        let transport = FlakyTransport::new(1, false);
        let sink = ReplySink::new(transport.clone(), &config(100));
        let report = sink.send("42", &Reply::text("hi")).await;
        assert_eq!(report.dropped, 1);
        // The one failure was consumed and nothing was retried.
        assert_eq!(*transport.failures.lock().unwrap(), 0);
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sink_sends_attachments() {
        let transport = FlakyTransport::new(0, true);
        let sink = ReplySink::new(transport.clone(), &config(100));
        let mut reply = Reply::document(Attachment {
            file_name: "a.txt".into(),
            bytes: b"x".to_vec(),
            caption: None,
        });
        reply.push_text("done");
        sink.send("42", &reply).await;
        assert_eq!(*transport.sent.lock().unwrap(), vec!["doc:a.txt", "done"]);
    }
}
