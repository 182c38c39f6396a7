// tests/common/mod.rs - Shared fakes for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

use deskrelay::actions::ScreenCapture;
use deskrelay::core::{ActionRouter, DispatchOptions, Dispatcher, ReplySink};
use deskrelay::infra::config::Config;
use deskrelay::infra::errors::BridgeError;
use deskrelay::integrations::{Attachment, ChatTransport, InboundEvent, PollBatch};
use deskrelay::provider::{ChatRequest, ChatResponse, ModelProvider};
use deskrelay::security::SecurityGate;
use deskrelay::session::SessionStore;

pub const OWNER: &str = "42";

// ---------- Transport ----------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text { chat_id: String, text: String },
    Document { chat_id: String, file_name: String, bytes: Vec<u8> },
    Photo { chat_id: String, bytes: Vec<u8> },
}

/// Records every send and replays scripted poll results.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<Sent>>,
    pub polls: Mutex<VecDeque<Result<PollBatch, BridgeError>>>,
    pub poll_offsets: Mutex<Vec<i64>>,
    /// Signalled once the poll script is exhausted.
    pub drained: Arc<Notify>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_polls(polls: Vec<Result<PollBatch, BridgeError>>) -> Arc<Self> {
        Arc::new(Self {
            polls: Mutex::new(polls.into()),
            ..Self::default()
        })
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    fn id(&self) -> &str {
        "recording"
    }

    async fn poll(&self, offset: i64, _timeout: Duration) -> Result<PollBatch, BridgeError> {
        self.poll_offsets.lock().unwrap().push(offset);
        let next = self.polls.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => {
                self.drained.notify_one();
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(PollBatch::default())
            }
        }
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), BridgeError> {
        self.sent.lock().unwrap().push(Sent::Text {
            chat_id: chat_id.into(),
            text: text.into(),
        });
        Ok(())
    }

    async fn send_document(&self, chat_id: &str, a: &Attachment) -> Result<(), BridgeError> {
        self.sent.lock().unwrap().push(Sent::Document {
            chat_id: chat_id.into(),
            file_name: a.file_name.clone(),
            bytes: a.bytes.clone(),
        });
        Ok(())
    }

    async fn send_photo(&self, chat_id: &str, a: &Attachment) -> Result<(), BridgeError> {
        self.sent.lock().unwrap().push(Sent::Photo {
            chat_id: chat_id.into(),
            bytes: a.bytes.clone(),
        });
        Ok(())
    }
}

// ---------- Completion provider ----------

/// Returns scripted completions in order and records each request.
#[derive(Default)]
pub struct ScriptedProvider {
    pub replies: Mutex<VecDeque<Result<String, BridgeError>>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<String, BridgeError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

pub fn upstream_failure(message: &str) -> BridgeError {
    BridgeError::Upstream {
        provider: "scripted".into(),
        message: message.into(),
        retriable: false,
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    fn name(&self) -> &str {
        "Scripted"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, BridgeError> {
        self.requests.lock().unwrap().push(request);
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(upstream_failure("no scripted reply")))
            .map(|content| ChatResponse {
                content,
                ..Default::default()
            })
    }
}

// ---------- Screen ----------

pub struct FakeScreen(pub Result<Vec<u8>, String>);

#[async_trait]
impl ScreenCapture for FakeScreen {
    async fn capture(&self) -> Result<Vec<u8>, BridgeError> {
        self.0
            .clone()
            .map_err(|m| BridgeError::local("screenshot", m))
    }
}

// ---------- Harness ----------

pub struct Harness {
    pub dir: TempDir,
    pub transport: Arc<RecordingTransport>,
    pub provider: Arc<ScriptedProvider>,
    pub dispatcher: Dispatcher<ActionRouter>,
}

impl Harness {
    pub fn store(&self) -> &SessionStore {
        self.dispatcher.router().store()
    }

    pub fn project(&self) -> std::path::PathBuf {
        self.dir.path().join("project")
    }

    pub async fn send(&mut self, text: &str) -> deskrelay::core::Outcome {
        self.dispatcher.handle(InboundEvent::text(OWNER, text)).await
    }
}

pub fn test_config(dir: &TempDir) -> Config {
    let project = dir.path().join("project");
    std::fs::create_dir_all(&project).unwrap();

    let mut config = Config::default();
    config.telegram.allowed_chat_id = OWNER.into();
    config.files.project_dir = Some(project.display().to_string());
    config.files.allowed_root = Some(project.display().to_string());
    config.sessions.dir = Some(dir.path().join("sessions").display().to_string());
    config.shell.timeout_secs = 1;
    config.reply.progress_notices = false;
    config.reply.initial_backoff_ms = 1;
    config
}

pub fn harness_with(
    replies: Vec<Result<String, BridgeError>>,
    tweak: impl FnOnce(&mut Config),
) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    tweak(&mut config);

    let transport = RecordingTransport::new();
    let provider = ScriptedProvider::new(replies);
    let store = SessionStore::open(config.sessions.dir(), config.files.project_dir()).unwrap();
    let router = ActionRouter::from_config(store, provider.clone(), &config)
        .with_screen(Arc::new(FakeScreen(Ok(b"PNG".to_vec()))));
    let dispatcher = Dispatcher::new(
        SecurityGate::new(config.telegram.allowed_chat_id.clone()),
        router,
        ReplySink::new(transport.clone(), &config.reply),
        DispatchOptions {
            notify_denied: config.telegram.notify_denied,
            progress_notices: config.reply.progress_notices,
        },
    );

    Harness {
        dir,
        transport,
        provider,
        dispatcher,
    }
}

pub fn harness(replies: Vec<Result<String, BridgeError>>) -> Harness {
    harness_with(replies, |_| {})
}
