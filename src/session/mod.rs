// src/session/mod.rs - Session continuity: transcript, file format, store

pub mod format;
pub mod store;
pub mod transcript;

pub use store::{list_sessions, SessionFile, SessionStore, LATEST_FILE};
pub use transcript::{Role, SessionTranscript, Turn};
