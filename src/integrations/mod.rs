// src/integrations/mod.rs - Chat transport layer

pub mod telegram;
pub mod types;

pub use telegram::TelegramTransport;
pub use types::{Attachment, AttachmentRef, ChatTransport, InboundEvent, PollBatch};
