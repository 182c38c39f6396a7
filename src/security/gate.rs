// src/security/gate.rs - Single-sender authorization

use crate::integrations::types::InboundEvent;

/// Outcome of checking an inbound event against the allowed sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Authorized,
    Denied,
}

/// Fixed notice optionally sent to unauthorized chats. Says nothing about the bot.
pub const DENIAL_NOTICE: &str = "Unauthorized.";

/// The sole trust boundary. Holds the one identity allowed to issue commands.
#[derive(Debug, Clone)]
pub struct SecurityGate {
    allowed_sender: String,
}

impl SecurityGate {
    pub fn new(allowed_sender: impl Into<String>) -> Self {
        Self {
            allowed_sender: allowed_sender.into().trim().to_string(),
        }
    }

    pub fn allowed_sender(&self) -> &str {
        &self.allowed_sender
    }

    pub fn authorize(&self, event: &InboundEvent) -> Authorization {
        if !self.allowed_sender.is_empty() && event.sender_id == self.allowed_sender {
            Authorization::Authorized
        } else {
            tracing::warn!(
                "Unauthorized access attempt from sender_id={}",
                event.sender_id
            );
            Authorization::Denied
        }
    }
}
