// src/infra/errors.rs - Error types for deskrelay

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    // Completion API errors
    #[error("Provider '{provider}' error: {message}")]
    Upstream {
        provider: String,
        message: String,
        retriable: bool,
    },

    #[error("Rate limited by '{provider}', retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    // Shell / file / screenshot failures
    #[error("{action} failed: {message}")]
    LocalAction { action: String, message: String },

    // Session store write failures
    #[error("Session write failed: {0}")]
    Persistence(String),

    // Chat transport failures
    #[error("Transport error: {message}")]
    Transport { message: String, retriable: bool },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    pub fn local(action: impl Into<String>, message: impl Into<String>) -> Self {
        BridgeError::LocalAction {
            action: action.into(),
            message: message.into(),
        }
    }

    pub fn persistence(err: impl std::fmt::Display) -> Self {
        BridgeError::Persistence(err.to_string())
    }

    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            BridgeError::Upstream {
                retriable: true,
                ..
            } | BridgeError::RateLimited { .. }
                | BridgeError::Transport {
                    retriable: true,
                    ..
                }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_variants() {
        assert!(BridgeError::RateLimited {
            provider: "google".into(),
            retry_after_ms: 100,
        }
        .is_retriable());
        assert!(BridgeError::Transport {
            message: "reset".into(),
            retriable: true,
        }
        .is_retriable());
        assert!(!BridgeError::Upstream {
            provider: "google".into(),
            message: "HTTP 401".into(),
            retriable: false,
        }
        .is_retriable());
        assert!(!BridgeError::persistence("disk full").is_retriable());
    }

    #[test]
    fn test_local_action_display() {
        let e = BridgeError::local("screenshot", "no display");
        assert_eq!(e.to_string(), "screenshot failed: no display");
    }
}
