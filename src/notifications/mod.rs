// src/notifications/mod.rs
//! Buyer e-mail notifications: rendering, transport and fire-and-forget dispatch.

pub mod dispatcher;
pub mod templates;
pub mod transport;

use std::fmt;

pub use dispatcher::NotificationDispatcher;
pub use templates::render;

/// Workflow event that produces an e-mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum NotificationEvent {
    Created,
    StatusChanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

/// Failure inside the dispatcher. Never converted into an `ApiError`.
#[derive(Debug)]
pub enum DispatchError {
    Render(String),
    Transport(String),
    InvalidAddress(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Render(msg) => write!(f, "Failed to render email: {}", msg),
            DispatchError::Transport(msg) => write!(f, "Failed to send email: {}", msg),
            DispatchError::InvalidAddress(msg) => write!(f, "Invalid email address: {}", msg),
        }
    }
}

impl std::error::Error for DispatchError {}

impl DispatchError {
    /// Rendering and addressing errors will fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Transport(_))
    }
}
