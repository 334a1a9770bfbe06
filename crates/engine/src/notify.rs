//! Out-of-band email dispatch.
//!
//! Every persisted notification is followed by one [`EmailRequest`]. Sending
//! is best-effort: the engine logs a [`DispatchError`] and moves on.

use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::info;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no email address for user {0}")]
    MissingRecipient(String),
    #[error("email transport failed: {0}")]
    Transport(String),
}

pub trait EmailDispatcher: Send + Sync {
    fn send(&self, request: &EmailRequest) -> Result<(), DispatchError>;
}

/// Logs the mail instead of sending it.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogEmailDispatcher;

impl EmailDispatcher for LogEmailDispatcher {
    fn send(&self, request: &EmailRequest) -> Result<(), DispatchError> {
        info!(to = %request.to, subject = %request.subject, "email dispatched");
        Ok(())
    }
}

/// Records sent mails; can be switched to fail every send.
#[derive(Debug, Default)]
pub struct MemoryEmailDispatcher {
    sent: Mutex<Vec<EmailRequest>>,
    failing: bool,
}

impl MemoryEmailDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher whose transport is always down.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            failing: true,
        }
    }

    pub fn sent(&self) -> Vec<EmailRequest> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EmailDispatcher for MemoryEmailDispatcher {
    fn send(&self, request: &EmailRequest) -> Result<(), DispatchError> {
        if self.failing {
            return Err(DispatchError::Transport("connection refused".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        Ok(())
    }
}
