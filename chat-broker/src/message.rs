use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A chat message routed by the broker.
///
/// `recipient` is ignored when `broadcast` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub sender: String,
    pub recipient: String,
    pub content: String,
    pub broadcast: bool,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
}

impl Message {
    /// Builds a unicast message stamped with the current time.
    pub fn direct(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            content: content.into(),
            broadcast: false,
            timestamp: Utc::now().timestamp(),
        }
    }

    /// Builds a broadcast message stamped with the current time.
    pub fn broadcast(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            recipient: String::new(),
            content: content.into(),
            broadcast: true,
            timestamp: Utc::now().timestamp(),
        }
    }

    /// Checks the addressing fields a submission path should reject early.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sender.is_empty() {
            return Err(ValidationError::EmptySender);
        }
        if !self.broadcast && self.recipient.is_empty() {
            return Err(ValidationError::EmptyRecipient);
        }
        Ok(())
    }
}
