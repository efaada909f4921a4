use thiserror::Error;

/// Errors returned synchronously by [`crate::broker::Broker`] operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker's cancellation token had fired.
    #[error("broker cancelled")]
    Cancelled,

    /// The router loop has exited and no longer accepts messages.
    #[error("broker stopped")]
    Stopped,

    /// The input queue is full and the caller asked not to wait.
    #[error("broker input queue is full")]
    Backpressure,

    #[error("broker is already running")]
    AlreadyRunning,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("directory cancelled")]
    Cancelled,

    #[error("user '{0}' not found")]
    NotFound(String),
}

/// Field-level validation failures for users and messages.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("empty name")]
    EmptyName,

    #[error("invalid email")]
    InvalidEmail,

    #[error("empty id")]
    EmptyId,

    #[error("empty sender")]
    EmptySender,

    #[error("unicast message has no recipient")]
    EmptyRecipient,
}
