//! Notification error types.

use thiserror::Error;

/// Reasons a notification was not delivered.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Delivery queue is full (non-blocking enqueue failed)
    #[error("notification queue full, message dropped")]
    QueueFull,

    /// Delivery worker is no longer running
    #[error("notification worker stopped, message dropped")]
    WorkerStopped,

    /// Request never got a response (connect failure, timeout, ...)
    #[error("transport error: {0}")]
    Transport(String),

    /// Endpoint answered with a non-success status
    #[error("rejected with HTTP {status}: {reason}")]
    Rejected { status: u16, reason: String },
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Transport(err.to_string())
    }
}
