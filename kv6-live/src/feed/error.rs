//! Transport error types.

use std::time::Duration;

/// Failures of the feed transport. All of them end the current connection
/// and lead to a reconnect.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Could not set up the socket or connect to the endpoint
    #[error("failed to connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    /// Receiving failed on an established connection
    #[error("receive failed: {0}")]
    Receive(String),

    /// Nothing arrived within the idle timeout
    #[error("no frame received for {0:?}")]
    Idle(Duration),

    /// The frame source has shut down
    #[error("connection closed")]
    Closed,
}

impl From<zmq::Error> for TransportError {
    fn from(e: zmq::Error) -> Self {
        TransportError::Receive(e.to_string())
    }
}
