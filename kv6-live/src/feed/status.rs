//! Connection lifecycle as seen by observers.

use std::fmt;

use serde::Serialize;

/// Where the connector is in its connect/receive/reconnect cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Not started, or stopped by `disconnect`.
    Stopped,
    Connecting,
    Connected,
    /// Lost the connection; a retry is scheduled.
    Disconnected { reason: String },
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Stopped => write!(f, "stopped"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected { reason } => write!(f, "disconnected ({reason})"),
        }
    }
}
