//! Feed connection settings.

use std::time::Duration;

use crate::domain::{OperatorCode, Topic};

/// Public NDOV Loket best-effort publisher.
pub const DEFAULT_ENDPOINT: &str = "tcp://pubsub.besteffort.ndovloket.nl:7658";

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// The public feed is busy enough that a minute and a half of silence means
/// the subscription is dead, even if the socket says otherwise.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Configuration for one feed connection.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// ZeroMQ endpoint to connect to
    pub endpoint: String,
    /// Topic to subscribe to; frames on other topics are ignored
    pub topic: Topic,
    /// Fixed wait between a lost connection and the next attempt
    pub reconnect_delay: Duration,
    /// Longest gap between frames before the connection counts as lost
    pub idle_timeout: Duration,
    /// How often the blocking reader wakes up to check for shutdown
    pub poll_interval: Duration,
    /// Frames buffered between the reader and the receive loop
    pub channel_capacity: usize,
}

impl FeedConfig {
    /// Config for `topic` on the default endpoint.
    pub fn new(topic: Topic) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            topic,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Position feed of one operator on the default endpoint.
    pub fn for_operator(operator: &OperatorCode) -> Self {
        Self::new(Topic::kv6_posinfo(operator))
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self::new(Topic::kv6_posinfo(&OperatorCode::arriva()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = FeedConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.topic.as_str(), "/ARR/KV6posinfo");
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
    }

    #[test]
    fn builder() {
        let qbuzz = OperatorCode::parse("QBUZZ").unwrap();
        let config = FeedConfig::for_operator(&qbuzz)
            .with_endpoint("tcp://127.0.0.1:7658")
            .with_reconnect_delay(Duration::from_secs(1))
            .with_idle_timeout(Duration::from_secs(10))
            .with_channel_capacity(0);
        assert_eq!(config.topic.as_str(), "/QBUZZ/KV6posinfo");
        assert_eq!(config.endpoint, "tcp://127.0.0.1:7658");
        assert_eq!(config.reconnect_delay, Duration::from_secs(1));
        assert_eq!(config.idle_timeout, Duration::from_secs(10));
        assert_eq!(config.channel_capacity, 1);
    }
}
