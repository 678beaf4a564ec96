//! Feed connection: subscribe to a KV6 topic and keep the subscription
//! alive.
//!
//! The NDOV Loket publishes each operator's messages on a ZeroMQ topic such
//! as `/ARR/KV6posinfo`. A [`FeedConnector`] owns one such subscription,
//! runs every frame through [`kv6::process_frame`](crate::kv6::process_frame)
//! and publishes the resulting events on the hub. Connection failures of any
//! kind lead to a reconnect after a fixed delay.

mod config;
mod connector;
mod error;
pub mod mock;
mod stats;
mod status;
mod transport;
mod zmq_transport;

pub use config::{DEFAULT_ENDPOINT, FeedConfig};
pub use connector::FeedConnector;
pub use error::TransportError;
pub use stats::{FeedStats, FeedStatsSnapshot};
pub use status::ConnectionStatus;
pub use transport::{FrameSource, RawFrame, Transport};
pub use zmq_transport::{ZmqSource, ZmqTransport};
