//! The seam between the connector and the wire.
//!
//! A [`Transport`] opens subscriptions; each open subscription is a
//! [`FrameSource`] the connector pulls frames from. Production uses
//! [`ZmqTransport`](super::ZmqTransport); tests use the scripted transport
//! in [`mock`](super::mock).

use std::fmt;
use std::future::Future;

use crate::domain::Topic;

use super::error::TransportError;

/// One message off the wire, before any decoding.
#[derive(Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub topic: Vec<u8>,
    pub payload: Vec<u8>,
}

impl RawFrame {
    pub fn new(topic: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Build a frame from the parts of a multipart message. A missing
    /// payload part is an empty payload; parts after the second are ignored.
    pub fn from_parts(parts: Vec<Vec<u8>>) -> Self {
        let mut parts = parts.into_iter();
        Self {
            topic: parts.next().unwrap_or_default(),
            payload: parts.next().unwrap_or_default(),
        }
    }

    /// Topic as text, for logs.
    pub fn topic_lossy(&self) -> String {
        String::from_utf8_lossy(&self.topic).into_owned()
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("topic", &self.topic_lossy())
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// An open subscription.
pub trait FrameSource: Send {
    /// Wait for the next frame.
    ///
    /// Must be cancel-safe: dropping the future before it completes loses no
    /// frame. An `Err` ends the subscription.
    fn next_frame(&mut self) -> impl Future<Output = Result<RawFrame, TransportError>> + Send;
}

/// Something that can open subscriptions to a feed.
pub trait Transport: Send + Sync + 'static {
    type Source: FrameSource + 'static;

    fn open(
        &self,
        endpoint: &str,
        topic: &Topic,
    ) -> impl Future<Output = Result<Self::Source, TransportError>> + Send;
}
