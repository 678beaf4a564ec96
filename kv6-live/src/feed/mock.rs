//! Scripted in-memory transport for tests and local development.
//!
//! Each call to `open` consumes the next [`Script`]. Once the scripts run
//! out, every further open succeeds with a source that never yields, which
//! looks like a quiet but healthy connection.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::domain::Topic;

use super::error::TransportError;
use super::transport::{FrameSource, RawFrame, Transport};

/// What one `open` call does.
#[derive(Debug)]
pub enum Script {
    /// Fail to connect with this message.
    Refuse(String),
    /// Connect and yield these results in order, then go quiet.
    Serve(Vec<Result<RawFrame, TransportError>>),
    /// Connect and yield whatever is sent on the paired [`LiveFeed`].
    Live(mpsc::UnboundedReceiver<Result<RawFrame, TransportError>>),
}

/// Sending half of a [`Script::Live`] connection.
#[derive(Debug, Clone)]
pub struct LiveFeed {
    tx: mpsc::UnboundedSender<Result<RawFrame, TransportError>>,
}

impl LiveFeed {
    /// Script entry and its sender.
    pub fn pair() -> (Script, LiveFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Script::Live(rx), LiveFeed { tx })
    }

    /// Deliver a frame. Returns `false` once the connection is gone.
    pub fn send(&self, frame: RawFrame) -> bool {
        self.tx.send(Ok(frame)).is_ok()
    }

    /// Break the connection with a receive error.
    pub fn fail(&self, message: &str) -> bool {
        self.tx
            .send(Err(TransportError::Receive(message.to_string())))
            .is_ok()
    }
}

#[derive(Debug, Default)]
pub struct MockTransport {
    scripts: Mutex<VecDeque<Script>>,
    opened: Mutex<Vec<(String, String)>>,
}

impl MockTransport {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// `(endpoint, topic)` of every open attempt so far, refused ones
    /// included.
    pub fn opened(&self) -> Vec<(String, String)> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn open_count(&self) -> usize {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Transport for MockTransport {
    type Source = MockSource;

    async fn open(&self, endpoint: &str, topic: &Topic) -> Result<MockSource, TransportError> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((endpoint.to_string(), topic.as_str().to_string()));

        let script = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        let rx = match script {
            Some(Script::Refuse(message)) => {
                return Err(TransportError::Connect {
                    endpoint: endpoint.to_string(),
                    message,
                });
            }
            Some(Script::Serve(results)) => {
                let (tx, rx) = mpsc::unbounded_channel();
                for result in results {
                    let _ = tx.send(result);
                }
                rx
            }
            Some(Script::Live(rx)) => rx,
            None => mpsc::unbounded_channel().1,
        };
        Ok(MockSource { rx })
    }
}

pub struct MockSource {
    rx: mpsc::UnboundedReceiver<Result<RawFrame, TransportError>>,
}

impl FrameSource for MockSource {
    async fn next_frame(&mut self) -> Result<RawFrame, TransportError> {
        match self.rx.recv().await {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}
