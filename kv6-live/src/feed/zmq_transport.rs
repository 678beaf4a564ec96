//! ZeroMQ SUB transport.
//!
//! libzmq sockets are blocking and not async-aware, so each subscription
//! runs its socket on a blocking task. The task polls with a short timeout,
//! forwards frames over a bounded channel and exits when the source is
//! dropped.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::Topic;

use super::error::TransportError;
use super::transport::{FrameSource, RawFrame, Transport};

/// Opens SUB sockets against a ZeroMQ publisher.
#[derive(Debug, Clone)]
pub struct ZmqTransport {
    poll_interval: Duration,
    channel_capacity: usize,
}

impl ZmqTransport {
    pub fn new(poll_interval: Duration, channel_capacity: usize) -> Self {
        Self {
            poll_interval,
            channel_capacity: channel_capacity.max(1),
        }
    }
}

impl Transport for ZmqTransport {
    type Source = ZmqSource;

    async fn open(&self, endpoint: &str, topic: &Topic) -> Result<ZmqSource, TransportError> {
        let endpoint = endpoint.to_string();
        let subscription = topic.as_str().as_bytes().to_vec();

        let connect_endpoint = endpoint.clone();
        let joined =
            tokio::task::spawn_blocking(move || connect(&connect_endpoint, &subscription)).await;
        let (context, socket) = match joined {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(connect_error(&endpoint, e)),
            Err(e) => return Err(connect_error(&endpoint, e)),
        };

        info!(%endpoint, topic = topic.as_str(), "subscribed");

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let stop = CancellationToken::new();
        let reader = Reader {
            context,
            socket,
            tx,
            stop: stop.clone(),
            poll_timeout_ms: i64::try_from(self.poll_interval.as_millis()).unwrap_or(i64::MAX),
        };
        tokio::task::spawn_blocking(move || reader.run());

        Ok(ZmqSource { rx, stop })
    }
}

fn connect_error(endpoint: &str, e: impl std::fmt::Display) -> TransportError {
    TransportError::Connect {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    }
}

fn connect(endpoint: &str, subscription: &[u8]) -> Result<(zmq::Context, zmq::Socket), zmq::Error> {
    let context = zmq::Context::new();
    let socket = context.socket(zmq::SUB)?;
    socket.set_linger(0)?;
    socket.connect(endpoint)?;
    socket.set_subscribe(subscription)?;
    Ok((context, socket))
}

/// Owns the socket on the blocking thread.
struct Reader {
    context: zmq::Context,
    socket: zmq::Socket,
    tx: mpsc::Sender<Result<RawFrame, TransportError>>,
    stop: CancellationToken,
    poll_timeout_ms: i64,
}

impl Reader {
    fn run(self) {
        while !self.stop.is_cancelled() {
            let outcome = match self.socket.poll(zmq::POLLIN, self.poll_timeout_ms) {
                Ok(0) => continue,
                Ok(_) => self.socket.recv_multipart(0).map(RawFrame::from_parts),
                Err(e) => Err(e),
            };
            let failed = outcome.is_err();
            if self.tx.blocking_send(outcome.map_err(TransportError::from)).is_err() || failed {
                break;
            }
        }
        debug!("zmq reader stopped");

        // The socket must close before the context terminates.
        drop(self.socket);
        drop(self.context);
    }
}

/// Frames from one ZeroMQ subscription. Dropping it stops the reader.
pub struct ZmqSource {
    rx: mpsc::Receiver<Result<RawFrame, TransportError>>,
    stop: CancellationToken,
}

impl FrameSource for ZmqSource {
    async fn next_frame(&mut self) -> Result<RawFrame, TransportError> {
        match self.rx.recv().await {
            Some(result) => result,
            None => Err(TransportError::Closed),
        }
    }
}

impl Drop for ZmqSource {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
