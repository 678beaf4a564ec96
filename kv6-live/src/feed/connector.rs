//! Connection lifecycle and the receive loop.

use std::sync::{Arc, Mutex, PoisonError};

use base64::prelude::*;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::hub::{EventHub, HubEvent};
use crate::kv6::{FrameError, ParseContext, process_frame};

use super::config::FeedConfig;
use super::error::TransportError;
use super::stats::FeedStats;
use super::status::ConnectionStatus;
use super::transport::{FrameSource, RawFrame, Transport};

/// Bytes of an undecodable payload shown in the debug log.
const PREVIEW_BYTES: usize = 64;

/// Keeps one feed subscription alive and pushes its events into the hub.
///
/// [`connect`](Self::connect) starts a background task that opens the
/// transport, receives frames and, on any transport failure, waits the
/// configured delay and tries again, indefinitely.
/// [`disconnect`](Self::disconnect) stops it.
pub struct FeedConnector<T: Transport> {
    shared: Arc<Shared<T>>,
    running: Mutex<Option<Running>>,
}

struct Shared<T> {
    transport: T,
    config: FeedConfig,
    hub: Arc<EventHub>,
    stats: Arc<FeedStats>,
    status: watch::Sender<ConnectionStatus>,
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Why a receive loop ended.
enum LoopExit {
    Cancelled,
    Failed(TransportError),
}

impl<T: Transport> FeedConnector<T> {
    pub fn new(transport: T, config: FeedConfig, hub: Arc<EventHub>, stats: Arc<FeedStats>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Stopped);
        Self {
            shared: Arc::new(Shared {
                transport,
                config,
                hub,
                stats,
                status,
            }),
            running: Mutex::new(None),
        }
    }

    /// Start the connection task. Does nothing if it is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            debug!(topic = self.shared.config.topic.as_str(), "already connected");
            return;
        }

        let cancel = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(shared.run(cancel.clone()));
        *running = Some(Running { cancel, task });
    }

    /// Stop the connection task and wait for it to finish.
    ///
    /// Idempotent. Once this returns no reconnect attempt is pending and
    /// none will start.
    pub async fn disconnect(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(Running { cancel, task }) = running else {
            return;
        };

        cancel.cancel();
        if let Err(e) = task.await {
            warn!(error = %e, "connection task ended abnormally");
            self.shared.set_status(ConnectionStatus::Stopped);
        }
        info!(topic = self.shared.config.topic.as_str(), "disconnected");
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.status.borrow().clone()
    }

    /// Receiver that observes every status transition.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    pub fn config(&self) -> &FeedConfig {
        &self.shared.config
    }

    pub fn transport(&self) -> &T {
        &self.shared.transport
    }
}

impl<T: Transport> Shared<T> {
    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let config = &self.config;
        loop {
            self.set_status(ConnectionStatus::Connecting);
            let opened = tokio::select! {
                _ = cancel.cancelled() => break,
                opened = self.transport.open(&config.endpoint, &config.topic) => opened,
            };

            let reason = match opened {
                Ok(source) => {
                    info!(endpoint = %config.endpoint, topic = config.topic.as_str(), "connected");
                    self.set_status(ConnectionStatus::Connected);
                    match self.receive(source, &cancel).await {
                        LoopExit::Cancelled => break,
                        LoopExit::Failed(e) => e,
                    }
                }
                Err(e) => e,
            };

            warn!(
                error = %reason,
                retry_in = ?config.reconnect_delay,
                "feed connection lost"
            );
            self.stats.record_reconnect(&reason.to_string());
            self.set_status(ConnectionStatus::Disconnected {
                reason: reason.to_string(),
            });

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(config.reconnect_delay) => {}
            }
        }
        self.set_status(ConnectionStatus::Stopped);
    }

    async fn receive(&self, mut source: T::Source, cancel: &CancellationToken) -> LoopExit {
        let idle = self.config.idle_timeout;
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return LoopExit::Cancelled,
                next = tokio::time::timeout(idle, source.next_frame()) => next,
            };
            match next {
                Ok(Ok(frame)) => self.handle_frame(&frame),
                Ok(Err(e)) => return LoopExit::Failed(e),
                Err(_) => return LoopExit::Failed(TransportError::Idle(idle)),
            }
        }
    }

    fn handle_frame(&self, frame: &RawFrame) {
        let topic = &self.config.topic;
        if !topic.matches(&frame.topic) {
            self.stats.record_ignored();
            trace!(topic = %frame.topic_lossy(), "ignoring frame on another topic");
            return;
        }
        self.stats.record_frame(topic.operator());

        let ctx = ParseContext {
            operator: topic.operator().clone(),
            received_at: Utc::now(),
        };
        match process_frame(&frame.payload, &ctx) {
            Ok(processed) => {
                self.stats
                    .record_decoded(processed.events.len(), processed.ignored.len());
                if !processed.ignored.is_empty() {
                    debug!(elements = ?processed.ignored, "skipped unknown report types");
                }
                for event in processed.events {
                    self.hub.publish(HubEvent::Vehicle(Arc::new(event)));
                }
            }
            Err(FrameError::Undecodable { len }) => {
                self.stats.record_undecodable();
                let head = &frame.payload[..len.min(PREVIEW_BYTES)];
                debug!(len, preview = %BASE64_STANDARD.encode(head), "dropping undecodable frame");
            }
            Err(e @ FrameError::Parse(_)) => {
                self.stats.record_invalid(&e.to_string());
                warn!(error = %e, "dropping invalid frame");
            }
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_replace(status.clone());
        self.hub.publish(HubEvent::Connection(status));
    }
}
