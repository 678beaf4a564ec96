//! Hub subscriber that feeds a bounded channel, for streaming clients.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use crate::domain::VehicleEvent;
use crate::feed::ConnectionStatus;
use crate::pipeline::StatusReport;
use crate::store::{VehicleState, VehicleStore};

use super::{EventHub, HubEvent, Subscriber, SubscriberError, SubscriptionId};

/// One message on a client stream.
///
/// A stream always opens with `Connected` and then `InitialData`, followed
/// by live updates.
#[derive(Debug, Clone)]
pub enum StreamItem {
    Connected { at: DateTime<Utc> },
    InitialData(Vec<VehicleState>),
    VehicleUpdate(Arc<VehicleEvent>),
    ConnectionUpdate(ConnectionStatus),
    StatusUpdate(Arc<StatusReport>),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectedBody {
    connected_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct InitialDataBody<'a> {
    count: usize,
    vehicles: &'a [VehicleState],
}

#[derive(Serialize)]
struct ConnectionBody<'a> {
    connection: &'a ConnectionStatus,
}

impl StreamItem {
    /// Event name on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamItem::Connected { .. } => "connected",
            StreamItem::InitialData(_) => "initial_data",
            StreamItem::VehicleUpdate(_) => "vehicle_update",
            StreamItem::ConnectionUpdate(_) | StreamItem::StatusUpdate(_) => "status_update",
        }
    }

    /// JSON body for the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            StreamItem::Connected { at } => {
                serde_json::to_string(&ConnectedBody { connected_at: *at })
            }
            StreamItem::InitialData(vehicles) => serde_json::to_string(&InitialDataBody {
                count: vehicles.len(),
                vehicles,
            }),
            StreamItem::VehicleUpdate(event) => serde_json::to_string(&event.to_wire()),
            StreamItem::ConnectionUpdate(status) => {
                serde_json::to_string(&ConnectionBody { connection: status })
            }
            StreamItem::StatusUpdate(report) => serde_json::to_string(report.as_ref()),
        }
    }
}

/// Forwards hub events into a bounded channel.
///
/// A full channel means the client has fallen behind. The sink then
/// detaches, the client sees its stream end, and it reconnects for a fresh
/// snapshot.
pub struct StreamSink {
    tx: mpsc::Sender<StreamItem>,
}

impl Subscriber for StreamSink {
    fn name(&self) -> &str {
        "stream"
    }

    fn deliver(&self, event: &HubEvent) -> Result<(), SubscriberError> {
        let item = match event {
            HubEvent::Vehicle(e) => StreamItem::VehicleUpdate(Arc::clone(e)),
            HubEvent::Connection(status) => StreamItem::ConnectionUpdate(status.clone()),
            HubEvent::Status(report) => StreamItem::StatusUpdate(Arc::clone(report)),
        };
        self.tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(_) => {
                warn!("stream client fell behind, detaching");
                SubscriberError::Closed
            }
            TrySendError::Closed(_) => SubscriberError::Closed,
        })
    }
}

/// Receiving end of a stream subscription. Detaches from the hub on drop.
pub struct StreamSubscription {
    id: SubscriptionId,
    hub: Arc<EventHub>,
    rx: mpsc::Receiver<StreamItem>,
}

impl StreamSubscription {
    /// Attach a new stream to `hub`, seeded from `store`.
    ///
    /// `capacity` bounds how far the client may lag; it is raised to fit the
    /// two opening messages if smaller.
    pub fn attach(hub: &Arc<EventHub>, store: &VehicleStore, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(2));
        let opening = tx.clone();
        let sink = Arc::new(StreamSink { tx });

        let (id, ()) = hub.attach_with_snapshot(sink, || {
            // The channel is fresh and holds at least two, so these fit.
            let _ = opening.try_send(StreamItem::Connected { at: Utc::now() });
            let _ = opening.try_send(StreamItem::InitialData(store.list_all()));
        });

        Self {
            id,
            hub: Arc::clone(hub),
            rx,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next item, or `None` once the hub has detached this stream.
    pub async fn recv(&mut self) -> Option<StreamItem> {
        self.rx.recv().await
    }
}

impl Stream for StreamSubscription {
    type Item = StreamItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamItem>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for StreamSubscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}
