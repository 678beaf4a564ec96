//! Fan-out of events to independent subscribers.
//!
//! The hub delivers every event to every attached [`Subscriber`] in
//! registration order. A subscriber that fails or panics is logged and
//! skipped; the others still receive the event. A subscriber reporting
//! [`SubscriberError::Closed`] is detached.
//!
//! Delivery is serialized by a gate that [`EventHub::attach_with_snapshot`]
//! also takes, so a newly attached subscriber sees a snapshot and then
//! exactly the events published after it.

mod sink;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, warn};

use crate::domain::VehicleEvent;
use crate::feed::ConnectionStatus;
use crate::pipeline::StatusReport;

pub use sink::{StreamItem, StreamSink, StreamSubscription};

/// Everything that flows through the hub.
#[derive(Debug, Clone)]
pub enum HubEvent {
    Vehicle(Arc<VehicleEvent>),
    Connection(ConnectionStatus),
    Status(Arc<StatusReport>),
}

/// Why a subscriber could not take an event.
#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    /// The subscriber has gone away and should be detached
    #[error("subscriber closed")]
    Closed,

    #[error("{0}")]
    Failed(String),
}

/// A consumer of hub events.
///
/// `deliver` runs on the publishing thread while the delivery gate is held.
/// It must not block for long. It may subscribe or unsubscribe, but must not
/// publish or attach with a snapshot.
pub trait Subscriber: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn deliver(&self, event: &HubEvent) -> Result<(), SubscriberError>;
}

/// Handle returned on attach, used to detach again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registration {
    id: SubscriptionId,
    subscriber: Arc<dyn Subscriber>,
}

#[derive(Default)]
pub struct EventHub {
    subscribers: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
    delivery: Mutex<()>,
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a subscriber. It receives events published from now on.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(subscriber = subscriber.name(), "subscriber attached");
        self.lock_subscribers()
            .push(Registration { id, subscriber });
        id
    }

    /// Attach a subscriber after taking a snapshot, with no event published
    /// in between.
    ///
    /// Every event is then either reflected in the snapshot or delivered to
    /// the subscriber, never both and never neither. Must not be called from
    /// inside [`Subscriber::deliver`].
    pub fn attach_with_snapshot<T>(
        &self,
        subscriber: Arc<dyn Subscriber>,
        snapshot: impl FnOnce() -> T,
    ) -> (SubscriptionId, T) {
        let _gate = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        let taken = snapshot();
        (self.subscribe(subscriber), taken)
    }

    /// Detach a subscriber. Returns whether it was attached.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock_subscribers();
        let before = subscribers.len();
        subscribers.retain(|r| r.id != id);
        subscribers.len() != before
    }

    /// Detach every subscriber. Open client streams end once they drain.
    pub fn detach_all(&self) -> usize {
        let detached = std::mem::take(&mut *self.lock_subscribers());
        detached.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    /// Deliver an event to every subscriber. Returns how many took it.
    pub fn publish(&self, event: HubEvent) -> usize {
        let _gate = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);

        // Deliver from a copy so subscribers may attach or detach meanwhile.
        let targets: Vec<(SubscriptionId, Arc<dyn Subscriber>)> = self
            .lock_subscribers()
            .iter()
            .map(|r| (r.id, Arc::clone(&r.subscriber)))
            .collect();

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, subscriber) in targets {
            match catch_unwind(AssertUnwindSafe(|| subscriber.deliver(&event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(SubscriberError::Closed)) => closed.push(id),
                Ok(Err(e)) => {
                    warn!(subscriber = subscriber.name(), error = %e, "delivery failed");
                }
                Err(_) => {
                    error!(subscriber = subscriber.name(), "subscriber panicked during delivery");
                }
            }
        }

        if !closed.is_empty() {
            self.lock_subscribers().retain(|r| !closed.contains(&r.id));
            debug!(count = closed.len(), "detached closed subscribers");
        }
        delivered
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<Registration>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
