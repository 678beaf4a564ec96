//! Wiring of the connector, hub and store, plus the periodic jobs.
//!
//! A [`Pipeline`] owns one of each component. The store is attached to the
//! hub first, so every event reaches it before any streaming client. Two
//! background jobs run alongside the connector: the expiry sweep, which
//! drops vehicles that have gone quiet, and the status tick, which publishes
//! a [`StatusReport`] on the hub at a fixed interval.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::feed::{
    ConnectionStatus, FeedConfig, FeedConnector, FeedStats, FeedStatsSnapshot, Transport,
};
use crate::hub::{EventHub, HubEvent, StreamSubscription};
use crate::store::{StatusCounts, VehicleStore};

const DEFAULT_MAX_AGE_MINUTES: i64 = 30;
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_STREAM_CAPACITY: usize = 256;

/// Pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub feed: FeedConfig,
    /// Vehicles silent for longer than this are dropped
    pub max_age: chrono::Duration,
    /// How often to look for silent vehicles
    pub sweep_interval: Duration,
    /// How often to publish a status report
    pub status_interval: Duration,
    /// Items a streaming client may fall behind by before it is cut off
    pub stream_capacity: usize,
}

impl PipelineConfig {
    pub fn new(feed: FeedConfig) -> Self {
        Self {
            feed,
            max_age: chrono::Duration::minutes(DEFAULT_MAX_AGE_MINUTES),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            status_interval: DEFAULT_STATUS_INTERVAL,
            stream_capacity: DEFAULT_STREAM_CAPACITY,
        }
    }

    pub fn with_max_age(mut self, max_age: chrono::Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    pub fn with_stream_capacity(mut self, capacity: usize) -> Self {
        self.stream_capacity = capacity;
        self
    }
}

/// Snapshot of the whole pipeline, published periodically and served on
/// the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub endpoint: String,
    pub topic: String,
    pub connection: ConnectionStatus,
    pub vehicles: StatusCounts,
    pub feed: FeedStatsSnapshot,
    pub subscribers: usize,
}

/// Cheap, cloneable access to a running pipeline, for request handlers.
#[derive(Clone)]
pub struct PipelineHandle {
    store: Arc<VehicleStore>,
    hub: Arc<EventHub>,
    stats: Arc<FeedStats>,
    connection: watch::Receiver<ConnectionStatus>,
    endpoint: String,
    topic: String,
    stream_capacity: usize,
}

impl PipelineHandle {
    pub fn store(&self) -> &VehicleStore {
        &self.store
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.borrow().clone()
    }

    pub fn status_report(&self) -> StatusReport {
        StatusReport {
            generated_at: Utc::now(),
            endpoint: self.endpoint.clone(),
            topic: self.topic.clone(),
            connection: self.connection_status(),
            vehicles: self.store.status_counts(),
            feed: self.stats.snapshot(),
            subscribers: self.hub.subscriber_count(),
        }
    }

    /// Open a client stream: `connected`, the current vehicles, then live
    /// updates.
    pub fn attach_stream(&self) -> StreamSubscription {
        StreamSubscription::attach(&self.hub, &self.store, self.stream_capacity)
    }
}

/// Owns the components of one feed and the jobs that run beside it.
pub struct Pipeline<T: Transport> {
    handle: PipelineHandle,
    connector: FeedConnector<T>,
    max_age: chrono::Duration,
    sweep_interval: Duration,
    status_interval: Duration,
    cancel: CancellationToken,
    jobs: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Transport> Pipeline<T> {
    pub fn new(transport: T, config: PipelineConfig) -> Self {
        let hub = Arc::new(EventHub::new());
        let store = Arc::new(VehicleStore::new());
        hub.subscribe(store.clone());
        let stats = Arc::new(FeedStats::new());

        let endpoint = config.feed.endpoint.clone();
        let topic = config.feed.topic.as_str().to_string();
        let connector =
            FeedConnector::new(transport, config.feed, Arc::clone(&hub), Arc::clone(&stats));

        Self {
            handle: PipelineHandle {
                store,
                hub,
                stats,
                connection: connector.watch_status(),
                endpoint,
                topic,
                stream_capacity: config.stream_capacity,
            },
            connector,
            max_age: config.max_age,
            sweep_interval: config.sweep_interval,
            status_interval: config.status_interval,
            cancel: CancellationToken::new(),
            jobs: Mutex::new(Vec::new()),
        }
    }

    /// Connect the feed and start the periodic jobs. Calling it again while
    /// running does nothing; a pipeline that has been shut down stays down.
    pub fn start(&self) {
        if self.cancel.is_cancelled() {
            warn!("pipeline already shut down, not starting");
            return;
        }

        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        if !jobs.is_empty() {
            return;
        }

        self.connector.connect();
        jobs.push(tokio::spawn(sweep_expired(
            Arc::clone(&self.handle.store),
            self.sweep_interval,
            self.max_age,
            self.cancel.clone(),
        )));
        jobs.push(tokio::spawn(publish_status(
            self.handle.clone(),
            self.status_interval,
            self.cancel.clone(),
        )));
        info!(topic = %self.handle.topic, "pipeline started");
    }

    /// Disconnect the feed and stop the periodic jobs, waiting for all of
    /// them to finish.
    pub async fn shutdown(&self) {
        self.connector.disconnect().await;
        self.cancel.cancel();

        let jobs: Vec<_> = self
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for job in jobs {
            if let Err(e) = job.await {
                warn!(error = %e, "pipeline job ended abnormally");
            }
        }
        info!("pipeline stopped");
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    pub fn store(&self) -> &Arc<VehicleStore> {
        &self.handle.store
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.handle.hub
    }

    pub fn stats(&self) -> &Arc<FeedStats> {
        &self.handle.stats
    }

    pub fn connector(&self) -> &FeedConnector<T> {
        &self.connector
    }
}

async fn sweep_expired(
    store: Arc<VehicleStore>,
    every: Duration,
    max_age: chrono::Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let removed = store.expire(max_age);
                if removed > 0 {
                    info!(removed, remaining = store.len(), "expired silent vehicles");
                }
            }
        }
    }
}

async fn publish_status(handle: PipelineHandle, every: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let report = handle.status_report();
                debug!(
                    vehicles = report.vehicles.total,
                    active = report.vehicles.active,
                    connection = %report.connection,
                    "status"
                );
                handle.hub.publish(HubEvent::Status(Arc::new(report)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventType, OperatorCode, Topic, VehicleEvent};
    use crate::feed::RawFrame;
    use crate::feed::mock::{LiveFeed, MockTransport};
    use crate::hub::StreamItem;

    const TOPIC: &str = "/ARR/KV6posinfo";

    fn config() -> PipelineConfig {
        PipelineConfig::new(
            FeedConfig::new(Topic::parse(TOPIC).unwrap())
                .with_endpoint("tcp://mock:1")
                .with_reconnect_delay(Duration::from_millis(10)),
        )
    }

    fn frame(vehicle: &str, timestamp: &str) -> RawFrame {
        RawFrame::new(
            TOPIC,
            format!(
                "<KV6posinfo><ONROUTE><vehiclenumber>{vehicle}</vehiclenumber>\
                 <lineplanningnumber>M300</lineplanningnumber>\
                 <timestamp>{timestamp}</timestamp>\
                 <rd-x>121000</rd-x><rd-y>487000</rd-y></ONROUTE></KV6posinfo>"
            ),
        )
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    /// Next stream item of the given kind, skipping others.
    async fn next_of_kind(stream: &mut StreamSubscription, kind: &str) -> StreamItem {
        let wait = async {
            loop {
                let item = stream.recv().await.expect("stream ended");
                if item.kind() == kind {
                    return item;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(2), wait)
            .await
            .expect("timed out waiting for stream item")
    }

    #[tokio::test]
    async fn frames_flow_to_store_and_streams() {
        let (script, feed) = LiveFeed::pair();
        let pipeline = Pipeline::new(MockTransport::new([script]), config());
        let mut stream = pipeline.handle().attach_stream();
        pipeline.start();

        assert_eq!(stream.recv().await.unwrap().kind(), "connected");
        assert_eq!(stream.recv().await.unwrap().kind(), "initial_data");

        let now = Utc::now().to_rfc3339();
        feed.send(frame("4021", &now));

        match next_of_kind(&mut stream, "vehicle_update").await {
            StreamItem::VehicleUpdate(event) => {
                assert_eq!(event.vehicle_number, "4021");
                let position = event.position.unwrap();
                assert!((position.latitude - 52.3698).abs() < 1e-3);
            }
            other => panic!("unexpected {other:?}"),
        }

        let state = pipeline.store().get("4021").unwrap();
        assert_eq!(state.line_number.as_deref(), Some("M300"));
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn silent_vehicles_expire() {
        let (script, feed) = LiveFeed::pair();
        let pipeline = Pipeline::new(
            MockTransport::new([script]),
            config()
                .with_max_age(chrono::Duration::minutes(30))
                .with_sweep_interval(Duration::from_millis(10)),
        );
        pipeline.start();

        let old = VehicleEvent::new(
            OperatorCode::arriva(),
            EventType::Onroute,
            "old",
            Utc::now() - chrono::Duration::hours(2),
        );
        pipeline.hub().publish(HubEvent::Vehicle(Arc::new(old)));
        // Reported long ago but just received, so it stays.
        feed.send(frame("new", "2020-01-01T00:00:00Z"));

        eventually(|| pipeline.store().get("new").is_some()).await;
        eventually(|| pipeline.store().get("old").is_none()).await;
        assert_eq!(pipeline.store().len(), 1);
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn status_is_published_periodically() {
        let (script, _feed) = LiveFeed::pair();
        let pipeline = Pipeline::new(
            MockTransport::new([script]),
            config().with_status_interval(Duration::from_millis(10)),
        );
        let mut stream = pipeline.handle().attach_stream();
        pipeline.start();

        // Skip connection updates until a full report arrives.
        let report = loop {
            let item = next_of_kind(&mut stream, "status_update").await;
            if let StreamItem::StatusUpdate(report) = item {
                break report;
            }
        };
        assert_eq!(report.topic, TOPIC);
        assert_eq!(report.endpoint, "tcp://mock:1");
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_everything() {
        let (script, _feed) = LiveFeed::pair();
        let pipeline = Pipeline::new(MockTransport::new([script]), config());
        pipeline.start();
        pipeline.start();
        eventually(|| pipeline.handle().connection_status().is_connected()).await;

        pipeline.shutdown().await;
        assert_eq!(pipeline.handle().connection_status(), ConnectionStatus::Stopped);
        assert!(!pipeline.connector().is_running());
        assert!(pipeline.jobs.lock().unwrap().is_empty());

        // Stays down
        pipeline.start();
        assert!(!pipeline.connector().is_running());
        pipeline.shutdown().await;
    }

    #[test]
    fn status_report_shape() {
        let pipeline = Pipeline::new(MockTransport::default(), config());
        let report = pipeline.handle().status_report();
        assert_eq!(report.connection, ConnectionStatus::Stopped);
        assert_eq!(report.vehicles.total, 0);
        // The store is always attached
        assert_eq!(report.subscribers, 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["connection"]["state"], "stopped");
        assert_eq!(json["vehicles"]["total"], 0);
        assert_eq!(json["feed"]["framesReceived"], 0);
    }
}
