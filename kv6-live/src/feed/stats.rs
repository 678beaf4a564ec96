//! Feed counters.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;

use crate::domain::OperatorCode;

/// How many error lines the ring keeps.
const RECENT_ERRORS: usize = 5;

/// Running counters for one feed connection.
#[derive(Debug, Default)]
pub struct FeedStats {
    frames_received: AtomicU64,
    frames_ignored: AtomicU64,
    frames_decoded: AtomicU64,
    frames_undecodable: AtomicU64,
    frames_invalid: AtomicU64,
    vehicle_events: AtomicU64,
    unknown_elements: AtomicU64,
    reconnects: AtomicU64,
    frames_by_operator: Mutex<BTreeMap<String, u64>>,
    recent_errors: Mutex<VecDeque<String>>,
}

/// Point-in-time copy of [`FeedStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatsSnapshot {
    pub frames_received: u64,
    pub frames_ignored: u64,
    pub frames_decoded: u64,
    pub frames_undecodable: u64,
    pub frames_invalid: u64,
    pub vehicle_events: u64,
    pub unknown_elements: u64,
    pub reconnects: u64,
    /// Keyed by operator name where known, else by code.
    pub frames_by_operator: BTreeMap<String, u64>,
    /// Oldest first.
    pub recent_errors: Vec<String>,
}

impl FeedStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// A frame on the subscribed topic, attributed to its operator.
    pub fn record_frame(&self, operator: &OperatorCode) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        let key = operator.name().unwrap_or(operator.as_str()).to_string();
        *self
            .frames_by_operator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default() += 1;
    }

    /// A frame on some other topic.
    pub fn record_ignored(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.frames_ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// A frame that decoded and parsed.
    pub fn record_decoded(&self, events: usize, unknown: usize) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
        self.vehicle_events.fetch_add(events as u64, Ordering::Relaxed);
        self.unknown_elements.fetch_add(unknown as u64, Ordering::Relaxed);
    }

    pub fn record_undecodable(&self) {
        self.frames_undecodable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid(&self, message: &str) {
        self.frames_invalid.fetch_add(1, Ordering::Relaxed);
        self.record_error(message);
    }

    pub fn record_reconnect(&self, reason: &str) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        self.record_error(reason);
    }

    /// Push a line onto the recent-errors ring, stamped with the UTC time.
    pub fn record_error(&self, message: &str) {
        let line = format!("[{}] {message}", Utc::now().format("%H:%M:%S"));
        let mut recent = self
            .recent_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if recent.len() == RECENT_ERRORS {
            recent.pop_front();
        }
        recent.push_back(line);
    }

    pub fn snapshot(&self) -> FeedStatsSnapshot {
        FeedStatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_ignored: self.frames_ignored.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_undecodable: self.frames_undecodable.load(Ordering::Relaxed),
            frames_invalid: self.frames_invalid.load(Ordering::Relaxed),
            vehicle_events: self.vehicle_events.load(Ordering::Relaxed),
            unknown_elements: self.unknown_elements.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            frames_by_operator: self
                .frames_by_operator
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            recent_errors: self
                .recent_errors
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .cloned()
                .collect(),
        }
    }
}
