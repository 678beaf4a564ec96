//! Latest known state per vehicle.
//!
//! The store folds the event stream into one [`VehicleState`] per vehicle
//! number. Fields that an event leaves out keep their previous value, so a
//! `DEPARTURE` without a stop code does not erase the stop the vehicle was
//! last seen at.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::domain::{EventType, Occupancy, OperatorCode, VehicleEvent};
use crate::hub::{HubEvent, Subscriber, SubscriberError};
use crate::projection::{RdPoint, WgsPoint};

/// The merged view of one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleState {
    pub vehicle_number: String,
    pub operator: OperatorCode,
    pub line_number: Option<String>,
    pub journey_number: Option<String>,
    /// Type of the most recent event.
    pub status: EventType,
    /// Timestamp of the most recent event.
    pub last_updated: DateTime<Utc>,
    /// When the most recent event arrived. Expiry is measured from here.
    pub last_seen: DateTime<Utc>,
    pub stop_code: Option<String>,
    pub rd: Option<RdPoint>,
    #[serde(flatten)]
    pub position: Option<WgsPoint>,
    pub punctuality: Option<i32>,
    pub occupancy: Option<Occupancy>,
    /// When the vehicle last reported `INIT`.
    pub initialized_at: Option<DateTime<Utc>>,
    /// When the vehicle last reported `END` or `CANCEL`.
    pub finished_at: Option<DateTime<Utc>>,
    pub finish_reason: Option<EventType>,
}

impl VehicleState {
    fn from_event(event: &VehicleEvent) -> Self {
        let mut state = VehicleState {
            vehicle_number: event.vehicle_number.clone(),
            operator: event.operator.clone(),
            line_number: None,
            journey_number: None,
            status: event.event_type,
            last_updated: event.timestamp,
            last_seen: event.received_at,
            stop_code: None,
            rd: None,
            position: None,
            punctuality: None,
            occupancy: None,
            initialized_at: None,
            finished_at: None,
            finish_reason: None,
        };
        state.apply(event);
        state
    }

    fn apply(&mut self, event: &VehicleEvent) {
        self.operator = event.operator.clone();
        self.status = event.event_type;
        self.last_updated = event.timestamp;
        self.last_seen = event.received_at;

        if !event.line_number.is_empty() {
            self.line_number = Some(event.line_number.clone());
        }
        if !event.journey_number.is_empty() {
            self.journey_number = Some(event.journey_number.clone());
        }
        if let Some(stop) = &event.stop_code {
            self.stop_code = Some(stop.clone());
        }
        if event.rd.is_some() {
            self.rd = event.rd;
        }
        if event.position.is_some() {
            self.position = event.position;
        }
        if event.punctuality.is_some() {
            self.punctuality = event.punctuality;
        }
        if event.occupancy.is_some() {
            self.occupancy = event.occupancy;
        }

        if event.event_type == EventType::Init {
            self.initialized_at = Some(event.timestamp);
        } else if event.event_type.is_finish() {
            self.finished_at = Some(event.timestamp);
            self.finish_reason = Some(event.event_type);
        }
    }

    /// Whether the last report says the vehicle is out on a route.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Criteria for [`VehicleStore::list_filtered`]. Empty criteria match
/// everything.
#[derive(Debug, Clone, Default)]
pub struct VehicleFilter {
    pub line: Option<String>,
    pub operator: Option<OperatorCode>,
    pub limit: Option<usize>,
}

impl VehicleFilter {
    fn matches(&self, state: &VehicleState) -> bool {
        let line_ok = self
            .line
            .as_deref()
            .is_none_or(|line| state.line_number.as_deref() == Some(line));
        let operator_ok = self
            .operator
            .as_ref()
            .is_none_or(|op| &state.operator == op);
        line_ok && operator_ok
    }
}

/// Aggregate counts over the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub total: usize,
    /// Vehicles whose last event was one of the on-route types.
    pub active: usize,
    pub by_status: BTreeMap<EventType, usize>,
}

/// Thread-safe map from vehicle number to its latest state.
///
/// Readers get copies; nothing outside the store holds a reference into it.
#[derive(Debug, Default)]
pub struct VehicleStore {
    vehicles: RwLock<HashMap<String, VehicleState>>,
}

impl VehicleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an event into the vehicle's state, creating it if needed.
    ///
    /// Returns `false` and leaves the store untouched when the event carries
    /// no vehicle number.
    pub fn update(&self, event: &VehicleEvent) -> bool {
        if event.vehicle_number.is_empty() {
            return false;
        }

        let mut vehicles = self
            .vehicles
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match vehicles.get_mut(&event.vehicle_number) {
            Some(state) => state.apply(event),
            None => {
                vehicles.insert(
                    event.vehicle_number.clone(),
                    VehicleState::from_event(event),
                );
            }
        }
        true
    }

    /// A copy of one vehicle's state.
    pub fn get(&self, vehicle_number: &str) -> Option<VehicleState> {
        self.vehicles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(vehicle_number)
            .cloned()
    }

    /// Every vehicle, ordered by vehicle number.
    pub fn list_all(&self) -> Vec<VehicleState> {
        self.list_filtered(&VehicleFilter::default())
    }

    /// Vehicles matching `filter`, ordered by vehicle number and truncated to
    /// the filter's limit.
    pub fn list_filtered(&self, filter: &VehicleFilter) -> Vec<VehicleState> {
        let mut matching: Vec<VehicleState> = self
            .vehicles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|state| filter.matches(state))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.vehicle_number.cmp(&b.vehicle_number));
        if let Some(limit) = filter.limit {
            matching.truncate(limit);
        }
        matching
    }

    pub fn status_counts(&self) -> StatusCounts {
        let vehicles = self
            .vehicles
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let mut counts = StatusCounts {
            total: vehicles.len(),
            ..StatusCounts::default()
        };
        for state in vehicles.values() {
            if state.is_active() {
                counts.active += 1;
            }
            *counts.by_status.entry(state.status).or_default() += 1;
        }
        counts
    }

    /// Drop vehicles not heard from in more than `max_age`, measured from
    /// the current time. Returns the number removed.
    pub fn expire(&self, max_age: Duration) -> usize {
        self.expire_at(Utc::now(), max_age)
    }

    /// Drop vehicles last seen more than `max_age` before `now`.
    ///
    /// Age runs from arrival, not from the reported timestamp, so a vehicle
    /// with a clock running ahead still ages out.
    pub fn expire_at(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let mut vehicles = self
            .vehicles
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = vehicles.len();
        vehicles.retain(|_, state| now - state.last_seen <= max_age);
        before - vehicles.len()
    }

    pub fn len(&self) -> usize {
        self.vehicles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Subscriber for VehicleStore {
    fn name(&self) -> &str {
        "vehicle-store"
    }

    fn deliver(&self, event: &HubEvent) -> Result<(), SubscriberError> {
        if let HubEvent::Vehicle(event) = event {
            self.update(event);
        }
        Ok(())
    }
}
