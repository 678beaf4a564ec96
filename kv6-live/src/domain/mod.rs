//! Domain types for the KV6 live feed.
//!
//! Every type here enforces its invariants at construction time, so code
//! receiving them (the store, the distributor, the web layer) can trust
//! their validity.

mod event;
mod event_type;
mod occupancy;
mod operator;
mod topic;

pub use event::{EventWire, VehicleEvent};
pub use event_type::{EventType, UnknownEventType};
pub use occupancy::{InvalidOccupancy, Occupancy};
pub use operator::{InvalidOperatorCode, OperatorCode};
pub use topic::{InvalidTopic, KV6_POSINFO, Topic};
