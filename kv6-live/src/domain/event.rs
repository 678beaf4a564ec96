//! Normalized vehicle event.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::projection::{RdPoint, WgsPoint};

use super::event_type::EventType;
use super::occupancy::Occupancy;
use super::operator::OperatorCode;

/// One normalized report of a vehicle's position or lifecycle transition.
///
/// Events are immutable once built; the distributor shares them between
/// subscribers behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleEvent {
    pub operator: OperatorCode,
    pub event_type: EventType,
    pub journey_number: String,
    pub vehicle_number: String,
    pub line_number: String,
    pub timestamp: DateTime<Utc>,
    /// When the frame carrying this report arrived.
    pub received_at: DateTime<Utc>,
    pub stop_code: Option<String>,
    pub rd: Option<RdPoint>,
    pub position: Option<WgsPoint>,
    /// Seconds late (positive) or early (negative).
    pub punctuality: Option<i32>,
    pub occupancy: Option<Occupancy>,
}

impl VehicleEvent {
    /// Create an event carrying only the identifying fields, received at
    /// `timestamp`.
    pub fn new(
        operator: OperatorCode,
        event_type: EventType,
        vehicle_number: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            operator,
            event_type,
            journey_number: String::new(),
            vehicle_number: vehicle_number.into(),
            line_number: String::new(),
            timestamp,
            received_at: timestamp,
            stop_code: None,
            rd: None,
            position: None,
            punctuality: None,
            occupancy: None,
        }
    }

    /// The outward JSON shape of this event.
    pub fn to_wire(&self) -> EventWire<'_> {
        EventWire {
            operator: self.operator.as_str(),
            event_type: self.event_type,
            journey_number: &self.journey_number,
            vehicle_number: &self.vehicle_number,
            line_number: &self.line_number,
            timestamp: self.timestamp,
            stop_code: self.stop_code.as_deref(),
            latitude: self.position.map(|p| p.latitude),
            longitude: self.position.map(|p| p.longitude),
            punctuality: self.punctuality,
            occupancy: self.occupancy,
        }
    }
}

/// Serialized form consumed by the display and streaming sinks.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventWire<'a> {
    pub operator: &'a str,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub journey_number: &'a str,
    pub vehicle_number: &'a str,
    pub line_number: &'a str,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub punctuality: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupancy: Option<Occupancy>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> VehicleEvent {
        let ts = Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap();
        let mut event = VehicleEvent::new(
            OperatorCode::parse("ARR").unwrap(),
            EventType::Onstop,
            "4021",
            ts,
        );
        event.journey_number = "7012".into();
        event.line_number = "M300".into();
        event
    }

    #[test]
    fn wire_shape_minimal() {
        let json = serde_json::to_value(sample().to_wire()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "operator": "ARR",
                "type": "ONSTOP",
                "journeyNumber": "7012",
                "vehicleNumber": "4021",
                "lineNumber": "M300",
                "timestamp": "2024-03-15T10:00:00Z",
            })
        );
    }

    #[test]
    fn wire_shape_with_optionals() {
        let mut event = sample();
        event.stop_code = Some("30005024".into());
        event.position = Some(WgsPoint {
            latitude: 52.0,
            longitude: 5.0,
        });
        event.punctuality = Some(-42);
        event.occupancy = Some(Occupancy::new(2).unwrap());

        let json = serde_json::to_value(event.to_wire()).unwrap();
        assert_eq!(json["stopCode"], "30005024");
        assert_eq!(json["latitude"], 52.0);
        assert_eq!(json["longitude"], 5.0);
        assert_eq!(json["punctuality"], -42);
        assert_eq!(json["occupancy"], 2);
    }
}
