//! KV6 event type.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Error returned for a tag name outside the known event set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

/// The kind of report a vehicle sent.
///
/// This is a closed set: KV6 elements with any other tag name are ignored by
/// the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Arrival,
    Departure,
    Onroute,
    Onstop,
    Init,
    End,
    Delay,
    Offroute,
    Cancel,
}

impl EventType {
    /// Every event type, in canonical order.
    pub const ALL: [EventType; 9] = [
        EventType::Arrival,
        EventType::Departure,
        EventType::Onroute,
        EventType::Onstop,
        EventType::Init,
        EventType::End,
        EventType::Delay,
        EventType::Offroute,
        EventType::Cancel,
    ];

    /// The tag name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Arrival => "ARRIVAL",
            EventType::Departure => "DEPARTURE",
            EventType::Onroute => "ONROUTE",
            EventType::Onstop => "ONSTOP",
            EventType::Init => "INIT",
            EventType::End => "END",
            EventType::Delay => "DELAY",
            EventType::Offroute => "OFFROUTE",
            EventType::Cancel => "CANCEL",
        }
    }

    /// Match a tag name exactly (KV6 tags are upper-case).
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }

    /// Whether a vehicle reporting this status is in active service.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            EventType::Arrival | EventType::Departure | EventType::Onroute | EventType::Onstop
        )
    }

    /// Whether this status closes a journey.
    pub fn is_finish(self) -> bool {
        matches!(self, EventType::End | EventType::Cancel)
    }
}

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
