//! Conversion from KV6 XML to vehicle events.
//!
//! A KV6 message is a `KV6posinfo` element, optionally wrapped in a
//! `VV_TM_PUSH` envelope, whose children are the individual reports: one
//! element per report, named after its event type. Every recognized report
//! becomes exactly one event; fields that are missing or fail to parse are
//! left empty rather than dropping the report.

use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::domain::{EventType, Occupancy, OperatorCode, VehicleEvent};
use crate::projection::{RdPoint, rd_to_wgs84};

use super::error::ParseError;
use super::markup::Element;

const ENVELOPE: &str = "VV_TM_PUSH";
const POSINFO: &str = "KV6posinfo";

/// Context a frame carries into parsing.
#[derive(Debug, Clone)]
pub struct ParseContext {
    /// Operator from the topic, used when a report has no `dataownercode`.
    pub operator: OperatorCode,
    /// When the frame arrived, used when a report has no usable timestamp.
    pub received_at: DateTime<Utc>,
}

/// Events extracted from one message.
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    /// Events in document order.
    pub events: Vec<VehicleEvent>,
    /// Names of child elements that were not a known event type.
    pub ignored: Vec<String>,
}

/// Parse decoded KV6 text.
///
/// Blank input is an empty message, not an error.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use kv6_live::domain::{EventType, OperatorCode};
/// use kv6_live::kv6::{ParseContext, parse_message};
///
/// let ctx = ParseContext {
///     operator: OperatorCode::parse("ARR").unwrap(),
///     received_at: Utc::now(),
/// };
/// let xml = "<KV6posinfo><ARRIVAL><vehiclenumber>4021</vehiclenumber></ARRIVAL></KV6posinfo>";
/// let parsed = parse_message(xml, &ctx).unwrap();
/// assert_eq!(parsed.events.len(), 1);
/// assert_eq!(parsed.events[0].event_type, EventType::Arrival);
/// ```
pub fn parse_message(text: &str, ctx: &ParseContext) -> Result<ParsedMessage, ParseError> {
    let text = text.trim_start_matches('\u{feff}').trim();
    if text.is_empty() {
        return Ok(ParsedMessage::default());
    }

    let root = Element::parse_document(text)?;
    let posinfos: Vec<&Element> = match root.name.as_str() {
        ENVELOPE => root.children_named(POSINFO).collect(),
        POSINFO => vec![&root],
        other => return Err(ParseError::UnexpectedRoot(other.to_string())),
    };

    let mut parsed = ParsedMessage::default();
    for posinfo in posinfos {
        for report in &posinfo.children {
            match EventType::from_tag(&report.name) {
                Some(event_type) => parsed.events.push(convert_report(report, event_type, ctx)),
                None => parsed.ignored.push(report.name.clone()),
            }
        }
    }

    Ok(parsed)
}

/// Convert a single report element.
fn convert_report(report: &Element, event_type: EventType, ctx: &ParseContext) -> VehicleEvent {
    let text = |name: &str| report.child_text(name).map(str::to_string);

    let operator = report
        .child_text("dataownercode")
        .and_then(|code| OperatorCode::parse_normalized(code).ok())
        .unwrap_or_else(|| ctx.operator.clone());

    let timestamp = report
        .child_text("timestamp")
        .and_then(parse_timestamp)
        .unwrap_or(ctx.received_at);

    let coordinate = |name: &str| number::<f64>(report, name).filter(|v| v.is_finite());
    let rd = match (coordinate("rd_x"), coordinate("rd_y")) {
        (Some(x), Some(y)) => Some(RdPoint::new(x, y)),
        _ => None,
    };
    let position = rd.and_then(|p| rd_to_wgs84(p).ok());

    VehicleEvent {
        operator,
        event_type,
        journey_number: text("journeynumber").unwrap_or_default(),
        vehicle_number: text("vehiclenumber").unwrap_or_default(),
        line_number: text("lineplanningnumber").unwrap_or_default(),
        timestamp,
        received_at: ctx.received_at,
        stop_code: text("userstopcode"),
        rd,
        position,
        punctuality: punctuality(report),
        occupancy: number::<i64>(report, "occupancy").and_then(|o| Occupancy::new(o).ok()),
    }
}

/// Numeric child value; anything that fails to parse is absent.
fn number<T: FromStr>(report: &Element, name: &str) -> Option<T> {
    report.child_text(name)?.parse().ok()
}

/// Punctuality is whole seconds, but tolerate a decimal form.
fn punctuality(report: &Element) -> Option<i32> {
    number::<i32>(report, "punctuality").or_else(|| {
        let secs = number::<f64>(report, "punctuality")?.round();
        (secs.is_finite() && secs.abs() <= f64::from(i32::MAX)).then_some(secs as i32)
    })
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
