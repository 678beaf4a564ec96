//! KV6 message handling.
//!
//! KV6 is the Dutch interface for vehicle position and punctuality
//! reports. Frames arrive as opaque bytes; this module turns them into
//! [`VehicleEvent`](crate::domain::VehicleEvent)s in two stages:
//!
//! - [`decode_payload`] finds the XML text, whatever the compression or
//!   encoding
//! - [`parse_message`] turns the XML into events, tolerating an optional
//!   envelope, unknown report types and unparsable fields
//!
//! [`process_frame`] runs both. None of this logs; callers decide what a
//! failure means.

mod decode;
mod error;
mod frame;
mod markup;
mod parse;

pub use decode::{Compression, DecodedPayload, MARKERS, TextMethod, decode_payload};
pub use error::ParseError;
pub use frame::{FrameError, ProcessedFrame, process_frame};
pub use markup::{Element, normalize_name};
pub use parse::{ParseContext, ParsedMessage, parse_message};
