//! Live KV6 vehicle feed.
//!
//! Subscribes to a Dutch public transport position feed (KV6 over ZeroMQ),
//! turns its messages into vehicle events, keeps the latest state of every
//! vehicle and serves it over HTTP, including a live event stream.

pub mod config;
pub mod domain;
pub mod feed;
pub mod hub;
pub mod kv6;
pub mod pipeline;
pub mod projection;
pub mod store;
pub mod web;
