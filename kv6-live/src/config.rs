//! Process configuration from environment variables.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `KV6_ENDPOINT` | ZeroMQ endpoint | NDOV Loket public feed |
//! | `KV6_TOPIC` | Topic, e.g. `/ARR/KV6posinfo` | `/ARR/KV6posinfo` |
//! | `KV6_RECONNECT_SECS` | Delay before reconnecting | 5 |
//! | `KV6_IDLE_TIMEOUT_SECS` | Silence that counts as a lost connection | 90 |
//! | `KV6_EXPIRY_MINUTES` | Age at which a silent vehicle is dropped | 30 |
//! | `KV6_SWEEP_SECS` | Interval of the expiry sweep | 300 |
//! | `KV6_STATUS_SECS` | Interval of the status report | 30 |
//! | `KV6_BIND` | HTTP listen address | `127.0.0.1:3000` |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::{InvalidTopic, Topic};
use crate::feed::FeedConfig;
use crate::pipeline::PipelineConfig;

const DEFAULT_BIND: &str = "127.0.0.1:3000";

/// A variable that is set but unusable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: {source}")]
    Topic {
        var: &'static str,
        #[source]
        source: InvalidTopic,
    },

    #[error("{var}: expected {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Everything the binary needs to start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub bind: SocketAddr,
}

impl AppConfig {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read settings through `lookup`; unset or blank variables take their
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let mut feed = match get("KV6_TOPIC") {
            Some(raw) => FeedConfig::new(Topic::parse(raw.trim()).map_err(|source| {
                ConfigError::Topic {
                    var: "KV6_TOPIC",
                    source,
                }
            })?),
            None => FeedConfig::default(),
        };
        if let Some(endpoint) = get("KV6_ENDPOINT") {
            feed = feed.with_endpoint(endpoint.trim());
        }
        if let Some(secs) = parse::<u64>(&get, "KV6_RECONNECT_SECS", "whole seconds")? {
            feed = feed.with_reconnect_delay(Duration::from_secs(secs));
        }
        if let Some(secs) = positive(&get, "KV6_IDLE_TIMEOUT_SECS")? {
            feed = feed.with_idle_timeout(Duration::from_secs(secs));
        }

        let mut pipeline = PipelineConfig::new(feed);
        if let Some(minutes) = parse::<u32>(&get, "KV6_EXPIRY_MINUTES", "whole minutes")? {
            pipeline = pipeline.with_max_age(chrono::Duration::minutes(i64::from(minutes)));
        }
        if let Some(secs) = positive(&get, "KV6_SWEEP_SECS")? {
            pipeline = pipeline.with_sweep_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = positive(&get, "KV6_STATUS_SECS")? {
            pipeline = pipeline.with_status_interval(Duration::from_secs(secs));
        }

        let bind = match parse::<SocketAddr>(&get, "KV6_BIND", "a socket address")? {
            Some(addr) => addr,
            None => DEFAULT_BIND.parse().map_err(|_| ConfigError::Invalid {
                var: "KV6_BIND",
                expected: "a socket address",
                value: DEFAULT_BIND.to_string(),
            })?,
        };

        Ok(AppConfig { pipeline, bind })
    }
}

fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError> {
    get(var)
        .map(|value| {
            value.trim().parse().map_err(|_| ConfigError::Invalid {
                var,
                expected,
                value,
            })
        })
        .transpose()
}

/// Intervals must be non-zero; Tokio timers reject a zero period.
fn positive(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    const EXPECTED: &str = "a positive number of seconds";
    match parse::<u64>(get, var, EXPECTED)? {
        Some(0) => Err(ConfigError::Invalid {
            var,
            expected: EXPECTED,
            value: "0".to_string(),
        }),
        other => Ok(other),
    }
}
