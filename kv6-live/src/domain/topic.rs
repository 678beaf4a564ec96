//! Pub/sub topic type.

use std::fmt;

use super::operator::OperatorCode;

/// Error returned when parsing an invalid topic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid topic {topic:?}: {reason}")]
pub struct InvalidTopic {
    topic: String,
    reason: &'static str,
}

/// Message family carrying vehicle positions.
pub const KV6_POSINFO: &str = "KV6posinfo";

/// A feed topic of the form `/<OPERATOR_CODE>/<MESSAGE_FAMILY>`.
///
/// The publisher filters by prefix, so the connector compares received
/// topics against [`Topic::as_str`] exactly.
///
/// # Examples
///
/// ```
/// use kv6_live::domain::Topic;
///
/// let topic = Topic::parse("/ARR/KV6posinfo").unwrap();
/// assert_eq!(topic.operator().as_str(), "ARR");
/// assert_eq!(topic.family(), "KV6posinfo");
///
/// assert!(Topic::parse("ARR/KV6posinfo").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    raw: String,
    operator: OperatorCode,
}

impl Topic {
    /// Parse a topic string.
    pub fn parse(s: &str) -> Result<Self, InvalidTopic> {
        let invalid = |reason| InvalidTopic {
            topic: s.to_string(),
            reason,
        };

        let rest = s
            .strip_prefix('/')
            .ok_or_else(|| invalid("must start with '/'"))?;
        let (operator, family) = rest
            .split_once('/')
            .ok_or_else(|| invalid("must have the form /<OPERATOR>/<FAMILY>"))?;

        let operator =
            OperatorCode::parse(operator).map_err(|_| invalid("operator code is not valid"))?;

        if family.is_empty() {
            return Err(invalid("message family must not be empty"));
        }
        if family.contains('/') || family.chars().any(char::is_whitespace) {
            return Err(invalid("message family must be a single path segment"));
        }

        Ok(Topic {
            raw: s.to_string(),
            operator,
        })
    }

    /// Build the topic for an operator and message family.
    pub fn for_operator(operator: &OperatorCode, family: &str) -> Result<Self, InvalidTopic> {
        Self::parse(&format!("/{}/{}", operator.as_str(), family))
    }

    /// Vehicle position topic for an operator.
    pub fn kv6_posinfo(operator: &OperatorCode) -> Self {
        Topic {
            raw: format!("/{}/{}", operator.as_str(), KV6_POSINFO),
            operator: operator.clone(),
        }
    }

    /// Returns the full topic string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The operator segment.
    pub fn operator(&self) -> &OperatorCode {
        &self.operator
    }

    /// The message family segment.
    pub fn family(&self) -> &str {
        // Parsing guarantees exactly "/<op>/<family>"
        &self.raw[self.operator.as_str().len() + 2..]
    }

    /// True if a received topic, as bytes, is exactly this topic.
    pub fn matches(&self, received: &[u8]) -> bool {
        received == self.raw.as_bytes()
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({})", self.raw)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_topics() {
        let topic = Topic::parse("/ARR/KV6posinfo").unwrap();
        assert_eq!(topic.as_str(), "/ARR/KV6posinfo");
        assert_eq!(topic.operator().as_str(), "ARR");
        assert_eq!(topic.family(), "KV6posinfo");

        let topic = Topic::parse("/QBUZZ/KV17cvlinfo").unwrap();
        assert_eq!(topic.operator().as_str(), "QBUZZ");
        assert_eq!(topic.family(), "KV17cvlinfo");
    }

    #[test]
    fn reject_malformed() {
        assert!(Topic::parse("").is_err());
        assert!(Topic::parse("/").is_err());
        assert!(Topic::parse("ARR/KV6posinfo").is_err());
        assert!(Topic::parse("/ARR").is_err());
        assert!(Topic::parse("/ARR/").is_err());
        assert!(Topic::parse("/arr/KV6posinfo").is_err());
        assert!(Topic::parse("/ARR/KV6/posinfo").is_err());
        assert!(Topic::parse("/ARR/KV6 posinfo").is_err());
    }

    #[test]
    fn error_mentions_topic() {
        let err = Topic::parse("ARR").unwrap_err();
        assert!(err.to_string().contains("\"ARR\""));
        assert!(err.to_string().contains("must start with '/'"));
    }

    #[test]
    fn kv6_posinfo_for_operator() {
        let op = OperatorCode::parse("CXX").unwrap();
        let topic = Topic::kv6_posinfo(&op);
        assert_eq!(topic.as_str(), "/CXX/KV6posinfo");
        assert_eq!(topic, Topic::parse("/CXX/KV6posinfo").unwrap());
    }

    #[test]
    fn for_operator_validates_family() {
        let op = OperatorCode::parse("GVB").unwrap();
        assert!(Topic::for_operator(&op, "KV15messages").is_ok());
        assert!(Topic::for_operator(&op, "").is_err());
    }

    #[test]
    fn matches_is_exact() {
        let topic = Topic::parse("/ARR/KV6posinfo").unwrap();
        assert!(topic.matches(b"/ARR/KV6posinfo"));
        assert!(!topic.matches(b"/ARR/KV6posinfoX"));
        assert!(!topic.matches(b"/ARR/KV6"));
        assert!(!topic.matches(b"/CXX/KV6posinfo"));
    }
}
