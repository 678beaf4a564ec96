//! Transit operator (data owner) code type.

use std::fmt;

use serde::{Serialize, Serializer};

/// Error returned when parsing an invalid operator code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid operator code: {reason}")]
pub struct InvalidOperatorCode {
    reason: &'static str,
}

/// Longest operator code we accept. Real codes are 2-5 characters.
const MAX_LEN: usize = 12;

/// Known NDOV data owners and their friendly names.
const KNOWN_OPERATORS: &[(&str, &str)] = &[
    ("ARR", "arriva"),
    ("CXX", "connexxion"),
    ("GVB", "gvb"),
    ("HTM", "htm"),
    ("NS", "ns"),
    ("RET", "ret"),
    ("SYN", "syntus"),
    ("VTN", "veolia"),
    ("QBUZZ", "qbuzz"),
];

/// A KV6 data owner code, such as `ARR` for Arriva or `QBUZZ` for Qbuzz.
///
/// Operator codes appear both in the feed topic (`/ARR/KV6posinfo`) and in
/// the `dataownercode` element of each message. They are non-empty upper-case
/// ASCII alphanumerics.
///
/// # Examples
///
/// ```
/// use kv6_live::domain::OperatorCode;
///
/// let arr = OperatorCode::parse("ARR").unwrap();
/// assert_eq!(arr.as_str(), "ARR");
/// assert_eq!(arr.name(), Some("arriva"));
///
/// // Lowercase is rejected
/// assert!(OperatorCode::parse("arr").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperatorCode(String);

impl OperatorCode {
    /// Parse an operator code from a string.
    pub fn parse(s: &str) -> Result<Self, InvalidOperatorCode> {
        if s.is_empty() {
            return Err(InvalidOperatorCode {
                reason: "must not be empty",
            });
        }

        if s.len() > MAX_LEN {
            return Err(InvalidOperatorCode {
                reason: "too long",
            });
        }

        if !s
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        {
            return Err(InvalidOperatorCode {
                reason: "must be uppercase ASCII letters or digits",
            });
        }

        Ok(OperatorCode(s.to_string()))
    }

    /// Parse leniently: trims whitespace and uppercases first.
    ///
    /// `dataownercode` values in the wild are occasionally lower-case.
    pub fn parse_normalized(s: &str) -> Result<Self, InvalidOperatorCode> {
        Self::parse(&s.trim().to_ascii_uppercase())
    }

    /// Arriva, whose feed is used when nothing else is configured.
    pub fn arriva() -> Self {
        OperatorCode("ARR".to_string())
    }

    /// Look up an operator code by its friendly name (e.g. "arriva").
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        KNOWN_OPERATORS
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(code, _)| OperatorCode((*code).to_string()))
    }

    /// Returns the operator code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Friendly name of the operator, if it is one we know.
    pub fn name(&self) -> Option<&'static str> {
        KNOWN_OPERATORS
            .iter()
            .find(|(code, _)| *code == self.0)
            .map(|(_, name)| *name)
    }
}

impl fmt::Debug for OperatorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperatorCode({})", self.0)
    }
}

impl fmt::Display for OperatorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for OperatorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_codes() {
        assert!(OperatorCode::parse("ARR").is_ok());
        assert!(OperatorCode::parse("NS").is_ok());
        assert!(OperatorCode::parse("QBUZZ").is_ok());
        assert!(OperatorCode::parse("EBS").is_ok());
        assert!(OperatorCode::parse("OPENOV2").is_ok());
    }

    #[test]
    fn reject_lowercase() {
        assert!(OperatorCode::parse("arr").is_err());
        assert!(OperatorCode::parse("Arr").is_err());
    }

    #[test]
    fn reject_empty_and_long() {
        assert!(OperatorCode::parse("").is_err());
        assert!(OperatorCode::parse("ABCDEFGHIJKLM").is_err());
    }

    #[test]
    fn reject_punctuation() {
        assert!(OperatorCode::parse("A-R").is_err());
        assert!(OperatorCode::parse("/ARR").is_err());
        assert!(OperatorCode::parse("AR R").is_err());
    }

    #[test]
    fn parse_normalized_trims_and_uppercases() {
        let code = OperatorCode::parse_normalized("  arr \n").unwrap();
        assert_eq!(code.as_str(), "ARR");
    }

    #[test]
    fn known_names() {
        assert_eq!(OperatorCode::parse("ARR").unwrap().name(), Some("arriva"));
        assert_eq!(OperatorCode::parse("VTN").unwrap().name(), Some("veolia"));
        assert_eq!(OperatorCode::parse("EBS").unwrap().name(), None);
    }

    #[test]
    fn from_name_is_case_insensitive() {
        assert_eq!(
            OperatorCode::from_name("Connexxion"),
            Some(OperatorCode::parse("CXX").unwrap())
        );
        assert_eq!(OperatorCode::from_name("nobody"), None);
    }

    #[test]
    fn display_and_debug() {
        let code = OperatorCode::parse("GVB").unwrap();
        assert_eq!(format!("{}", code), "GVB");
        assert_eq!(format!("{:?}", code), "OperatorCode(GVB)");
    }

    #[test]
    fn serializes_as_plain_string() {
        let code = OperatorCode::parse("HTM").unwrap();
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"HTM\"");
    }
}
