//! KV6 parsing error types.

/// Why a decoded payload could not be parsed.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The text is not well-formed XML
    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    /// Well-formed, but not a KV6 position message
    #[error("unexpected root element <{0}>")]
    UnexpectedRoot(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ParseError::UnexpectedRoot("KV17cvlinfo".into());
        assert_eq!(err.to_string(), "unexpected root element <KV17cvlinfo>");

        let xml_err = roxmltree::Document::parse("<a>").unwrap_err();
        let err = ParseError::from(xml_err);
        assert!(err.to_string().starts_with("malformed XML: "));
    }
}
