//! Identifier exchange with the client.
//!
//! The store never touches HTTP headers. It reads a previously issued
//! identifier through an [`IdentifierSource`] and hands newly persisted
//! identifiers to an [`IdentifierSink`], which is expected to attach them to
//! the response (typically as a `Set-Cookie` header).

use std::collections::HashMap;

use crate::config::CookieConfig;
use crate::error::{Error, Result};

/// Request-side accessor for identifiers the client presented.
pub trait IdentifierSource {
    /// The identifier presented for the session slot `name`, if any.
    fn read_identifier(&self, name: &str) -> Option<String>;
}

/// Response-side setter for identifiers the client should keep.
pub trait IdentifierSink {
    /// Attach `id` for the session slot `name` with the given cookie attributes.
    fn write_identifier(&mut self, name: &str, id: &str, config: CookieConfig);
}

/// Cookie name → value pairs parsed from a request.
impl IdentifierSource for HashMap<String, String> {
    fn read_identifier(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// A request that carries no identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIdentifier;

impl IdentifierSource for NoIdentifier {
    fn read_identifier(&self, _name: &str) -> Option<String> {
        None
    }
}

/// One identifier handed to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedIdentifier {
    pub name: String,
    pub id: String,
    pub config: CookieConfig,
}

/// A sink that records every identifier written to it.
///
/// Useful for tests and for adapters that render headers after the handler
/// has finished.
#[derive(Debug, Clone, Default)]
pub struct IssuedIdentifiers {
    issued: Vec<IssuedIdentifier>,
}

impl IssuedIdentifiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, in order.
    pub fn iter(&self) -> impl Iterator<Item = &IssuedIdentifier> {
        self.issued.iter()
    }

    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }

    /// The most recent identifier written for `name`.
    pub fn latest(&self, name: &str) -> Option<&IssuedIdentifier> {
        self.issued.iter().rev().find(|issued| issued.name == name)
    }

    /// What the client would send back on its next request.
    pub fn to_source(&self) -> HashMap<String, String> {
        self.issued
            .iter()
            .map(|issued| (issued.name.clone(), issued.id.clone()))
            .collect()
    }
}

impl IdentifierSink for IssuedIdentifiers {
    fn write_identifier(&mut self, name: &str, id: &str, config: CookieConfig) {
        self.issued.push(IssuedIdentifier {
            name: name.to_string(),
            id: id.to_string(),
            config,
        });
    }
}

/// Check that `name` is a valid cookie name (an RFC 6265 token).
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.bytes().all(is_token_byte) {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

fn is_token_byte(b: u8) -> bool {
    matches!(b, 0x21..=0x7e)
        && !matches!(
            b,
            b'(' | b')'
                | b'<'
                | b'>'
                | b'@'
                | b','
                | b';'
                | b':'
                | b'\\'
                | b'"'
                | b'/'
                | b'['
                | b']'
                | b'?'
                | b'='
                | b'{'
                | b'}'
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["session", "s1", "my-session_id", "a.b!#$%&'*+^`|~"] {
            assert!(validate_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", "has space", "semi;colon", "eq=", "tab\t", "ümlaut", "quote\""] {
            assert!(
                matches!(validate_name(name), Err(Error::InvalidName(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_issued_identifiers_feed_next_request() {
        let mut sink = IssuedIdentifiers::new();
        sink.write_identifier("s1", "old", CookieConfig::default());
        sink.write_identifier("s2", "other", CookieConfig::default());
        sink.write_identifier("s1", "new", CookieConfig::default());

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.latest("s1").unwrap().id, "new");

        let source = sink.to_source();
        assert_eq!(source.read_identifier("s1"), Some("new".to_string()));
        assert_eq!(source.read_identifier("s2"), Some("other".to_string()));
        assert_eq!(NoIdentifier.read_identifier("s1"), None);
    }
}
