//! Backend-agnostic revision identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An immutable content identifier, as reported by a source backend.
///
/// Distributed-history backends (git, hg) use a 40-hex digest; the
/// centralized dialect uses its own backend-specific revision numbers, so
/// the inner representation is kept as a validated string rather than a
/// fixed-width byte array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RevisionId(String);

/// An error constructing a [`RevisionId`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The revision string was empty.
    #[error("a revision id cannot be empty")]
    Empty,
}

impl RevisionId {
    /// Builds a revision id from any non-empty string.
    ///
    /// No further validation is performed here: 40-hex checking is the
    /// distributed-history backends' concern (see [`RevisionId::is_forty_hex`]),
    /// since the centralized dialect's revisions are not hex digests at all.
    pub fn new(s: impl Into<String>) -> Result<Self, Error> {
        let s = s.into();
        if s.is_empty() {
            return Err(Error::Empty);
        }
        Ok(RevisionId(s))
    }

    /// `true` if this id parses as a 40-character hex digest, the shape
    /// distributed-history backends use for commit ids.
    pub fn is_forty_hex(&self) -> bool {
        self.0.len() == 40 && self.0.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RevisionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RevisionId::new(s.to_string())
    }
}

impl TryFrom<String> for RevisionId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        RevisionId::new(s)
    }
}

impl From<RevisionId> for String {
    fn from(r: RevisionId) -> Self {
        r.0
    }
}

/// Recognizes the literal shape of a 40-hex revision, independent of any
/// particular [`RevisionId`] instance. Used by the project-spec grammar
/// (manifest crate) to classify a bare constraint string as a revision
/// before a [`RevisionId`] exists to ask.
pub fn looks_like_forty_hex(s: &str) -> bool {
    s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty() {
        assert_eq!(RevisionId::new(""), Err(Error::Empty));
    }

    #[test]
    fn recognizes_forty_hex() {
        let rev = RevisionId::new("a".repeat(40)).unwrap();
        assert!(rev.is_forty_hex());
        let rev = RevisionId::new("deadbeef").unwrap();
        assert!(!rev.is_forty_hex());
    }
}
