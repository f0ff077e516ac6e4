//! The input digest: a fast-path "has anything changed" check over the
//! manifest, the root package tree's import set, and the analyzer version.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Manifest;

/// The content digest of one locked project's pruned vendor tree, as
/// computed by the vendor verifier and recorded in the lock.
///
/// Serializes as `<hash-version>:<hex>`, matching the lock TOML shape. A
/// legacy lock may omit this entirely -- represented as
/// `Option<ContentDigest>` wherever it is stored, not as a variant here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest {
    /// The hash-version tag this digest's algorithm was computed under.
    pub hash_version: u8,
    /// The hex-encoded digest bytes.
    pub hex: String,
}

/// An error parsing a [`ContentDigest`] from its `<version>:<hex>` text form.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ContentDigestError {
    /// The text was missing the `:` separator.
    #[error("digest `{0}` is missing a `:` separating the hash version from the hex digest")]
    MissingSeparator(String),
    /// The version prefix was not a valid `u8`.
    #[error("digest version `{0}` is not a valid byte")]
    InvalidVersion(String),
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash_version, self.hex)
    }
}

impl FromStr for ContentDigest {
    type Err = ContentDigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (version, hex) = s
            .split_once(':')
            .ok_or_else(|| ContentDigestError::MissingSeparator(s.to_string()))?;
        let hash_version = version
            .parse()
            .map_err(|_| ContentDigestError::InvalidVersion(version.to_string()))?;
        Ok(ContentDigest {
            hash_version,
            hex: hex.to_string(),
        })
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = ContentDigestError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ContentDigest> for String {
    fn from(d: ContentDigest) -> Self {
        d.to_string()
    }
}

/// Computes the input digest: a hash over the canonical serialization of
/// the manifest, the sorted root import list, and the analyzer version, so
/// the result is reproducible regardless of traversal order.
pub fn input_digest(manifest: &Manifest, root_imports: &BTreeSet<String>, analyzer_version: &str) -> String {
    let mut hasher = blake3::Hasher::new();

    // `BTreeMap`/`BTreeSet` fields already serialize in sorted key order, and
    // `toml_edit`'s serializer is deterministic for a fixed value, so this
    // serialization is itself the canonical form -- no extra sort step needed
    // beyond the `BTreeSet` the caller already built `root_imports` as.
    let manifest_bytes =
        toml_edit::ser::to_string_pretty(manifest).expect("manifest always serializes");
    hasher.update(manifest_bytes.as_bytes());

    for import in root_imports {
        hasher.update(import.as_bytes());
        hasher.update(b"\0");
    }

    hasher.update(analyzer_version.as_bytes());

    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_stable_for_identical_inputs() {
        let manifest = Manifest::default();
        let imports: BTreeSet<String> = ["github.com/a/b".into()].into_iter().collect();
        let a = input_digest(&manifest, &imports, "v1");
        let b = input_digest(&manifest, &imports, "v1");
        assert_eq!(a, b);
    }

    #[test]
    fn changes_with_analyzer_version() {
        let manifest = Manifest::default();
        let imports = BTreeSet::new();
        let a = input_digest(&manifest, &imports, "v1");
        let b = input_digest(&manifest, &imports, "v2");
        assert_ne!(a, b);
    }
}
