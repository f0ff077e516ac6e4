//! Constraints: what a manifest, override, or transitive dependency demands.

use semver::VersionReq;
use serde::{Deserialize, Serialize};

use crate::Version;

/// A demand placed on a project's selected version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Constraint {
    /// Pins to a specific branch, tag, or revision.
    Version(Version),
    /// A semver range, or-set, or caret/tilde shorthand.
    SemverRange(#[serde(with = "semver_req_serde")] VersionReq),
}

impl Constraint {
    /// Does `candidate` satisfy this constraint?
    ///
    /// - A [`Constraint::Version`] wrapping a [`Version::Revision`] matches only that
    ///   exact revision (or a pairing of it).
    /// - A [`Constraint::Version`] wrapping a branch or tag matches that same branch/tag,
    ///   or any pairing of it -- it does not match by revision, since two different tags
    ///   can point at the same commit.
    /// - A [`Constraint::SemverRange`] matches any candidate whose tag parses as semver
    ///   and satisfies the range.
    pub fn matches(&self, candidate: &Version) -> bool {
        match self {
            Constraint::Version(Version::Revision(r)) => candidate.revision() == Some(r),
            Constraint::Version(v) => candidate.unpair() == v.unpair(),
            Constraint::SemverRange(req) => candidate.as_semver().is_some_and(|v| req.matches(&v)),
        }
    }
}

mod semver_req_serde {
    use semver::VersionReq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(req: &VersionReq, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&req.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<VersionReq, D::Error> {
        let s = String::deserialize(d)?;
        VersionReq::parse(&s).map_err(serde::de::Error::custom)
    }
}
