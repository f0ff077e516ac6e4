//! # Version Model
//!
//! Typed revisions, tags, branches and semver constraints for the dependency
//! solver and source manager. A [`Version`] names *what* a project was
//! fetched at; a [`Constraint`] names what a caller is willing to accept.
//!
//! ## Pairing
//!
//! Backends hand back a [`Version::Paired`] whenever an unpaired reference
//! (a branch or tag) can be resolved to an immutable revision at the moment
//! it is listed. A paired version is substitutable for either of its parts:
//! see [`Version::substitutable_for`] for the exact rule, which intentionally
//! does not live in `PartialEq`/`Hash` (those stay structural, so `Version`
//! remains safe to use as a map key).

mod constraint;
mod revision;

use std::cmp::Ordering;
use std::fmt;

pub use constraint::Constraint;
pub use revision::{RevisionId, looks_like_forty_hex};
use serde::{Deserialize, Serialize};

//================================================================================================
// Types
//================================================================================================

/// A single resolvable reference to a project at some point in its history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Version {
    /// A moving reference, e.g. a VCS branch.
    Branch(String),
    /// A non-moving textual label, e.g. a VCS tag.
    Tag(String),
    /// An immutable content identifier.
    Revision(RevisionId),
    /// An unpaired version bound to the revision it resolved to at listing time.
    Paired {
        /// The branch or tag this pairing was derived from.
        unpaired: Box<Version>,
        /// The revision the unpaired reference pointed at.
        revision: RevisionId,
    },
}

//================================================================================================
// Impls
//================================================================================================

impl Version {
    /// Builds a paired version from an unpaired reference and the revision it resolved to.
    ///
    /// Panics (in debug builds, via `debug_assert`) if `unpaired` is itself already paired --
    /// pairing is a one-step operation performed by a backend at listing time.
    pub fn pair(unpaired: Version, revision: RevisionId) -> Version {
        debug_assert!(
            !matches!(unpaired, Version::Paired { .. }),
            "cannot pair an already-paired version"
        );
        Version::Paired {
            unpaired: Box::new(unpaired),
            revision,
        }
    }

    /// Strips pairing, returning the branch/tag/revision this version is ultimately about.
    pub fn unpair(&self) -> &Version {
        match self {
            Version::Paired { unpaired, .. } => unpaired,
            other => other,
        }
    }

    /// The revision this version resolves to, if it carries one.
    ///
    /// `None` for a bare, unresolved branch or tag.
    pub fn revision(&self) -> Option<&RevisionId> {
        match self {
            Version::Revision(r) => Some(r),
            Version::Paired { revision, .. } => Some(revision),
            Version::Branch(_) | Version::Tag(_) => None,
        }
    }

    /// `true` if this is a branch, or a pairing of one.
    pub fn is_branch(&self) -> bool {
        matches!(self.unpair(), Version::Branch(_))
    }

    /// `true` if this is a tag, or a pairing of one.
    pub fn is_tag(&self) -> bool {
        matches!(self.unpair(), Version::Tag(_))
    }

    /// The tag's semver parse, if this version is (or pairs) a tag that parses as one.
    pub fn as_semver(&self) -> Option<semver::Version> {
        match self.unpair() {
            Version::Tag(name) => semver::Version::parse(name.trim_start_matches('v')).ok(),
            _ => None,
        }
    }

    /// Whether `self` may stand in for `other` per the pairing invariant: a paired
    /// version is substitutable for either of its parts, and equality between two
    /// paired versions is decided on the revision alone.
    ///
    /// This is deliberately *not* `PartialEq`: making pairing-aware equality the
    /// default would make `Version` unsound as a `HashMap`/`HashSet` key, since a
    /// `Tag` and the `Paired` value that wraps it would need to hash identically
    /// while differing structurally.
    pub fn substitutable_for(&self, other: &Version) -> bool {
        match (self.revision(), other.revision()) {
            (Some(a), Some(b)) => a == b,
            _ => self.unpair() == other.unpair(),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Branch(name) => write!(f, "{name}"),
            Version::Tag(name) => write!(f, "{name}"),
            Version::Revision(rev) => write!(f, "{rev}"),
            Version::Paired { unpaired, revision } => write!(f, "{unpaired} ({revision})"),
        }
    }
}

/// Sort a candidate list into solver preference order.
///
/// Tie-breaks, highest preference first:
/// 1. semver tags, highest satisfying first
/// 2. the declared default branch, if any
/// 3. other branches, lexicographic ascending
/// 4. other (non-semver) tags, lexicographic ascending
/// 5. bare revisions, in the order they were given
///
/// Paired versions sort by their unpaired part; the underlying revision rides
/// along untouched by the comparison.
pub fn sort_for_upgrade(default_branch: Option<&str>, versions: &mut [Version]) {
    versions.sort_by(|a, b| rank(default_branch, a).cmp(&rank(default_branch, b)));
}

/// Ordering key used by [`sort_for_upgrade`]. Lower sorts first.
fn rank(default_branch: Option<&str>, v: &Version) -> Rank {
    match v.unpair() {
        Version::Tag(name) => match semver::Version::parse(name.trim_start_matches('v')) {
            Ok(ver) => Rank::Semver(std::cmp::Reverse(ver)),
            Err(_) => Rank::OtherTag(name.clone()),
        },
        Version::Branch(name) if Some(name.as_str()) == default_branch => Rank::DefaultBranch,
        Version::Branch(name) => Rank::OtherBranch(name.clone()),
        Version::Revision(_) => Rank::BareRevision,
        Version::Paired { .. } => unreachable!("unpair() never returns Paired"),
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Semver(std::cmp::Reverse<semver::Version>),
    DefaultBranch,
    OtherBranch(String),
    OtherTag(String),
    BareRevision,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_round_trips() {
        let rev = RevisionId::new("a".repeat(40)).unwrap();
        let paired = Version::pair(Version::Tag("v1.0.0".into()), rev.clone());
        assert_eq!(paired.revision(), Some(&rev));
        assert_eq!(paired.unpair(), &Version::Tag("v1.0.0".into()));
    }

    #[test]
    fn substitutable_compares_on_revision_when_both_paired() {
        let rev = RevisionId::new("b".repeat(40)).unwrap();
        let a = Version::pair(Version::Tag("v1.0.0".into()), rev.clone());
        let b = Version::pair(Version::Branch("master".into()), rev);
        assert!(a.substitutable_for(&b));
        assert_ne!(a, b, "structural equality must still distinguish them");
    }

    #[test]
    fn paired_substitutes_for_its_revision() {
        let rev = RevisionId::new("c".repeat(40)).unwrap();
        let paired = Version::pair(Version::Tag("v2.0.0".into()), rev.clone());
        let bare = Version::Revision(rev);
        assert!(paired.substitutable_for(&bare));
        assert!(bare.substitutable_for(&paired));
    }

    #[test]
    fn sort_prefers_semver_desc_then_default_branch_then_lexicographic() {
        let mut versions = vec![
            Version::Tag("v0.8.0".into()),
            Version::Branch("feature/x".into()),
            Version::Branch("master".into()),
            Version::Tag("v1.0.0".into()),
            Version::Tag("release-candidate".into()),
        ];
        sort_for_upgrade(Some("master"), &mut versions);
        assert_eq!(
            versions,
            vec![
                Version::Tag("v1.0.0".into()),
                Version::Tag("v0.8.0".into()),
                Version::Branch("master".into()),
                Version::Branch("feature/x".into()),
                Version::Tag("release-candidate".into()),
            ]
        );
    }
}
