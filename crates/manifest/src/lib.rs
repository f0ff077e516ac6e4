//! # Manifest & Lock Data Model
//!
//! The Rust types backing the data model: [`ProjectRoot`], [`Manifest`],
//! [`Lock`], and the prune flag set, plus the marshalling and grammar that
//! sit at the edges of that model (TOML shapes, the project-spec argument
//! grammar, root deduction).
//!
//! Solver, source manager, vendor verifier, and safe writer all borrow a
//! [`Manifest`] and [`Lock`] read-only; only [`crate::toml`] and the safe
//! writer ever produce new instances.

pub mod deduce;
mod digest;
mod lock;
pub mod spec_grammar;
pub mod toml;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The manifest's conventional file name, at a project's tree root.
pub const MANIFEST_FILENAME: &str = "depctl.toml";

/// The lock's conventional file name, at a project's tree root.
pub const LOCK_FILENAME: &str = "depctl.lock";

pub use deduce::{DefaultRootDeducer, RootDeducer};
pub use digest::{ContentDigest, ContentDigestError, input_digest};
pub use lock::{Lock, LockedProject, SolveMeta};
use serde::{Deserialize, Serialize};
use version::Constraint;

/// An import-path prefix at which a coherent versioned unit lives.
///
/// Two identifiers with equal root but a different [`Source`] denote the
/// same project fetched from alternate upstreams -- the root alone is not
/// assumed unique across sources.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectRoot(String);

impl ProjectRoot {
    /// Wraps an import-path prefix as a project root, verbatim.
    pub fn new(root: impl Into<String>) -> Self {
        ProjectRoot(root.into())
    }

    /// Borrows the underlying import-path prefix.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The network address a project may be fetched from.
///
/// Distinct from [`ProjectRoot`]: the same root may be reachable at more
/// than one source (a fork, a mirror, a vendored alternate).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Source(#[serde(with = "url_serde")] url::Url);

impl Source {
    /// Parses a source address.
    pub fn parse(s: &str) -> Result<Self, url::ParseError> {
        Ok(Source(url::Url::parse(s)?))
    }

    /// Borrows the underlying URL.
    pub fn url(&self) -> &url::Url {
        &self.0
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<url::Url> for Source {
    fn from(url: url::Url) -> Self {
        Source(url)
    }
}

mod url_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use url::Url;

    pub fn serialize<S: Serializer>(url: &Url, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(url.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Url, D::Error> {
        let s = String::deserialize(d)?;
        Url::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// What a manifest declares about one direct dependency.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProjectProperties {
    /// An alternate source to fetch this project from, if not its root's default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    /// The constraint this project's selected version must satisfy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<Constraint>,
}

/// A single bit of the [`PruneFlags`] set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PruneFlag {
    /// Drop subdirectories whose package path is not in the lock's package list.
    UnusedPackages,
    /// Keep only source files and a small whitelist (license, legal notices).
    NonGoFiles,
    /// Drop test files.
    GoTests,
    /// Drop any directory named `vendor` below the project root. Always applied.
    NestedVendorDirs,
}

/// A bitset over [`PruneFlag`].
///
/// `NestedVendorDirs` is always considered set when pruning a vendor tree
/// (see [`PruneFlags::effective`]), and is normalized out of
/// [`PruneFlags`] equality used for lock-change comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PruneFlags {
    /// See [`PruneFlag::UnusedPackages`].
    #[serde(default, rename = "unused-packages")]
    pub unused_packages: bool,
    /// See [`PruneFlag::NonGoFiles`].
    #[serde(default, rename = "non-go-files")]
    pub non_go_files: bool,
    /// See [`PruneFlag::GoTests`].
    #[serde(default, rename = "go-tests")]
    pub go_tests: bool,
}

impl PruneFlags {
    /// The flag set actually applied when pruning a vendor tree: `self` plus
    /// the always-on `NestedVendorDirs` rule.
    pub fn effective(&self) -> BTreeSet<PruneFlag> {
        let mut set = BTreeSet::new();
        if self.unused_packages {
            set.insert(PruneFlag::UnusedPackages);
        }
        if self.non_go_files {
            set.insert(PruneFlag::NonGoFiles);
        }
        if self.go_tests {
            set.insert(PruneFlag::GoTests);
        }
        set.insert(PruneFlag::NestedVendorDirs);
        set
    }
}

/// The direct dependency declarations a project makes about itself and its world.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Direct constraints, keyed by project root.
    #[serde(default)]
    pub constraints: BTreeMap<ProjectRoot, ProjectProperties>,
    /// Constraints that win over any transitively-declared constraint on the same root.
    #[serde(default)]
    pub overrides: BTreeMap<ProjectRoot, ProjectProperties>,
    /// Import paths to never seed as atoms, even if reachable from the root tree.
    #[serde(default)]
    pub ignored: BTreeSet<String>,
    /// Import paths to seed as atoms even though they are not reachable from the root tree.
    #[serde(default)]
    pub required: BTreeSet<String>,
    /// Roots to vendor without verifying their digest.
    #[serde(default)]
    pub noverify: BTreeSet<ProjectRoot>,
    /// The default prune flag set, applied to every project unless overridden.
    #[serde(default)]
    pub prune: PruneFlags,
    /// Per-project prune flag overrides.
    #[serde(default)]
    pub prune_overrides: BTreeMap<ProjectRoot, PruneFlags>,
}

impl Manifest {
    /// The effective prune flags for `root`: its override if one exists, else the default.
    pub fn prune_for(&self, root: &ProjectRoot) -> PruneFlags {
        self.prune_overrides.get(root).copied().unwrap_or(self.prune)
    }

    /// Looks up the constraint that applies to `root`, honoring override precedence:
    /// an override on `root` always wins over a plain constraint declaration.
    pub fn effective_constraint(&self, root: &ProjectRoot) -> Option<&ProjectProperties> {
        self.overrides.get(root).or_else(|| self.constraints.get(root))
    }

    /// `true` if `root` has an override -- overrides are not transitively carried as
    /// constraints; this lets a caller tell the two apart.
    pub fn is_overridden(&self, root: &ProjectRoot) -> bool {
        self.overrides.contains_key(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins_over_constraint() {
        let mut m = Manifest::default();
        let root = ProjectRoot::new("example.com/q");
        m.constraints.insert(
            root.clone(),
            ProjectProperties {
                source: None,
                constraint: Some(Constraint::SemverRange(
                    semver::VersionReq::parse("^1.0.0").unwrap(),
                )),
            },
        );
        m.overrides.insert(
            root.clone(),
            ProjectProperties {
                source: None,
                constraint: Some(Constraint::Version(version::Version::Tag("v2.0.0".into()))),
            },
        );
        let effective = m.effective_constraint(&root).unwrap();
        assert_eq!(
            effective.constraint,
            Some(Constraint::Version(version::Version::Tag("v2.0.0".into())))
        );
        assert!(m.is_overridden(&root));
    }

    #[test]
    fn prune_effective_always_includes_nested_vendor() {
        let flags = PruneFlags::default();
        assert!(flags.effective().contains(&PruneFlag::NestedVendorDirs));
    }
}
