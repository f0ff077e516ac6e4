//! # Source Backends
//!
//! One `trait Source` capturing the five operations every dialect must
//! provide, plus the URL-scheme dispatch that picks a dialect for a given
//! address.
//!
//! ## Dialects
//!
//! - [`git`] — distributed history, 40-hex revisions, annotated tags peeled
//!   to their target commit.
//! - [`hg`] — distributed history, 12/40-hex revisions, tags are not
//!   separate objects so peeling is a no-op.
//! - [`svn`] — centralized history behind a `trunk`/`branches`/`tags`
//!   convention, versions are directory names, revisions are global
//!   revision numbers.
//! - [`fixture`] — an in-memory, network-free dialect used only by tests.

pub mod fixture;
pub mod git;
pub mod hg;
pub mod svn;

use std::collections::BTreeMap;
use std::path::Path;

use analyzer::{PackageOutcome, RelPath};
use thiserror::Error;
use version::{RevisionId, Version};

/// A project's package tree at one version, keyed by subpackage path.
pub type PackageTree = BTreeMap<RelPath, PackageOutcome>;

/// The uniform capability set every dialect realizes.
///
/// All five operations are suspension points: a caller may block on
/// network or disk I/O inside any of them. Implementations are expected to
/// be cheap to construct and to defer actual work to these methods, since
/// the manager owns caching and single-flight coalescing above this trait.
pub trait Source: Send + Sync {
    /// Fetches or updates the local cache from upstream. Idempotent.
    fn sync(&self) -> Result<(), Error>;

    /// Enumerates branches and tags, pairing each to the revision it
    /// currently points at where the dialect can do so cheaply.
    fn list_versions(&self) -> Result<Vec<Version>, Error>;

    /// Confirms a revision exists, locally or upstream.
    fn revision_present(&self, revision: &RevisionId) -> Result<bool, Error>;

    /// Materializes the package tree at `version`.
    fn list_packages_at(&self, version: &Version) -> Result<PackageTree, Error>;

    /// Writes the source tree at `version` into `destination`, which must
    /// be empty. Implementations must leave no partial tree on failure;
    /// the manager's caller is responsible for removing a failed export's
    /// directory, but backends should not assume that happens promptly.
    fn export_at(&self, version: &Version, destination: &Path) -> Result<(), Error>;
}

/// An error from any dialect, or from dialect selection itself.
#[derive(Error, Debug)]
pub enum Error {
    /// The git dialect failed.
    #[error(transparent)]
    Git(#[from] git::Error),
    /// The Mercurial dialect failed.
    #[error(transparent)]
    Hg(#[from] hg::Error),
    /// The Subversion dialect failed.
    #[error(transparent)]
    Svn(#[from] svn::Error),
    /// No dialect claimed this URL, including every scheme guess probed.
    #[error("no source dialect recognized `{0}`")]
    NoDialect(String),
    /// The requested version does not exist for this source.
    #[error("{0}")]
    NotFound(String),
}

/// The three real dialects a URL can resolve to, plus the scheme each is
/// unambiguously recognized by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// See [`git`].
    Git,
    /// See [`hg`].
    Hg,
    /// See [`svn`].
    Svn,
}

/// Scheme guesses probed in order for an ambiguous (schemeless) URL.
/// `git+https`/`hg+https`/`svn+https` are unambiguous and never reach this
/// list.
const PROBE_ORDER: &[Dialect] = &[Dialect::Git, Dialect::Hg, Dialect::Svn];

impl Dialect {
    /// Picks a dialect by URL scheme, where the scheme names one
    /// unambiguously (`git+...`, `hg+...`, `svn+...`, or a bare `.git`
    /// suffix). Returns `None` for a scheme that doesn't name a dialect,
    /// leaving the caller to fall back to [`Dialect::probe`].
    pub fn from_scheme(url: &url::Url) -> Option<Dialect> {
        match url.scheme() {
            "git" => Some(Dialect::Git),
            "hg" => Some(Dialect::Hg),
            "svn" => Some(Dialect::Svn),
            scheme if scheme.starts_with("git+") => Some(Dialect::Git),
            scheme if scheme.starts_with("hg+") => Some(Dialect::Hg),
            scheme if scheme.starts_with("svn+") => Some(Dialect::Svn),
            _ if url.path().ends_with(".git") => Some(Dialect::Git),
            _ => None,
        }
    }

    /// The ordered list of dialects to probe for a schemeless or ambiguous URL.
    pub fn probe_order() -> &'static [Dialect] {
        PROBE_ORDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_prefix_selects_dialect() {
        let url = url::Url::parse("hg+https://example.com/foo").unwrap();
        assert_eq!(Dialect::from_scheme(&url), Some(Dialect::Hg));
    }

    #[test]
    fn dot_git_suffix_selects_git_without_a_scheme_prefix() {
        let url = url::Url::parse("https://example.com/foo.git").unwrap();
        assert_eq!(Dialect::from_scheme(&url), Some(Dialect::Git));
    }

    #[test]
    fn ambiguous_url_has_no_scheme_match() {
        let url = url::Url::parse("https://example.com/foo").unwrap();
        assert_eq!(Dialect::from_scheme(&url), None);
    }
}
