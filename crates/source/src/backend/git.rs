//! # Git Dialect
//!
//! Built on `gix`: a bare mirror clone lives under the manager's on-disk
//! cache directory for this source, `sync` fetches into it, and every
//! other operation reads from the local mirror so only `sync` ever touches
//! the network.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use gix::bstr::ByteSlice;
use gix::refs::Category;
use thiserror::Error;
use version::{RevisionId, Version};

use super::PackageTree;

/// An error from the git dialect.
#[derive(Error, Debug)]
pub enum Error {
    /// Opening the local mirror failed.
    #[error(transparent)]
    Open(#[from] Box<gix::open::Error>),
    /// Cloning the mirror for the first time failed.
    #[error(transparent)]
    PrepareClone(#[from] Box<gix::clone::Error>),
    /// The clone's initial fetch failed.
    #[error(transparent)]
    Fetch(#[from] Box<gix::clone::fetch::Error>),
    /// Connecting to the remote for an update fetch failed.
    #[error(transparent)]
    Connect(#[from] Box<gix::remote::connect::Error>),
    /// Finding the configured remote failed.
    #[error(transparent)]
    FindRemote(#[from] Box<gix::remote::find::existing::Error>),
    /// Preparing an update fetch failed.
    #[error(transparent)]
    PrepareFetch(#[from] Box<gix::remote::fetch::prepare::Error>),
    /// Receiving an update fetch failed.
    #[error(transparent)]
    Receive(#[from] Box<gix::remote::fetch::Error>),
    /// Walking references failed.
    #[error(transparent)]
    Refs(#[from] Box<gix::reference::iter::Error>),
    /// Peeling a reference or tag to its target commit failed.
    #[error(transparent)]
    Peel(#[from] Box<gix::object::find::existing::Error>),
    /// Parsing a revision spec against the local mirror failed.
    #[error(transparent)]
    RevParse(#[from] Box<gix::revision::spec::parse::Error>),
    /// Checking out a tree at a revision failed.
    #[error(transparent)]
    Checkout(#[from] Box<dyn std::error::Error + Send + Sync>),
    /// The requested revision does not exist in the local mirror.
    #[error("revision `{0}` not found")]
    RevisionNotFound(String),
    /// The package-tree analyzer failed on the exported source.
    #[error(transparent)]
    Analyzer(#[from] analyzer::Error),
    /// A filesystem operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A git-dialect source: a remote URL backed by a local bare mirror.
pub struct GitSource {
    url: url::Url,
    mirror: PathBuf,
}

impl GitSource {
    /// Binds a remote URL to the local mirror directory the manager has
    /// assigned it. Does not touch the filesystem or network until
    /// [`Source::sync`](super::Source::sync) is called.
    pub fn new(url: url::Url, mirror: PathBuf) -> Self {
        GitSource { url, mirror }
    }

    fn open_or_clone(&self) -> Result<gix::Repository, Error> {
        if self.mirror.join("HEAD").is_file() {
            return gix::open(&self.mirror).map_err(|e| Error::Open(Box::new(e)));
        }
        std::fs::create_dir_all(&self.mirror)?;
        let (repo, _outcome) = gix::prepare_clone_bare(self.url.as_str(), &self.mirror)
            .map_err(|e| Error::PrepareClone(Box::new(e)))?
            .fetch_only(gix::progress::Discard, &AtomicBool::new(false))
            .map_err(|e| Error::Fetch(Box::new(e)))?;
        Ok(repo)
    }

    fn refresh(&self, repo: &gix::Repository) -> Result<(), Error> {
        let remote = repo
            .find_default_remote(gix::remote::Direction::Fetch)
            .ok_or_else(|| Error::FindRemote(Box::new(gix::remote::find::existing::Error::NotFound {
                name: "origin".into(),
            })))?
            .map_err(|e| Error::FindRemote(Box::new(e)))?;
        let connection = remote
            .connect(gix::remote::Direction::Fetch)
            .map_err(|e| Error::Connect(Box::new(e)))?;
        connection
            .prepare_fetch(gix::progress::Discard, Default::default())
            .map_err(|e| Error::PrepareFetch(Box::new(e)))?
            .receive(gix::progress::Discard, &AtomicBool::new(false))
            .map_err(|e| Error::Receive(Box::new(e)))?;
        Ok(())
    }
}

impl super::Source for GitSource {
    fn sync(&self) -> Result<(), super::Error> {
        Ok(self.sync_impl()?)
    }

    fn list_versions(&self) -> Result<Vec<Version>, super::Error> {
        Ok(self.list_versions_impl()?)
    }

    fn revision_present(&self, revision: &RevisionId) -> Result<bool, super::Error> {
        Ok(self.revision_present_impl(revision)?)
    }

    fn list_packages_at(&self, version: &Version) -> Result<PackageTree, super::Error> {
        Ok(self.list_packages_at_impl(version)?)
    }

    fn export_at(&self, version: &Version, destination: &Path) -> Result<(), super::Error> {
        Ok(self.export_at_impl(version, destination)?)
    }
}

impl GitSource {
    fn sync_impl(&self) -> Result<(), Error> {
        let repo = self.open_or_clone()?;
        self.refresh(&repo)
    }

    fn list_versions_impl(&self) -> Result<Vec<Version>, Error> {
        let repo = self.open_or_clone()?;
        let platform = repo.references().map_err(|e| Error::Refs(Box::new(e.into())))?;
        let mut versions = Vec::new();

        for reference in platform
            .all()
            .map_err(|e| Error::Refs(Box::new(e.into())))?
            .filter_map(Result::ok)
        {
            let Some((category, short_name)) = reference.name().category_and_short_name() else {
                continue;
            };
            let name = short_name.to_str_lossy().into_owned();
            match category {
                Category::LocalBranch => {
                    let target = peel_to_commit(&repo, reference.into_fully_peeled_id())?;
                    versions.push(Version::pair(Version::Branch(name), target));
                },
                Category::Tag => {
                    let target = peel_to_commit(&repo, reference.into_fully_peeled_id())?;
                    versions.push(Version::pair(Version::Tag(name), target));
                },
                _ => continue,
            }
        }

        Ok(versions)
    }

    fn revision_present_impl(&self, revision: &RevisionId) -> Result<bool, Error> {
        let repo = self.open_or_clone()?;
        Ok(gix::ObjectId::from_hex(revision.as_str().as_bytes())
            .is_ok_and(|id| repo.find_object(id).is_ok()))
    }

    fn list_packages_at_impl(&self, version: &Version) -> Result<PackageTree, Error> {
        let export_dir = tempfile::tempdir()?;
        self.export_at_impl(version, export_dir.path())?;
        Ok(analyzer::analyze(export_dir.path())?)
    }

    fn export_at_impl(&self, version: &Version, destination: &Path) -> Result<(), Error> {
        let repo = self.open_or_clone()?;
        let revision = version
            .revision()
            .ok_or_else(|| Error::RevisionNotFound(version.to_string()))?;
        let id = gix::ObjectId::from_hex(revision.as_str().as_bytes())
            .map_err(|_| Error::RevisionNotFound(revision.to_string()))?;
        let commit = repo
            .find_object(id)
            .map_err(|e| Error::Peel(Box::new(e)))?
            .try_into_commit()
            .map_err(|e| Error::Peel(Box::new(e.into())))?;
        let tree = commit.tree().map_err(|e| Error::Peel(Box::new(e.into())))?;
        checkout_tree(&tree, destination).map_err(|e| Error::Checkout(e))?;
        Ok(())
    }
}

fn peel_to_commit(
    repo: &gix::Repository,
    id: Result<gix::Id<'_>, Box<gix::reference::peel::Error>>,
) -> Result<RevisionId, Error> {
    let id = id.map_err(|e| Error::Peel(Box::new((*e).into())))?;
    let commit_id = repo
        .find_object(id)
        .map_err(|e| Error::Peel(Box::new(e)))?
        .peel_to_kind(gix::object::Kind::Commit)
        .map_err(|e| Error::Peel(Box::new(e.into())))?
        .id;
    RevisionId::new(commit_id.to_string()).map_err(|_| Error::RevisionNotFound(commit_id.to_string()))
}

/// Writes every blob in `tree` to `destination`, preserving relative paths.
///
/// A hand-rolled recursive walk rather than `gix`'s worktree checkout
/// machinery: the mirror is bare, so there is no index to check out
/// against, only a tree to materialize into a scratch directory.
fn checkout_tree(
    tree: &gix::Tree<'_>,
    destination: &Path,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    for entry in tree.iter() {
        let entry = entry?;
        let name = entry.filename().to_str_lossy().into_owned();
        let out_path = destination.join(&name);
        match entry.mode().kind() {
            gix::object::tree::EntryKind::Tree => {
                std::fs::create_dir_all(&out_path)?;
                let sub_tree = entry.object()?.into_tree();
                checkout_tree(&sub_tree, &out_path)?;
            },
            gix::object::tree::EntryKind::Blob | gix::object::tree::EntryKind::BlobExecutable => {
                let blob = entry.object()?.into_blob();
                std::fs::write(&out_path, &blob.data)?;
            },
            _ => continue,
        }
    }
    Ok(())
}
