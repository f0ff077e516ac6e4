//! # Safe Writer
//!
//! Atomically writes any subset of {manifest, lock, vendor} to a project
//! root. On any exit path the on-disk state is either the pre-write
//! snapshot or the fully-written post-write snapshot -- never something in
//! between.
//!
//! Manifest and lock are staged into a `NamedTempFile` colocated with the
//! destination, then `persist`ed. The vendor tree gets its own
//! directory-swap dance: rename the current `vendor/` to `vendor.orig`,
//! move the freshly staged tree into place, then delete the backup only
//! once every other output has also landed.

use std::path::{Path, PathBuf};

use manifest::{Lock, Manifest};
use thiserror::Error;

/// When to (re)write the vendor tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VendorPolicy {
    /// Always write the vendor tree, even if the lock is unchanged.
    Always,
    /// Never write the vendor tree, regardless of lock changes.
    Never,
    /// Write the vendor tree only if the project set or any version changed.
    #[default]
    OnChanged,
}

/// A freshly staged vendor tree, ready to be swapped into place.
///
/// The caller (typically the `ensure` CLI command, after exporting every
/// locked project via the source manager) is responsible for materializing
/// this directory; the writer only owns moving it atomically into place.
/// It must be created on the same filesystem as the project root -- the
/// natural way to guarantee that is to stage it under a [`tempfile::TempDir`]
/// built with [`tempfile::Builder::tempdir_in`] rooted at the project root.
pub struct StagedVendor {
    /// The directory holding the freshly built vendor tree's contents.
    pub staged_dir: PathBuf,
}

/// What to write in one atomic operation. Any combination of the three
/// fields may be `None`; an empty request is a no-op.
#[derive(Default)]
pub struct WriteRequest<'a> {
    /// The manifest to write, if it changed.
    pub manifest: Option<&'a Manifest>,
    /// The lock to write, if it changed.
    pub lock: Option<&'a Lock>,
    /// The freshly staged vendor tree to swap in, if one was built.
    pub vendor: Option<StagedVendor>,
    /// The policy deciding whether `vendor` (if present) actually gets written.
    pub vendor_policy: VendorPolicy,
    /// The prior lock, used by [`VendorPolicy::OnChanged`] to decide whether
    /// anything about the locked project set actually changed.
    pub prior_lock: Option<&'a Lock>,
}

/// An error from a safe-write attempt. On any variant, [`write`] has already
/// rolled the destination back to its pre-write snapshot.
#[derive(Error, Debug)]
pub enum Error {
    /// The manifest or lock could not be serialized.
    #[error(transparent)]
    Toml(#[from] manifest::toml::Error),
    /// A staged file could not be persisted into place.
    #[error(transparent)]
    Persist(#[from] tempfile::PersistError),
    /// A filesystem operation failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted when the error occurred.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Writes `request`'s outputs into `root` atomically.
///
/// Vendor is swapped in first (the highest-risk step, since it replaces a
/// whole directory tree), manifest and lock are persisted last; if either
/// persist fails, the vendor swap is rolled back before returning the error,
/// so a caller never observes a lock that doesn't match what's on disk.
pub fn write(root: &Path, request: WriteRequest<'_>) -> Result<(), Error> {
    let mut vendor_swap = None;

    if let Some(staged) = &request.vendor {
        if should_write_vendor(request.vendor_policy, request.lock, request.prior_lock) {
            vendor_swap = Some(swap_in_vendor(root, &staged.staged_dir)?);
        }
    }

    let result = write_manifest_and_lock(root, request.manifest, request.lock);

    match (&result, vendor_swap) {
        (Ok(()), Some(swap)) => {
            swap.commit();
            Ok(())
        },
        (Ok(()), None) => Ok(()),
        (Err(_), Some(swap)) => {
            swap.rollback();
            result
        },
        (Err(_), None) => result,
    }
}

/// Whether `vendor` should be (re)written at all, given `policy`.
fn should_write_vendor(policy: VendorPolicy, lock: Option<&Lock>, prior_lock: Option<&Lock>) -> bool {
    match policy {
        VendorPolicy::Always => true,
        VendorPolicy::Never => false,
        VendorPolicy::OnChanged => match (lock, prior_lock) {
            (Some(new), Some(old)) => !locks_equivalent(new, old),
            (Some(_), None) => true,
            (None, _) => false,
        },
    }
}

/// `true` iff every locked project's root, version, and package set is
/// unchanged between `a` and `b` -- the comparison [`VendorPolicy::OnChanged`]
/// uses, deliberately ignoring digest fields so a verifier-only rehash
/// doesn't itself trigger a vendor rewrite.
fn locks_equivalent(a: &Lock, b: &Lock) -> bool {
    if a.projects.len() != b.projects.len() {
        return false;
    }
    a.projects.iter().all(|pa| {
        b.project(&pa.root)
            .is_some_and(|pb| pa.version == pb.version && pa.packages == pb.packages && pa.source == pb.source)
    })
}

fn write_manifest_and_lock(root: &Path, manifest: Option<&Manifest>, lock: Option<&Lock>) -> Result<(), Error> {
    use std::io::Write;

    if let Some(manifest) = manifest {
        let text = manifest::toml::manifest_to_string(manifest)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".depctl.toml")
            .tempfile_in(root)
            .map_err(|source| io_err("staging manifest", source))?;
        tmp.write_all(text.as_bytes()).map_err(|source| io_err("writing staged manifest", source))?;
        tmp.persist(root.join(manifest::MANIFEST_FILENAME))?;
    }

    if let Some(lock) = lock {
        let text = manifest::toml::lock_to_string(lock)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".depctl.lock")
            .tempfile_in(root)
            .map_err(|source| io_err("staging lock", source))?;
        tmp.write_all(text.as_bytes()).map_err(|source| io_err("writing staged lock", source))?;
        tmp.persist(root.join(manifest::LOCK_FILENAME))?;
    }

    Ok(())
}

/// An in-progress vendor swap: the old tree has already been moved aside (or
/// never existed), and the staged tree has already been moved into its
/// place. Call [`VendorSwap::commit`] to delete the backup, or
/// [`VendorSwap::rollback`] to undo the swap entirely.
struct VendorSwap {
    vendor_path: PathBuf,
    backup: Backup,
}

enum Backup {
    /// No prior vendor tree existed; nothing to restore on rollback.
    None,
    /// The prior tree was renamed to `vendor.orig` alongside the destination.
    SiblingOrig(PathBuf),
    /// `vendor.orig` was already occupied; the prior tree was staged in a
    /// scratch tempdir instead.
    Scratch(tempfile::TempDir, PathBuf),
}

impl VendorSwap {
    fn commit(self) {
        match self.backup {
            Backup::None => {},
            Backup::SiblingOrig(path) => {
                if let Err(e) = std::fs::remove_dir_all(&path) {
                    tracing::warn!(error = %e, path = %path.display(), "failed to remove vendor backup after a successful write");
                }
            },
            Backup::Scratch(_, _) => {
                // Dropping the TempDir removes the scratch backup.
            },
        }
    }

    fn rollback(self) {
        let _ = std::fs::remove_dir_all(&self.vendor_path);
        match self.backup {
            Backup::None => {},
            Backup::SiblingOrig(path) => {
                if let Err(e) = std::fs::rename(&path, &self.vendor_path) {
                    tracing::error!(error = %e, "failed to restore vendor backup during rollback");
                }
            },
            Backup::Scratch(_tempdir, original_path) => {
                if let Err(e) = std::fs::rename(&original_path, &self.vendor_path) {
                    tracing::error!(error = %e, "failed to restore vendor backup during rollback");
                }
            },
        }
    }
}

/// Moves aside the current `<root>/vendor` (if any) and moves `staged_dir`
/// into its place, returning a handle the caller commits or rolls back once
/// the rest of the write has also succeeded or failed.
fn swap_in_vendor(root: &Path, staged_dir: &Path) -> Result<VendorSwap, Error> {
    let vendor_path = root.join("vendor");
    let orig_path = root.join("vendor.orig");

    let backup = if vendor_path.exists() {
        if orig_path.exists() {
            let scratch = tempfile::Builder::new()
                .prefix(".depctl-vendor-backup")
                .tempdir_in(root)
                .map_err(|source| io_err("staging vendor backup", source))?;
            let backup_path = scratch.path().join("vendor.orig");
            std::fs::rename(&vendor_path, &backup_path).map_err(|source| io_err("backing up existing vendor tree", source))?;
            Backup::Scratch(scratch, backup_path)
        } else {
            std::fs::rename(&vendor_path, &orig_path).map_err(|source| io_err("backing up existing vendor tree", source))?;
            Backup::SiblingOrig(orig_path)
        }
    } else {
        Backup::None
    };

    if let Err(source) = std::fs::rename(staged_dir, &vendor_path) {
        let swap = VendorSwap { vendor_path: vendor_path.clone(), backup };
        swap.rollback();
        return Err(io_err("moving staged vendor tree into place", source));
    }

    Ok(VendorSwap { vendor_path, backup })
}

fn io_err(context: &str, source: std::io::Error) -> Error {
    Error::Io { context: context.to_string(), source }
}
