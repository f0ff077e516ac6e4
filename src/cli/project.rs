//! Shared plumbing the four subcommands all need: locating the project
//! root, loading its manifest/lock, and standing up a [`SourceManager`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use manifest::{Lock, Manifest};
use source::SourceManager;

/// Everything `ensure`/`status`/`check` need before doing their own work.
pub struct Project {
    /// The directory holding `depctl.toml` (and, once written, `depctl.lock` / `vendor/`).
    pub root: PathBuf,
    /// The parsed manifest, or the default (empty) one if none exists yet.
    pub manifest: Manifest,
    /// The parsed lock, if one exists.
    pub lock: Option<Lock>,
    /// The shared source-backend cache and coalescer.
    pub manager: Arc<SourceManager>,
}

/// An error loading a project's context.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No `depctl.toml` was found in the current directory or any ancestor.
    #[error("no {} found in `{0}` or any parent directory; run `depctl init` first", manifest::MANIFEST_FILENAME)]
    NoManifest(PathBuf),
    /// The manifest or lock failed to parse.
    #[error(transparent)]
    Toml(#[from] manifest::toml::Error),
    /// The configured cache root could not be resolved.
    #[error(transparent)]
    Config(#[from] config::Error),
    /// The source manager's cache directory could not be created.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Searches `start` and its ancestors for a directory containing
/// [`manifest::MANIFEST_FILENAME`].
pub fn find_root(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(d) = dir {
        if d.join(manifest::MANIFEST_FILENAME).is_file() {
            return Some(d.to_path_buf());
        }
        dir = d.parent();
    }
    None
}

/// Loads the project rooted at the first ancestor of the current directory
/// containing a manifest, standing up a [`SourceManager`] rooted at the
/// configured cache directory.
pub async fn load() -> Result<Project, Error> {
    let cwd = std::env::current_dir()?;
    let root = find_root(&cwd).ok_or_else(|| Error::NoManifest(cwd.clone()))?;

    let manifest = manifest::toml::read_manifest(&root.join(manifest::MANIFEST_FILENAME))?;
    let lock_path = root.join(manifest::LOCK_FILENAME);
    let lock = if lock_path.is_file() { Some(manifest::toml::read_lock(&lock_path)?) } else { None };

    let config = config::Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not load configuration, falling back to defaults");
        config::Config::default()
    });
    let cache_root = config::resolve_cache_root(&config)?;

    let manager = Arc::new(SourceManager::new(cache_root)?);
    manager.clone().install_signal_handler().await;

    Ok(Project { root, manifest, lock, manager })
}
