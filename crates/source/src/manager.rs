//! # Source Manager
//!
//! The single point every caller goes through to reach a [`Source`]: it
//! picks a dialect by URL, coalesces concurrent callers per
//! `(source, operation)` key, keeps two cache tiers (in-memory and
//! on-disk), and serializes writers to the on-disk cache with advisory
//! file locks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs4::FileExt;
use futures::FutureExt;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use version::{RevisionId, Version};

use crate::backend::git::GitSource;
use crate::backend::hg::HgSource;
use crate::backend::svn::SvnSource;
use crate::backend::{self, Dialect, PackageTree, Source};

/// An error from the manager itself, or passed through from a backend.
#[derive(Error, Debug)]
pub enum Error {
    /// A backend operation failed.
    #[error(transparent)]
    Backend(#[from] backend::Error),
    /// The manager has been shut down; it fails new work fast rather than
    /// racing in-flight operations against process exit.
    #[error("cache-closed: source manager is shutting down")]
    CacheClosed,
    /// The on-disk cache directory's advisory lock could not be acquired.
    #[error("could not lock cache directory {path}: {source}")]
    Lock {
        /// The directory whose lock could not be taken.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The source URL did not match any known dialect, even after probing.
    #[error("could not determine a source dialect for `{0}`")]
    NoDialect(String),
}

/// Whether an in-memory entry might be stale relative to upstream: set on
/// construction and cleared only by a successful `sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Reflects the state as of the last successful sync.
    Fresh,
    /// A sync has not yet completed successfully for this source.
    Unknown,
}

type SharedFuture<T> = futures::future::Shared<BoxFuture<'static, Arc<Result<T, Error>>>>;

/// Coalesces concurrent callers, caches results across two tiers, and owns
/// the on-disk working-tree cache backends read and write into.
pub struct SourceManager {
    cache_root: PathBuf,
    closed: CancellationToken,

    backends: AsyncMutex<HashMap<String, Arc<dyn Source>>>,
    staleness: AsyncMutex<HashMap<String, Staleness>>,

    sync_inflight: AsyncMutex<HashMap<String, SharedFuture<()>>>,
    versions_inflight: AsyncMutex<HashMap<String, SharedFuture<Vec<Version>>>>,
    versions_cache: AsyncMutex<HashMap<String, Vec<Version>>>,
    packages_inflight: AsyncMutex<HashMap<(String, String), SharedFuture<PackageTree>>>,
    packages_cache: AsyncMutex<HashMap<(String, String), PackageTree>>,
}

impl SourceManager {
    /// Builds a manager rooted at `cache_root`, creating it if necessary.
    pub fn new(cache_root: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&cache_root)?;
        Ok(SourceManager {
            cache_root,
            closed: CancellationToken::new(),
            backends: AsyncMutex::new(HashMap::new()),
            staleness: AsyncMutex::new(HashMap::new()),
            sync_inflight: AsyncMutex::new(HashMap::new()),
            versions_inflight: AsyncMutex::new(HashMap::new()),
            versions_cache: AsyncMutex::new(HashMap::new()),
            packages_inflight: AsyncMutex::new(HashMap::new()),
            packages_cache: AsyncMutex::new(HashMap::new()),
        })
    }

    /// Installs this manager's termination handler: on `SIGINT`/`SIGTERM`,
    /// in-flight work is left to finish (coalesced callers still observe a
    /// result) but no *new* operation is accepted afterward.
    pub async fn install_signal_handler(self: &Arc<Self>) {
        let closed = self.closed.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down source manager, draining in-flight work");
            closed.cancel();
        });
    }

    /// `true` once [`Self::install_signal_handler`]'s signal has fired.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    fn fail_fast_if_closed(&self) -> Result<(), Error> {
        if self.is_closed() { Err(Error::CacheClosed) } else { Ok(()) }
    }

    /// Fetches or updates the local cache for `url`, deduplicating
    /// concurrent callers for the same source. Clears the staleness flag
    /// on success and invalidates the in-memory version cache.
    pub async fn sync(&self, url: &url::Url) -> Result<(), Error> {
        self.fail_fast_if_closed()?;
        let key = encode_source(url);
        let backend = self.backend_for(url).await?;

        let fut = {
            let mut inflight = self.sync_inflight.lock().await;
            if let Some(shared) = inflight.get(&key) {
                shared.clone()
            } else {
                let cache_dir = self.cache_root.join(&key);
                let shared: SharedFuture<()> = run_locked(cache_dir, move || backend.sync())
                    .boxed()
                    .shared();
                inflight.insert(key.clone(), shared.clone());
                shared
            }
        };

        let result = fut.await;
        self.sync_inflight.lock().await.remove(&key);

        match &*result {
            Ok(()) => {
                self.staleness.lock().await.insert(key.clone(), Staleness::Fresh);
                self.versions_cache.lock().await.remove(&key);
                Ok(())
            },
            Err(_) => {
                self.staleness.lock().await.entry(key).or_insert(Staleness::Unknown);
                clone_manager_result(&result)
            },
        }
    }

    /// Lists versions, preferring the in-memory cache populated by the last
    /// successful `sync`, falling back to the backend (and coalescing
    /// concurrent misses) otherwise.
    pub async fn list_versions(&self, url: &url::Url) -> Result<Vec<Version>, Error> {
        self.fail_fast_if_closed()?;
        let key = encode_source(url);

        if let Some(versions) = self.versions_cache.lock().await.get(&key) {
            return Ok(versions.clone());
        }

        let backend = self.backend_for(url).await?;
        let fut = {
            let mut inflight = self.versions_inflight.lock().await;
            if let Some(shared) = inflight.get(&key) {
                shared.clone()
            } else {
                let cache_dir = self.cache_root.join(&key);
                let shared: SharedFuture<Vec<Version>> =
                    run_shared_locked(cache_dir, false, move || backend.list_versions())
                        .boxed()
                        .shared();
                inflight.insert(key.clone(), shared.clone());
                shared
            }
        };

        let result = fut.await;
        self.versions_inflight.lock().await.remove(&key);

        if let Ok(versions) = &*result {
            self.versions_cache.lock().await.insert(key, versions.clone());
        }
        clone_manager_result(&result)
    }

    /// Confirms a revision exists, deferring directly to the backend (this
    /// is cheap enough that coalescing it is not worth the bookkeeping).
    pub async fn revision_present(&self, url: &url::Url, revision: &RevisionId) -> Result<bool, Error> {
        self.fail_fast_if_closed()?;
        let backend = self.backend_for(url).await?;
        let revision = revision.clone();
        Ok(tokio::task::spawn_blocking(move || backend.revision_present(&revision))
            .await
            .expect("revision_present task panicked")?)
    }

    /// Materializes the package tree at `version`, cached per `(source, version)`.
    pub async fn list_packages_at(&self, url: &url::Url, version: &Version) -> Result<PackageTree, Error> {
        self.fail_fast_if_closed()?;
        let key = (encode_source(url), version.to_string());

        if let Some(tree) = self.packages_cache.lock().await.get(&key) {
            return Ok(tree.clone());
        }

        let backend = self.backend_for(url).await?;
        let fut = {
            let mut inflight = self.packages_inflight.lock().await;
            if let Some(shared) = inflight.get(&key) {
                shared.clone()
            } else {
                let version = version.clone();
                let shared: SharedFuture<PackageTree> = async move {
                    Arc::new(
                        tokio::task::spawn_blocking(move || backend.list_packages_at(&version))
                            .await
                            .expect("list_packages_at task panicked")
                            .map_err(Error::from),
                    )
                }
                .boxed()
                .shared();
                inflight.insert(key.clone(), shared.clone());
                shared
            }
        };

        let result = fut.await;
        self.packages_inflight.lock().await.remove(&key);

        if let Ok(tree) = &*result {
            self.packages_cache.lock().await.insert(key, tree.clone());
        }
        clone_manager_result(&result)
    }

    /// Writes the source tree at `version` into `destination`. Atomic: a
    /// failed export leaves no partial tree, since the backend is required
    /// to write into an empty directory and the manager removes it on error.
    pub async fn export_at(&self, url: &url::Url, version: &Version, destination: &Path) -> Result<(), Error> {
        self.fail_fast_if_closed()?;
        std::fs::create_dir_all(destination).map_err(|source| Error::Lock {
            path: destination.to_path_buf(),
            source,
        })?;

        let backend = self.backend_for(url).await?;
        let cache_dir = self.cache_root.join(encode_source(url));
        let version = version.clone();
        let destination = destination.to_path_buf();
        let dest_for_cleanup = destination.clone();

        let result = run_locked(cache_dir, move || backend.export_at(&version, &destination)).await;

        if result.is_err() {
            let _ = std::fs::remove_dir_all(&dest_for_cleanup);
        }
        clone_manager_result(&result)
    }

    /// Registers a pre-built backend for `url`, bypassing dialect dispatch.
    ///
    /// Exists so tests (and embedders with an unusual transport) can wire up
    /// a [`backend::fixture::FixtureSource`] or other hand-built [`Source`]
    /// without going through [`Dialect::from_scheme`]/probing.
    pub async fn register(&self, url: &url::Url, backend: Arc<dyn Source>) {
        self.backends.lock().await.insert(encode_source(url), backend);
    }

    async fn backend_for(&self, url: &url::Url) -> Result<Arc<dyn Source>, Error> {
        let key = encode_source(url);
        if let Some(existing) = self.backends.lock().await.get(&key) {
            return Ok(existing.clone());
        }

        // A schemeless URL has no unambiguous marker, so the first guess in
        // probe order is taken as the dialect; a wrong guess then surfaces
        // as an ordinary sync failure from that dialect rather than as a
        // dialect-selection error, which keeps this fallback simple at the
        // cost of a less specific error message in the misdiagnosed case.
        let dialect = Dialect::from_scheme(url)
            .or_else(|| Dialect::probe_order().first().copied())
            .ok_or_else(|| Error::NoDialect(url.to_string()))?;

        let mirror = self.cache_root.join(&key);
        let backend: Arc<dyn Source> = match dialect {
            Dialect::Git => Arc::new(GitSource::new(url.clone(), mirror)),
            Dialect::Hg => Arc::new(HgSource::new(url.clone(), mirror)),
            Dialect::Svn => Arc::new(SvnSource::new(url.clone(), mirror)),
        };

        self.backends.lock().await.insert(key, backend.clone());
        Ok(backend)
    }
}

fn clone_manager_result<T: Clone>(result: &Result<T, Error>) -> Result<T, Error> {
    match result {
        Ok(value) => Ok(value.clone()),
        Err(Error::Backend(e)) => Err(Error::Backend(clone_backend_error(e))),
        Err(Error::CacheClosed) => Err(Error::CacheClosed),
        Err(Error::NoDialect(s)) => Err(Error::NoDialect(s.clone())),
        Err(Error::Lock { path, source }) => Err(Error::Lock {
            path: path.clone(),
            source: std::io::Error::new(source.kind(), source.to_string()),
        }),
    }
}

/// `backend::Error` is not `Clone` (it wraps foreign error types that
/// aren't), so a coalesced failure is re-described as a string rather than
/// carried structurally to every waiter.
fn clone_backend_error(e: &backend::Error) -> backend::Error {
    backend::Error::NoDialect(e.to_string())
}

async fn run_locked<T, F>(cache_dir: PathBuf, work: F) -> Arc<Result<T, Error>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, backend::Error> + Send + 'static,
{
    run_shared_locked(cache_dir, true, work).await
}

/// Runs `work` on a blocking thread, holding an advisory lock on
/// `cache_dir` for its duration: exclusive for a write (`sync`/`export_at`),
/// shared for a read (`list_versions`). The lock-acquisition order is
/// always "this source's cache directory first", which keeps the manager
/// deadlock-free since no operation ever takes a second directory's lock
/// while holding one.
async fn run_shared_locked<T, F>(cache_dir: PathBuf, exclusive: bool, work: F) -> Arc<Result<T, Error>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, backend::Error> + Send + 'static,
{
    let outcome = tokio::task::spawn_blocking(move || -> Result<T, Error> {
        std::fs::create_dir_all(&cache_dir).map_err(|source| Error::Lock {
            path: cache_dir.clone(),
            source,
        })?;
        let lock_path = cache_dir.join(".lock");
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .map_err(|source| Error::Lock {
                path: lock_path.clone(),
                source,
            })?;

        if exclusive {
            lock_file.lock_exclusive()
        } else {
            lock_file.lock_shared()
        }
        .map_err(|source| Error::Lock {
            path: lock_path.clone(),
            source,
        })?;

        let result = work().map_err(Error::from);
        let _ = FileExt::unlock(&lock_file);
        result
    })
    .await
    .expect("source manager blocking task panicked");

    Arc::new(outcome)
}

/// A filesystem-safe, collision-resistant encoding of a source URL, used
/// both as the on-disk cache directory name and as the single-flight key.
fn encode_source(url: &url::Url) -> String {
    blake3::hash(url.as_str().as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use tempfile::tempdir;
    use version::RevisionId;

    use super::*;
    use crate::backend;

    /// A hand-built [`Source`] (not [`backend::fixture::FixtureSource`]) that
    /// counts calls and sleeps briefly, so concurrent callers have a real
    /// window to either coalesce onto one in-flight call or race a second one.
    struct CountingSource {
        calls: AtomicU32,
    }

    impl Source for CountingSource {
        fn sync(&self) -> Result<(), backend::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            Ok(())
        }

        fn list_versions(&self) -> Result<Vec<Version>, backend::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            Ok(vec![Version::Tag("v1.0.0".into())])
        }

        fn revision_present(&self, _revision: &RevisionId) -> Result<bool, backend::Error> {
            Ok(true)
        }

        fn list_packages_at(&self, _version: &Version) -> Result<PackageTree, backend::Error> {
            Ok(PackageTree::new())
        }

        fn export_at(&self, _version: &Version, _destination: &Path) -> Result<(), backend::Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn concurrent_list_versions_calls_coalesce_to_one_backend_call() {
        let dir = tempdir().unwrap();
        let manager = SourceManager::new(dir.path().to_path_buf()).unwrap();
        let url = url::Url::parse("https://example.com/coalesce-test").unwrap();
        let source = Arc::new(CountingSource { calls: AtomicU32::new(0) });
        manager.register(&url, source.clone()).await;

        let (a, b, c) = tokio::join!(
            manager.list_versions(&url),
            manager.list_versions(&url),
            manager.list_versions(&url),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1, "expected exactly one backend call");
    }

    #[tokio::test]
    async fn second_list_versions_call_is_served_from_in_memory_cache() {
        let dir = tempdir().unwrap();
        let manager = SourceManager::new(dir.path().to_path_buf()).unwrap();
        let url = url::Url::parse("https://example.com/cache-test").unwrap();
        let source = Arc::new(CountingSource { calls: AtomicU32::new(0) });
        manager.register(&url, source.clone()).await;

        manager.list_versions(&url).await.unwrap();
        manager.list_versions(&url).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sync_invalidates_the_version_cache() {
        let dir = tempdir().unwrap();
        let manager = SourceManager::new(dir.path().to_path_buf()).unwrap();
        let url = url::Url::parse("https://example.com/invalidate-test").unwrap();
        let source = Arc::new(CountingSource { calls: AtomicU32::new(0) });
        manager.register(&url, source.clone()).await;

        manager.list_versions(&url).await.unwrap();
        manager.sync(&url).await.unwrap();
        manager.list_versions(&url).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 3, "sync must drop the cached version list");
    }

    #[tokio::test]
    async fn closed_manager_fails_new_work_fast() {
        let dir = tempdir().unwrap();
        let manager = SourceManager::new(dir.path().to_path_buf()).unwrap();
        let url = url::Url::parse("https://example.com/closed-test").unwrap();
        manager.register(&url, Arc::new(CountingSource { calls: AtomicU32::new(0) })).await;

        manager.closed.cancel();
        let err = manager.list_versions(&url).await.unwrap_err();
        assert!(matches!(err, Error::CacheClosed));
    }
}
