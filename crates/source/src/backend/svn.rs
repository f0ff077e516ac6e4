//! # Subversion Dialect
//!
//! The centralized-history dialect: "versions" are branch/tag directory
//! names under the conventional `trunk`/`branches`/`tags` layout,
//! "revisions" are global revision numbers. Like [`super::hg`], no crate
//! in the corpus speaks Subversion's
//! wire protocol, so this dialect shells out to an injected
//! [`SvnExecutor`].

use std::path::{Path, PathBuf};
use std::process::Output;

use thiserror::Error;
use version::{RevisionId, Version};

use super::PackageTree;

/// Runs `svn` subprocess invocations on behalf of [`SvnSource`].
pub trait SvnExecutor: Send + Sync {
    /// Runs `svn` with `args` in `cwd`, returning its captured output.
    fn run(&self, cwd: &Path, args: &[&str]) -> std::io::Result<Output>;
}

/// Shells out to the real `svn` binary on `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSvn;

impl SvnExecutor for SystemSvn {
    fn run(&self, cwd: &Path, args: &[&str]) -> std::io::Result<Output> {
        std::process::Command::new("svn").args(args).current_dir(cwd).output()
    }
}

/// An error from the Subversion dialect.
#[derive(Error, Debug)]
pub enum Error {
    /// Launching the `svn` process failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// `svn` exited non-zero.
    #[error("svn {args} failed: {stderr}")]
    CommandFailed {
        /// The subcommand invoked, for diagnostics.
        args: String,
        /// `svn`'s captured stderr.
        stderr: String,
    },
    /// The repository does not follow the `trunk`/`branches`/`tags` convention.
    #[error("`{0}` does not have a trunk/branches/tags layout")]
    NonStandardLayout(String),
    /// The requested version is neither `trunk` nor a known branch/tag directory.
    #[error("version `{0}` not found")]
    VersionNotFound(String),
    /// The package-tree analyzer failed on the exported source.
    #[error(transparent)]
    Analyzer(#[from] analyzer::Error),
}

/// An svn-dialect source: a repository URL following the
/// `trunk`/`branches`/`tags` convention, checked out under `checkout_dir`.
pub struct SvnSource<E: SvnExecutor = SystemSvn> {
    url: url::Url,
    checkout_dir: PathBuf,
    executor: E,
}

impl SvnSource<SystemSvn> {
    /// Binds a repository URL to the local checkout directory the manager
    /// has assigned it, using the real `svn` binary.
    pub fn new(url: url::Url, checkout_dir: PathBuf) -> Self {
        SvnSource {
            url,
            checkout_dir,
            executor: SystemSvn,
        }
    }
}

impl<E: SvnExecutor> SvnSource<E> {
    /// Binds a repository URL to a local checkout directory with a caller-supplied executor.
    pub fn with_executor(url: url::Url, checkout_dir: PathBuf, executor: E) -> Self {
        SvnSource {
            url,
            checkout_dir,
            executor,
        }
    }

    fn branch_url(&self, version: &Version) -> Result<String, Error> {
        match version.unpair() {
            Version::Branch(name) if name == "trunk" => Ok(format!("{}/trunk", self.url)),
            Version::Branch(name) => Ok(format!("{}/branches/{name}", self.url)),
            Version::Tag(name) => Ok(format!("{}/tags/{name}", self.url)),
            other => Err(Error::VersionNotFound(other.to_string())),
        }
    }

    fn checked_out(&self) -> bool {
        self.checkout_dir.join(".svn").is_dir()
    }
}

impl<E: SvnExecutor> super::Source for SvnSource<E> {
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

impl<E: SvnExecutor> SvnSource<E> {
    fn sync_impl(&self) -> Result<(), Error> {
        if self.checked_out() {
            let output = self.executor.run(&self.checkout_dir, &["update"])?;
            if !output.status.success() {
                return Err(Error::CommandFailed {
                    args: "update".into(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                });
            }
            return Ok(());
        }

        std::fs::create_dir_all(&self.checkout_dir)?;
        let trunk = format!("{}/trunk", self.url);
        let output = self.executor.run(
            self.checkout_dir.parent().unwrap_or(Path::new(".")),
            &["checkout", &trunk, self.checkout_dir.to_str().unwrap_or_default()],
        )?;
        if !output.status.success() {
            return Err(Error::CommandFailed {
                args: "checkout".into(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }

    fn list_versions_impl(&self) -> Result<Vec<Version>, Error> {
        let mut versions = vec![Version::Branch("trunk".to_string())];

        for (subdir, wrap) in [("branches", Version::Branch as fn(String) -> Version), ("tags", Version::Tag as fn(String) -> Version)] {
            let url = format!("{}/{subdir}", self.url);
            let output = self.executor.run(&self.checkout_dir, &["list", &url]);
            let Ok(output) = output else { continue };
            if !output.status.success() {
                continue;
            }
            for line in String::from_utf8_lossy(&output.stdout).lines() {
                let name = line.trim_end_matches('/').trim();
                if !name.is_empty() {
                    versions.push(wrap(name.to_string()));
                }
            }
        }

        Ok(versions)
    }

    fn revision_present_impl(&self, revision: &RevisionId) -> Result<bool, Error> {
        let output = self
            .executor
            .run(&self.checkout_dir, &["info", "-r", revision.as_str(), self.url.as_str()])?;
        Ok(output.status.success())
    }

    fn list_packages_at_impl(&self, version: &Version) -> Result<PackageTree, Error> {
        let export_dir = tempfile::tempdir()?;
        self.export_at_impl(version, export_dir.path())?;
        Ok(analyzer::analyze(export_dir.path())?)
    }

    fn export_at_impl(&self, version: &Version, destination: &Path) -> Result<(), Error> {
        let source_url = self.branch_url(version)?;
        let mut args = vec!["export", "--force", source_url.as_str()];
        let dest = destination.to_str().unwrap_or_default();
        args.push(dest);
        let output = self.executor.run(&self.checkout_dir, &args)?;
        if !output.status.success() {
            return Err(Error::CommandFailed {
                args: "export".into(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }
}
