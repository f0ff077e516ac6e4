//! # Mercurial Dialect
//!
//! The second distributed-history dialect. No Mercurial crate exists to
//! link natively, so this dialect shells out to an injected [`HgExecutor`]
//! rather than linking a native library.
//!
//! Revisions are 12-or-40-hex changeset hashes; tags are commits in
//! Mercurial's own history (a `.hgtags` file), so there is nothing to peel
//! the way an annotated git tag object needs peeling.

use std::path::{Path, PathBuf};
use std::process::Output;

use thiserror::Error;
use version::{RevisionId, Version};

use super::PackageTree;

/// Runs `hg` subprocess invocations on behalf of [`HgSource`].
///
/// Exists as a trait so tests can substitute a fake without shelling out,
/// the same injected-collaborator pattern used at every external
/// boundary here.
pub trait HgExecutor: Send + Sync {
    /// Runs `hg` with `args` in `cwd`, returning its captured output.
    fn run(&self, cwd: &Path, args: &[&str]) -> std::io::Result<Output>;
}

/// Shells out to the real `hg` binary on `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHg;

impl HgExecutor for SystemHg {
    fn run(&self, cwd: &Path, args: &[&str]) -> std::io::Result<Output> {
        std::process::Command::new("hg").args(args).current_dir(cwd).output()
    }
}

/// An error from the Mercurial dialect.
#[derive(Error, Debug)]
pub enum Error {
    /// Launching the `hg` process failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// `hg` exited non-zero.
    #[error("hg {args} failed: {stderr}")]
    CommandFailed {
        /// The subcommand invoked, for diagnostics.
        args: String,
        /// `hg`'s captured stderr.
        stderr: String,
    },
    /// `hg`'s output was not the format this dialect expects.
    #[error("unexpected hg output for {context}")]
    UnexpectedOutput {
        /// What the dialect was parsing when it failed.
        context: &'static str,
    },
    /// The requested revision does not exist locally or upstream.
    #[error("revision `{0}` not found")]
    RevisionNotFound(String),
    /// The package-tree analyzer failed on the exported source.
    #[error(transparent)]
    Analyzer(#[from] analyzer::Error),
}

/// A Mercurial-dialect source: a remote URL backed by a local clone.
pub struct HgSource<E: HgExecutor = SystemHg> {
    url: url::Url,
    clone_dir: PathBuf,
    executor: E,
}

impl HgSource<SystemHg> {
    /// Binds a remote URL to the local clone directory the manager has
    /// assigned it, using the real `hg` binary.
    pub fn new(url: url::Url, clone_dir: PathBuf) -> Self {
        HgSource {
            url,
            clone_dir,
            executor: SystemHg,
        }
    }
}

impl<E: HgExecutor> HgSource<E> {
    /// Binds a remote URL to a local clone directory with a caller-supplied executor.
    pub fn with_executor(url: url::Url, clone_dir: PathBuf, executor: E) -> Self {
        HgSource {
            url,
            clone_dir,
            executor,
        }
    }

    fn run(&self, args: &[&str]) -> Result<Output, Error> {
        let output = self.executor.run(&self.clone_dir, args)?;
        if !output.status.success() {
            return Err(Error::CommandFailed {
                args: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(output)
    }

    fn cloned(&self) -> bool {
        self.clone_dir.join(".hg").is_dir()
    }
}

impl<E: HgExecutor> super::Source for HgSource<E> {
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

impl<E: HgExecutor> HgSource<E> {
    fn sync_impl(&self) -> Result<(), Error> {
        if self.cloned() {
            self.run(&["pull"])?;
        } else {
            std::fs::create_dir_all(&self.clone_dir)?;
            self.executor
                .run(
                    self.clone_dir.parent().unwrap_or(Path::new(".")),
                    &["clone", self.url.as_str(), self.clone_dir.to_str().unwrap_or_default()],
                )
                .map_err(Error::Io)
                .and_then(|out| {
                    if out.status.success() {
                        Ok(())
                    } else {
                        Err(Error::CommandFailed {
                            args: "clone".into(),
                            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
                        })
                    }
                })?;
        }
        Ok(())
    }

    fn list_versions_impl(&self) -> Result<Vec<Version>, Error> {
        let mut versions = Vec::new();

        let branches = self.run(&["branches", "--template", "{branch} {node}\n"])?;
        for line in String::from_utf8_lossy(&branches.stdout).lines() {
            let Some((name, node)) = line.rsplit_once(' ') else {
                continue;
            };
            let revision = RevisionId::new(node.to_string())
                .map_err(|_| Error::UnexpectedOutput { context: "branches" })?;
            versions.push(Version::pair(Version::Branch(name.to_string()), revision));
        }

        let tags = self.run(&["tags", "--template", "{tag} {node}\n"])?;
        for line in String::from_utf8_lossy(&tags.stdout).lines() {
            let Some((name, node)) = line.rsplit_once(' ') else {
                continue;
            };
            if name == "tip" {
                continue;
            }
            let revision =
                RevisionId::new(node.to_string()).map_err(|_| Error::UnexpectedOutput { context: "tags" })?;
            versions.push(Version::pair(Version::Tag(name.to_string()), revision));
        }

        Ok(versions)
    }

    fn revision_present_impl(&self, revision: &RevisionId) -> Result<bool, Error> {
        Ok(self.run(&["log", "-r", revision.as_str(), "--template", "{node}"]).is_ok())
    }

    fn list_packages_at_impl(&self, version: &Version) -> Result<PackageTree, Error> {
        let export_dir = tempfile::tempdir()?;
        self.export_at_impl(version, export_dir.path())?;
        Ok(analyzer::analyze(export_dir.path())?)
    }

    fn export_at_impl(&self, version: &Version, destination: &Path) -> Result<(), Error> {
        let revision = version
            .revision()
            .ok_or_else(|| Error::RevisionNotFound(version.to_string()))?;
        self.run(&[
            "archive",
            "--rev",
            revision.as_str(),
            destination.to_str().unwrap_or_default(),
        ])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;
    use std::sync::Mutex;

    use super::*;

    struct FakeHg {
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl HgExecutor for FakeHg {
        fn run(&self, _cwd: &Path, args: &[&str]) -> std::io::Result<Output> {
            self.calls
                .lock()
                .unwrap()
                .push(args.iter().map(|s| s.to_string()).collect());
            let stdout = match args.first() {
                Some(&"branches") => b"default cafebabecafebabecafebabecafebabecafebabe\n".to_vec(),
                Some(&"tags") => b"v1.0.0 deadbeefdeadbeefdeadbeefdeadbeefdeadbeef\ntip 0000000000000000000000000000000000000000\n".to_vec(),
                _ => Vec::new(),
            };
            Ok(Output {
                status: ExitStatus::from_raw(0),
                stdout,
                stderr: Vec::new(),
            })
        }
    }

    #[test]
    fn lists_branches_and_tags_excluding_tip() {
        let source = HgSource::with_executor(
            url::Url::parse("https://example.com/repo").unwrap(),
            PathBuf::from("/nonexistent"),
            FakeHg { calls: Mutex::new(Vec::new()) },
        );
        let versions = source.list_versions().unwrap();
        assert_eq!(versions.len(), 2);
        assert!(versions.iter().any(|v| v.is_branch()));
        assert!(versions.iter().any(|v| v.is_tag()));
    }
}
