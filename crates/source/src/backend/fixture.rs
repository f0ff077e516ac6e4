//! # Fixture Dialect
//!
//! A fourth, test-only [`Source`](super::Source) implementation that
//! serves a canned version list and package tree without touching the
//! network or a subprocess. Exists purely so the solver's, vendor
//! verifier's and writer's acceptance scenarios are exercisable
//! in-process.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use analyzer::{PackageInfo, PackageOutcome};
use version::{RevisionId, Version};

use super::PackageTree;

/// One canned version's worth of fixture data.
#[derive(Debug, Clone)]
pub struct FixtureVersion {
    /// The version this entry answers for.
    pub version: Version,
    /// The package tree `list_packages_at` returns for this version.
    pub packages: PackageTree,
}

/// A hand-built, in-memory source used only by tests.
pub struct FixtureSource {
    versions: Vec<FixtureVersion>,
    sync_calls: Mutex<u32>,
}

impl FixtureSource {
    /// Builds a fixture source with no canned versions.
    pub fn new() -> Self {
        FixtureSource {
            versions: Vec::new(),
            sync_calls: Mutex::new(0),
        }
    }

    /// Adds a canned version with a single root package declaring `imports`.
    pub fn with_root_package(mut self, version: Version, imports: &[&str]) -> Self {
        let mut info = PackageInfo::default();
        info.name = "main".to_string();
        info.is_main = true;
        info.imports = imports.iter().map(|s| s.to_string()).collect();
        let mut packages = BTreeMap::new();
        packages.insert(String::new(), PackageOutcome::Ok(info));
        self.versions.push(FixtureVersion { version, packages });
        self
    }

    /// How many times [`Source::sync`](super::Source::sync) has been called so far.
    pub fn sync_calls(&self) -> u32 {
        *self.sync_calls.lock().unwrap()
    }
}

impl Default for FixtureSource {
    fn default() -> Self {
        Self::new()
    }
}

impl super::Source for FixtureSource {
    fn sync(&self) -> Result<(), super::Error> {
        *self.sync_calls.lock().unwrap() += 1;
        Ok(())
    }

    fn list_versions(&self) -> Result<Vec<Version>, super::Error> {
        Ok(self.versions.iter().map(|v| v.version.clone()).collect())
    }

    fn revision_present(&self, revision: &RevisionId) -> Result<bool, super::Error> {
        Ok(self.versions.iter().any(|v| v.version.revision() == Some(revision)))
    }

    fn list_packages_at(&self, version: &Version) -> Result<PackageTree, super::Error> {
        self.versions
            .iter()
            .find(|v| v.version.substitutable_for(version))
            .map(|v| v.packages.clone())
            .ok_or_else(|| not_found(version))
    }

    fn export_at(&self, version: &Version, destination: &Path) -> Result<(), super::Error> {
        if !self.versions.iter().any(|v| v.version.substitutable_for(version)) {
            return Err(not_found(version));
        }
        let _ = std::fs::create_dir_all(destination);
        Ok(())
    }
}

fn not_found(version: &Version) -> super::Error {
    super::Error::NoDialect(format!("fixture has no version `{version}`"))
}

#[cfg(test)]
mod tests {
    use super::super::Source;
    use super::*;

    #[test]
    fn serves_canned_version_list_and_packages() {
        let fixture = FixtureSource::new()
            .with_root_package(Version::Tag("v1.0.0".into()), &["github.com/a/b"]);
        let versions = fixture.list_versions().unwrap();
        assert_eq!(versions, vec![Version::Tag("v1.0.0".into())]);

        let tree = fixture.list_packages_at(&Version::Tag("v1.0.0".into())).unwrap();
        match &tree[""] {
            PackageOutcome::Ok(info) => assert!(info.imports.contains("github.com/a/b")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn sync_is_idempotent_and_counted() {
        let fixture = FixtureSource::new();
        fixture.sync().unwrap();
        fixture.sync().unwrap();
        assert_eq!(fixture.sync_calls(), 2);
    }
}
