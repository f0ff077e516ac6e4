//! The lock: a reproducible snapshot of chosen versions and content digests.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use version::Version;

use crate::{ContentDigest, ProjectRoot, Source};

/// One project's pinned selection, as recorded by a solve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedProject {
    /// The project's identity.
    pub root: ProjectRoot,
    /// The source it was fetched from, if not the default for its root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    /// The paired version this project was fetched at.
    pub version: Version,
    /// The subpackage paths required by the solved graph.
    pub packages: BTreeSet<String>,
    /// The content digest of the pruned vendor tree for this project, or
    /// `None` for a legacy lock recorded before digests existed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<ContentDigest>,
}

/// Solve provenance recorded alongside a lock's project list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolveMeta {
    /// The analyzer's name, for forward-compatible diagnostics.
    pub analyzer_name: String,
    /// The analyzer's version, part of the input digest.
    pub analyzer_version: String,
    /// The solver's name.
    pub solver_name: String,
    /// The solver's version.
    pub solver_version: String,
    /// The input digest this lock was produced against -- the fast-path check.
    pub inputs_digest: String,
}

/// The ordered set of every transitive dependency's pinned selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    /// Every locked project, typically kept sorted by root for deterministic output.
    pub projects: Vec<LockedProject>,
    /// Solve provenance, including the fast-path input digest.
    pub solve_meta: SolveMeta,
}

impl Lock {
    /// Looks up a locked project by root.
    pub fn project(&self, root: &ProjectRoot) -> Option<&LockedProject> {
        self.projects.iter().find(|p| &p.root == root)
    }

    /// `true` iff this lock's recorded input digest matches `digest` -- the
    /// fast-path short-circuit that skips a full solve.
    pub fn matches_input_digest(&self, digest: &str) -> bool {
        self.solve_meta.inputs_digest == digest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_project_by_root() {
        let root = ProjectRoot::new("example.com/a");
        let lock = Lock {
            projects: vec![LockedProject {
                root: root.clone(),
                source: None,
                version: Version::Tag("v1.0.0".into()),
                packages: BTreeSet::new(),
                digest: None,
            }],
            solve_meta: SolveMeta {
                analyzer_name: "analyzer".into(),
                analyzer_version: "1".into(),
                solver_name: "solver".into(),
                solver_version: "1".into(),
                inputs_digest: "abc".into(),
            },
        };
        assert!(lock.project(&root).is_some());
        assert!(lock.matches_input_digest("abc"));
        assert!(!lock.matches_input_digest("xyz"));
    }
}
