//! # Package-Tree Analyzer
//!
//! Walks a source tree and extracts, per directory, the declared package
//! name and the set of import paths it references. Built on top of that:
//! a reachability computation answering "what external import paths does
//! this subpackage pull in, transitively, through the rest of the tree".
//!
//! ## Source format
//!
//! The analyzer recognizes files with the [`SOURCE_EXTENSION`] extension.
//! Within a file it looks for exactly two constructs, read line by line
//! (no token-level sensitivity beyond this crate needs):
//!
//! - a `package <name>` clause, once per file
//! - `import "<path>"` lines, or an `import ( ... )` block containing one
//!   quoted path per line
//!
//! A file whose base name ends in `_test` (before the extension) is a
//! test file; its imports are tracked separately in
//! [`PackageInfo::test_imports`].
//!
//! This is intentionally a minimal recognizer, not a full-language parser:
//! the analyzer's job stops at import-path extraction, so that is all it
//! implements.

mod parse;
mod reachability;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use reachability::{ReachabilityOptions, flatten, flatten_with, reachable};

/// The extension recognized as a source file.
pub const SOURCE_EXTENSION: &str = "src";

/// The directory name that is always excluded from analysis, regardless of depth.
pub const NESTED_VENDOR_DIR: &str = "vendor";

/// The package name an entrypoint (executable) declares.
pub const MAIN_PACKAGE: &str = "main";

/// This crate's version, folded into the solver's input digest so a change
/// to how import paths are extracted invalidates every existing lock's fast path.
pub const ANALYZER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A path relative to the project root, using forward slashes.
pub type RelPath = String;

/// An import path as written in source: either a standard-library path or
/// a project-rooted path naming another project or one of its subpackages.
pub type ImportPath = String;

/// The declared contents of one subpackage directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackageInfo {
    /// The package name every source file in this directory declared (uniform by construction).
    pub name: String,
    /// Import paths referenced by non-test source.
    pub imports: std::collections::BTreeSet<ImportPath>,
    /// Import paths referenced only by test source.
    pub test_imports: std::collections::BTreeSet<ImportPath>,
    /// Whether this subpackage declares an entrypoint (`package main`).
    pub is_main: bool,
}

/// The outcome of analyzing one subpackage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOutcome {
    /// Source was found and parsed cleanly.
    Ok(PackageInfo),
    /// The directory has no recognized source files.
    NoSource,
    /// Source was found but could not be parsed, or mixed package names were found.
    ParseError(String),
}

/// Errors encountered while walking the tree itself (not per-package parse errors,
/// which are captured as [`PackageOutcome::ParseError`] instead).
#[derive(Error, Debug)]
pub enum Error {
    /// The root directory could not be walked.
    #[error("could not walk {path}: {source}")]
    Walk {
        /// The directory that failed to walk.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: walkdir::Error,
    },
}

/// Walks `root`, returning every subpackage directory's analysis result keyed
/// by its path relative to `root` (the empty string names `root` itself).
///
/// Directories named [`NESTED_VENDOR_DIR`] are skipped at any depth, per the
/// always-applied `NestedVendorDirs` prune rule.
pub fn analyze(root: &Path) -> Result<BTreeMap<RelPath, PackageOutcome>, Error> {
    let mut by_dir: BTreeMap<RelPath, Vec<PathBuf>> = BTreeMap::new();

    let walker = walkdir::WalkDir::new(root).into_iter().filter_entry(|e| {
        e.file_type().is_file() || e.file_name() != NESTED_VENDOR_DIR
    });

    for entry in walker {
        let entry = entry.map_err(|source| Error::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(SOURCE_EXTENSION) {
            continue;
        }
        let dir = path.parent().unwrap_or(root);
        let rel = rel_slash(root, dir);
        by_dir.entry(rel).or_default().push(path.to_path_buf());
    }

    let mut results = BTreeMap::new();
    for (rel, files) in by_dir {
        let outcome = parse::analyze_dir(&files);
        results.insert(rel, outcome);
    }
    Ok(results)
}

fn rel_slash(root: &Path, dir: &Path) -> RelPath {
    let rel = dir.strip_prefix(root).unwrap_or(dir);
    if rel.as_os_str().is_empty() {
        return String::new();
    }
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// `true` iff `import_path`'s first path segment contains no dot -- the rule
/// this analyzer uses to recognize a standard-library import.
pub fn is_standard(import_path: &str) -> bool {
    let first = import_path.split('/').next().unwrap_or(import_path);
    !first.contains('.')
}

/// `true` iff `base` (a file stem, without extension) names a test file.
pub fn is_test_file(base: &str) -> bool {
    base.ends_with("_test")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn standard_library_rule() {
        assert!(is_standard("net/http"));
        assert!(!is_standard("github.com/foo/bar"));
    }

    #[test]
    fn walks_and_skips_nested_vendor() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("main.src"),
            "package main\nimport \"github.com/a/b\"\n",
        )
        .unwrap();
        let nested = dir.path().join("vendor/other");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("ignored.src"), "package ignored\n").unwrap();

        let results = analyze(dir.path()).unwrap();
        assert_eq!(results.len(), 1);
        match &results[""] {
            PackageOutcome::Ok(info) => {
                assert_eq!(info.name, "main");
                assert!(info.is_main);
                assert!(info.imports.contains("github.com/a/b"));
            },
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn mixed_package_names_is_a_parse_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.src"), "package foo\n").unwrap();
        fs::write(dir.path().join("b.src"), "package bar\n").unwrap();

        let results = analyze(dir.path()).unwrap();
        assert!(matches!(results[""], PackageOutcome::ParseError(_)));
    }

    #[test]
    fn test_only_imports_are_kept_separate() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("lib.src"),
            "package lib\nimport \"github.com/a/b\"\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("lib_test.src"),
            "package lib\nimport \"github.com/only/in-tests\"\n",
        )
        .unwrap();

        let results = analyze(dir.path()).unwrap();
        match &results[""] {
            PackageOutcome::Ok(info) => {
                assert!(info.imports.contains("github.com/a/b"));
                assert!(!info.imports.contains("github.com/only/in-tests"));
                assert!(info.test_imports.contains("github.com/only/in-tests"));
            },
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
