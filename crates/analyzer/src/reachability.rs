//! Fixed-point reachability over a project's internal subpackage graph.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::{ImportPath, PackageInfo, PackageOutcome, RelPath};

/// Parameters controlling which edges reachability follows.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReachabilityOptions<'a> {
    /// Follow edges discovered only in test source.
    pub include_tests: bool,
    /// Include subpackages that only declare an entrypoint.
    pub include_main: bool,
    /// When following test imports, also follow *their* transitive non-test imports.
    pub include_test_only_deps: bool,
    /// Import paths to drop wherever encountered, without following them.
    pub ignored: Option<&'a BTreeSet<ImportPath>>,
}

/// For every clean subpackage in `tree`, the set of external import paths
/// transitively reachable from it, given `import_root` (the prefix under
/// which `tree`'s own subpackages live) and `opts`.
///
/// Subpackages that are [`PackageOutcome::NoSource`] or
/// [`PackageOutcome::ParseError`] contribute no imports of their own but
/// are still valid edge targets for an importer -- only the requesting
/// subpackage's cleanliness matters for whether it appears in the result
/// map.
pub fn reachable(
    tree: &BTreeMap<RelPath, PackageOutcome>,
    import_root: &str,
    opts: ReachabilityOptions<'_>,
) -> BTreeMap<RelPath, BTreeSet<ImportPath>> {
    let mut out = BTreeMap::new();
    for (path, outcome) in tree {
        if let PackageOutcome::Ok(info) = outcome {
            if info.is_main && !opts.include_main {
                continue;
            }
            let mut visited = HashSet::new();
            let mut external = BTreeSet::new();
            walk(
                path,
                tree,
                import_root,
                opts,
                opts.include_tests,
                &mut visited,
                &mut external,
            );
            out.insert(path.clone(), external);
        }
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn walk(
    path: &RelPath,
    tree: &BTreeMap<RelPath, PackageOutcome>,
    import_root: &str,
    opts: ReachabilityOptions<'_>,
    use_test_imports_here: bool,
    visited: &mut HashSet<RelPath>,
    external: &mut BTreeSet<ImportPath>,
) {
    if !visited.insert(path.clone()) {
        return;
    }
    let Some(PackageOutcome::Ok(info)) = tree.get(path) else {
        return;
    };

    let imports: Box<dyn Iterator<Item = &ImportPath>> = if use_test_imports_here {
        Box::new(info.imports.iter().chain(info.test_imports.iter()))
    } else {
        Box::new(info.imports.iter())
    };

    for import in imports {
        if opts.ignored.is_some_and(|ign| ign.contains(import)) {
            continue;
        }
        match internal_target(import, import_root, tree) {
            Some(target) => walk(
                &target,
                tree,
                import_root,
                opts,
                opts.include_test_only_deps,
                visited,
                external,
            ),
            None => {
                external.insert(import.clone());
            },
        }
    }
}

/// If `import` names a subpackage of this same project, return its relative path.
fn internal_target(
    import: &str,
    import_root: &str,
    tree: &BTreeMap<RelPath, PackageOutcome>,
) -> Option<RelPath> {
    let candidate = if import == import_root {
        String::new()
    } else {
        import.strip_prefix(import_root)?.strip_prefix('/')?.to_string()
    };
    tree.contains_key(&candidate).then_some(candidate)
}

/// The union of every subpackage's reachable set.
pub fn flatten(reachable: &BTreeMap<RelPath, BTreeSet<ImportPath>>) -> BTreeSet<ImportPath> {
    reachable.values().flatten().cloned().collect()
}

/// Like [`flatten`], but drops any import path for which `predicate` returns `true`
/// -- used to exclude standard-library paths via [`crate::is_standard`].
pub fn flatten_with(
    reachable: &BTreeMap<RelPath, BTreeSet<ImportPath>>,
    predicate: impl Fn(&str) -> bool,
) -> BTreeSet<ImportPath> {
    reachable
        .values()
        .flatten()
        .filter(|import| !predicate(import))
        .cloned()
        .collect()
}
