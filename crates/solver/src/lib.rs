//! # Dependency Solver
//!
//! The backtracking constraint solver: given a root package tree and a
//! manifest, produces a [`manifest::Lock`] pinning every transitively
//! reachable project to one version.
//!
//! ## Algorithm
//!
//! Atoms (project roots still needing a decision) are worked off a stack, so
//! a freshly discovered transitive dependency is explored before siblings
//! queued earlier -- depth first. For each atom, [`candidates::build`]
//! produces an ordered list of acceptable versions -- locked-version-first
//! when nothing forces a refetch, otherwise ranked by
//! [`version::sort_for_upgrade`]. The first candidate that applies cleanly
//! (its package tree loads, and -- if it carries its own manifest -- that
//! manifest's constraints don't immediately contradict anything already
//! active) is selected, and a [`state::Frame`] records exactly what that
//! choice newly introduced: atoms, required subpackages, and transitive
//! constraints.
//!
//! When every candidate for an atom is exhausted, that atom is pushed back
//! onto the stack (it still needs a decision, just not yet) and the most
//! recent frame is undone, its project's remaining candidates retried -- a
//! classic backtracking search, made cheap here because
//! [`state::SolverState`] tracks ownership by first discovery rather than
//! reference counts (see that module for why this is sound).
//!
//! A fast path skips the search altogether: if the manifest and the root
//! tree's import set haven't changed since the prior lock, and the caller
//! hasn't asked for specific projects (or everything) to be re-solved, the
//! prior lock is returned unchanged without contacting any upstream.

mod candidates;
mod state;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use manifest::{Lock, LockedProject, Manifest, ProjectRoot, RootDeducer, SolveMeta};
use source::SourceManager;
use state::{Effects, Selected, SolverState};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use version::{Constraint, Version};

/// Everything the solver needs that it cannot derive on its own.
pub struct SolveInput<'a> {
    /// The root project's own package tree, as the analyzer sees it.
    pub root_tree: &'a BTreeMap<analyzer::RelPath, analyzer::PackageOutcome>,
    /// The root project's own import-path prefix.
    pub import_root: &'a str,
    /// The root manifest: direct constraints, overrides, ignore/require sets.
    pub manifest: &'a Manifest,
    /// The previous solve's lock, if one exists.
    pub prior_lock: Option<&'a Lock>,
    /// Re-solve every atom, ignoring the prior lock's preferred versions.
    pub change_all: bool,
    /// Re-solve exactly these atoms, ignoring their prior-lock preference.
    pub to_change: &'a BTreeSet<ProjectRoot>,
    /// Each project's declared default branch, for upgrade-order tie-breaking.
    pub default_branches: &'a BTreeMap<ProjectRoot, String>,
    /// Collapses an import path to the project root that owns it.
    pub deducer: &'a dyn RootDeducer,
    /// The analyzer's version, folded into the fast-path input digest.
    pub analyzer_version: &'a str,
}

/// A project whose every candidate was rejected, and why.
#[derive(Debug, Clone)]
pub struct FailureAtom {
    /// The project that could not be resolved.
    pub project: ProjectRoot,
    /// The specific candidate that was rejected, or `None` if the
    /// constraint set ruled out every known version before any was tried.
    pub candidate: Option<Version>,
    /// Why that candidate (or the whole project) was rejected.
    pub reason: String,
}

/// Every atom that could not be resolved, from every branch the search
/// explored before giving up -- both sides of an ambiguity are reported,
/// not just whichever one was tried last.
#[derive(Debug, Clone, Default)]
pub struct FailureReport(pub Vec<FailureAtom>);

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut atoms = self.0.clone();
        atoms.sort_by(|a, b| {
            a.project
                .cmp(&b.project)
                .then_with(|| a.candidate.as_ref().map(ToString::to_string).cmp(&b.candidate.as_ref().map(ToString::to_string)))
        });
        for atom in &atoms {
            match &atom.candidate {
                Some(v) => writeln!(f, "{}: candidate {v} rejected: {}", atom.project, atom.reason)?,
                None => writeln!(f, "{}: no candidate satisfies the active constraints", atom.project)?,
            }
        }
        Ok(())
    }
}

/// An error from a solve attempt.
#[derive(Error, Debug)]
pub enum Error {
    /// No assignment of versions satisfies every constraint.
    #[error("no solution:\n{0}")]
    NoSolution(FailureReport),
    /// The caller's cancellation token fired mid-solve.
    #[error("solve cancelled")]
    Cancelled,
}

/// Runs the solve described by `input`, honoring `cancel` between atoms.
pub async fn solve(manager: &SourceManager, input: SolveInput<'_>, cancel: &CancellationToken) -> Result<Lock, Error> {
    let seed = seed_imports(&input);
    let digest = manifest::input_digest(input.manifest, &seed, input.analyzer_version);

    if let Some(lock) = input.prior_lock {
        if !input.change_all && input.to_change.is_empty() && lock.matches_input_digest(&digest) {
            tracing::info!("input digest unchanged since the last solve, reusing the existing lock");
            return Ok(lock.clone());
        }
    }

    let mut state = SolverState::new();
    for import in &seed {
        seed_atom(&mut state, input.deducer, import);
    }
    for (root, props) in &input.manifest.constraints {
        if let Some(c) = &props.constraint {
            state.add_constraint(root, c.clone());
        }
    }

    let mut failures = Vec::new();
    let mut pending_retry: Option<(ProjectRoot, VecDeque<Version>)> = None;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let (project, mut candidates) = if let Some(pair) = pending_retry.take() {
            pair
        } else {
            // A stack, not a queue: newly discovered atoms are explored before
            // siblings queued earlier, so a backtrack always unwinds the most
            // recently made decision first.
            let Some(atom) = state.atoms.pop_back() else { break };
            if state.selection.contains_key(&atom) {
                continue;
            }
            let active = state.constraints.get(&atom).cloned().unwrap_or_default();
            match candidates::build(
                manager,
                &atom,
                input.manifest,
                input.prior_lock,
                input.change_all,
                input.to_change,
                input.default_branches,
                &active,
            )
            .await
            {
                Ok(list) if !list.is_empty() => (atom, list),
                Ok(_) => {
                    failures.push(FailureAtom { project: atom, candidate: None, reason: "no candidate satisfies the active constraints".into() });
                    match state.backtrack() {
                        Some(pair) => {
                            pending_retry = Some(pair);
                            continue;
                        },
                        None => return Err(Error::NoSolution(FailureReport(failures))),
                    }
                },
                Err(e) => {
                    failures.push(FailureAtom { project: atom, candidate: None, reason: e.to_string() });
                    match state.backtrack() {
                        Some(pair) => {
                            pending_retry = Some(pair);
                            continue;
                        },
                        None => return Err(Error::NoSolution(FailureReport(failures))),
                    }
                },
            }
        };

        let source_url = match candidates::resolve_source(&project, input.manifest) {
            Ok(url) => url,
            Err(e) => {
                failures.push(FailureAtom { project, candidate: None, reason: e.to_string() });
                match state.backtrack() {
                    Some(pair) => {
                        pending_retry = Some(pair);
                        continue;
                    },
                    None => return Err(Error::NoSolution(FailureReport(failures))),
                }
            },
        };

        let mut applied = false;
        while let Some(candidate) = candidates.pop_front() {
            match apply_candidate(manager, &mut state, &project, candidate.clone(), source_url.clone(), input.deducer).await {
                Ok(effects) => {
                    state.frames.push(state::Frame {
                        project: project.clone(),
                        remaining: candidates,
                        introduced_atoms: effects.introduced_atoms,
                        introduced_subpackages: effects.introduced_subpackages,
                        introduced_constraints: effects.introduced_constraints,
                    });
                    applied = true;
                    break;
                },
                Err(reason) => {
                    failures.push(FailureAtom { project: project.clone(), candidate: Some(candidate), reason });
                },
            }
        }

        if !applied {
            // `project` itself is not dead, only unsatisfiable with the world
            // as it stands -- re-queue it so it gets another attempt once
            // backtracking has changed something upstream. If the frame being
            // undone is the one that introduced `project` in the first place,
            // `backtrack` drops it from `state.atoms` again on its own, which
            // is the correct outcome: nothing downstream of that frame is
            // still required.
            state.atoms.push_back(project);
            match state.backtrack() {
                Some(pair) => pending_retry = Some(pair),
                None => return Err(Error::NoSolution(FailureReport(failures))),
            }
        }
    }

    Ok(assemble_lock(state, &input, digest))
}

fn seed_imports(input: &SolveInput<'_>) -> BTreeSet<String> {
    let reach = analyzer::reachable(
        input.root_tree,
        input.import_root,
        analyzer::ReachabilityOptions { include_main: true, ..Default::default() },
    );
    let mut imports = analyzer::flatten_with(&reach, analyzer::is_standard);
    imports.retain(|i| !input.manifest.ignored.contains(i));
    imports.extend(input.manifest.required.iter().cloned());
    imports
}

fn seed_atom(state: &mut SolverState, deducer: &dyn RootDeducer, import: &str) {
    let root = deducer.deduce(import);
    state.discover_atom(&root);
    let subpath = import.strip_prefix(root.as_str()).unwrap_or("").trim_start_matches('/').to_string();
    state.require_subpackage(&root, subpath);
}

/// Loads `candidate`'s package tree, records every external import it pulls
/// in as a new atom/subpackage requirement, and folds in any constraint its
/// own manifest declares. Returns what this application newly introduced so
/// the caller can build a [`state::Frame`] from it.
async fn apply_candidate(
    manager: &SourceManager,
    state: &mut SolverState,
    project: &ProjectRoot,
    candidate: Version,
    source_url: url::Url,
    deducer: &dyn RootDeducer,
) -> Result<Effects, String> {
    let tree = manager.list_packages_at(&source_url, &candidate).await.map_err(|e| e.to_string())?;
    let reach = analyzer::reachable(
        &tree,
        project.as_str(),
        analyzer::ReachabilityOptions { include_main: true, ..Default::default() },
    );
    let external = analyzer::flatten_with(&reach, analyzer::is_standard);

    let dep_manifest = fetch_candidate_manifest(manager, &source_url, &candidate).await;

    // A transitive constraint that contradicts a selection already locked in
    // elsewhere is rejected here rather than unwound: retrying *this*
    // candidate (or backtracking further up the frame stack) is enough to
    // explore the other branch, without needing to re-open an already-closed
    // decision out of LIFO order.
    if let Some(dep_manifest) = &dep_manifest {
        for (root, props) in &dep_manifest.constraints {
            if let (Some(constraint), Some(selected)) = (&props.constraint, state.selection.get(root)) {
                if !constraint.matches(&selected.version) {
                    return Err(format!(
                        "{project} at {candidate} requires {root} to satisfy a constraint its already-selected version {} does not meet",
                        selected.version
                    ));
                }
            }
        }
    }

    let mut effects = Effects::default();

    for import in &external {
        let root = deducer.deduce(import);
        if state.discover_atom(&root) {
            effects.introduced_atoms.push(root.clone());
        }
        let subpath = import.strip_prefix(root.as_str()).unwrap_or("").trim_start_matches('/').to_string();
        if state.require_subpackage(&root, subpath.clone()) {
            effects.introduced_subpackages.push((root, subpath));
        }
    }

    if let Some(dep_manifest) = &dep_manifest {
        for (root, props) in &dep_manifest.constraints {
            if let Some(constraint) = &props.constraint {
                state.add_constraint(root, constraint.clone());
                effects.introduced_constraints.push((root.clone(), constraint.clone()));
                if state.discover_atom(root) {
                    effects.introduced_atoms.push(root.clone());
                }
            }
        }
    }

    state.selection.insert(project.clone(), Selected { source: source_url, version: candidate });
    Ok(effects)
}

/// Exports `candidate` to a scratch directory and reads its own manifest,
/// if it has one. Any failure here -- no manifest present, an unparsable
/// one, a transport hiccup -- is treated as "this dependency declares
/// nothing", not as a solve failure: most dependencies don't carry one.
async fn fetch_candidate_manifest(manager: &SourceManager, source_url: &url::Url, candidate: &Version) -> Option<Manifest> {
    let dir = tempfile::tempdir().ok()?;
    manager.export_at(source_url, candidate, dir.path()).await.ok()?;
    let path = dir.path().join(manifest::MANIFEST_FILENAME);
    if !path.is_file() {
        return None;
    }
    match manifest::toml::read_manifest(&path) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::debug!(error = %e, "candidate manifest present but unparsable, treating as absent");
            None
        },
    }
}

fn assemble_lock(state: SolverState, input: &SolveInput<'_>, digest: String) -> Lock {
    let mut projects: Vec<LockedProject> = state
        .selection
        .into_iter()
        .map(|(root, selected)| {
            let packages = state.required_subpackages.get(&root).cloned().unwrap_or_default();
            let source = match candidates::default_source(&root) {
                Ok(default) if default == selected.source => None,
                _ => Some(selected.source.into()),
            };
            LockedProject { root, source, version: selected.version, packages, digest: None }
        })
        .collect();
    projects.sort_by(|a, b| a.root.cmp(&b.root));

    Lock {
        projects,
        solve_meta: SolveMeta {
            analyzer_name: "analyzer".into(),
            analyzer_version: input.analyzer_version.to_string(),
            solver_name: "solver".into(),
            solver_version: env!("CARGO_PKG_VERSION").to_string(),
            inputs_digest: digest,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use analyzer::{PackageInfo, PackageOutcome};
    use manifest::{DefaultRootDeducer, ProjectProperties};
    use source::backend::fixture::FixtureSource;
    use version::RevisionId;

    use super::*;

    fn root_tree(imports: &[&str]) -> BTreeMap<analyzer::RelPath, PackageOutcome> {
        let mut info = PackageInfo { name: "main".into(), is_main: true, ..Default::default() };
        info.imports = imports.iter().map(|s| s.to_string()).collect();
        let mut tree = BTreeMap::new();
        tree.insert(String::new(), PackageOutcome::Ok(info));
        tree
    }

    async fn manager_with(url: &str, backend: FixtureSource) -> SourceManager {
        // Leaked rather than bound by the caller: these tests never touch the
        // on-disk cache directly, so there is nothing worth cleaning up for.
        let cache_root = tempfile::tempdir().unwrap().keep();
        let manager = SourceManager::new(cache_root).unwrap();
        manager.register(&url::Url::parse(url).unwrap(), Arc::new(backend)).await;
        manager
    }

    #[tokio::test]
    async fn prefers_highest_satisfying_tag_absent_a_constraint() {
        let rev = RevisionId::new("a".repeat(40)).unwrap();
        let fixture = FixtureSource::new()
            .with_root_package(Version::pair(Version::Tag("v0.8.0".into()), rev.clone()), &[])
            .with_root_package(Version::pair(Version::Tag("v1.0.0".into()), rev), &[]);
        let manager = manager_with("https://example.com/a/b", fixture).await;

        let tree = root_tree(&["example.com/a/b/c"]);
        let manifest = Manifest::default();
        let deducer = DefaultRootDeducer;
        let input = SolveInput {
            root_tree: &tree,
            import_root: "example.com/proj",
            manifest: &manifest,
            prior_lock: None,
            change_all: false,
            to_change: &BTreeSet::new(),
            default_branches: &BTreeMap::new(),
            deducer: &deducer,
            analyzer_version: "test",
        };

        let lock = solve(&manager, input, &CancellationToken::new()).await.unwrap();
        let project = lock.project(&ProjectRoot::new("example.com/a/b")).unwrap();
        assert_eq!(project.version.unpair(), &Version::Tag("v1.0.0".into()));
    }

    #[tokio::test]
    async fn constrained_range_prefers_the_matching_lower_tag() {
        let rev = RevisionId::new("b".repeat(40)).unwrap();
        let fixture = FixtureSource::new()
            .with_root_package(Version::pair(Version::Tag("v0.8.0".into()), rev.clone()), &[])
            .with_root_package(Version::pair(Version::Tag("v1.0.0".into()), rev), &[]);
        let manager = manager_with("https://example.com/a/b", fixture).await;

        let tree = root_tree(&["example.com/a/b/c"]);
        let mut manifest = Manifest::default();
        manifest.constraints.insert(
            ProjectRoot::new("example.com/a/b"),
            ProjectProperties {
                source: None,
                constraint: Some(Constraint::SemverRange(semver::VersionReq::parse("<1.0.0").unwrap())),
            },
        );
        let deducer = DefaultRootDeducer;
        let input = SolveInput {
            root_tree: &tree,
            import_root: "example.com/proj",
            manifest: &manifest,
            prior_lock: None,
            change_all: false,
            to_change: &BTreeSet::new(),
            default_branches: &BTreeMap::new(),
            deducer: &deducer,
            analyzer_version: "test",
        };

        let lock = solve(&manager, input, &CancellationToken::new()).await.unwrap();
        let project = lock.project(&ProjectRoot::new("example.com/a/b")).unwrap();
        assert_eq!(project.version.unpair(), &Version::Tag("v0.8.0".into()));
    }

    #[tokio::test]
    async fn bare_ensure_keeps_the_locked_version_despite_a_moved_upstream_branch() {
        let old = RevisionId::new("c".repeat(40)).unwrap();
        let new = RevisionId::new("d".repeat(40)).unwrap();
        let root = ProjectRoot::new("example.com/a/b");
        let manifest = Manifest::default();
        let tree = root_tree(&["example.com/a/b/c"]);
        let deducer = DefaultRootDeducer;

        let seed: BTreeSet<String> = ["example.com/a/b/c".to_string()].into_iter().collect();
        let digest = manifest::input_digest(&manifest, &seed, "test");
        let prior_lock = Lock {
            projects: vec![LockedProject {
                root: root.clone(),
                source: None,
                version: Version::pair(Version::Branch("master".into()), old.clone()),
                packages: ["c".to_string()].into_iter().collect(),
                digest: None,
            }],
            solve_meta: SolveMeta {
                analyzer_name: "analyzer".into(),
                analyzer_version: "test".into(),
                solver_name: "solver".into(),
                solver_version: "0".into(),
                inputs_digest: digest,
            },
        };

        // Upstream has since moved master to a new revision; a bare ensure
        // must not even need to know that, since the fast path never asks.
        let fixture = FixtureSource::new().with_root_package(Version::pair(Version::Branch("master".into()), new), &[]);
        let manager = manager_with("https://example.com/a/b", fixture).await;

        let input = SolveInput {
            root_tree: &tree,
            import_root: "example.com/proj",
            manifest: &manifest,
            prior_lock: Some(&prior_lock),
            change_all: false,
            to_change: &BTreeSet::new(),
            default_branches: &BTreeMap::new(),
            deducer: &deducer,
            analyzer_version: "test",
        };
        let lock = solve(&manager, input, &CancellationToken::new()).await.unwrap();
        let project = lock.project(&root).unwrap();
        assert_eq!(project.version.revision(), Some(&old), "fast path must not refetch");
    }

    #[tokio::test]
    async fn update_flag_bypasses_the_fast_path_and_picks_up_the_new_revision() {
        let old = RevisionId::new("e".repeat(40)).unwrap();
        let new = RevisionId::new("f".repeat(40)).unwrap();
        let root = ProjectRoot::new("example.com/a/b");
        let manifest = Manifest::default();
        let tree = root_tree(&["example.com/a/b/c"]);
        let deducer = DefaultRootDeducer;

        let seed: BTreeSet<String> = ["example.com/a/b/c".to_string()].into_iter().collect();
        let digest = manifest::input_digest(&manifest, &seed, "test");
        let prior_lock = Lock {
            projects: vec![LockedProject {
                root: root.clone(),
                source: None,
                version: Version::pair(Version::Branch("master".into()), old),
                packages: ["c".to_string()].into_iter().collect(),
                digest: None,
            }],
            solve_meta: SolveMeta {
                analyzer_name: "analyzer".into(),
                analyzer_version: "test".into(),
                solver_name: "solver".into(),
                solver_version: "0".into(),
                inputs_digest: digest,
            },
        };

        let fixture = FixtureSource::new().with_root_package(Version::pair(Version::Branch("master".into()), new.clone()), &[]);
        let manager = manager_with("https://example.com/a/b", fixture).await;

        let to_change: BTreeSet<ProjectRoot> = [root.clone()].into_iter().collect();
        let input = SolveInput {
            root_tree: &tree,
            import_root: "example.com/proj",
            manifest: &manifest,
            prior_lock: Some(&prior_lock),
            change_all: false,
            to_change: &to_change,
            default_branches: &BTreeMap::new(),
            deducer: &deducer,
            analyzer_version: "test",
        };
        let lock = solve(&manager, input, &CancellationToken::new()).await.unwrap();
        let project = lock.project(&root).unwrap();
        assert_eq!(project.version.revision(), Some(&new));
    }

    #[tokio::test]
    async fn override_wins_even_though_a_direct_constraint_would_reject_it() {
        let rev = RevisionId::new("1".repeat(40)).unwrap();
        let fixture = FixtureSource::new()
            .with_root_package(Version::pair(Version::Tag("v1.0.0".into()), rev.clone()), &[])
            .with_root_package(Version::pair(Version::Tag("v2.0.0".into()), rev), &[]);
        let manager = manager_with("https://example.com/q", fixture).await;

        let tree = root_tree(&["example.com/q"]);
        let root = ProjectRoot::new("example.com/q");
        let mut manifest = Manifest::default();
        manifest.constraints.insert(
            root.clone(),
            ProjectProperties {
                source: None,
                constraint: Some(Constraint::SemverRange(semver::VersionReq::parse("^1.0.0").unwrap())),
            },
        );
        manifest.overrides.insert(
            root.clone(),
            ProjectProperties { source: None, constraint: Some(Constraint::Version(Version::Tag("v2.0.0".into()))) },
        );
        let deducer = DefaultRootDeducer;
        let input = SolveInput {
            root_tree: &tree,
            import_root: "example.com/proj",
            manifest: &manifest,
            prior_lock: None,
            change_all: false,
            to_change: &BTreeSet::new(),
            default_branches: &BTreeMap::new(),
            deducer: &deducer,
            analyzer_version: "test",
        };

        let lock = solve(&manager, input, &CancellationToken::new()).await.unwrap();
        let project = lock.project(&root).unwrap();
        assert_eq!(project.version.unpair(), &Version::Tag("v2.0.0".into()));
    }

    /// A hand-built [`source::Source`] whose `export_at` actually writes a
    /// manifest file, unlike [`FixtureSource`] -- needed to exercise
    /// transitive constraint discovery, which reads a dependency's own
    /// manifest off its exported tree.
    struct ManifestCarryingSource {
        version: Version,
        tree: analyzer::PackageOutcome,
        manifest_toml: String,
    }

    impl source::Source for ManifestCarryingSource {
        fn sync(&self) -> Result<(), source::backend::Error> {
            Ok(())
        }

        fn list_versions(&self) -> Result<Vec<Version>, source::backend::Error> {
            Ok(vec![self.version.clone()])
        }

        fn revision_present(&self, revision: &RevisionId) -> Result<bool, source::backend::Error> {
            Ok(self.version.revision() == Some(revision))
        }

        fn list_packages_at(&self, version: &Version) -> Result<source::PackageTree, source::backend::Error> {
            if !self.version.substitutable_for(version) {
                return Err(source::backend::Error::NoDialect("no such version".into()));
            }
            let mut tree = BTreeMap::new();
            tree.insert(String::new(), self.tree.clone());
            Ok(tree)
        }

        fn export_at(&self, version: &Version, destination: &Path) -> Result<(), source::backend::Error> {
            if !self.version.substitutable_for(version) {
                return Err(source::backend::Error::NoDialect("no such version".into()));
            }
            std::fs::create_dir_all(destination).map_err(|e| source::backend::Error::NoDialect(e.to_string()))?;
            std::fs::write(destination.join(manifest::MANIFEST_FILENAME), &self.manifest_toml)
                .map_err(|e| source::backend::Error::NoDialect(e.to_string()))?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn a_dependencys_own_manifest_narrows_a_transitive_projects_candidates() {
        let rev = RevisionId::new("2".repeat(40)).unwrap();
        let mut r_info = PackageInfo::default();
        r_info.name = "r".into();
        r_info.imports = ["example.com/z".to_string()].into_iter().collect();

        let mut z_manifest = Manifest::default();
        z_manifest.constraints.insert(
            ProjectRoot::new("example.com/z"),
            ProjectProperties {
                source: None,
                constraint: Some(Constraint::SemverRange(semver::VersionReq::parse("<1.0.0").unwrap())),
            },
        );
        let r_source = ManifestCarryingSource {
            version: Version::pair(Version::Tag("v1.0.0".into()), rev),
            tree: PackageOutcome::Ok(r_info),
            manifest_toml: manifest::toml::manifest_to_string(&z_manifest).unwrap(),
        };

        let z_rev = RevisionId::new("3".repeat(40)).unwrap();
        let z_fixture = FixtureSource::new()
            .with_root_package(Version::pair(Version::Tag("v0.8.0".into()), z_rev.clone()), &[])
            .with_root_package(Version::pair(Version::Tag("v1.0.0".into()), z_rev), &[]);

        let dir = tempfile::tempdir().unwrap();
        let manager = SourceManager::new(dir.path().to_path_buf()).unwrap();
        manager.register(&url::Url::parse("https://example.com/r").unwrap(), Arc::new(r_source)).await;
        manager.register(&url::Url::parse("https://example.com/z").unwrap(), Arc::new(z_fixture)).await;

        let tree = root_tree(&["example.com/r"]);
        let manifest = Manifest::default();
        let deducer = DefaultRootDeducer;
        let input = SolveInput {
            root_tree: &tree,
            import_root: "example.com/proj",
            manifest: &manifest,
            prior_lock: None,
            change_all: false,
            to_change: &BTreeSet::new(),
            default_branches: &BTreeMap::new(),
            deducer: &deducer,
            analyzer_version: "test",
        };

        let lock = solve(&manager, input, &CancellationToken::new()).await.unwrap();
        let z = lock.project(&ProjectRoot::new("example.com/z")).unwrap();
        assert_eq!(z.version.unpair(), &Version::Tag("v0.8.0".into()), "r's own manifest should have constrained z");
    }

    #[tokio::test]
    async fn a_conflicting_transitive_constraint_discovered_later_forces_a_genuine_backtrack() {
        // "z" is explored first and, with nothing yet constraining it, takes
        // the highest tag. "m" is explored afterward and its own manifest
        // rules that choice out. The solver must undo z's pick and retry it
        // with its remaining candidates -- and "m" must not simply vanish
        // from the worklist once its first attempt is rejected.
        let z_rev = RevisionId::new("4".repeat(40)).unwrap();
        let z_fixture = FixtureSource::new()
            .with_root_package(Version::pair(Version::Tag("v0.8.0".into()), z_rev.clone()), &[])
            .with_root_package(Version::pair(Version::Tag("v1.0.0".into()), z_rev), &[]);

        let mut z_constraint = Manifest::default();
        z_constraint.constraints.insert(
            ProjectRoot::new("example.com/z"),
            ProjectProperties {
                source: None,
                constraint: Some(Constraint::SemverRange(semver::VersionReq::parse("<1.0.0").unwrap())),
            },
        );
        let m_rev = RevisionId::new("5".repeat(40)).unwrap();
        let m_source = ManifestCarryingSource {
            version: Version::pair(Version::Tag("v1.0.0".into()), m_rev),
            tree: PackageOutcome::Ok(PackageInfo { name: "m".into(), ..Default::default() }),
            manifest_toml: manifest::toml::manifest_to_string(&z_constraint).unwrap(),
        };

        let dir = tempfile::tempdir().unwrap();
        let manager = SourceManager::new(dir.path().to_path_buf()).unwrap();
        manager.register(&url::Url::parse("https://example.com/m").unwrap(), Arc::new(m_source)).await;
        manager.register(&url::Url::parse("https://example.com/z").unwrap(), Arc::new(z_fixture)).await;

        // Seeded in this order, "z" sits on top of the atom stack and is
        // explored before "m" (discovery is depth-first, most recent first).
        let tree = root_tree(&["example.com/m", "example.com/z"]);
        let manifest = Manifest::default();
        let deducer = DefaultRootDeducer;
        let input = SolveInput {
            root_tree: &tree,
            import_root: "example.com/proj",
            manifest: &manifest,
            prior_lock: None,
            change_all: false,
            to_change: &BTreeSet::new(),
            default_branches: &BTreeMap::new(),
            deducer: &deducer,
            analyzer_version: "test",
        };

        let lock = solve(&manager, input, &CancellationToken::new()).await.unwrap();
        let z = lock.project(&ProjectRoot::new("example.com/z")).unwrap();
        assert_eq!(z.version.unpair(), &Version::Tag("v0.8.0".into()), "z's first pick should have been backtracked");
        assert!(
            lock.project(&ProjectRoot::new("example.com/m")).is_some(),
            "m must still end up resolved, not dropped by the backtrack"
        );
    }

    #[tokio::test]
    async fn cancellation_is_observed_before_any_atom_is_resolved() {
        let tree = root_tree(&["example.com/a/b/c"]);
        let manifest = Manifest::default();
        let deducer = DefaultRootDeducer;
        let dir = tempfile::tempdir().unwrap();
        let manager = SourceManager::new(dir.path().to_path_buf()).unwrap();

        let input = SolveInput {
            root_tree: &tree,
            import_root: "example.com/proj",
            manifest: &manifest,
            prior_lock: None,
            change_all: false,
            to_change: &BTreeSet::new(),
            default_branches: &BTreeMap::new(),
            deducer: &deducer,
            analyzer_version: "test",
        };

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = solve(&manager, input, &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
