//! Building a project's ordered candidate list: source resolution, the
//! revision short-circuit, constraint filtering, upgrade ordering, and the
//! lock-preference rule.

use std::collections::{BTreeSet, VecDeque};

use manifest::{Lock, Manifest, ProjectRoot};
use source::SourceManager;
use thiserror::Error;
use version::{Constraint, Version};

/// An error building a project's candidate list.
#[derive(Error, Debug)]
pub(crate) enum CandidateError {
    /// The project's root does not form a valid default source URL.
    #[error(transparent)]
    InvalidSource(#[from] url::ParseError),
    /// The backend or manager failed to answer.
    #[error(transparent)]
    Source(#[from] source::manager::Error),
}

/// The `https://<root>` URL a project is fetched from absent an explicit
/// source override or manifest-declared source.
pub(crate) fn default_source(root: &ProjectRoot) -> Result<url::Url, url::ParseError> {
    url::Url::parse(&format!("https://{}", root.as_str()))
}

/// Resolves the source URL to fetch `root` from: an override's source wins,
/// then a plain constraint's source, then the host-derived default.
pub(crate) fn resolve_source(root: &ProjectRoot, manifest: &Manifest) -> Result<url::Url, url::ParseError> {
    if let Some(url) = manifest.overrides.get(root).and_then(|p| p.source.as_ref()) {
        return Ok(url.url().clone());
    }
    if let Some(url) = manifest.constraints.get(root).and_then(|p| p.source.as_ref()) {
        return Ok(url.url().clone());
    }
    default_source(root)
}

/// The effective constraint set for `root`: an override entirely replaces
/// any plain constraint and any transitively-introduced one; absent an
/// override, the plain constraint (if any) is joined by whatever has been
/// transitively discovered so far (`active`).
fn effective_constraints(root: &ProjectRoot, manifest: &Manifest, active: &[Constraint]) -> Vec<Constraint> {
    let direct: Vec<Constraint> = manifest.effective_constraint(root).and_then(|p| p.constraint.clone()).into_iter().collect();
    if manifest.is_overridden(root) {
        return direct;
    }
    let mut constraints = direct;
    constraints.extend(active.iter().cloned());
    constraints
}

/// Builds the ordered candidate deque for `project`, given whatever
/// constraints on it are active so far.
///
/// An empty result means every known version was ruled out by the active
/// constraints -- a dead branch, not necessarily a fatal error; the caller
/// treats it the same as every candidate failing to apply.
pub(crate) async fn build(
    manager: &SourceManager,
    project: &ProjectRoot,
    manifest: &Manifest,
    prior_lock: Option<&Lock>,
    change_all: bool,
    to_change: &BTreeSet<ProjectRoot>,
    default_branches: &std::collections::BTreeMap<ProjectRoot, String>,
    active: &[Constraint],
) -> Result<VecDeque<Version>, CandidateError> {
    let source_url = resolve_source(project, manifest)?;
    let effective = effective_constraints(project, manifest, active);

    for constraint in &effective {
        if let Constraint::Version(Version::Revision(rev)) = constraint {
            let present = manager.revision_present(&source_url, rev).await?;
            return Ok(if present {
                VecDeque::from([Version::Revision(rev.clone())])
            } else {
                VecDeque::new()
            });
        }
    }

    let versions = manager.list_versions(&source_url).await?;
    let mut matched: Vec<Version> =
        versions.into_iter().filter(|v| effective.iter().all(|c| c.matches(v))).collect();

    let default_branch = default_branches.get(project).map(String::as_str);
    version::sort_for_upgrade(default_branch, &mut matched);

    if !change_all && !to_change.contains(project) {
        if let Some(locked) = prior_lock.and_then(|l| l.project(project)) {
            if effective.iter().all(|c| c.matches(&locked.version)) {
                matched.retain(|v| !v.substitutable_for(&locked.version));
                matched.insert(0, locked.version.clone());
            }
        }
    }

    Ok(matched.into())
}

#[cfg(test)]
mod tests {
    use manifest::{ProjectProperties, Source};

    use super::*;

    #[test]
    fn override_source_wins_over_constraint_source() {
        let root = ProjectRoot::new("example.com/a");
        let mut manifest = Manifest::default();
        manifest.constraints.insert(
            root.clone(),
            ProjectProperties {
                source: Some(Source::parse("https://mirror.example.com/a").unwrap()),
                constraint: None,
            },
        );
        manifest.overrides.insert(
            root.clone(),
            ProjectProperties {
                source: Some(Source::parse("https://fork.example.com/a").unwrap()),
                constraint: None,
            },
        );
        let resolved = resolve_source(&root, &manifest).unwrap();
        assert_eq!(resolved.as_str(), "https://fork.example.com/a");
    }

    #[test]
    fn unconfigured_root_resolves_to_host_derived_default() {
        let root = ProjectRoot::new("example.com/a/b");
        let resolved = resolve_source(&root, &Manifest::default()).unwrap();
        assert_eq!(resolved.as_str(), "https://example.com/a/b");
    }

    #[test]
    fn override_without_a_constraint_drops_any_transitive_one() {
        let root = ProjectRoot::new("example.com/a");
        let mut manifest = Manifest::default();
        manifest.overrides.insert(root.clone(), ProjectProperties { source: None, constraint: None });
        let active = vec![Constraint::SemverRange(semver::VersionReq::parse("^1.0.0").unwrap())];
        assert!(effective_constraints(&root, &manifest, &active).is_empty());
    }
}
