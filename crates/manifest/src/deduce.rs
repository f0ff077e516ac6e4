//! Root deduction: collapsing an import path down to the project root that
//! owns it.
//!
//! Realized as a trait so a caller targeting a private registry can
//! substitute its own rule without the solver or source manager noticing.

use crate::ProjectRoot;

/// Collapses an import path to the [`ProjectRoot`] that should be considered
/// to own it.
pub trait RootDeducer: Send + Sync {
    /// Deduces the project root for `import_path`.
    fn deduce(&self, import_path: &str) -> ProjectRoot;
}

/// The host-prefix heuristic: known VCS-hosting domains contribute a fixed
/// number of path segments to the root; anything else falls back to the
/// first three segments (`host/org/repo`), which is almost always a
/// project's actual root on an unrecognized host.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRootDeducer;

/// `(host, segments owned by the root after the host)`.
const KNOWN_HOSTS: &[(&str, usize)] = &[
    ("github.com", 2),
    ("gitlab.com", 2),
    ("bitbucket.org", 2),
    ("gitea.com", 2),
    ("sr.ht", 2),
];

impl RootDeducer for DefaultRootDeducer {
    fn deduce(&self, import_path: &str) -> ProjectRoot {
        let mut segments = import_path.split('/');
        let Some(host) = segments.next() else {
            return ProjectRoot::new(import_path);
        };

        let owned = KNOWN_HOSTS
            .iter()
            .find(|(h, _)| *h == host)
            .map(|(_, n)| *n)
            .unwrap_or(2);

        let root: Vec<&str> = std::iter::once(host).chain(segments.take(owned)).collect();
        ProjectRoot::new(root.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_host_keeps_org_and_repo() {
        let deducer = DefaultRootDeducer;
        assert_eq!(
            deducer.deduce("github.com/foo/bar/baz/qux").as_str(),
            "github.com/foo/bar"
        );
    }

    #[test]
    fn unknown_host_falls_back_to_three_segments() {
        let deducer = DefaultRootDeducer;
        assert_eq!(
            deducer.deduce("example.com/org/repo/pkg").as_str(),
            "example.com/org/repo"
        );
    }
}
