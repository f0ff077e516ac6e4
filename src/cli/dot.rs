//! GraphViz rendering for `status -dot`.
//!
//! A single free function over the data this binary already has in hand:
//! one node per locked project, and one edge per directly-declared
//! dependency from the manifest (the lock itself does not retain the
//! solver's internal selection graph, only the flat, final assignment).

use std::fmt::Write as _;

use manifest::{Lock, Manifest};

/// Renders `lock` (plus `manifest`'s direct declarations) as a GraphViz
/// `digraph`, rooted at `import_root`.
pub fn render_dot(import_root: &str, manifest: &Manifest, lock: &Lock) -> String {
    let mut out = String::new();
    writeln!(out, "digraph depctl {{").unwrap();
    writeln!(out, "  {:?};", import_root).unwrap();

    for project in &lock.projects {
        writeln!(out, "  {:?} [label={:?}];", project.root.as_str(), format!("{}\\n{}", project.root, project.version)).unwrap();
    }

    for root in manifest.constraints.keys().chain(manifest.overrides.keys()) {
        writeln!(out, "  {:?} -> {:?};", import_root, root.as_str()).unwrap();
    }

    writeln!(out, "}}").unwrap();
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use manifest::{LockedProject, ProjectRoot, SolveMeta};
    use version::Version;

    use super::*;

    #[test]
    fn renders_one_node_per_locked_project() {
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
                analyzer_name: "a".into(),
                analyzer_version: "1".into(),
                solver_name: "s".into(),
                solver_version: "1".into(),
                inputs_digest: "x".into(),
            },
        };

        let dot = render_dot("example.com/root", &Manifest::default(), &lock);
        assert!(dot.starts_with("digraph depctl {"));
        assert!(dot.contains("example.com/a"));
        assert!(dot.trim_end().ends_with('}'));
    }
}
