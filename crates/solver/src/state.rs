//! The solver's mutable working state: the atom worklist, the current
//! selection, and the decision-frame stack that makes backtracking possible.
//!
//! Every frame records exactly the facts its own candidate choice was first
//! to introduce. Frames are pushed in strict temporal order -- one per
//! successfully applied candidate -- so undoing the most recent frame can
//! never strand a fact a still-live earlier frame also depends on: anything
//! an earlier frame also touches was, by construction, discovered before
//! this frame ever ran, and so is not among what this frame "introduced".
//! This "first discovery owns it" rule is what lets [`SolverState::backtrack`]
//! get away with a plain undo instead of reference-counting every atom,
//! subpackage, and constraint.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use manifest::ProjectRoot;
use version::{Constraint, Version};

/// One project's current pick.
#[derive(Debug, Clone)]
pub(crate) struct Selected {
    pub source: url::Url,
    pub version: Version,
}

/// One decision: `project` was resolved to whichever candidate was popped
/// from its candidate deque immediately before this frame was pushed.
/// `remaining` holds the candidates that came after it, so a later
/// backtrack can resume trying them without rebuilding the list from scratch.
pub(crate) struct Frame {
    pub project: ProjectRoot,
    pub remaining: VecDeque<Version>,
    pub introduced_atoms: Vec<ProjectRoot>,
    pub introduced_subpackages: Vec<(ProjectRoot, String)>,
    pub introduced_constraints: Vec<(ProjectRoot, Constraint)>,
}

/// What a single [`super::apply_candidate`] call newly introduced, handed
/// back to the caller so it can build the [`Frame`] that would undo it.
#[derive(Default)]
pub(crate) struct Effects {
    pub introduced_atoms: Vec<ProjectRoot>,
    pub introduced_subpackages: Vec<(ProjectRoot, String)>,
    pub introduced_constraints: Vec<(ProjectRoot, Constraint)>,
}

pub(crate) struct SolverState {
    pub atoms: VecDeque<ProjectRoot>,
    pub queued: HashSet<ProjectRoot>,
    pub selection: BTreeMap<ProjectRoot, Selected>,
    pub required_subpackages: BTreeMap<ProjectRoot, BTreeSet<String>>,
    pub constraints: BTreeMap<ProjectRoot, Vec<Constraint>>,
    pub frames: Vec<Frame>,
}

impl SolverState {
    pub fn new() -> Self {
        SolverState {
            atoms: VecDeque::new(),
            queued: HashSet::new(),
            selection: BTreeMap::new(),
            required_subpackages: BTreeMap::new(),
            constraints: BTreeMap::new(),
            frames: Vec::new(),
        }
    }

    /// Registers `root` as an atom to resolve, if it isn't already known.
    /// Returns `true` exactly when this call was the one that added it.
    pub fn discover_atom(&mut self, root: &ProjectRoot) -> bool {
        if self.queued.insert(root.clone()) {
            self.atoms.push_back(root.clone());
            true
        } else {
            false
        }
    }

    /// Records that `root`'s `subpackage` subpath is required, if not
    /// already known. Returns `true` exactly when this call added it.
    pub fn require_subpackage(&mut self, root: &ProjectRoot, subpackage: String) -> bool {
        self.required_subpackages.entry(root.clone()).or_default().insert(subpackage)
    }

    /// Adds `constraint` to `root`'s active set. Callers dedupe at the
    /// frame-recording level, not here, since the same constraint can
    /// legitimately be introduced once per frame that discovers it.
    pub fn add_constraint(&mut self, root: &ProjectRoot, constraint: Constraint) {
        self.constraints.entry(root.clone()).or_default().push(constraint);
    }

    /// Undoes the most recent frame, handing back its project and the
    /// candidates it had not yet tried so the caller can resume the search
    /// with the next one. `None` means there is nothing left to backtrack --
    /// the whole solve has failed.
    pub fn backtrack(&mut self) -> Option<(ProjectRoot, VecDeque<Version>)> {
        let frame = self.frames.pop()?;
        self.selection.remove(&frame.project);

        for atom in &frame.introduced_atoms {
            self.queued.remove(atom);
            self.atoms.retain(|a| a != atom);
        }
        for (root, subpkg) in &frame.introduced_subpackages {
            if let Some(set) = self.required_subpackages.get_mut(root) {
                set.remove(subpkg);
            }
        }
        for (root, constraint) in &frame.introduced_constraints {
            if let Some(list) = self.constraints.get_mut(root) {
                if let Some(pos) = list.iter().position(|c| c == constraint) {
                    list.remove(pos);
                }
            }
        }

        Some((frame.project, frame.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backtrack_undoes_only_what_the_frame_introduced() {
        let mut state = SolverState::new();
        let a = ProjectRoot::new("example.com/a");
        let b = ProjectRoot::new("example.com/b");

        state.discover_atom(&a);
        state.atoms.pop_front();
        state.selection.insert(
            a.clone(),
            Selected {
                source: url::Url::parse("https://example.com/a").unwrap(),
                version: Version::Tag("v1.0.0".into()),
            },
        );
        let introduced = state.discover_atom(&b);
        assert!(introduced);
        state.require_subpackage(&b, "sub".into());
        state.frames.push(Frame {
            project: a.clone(),
            remaining: VecDeque::new(),
            introduced_atoms: vec![b.clone()],
            introduced_subpackages: vec![(b.clone(), "sub".into())],
            introduced_constraints: Vec::new(),
        });

        let (project, remaining) = state.backtrack().expect("a frame to undo");
        assert_eq!(project, a);
        assert!(remaining.is_empty());
        assert!(!state.selection.contains_key(&a));
        assert!(!state.queued.contains(&b));
        assert!(state.required_subpackages.get(&b).is_none_or(|s| s.is_empty()));
        assert!(state.backtrack().is_none());
    }
}
