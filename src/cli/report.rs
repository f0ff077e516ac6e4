//! Deterministic, line-per-issue text reports shared between `status` and
//! `check`.

use manifest::ProjectRoot;
use vendor::Status;

/// One renderable line of a `check`/`status` report.
pub struct Line {
    /// The project the line concerns.
    pub root: ProjectRoot,
    /// The human-readable message.
    pub message: String,
}

/// Formats every mismatching vendor status as a sorted report line.
///
/// Statuses are sorted by project root so output is reproducible across
/// runs regardless of filesystem walk order.
pub fn vendor_issues(statuses: &[(ProjectRoot, Status)]) -> Vec<Line> {
    let mut lines: Vec<Line> = statuses
        .iter()
        .filter(|(_, status)| status.is_mismatch())
        .map(|(root, status)| Line { root: root.clone(), message: describe(status) })
        .collect();
    lines.sort_by(|a, b| a.root.as_str().cmp(b.root.as_str()));
    lines
}

fn describe(status: &Status) -> String {
    match status {
        Status::NoMismatch => unreachable!("NoMismatch is never a reportable issue"),
        Status::NotInTree => "not vendored".to_string(),
        Status::NotInLock { kind } => format!("stray vendor entry not in lock ({kind:?})"),
        Status::EmptyDigestInLock => "lock predates content digests".to_string(),
        Status::HashVersionMismatch => "vendored digest uses an outdated hash version".to_string(),
        Status::DigestMismatchInLock => "vendored contents do not match the lock's digest".to_string(),
    }
}

/// Prints `lines` to stderr, one per line, unless `quiet` is set.
pub fn print_lines(lines: &[Line], quiet: bool) {
    if quiet {
        return;
    }
    for line in lines {
        eprintln!("{}: {}", line.root, line.message);
    }
}
