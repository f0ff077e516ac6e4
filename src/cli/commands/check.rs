//! The `check` subcommand: verifies the manifest, lock, and vendor tree are
//! mutually consistent without changing anything.

use std::process::ExitCode;

use clap::Parser;

use crate::cli::{project, report};

/// The `check` subcommand.
#[derive(Parser, Debug)]
#[command(next_help_heading = "Check Options")]
pub struct Args {
    /// The import path this project is rooted at, needed to recompute the
    /// fast-path input digest for the lock-staleness check.
    #[arg(long = "import-root", default_value = "")]
    import_root: String,
    /// Skip checking whether the lock is stale relative to the manifest and root tree.
    #[arg(long = "skip-lock")]
    skip_lock: bool,
    /// Skip checking the vendor tree against the lock.
    #[arg(long = "skip-vendor")]
    skip_vendor: bool,
}

/// The main entry point for the `check` subcommand. Exits non-zero if any
/// out-of-sync condition was found, silently unless `quiet` is unset.
pub(super) async fn run(args: Args, quiet: bool) -> anyhow::Result<ExitCode> {
    let proj = project::load().await?;
    let mut lines = Vec::new();

    if !args.skip_lock {
        lines.extend(check_lock_staleness(&proj, &args.import_root)?);
    }

    if !args.skip_vendor {
        if let Some(lock) = &proj.lock {
            let vendor_root = proj.root.join("vendor");
            let statuses = vendor::verify_lock(&vendor_root, lock, &proj.manifest)?;
            lines.extend(report::vendor_issues(&statuses));
        }
    }

    let out_of_sync = !lines.is_empty();
    report::print_lines(&lines, quiet);
    Ok(if out_of_sync { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

/// Recomputes the solver's fast-path input digest and compares it against
/// the lock's recorded one -- the same check `solver::solve` performs
/// before deciding whether to re-solve at all.
fn check_lock_staleness(proj: &project::Project, import_root: &str) -> anyhow::Result<Vec<report::Line>> {
    let Some(lock) = &proj.lock else {
        return Ok(vec![report::Line { root: manifest::ProjectRoot::new(import_root), message: format!("no {} found", manifest::LOCK_FILENAME) }]);
    };

    let root_tree = analyzer::analyze(&proj.root)?;
    let reach = analyzer::reachable(&root_tree, import_root, analyzer::ReachabilityOptions { include_main: true, ..Default::default() });
    let mut imports = analyzer::flatten_with(&reach, analyzer::is_standard);
    imports.retain(|i| !proj.manifest.ignored.contains(i));
    imports.extend(proj.manifest.required.iter().cloned());

    let digest = manifest::input_digest(&proj.manifest, &imports, analyzer::ANALYZER_VERSION);

    if lock.matches_input_digest(&digest) {
        Ok(Vec::new())
    } else {
        Ok(vec![report::Line {
            root: manifest::ProjectRoot::new(import_root),
            message: "lock is out of date relative to the manifest and root package tree".to_string(),
        }])
    }
}
