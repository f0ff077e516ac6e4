//! The `ensure` subcommand: solves (or reuses) a lock and optionaly
//! rebuilds the vendor tree to match it.

use std::collections::BTreeSet;
use std::path::Path;

use clap::Parser;
use manifest::{DefaultRootDeducer, Lock, Manifest, ProjectProperties, ProjectRoot, RootDeducer};
use tokio_util::sync::CancellationToken;
use writer::{StagedVendor, VendorPolicy, WriteRequest};

use crate::cli::project;

/// The `ensure` subcommand.
#[derive(Parser, Debug)]
#[command(next_help_heading = "Ensure Options")]
pub struct Args {
    /// The import path this project is rooted at (e.g. `github.com/org/project`).
    #[arg(long = "import-root")]
    import_root: String,

    /// Add each `spec` as a new direct constraint in the manifest.
    #[arg(long, conflicts_with = "update")]
    add: bool,
    /// Re-solve each named `spec` (or everything, if none is given), ignoring its locked version.
    #[arg(long, conflicts_with = "add")]
    update: bool,

    /// Skip rebuilding the vendor tree entirely.
    #[arg(long = "no-vendor", conflicts_with = "vendor_only")]
    no_vendor: bool,
    /// Rebuild the vendor tree from the existing lock without re-solving.
    #[arg(long = "vendor-only", conflicts_with = "no_vendor")]
    vendor_only: bool,

    /// Report what would change without writing anything.
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Project specs: `<path>[:<alternate-source>][@<constraint>]`.
    specs: Vec<String>,
}

/// The main entry point for the `ensure` subcommand.
pub(super) async fn run(args: Args) -> anyhow::Result<()> {
    let mut proj = project::load().await?;
    let deducer = DefaultRootDeducer;

    let mut lock = if args.vendor_only {
        proj.lock.clone().ok_or_else(|| anyhow::anyhow!("`ensure -vendor-only` requires an existing lock"))?
    } else {
        let to_change = apply_spec_mutations(&mut proj.manifest, &args, &deducer)?;
        let change_all = args.update && args.specs.is_empty();

        let root_tree = analyzer::analyze(&proj.root)?;
        let default_branches = std::collections::BTreeMap::new();
        let input = solver::SolveInput {
            root_tree: &root_tree,
            import_root: &args.import_root,
            manifest: &proj.manifest,
            prior_lock: proj.lock.as_ref(),
            change_all,
            to_change: &to_change,
            default_branches: &default_branches,
            deducer: &deducer,
            analyzer_version: analyzer::ANALYZER_VERSION,
        };

        let cancel = CancellationToken::new();
        let cancel_for_signal = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            cancel_for_signal.cancel();
        });

        solver::solve(&proj.manager, input, &cancel).await?
    };

    let staged = if args.no_vendor {
        None
    } else {
        let staging = tempfile::Builder::new().prefix(".depctl-vendor-staging").tempdir_in(&proj.root)?;
        build_staged_vendor(&proj, &mut lock, staging.path()).await?;
        Some(StagedVendor { staged_dir: staging.keep() })
    };

    if args.dry_run {
        tracing::info!(projects = lock.projects.len(), "dry run: would write manifest, lock, and vendor tree");
        return Ok(());
    }

    let vendor_policy = if args.no_vendor {
        VendorPolicy::Never
    } else if args.vendor_only {
        VendorPolicy::Always
    } else {
        VendorPolicy::OnChanged
    };

    writer::write(
        &proj.root,
        WriteRequest {
            manifest: if args.vendor_only { None } else { Some(&proj.manifest) },
            lock: Some(&lock),
            vendor: staged,
            vendor_policy,
            prior_lock: proj.lock.as_ref(),
        },
    )?;

    tracing::info!(projects = lock.projects.len(), "ensure complete");
    Ok(())
}

/// Applies `-add`/`-update` to `manifest`, returning the set of project
/// roots `-update` named explicitly (empty, with `change_all` handled by
/// the caller, when no specs were given).
fn apply_spec_mutations(manifest: &mut Manifest, args: &Args, deducer: &dyn RootDeducer) -> anyhow::Result<BTreeSet<ProjectRoot>> {
    let mut to_change = BTreeSet::new();

    for spec in &args.specs {
        let parsed = manifest::spec_grammar::parse(spec)?;
        let root = deducer.deduce(&parsed.path);

        if args.add {
            manifest.constraints.insert(root, ProjectProperties { source: parsed.source, constraint: parsed.constraint });
        } else {
            to_change.insert(root);
        }
    }

    Ok(to_change)
}

/// Exports every locked project into its own subdirectory of `staged_root`,
/// prunes each export down to exactly the files its digest covers, and
/// records that digest, so `staged_root` is ready to be swapped in
/// wholesale as the new `vendor/` tree.
async fn build_staged_vendor(proj: &project::Project, lock: &mut Lock, staged_root: &Path) -> anyhow::Result<()> {
    for locked in &mut lock.projects {
        let url = match &locked.source {
            Some(source) => source.url().clone(),
            None => url::Url::parse(&format!("https://{}", locked.root.as_str()))?,
        };

        let dest = staged_root.join(locked.root.as_str());
        proj.manager.export_at(&url, &locked.version, &dest).await?;

        let flags = proj.manifest.prune_for(&locked.root).effective();
        vendor::prune_tree(&dest, &flags, &locked.packages)?;
        locked.digest = Some(vendor::compute_digest(&dest, &flags, &locked.packages)?);
    }
    Ok(())
}
