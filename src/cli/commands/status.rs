//! The `status` subcommand: reports the locked dependency set in one of a
//! few output shapes.

use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;

use crate::cli::{dot, project, report};

/// The `status` subcommand.
#[derive(Parser, Debug)]
#[command(next_help_heading = "Status Options")]
pub struct Args {
    /// Emit the report as JSON.
    #[arg(long)]
    json: bool,
    /// Emit the report as a GraphViz `digraph`.
    #[arg(long)]
    dot: bool,
    /// A custom per-project line template; `{root}`, `{version}`, `{source}` are substituted.
    #[arg(short = 'f', long = "format", value_name = "TEMPLATE")]
    format: Option<String>,
    /// Only report projects with a newer version available upstream.
    #[arg(long)]
    old: bool,
    /// Only report locked projects missing from the vendor tree.
    #[arg(long)]
    missing: bool,
    /// The import path `-dot` roots its graph at.
    #[arg(long = "import-root", default_value = "")]
    import_root: String,
}

#[derive(Serialize)]
struct Entry {
    root: String,
    source: Option<String>,
    version: String,
    packages: Vec<String>,
}

/// The main entry point for the `status` subcommand.
pub(super) async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let proj = project::load().await?;
    let Some(lock) = &proj.lock else {
        anyhow::bail!("no {} found; run `depctl ensure` first", manifest::LOCK_FILENAME);
    };

    if args.missing {
        let vendor_root = proj.root.join("vendor");
        let statuses = vendor::verify_lock(&vendor_root, lock, &proj.manifest)?;
        let missing: Vec<_> = statuses.into_iter().filter(|(_, s)| matches!(s, vendor::Status::NotInTree)).collect();
        let lines = report::vendor_issues(&missing);
        report::print_lines(&lines, false);
        return Ok(ExitCode::SUCCESS);
    }

    if args.dot {
        println!("{}", dot::render_dot(&args.import_root, &proj.manifest, lock));
        return Ok(ExitCode::SUCCESS);
    }

    if args.json {
        let entries: Vec<Entry> = lock
            .projects
            .iter()
            .map(|p| Entry {
                root: p.root.to_string(),
                source: p.source.as_ref().map(|s| s.to_string()),
                version: p.version.to_string(),
                packages: p.packages.iter().cloned().collect(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(ExitCode::SUCCESS);
    }

    if args.old {
        for project in &lock.projects {
            if let Some(newest) = newest_version(&proj, project).await? {
                if newest != project.version {
                    println!("{}: {} -> {newest}", project.root, project.version);
                }
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    for project in &lock.projects {
        match &args.format {
            Some(template) => println!("{}", render_template(template, project)),
            None => println!("{} {}", project.root, project.version),
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn newest_version(proj: &project::Project, locked: &manifest::LockedProject) -> anyhow::Result<Option<version::Version>> {
    let url = match &locked.source {
        Some(source) => source.url().clone(),
        None => url::Url::parse(&format!("https://{}", locked.root.as_str()))?,
    };
    let mut versions = proj.manager.list_versions(&url).await?;
    version::sort_for_upgrade(None, &mut versions);
    Ok(versions.into_iter().next())
}

fn render_template(template: &str, project: &manifest::LockedProject) -> String {
    template
        .replace("{root}", project.root.as_str())
        .replace("{version}", &project.version.to_string())
        .replace("{source}", &project.source.as_ref().map(ToString::to_string).unwrap_or_default())
}
