//! Subcommand definitions and dispatch for `depctl`.

use std::process::ExitCode;

use clap::Subcommand;

use super::Args;

mod check;
mod ensure;
mod init;
mod status;

/// The `depctl` subcommands.
#[derive(Subcommand)]
pub(super) enum Commands {
    /// Create a new, empty manifest in the current directory.
    Init(init::Args),
    /// Solve and lock dependencies, optionally updating the vendor tree.
    Ensure(ensure::Args),
    /// Report the locked dependency set.
    Status(status::Args),
    /// Verify the manifest, lock, and vendor tree are mutually consistent.
    Check(check::Args),
}

/// Dispatches to the subcommand named by `args`, returning the process's
/// final exit code.
pub async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let quiet = args.log.is_quiet();
    match args.command {
        Commands::Init(cmd_args) => {
            init::run(cmd_args)?;
            Ok(ExitCode::SUCCESS)
        },
        Commands::Ensure(cmd_args) => {
            ensure::run(cmd_args).await?;
            Ok(ExitCode::SUCCESS)
        },
        Commands::Status(cmd_args) => status::run(cmd_args).await,
        Commands::Check(cmd_args) => check::run(cmd_args, quiet).await,
    }
}
