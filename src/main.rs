//! The main entry point for the `depctl` CLI.

#![warn(missing_docs)]

use std::process::ExitCode;

use clap::Parser;
use depctl::cli::{self, Args};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse_from(cli::change_directory());
    let Args { log, .. } = args;

    let _guard = cli::init_global_subscriber(log);

    match cli::run(args).await {
        Ok(code) => code,
        Err(e) => {
            depctl::fatal!(e);
            ExitCode::FAILURE
        },
    }
}
