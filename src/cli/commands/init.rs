//! The `init` subcommand: writes an empty manifest into the current directory.

use clap::Parser;

/// The `init` subcommand.
#[derive(Parser, Debug)]
#[command(next_help_heading = "Init Options")]
pub struct Args {
    /// The directory to initialize, defaulting to the current directory.
    #[arg(default_value = ".")]
    path: std::path::PathBuf,
}

/// The main entry point for the `init` subcommand.
pub(super) fn run(args: Args) -> anyhow::Result<()> {
    let manifest_path = args.path.join(manifest::MANIFEST_FILENAME);
    if manifest_path.exists() {
        tracing::warn!(path = %manifest_path.display(), "manifest already exists, leaving it untouched");
        return Ok(());
    }

    std::fs::create_dir_all(&args.path)?;
    let text = manifest::toml::manifest_to_string(&manifest::Manifest::default())?;
    std::fs::write(&manifest_path, text)?;
    tracing::info!(path = %manifest_path.display(), "wrote a new manifest");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_a_manifest_into_an_empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        run(Args { path: tmp.path().to_path_buf() }).unwrap();
        assert!(tmp.path().join(manifest::MANIFEST_FILENAME).is_file());
    }

    #[test]
    fn does_not_overwrite_an_existing_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(manifest::MANIFEST_FILENAME);
        std::fs::write(&path, "# hand-edited\n").unwrap();

        run(Args { path: tmp.path().to_path_buf() }).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# hand-edited\n");
    }
}
