//! TOML marshalling for [`Manifest`] and [`Lock`].
//!
//! Deliberately thin: just enough `FromStr` / `TryFrom<PathBuf>` plumbing to
//! round-trip the documented manifest and lock shapes, not a
//! general-purpose config library.

use std::path::Path;
use std::str::FromStr;

use thiserror::Error;
use toml_edit::de;

use crate::{Lock, Manifest};

/// An error (de)serializing a [`Manifest`] or [`Lock`].
#[derive(Error, Debug)]
pub enum Error {
    /// The TOML was malformed.
    #[error(transparent)]
    InvalidToml(#[from] toml_edit::TomlError),
    /// The TOML was well-formed but didn't match the expected shape.
    #[error(transparent)]
    InvalidShape(#[from] de::Error),
    /// Serialization failed (only possible for cyclic or non-finite values, never hit here).
    #[error(transparent)]
    Ser(#[from] toml_edit::ser::Error),
    /// The file could not be read or written.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FromStr for Manifest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(de::from_str(s)?)
    }
}

impl FromStr for Lock {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(de::from_str(s)?)
    }
}

/// Serializes a [`Manifest`] to its TOML text form.
pub fn manifest_to_string(manifest: &Manifest) -> Result<String, Error> {
    Ok(toml_edit::ser::to_string_pretty(manifest)?)
}

/// Serializes a [`Lock`] to its TOML text form.
pub fn lock_to_string(lock: &Lock) -> Result<String, Error> {
    Ok(toml_edit::ser::to_string_pretty(lock)?)
}

/// Reads and parses a manifest file.
pub fn read_manifest(path: &Path) -> Result<Manifest, Error> {
    Manifest::from_str(&std::fs::read_to_string(path)?)
}

/// Reads and parses a lock file.
pub fn read_lock(path: &Path) -> Result<Lock, Error> {
    Lock::from_str(&std::fs::read_to_string(path)?)
}
