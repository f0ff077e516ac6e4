//! # Ambient Configuration
//!
//! Resolves the source manager's on-disk cache root from a layered
//! [`Figment`]: built-in defaults, an optional user config file in the
//! platform's XDG-style config directory, and `DEPCTL_`-prefixed
//! environment variables, in that ascending order of precedence.
//!
//! A project's own configuration lives in its manifest, not a side file, so
//! there is no git-repository-discovered layer here -- only the built-in
//! defaults, the XDG user file, and the environment.

use std::path::{Path, PathBuf};

use etcetera::BaseStrategy;
use figment::providers::{Env, Format, Toml};
use figment::{Figment, Metadata, Provider};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The built-in default configuration, layered beneath any user file or
/// environment override.
const DEFAULT_TOML_CONFIG: &str = include_str!("./depctl.default.toml");

/// The `DEPCTL_`-prefixed environment variable namespace environment
/// overrides are read from (e.g. `DEPCTL_CACHE_ROOT`).
const ENV_PREFIX: &str = "DEPCTL_";

/// An error resolving or validating configuration.
#[derive(Error, Debug)]
pub enum Error {
    /// The layered configuration could not be extracted into [`Config`]'s shape.
    #[error(transparent)]
    Figment(#[from] Box<figment::Error>),
    /// The configured cache root exists but is a regular file, not a directory.
    #[error("cache root `{path}` exists and is not a directory")]
    NotADirectory {
        /// The offending path.
        path: PathBuf,
    },
    /// The configured cache root's parent directory does not exist.
    #[error("cache root `{path}` has no existing parent directory")]
    MissingParent {
        /// The offending path.
        path: PathBuf,
    },
    /// The cache root could not be created or written to.
    #[error("cache root `{path}` is not writable: {source}")]
    NotWritable {
        /// The offending path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Cache-related configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CacheConfig {
    /// An explicit cache root, overriding the per-user default. When
    /// unset, [`resolve_cache_root`] falls back to the platform cache
    /// directory (e.g. `~/.cache/depctl` on Linux).
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// The application's layered configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Cache-related settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Builds the layered [`Figment`]: built-in defaults, then a user
    /// config file in the platform config directory (if one exists), then
    /// `DEPCTL_`-prefixed environment variables.
    pub fn figment() -> Figment {
        let mut fig = Figment::from(Config::default()).merge(Toml::string(DEFAULT_TOML_CONFIG));

        if let Ok(strategy) = etcetera::choose_base_strategy() {
            let user_config = strategy.config_dir().join("depctl").join("depctl.toml");
            fig = fig.admerge(Toml::file(user_config));
        }

        fig.admerge(Env::prefixed(ENV_PREFIX))
    }

    /// Extracts a [`Config`] from an arbitrary provider, bypassing the
    /// default layering -- primarily for tests.
    pub fn from<T: Provider>(provider: T) -> Result<Config, Error> {
        Figment::from(provider).extract().map_err(|e| Error::Figment(Box::new(e)))
    }

    /// Loads the layered configuration from its canonical sources.
    pub fn load() -> Result<Config, Error> {
        Self::figment().extract().map_err(|e| Error::Figment(Box::new(e)))
    }
}

impl Provider for Config {
    fn metadata(&self) -> Metadata {
        Metadata::named("depctl config")
    }

    fn data(&self) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        figment::providers::Serialized::defaults(self).data()
    }
}

/// The platform default cache directory, used when no explicit override
/// is configured: `~/.cache/depctl` on Linux, the platform equivalent
/// elsewhere, or a temp-dir fallback if the platform strategy can't be
/// determined.
fn default_cache_dir() -> PathBuf {
    match etcetera::choose_base_strategy() {
        Ok(strategy) => strategy.cache_dir().join("depctl"),
        Err(_) => std::env::temp_dir().join("depctl"),
    }
}

/// Resolves and validates the cache root the source manager should use.
///
/// An explicit override must name an existing, writable directory, or a
/// path whose parent exists (the directory itself is created if missing);
/// a path that already exists as a regular file is rejected outright.
pub fn resolve_cache_root(config: &Config) -> Result<PathBuf, Error> {
    let root = config.cache.root.clone().unwrap_or_else(default_cache_dir);
    validate_cache_root(&root)?;
    Ok(root)
}

/// Validates `root` as a usable cache directory, creating it if it
/// doesn't yet exist.
fn validate_cache_root(root: &Path) -> Result<(), Error> {
    if root.is_file() {
        return Err(Error::NotADirectory { path: root.to_path_buf() });
    }

    if !root.exists() {
        match root.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
                return Err(Error::MissingParent { path: root.to_path_buf() });
            },
            _ => {},
        }
    }

    std::fs::create_dir_all(root).map_err(|source| Error::NotWritable { path: root.to_path_buf(), source })?;

    let probe = root.join(".depctl-write-probe");
    std::fs::write(&probe, b"").map_err(|source| Error::NotWritable { path: root.to_path_buf(), source })?;
    let _ = std::fs::remove_file(&probe);

    Ok(())
}
