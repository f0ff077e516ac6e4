//! # Source Backends & Manager
//!
//! Everything that ever touches a project's upstream: the [`backend::Source`]
//! trait and its three real dialects plus a test fixture, and the
//! [`manager::SourceManager`] that coalesces and caches calls into them.
//!
//! Callers outside this crate should go through [`manager::SourceManager`]
//! exclusively; the `backend` module is public so the solver and vendor
//! verifier's tests can wire up [`backend::fixture::FixtureSource`]
//! directly, and so an embedder can add a fourth dialect without touching
//! this crate.

pub mod backend;
pub mod manager;

pub use backend::{Dialect, PackageTree, Source};
pub use manager::{SourceManager, Staleness};
