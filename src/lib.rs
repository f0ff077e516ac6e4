//! depctl, a dependency manager for a statically-linked, import-path-based
//! package ecosystem.

#![warn(missing_docs)]

pub mod cli;
