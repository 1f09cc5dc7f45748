// src/lib.rs

//! opkgmirror
//!
//! Mirrors binary packages published as upstream release assets into a
//! locally served opkg repository, keeping exactly one revision of each
//! package per target architecture and republishing a consistent, signed
//! package index after every change.
//!
//! # Architecture
//!
//! - Catalog-first: sources are declared once in a JSON catalog
//! - Buckets: one directory per architecture, guarded by a per-bucket lock
//! - Single revision: installing a package supersedes every older revision
//!   sharing its name prefix
//! - Rebuilt, never patched: index artifacts are always derived from a
//!   fresh directory listing

pub mod bucket;
pub mod catalog;
mod error;
pub mod filter;
pub mod index;
pub mod orchestrator;
pub mod resolver;
pub mod sign;

pub use error::{Error, Result};
