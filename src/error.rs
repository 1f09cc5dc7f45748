// src/error.rs

use thiserror::Error;

/// Core error types for opkgmirror
#[derive(Error, Debug)]
pub enum Error {
    /// Source catalog is missing or malformed (fatal, aborts the run)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A release endpoint could not be resolved (recoverable, skip the source)
    #[error("Resolve error: {0}")]
    Resolve(String),

    /// An asset download failed (recoverable, skip the asset)
    #[error("Download error: {0}")]
    Download(String),

    /// An index rebuild failed (recoverable, skip the bucket)
    #[error("Index build error: {0}")]
    IndexBuild(String),

    /// A signing key or signature could not be read or used
    #[error("Signing error: {0}")]
    Signing(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using opkgmirror's Error type
pub type Result<T> = std::result::Result<T, Error>;
