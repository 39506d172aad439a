//! Error types for the packaging tool.
//!
//! Messages follow `"<operation> failed: <reason>"` or
//! `"<entity> not found: <identifier>"`, all lowercase. Cache failures always
//! carry the URL and local path a user needs to finish the step by hand.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`BuildError`].
pub type Result<T> = std::result::Result<T, BuildError>;

/// Errors resolving an interpreter image.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Download was declined, unreachable, or returned an error.
    #[error(
        "runtime fetch failed: {reason}\n  download {url}\n  and save it as {}",
        path.display()
    )]
    FetchFailed {
        /// Remote URL of the image.
        url: String,
        /// Where the image is expected locally.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The local toolchain could not produce the image.
    #[error(
        "runtime local build failed: {reason}\n  build it manually or download {url}\n  and save it as {}",
        path.display()
    )]
    LocalBuildFailed {
        /// Remote URL of the image.
        url: String,
        /// Where the image is expected locally.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The cache directory could not be read or written.
    #[error(
        "runtime cache access failed: {}: {source}\n  download {url}\n  and save it as {}",
        path.display(),
        path.display()
    )]
    PermissionDenied {
        /// Remote URL of the image.
        url: String,
        /// Path that could not be accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors that abort a build before anything is written.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Input script is missing or unreadable.
    #[error("script not found: {}", path.display())]
    ScriptNotFound {
        /// Path that was given.
        path: PathBuf,
    },

    /// Target is unknown, or has no stub available.
    #[error("unsupported target: {target}")]
    UnsupportedTarget {
        /// Target as given or named.
        target: String,
    },

    /// Interpreter image could not be resolved.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Reading inputs or writing the output failed.
    #[error("{operation} failed: {source}")]
    IoFailure {
        /// The operation that failed (e.g., "write output").
        operation: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    /// Create an I/O failure for an operation.
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::IoFailure {
            operation: operation.into(),
            source,
        }
    }
}

impl From<mcharm_pack::PackError> for BuildError {
    fn from(err: mcharm_pack::PackError) -> Self {
        match err {
            mcharm_pack::PackError::Io(e) => BuildError::io("write container", e),
            mcharm_pack::PackError::Format(e) => BuildError::io(
                "write container",
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            ),
        }
    }
}
