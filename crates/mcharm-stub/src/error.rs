//! Loader failures.
//!
//! Every failure terminates the container immediately. Each variant has its
//! own exit code so wrappers can tell a broken container from a script that
//! exited non-zero.

use mcharm_pack::{FormatError, PackError};
use thiserror::Error;

/// Errors that can occur while booting a container.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The running executable could not be located or read.
    #[error("reading own executable failed: {0}")]
    SelfReadFailed(#[source] std::io::Error),

    /// The trailer is missing, corrupt, or describes segments past the end
    /// of the file.
    #[error("invalid container: {0}")]
    TrailerInvalid(#[from] FormatError),

    /// The interpreter image or payload could not be made runnable.
    #[error("materializing interpreter image failed: {0}")]
    MaterializationFailed(#[source] std::io::Error),

    /// The interpreter process could not be started.
    #[error("spawning interpreter failed: {0}")]
    SpawnFailed(#[source] std::io::Error),
}

impl LoaderError {
    /// Exit code reported for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            LoaderError::SelfReadFailed(_) => 121,
            LoaderError::TrailerInvalid(_) => 122,
            LoaderError::MaterializationFailed(_) => 123,
            LoaderError::SpawnFailed(_) => 124,
        }
    }
}

impl From<PackError> for LoaderError {
    fn from(err: PackError) -> Self {
        match err {
            PackError::Format(e) => LoaderError::TrailerInvalid(e),
            PackError::Io(e) => LoaderError::SelfReadFailed(e),
        }
    }
}
