//! Container format and shared runtime plumbing for mcharm executables.
//!
//! A container is a single native executable made of four contiguous
//! segments, written in this order with no padding:
//!
//! ```text
//! +---------------------------+
//! | Stub Executable           |  bootstrap loader (mcharm-stub)
//! +---------------------------+
//! | Interpreter Image         |  complete interpreter executable
//! +---------------------------+
//! | Payload (UTF-8)           |  bundled script text
//! +---------------------------+
//! | Trailer (48 bytes)        |
//! |  - magic: "MCHARM01"      |
//! |  - image offset/size      |
//! |  - payload offset/size    |
//! |  - magic: "MCHARM01"      |
//! +---------------------------+
//! ```
//!
//! The stub finds the trailer by reading the last 48 bytes of its own file.
//! This crate is shared by the `mcharm` packaging tool (assembly, inspection,
//! run-in-place) and the stub (validation, extraction, exit translation).

#![deny(missing_docs)]

pub mod extract;
pub mod format;
pub mod packer;
pub mod process;

pub use extract::{content_hash, ExtractionCache, PayloadFile};
pub use format::{
    decode_trailer, encode_trailer, validate_against_file_size, Trailer, MAGIC, TRAILER_SIZE,
};
pub use packer::{read_container, read_trailer, write_executable_atomic, Container, PackedInfo, Packer};
pub use process::{exit_code_for, status_retrying_busy};

use thiserror::Error;

/// Errors produced when interpreting container bytes.
///
/// Both variants are fatal: a container that fails to decode or validate is
/// never executed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// One or both magic fields of the trailer do not match [`MAGIC`].
    #[error("invalid trailer magic: expected {}", String::from_utf8_lossy(MAGIC))]
    BadMagic,

    /// The trailer describes segments that do not fit the file.
    #[error("container truncated: {0}")]
    Truncated(String),
}

/// Errors that can occur while assembling or reading a container.
#[derive(Debug, Error)]
pub enum PackError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The container bytes are malformed.
    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Result type for pack operations.
pub type Result<T> = std::result::Result<T, PackError>;
