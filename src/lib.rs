//! mcharm - package scripts into self-contained native executables
//!
//! A container is a single executable made of four segments:
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │  stub       bootstrap loader (mcharm-stub)      │
//! ├─────────────────────────────────────────────────┤
//! │  image      interpreter executable              │
//! ├─────────────────────────────────────────────────┤
//! │  payload    bundled script source               │
//! ├─────────────────────────────────────────────────┤
//! │  trailer    48 bytes, offsets and sizes         │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! This crate resolves stubs and interpreter images per target and writes
//! containers; the container format itself lives in `mcharm-pack`.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use mcharm::{BuildMode, Builder, PackConfig};
//!
//! let builder = Builder::new(PackConfig::load()?);
//! let report = builder.build(
//!     Path::new("hello.py"),
//!     Path::new("hello"),
//!     BuildMode::Container,
//!     Some("linux-x86_64"),
//! )?;
//! println!("wrote {} bytes", report.total_size);
//! # Ok::<(), mcharm::BuildError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod config;
mod embedded;
pub mod error;
pub mod run;
pub mod runtime;
pub mod stubs;
pub mod target;
pub mod transform;

pub use builder::{BuildMode, BuildReport, Builder};
pub use config::PackConfig;
pub use error::{BuildError, CacheError, Result};
pub use runtime::{Confirm, RuntimeCache, StdinConfirm};
pub use stubs::StubLocator;
pub use target::{Arch, BuildTarget, Os};
pub use transform::{Passthrough, ScriptTransform};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
