//! Stub lookup.
//!
//! A target's stub is taken from, in order:
//! 1. the stub embedded in this binary (host target only)
//! 2. `<cache_root>/stubs/<stub_id>`
//! 3. `<stub_id>` or `mcharm-stub` next to the running `mcharm` executable
//!    (host target only for the unsuffixed name)

use std::borrow::Cow;
use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::config::PackConfig;
use crate::error::{BuildError, Result};
use crate::target::BuildTarget;

/// File name of a stub built alongside `mcharm` by cargo.
pub const SIBLING_STUB_NAME: &str = "mcharm-stub";

/// Finds stub bytes for a target.
#[derive(Debug, Clone)]
pub struct StubLocator {
    embedded: Option<&'static [u8]>,
    stubs_dir: PathBuf,
    exe_dir: Option<PathBuf>,
}

impl StubLocator {
    /// Locator using the embedded stub, the cache and the current executable.
    pub fn new(config: &PackConfig) -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(PathBuf::from));
        Self {
            embedded: crate::embedded::host_stub(),
            stubs_dir: config.stubs_dir(),
            exe_dir,
        }
    }

    /// Locator over explicit sources.
    pub fn with_sources(
        embedded: Option<&'static [u8]>,
        stubs_dir: impl Into<PathBuf>,
        exe_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            embedded,
            stubs_dir: stubs_dir.into(),
            exe_dir,
        }
    }

    /// On-disk paths searched for `target`, in order.
    pub fn candidates(&self, target: &BuildTarget) -> Vec<PathBuf> {
        let mut paths = vec![self.stubs_dir.join(target.stub_id())];
        if let Some(dir) = &self.exe_dir {
            paths.push(dir.join(target.stub_id()));
            if target.is_host() {
                paths.push(dir.join(SIBLING_STUB_NAME));
            }
        }
        paths
    }

    /// Stub bytes for `target`.
    pub fn locate(&self, target: &BuildTarget) -> Result<Cow<'static, [u8]>> {
        if target.is_host() {
            if let Some(bytes) = self.embedded {
                debug!(target = %target, "using embedded stub");
                return Ok(Cow::Borrowed(bytes));
            }
        }

        for path in self.candidates(target) {
            match fs::read(&path) {
                Ok(bytes) if !bytes.is_empty() => {
                    debug!(target = %target, path = %path.display(), "using stub");
                    return Ok(Cow::Owned(bytes));
                }
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(BuildError::io(format!("read stub {}", path.display()), e)),
            }
        }

        Err(BuildError::UnsupportedTarget {
            target: format!("{} (no stub found)", target),
        })
    }

    /// Whether a stub for `target` is available without network access.
    pub fn is_available(&self, target: &BuildTarget) -> bool {
        (target.is_host() && self.embedded.is_some())
            || self.candidates(target).iter().any(|p| {
                fs::metadata(p)
                    .map(|m| m.is_file() && m.len() > 0)
                    .unwrap_or(false)
            })
    }
}
