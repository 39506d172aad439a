//! Runtime cache: interpreter images per target.
//!
//! Resolution order for a target's image:
//! 1. bytes embedded in this binary (host target only)
//! 2. `<cache_root>/runtimes/<target>`
//! 3. a local `zig build` when a source checkout is configured
//! 4. a download, after confirmation when interactive
//!
//! Steps 3 and 4 persist the image with the same atomic write used for
//! containers, so concurrent builds racing on one target never expose a torn
//! file. Cached images are never modified afterwards.

use std::borrow::Cow;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use mcharm_pack::write_executable_atomic;
use reqwest::blocking::Client;
use tracing::{debug, info, warn};

use crate::config::{is_source_checkout, PackConfig};
use crate::error::CacheError;
use crate::target::BuildTarget;

/// Interpreter image bytes, borrowed when embedded.
pub type ImageBytes = Cow<'static, [u8]>;

/// Upper bound on a downloaded image.
pub const MAX_IMAGE_SIZE: u64 = 64 * 1024 * 1024;

/// Download timeout.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Path of the runtime product inside a source checkout after `zig build`.
pub const LOCAL_BUILD_PRODUCT: &str = "runtime/zig-out/bin/mcharm-runtime";

/// Asks the user a yes/no question.
pub trait Confirm {
    /// Return true to proceed.
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Confirm for F {
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// `[y/N]` prompt on the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        eprint!("{} [y/N] ", prompt);
        let _ = std::io::stderr().flush();

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input).is_err() {
            return false;
        }
        let input = input.trim().to_lowercase();
        input == "y" || input == "yes"
    }
}

/// Resolves interpreter images for build targets.
pub struct RuntimeCache {
    config: PackConfig,
    embedded: Option<&'static [u8]>,
    confirm: Box<dyn Confirm>,
}

impl RuntimeCache {
    /// Cache using the embedded host image and a terminal prompt.
    pub fn new(config: PackConfig) -> Self {
        Self {
            config,
            embedded: crate::embedded::host_image(),
            confirm: Box::new(StdinConfirm),
        }
    }

    /// Replace the embedded host image.
    pub fn with_embedded(mut self, embedded: Option<&'static [u8]>) -> Self {
        self.embedded = embedded;
        self
    }

    /// Replace the confirmation prompt.
    pub fn with_confirm(mut self, confirm: impl Confirm + 'static) -> Self {
        self.confirm = Box::new(confirm);
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &PackConfig {
        &self.config
    }

    /// Whether `target`'s image is available without network or toolchain.
    pub fn is_available(&self, target: &BuildTarget) -> bool {
        (target.is_host() && self.embedded.is_some()) || self.config.runtime_path(target).is_file()
    }

    /// Image bytes for `target`.
    pub fn resolve_image(&self, target: &BuildTarget) -> Result<ImageBytes, CacheError> {
        if target.is_host() {
            if let Some(bytes) = self.embedded {
                debug!(target = %target, "using embedded runtime");
                return Ok(Cow::Borrowed(bytes));
            }
        }

        let path = self.config.runtime_path(target);
        let url = self.config.runtime_url_for(target);

        match fs::read(&path) {
            Ok(bytes) => {
                debug!(target = %target, path = %path.display(), "using cached runtime");
                return Ok(Cow::Owned(bytes));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CacheError::PermissionDenied {
                    url,
                    path,
                    source: e,
                })
            }
        }

        let bytes = match self.source_checkout() {
            Some(source_dir) => build_locally(&source_dir, target).map_err(|reason| {
                CacheError::LocalBuildFailed {
                    url: url.clone(),
                    path: path.clone(),
                    reason,
                }
            })?,
            None => {
                if self.config.interactive {
                    let prompt = format!("Runtime for {} is not cached. Download {}?", target, url);
                    if !self.confirm.confirm(&prompt) {
                        return Err(CacheError::FetchFailed {
                            url,
                            path,
                            reason: "download declined".to_string(),
                        });
                    }
                }
                eprintln!("Downloading runtime for {}...", target);
                fetch(&url).map_err(|reason| CacheError::FetchFailed {
                    url: url.clone(),
                    path: path.clone(),
                    reason,
                })?
            }
        };

        persist(&path, &bytes).map_err(|e| CacheError::PermissionDenied {
            url,
            path: path.clone(),
            source: e,
        })?;
        info!(target = %target, path = %path.display(), size = bytes.len(), "runtime cached");

        Ok(Cow::Owned(bytes))
    }

    fn source_checkout(&self) -> Option<PathBuf> {
        let dir = self.config.source_dir.as_ref()?;
        if is_source_checkout(dir) {
            Some(dir.clone())
        } else {
            warn!(dir = %dir.display(), "source dir has no runtime/build.zig, ignoring");
            None
        }
    }
}

fn persist(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    write_executable_atomic(path, &[bytes])
}

/// Download an image, bounded by [`MAX_IMAGE_SIZE`].
fn fetch(url: &str) -> Result<Vec<u8>, String> {
    let client = Client::builder()
        .timeout(FETCH_TIMEOUT)
        .user_agent(concat!("mcharm/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| e.to_string())?;

    let response = client.get(url).send().map_err(|e| e.to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {}", status.as_u16()));
    }

    let mut bytes = Vec::new();
    response
        .take(MAX_IMAGE_SIZE + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| e.to_string())?;

    if bytes.len() as u64 > MAX_IMAGE_SIZE {
        return Err(format!("image larger than {} bytes", MAX_IMAGE_SIZE));
    }
    if bytes.is_empty() {
        return Err("empty response".to_string());
    }
    Ok(bytes)
}

/// Build the runtime with zig in a source checkout and return the product.
fn build_locally(source_dir: &Path, target: &BuildTarget) -> Result<Vec<u8>, String> {
    eprintln!("Building runtime for {} with zig...", target);

    let status = Command::new("zig")
        .arg("build")
        .arg(format!("-Dtarget={}", target.zig_triple()))
        .arg("-Doptimize=ReleaseSmall")
        .current_dir(source_dir.join("runtime"))
        .status()
        .map_err(|e| format!("cannot run zig: {}", e))?;

    if !status.success() {
        return Err(format!("zig build exited with {}", status));
    }

    let product = source_dir.join(LOCAL_BUILD_PRODUCT);
    fs::read(&product).map_err(|e| format!("reading {} failed: {}", product.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn config(root: &Path) -> PackConfig {
        PackConfig {
            cache_root: root.to_path_buf(),
            // Nothing listens on port 9 locally; the fetch fails fast.
            runtime_url: "http://127.0.0.1:9/{version}/{target}".to_string(),
            interactive: false,
            source_dir: None,
            ..PackConfig::default()
        }
    }

    fn foreign_target() -> BuildTarget {
        *BuildTarget::ALL.iter().find(|t| !t.is_host()).unwrap()
    }

    #[test]
    fn test_cached_image_is_used() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = config(temp_dir.path());
        let target = foreign_target();

        fs::create_dir_all(config.runtimes_dir()).unwrap();
        fs::write(config.runtime_path(&target), b"RUNTIME").unwrap();

        let cache = RuntimeCache::new(config).with_embedded(None);
        assert!(cache.is_available(&target));
        assert_eq!(&*cache.resolve_image(&target).unwrap(), b"RUNTIME");
    }

    #[test]
    fn test_embedded_image_only_for_host() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = RuntimeCache::new(config(temp_dir.path())).with_embedded(Some(&b"EMBEDDED"[..]));

        assert!(!cache.is_available(&foreign_target()));
        if let Ok(host) = BuildTarget::host() {
            assert!(cache.is_available(&host));
            assert!(matches!(cache.resolve_image(&host).unwrap(), Cow::Borrowed(b) if b == b"EMBEDDED"));
        }
    }

    #[test]
    fn test_declined_download_fails_without_writing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = config(temp_dir.path());
        config.interactive = true;
        let path = config.runtime_path(&foreign_target());

        let asked = Rc::new(Cell::new(false));
        let asked_in_prompt = asked.clone();
        let cache = RuntimeCache::new(config)
            .with_embedded(None)
            .with_confirm(move |_: &str| {
                asked_in_prompt.set(true);
                false
            });

        let err = cache.resolve_image(&foreign_target()).unwrap_err();
        assert!(asked.get());
        assert!(matches!(err, CacheError::FetchFailed { ref reason, .. } if reason == "download declined"));
        assert!(err.to_string().contains(&path.display().to_string()));
        assert!(!path.exists());
    }

    #[test]
    fn test_unreachable_url_is_fetch_failed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = config(temp_dir.path());
        let target = foreign_target();
        let path = config.runtime_path(&target);

        let cache = RuntimeCache::new(config)
            .with_embedded(None)
            .with_confirm(|_: &str| -> bool { panic!("non-interactive must not prompt") });

        let err = cache.resolve_image(&target).unwrap_err();
        match &err {
            CacheError::FetchFailed { url, .. } => {
                assert!(url.starts_with("http://127.0.0.1:9/"));
                assert!(url.ends_with(&target.name()));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_bad_source_dir_falls_through_to_fetch() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = config(temp_dir.path());
        config.source_dir = Some(temp_dir.path().join("not-a-checkout"));

        let cache = RuntimeCache::new(config).with_embedded(None);
        assert!(matches!(
            cache.resolve_image(&foreign_target()),
            Err(CacheError::FetchFailed { .. })
        ));
    }

    #[test]
    #[cfg(unix)]
    fn test_unreadable_cache_entry_is_permission_denied() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = config(temp_dir.path());
        let target = foreign_target();

        // A directory where the image file should be cannot be read as one.
        fs::create_dir_all(config.runtime_path(&target)).unwrap();

        let cache = RuntimeCache::new(config).with_embedded(None);
        assert!(matches!(
            cache.resolve_image(&target),
            Err(CacheError::PermissionDenied { .. })
        ));
    }
}
