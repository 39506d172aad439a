//! Interpreter launch for containers.
//!
//! Making the image runnable is the only platform-specific step of the
//! loader, so it sits behind [`ExecutionStrategy`]:
//!
//! - **Zero-disk** (Linux): image and payload are copied into anonymous
//!   memory-backed descriptors and run through `/proc/self/fd/N`. Nothing is
//!   written to persistent storage.
//! - **Cached extraction** (everywhere else, and the Linux fallback): the
//!   image is materialized once per content hash under the temp directory and
//!   the payload goes to a per-invocation temp file removed after the child
//!   exits.

use std::ffi::OsString;
use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

use mcharm_pack::{status_retrying_busy, ExtractionCache, PayloadFile};
use tracing::debug;

use crate::error::LoaderError;

/// Name used for cache entries and anonymous descriptors.
pub const TOOL_NAME: &str = "mcharm";

/// A way of turning in-memory image and payload bytes into runnable paths.
pub trait ExecutionStrategy {
    /// Short name for diagnostics.
    fn name(&self) -> &'static str;

    /// Make `image` executable and `payload` readable by path.
    fn materialize(&self, image: &[u8], payload: &[u8]) -> Result<Materialized, LoaderError>;
}

/// Runnable handles for one invocation.
///
/// Dropping this releases the descriptors and removes the temp payload file,
/// whichever way the loader exits.
///
/// Zero-disk descriptors stay open across exec: the interpreter reopens the
/// payload through `/proc/self/fd/N`, and a script image is reopened the same
/// way by its `#!` interpreter. Processes the script spawns inherit them too.
#[derive(Debug)]
pub struct Materialized {
    /// Path to execute as the interpreter.
    pub image: PathBuf,
    /// Path handed to the interpreter as its script.
    pub payload: PathBuf,
    _image_fd: Option<OwnedFd>,
    _payload_fd: Option<OwnedFd>,
    _payload_file: Option<PayloadFile>,
}

/// Content-hash cached extraction under a temp root.
pub struct CachedExtraction {
    cache: ExtractionCache,
}

impl CachedExtraction {
    /// Strategy backed by the given cache.
    pub fn new(cache: ExtractionCache) -> Self {
        Self { cache }
    }
}

impl ExecutionStrategy for CachedExtraction {
    fn name(&self) -> &'static str {
        "cached-extraction"
    }

    fn materialize(&self, image: &[u8], payload: &[u8]) -> Result<Materialized, LoaderError> {
        let image_path = self
            .cache
            .materialize(image)
            .map_err(LoaderError::MaterializationFailed)?;
        let payload_file = self
            .cache
            .write_payload(payload)
            .map_err(LoaderError::MaterializationFailed)?;

        Ok(Materialized {
            image: image_path,
            payload: payload_file.path().to_path_buf(),
            _image_fd: None,
            _payload_fd: None,
            _payload_file: Some(payload_file),
        })
    }
}

/// Anonymous memory-backed execution.
#[cfg(target_os = "linux")]
pub struct ZeroDisk;

#[cfg(target_os = "linux")]
impl ExecutionStrategy for ZeroDisk {
    fn name(&self) -> &'static str {
        "zero-disk"
    }

    fn materialize(&self, image: &[u8], payload: &[u8]) -> Result<Materialized, LoaderError> {
        let image_fd = memfd::readonly_copy(c"mcharm-image", image)
            .map_err(LoaderError::MaterializationFailed)?;
        let payload_fd = memfd::readonly_copy(c"mcharm-payload", payload)
            .map_err(LoaderError::MaterializationFailed)?;

        Ok(Materialized {
            image: memfd::fd_path(&image_fd),
            payload: memfd::fd_path(&payload_fd),
            _image_fd: Some(image_fd),
            _payload_fd: Some(payload_fd),
            _payload_file: None,
        })
    }
}

/// Strategies available on this platform, most preferred first.
pub fn strategies() -> Vec<Box<dyn ExecutionStrategy>> {
    let mut list: Vec<Box<dyn ExecutionStrategy>> = Vec::new();
    #[cfg(target_os = "linux")]
    list.push(Box::new(ZeroDisk));
    list.push(Box::new(CachedExtraction::new(ExtractionCache::in_temp_dir(
        TOOL_NAME,
    ))));
    list
}

/// Materialize with the first strategy that works.
///
/// Only the last strategy's failure is reported; earlier failures mean the
/// platform primitive is unavailable at run time, not that the container is
/// broken.
pub fn materialize_with(
    strategies: &[Box<dyn ExecutionStrategy>],
    image: &[u8],
    payload: &[u8],
) -> Result<Materialized, LoaderError> {
    let mut last_err = None;
    for strategy in strategies {
        match strategy.materialize(image, payload) {
            Ok(materialized) => {
                debug!(strategy = strategy.name(), image = %materialized.image.display(), "image materialized");
                return Ok(materialized);
            }
            Err(e) => {
                debug!(strategy = strategy.name(), error = %e, "strategy unavailable");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        LoaderError::MaterializationFailed(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "no execution strategy available",
        ))
    }))
}

/// Run the interpreter on the payload with the user's arguments and wait.
///
/// The child inherits stdin, stdout and stderr unchanged.
pub fn spawn_and_wait(
    materialized: &Materialized,
    args: &[OsString],
) -> Result<ExitStatus, LoaderError> {
    let status = status_retrying_busy(
        Command::new(&materialized.image)
            .arg(&materialized.payload)
            .args(args),
    )
    .map_err(LoaderError::SpawnFailed)?;

    debug!(?status, "interpreter exited");
    Ok(status)
}

#[cfg(target_os = "linux")]
mod memfd {
    use std::ffi::{CStr, CString};
    use std::fs::File;
    use std::io::Write;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
    use std::path::PathBuf;

    /// `MFD_EXEC`; kernels with `vm.memfd_noexec` need it to allow exec.
    const MFD_EXEC: libc::c_uint = 0x0010;

    /// Path through which a child process reaches an inherited descriptor.
    pub fn fd_path(fd: &OwnedFd) -> PathBuf {
        PathBuf::from(format!("/proc/self/fd/{}", fd.as_raw_fd()))
    }

    /// Copy `bytes` into a new memfd and return a read-only, inheritable
    /// descriptor to it.
    pub fn readonly_copy(name: &CStr, bytes: &[u8]) -> std::io::Result<OwnedFd> {
        let mut file = File::from(create(name)?);
        file.write_all(bytes)?;

        // exec refuses a file that is still open for writing, so hand the
        // child a fresh read-only descriptor and close the writable one.
        let path = CString::new(format!("/proc/self/fd/{}", file.as_raw_fd()))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        // No O_CLOEXEC: the child reopens this descriptor by path after exec,
        // so its own children inherit it as well.
        let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDONLY) };
        if fd < 0 {
            return Err(std::io::Error::last_os_error());
        }
        drop(file);

        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    fn create(name: &CStr) -> std::io::Result<OwnedFd> {
        // The writable descriptor must never reach a child.
        let mut fd = unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC | MFD_EXEC) };
        if fd < 0 && std::io::Error::last_os_error().raw_os_error() == Some(libc::EINVAL) {
            // Kernels older than 6.3 reject MFD_EXEC.
            fd = unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC) };
        }
        if fd < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// Stand-in interpreter: runs the payload as a shell script.
    const SH_IMAGE: &[u8] = b"#!/bin/sh\nexec /bin/sh \"$@\"\n";

    fn cached(root: &std::path::Path) -> CachedExtraction {
        CachedExtraction::new(ExtractionCache::new(root, TOOL_NAME))
    }

    #[test]
    fn test_cached_extraction_runs_payload() {
        let temp_dir = tempfile::tempdir().unwrap();
        let strategy = cached(temp_dir.path());

        let materialized = strategy.materialize(SH_IMAGE, b"exit 3\n").unwrap();
        let status = spawn_and_wait(&materialized, &[]).unwrap();
        assert_eq!(mcharm_pack::exit_code_for(status), 3);
    }

    #[test]
    fn test_cached_extraction_removes_payload_keeps_image() {
        let temp_dir = tempfile::tempdir().unwrap();
        let strategy = cached(temp_dir.path());

        let materialized = strategy.materialize(SH_IMAGE, b"exit 0\n").unwrap();
        let image = materialized.image.clone();
        let payload = materialized.payload.clone();
        assert!(payload.exists());

        drop(materialized);
        assert!(!payload.exists());
        assert!(image.exists());

        // Second run reuses the same entry.
        let again = strategy.materialize(SH_IMAGE, b"exit 0\n").unwrap();
        assert_eq!(again.image, image);
    }

    #[test]
    fn test_arguments_follow_payload() {
        let temp_dir = tempfile::tempdir().unwrap();
        let strategy = cached(temp_dir.path());

        let materialized = strategy
            .materialize(SH_IMAGE, b"[ \"$1\" = one ] && [ \"$2\" = two ] && exit 9\nexit 1\n")
            .unwrap();
        let args = vec![OsString::from("one"), OsString::from("two")];
        let status = spawn_and_wait(&materialized, &args).unwrap();
        assert_eq!(mcharm_pack::exit_code_for(status), 9);
    }

    #[test]
    fn test_signal_exit_translation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let strategy = cached(temp_dir.path());

        let materialized = strategy.materialize(SH_IMAGE, b"kill -KILL $$\n").unwrap();
        let status = spawn_and_wait(&materialized, &[]).unwrap();
        assert_eq!(mcharm_pack::exit_code_for(status), 137);
    }

    #[test]
    fn test_spawn_failure_for_non_executable_image() {
        let temp_dir = tempfile::tempdir().unwrap();
        let strategy = cached(temp_dir.path());

        let mut materialized = strategy.materialize(SH_IMAGE, b"").unwrap();
        materialized.image = temp_dir.path().join("missing-image");

        let result = spawn_and_wait(&materialized, &[]);
        assert!(matches!(result, Err(LoaderError::SpawnFailed(_))));
    }

    #[test]
    fn test_materialize_with_falls_back() {
        struct Broken;
        impl ExecutionStrategy for Broken {
            fn name(&self) -> &'static str {
                "broken"
            }
            fn materialize(&self, _: &[u8], _: &[u8]) -> Result<Materialized, LoaderError> {
                Err(LoaderError::MaterializationFailed(std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "nope",
                )))
            }
        }

        let temp_dir = tempfile::tempdir().unwrap();
        let list: Vec<Box<dyn ExecutionStrategy>> =
            vec![Box::new(Broken), Box::new(cached(temp_dir.path()))];

        let materialized = materialize_with(&list, SH_IMAGE, b"exit 0\n").unwrap();
        assert!(materialized.image.starts_with(temp_dir.path()));

        let only_broken: Vec<Box<dyn ExecutionStrategy>> = vec![Box::new(Broken)];
        assert!(matches!(
            materialize_with(&only_broken, SH_IMAGE, b""),
            Err(LoaderError::MaterializationFailed(_))
        ));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_zero_disk_runs_without_files() {
        // The payload only exits 5 when the interpreter read it from a descriptor.
        let payload = b"case \"$0\" in /proc/self/fd/*) exit 5 ;; esac\nexit 1\n";
        let materialized = match ZeroDisk.materialize(SH_IMAGE, payload) {
            Ok(m) => m,
            // memfd may be blocked in restricted sandboxes.
            Err(_) => return,
        };
        assert!(materialized.image.starts_with("/proc/self/fd"));
        assert!(materialized.payload.starts_with("/proc/self/fd"));

        let status = spawn_and_wait(&materialized, &[]).unwrap();
        assert_eq!(mcharm_pack::exit_code_for(status), 5);
    }
}
