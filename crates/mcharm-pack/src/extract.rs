//! Extraction cache for interpreter images.
//!
//! Provides shared extraction logic used by both the `mcharm run` code path
//! and the stub's cached-extraction strategy.
//!
//! Entries live at `<root>/<tool>-<sha256 of image>/image`. The key is the
//! content hash, never the target name, so byte-identical images embedded in
//! different containers share one entry and an entry can never go stale.
//! Entries are written to a temp name inside the entry directory and renamed
//! into place; a concurrent first use either sees nothing or a complete file.
//!
//! The root is usually a shared temp directory, so an existing entry is only
//! reused after its bytes hash to the key. On Unix it must also be a regular
//! file owned by the current user and not writable by group or others.
//! Anything else is replaced.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::packer::EXECUTABLE_MODE;

/// File name of the materialized image inside a cache entry.
pub const IMAGE_FILE_NAME: &str = "image";

/// Hex-encoded SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Content-addressed cache of materialized interpreter images.
#[derive(Debug, Clone)]
pub struct ExtractionCache {
    root: PathBuf,
    tool: String,
}

impl ExtractionCache {
    /// Create a cache rooted at `root`, naming entries `<tool>-<hash>`.
    pub fn new(root: impl Into<PathBuf>, tool: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            tool: tool.into(),
        }
    }

    /// Cache rooted at the system temp directory.
    pub fn in_temp_dir(tool: impl Into<String>) -> Self {
        Self::new(std::env::temp_dir(), tool)
    }

    /// Root directory holding all entries.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of the entry for a given content hash.
    pub fn entry_dir(&self, hash: &str) -> PathBuf {
        self.root.join(format!("{}-{}", self.tool, hash))
    }

    /// Path the given image materializes to (whether or not it exists yet).
    pub fn image_path(&self, image: &[u8]) -> PathBuf {
        self.entry_dir(&content_hash(image)).join(IMAGE_FILE_NAME)
    }

    /// Ensure `image` exists on disk as an executable file and return its path.
    ///
    /// Calling this repeatedly, from one process or many at once, leaves
    /// exactly one file per distinct image and every caller succeeds.
    pub fn materialize(&self, image: &[u8]) -> std::io::Result<PathBuf> {
        let hash = content_hash(image);
        let dir = self.entry_dir(&hash);
        let path = dir.join(IMAGE_FILE_NAME);

        if is_trusted_entry(&path, &hash, image.len() as u64) {
            debug!(path = %path.display(), "reusing cached image");
            return Ok(path);
        }

        fs::create_dir_all(&dir)?;

        let mut temp = tempfile::Builder::new()
            .prefix(".image-")
            .tempfile_in(&dir)?;
        temp.write_all(image)?;
        temp.flush()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(temp.path(), fs::Permissions::from_mode(EXECUTABLE_MODE))?;
        }

        // An untrusted leftover is replaced; otherwise the first writer wins
        // and later writers discard their copy.
        let persisted = if fs::symlink_metadata(&path).is_ok() {
            temp.persist(&path)
        } else {
            temp.persist_noclobber(&path)
        };

        match persisted {
            // Close the write handle before anyone tries to exec the file.
            Ok(file) => drop(file),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "image materialized concurrently");
                if !is_trusted_entry(&path, &hash, image.len() as u64) {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::PermissionDenied,
                        format!("cache entry {} does not match its hash", path.display()),
                    ));
                }
            }
            Err(e) => return Err(e.error),
        }

        debug!(path = %path.display(), size = image.len(), "materialized image");
        Ok(path)
    }

    /// Write `payload` to a fresh per-invocation temp file under the root.
    ///
    /// The file is removed when the returned handle is dropped.
    pub fn write_payload(&self, payload: &[u8]) -> std::io::Result<PayloadFile> {
        fs::create_dir_all(&self.root)?;

        let prefix = format!("{}-payload-", self.tool);
        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".py")
            .tempfile_in(&self.root)?;
        file.write_all(payload)?;
        file.flush()?;

        debug!(path = %file.path().display(), size = payload.len(), "wrote payload");
        Ok(PayloadFile { file })
    }
}

/// A payload written to disk for the lifetime of one child process.
#[derive(Debug)]
pub struct PayloadFile {
    file: NamedTempFile,
}

impl PayloadFile {
    /// Path of the payload file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

fn is_trusted_entry(path: &Path, hash: &str, expected_len: u64) -> bool {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(_) => return false,
    };
    if !meta.is_file() || meta.len() != expected_len {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;

        // SAFETY: getuid has no preconditions and cannot fail.
        let uid = unsafe { libc::getuid() };
        if meta.uid() != uid || meta.mode() & 0o022 != 0 {
            debug!(path = %path.display(), "cache entry not owned by us or writable by others");
            return false;
        }
    }

    match fs::read(path) {
        Ok(bytes) if content_hash(&bytes) == hash => true,
        Ok(_) => {
            debug!(path = %path.display(), "cache entry does not match its hash");
            false
        }
        Err(_) => false,
    }
}
