//! Run a script in place against the host interpreter image.
//!
//! Same extraction cache and exit translation as a container, without
//! building one.

use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

use mcharm_pack::{exit_code_for, status_retrying_busy, ExtractionCache};
use tracing::debug;

use crate::error::{BuildError, Result};
use crate::runtime::RuntimeCache;
use crate::target::BuildTarget;
use crate::transform::ScriptTransform;

/// Tool name used for extraction cache entries.
pub const TOOL_NAME: &str = "mcharm";

/// Run `script` with `args` and return the exit code to report.
pub fn run_script(
    runtime: &RuntimeCache,
    transform: &dyn ScriptTransform,
    script: &Path,
    args: &[OsString],
) -> Result<i32> {
    let source = crate::builder::read_script(script)?;
    let payload = transform.transform(&source);

    let target = BuildTarget::host()?;
    let image = runtime.resolve_image(&target)?;

    let cache = ExtractionCache::new(&runtime.config().tmp_root, TOOL_NAME);
    let image_path = cache
        .materialize(&image)
        .map_err(|e| BuildError::io("materialize runtime", e))?;
    let payload_file = cache
        .write_payload(payload.as_bytes())
        .map_err(|e| BuildError::io("write payload", e))?;

    debug!(image = %image_path.display(), payload = %payload_file.path().display(), "running script");
    let status = status_retrying_busy(
        Command::new(&image_path)
            .arg(payload_file.path())
            .args(args),
    )
    .map_err(|e| BuildError::io(format!("spawn {}", image_path.display()), e))?;

    drop(payload_file);
    Ok(exit_code_for(status))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::PackConfig;
    use crate::transform::Passthrough;
    use std::fs;

    const SH_IMAGE: &[u8] = b"#!/bin/sh\nexec /bin/sh \"$@\"\n";

    fn runtime(root: &Path) -> RuntimeCache {
        let config = PackConfig {
            cache_root: root.join("cache"),
            tmp_root: root.join("tmp"),
            interactive: false,
            runtime_url: "http://127.0.0.1:9/{target}".to_string(),
            ..PackConfig::default()
        };
        RuntimeCache::new(config).with_embedded(Some(SH_IMAGE))
    }

    #[test]
    fn test_run_script_exit_code_and_cleanup() {
        let temp_dir = tempfile::tempdir().unwrap();
        let script = temp_dir.path().join("s.sh");
        fs::write(&script, "[ \"$1\" = go ] && exit 6\nexit 1\n").unwrap();

        let runtime = runtime(temp_dir.path());
        if BuildTarget::host().is_err() {
            return;
        }

        let code = run_script(&runtime, &Passthrough, &script, &[OsString::from("go")]).unwrap();
        assert_eq!(code, 6);

        // Only the image entry remains; the payload file is gone.
        let entries: Vec<_> = fs::read_dir(temp_dir.path().join("tmp"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].starts_with("mcharm-"));
        assert!(!entries[0].contains("payload"));
    }

    #[test]
    fn test_run_missing_script() {
        let temp_dir = tempfile::tempdir().unwrap();
        let runtime = runtime(temp_dir.path());

        let err = run_script(&runtime, &Passthrough, &temp_dir.path().join("nope"), &[]).unwrap_err();
        assert!(matches!(err, BuildError::ScriptNotFound { .. }));
    }
}
