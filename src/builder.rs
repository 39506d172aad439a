//! Builder: turns a script into a runnable artifact.
//!
//! Three modes, in increasing self-containment:
//!
//! - **minimal**: the payload behind a shebang line naming the interpreter.
//!   Needs the interpreter installed on the running machine.
//! - **wrapped**: a POSIX shell script carrying the payload base64-encoded.
//!   Still needs the interpreter, but checks for it and explains when missing.
//! - **container**: stub, interpreter image and payload in one native
//!   executable. Needs nothing on the running machine.
//!
//! Every mode validates all inputs before writing, and writes the output with
//! a temp-file-then-rename, so a failed build leaves the output path untouched.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use base64::Engine as _;
use mcharm_pack::{write_executable_atomic, Packer};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::PackConfig;
use crate::error::{BuildError, Result};
use crate::runtime::RuntimeCache;
use crate::stubs::StubLocator;
use crate::target::BuildTarget;
use crate::transform::{Passthrough, ScriptTransform};

/// Width of base64 lines in wrapped scripts.
const BASE64_LINE_WIDTH: usize = 76;

/// Heredoc delimiter for the wrapped payload; never produced by base64.
const PAYLOAD_DELIMITER: &str = "MCHARM_PAYLOAD";

/// Output kind produced by a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Shebang script for an installed interpreter.
    Minimal,
    /// Self-checking shell wrapper around an encoded payload.
    Wrapped,
    /// Native executable with embedded interpreter.
    #[default]
    Container,
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMode::Minimal => write!(f, "minimal"),
            BuildMode::Wrapped => write!(f, "wrapped"),
            BuildMode::Container => write!(f, "container"),
        }
    }
}

impl FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minimal" => Ok(BuildMode::Minimal),
            "wrapped" => Ok(BuildMode::Wrapped),
            "container" => Ok(BuildMode::Container),
            _ => Err(format!("invalid build mode: {}", s)),
        }
    }
}

/// Summary of a finished build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    /// Mode that was built.
    pub mode: BuildMode,
    /// Target name (container builds only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Input script.
    pub script: PathBuf,
    /// Written artifact.
    pub output: PathBuf,
    /// Size of the transformed payload.
    pub payload_size: u64,
    /// Size of the stub (container builds only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stub_size: Option<u64>,
    /// Size of the interpreter image (container builds only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_size: Option<u64>,
    /// Size of the written file.
    pub total_size: u64,
}

/// Builds artifacts from scripts.
pub struct Builder {
    runtime: RuntimeCache,
    stubs: StubLocator,
    transform: Box<dyn ScriptTransform>,
}

impl Builder {
    /// Builder using the default stub and image sources for `config`.
    pub fn new(config: PackConfig) -> Self {
        let stubs = StubLocator::new(&config);
        Self {
            runtime: RuntimeCache::new(config),
            stubs,
            transform: Box::new(Passthrough),
        }
    }

    /// Builder over explicit sources.
    pub fn with_sources(runtime: RuntimeCache, stubs: StubLocator) -> Self {
        Self {
            runtime,
            stubs,
            transform: Box::new(Passthrough),
        }
    }

    /// Replace the script transform.
    pub fn with_transform(mut self, transform: impl ScriptTransform + 'static) -> Self {
        self.transform = Box::new(transform);
        self
    }

    /// Runtime cache used for container builds.
    pub fn runtime(&self) -> &RuntimeCache {
        &self.runtime
    }

    /// Stub lookup used for container builds.
    pub fn stubs(&self) -> &StubLocator {
        &self.stubs
    }

    /// Build `script` into `output`.
    ///
    /// An explicit `target` is validated in every mode but only affects
    /// container builds. Without one, container builds use the host target;
    /// the other modes never need one.
    pub fn build(
        &self,
        script: &Path,
        output: &Path,
        mode: BuildMode,
        target: Option<&str>,
    ) -> Result<BuildReport> {
        let requested = target.map(str::parse::<BuildTarget>).transpose()?;

        let source = read_script(script)?;
        check_output(script, output)?;

        let payload = self.transform.transform(&source);
        debug!(
            script = %script.display(),
            source_size = source.len(),
            payload_size = payload.len(),
            "script transformed"
        );

        let report = match mode {
            BuildMode::Minimal => {
                let text = minimal_script(&self.runtime.config().interpreter, &payload);
                self.write_text(script, output, mode, &payload, &text)?
            }
            BuildMode::Wrapped => {
                let text = wrapped_script(&self.runtime.config().interpreter, &payload);
                self.write_text(script, output, mode, &payload, &text)?
            }
            BuildMode::Container => {
                let target = container_target(requested, BuildTarget::host)?;
                self.write_container(script, output, &target, &payload)?
            }
        };

        info!(
            mode = %report.mode,
            output = %report.output.display(),
            size = report.total_size,
            "build complete"
        );
        Ok(report)
    }

    fn write_text(
        &self,
        script: &Path,
        output: &Path,
        mode: BuildMode,
        payload: &str,
        text: &str,
    ) -> Result<BuildReport> {
        write_executable_atomic(output, &[text.as_bytes()])
            .map_err(|e| BuildError::io(format!("write output {}", output.display()), e))?;

        Ok(BuildReport {
            mode,
            target: None,
            script: script.to_path_buf(),
            output: output.to_path_buf(),
            payload_size: payload.len() as u64,
            stub_size: None,
            image_size: None,
            total_size: text.len() as u64,
        })
    }

    fn write_container(
        &self,
        script: &Path,
        output: &Path,
        target: &BuildTarget,
        payload: &str,
    ) -> Result<BuildReport> {
        let image = self.runtime.resolve_image(target)?;
        let stub = self.stubs.locate(target)?;

        let info = Packer::new(&stub, &image, payload.as_bytes())
            .pack(output)
            .map_err(BuildError::from)?;

        Ok(BuildReport {
            mode: BuildMode::Container,
            target: Some(target.name()),
            script: script.to_path_buf(),
            output: info.path,
            payload_size: info.payload_size,
            stub_size: Some(info.stub_size),
            image_size: Some(info.image_size),
            total_size: info.total_size,
        })
    }
}

/// Target of a container build: the requested one, else the host.
fn container_target(
    requested: Option<BuildTarget>,
    host: impl FnOnce() -> Result<BuildTarget>,
) -> Result<BuildTarget> {
    match requested {
        Some(target) => Ok(target),
        None => host(),
    }
}

/// Read a script as UTF-8 text.
pub fn read_script(script: &Path) -> Result<String> {
    if !script.is_file() {
        return Err(BuildError::ScriptNotFound {
            path: script.to_path_buf(),
        });
    }
    fs::read_to_string(script)
        .map_err(|e| BuildError::io(format!("read script {}", script.display()), e))
}

/// Refuse to write over the input script.
fn check_output(script: &Path, output: &Path) -> Result<()> {
    let same = match (fs::canonicalize(script), fs::canonicalize(output)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    if same {
        return Err(BuildError::io(
            format!("write output {}", output.display()),
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "output path is the input script",
            ),
        ));
    }
    Ok(())
}

/// Shebang line for an interpreter given by name or path.
fn shebang(interpreter: &str) -> String {
    if interpreter.starts_with('/') {
        format!("#!{}", interpreter)
    } else {
        format!("#!/usr/bin/env {}", interpreter)
    }
}

/// Payload behind a shebang, replacing any shebang the payload already had.
pub fn minimal_script(interpreter: &str, payload: &str) -> String {
    let body = match payload.strip_prefix("#!") {
        Some(rest) => rest.split_once('\n').map(|(_, body)| body).unwrap_or(""),
        None => payload,
    };
    format!(
        "{}\n# Built with mcharm {}\n{}",
        shebang(interpreter),
        crate::VERSION,
        body
    )
}

/// POSIX shell wrapper that decodes the payload to a temp file and runs it.
///
/// `MCHARM_INTERPRETER` overrides the interpreter at run time.
pub fn wrapped_script(interpreter: &str, payload: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(payload.as_bytes());
    let mut lines = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_WIDTH + 1);
    for chunk in encoded.as_bytes().chunks(BASE64_LINE_WIDTH) {
        // base64 output is ASCII.
        lines.push_str(&String::from_utf8_lossy(chunk));
        lines.push('\n');
    }

    let interpreter = interpreter.replace('\'', r"'\''");
    format!(
        r#"#!/bin/sh
# Built with mcharm {version}
default_interp='{interpreter}'
interp="${{MCHARM_INTERPRETER:-$default_interp}}"
if ! command -v "$interp" >/dev/null 2>&1; then
    echo "error: interpreter not found: $interp" >&2
    echo "Install it or set MCHARM_INTERPRETER to its path." >&2
    exit 127
fi
payload=$(mktemp "${{TMPDIR:-/tmp}}/mcharm-payload-XXXXXX") || exit 1
trap 'rm -f "$payload"' EXIT
base64 -d > "$payload" <<'{delim}'
{lines}{delim}
"$interp" "$payload" "$@"
exit $?
"#,
        version = crate::VERSION,
        interpreter = interpreter,
        delim = PAYLOAD_DELIMITER,
        lines = lines,
    )
}
