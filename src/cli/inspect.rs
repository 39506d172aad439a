//! Inspect command.

use std::path::{Path, PathBuf};

use clap::Args;
use mcharm::{BuildError, Result};
use mcharm_pack::{content_hash, read_container, Container, PackError, TRAILER_SIZE};
use serde::Serialize;

use super::format_size;

/// Show the layout of a built container.
///
/// Examples:
///   mcharm inspect ./app
///   mcharm inspect ./app --json
#[derive(Args, Debug)]
pub struct InspectCmd {
    /// Container to inspect
    #[arg(value_name = "CONTAINER")]
    pub container: PathBuf,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

/// Segment layout and identity of a container.
#[derive(Debug, Serialize)]
pub struct InspectReport {
    /// Container path.
    pub path: PathBuf,
    /// Stub size (the image offset).
    pub stub_size: u64,
    /// Image segment offset.
    pub image_offset: u64,
    /// Image segment size.
    pub image_size: u64,
    /// Payload segment offset.
    pub payload_offset: u64,
    /// Payload segment size.
    pub payload_size: u64,
    /// Trailer size.
    pub trailer_size: u64,
    /// Content hash of the image, its extraction cache key.
    pub image_sha256: String,
    /// Whether the payload is valid UTF-8 text.
    pub payload_utf8: bool,
}

impl InspectReport {
    fn new(path: &Path, container: &Container) -> Self {
        let t = &container.trailer;
        Self {
            path: path.to_path_buf(),
            stub_size: t.stub_size(),
            image_offset: t.image_offset,
            image_size: t.image_size,
            payload_offset: t.payload_offset,
            payload_size: t.payload_size,
            trailer_size: TRAILER_SIZE as u64,
            image_sha256: content_hash(&container.image),
            payload_utf8: std::str::from_utf8(&container.payload).is_ok(),
        }
    }
}

impl InspectCmd {
    pub fn run(self) -> Result<()> {
        let container = read_container(&self.container).map_err(|e| {
            let operation = format!("inspect {}", self.container.display());
            match e {
                PackError::Io(io) => BuildError::io(operation, io),
                PackError::Format(format) => BuildError::io(
                    operation,
                    std::io::Error::new(std::io::ErrorKind::InvalidData, format),
                ),
            }
        })?;
        let report = InspectReport::new(&self.container, &container);

        if self.json {
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::warn!(error = %e, "report serialization failed"),
            }
            return Ok(());
        }

        println!("Container: {}", report.path.display());
        println!(
            "  stub:    0..{} ({})",
            report.image_offset,
            format_size(report.stub_size)
        );
        println!(
            "  image:   {}..{} ({})",
            report.image_offset,
            report.image_offset + report.image_size,
            format_size(report.image_size)
        );
        println!(
            "  payload: {}..{} ({})",
            report.payload_offset,
            report.payload_offset + report.payload_size,
            format_size(report.payload_size)
        );
        println!("  trailer: {} bytes", report.trailer_size);
        println!("  image sha256: {}", report.image_sha256);
        println!(
            "  payload text: {}",
            if report.payload_utf8 { "utf-8" } else { "not utf-8" }
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcharm_pack::Packer;

    #[test]
    fn test_report_fields() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("app");
        Packer::new(b"STUB", b"IMAGE", b"print(1)\n").pack(&path).unwrap();

        let container = read_container(&path).unwrap();
        let report = InspectReport::new(&path, &container);

        assert_eq!(report.stub_size, 4);
        assert_eq!(report.image_offset, 4);
        assert_eq!(report.payload_offset, 9);
        assert_eq!(report.payload_size, 9);
        assert_eq!(report.image_sha256, content_hash(b"IMAGE"));
        assert!(report.payload_utf8);
    }

    #[test]
    fn test_invalid_container_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("plain");
        std::fs::write(&path, vec![0u8; 128]).unwrap();

        let cmd = InspectCmd {
            container: path,
            json: false,
        };
        let err = cmd.run().unwrap_err();
        assert!(err.to_string().contains("invalid trailer magic"));
    }
}
