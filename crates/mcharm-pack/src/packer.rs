//! Container assembly and reading.
//!
//! Assembly concatenates stub, image, payload and trailer into a single file.
//! Output is always written to a temporary file in the destination directory
//! and renamed into place, so no reader ever observes a half-written
//! executable at the final path.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::format::{decode_trailer, validate_against_file_size, Trailer, TRAILER_SIZE};
use crate::Result;

/// Permission bits applied to every executable this crate writes.
pub const EXECUTABLE_MODE: u32 = 0o755;

/// Container assembler.
pub struct Packer<'a> {
    stub: &'a [u8],
    image: &'a [u8],
    payload: &'a [u8],
}

impl<'a> Packer<'a> {
    /// Create a packer over the three content segments.
    pub fn new(stub: &'a [u8], image: &'a [u8], payload: &'a [u8]) -> Self {
        Self {
            stub,
            image,
            payload,
        }
    }

    /// Trailer describing the segments held by this packer.
    pub fn trailer(&self) -> Trailer {
        Trailer::for_segments(
            self.stub.len() as u64,
            self.image.len() as u64,
            self.payload.len() as u64,
        )
    }

    /// Write `stub ++ image ++ payload ++ trailer` to `output` and mark it
    /// executable.
    pub fn pack(&self, output: impl AsRef<Path>) -> Result<PackedInfo> {
        let output = output.as_ref();
        let trailer = self.trailer();
        let trailer_bytes = trailer.to_bytes();

        write_executable_atomic(
            output,
            &[self.stub, self.image, self.payload, &trailer_bytes[..]],
        )?;

        let info = PackedInfo {
            path: output.to_path_buf(),
            stub_size: self.stub.len() as u64,
            image_size: trailer.image_size,
            payload_size: trailer.payload_size,
            total_size: trailer.container_size().unwrap_or_default(),
        };

        debug!(
            output = %output.display(),
            stub_size = info.stub_size,
            image_size = info.image_size,
            payload_size = info.payload_size,
            "container written"
        );

        Ok(info)
    }
}

/// Information about a packed container.
#[derive(Debug, Clone)]
pub struct PackedInfo {
    /// Path the container was written to.
    pub path: PathBuf,
    /// Size of the stub executable.
    pub stub_size: u64,
    /// Size of the interpreter image.
    pub image_size: u64,
    /// Size of the payload.
    pub payload_size: u64,
    /// Total file size, trailer included.
    pub total_size: u64,
}

/// Write `parts` back to back into `path` with executable permissions.
///
/// The bytes go to a temp file in the same directory which is then renamed
/// over `path`. Concurrent writers of identical content are safe: the last
/// rename wins and no reader sees a torn file.
pub fn write_executable_atomic(path: &Path, parts: &[&[u8]]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut temp = tempfile::Builder::new()
        .prefix(".mcharm-")
        .suffix(".partial")
        .tempfile_in(&dir)?;

    for part in parts {
        temp.write_all(part)?;
    }
    temp.flush()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(temp.path(), fs::Permissions::from_mode(EXECUTABLE_MODE))?;
    }

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Read and validate the trailer of a container file.
pub fn read_trailer(path: impl AsRef<Path>) -> Result<Trailer> {
    let mut file = File::open(path.as_ref())?;
    read_trailer_from(&mut file)
}

/// Read and validate the trailer from an open container file.
pub fn read_trailer_from(file: &mut File) -> Result<Trailer> {
    let file_size = file.metadata()?.len();

    if file_size < TRAILER_SIZE as u64 {
        return Err(crate::FormatError::Truncated(format!(
            "file is {} bytes, smaller than a trailer",
            file_size
        ))
        .into());
    }

    file.seek(SeekFrom::End(-(TRAILER_SIZE as i64)))?;
    let mut trailer_bytes = [0u8; TRAILER_SIZE];
    file.read_exact(&mut trailer_bytes)?;

    let trailer = decode_trailer(&trailer_bytes)?;
    validate_against_file_size(&trailer, file_size)?;
    Ok(trailer)
}

/// The image and payload segments of a container, loaded into memory.
#[derive(Debug, Clone)]
pub struct Container {
    /// Validated trailer.
    pub trailer: Trailer,
    /// Interpreter image bytes.
    pub image: Vec<u8>,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

impl Container {
    /// Read image and payload segments from an open container file whose
    /// trailer has already been validated.
    pub fn read_from(file: &mut File, trailer: Trailer) -> Result<Self> {
        let image = read_segment(file, trailer.image_offset, trailer.image_size)?;
        let payload = read_segment(file, trailer.payload_offset, trailer.payload_size)?;
        Ok(Self {
            trailer,
            image,
            payload,
        })
    }
}

/// Read and validate a whole container from disk.
pub fn read_container(path: impl AsRef<Path>) -> Result<Container> {
    let mut file = File::open(path.as_ref())?;
    let trailer = read_trailer_from(&mut file)?;
    Container::read_from(&mut file, trailer)
}

fn read_segment(file: &mut File, offset: u64, size: u64) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::new();
    Read::by_ref(file).take(size).read_to_end(&mut buf)?;
    if buf.len() as u64 != size {
        return Err(crate::FormatError::Truncated(format!(
            "segment at {} is {} bytes, expected {}",
            offset,
            buf.len(),
            size
        ))
        .into());
    }
    Ok(buf)
}
