//! Trailer layout and segment-offset algebra.
//!
//! Pure functions over byte buffers; nothing here touches the filesystem.
//! Only the reader of an actual file knows its size, so offset validation
//! against a file is a separate step from decoding.

use crate::FormatError;

/// Magic bytes identifying an mcharm container trailer.
pub const MAGIC: &[u8; 8] = b"MCHARM01";

/// Trailer size in bytes (fixed).
pub const TRAILER_SIZE: usize = 48;

/// Fixed-size trailer at the end of a container.
///
/// Layout (48 bytes total, integers little-endian):
/// ```text
/// Offset  Size  Field
/// 0       8     magic ("MCHARM01")
/// 8       8     image_offset (u64 LE)
/// 16      8     image_size (u64 LE)
/// 24      8     payload_offset (u64 LE)
/// 32      8     payload_size (u64 LE)
/// 40      8     magic ("MCHARM01")
/// ```
///
/// The magic is written twice so that a truncated file which happens to end
/// with the constant once is still rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    /// Offset of the interpreter image; equal to the stub length.
    pub image_offset: u64,
    /// Size of the interpreter image.
    pub image_size: u64,
    /// Offset of the payload; immediately follows the image.
    pub payload_offset: u64,
    /// Size of the payload.
    pub payload_size: u64,
}

impl Trailer {
    /// Compute the trailer for the given segment lengths.
    pub fn for_segments(stub_len: u64, image_len: u64, payload_len: u64) -> Self {
        Self {
            image_offset: stub_len,
            image_size: image_len,
            payload_offset: stub_len + image_len,
            payload_size: payload_len,
        }
    }

    /// Serialize the trailer to bytes.
    pub fn to_bytes(&self) -> [u8; TRAILER_SIZE] {
        encode_trailer(
            self.image_offset,
            self.image_size,
            self.payload_offset,
            self.payload_size,
        )
    }

    /// Total container size implied by this trailer.
    ///
    /// Returns `None` when the sum overflows, which can only happen for a
    /// corrupted trailer.
    pub fn container_size(&self) -> Option<u64> {
        self.payload_offset
            .checked_add(self.payload_size)?
            .checked_add(TRAILER_SIZE as u64)
    }

    /// Length of the stub segment.
    pub fn stub_size(&self) -> u64 {
        self.image_offset
    }
}

/// Encode trailer fields into their 48-byte on-disk form.
pub fn encode_trailer(
    image_offset: u64,
    image_size: u64,
    payload_offset: u64,
    payload_size: u64,
) -> [u8; TRAILER_SIZE] {
    let mut buf = [0u8; TRAILER_SIZE];

    buf[0..8].copy_from_slice(MAGIC);
    buf[8..16].copy_from_slice(&image_offset.to_le_bytes());
    buf[16..24].copy_from_slice(&image_size.to_le_bytes());
    buf[24..32].copy_from_slice(&payload_offset.to_le_bytes());
    buf[32..40].copy_from_slice(&payload_size.to_le_bytes());
    buf[40..48].copy_from_slice(MAGIC);

    buf
}

/// Decode a trailer from exactly [`TRAILER_SIZE`] bytes.
///
/// Only the magic fields are checked here; offsets are validated against a
/// real file by [`validate_against_file_size`].
pub fn decode_trailer(bytes: &[u8]) -> Result<Trailer, FormatError> {
    if bytes.len() != TRAILER_SIZE {
        return Err(FormatError::Truncated(format!(
            "trailer is {} bytes, expected {}",
            bytes.len(),
            TRAILER_SIZE
        )));
    }

    if &bytes[0..8] != MAGIC || &bytes[40..48] != MAGIC {
        return Err(FormatError::BadMagic);
    }

    Ok(Trailer {
        image_offset: read_u64(bytes, 8),
        image_size: read_u64(bytes, 16),
        payload_offset: read_u64(bytes, 24),
        payload_size: read_u64(bytes, 32),
    })
}

/// Check that `trailer` describes a file of exactly `total_size` bytes.
///
/// The payload must start where the image ends and end where the trailer
/// starts. Any gap or slack means a size field was corrupted.
pub fn validate_against_file_size(trailer: &Trailer, total_size: u64) -> Result<(), FormatError> {
    let trailer_start = total_size
        .checked_sub(TRAILER_SIZE as u64)
        .ok_or_else(|| {
            FormatError::Truncated(format!("file is {} bytes, smaller than a trailer", total_size))
        })?;

    let image_end = trailer
        .image_offset
        .checked_add(trailer.image_size)
        .ok_or_else(|| FormatError::Truncated("image segment overflows".to_string()))?;
    let payload_end = trailer
        .payload_offset
        .checked_add(trailer.payload_size)
        .ok_or_else(|| FormatError::Truncated("payload segment overflows".to_string()))?;

    if trailer.payload_offset < trailer.image_offset {
        return Err(FormatError::Truncated(format!(
            "payload offset {} precedes image offset {}",
            trailer.payload_offset, trailer.image_offset
        )));
    }
    if image_end > trailer.payload_offset {
        return Err(FormatError::Truncated(format!(
            "image segment ends at {}, past payload offset {}",
            image_end, trailer.payload_offset
        )));
    }
    if image_end != trailer.payload_offset {
        return Err(FormatError::Truncated(format!(
            "image segment ends at {}, payload starts at {}",
            image_end, trailer.payload_offset
        )));
    }
    if payload_end != trailer_start {
        return Err(FormatError::Truncated(format!(
            "payload segment ends at {}, trailer starts at {}",
            payload_end, trailer_start
        )));
    }

    Ok(())
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(stub: &[u8], image: &[u8], payload: &[u8]) -> Vec<u8> {
        let trailer = Trailer::for_segments(
            stub.len() as u64,
            image.len() as u64,
            payload.len() as u64,
        );
        let mut out = Vec::new();
        out.extend_from_slice(stub);
        out.extend_from_slice(image);
        out.extend_from_slice(payload);
        out.extend_from_slice(&trailer.to_bytes());
        out
    }

    #[test]
    fn test_trailer_roundtrip() {
        let trailer = Trailer {
            image_offset: 512 * 1024,
            image_size: 3 * 1024 * 1024,
            payload_offset: 512 * 1024 + 3 * 1024 * 1024,
            payload_size: 2048,
        };

        let bytes = trailer.to_bytes();
        assert_eq!(bytes.len(), TRAILER_SIZE);
        assert_eq!(&bytes[0..8], MAGIC);
        assert_eq!(&bytes[40..48], MAGIC);

        let restored = decode_trailer(&bytes).unwrap();
        assert_eq!(restored, trailer);
    }

    #[test]
    fn test_trailer_field_layout() {
        let bytes = encode_trailer(1, 2, 3, 4);
        assert_eq!(bytes[8], 1);
        assert_eq!(bytes[16], 2);
        assert_eq!(bytes[24], 3);
        assert_eq!(bytes[32], 4);
    }

    #[test]
    fn test_decode_wrong_length() {
        let bytes = [0u8; TRAILER_SIZE - 1];
        assert!(matches!(
            decode_trailer(&bytes),
            Err(FormatError::Truncated(_))
        ));
    }

    #[test]
    fn test_decode_bad_magic_either_field() {
        let good = encode_trailer(10, 20, 30, 40);

        for i in (0..8).chain(40..48) {
            let mut bytes = good;
            bytes[i] ^= 0xFF;
            assert_eq!(decode_trailer(&bytes), Err(FormatError::BadMagic), "byte {}", i);
        }
    }

    #[test]
    fn test_single_magic_is_not_enough() {
        // A file that merely ends with the constant once is rejected.
        let mut bytes = [0u8; TRAILER_SIZE];
        bytes[40..48].copy_from_slice(MAGIC);
        assert_eq!(decode_trailer(&bytes), Err(FormatError::BadMagic));
    }

    #[test]
    fn test_validate_concatenated_container() {
        let data = container(b"stub-bytes", b"interpreter-image", b"print(\"hi\")\n");
        let trailer = decode_trailer(&data[data.len() - TRAILER_SIZE..]).unwrap();

        assert_eq!(trailer.image_offset, 10);
        assert_eq!(trailer.container_size(), Some(data.len() as u64));
        assert!(validate_against_file_size(&trailer, data.len() as u64).is_ok());
    }

    #[test]
    fn test_validate_fails_on_any_truncation() {
        let data = container(b"stub", b"image", b"payload");
        let trailer = decode_trailer(&data[data.len() - TRAILER_SIZE..]).unwrap();

        for cut in 1..=data.len() {
            let size = (data.len() - cut) as u64;
            assert!(
                matches!(
                    validate_against_file_size(&trailer, size),
                    Err(FormatError::Truncated(_))
                ),
                "cut {} bytes",
                cut
            );
        }
    }

    #[test]
    fn test_validate_rejects_non_monotonic_offsets() {
        let trailer = Trailer {
            image_offset: 100,
            image_size: 10,
            payload_offset: 50,
            payload_size: 10,
        };
        assert!(matches!(
            validate_against_file_size(&trailer, 10_000),
            Err(FormatError::Truncated(_))
        ));
    }

    #[test]
    fn test_validate_rejects_overlapping_image() {
        let trailer = Trailer {
            image_offset: 10,
            image_size: 100,
            payload_offset: 50,
            payload_size: 10,
        };
        assert!(matches!(
            validate_against_file_size(&trailer, 10_000),
            Err(FormatError::Truncated(_))
        ));
    }

    #[test]
    fn test_validate_rejects_overflowing_sizes() {
        let trailer = Trailer {
            image_offset: 10,
            image_size: u64::MAX,
            payload_offset: 20,
            payload_size: 1,
        };
        assert!(validate_against_file_size(&trailer, 10_000).is_err());
        assert_eq!(
            Trailer {
                payload_size: u64::MAX,
                ..trailer
            }
            .container_size(),
            None
        );
    }

    #[test]
    fn test_corrupted_size_field_is_truncated() {
        let data = container(b"stub", b"image", b"payload");
        let mut raw = [0u8; TRAILER_SIZE];
        raw.copy_from_slice(&data[data.len() - TRAILER_SIZE..]);
        // Inflate payload_size past the end of the file.
        raw[32] = 0xFF;

        let trailer = decode_trailer(&raw).unwrap();
        assert!(matches!(
            validate_against_file_size(&trailer, data.len() as u64),
            Err(FormatError::Truncated(_))
        ));
    }

    #[test]
    fn test_shrunken_image_size_is_truncated() {
        let data = container(b"stub", b"image", b"payload");
        let mut trailer = decode_trailer(&data[data.len() - TRAILER_SIZE..]).unwrap();
        trailer.image_size -= 1;

        assert!(matches!(
            validate_against_file_size(&trailer, data.len() as u64),
            Err(FormatError::Truncated(_))
        ));
    }

    #[test]
    fn test_shrunken_payload_size_is_truncated() {
        let data = container(b"stub", b"image", b"payload");
        let mut trailer = decode_trailer(&data[data.len() - TRAILER_SIZE..]).unwrap();
        trailer.payload_size -= 1;

        assert!(matches!(
            validate_against_file_size(&trailer, data.len() as u64),
            Err(FormatError::Truncated(_))
        ));
    }

    #[test]
    fn test_gap_between_segments_is_truncated() {
        // Image ends at 8, payload starts at 9; sizes still add up to the file.
        let trailer = Trailer {
            image_offset: 4,
            image_size: 4,
            payload_offset: 9,
            payload_size: 5,
        };
        let file_size = 4 + 5 + 7 + TRAILER_SIZE as u64;
        assert!(matches!(
            validate_against_file_size(&trailer, file_size),
            Err(FormatError::Truncated(_))
        ));
    }

    #[test]
    fn test_slack_before_trailer_is_truncated() {
        let trailer = Trailer::for_segments(4, 5, 7);
        let exact = trailer.container_size().unwrap();
        assert!(validate_against_file_size(&trailer, exact).is_ok());
        assert!(matches!(
            validate_against_file_size(&trailer, exact + 1),
            Err(FormatError::Truncated(_))
        ));
    }

    #[test]
    fn test_empty_segments_are_valid() {
        let data = container(b"", b"", b"");
        assert_eq!(data.len(), TRAILER_SIZE);
        let trailer = decode_trailer(&data).unwrap();
        assert!(validate_against_file_size(&trailer, TRAILER_SIZE as u64).is_ok());
    }
}
