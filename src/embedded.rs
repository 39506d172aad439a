//! Host stub and image compiled into this binary by `build.rs`.
//!
//! Only the host target can ever be embedded; every other target is resolved
//! from disk or the network.

const HOST_STUB: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/host-stub.bin"));
const HOST_IMAGE: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/host-image.bin"));

/// Embedded host stub, if this build carries one.
pub fn host_stub() -> Option<&'static [u8]> {
    non_empty(HOST_STUB)
}

/// Embedded host interpreter image, if this build carries one.
pub fn host_image() -> Option<&'static [u8]> {
    non_empty(HOST_IMAGE)
}

fn non_empty(bytes: &'static [u8]) -> Option<&'static [u8]> {
    if bytes.is_empty() {
        None
    } else {
        Some(bytes)
    }
}
