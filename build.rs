//! Build script for mcharm.
//!
//! Embeds the host stub and host interpreter image into the `mcharm` binary
//! so that host-target builds work offline.
//!
//! ```sh
//! cargo build --release -p mcharm-stub
//! MCHARM_EMBED_STUB=$PWD/target/release/mcharm-stub \
//! MCHARM_EMBED_IMAGE=$PWD/runtime/zig-out/bin/mcharm-runtime \
//!   cargo build --release
//! ```
//!
//! Unset variables produce empty placeholders, which the tool treats as "not
//! embedded" and falls back to the on-disk lookups.

use std::fs;
use std::path::{Path, PathBuf};

const EMBEDS: [(&str, &str); 2] = [
    ("MCHARM_EMBED_STUB", "host-stub.bin"),
    ("MCHARM_EMBED_IMAGE", "host-image.bin"),
];

fn main() {
    let out_dir = match std::env::var_os("OUT_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => panic!("OUT_DIR not set"),
    };

    for (var, file_name) in EMBEDS {
        println!("cargo:rerun-if-env-changed={}", var);
        embed(var, &out_dir.join(file_name));
    }
}

fn embed(var: &str, dest: &Path) {
    match std::env::var_os(var) {
        Some(source) if !source.is_empty() => {
            let source = PathBuf::from(source);
            println!("cargo:rerun-if-changed={}", source.display());
            if let Err(e) = fs::copy(&source, dest) {
                panic!("{}: cannot copy {}: {}", var, source.display(), e);
            }
        }
        _ => {
            if let Err(e) = fs::write(dest, b"") {
                panic!("cannot write placeholder {}: {}", dest.display(), e);
            }
        }
    }
}
