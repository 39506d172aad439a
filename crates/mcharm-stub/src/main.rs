//! Bootstrap loader for mcharm containers.
//!
//! This is the first segment of every container. On each run it:
//! 1. Reads the trailer from the end of its own executable
//! 2. Validates it against the real file size
//! 3. Makes the embedded interpreter image runnable
//! 4. Runs the interpreter on the payload and mirrors its exit status
//!
//! Nothing is parsed from the command line; every argument belongs to the
//! packaged script.

mod error;
mod launch;

use std::env;
use std::ffi::OsString;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::process::ExitCode;

use mcharm_pack::{decode_trailer, exit_code_for, validate_against_file_size, Container, TRAILER_SIZE};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::error::LoaderError;

/// Environment variable enabling loader diagnostics on stderr.
const LOG_ENV: &str = "MCHARM_LOG";

fn main() -> ExitCode {
    init_logging();

    match run() {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("mcharm: error: {}", e);
            if matches!(e, LoaderError::TrailerInvalid(_)) {
                eprintln!("This file is not a valid mcharm container; rebuild it with `mcharm build`.");
            }
            ExitCode::from(e.exit_code())
        }
    }
}

/// Packaged programs stay silent unless `MCHARM_LOG` asks otherwise.
fn init_logging() {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn run() -> Result<i32, LoaderError> {
    let exe_path = env::current_exe().map_err(LoaderError::SelfReadFailed)?;
    debug!(path = %exe_path.display(), "start");

    let mut file = File::open(&exe_path).map_err(LoaderError::SelfReadFailed)?;
    let file_size = file
        .metadata()
        .map_err(LoaderError::SelfReadFailed)?
        .len();

    let trailer_bytes = read_tail(&mut file, file_size)?;
    debug!(file_size, "trailer read");

    let trailer = decode_trailer(&trailer_bytes)?;
    validate_against_file_size(&trailer, file_size)?;
    debug!(
        image_offset = trailer.image_offset,
        image_size = trailer.image_size,
        payload_offset = trailer.payload_offset,
        payload_size = trailer.payload_size,
        "trailer validated"
    );

    let container = Container::read_from(&mut file, trailer)?;
    drop(file);

    let strategies = launch::strategies();
    let materialized = launch::materialize_with(&strategies, &container.image, &container.payload)?;
    drop(container);

    let args: Vec<OsString> = env::args_os().skip(1).collect();
    debug!(argc = args.len(), "exec");
    let status = launch::spawn_and_wait(&materialized, &args)?;

    // Payload cleanup happens here, on every path out of the exec state.
    drop(materialized);

    let code = exit_code_for(status);
    debug!(code, "exited");
    Ok(code)
}

/// Read the last trailer-sized chunk of the file.
///
/// A file shorter than a trailer yields the short tail so that decoding
/// reports it as truncated.
fn read_tail(file: &mut File, file_size: u64) -> Result<Vec<u8>, LoaderError> {
    let len = file_size.min(TRAILER_SIZE as u64);
    file.seek(SeekFrom::Start(file_size - len))
        .map_err(LoaderError::SelfReadFailed)?;

    let mut buf = Vec::with_capacity(len as usize);
    file.by_ref()
        .take(len)
        .read_to_end(&mut buf)
        .map_err(LoaderError::SelfReadFailed)?;
    Ok(buf)
}
