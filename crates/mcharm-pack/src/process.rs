//! Child process launch and exit status translation.

use std::process::{Command, ExitStatus};
use std::time::Duration;

/// Base added to a signal number when a child dies by signal, matching the
/// shell convention (`SIGKILL` -> 137).
pub const SIGNAL_EXIT_BASE: i32 = 128;

/// Exit code used when a status carries neither a code nor a signal.
pub const UNKNOWN_EXIT_CODE: i32 = 1;

/// Translate a child's exit status into the exit code the parent should use.
///
/// A normal exit passes its code through unchanged; death by signal `N`
/// becomes `128 + N`.
pub fn exit_code_for(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return SIGNAL_EXIT_BASE + signal;
        }
    }

    UNKNOWN_EXIT_CODE
}

/// Attempts made when exec fails with "text file busy".
const TEXT_BUSY_RETRIES: u32 = 5;

/// Run `command` to completion, retrying briefly on `ETXTBSY`.
///
/// A freshly written executable can still be open for writing in a child
/// forked by another thread in the meantime; exec fails until that child
/// execs or exits.
pub fn status_retrying_busy(command: &mut Command) -> std::io::Result<ExitStatus> {
    let mut attempt = 0;
    loop {
        match command.status() {
            Err(e) if is_text_busy(&e) && attempt < TEXT_BUSY_RETRIES => {
                attempt += 1;
                std::thread::sleep(Duration::from_millis(10 * u64::from(attempt)));
            }
            result => return result,
        }
    }
}

#[cfg(unix)]
fn is_text_busy(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(libc::ETXTBSY)
}

#[cfg(not(unix))]
fn is_text_busy(_err: &std::io::Error) -> bool {
    false
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ExitStatus {
        Command::new("/bin/sh").arg("-c").arg(script).status().unwrap()
    }

    #[test]
    fn test_normal_exit_passes_through() {
        assert_eq!(exit_code_for(sh("exit 0")), 0);
        assert_eq!(exit_code_for(sh("exit 7")), 7);
        assert_eq!(exit_code_for(sh("exit 255")), 255);
    }

    #[test]
    fn test_signal_death_maps_to_128_plus_signal() {
        assert_eq!(exit_code_for(sh("kill -TERM $$")), 143);
        assert_eq!(exit_code_for(sh("kill -KILL $$")), 137);
    }

    #[test]
    fn test_raw_signal_status() {
        use std::os::unix::process::ExitStatusExt;
        // Raw wait status for "terminated by signal 2".
        assert_eq!(exit_code_for(ExitStatus::from_raw(2)), 130);
        // Raw wait status for "exited with code 3".
        assert_eq!(exit_code_for(ExitStatus::from_raw(3 << 8)), 3);
    }

    #[test]
    fn test_status_retrying_busy_passes_errors_through() {
        let err = status_retrying_busy(&mut Command::new("/nonexistent/mcharm-test-binary"))
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);

        let status = status_retrying_busy(Command::new("/bin/sh").arg("-c").arg("exit 4")).unwrap();
        assert_eq!(exit_code_for(status), 4);
    }
}
