//! Small process-related helpers shared across the workspace.
//!
//! Covers the three things every child process of the recorder needs:
//! construction (`tokio_command`), a graceful interrupt that lets the child
//! flush its output, and a portable description of how it exited.

use std::ffi::OsStr;
use std::fmt;
use std::process::ExitStatus;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd
}

/// Outcome of a child process: exit code and/or terminating signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitInfo {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Signal number, if the process was terminated by a signal (unix only).
    pub signal: Option<i32>,
}

impl ExitInfo {
    /// Exit info for a process whose status could not be collected.
    pub const UNKNOWN: ExitInfo = ExitInfo {
        code: Some(-1),
        signal: None,
    };

    /// Whether the process exited with code 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Whether the process ended because of an interrupt.
    ///
    /// ffmpeg traps `SIGINT`, finalizes its output and exits with 255.
    pub fn interrupted(&self) -> bool {
        #[cfg(unix)]
        {
            self.signal == Some(libc::SIGINT) || self.code == Some(255)
        }
        #[cfg(not(unix))]
        {
            false
        }
    }
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => write!(f, "unknown status"),
        }
    }
}

/// Ask a process to stop by sending it an interrupt (`SIGINT`).
///
/// This is fire-and-forget: returning `Ok` only means the signal was
/// delivered, not that the process has exited.
#[cfg(unix)]
pub fn send_interrupt(pid: u32) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(pid).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range")
    })?;

    // SAFETY: libc::kill has no memory-safety preconditions; an invalid pid
    // is reported through errno.
    let rc = unsafe { libc::kill(pid, libc::SIGINT) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Ask a process to stop by sending it an interrupt.
///
/// Not supported on this platform; callers fall back to a hard kill.
#[cfg(not(unix))]
pub fn send_interrupt(_pid: u32) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "interrupt signals are only supported on unix",
    ))
}
