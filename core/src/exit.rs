//! Exit information for a finished server process

use std::fmt;
use std::process::ExitStatus;

/// How a supervised server process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerExit {
    /// Process ID of the server
    pub pid: u32,
    /// Exit code if the process exited normally
    pub exit_code: Option<i32>,
    /// Signal number if the process was killed by a signal
    pub signal: Option<i32>,
}

impl ServerExit {
    /// Build from the OS exit status
    pub fn from_status(pid: u32, status: ExitStatus) -> Self {
        let (exit_code, signal) = if let Some(code) = status.code() {
            (Some(code), None)
        } else {
            // On Unix, if there's no exit code, it was killed by a signal
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                (None, status.signal())
            }
            #[cfg(not(unix))]
            {
                (None, None)
            }
        };

        Self {
            pid,
            exit_code,
            signal,
        }
    }

    /// Whether the process was ended by SIGKILL
    pub fn was_force_killed(&self) -> bool {
        #[cfg(unix)]
        {
            self.signal == Some(libc::SIGKILL)
        }
        #[cfg(not(unix))]
        {
            false
        }
    }
}

impl fmt::Display for ServerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.exit_code, self.signal) {
            (Some(code), _) => write!(f, "pid {} exited with code {}", self.pid, code),
            (None, Some(signal)) => write!(f, "pid {} killed by signal {}", self.pid, signal),
            (None, None) => write!(f, "pid {} exited with unknown status", self.pid),
        }
    }
}
