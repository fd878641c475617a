//! Unix process spawning in a dedicated process group
//!
//! The server is started as a session leader via `setsid()`, so anything it
//! forks shares its process group and a single `killpg` tears the whole tree
//! down. Signals therefore target the group id, which equals the child's pid.

#![allow(unsafe_code)]

use crate::{HarnessError, Result};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tracing::{debug, error};

/// A child process that leads its own process group
#[derive(Debug)]
pub struct ChildProcess {
    pid: Pid,
    child: Child,
}

impl ChildProcess {
    /// Get the process ID
    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Get the process group ID (same as PID for session leaders)
    pub fn pgid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Wait for the process to exit and return its exit status
    pub async fn wait(&mut self) -> Result<std::process::ExitStatus> {
        self.child.wait().await.map_err(|e| {
            HarnessError::Process(format!("Failed to wait for process {}: {}", self.pid, e))
        })
    }

    /// Take the stdout handle for async reading, if it was piped
    pub fn take_stdout(&mut self) -> Option<tokio::process::ChildStdout> {
        self.child.stdout.take()
    }
}

/// Outcome of a delivered-or-moot signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The signal reached the process group
    Delivered,
    /// The group no longer exists (ESRCH) or is no longer ours (EPERM)
    AlreadyExited,
}

/// Spawn `command` in a new session and process group
///
/// The caller configures program, arguments, environment, working directory
/// and stdio; this only adds the `setsid()` pre-exec hook.
pub fn spawn_in_group(mut command: Command) -> Result<ChildProcess> {
    let program = format!("{:?}", command.as_std().get_program());
    debug!("Spawning process {} in a new process group", program);

    // Safety: setsid() is async-signal-safe and appropriate for use in pre_exec
    #[deny(unsafe_op_in_unsafe_fn)]
    unsafe {
        command.pre_exec(|| {
            let result = libc::setsid();
            if result == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = command.spawn().map_err(|e| {
        error!("Failed to spawn process {}: {}", program, e);
        HarnessError::Process(format!("Failed to spawn {}: {}", program, e))
    })?;

    let raw_pid = child
        .id()
        .ok_or_else(|| HarnessError::Process("Spawned child did not have a PID".to_string()))?;
    let pid = Pid::from_raw(raw_pid as i32);
    debug!("Successfully spawned process {} in new process group", pid);

    Ok(ChildProcess { pid, child })
}

/// Send `signal` to the process group led by `pid`
///
/// `ESRCH` and `EPERM` mean the group is gone (or was reaped and its id
/// recycled by someone else) and are reported as [`SignalOutcome::AlreadyExited`].
pub fn signal_group(pid: u32, signal: Signal) -> Result<SignalOutcome> {
    let pgid = Pid::from_raw(pid as i32);
    debug!("Sending {} to process group {}", signal, pgid);

    match killpg(pgid, signal) {
        Ok(()) => Ok(SignalOutcome::Delivered),
        Err(nix::errno::Errno::ESRCH) => {
            debug!("Process group {} already exited", pgid);
            Ok(SignalOutcome::AlreadyExited)
        }
        Err(nix::errno::Errno::EPERM) => {
            debug!(
                "Permission denied signaling process group {} (likely already exited)",
                pgid
            );
            Ok(SignalOutcome::AlreadyExited)
        }
        Err(e) => Err(HarnessError::Process(format!(
            "Failed to send {} to process group {}: {}",
            signal, pgid, e
        ))),
    }
}

/// Send SIGKILL to the process group led by `pid`
pub fn signal_kill_group(pid: u32) -> Result<SignalOutcome> {
    signal_group(pid, Signal::SIGKILL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::Stdio;

    fn command(program: &str, args: &[&str]) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args).stdout(Stdio::null()).stderr(Stdio::null());
        cmd
    }

    #[tokio::test]
    async fn test_spawn_leads_own_group() {
        let mut child = spawn_in_group(command("sleep", &["5"])).expect("Failed to spawn sleep");
        assert!(child.pid() > 0);
        assert_eq!(child.pid(), child.pgid());

        let parent_pgid = nix::unistd::getpgrp().as_raw() as u32;
        assert_ne!(child.pgid(), parent_pgid);

        signal_kill_group(child.pid()).expect("kill");
        child.wait().await.expect("wait");
    }

    #[tokio::test]
    async fn test_spawn_and_wait() {
        let mut child = spawn_in_group(command("true", &[])).expect("Failed to spawn true");
        let status = child.wait().await.expect("Failed to wait for process");
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_spawn_nonexistent_command() {
        let result = spawn_in_group(command("nonexistent_command_12345", &[]));
        match result.unwrap_err() {
            HarnessError::Process(msg) => assert!(msg.contains("nonexistent_command_12345")),
            e => panic!("Expected Process error, got: {}", e),
        }
    }

    #[tokio::test]
    async fn test_kill_reports_signal() {
        let mut child = spawn_in_group(command("sleep", &["30"])).expect("Failed to spawn sleep");
        assert_eq!(
            signal_kill_group(child.pid()).expect("kill"),
            SignalOutcome::Delivered
        );
        let status = child.wait().await.expect("wait");
        assert_eq!(status.signal(), Some(libc::SIGKILL));
    }

    #[tokio::test]
    async fn test_kill_after_exit_is_already_exited() {
        let mut child = spawn_in_group(command("true", &[])).expect("Failed to spawn true");
        let pid = child.pid();
        child.wait().await.expect("wait");
        assert_eq!(
            signal_kill_group(pid).expect("kill"),
            SignalOutcome::AlreadyExited
        );
    }
}
