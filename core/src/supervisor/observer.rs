//! Exit observer task
//!
//! The observer owns the child process and blocks on its exit. An exit seen
//! while the handle is still `Running` was not requested and is escalated.

use super::state::{ServerState, StateCell};
use crate::config::UnexpectedExitPolicy;
use crate::exit::ServerExit;
use crate::process::ChildProcess;
use crate::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::ChildStdout;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Spawn the observer for `child`
///
/// The returned task resolves to the exit of the process. An unrequested exit
/// is sent once on `unexpected_tx`; with [`UnexpectedExitPolicy::Abort`] the
/// test process is aborted right after.
pub(crate) fn spawn_exit_observer(
    mut child: ChildProcess,
    state: Arc<StateCell>,
    policy: UnexpectedExitPolicy,
    unexpected_tx: oneshot::Sender<ServerExit>,
) -> JoinHandle<Result<ServerExit>> {
    tokio::spawn(async move {
        let pid = child.pid();
        let status = child.wait().await.map_err(|e| {
            error!("Lost track of server {}: {}", pid, e);
            e
        })?;
        let exit = ServerExit::from_status(pid, status);

        match state.get() {
            ServerState::Running => {
                error!(
                    pid,
                    "Server exited without a requested shutdown ({}); the test environment is broken",
                    exit
                );
                let _ = unexpected_tx.send(exit.clone());
                if policy == UnexpectedExitPolicy::Abort {
                    error!("Aborting test process after unexpected server exit");
                    std::process::abort();
                }
            }
            ServerState::Closing | ServerState::Closed => {
                debug!("Server {} exited after shutdown request: {}", pid, exit);
            }
        }

        Ok(exit)
    })
}

/// Re-emit the server's stdout through `tracing`, one event per line
///
/// With `capture` set, every line is also sent there; a dropped receiver only
/// stops the capture, not the forwarding.
pub(crate) fn spawn_stdout_forwarder(
    pid: u32,
    stdout: ChildStdout,
    mut capture: Option<mpsc::UnboundedSender<String>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    info!(target: "sut_stdout", pid, "{}", line);
                    let receiver_gone = capture.as_ref().map_or(false, |tx| tx.send(line).is_err());
                    if receiver_gone {
                        debug!("Stopped capturing stdout of server {}", pid);
                        capture = None;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("Stopped reading stdout of server {}: {}", pid, e);
                    break;
                }
            }
        }
    })
}
