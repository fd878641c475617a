//! Handle to one running server

use super::state::{ServerState, StateCell};
use crate::exit::ServerExit;
use crate::probe::tcp::{TcpProbe, POLL_INTERVAL};
use crate::process::{signal_kill_group, SignalOutcome};
use crate::workdir::WorkDir;
use crate::{HarnessError, Result};
use glob::Pattern;
use std::cell::Cell;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const READY_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(500);

/// One running server instance
///
/// The handle exclusively owns the process and the ephemeral working
/// directory. It is `Send` but not `Sync`: shutdown has a single owner, and
/// [`ServerHandle::close`] takes `&mut self`. A second close returns
/// [`HarnessError::AlreadyClosed`].
///
/// Dropping a handle that was never closed kills the process and removes the
/// directory best-effort.
#[derive(Debug)]
pub struct ServerHandle {
    pid: u32,
    executable: PathBuf,
    workdir_path: PathBuf,
    workdir: Option<WorkDir>,
    state: Arc<StateCell>,
    observer: Option<JoinHandle<Result<ServerExit>>>,
    unexpected_rx: Option<oneshot::Receiver<ServerExit>>,
    host: String,
    port: Option<u16>,
    shutdown_timeout: Option<Duration>,
    output: Option<mpsc::UnboundedReceiver<String>>,
    _not_sync: PhantomData<Cell<()>>,
}

pub(crate) struct HandleParts {
    pub(crate) pid: u32,
    pub(crate) executable: PathBuf,
    pub(crate) workdir: WorkDir,
    pub(crate) state: Arc<StateCell>,
    pub(crate) observer: JoinHandle<Result<ServerExit>>,
    pub(crate) unexpected_rx: oneshot::Receiver<ServerExit>,
    pub(crate) host: String,
    pub(crate) port: Option<u16>,
    pub(crate) shutdown_timeout: Option<Duration>,
    pub(crate) output: Option<mpsc::UnboundedReceiver<String>>,
}

impl ServerHandle {
    pub(crate) fn new(parts: HandleParts) -> Self {
        Self {
            pid: parts.pid,
            executable: parts.executable,
            workdir_path: parts.workdir.path().to_path_buf(),
            workdir: Some(parts.workdir),
            state: parts.state,
            observer: Some(parts.observer),
            unexpected_rx: Some(parts.unexpected_rx),
            host: parts.host,
            port: parts.port,
            shutdown_timeout: parts.shutdown_timeout,
            output: parts.output,
            _not_sync: PhantomData,
        }
    }

    /// Process ID of the server
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Path of the executable that was started
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Working directory of the server
    ///
    /// Still returns the path after `close`, when the directory is gone.
    pub fn workdir(&self) -> &Path {
        &self.workdir_path
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServerState {
        self.state.get()
    }

    /// Port the server is expected to listen on, if one was given
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// `http://<host>:<port><path>` for the advertised port
    pub fn url(&self, path: &str) -> Result<String> {
        let port = self.port.ok_or_else(|| {
            HarnessError::Configuration(format!("server {} has no advertised port", self.pid))
        })?;
        Ok(format!("http://{}:{}{}", self.host, port, path))
    }

    /// Whether the process has already exited
    pub fn has_exited(&self) -> bool {
        self.observer.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Poll the advertised port until it accepts TCP connections
    ///
    /// Fails early if the server exits while waiting. `None` waits without a
    /// deadline.
    pub async fn wait_ready(&self, timeout: Option<Duration>) -> Result<()> {
        let port = self.port.ok_or_else(|| {
            HarnessError::Configuration(format!("server {} has no advertised port", self.pid))
        })?;
        let probe = TcpProbe::new(self.host.clone(), port, READY_ATTEMPT_TIMEOUT);
        let started = Instant::now();

        loop {
            if self.has_exited() {
                return Err(HarnessError::Process(format!(
                    "server {} exited before accepting connections on {}",
                    self.pid,
                    probe.address()
                )));
            }
            if probe.check().await.is_ok() {
                debug!("Server {} is accepting connections on {}", self.pid, probe.address());
                return Ok(());
            }
            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    return Err(HarnessError::Timeout(format!(
                        "server {} not accepting connections on {} after {:?}",
                        self.pid,
                        probe.address(),
                        limit
                    )));
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Consume captured stdout until each pattern has matched a line, in order
    ///
    /// Patterns are shell-style globs (`*`, `?`, `[...]`) matched against the
    /// whole line with surrounding whitespace trimmed. Lines that do not match
    /// the current pattern are skipped. Returns the matched lines.
    ///
    /// Requires [`OutputMode::Capture`](crate::config::OutputMode::Capture).
    /// Fails with [`HarnessError::Process`] listing the skipped lines if stdout
    /// closes first, and with [`HarnessError::Timeout`] if `line_timeout`
    /// elapses while waiting for the next line.
    pub async fn expect_output(
        &mut self,
        patterns: &[&str],
        line_timeout: Option<Duration>,
    ) -> Result<Vec<String>> {
        let compiled = patterns
            .iter()
            .map(|p| {
                Pattern::new(p.trim()).map_err(|e| {
                    HarnessError::Configuration(format!("invalid output pattern '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let pid = self.pid;
        let rx = self.output.as_mut().ok_or_else(|| {
            HarnessError::Configuration(format!(
                "stdout of server {} is not captured; use the `capture` output mode",
                pid
            ))
        })?;

        let mut matched = Vec::with_capacity(compiled.len());
        for pattern in &compiled {
            debug!("Waiting for server {} output matching '{}'", pid, pattern.as_str());
            let mut skipped: Vec<String> = Vec::new();
            loop {
                let next = match line_timeout {
                    Some(limit) => match tokio::time::timeout(limit, rx.recv()).await {
                        Ok(next) => next,
                        Err(_) => {
                            return Err(HarnessError::Timeout(format!(
                                "no stdout line from server {} within {:?} while waiting for '{}'; skipped lines: {:?}",
                                pid,
                                limit,
                                pattern.as_str(),
                                skipped
                            )))
                        }
                    },
                    None => rx.recv().await,
                };
                match next {
                    Some(line) if pattern.matches(line.trim()) => {
                        debug!("Server {} output matched '{}': {}", pid, pattern.as_str(), line);
                        matched.push(line);
                        break;
                    }
                    Some(line) => skipped.push(line),
                    None => {
                        warn!(
                            "Server {} stdout closed after {} unmatched lines",
                            pid,
                            skipped.len()
                        );
                        return Err(HarnessError::Process(format!(
                            "stdout of server {} closed before a line matched '{}'; skipped lines: {:?}",
                            pid,
                            pattern.as_str(),
                            skipped
                        )));
                    }
                }
            }
        }
        Ok(matched)
    }

    /// Wait for the exit observer to report an unrequested exit
    ///
    /// Resolves to `Some(HarnessError::UnexpectedExit)` exactly once. Resolves
    /// to `None` once the server has exited after a requested shutdown, or on
    /// every call after the error was already delivered. Cancel-safe.
    pub async fn wait_unexpected_exit(&mut self) -> Option<HarnessError> {
        let rx = self.unexpected_rx.as_mut()?;
        let received = rx.await;
        self.unexpected_rx = None;
        received.ok().map(HarnessError::UnexpectedExit)
    }

    /// Non-blocking variant of [`ServerHandle::wait_unexpected_exit`]
    pub fn try_unexpected_exit(&mut self) -> Option<HarnessError> {
        let rx = self.unexpected_rx.as_mut()?;
        match rx.try_recv() {
            Ok(exit) => {
                self.unexpected_rx = None;
                Some(HarnessError::UnexpectedExit(exit))
            }
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.unexpected_rx = None;
                None
            }
        }
    }

    /// Kill the server and remove its working directory
    ///
    /// The state moves to `Closing` before SIGKILL is sent to the process
    /// group, even when the leader already exited. A failed or moot signal is
    /// logged and teardown continues; the directory is removed even
    /// when waiting for the exit fails or times out, and that failure is
    /// returned afterwards.
    pub async fn close(&mut self) -> Result<ServerExit> {
        if let Err(state) = self.state.begin_close() {
            debug!("Close requested for server {} in state {:?}", self.pid, state);
            return Err(HarnessError::AlreadyClosed);
        }
        info!("Closing server {}", self.pid);

        // The group outlives its leader while any forked member is alive
        match signal_kill_group(self.pid) {
            Ok(SignalOutcome::Delivered) => debug!("Sent SIGKILL to process group {}", self.pid),
            Ok(SignalOutcome::AlreadyExited) => {
                warn!("Process group {} was already gone when close was requested", self.pid)
            }
            Err(e) => warn!("Failed to signal server {}: {}", self.pid, e),
        }

        let exit = self.await_exit().await;

        let removal = match self.workdir.take() {
            Some(dir) => dir.remove().await,
            None => Ok(()),
        };
        self.state.finish_close();

        let exit = exit?;
        removal?;
        info!("Server closed: {}", exit);
        Ok(exit)
    }

    async fn await_exit(&mut self) -> Result<ServerExit> {
        let observer = self.observer.take().ok_or_else(|| {
            HarnessError::Process(format!("exit observer for server {} is gone", self.pid))
        })?;

        let joined = match self.shutdown_timeout {
            Some(limit) => tokio::time::timeout(limit, observer).await.map_err(|_| {
                warn!("Server {} did not exit within {:?} of SIGKILL", self.pid, limit);
                HarnessError::Timeout(format!(
                    "server {} did not exit within {:?} of SIGKILL",
                    self.pid, limit
                ))
            })?,
            None => observer.await,
        };

        joined.map_err(|e| {
            HarnessError::Process(format!("exit observer for server {} failed: {}", self.pid, e))
        })?
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if self.state.begin_close().is_err() {
            return;
        }
        warn!(
            "Server handle for {} dropped without close; killing it and removing {}",
            self.pid,
            self.workdir_path.display()
        );
        if let Err(e) = signal_kill_group(self.pid) {
            warn!("Failed to signal server {}: {}", self.pid, e);
        }
        // TempDir removes the tree synchronously on drop
        drop(self.workdir.take());
        self.state.finish_close();
    }
}
