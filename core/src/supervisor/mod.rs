//! Server supervisor
//!
//! Owns the lifecycle of exactly one server subprocess per test session:
//! spawn with a controlled working directory and environment, watch for exits
//! nobody asked for, and tear everything down on `close`.
//!
//! ## Components
//!
//! - [`ServerSupervisor`]: validates the executable and spawns it
//! - [`ServerHandle`]: control interface for one running server
//! - [`ServerState`]: `Running → Closing → Closed` lifecycle shared with the
//!   exit observer task

use crate::config::{HarnessConfig, OutputMode, UnexpectedExitPolicy};
use crate::process::spawn_in_group;
use crate::workdir::WorkDir;
use crate::{HarnessError, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

pub mod handle;
mod observer;
pub mod state;


pub use crate::exit::ServerExit;
pub use handle::ServerHandle;
pub use state::ServerState;

use handle::HandleParts;
use observer::{spawn_exit_observer, spawn_stdout_forwarder};
use state::StateCell;

/// How servers are launched and watched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Env var name selecting the server's log verbosity
    pub log_env_key: String,
    /// Value for `log_env_key`
    pub log_level: String,
    /// Extra arguments passed to the server
    pub args: Vec<String>,
    /// Extra environment passed to the server
    pub env: BTreeMap<String, String>,
    /// Server stdout handling; stderr is always inherited
    pub stdout: OutputMode,
    /// Reaction to an unrequested exit
    pub on_unexpected_exit: UnexpectedExitPolicy,
    /// Bound on waiting for the exit during close
    pub shutdown_timeout: Option<Duration>,
    /// Host used for URLs and readiness checks
    pub host: String,
    /// Port the server is known to listen on; not passed to the server
    pub port: Option<u16>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from_harness(&HarnessConfig::default())
    }
}

impl SupervisorConfig {
    /// Take the supervisor-related settings of a harness config
    pub fn from_harness(config: &HarnessConfig) -> Self {
        Self {
            log_env_key: config.log_env_key.clone(),
            log_level: config.log_level.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
            stdout: config.stdout,
            on_unexpected_exit: config.on_unexpected_exit,
            shutdown_timeout: config.shutdown_timeout(),
            host: config.host.clone(),
            port: None,
        }
    }

    /// Set the advertised port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }
}

/// Starts servers under test
#[derive(Debug, Clone, Default)]
pub struct ServerSupervisor {
    config: SupervisorConfig,
}

impl ServerSupervisor {
    /// Create a supervisor with the given configuration
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    /// Spawn `server_path` inside `workdir`
    ///
    /// Fails with [`HarnessError::NotFound`] before anything is spawned if the
    /// path is not an executable file. On any failure `workdir` is dropped and
    /// thereby removed.
    pub async fn start(&self, server_path: &Path, workdir: WorkDir) -> Result<ServerHandle> {
        ensure_executable(server_path).await?;

        let mut command = Command::new(server_path);
        command
            .args(&self.config.args)
            .current_dir(workdir.path())
            .env(&self.config.log_env_key, &self.config.log_level)
            .envs(&self.config.env)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .stdout(match self.config.stdout {
                OutputMode::Discard => Stdio::null(),
                OutputMode::Inherit => Stdio::inherit(),
                OutputMode::Trace | OutputMode::Capture => Stdio::piped(),
            });

        let mut child = spawn_in_group(command)?;
        let pid = child.pid();

        let mut output = None;
        if let Some(stdout) = child.take_stdout() {
            let capture = if self.config.stdout == OutputMode::Capture {
                let (tx, rx) = mpsc::unbounded_channel();
                output = Some(rx);
                Some(tx)
            } else {
                None
            };
            spawn_stdout_forwarder(pid, stdout, capture);
        }

        let state = Arc::new(StateCell::new());
        let (unexpected_tx, unexpected_rx) = oneshot::channel();
        let observer = spawn_exit_observer(
            child,
            Arc::clone(&state),
            self.config.on_unexpected_exit,
            unexpected_tx,
        );

        info!(
            pid,
            "Started server {} in {}",
            server_path.display(),
            workdir.path().display()
        );

        Ok(ServerHandle::new(HandleParts {
            pid,
            executable: server_path.to_path_buf(),
            workdir,
            state,
            observer,
            unexpected_rx,
            host: self.config.host.clone(),
            port: self.config.port,
            shutdown_timeout: self.config.shutdown_timeout,
            output,
        }))
    }
}

/// Fail fast with a build hint instead of letting the OS report a bare ENOENT
async fn ensure_executable(path: &Path) -> Result<()> {
    let not_found = |reason: &str| {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "<server>".to_string());
        debug!("Server executable check failed for {}: {}", path.display(), reason);
        HarnessError::NotFound {
            path: path.to_path_buf(),
            hint: format!("{}; build it first with `cargo build --bin {}`", reason, name),
        }
    };

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| not_found(&e.to_string()))?;
    if !metadata.is_file() {
        return Err(not_found("not a regular file"));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(not_found("file is not executable"));
        }
    }

    Ok(())
}
