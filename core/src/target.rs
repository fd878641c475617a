//! Locating the compiled server executable
//!
//! The target directory is queried from the build tool on every resolution and
//! never cached. Failures are reported as-is, never replaced by a default.

use crate::config::HarnessConfig;
use crate::{HarnessError, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// The part of the build tool's metadata the harness needs
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuildMetadata {
    /// Root of the build output
    pub target_directory: PathBuf,
}

impl BuildMetadata {
    /// Decode metadata from the raw stdout of the metadata command
    pub fn parse(stdout: &[u8]) -> Result<Self> {
        serde_json::from_slice(stdout).map_err(|e| HarnessError::Parse {
            message: e.to_string(),
            raw: String::from_utf8_lossy(stdout).into_owned(),
        })
    }

    /// `<target_directory>/<profile>/<name>` with the platform's exe suffix
    pub fn executable_path(&self, profile: &str, name: &str) -> PathBuf {
        self.target_directory
            .join(profile)
            .join(format!("{}{}", name, std::env::consts::EXE_SUFFIX))
    }
}

/// Command that prints build metadata as JSON on stdout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataCommand {
    program: String,
    args: Vec<String>,
}

impl MetadataCommand {
    /// Create a command from a program and its arguments
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Program to execute
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the program
    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

fn default_cargo_program() -> String {
    std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string())
}

/// Resolves the server executable from fresh build metadata
#[derive(Debug, Clone)]
pub struct TargetResolver {
    command: MetadataCommand,
    profile: String,
    timeout: Option<Duration>,
}

impl TargetResolver {
    /// Create a resolver running `command` and looking under `profile`
    pub fn new(command: MetadataCommand, profile: impl Into<String>) -> Self {
        Self {
            command,
            profile: profile.into(),
            timeout: None,
        }
    }

    /// Build a resolver from harness configuration
    pub fn from_config(config: &HarnessConfig) -> Self {
        let program = config
            .metadata_program
            .clone()
            .unwrap_or_else(default_cargo_program);
        Self::new(
            MetadataCommand::new(program, config.metadata_args.clone()),
            config.profile.clone(),
        )
        .with_timeout(config.metadata_timeout())
    }

    /// Bound the metadata query; `None` waits indefinitely
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the metadata command and decode its output
    pub async fn metadata(&self) -> Result<BuildMetadata> {
        let shown = self.command.display();
        debug!("Querying build metadata: {}", shown);

        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| {
                    HarnessError::Process(format!("`{}` did not finish within {:?}", shown, limit))
                })?,
            None => cmd.output().await,
        }
        .map_err(|e| HarnessError::Process(format!("Failed to run `{}`: {}", shown, e)))?;

        if !output.status.success() {
            return Err(HarnessError::Process(format!(
                "`{}` exited with {}: {}",
                shown,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        BuildMetadata::parse(&output.stdout)
    }

    /// Resolve `<target_directory>/<profile>/<name>`
    ///
    /// Only the location is computed; existence is checked when the server is
    /// started.
    pub async fn resolve_executable(&self, name: &str) -> Result<PathBuf> {
        let metadata = self.metadata().await?;
        let path = metadata.executable_path(&self.profile, name);
        debug!("Resolved server executable {}", path.display());
        Ok(path)
    }
}
