//! Configuration loading and validation for the harness
//!
//! `HarnessConfig` is parsed from TOML (camelCase keys), falls back to sane
//! defaults for every field, and is validated with field-path error messages.
//! A few environment variables override values from the file.

use crate::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Env var pointing at a TOML config file
pub const CONFIG_PATH_ENV: &str = "HARNESS_CONFIG";
/// Env var overriding [`HarnessConfig::executable_name`]
pub const EXECUTABLE_ENV: &str = "HARNESS_EXECUTABLE";
/// Env var overriding [`HarnessConfig::profile`]
pub const PROFILE_ENV: &str = "HARNESS_PROFILE";

/// Where the server's stdout goes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Dropped (null device)
    #[default]
    Discard,
    /// Shared with the harness's own stdout
    Inherit,
    /// Read line by line and re-emitted through `tracing`
    Trace,
    /// Like `Trace`, and lines are also kept for
    /// [`ServerHandle::expect_output`](crate::supervisor::ServerHandle::expect_output)
    Capture,
}

/// What the exit observer does when the server dies on its own
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnexpectedExitPolicy {
    /// Log, notify, then abort the whole test process
    #[default]
    Abort,
    /// Log and notify through the handle only
    Report,
}

/// Full harness configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HarnessConfig {
    /// Prefix for the ephemeral working directory name
    pub workdir_prefix: String,
    /// File name of the server executable inside the target directory
    pub executable_name: String,
    /// Build profile directory under the target directory
    pub profile: String,
    /// Build-metadata command; `None` means `$CARGO` or `cargo`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_program: Option<String>,
    /// Arguments for the build-metadata command
    pub metadata_args: Vec<String>,
    /// Env var name selecting the server's log verbosity
    pub log_env_key: String,
    /// Value for [`HarnessConfig::log_env_key`]
    pub log_level: String,
    /// Extra arguments passed to the server
    pub args: Vec<String>,
    /// Extra environment passed to the server
    pub env: BTreeMap<String, String>,
    /// Host used to build probe URLs
    pub host: String,
    /// Server stdout handling
    pub stdout: OutputMode,
    /// Reaction to a server exit that was not requested
    pub on_unexpected_exit: UnexpectedExitPolicy,
    /// Bound on the build-metadata query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_timeout_ms: Option<u64>,
    /// Bound on waiting for the port to accept connections
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_timeout_ms: Option<u64>,
    /// Bound on waiting for the process to exit during close
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shutdown_timeout_ms: Option<u64>,
    /// Bound on a single HTTP probe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_timeout_ms: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            workdir_prefix: "sut-harness-".to_string(),
            executable_name: "stub_server".to_string(),
            profile: "debug".to_string(),
            metadata_program: None,
            metadata_args: default_metadata_args(),
            log_env_key: "RUST_LOG".to_string(),
            log_level: "info".to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
            host: "127.0.0.1".to_string(),
            stdout: OutputMode::default(),
            on_unexpected_exit: UnexpectedExitPolicy::default(),
            metadata_timeout_ms: None,
            startup_timeout_ms: None,
            shutdown_timeout_ms: None,
            probe_timeout_ms: None,
        }
    }
}

fn default_metadata_args() -> Vec<String> {
    ["metadata", "--format-version", "1", "--no-deps"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn millis(value: Option<u64>) -> Option<Duration> {
    value.map(Duration::from_millis)
}

impl HarnessConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.workdir_prefix.trim().is_empty() {
            return Err(HarnessError::Configuration(
                "workdirPrefix: cannot be empty".to_string(),
            ));
        }
        if self.workdir_prefix.contains('/') {
            return Err(HarnessError::Configuration(format!(
                "workdirPrefix: must not contain path separators, got '{}'",
                self.workdir_prefix
            )));
        }
        if self.executable_name.trim().is_empty() {
            return Err(HarnessError::Configuration(
                "executableName: cannot be empty".to_string(),
            ));
        }
        if self.profile.trim().is_empty() {
            return Err(HarnessError::Configuration(
                "profile: cannot be empty".to_string(),
            ));
        }
        if let Some(program) = &self.metadata_program {
            if program.trim().is_empty() {
                return Err(HarnessError::Configuration(
                    "metadataProgram: cannot be empty when set".to_string(),
                ));
            }
        }
        if self.log_env_key.trim().is_empty() {
            return Err(HarnessError::Configuration(
                "logEnvKey: cannot be empty".to_string(),
            ));
        }
        for key in self.env.keys() {
            if key.trim().is_empty() || key.contains('=') {
                return Err(HarnessError::Configuration(format!(
                    "env: invalid variable name '{}'",
                    key
                )));
            }
        }
        if self.host.trim().is_empty() {
            return Err(HarnessError::Configuration(
                "host: cannot be empty".to_string(),
            ));
        }
        for (field, value) in [
            ("metadataTimeoutMs", self.metadata_timeout_ms),
            ("startupTimeoutMs", self.startup_timeout_ms),
            ("shutdownTimeoutMs", self.shutdown_timeout_ms),
            ("probeTimeoutMs", self.probe_timeout_ms),
        ] {
            if value == Some(0) {
                return Err(HarnessError::Configuration(format!(
                    "{}: must be > 0 when set",
                    field
                )));
            }
        }
        Ok(())
    }

    /// Build-metadata query timeout
    pub fn metadata_timeout(&self) -> Option<Duration> {
        millis(self.metadata_timeout_ms)
    }

    /// Readiness wait timeout
    pub fn startup_timeout(&self) -> Option<Duration> {
        millis(self.startup_timeout_ms)
    }

    /// Close wait timeout
    pub fn shutdown_timeout(&self) -> Option<Duration> {
        millis(self.shutdown_timeout_ms)
    }

    /// HTTP probe timeout
    pub fn probe_timeout(&self) -> Option<Duration> {
        millis(self.probe_timeout_ms)
    }

    /// Load from `HARNESS_CONFIG` if set (defaults otherwise), then apply
    /// `HARNESS_EXECUTABLE` and `HARNESS_PROFILE` overrides
    pub fn from_env() -> Result<Self> {
        let mut cfg = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => load_config_from_toml_path(path)?,
            None => Self::default(),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup(EXECUTABLE_ENV) {
            self.executable_name = name;
        }
        if let Some(profile) = lookup(PROFILE_ENV) {
            self.profile = profile;
        }
    }
}

/// Load harness config from a TOML file path
pub fn load_config_from_toml_path(path: impl AsRef<Path>) -> Result<HarnessConfig> {
    let data = fs::read_to_string(&path).map_err(|e| {
        HarnessError::Configuration(format!(
            "Failed to read config {:?}: {}",
            path.as_ref(),
            e
        ))
    })?;
    load_config_from_toml_str(&data)
}

/// Load harness config from a TOML string
pub fn load_config_from_toml_str(input: &str) -> Result<HarnessConfig> {
    let cfg: HarnessConfig = toml::from_str(input)
        .map_err(|e| HarnessError::Configuration(format!("TOML parse error: {}", e)))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_defaults() {
        let cfg = load_config_from_toml_str("").expect("should parse");
        assert_eq!(cfg, HarnessConfig::default());
        assert_eq!(cfg.log_env_key, "RUST_LOG");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.stdout, OutputMode::Discard);
        assert_eq!(cfg.on_unexpected_exit, UnexpectedExitPolicy::Abort);
        assert!(cfg.shutdown_timeout().is_none());
        assert!(cfg.probe_timeout().is_none());
    }

    #[test]
    fn parses_full_config() {
        let input = r#"
        workdirPrefix = "cmd-api-"
        executableName = "api_server"
        profile = "release"
        metadataProgram = "/usr/bin/cargo"
        args = ["--port", "9000"]
        stdout = "trace"
        onUnexpectedExit = "report"
        shutdownTimeoutMs = 2500

        [env]
        API_MODE = "test"
        "#;
        let cfg = load_config_from_toml_str(input).expect("should parse");
        assert_eq!(cfg.workdir_prefix, "cmd-api-");
        assert_eq!(cfg.executable_name, "api_server");
        assert_eq!(cfg.profile, "release");
        assert_eq!(cfg.metadata_program.as_deref(), Some("/usr/bin/cargo"));
        assert_eq!(cfg.args, vec!["--port".to_string(), "9000".to_string()]);
        assert_eq!(cfg.stdout, OutputMode::Trace);
        assert_eq!(cfg.on_unexpected_exit, UnexpectedExitPolicy::Report);
        assert_eq!(cfg.shutdown_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(cfg.env.get("API_MODE").map(String::as_str), Some("test"));
        assert_eq!(cfg.metadata_args, default_metadata_args());
    }

    #[test]
    fn parses_capture_stdout_mode() {
        let cfg = load_config_from_toml_str(r#"stdout = "capture""#).expect("should parse");
        assert_eq!(cfg.stdout, OutputMode::Capture);
    }

    #[test]
    fn errors_on_unknown_stdout_mode() {
        let err = load_config_from_toml_str(r#"stdout = "pipe""#).unwrap_err();
        assert!(format!("{}", err).contains("TOML parse error"));
    }

    #[test]
    fn errors_on_empty_executable_name() {
        let err = load_config_from_toml_str(r#"executableName = " ""#).unwrap_err();
        assert!(format!("{}", err).contains("executableName"));
    }

    #[test]
    fn errors_on_prefix_with_separator() {
        let err = load_config_from_toml_str(r#"workdirPrefix = "a/b""#).unwrap_err();
        assert!(format!("{}", err).contains("workdirPrefix"));
    }

    #[test]
    fn errors_on_zero_timeout() {
        let err = load_config_from_toml_str("probeTimeoutMs = 0").unwrap_err();
        assert!(format!("{}", err).contains("probeTimeoutMs"));
    }

    #[test]
    fn errors_on_bad_env_key() {
        let input = r#"
        [env]
        "A=B" = "x"
        "#;
        let err = load_config_from_toml_str(input).unwrap_err();
        assert!(format!("{}", err).contains("env: invalid variable name"));
    }

    #[test]
    fn overrides_apply_executable_and_profile() {
        let mut cfg = HarnessConfig::default();
        cfg.apply_overrides(|key| match key {
            EXECUTABLE_ENV => Some("other_server".to_string()),
            PROFILE_ENV => Some("release".to_string()),
            _ => None,
        });
        assert_eq!(cfg.executable_name, "other_server");
        assert_eq!(cfg.profile, "release");
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("harness.toml");
        fs::write(&path, "executableName = \"from_file\"\n").expect("write config");
        let cfg = load_config_from_toml_path(&path).expect("load");
        assert_eq!(cfg.executable_name, "from_file");

        let missing = load_config_from_toml_path(dir.path().join("nope.toml")).unwrap_err();
        assert!(format!("{}", missing).contains("Failed to read config"));
    }
}
