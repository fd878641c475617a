//! Shared helpers for end-to-end tests against `stub_server`
#![allow(missing_docs)]

use harness_core::{HarnessConfig, UnexpectedExitPolicy};
use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;
use std::time::Duration;

pub fn workspace_root() -> PathBuf {
    // CARGO_MANIFEST_DIR points to the e2e-tests crate directory
    let here = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    here.parent().map(PathBuf::from).unwrap_or(here)
}

/// Build `stub_server` once per test binary
///
/// Failures are ignored here; a missing binary surfaces as `NotFound` from
/// the harness with the build hint.
pub fn ensure_stub_built() {
    static BUILT: OnceLock<()> = OnceLock::new();
    BUILT.get_or_init(|| {
        let cargo = std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());
        let _ = Command::new(cargo)
            .args(["build", "-p", "stub-server", "--bin", "stub_server", "--quiet"])
            .current_dir(workspace_root())
            .status();
    });
}

/// A port that was free a moment ago
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .unwrap_or(18181)
}

/// Harness config that runs the stub on `port` and reports crashes instead of aborting
pub fn stub_config(port: u16, extra_args: &[&str]) -> HarnessConfig {
    let mut args = vec!["--port".to_string(), port.to_string()];
    args.extend(extra_args.iter().map(|s| s.to_string()));
    HarnessConfig {
        args,
        on_unexpected_exit: UnexpectedExitPolicy::Report,
        startup_timeout_ms: Some(20_000),
        shutdown_timeout_ms: Some(10_000),
        probe_timeout_ms: Some(10_000),
        ..Default::default()
    }
}

/// Run the given future with a timeout, failing the test if it elapses.
///
/// # Panics
///
/// Panics if the timeout elapses before the future completes.
pub async fn run_with_timeout<F, T>(duration: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .expect("test timed out")
}
