//! Test harness for supervising a server under test
//!
//! This crate starts one server executable per test session in an ephemeral
//! working directory, watches it for exits nobody asked for, probes it over
//! HTTP, and tears everything down again.
//!
//! ```rust,no_run
//! use harness_core::{start_server, HarnessConfig, HttpProbeClient};
//!
//! # async fn example() -> harness_core::Result<()> {
//! let config = HarnessConfig::from_env()?;
//! let mut server = start_server(8181, &config).await?;
//! server.wait_ready(config.startup_timeout()).await?;
//!
//! let reply = HttpProbeClient::from_config(&config)
//!     .post(&server.url("/accounts")?)
//!     .await?;
//! println!("{}", reply);
//!
//! server.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod exit;
pub mod logging;
pub mod probe;
#[cfg(unix)]
pub mod process;
#[cfg(unix)]
pub mod session;
#[cfg(unix)]
pub mod supervisor;
pub mod target;
pub mod workdir;


pub use config::{HarnessConfig, OutputMode, UnexpectedExitPolicy};
pub use error::{HarnessError, Result};
pub use exit::ServerExit;
pub use logging::{init_tracing, try_init_tracing};
pub use probe::{post_json, wait_for_port, HttpProbeClient, TcpProbe};
#[cfg(unix)]
pub use session::start_server;
#[cfg(unix)]
pub use supervisor::{ServerHandle, ServerState, ServerSupervisor, SupervisorConfig};
pub use target::{BuildMetadata, MetadataCommand, TargetResolver};
pub use workdir::{provision_workdir, WorkDir};
