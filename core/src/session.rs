//! One-call session setup

use crate::config::HarnessConfig;
use crate::supervisor::{ServerHandle, ServerSupervisor, SupervisorConfig};
use crate::target::TargetResolver;
use crate::workdir::provision_workdir;
use crate::Result;
use tracing::{debug, warn};

/// Provision a work dir, locate the server executable and start it
///
/// `port` is only recorded on the handle for [`ServerHandle::url`] and
/// [`ServerHandle::wait_ready`]; it is neither validated nor passed to the
/// server. If resolution or spawning fails the work dir is removed before the
/// error is returned.
pub async fn start_server(port: u16, config: &HarnessConfig) -> Result<ServerHandle> {
    config.validate()?;

    let workdir = provision_workdir(&config.workdir_prefix).await?;
    debug!("Provisioned work dir {}", workdir.path().display());

    let resolver = TargetResolver::from_config(config);
    let executable = match resolver.resolve_executable(&config.executable_name).await {
        Ok(path) => path,
        Err(e) => {
            if let Err(cleanup) = workdir.remove().await {
                warn!("Failed to remove work dir after resolution error: {}", cleanup);
            }
            return Err(e);
        }
    };

    ServerSupervisor::new(SupervisorConfig::from_harness(config).with_port(port))
        .start(&executable, workdir)
        .await
}
