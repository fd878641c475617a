//! TCP readiness probing

use crate::{HarnessError, Result};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Probe that tests TCP connection establishment
///
/// The connection is closed as soon as it is established.
///
/// # Example
///
/// ```rust
/// use harness_core::TcpProbe;
/// use std::time::Duration;
///
/// # async fn example() {
/// let probe = TcpProbe::new("127.0.0.1", 8181, Duration::from_millis(500));
/// if probe.check().await.is_ok() {
///     println!("{} is accepting connections", probe.address());
/// }
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    /// Create a probe for `host:port` with a per-attempt connect timeout
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    /// Target address as `host:port`
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Attempt a single connection
    pub async fn check(&self) -> Result<()> {
        let address = self.address();
        debug!("TCP probe connecting to {}", address);

        match timeout(self.timeout, TcpStream::connect(&address)).await {
            Ok(Ok(_stream)) => {
                debug!("TCP probe to {} succeeded", address);
                Ok(())
            }
            Ok(Err(io_error)) => {
                debug!("TCP probe to {} failed: {}", address, io_error);
                Err(HarnessError::Network(format!(
                    "connect to {} failed: {}",
                    address, io_error
                )))
            }
            Err(_elapsed) => {
                debug!("TCP probe to {} timed out after {:?}", address, self.timeout);
                Err(HarnessError::Timeout(format!(
                    "connect to {} did not complete within {:?}",
                    address, self.timeout
                )))
            }
        }
    }
}

/// Delay between attempts while polling
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Poll `host:port` until it accepts a connection or `deadline` elapses
pub async fn wait_for_port(host: &str, port: u16, deadline: Duration) -> Result<()> {
    let probe = TcpProbe::new(host, port, deadline.min(Duration::from_millis(500)));
    let started = Instant::now();
    loop {
        if probe.check().await.is_ok() {
            return Ok(());
        }
        if started.elapsed() >= deadline {
            return Err(HarnessError::Timeout(format!(
                "{} not accepting connections after {:?}",
                probe.address(),
                deadline
            )));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
