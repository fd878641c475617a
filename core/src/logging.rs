//! Tracing initialisation for harness users
//!
//! Tests call [`init_tracing`] from many places; only the first call installs
//! a subscriber, later calls report that one is already present.

use crate::{HarnessError, Result};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Install a global `fmt` subscriber writing to stderr
///
/// `RUST_LOG` wins over `level` when it is set.
pub fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| HarnessError::Configuration(e.to_string()))?;

    info!("Tracing initialized with level: {}", level);
    Ok(())
}

/// Like [`init_tracing`] but ignores an already installed subscriber
pub fn try_init_tracing(level: &str) {
    let _ = init_tracing(level);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_reports_existing_subscriber() {
        try_init_tracing("debug");
        let err = init_tracing("debug").unwrap_err();
        assert_eq!(err.code(), "HAR009");
    }
}
