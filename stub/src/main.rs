//! Stub HTTP server used as the server under test
//!
//! Behavior:
//! - Listens on `--host`/`--port` (env `STUB_PORT`, default 8181)
//! - Writes `stub_server.pid` into its working directory
//! - `POST <path>` replies `{"id": n, "path": ..., "cacheControl": ...}`
//! - `GET /health` replies `{"status":"ok"}`
//! - Runs until signalled, or exits with code 3 after `--exit-after-ms`
//! - Logs to stderr; verbosity follows `RUST_LOG`

mod routes;

use anyhow::{Context, Result};
use clap::Parser;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use routes::Routes;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Exit code used for `--exit-after-ms`
const SELF_EXIT_CODE: i32 = 3;

/// Name of the pid file written into the working directory
const PID_FILE: &str = "stub_server.pid";

#[derive(Parser, Debug)]
#[command(name = "stub_server")]
#[command(about = "Minimal HTTP server for harness end-to-end tests")]
struct Args {
    /// Port to listen on
    #[arg(long, env = "STUB_PORT", default_value_t = 8181)]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Exit with code 3 after this many milliseconds
    #[arg(long)]
    exit_after_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let pid = std::process::id();
    std::fs::write(PID_FILE, pid.to_string())
        .with_context(|| format!("failed to write {}", PID_FILE))?;

    if let Some(ms) = args.exit_after_ms {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            warn!("Exiting with code {} after {}ms as requested", SELF_EXIT_CODE, ms);
            std::process::exit(SELF_EXIT_CODE);
        });
    }

    let routes = Routes::new();
    let make_svc = make_service_fn(move |_conn| {
        let routes = Arc::clone(&routes);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| Arc::clone(&routes).handle(req)))
        }
    });

    let addr = SocketAddr::new(args.host, args.port);
    let server = Server::try_bind(&addr)
        .with_context(|| format!("failed to bind {}", addr))?
        .serve(make_svc);
    info!(pid, "stub_server listening on {}", server.local_addr());

    server.await.context("server error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["stub_server"]).unwrap();
        assert_eq!(args.host.to_string(), "127.0.0.1");
        assert!(args.exit_after_ms.is_none());
    }

    #[test]
    fn explicit_flags() {
        let args = Args::try_parse_from([
            "stub_server",
            "--port",
            "9000",
            "--host",
            "0.0.0.0",
            "--exit-after-ms",
            "250",
        ])
        .unwrap();
        assert_eq!(args.port, 9000);
        assert_eq!(args.host.to_string(), "0.0.0.0");
        assert_eq!(args.exit_after_ms, Some(250));
    }

    #[test]
    fn rejects_bad_port() {
        assert!(Args::try_parse_from(["stub_server", "--port", "not-a-port"]).is_err());
    }
}
