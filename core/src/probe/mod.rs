//! Probes against a running server
//!
//! - [`HttpProbeClient`]: issues a POST and decodes the JSON reply
//! - [`TcpProbe`]: checks that a port accepts connections

pub mod http;
pub mod tcp;

pub use http::{post_json, HttpProbeClient};
pub use tcp::{wait_for_port, TcpProbe};
