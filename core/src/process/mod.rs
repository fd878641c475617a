//! Process management for the server under test
//!
//! Only Unix is supported: the supervisor relies on process groups so that a
//! single signal reaches the server and anything it forked.

#[cfg(unix)]
pub mod unix;

#[cfg(unix)]
pub use unix::*;
