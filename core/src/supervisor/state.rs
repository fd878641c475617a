//! Lifecycle state shared between a server handle and its exit observer
//!
//! ```text
//! Running → Closing → Closed
//! ```
//!
//! The handle is the only writer. The observer only reads, after the child has
//! exited, to decide whether the exit was requested. `close` must store
//! `Closing` before the kill signal is sent, otherwise the observer could see
//! `Running` for an exit the harness caused itself.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a supervised server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Process spawned, no shutdown requested
    Running,
    /// Shutdown requested; any exit from here on is expected
    Closing,
    /// Shutdown finished, resources released
    Closed,
}

impl ServerState {
    fn as_u8(self) -> u8 {
        match self {
            ServerState::Running => 0,
            ServerState::Closing => 1,
            ServerState::Closed => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ServerState::Running,
            1 => ServerState::Closing,
            _ => ServerState::Closed,
        }
    }
}

/// Atomic cell holding a [`ServerState`]
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ServerState::Running.as_u8()))
    }

    pub(crate) fn get(&self) -> ServerState {
        ServerState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// `Running → Closing`; returns the current state if it was not `Running`
    pub(crate) fn begin_close(&self) -> Result<(), ServerState> {
        self.0
            .compare_exchange(
                ServerState::Running.as_u8(),
                ServerState::Closing.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(ServerState::from_u8)
    }

    /// `Closing → Closed`
    pub(crate) fn finish_close(&self) {
        let previous = self.0.swap(ServerState::Closed.as_u8(), Ordering::SeqCst);
        debug_assert_eq!(ServerState::from_u8(previous), ServerState::Closing);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_running() {
        assert_eq!(StateCell::new().get(), ServerState::Running);
    }

    #[test]
    fn test_close_transitions() {
        let cell = StateCell::new();
        assert_eq!(cell.begin_close(), Ok(()));
        assert_eq!(cell.get(), ServerState::Closing);
        cell.finish_close();
        assert_eq!(cell.get(), ServerState::Closed);
    }

    #[test]
    fn test_begin_close_only_once() {
        let cell = StateCell::new();
        cell.begin_close().unwrap();
        assert_eq!(cell.begin_close(), Err(ServerState::Closing));
        cell.finish_close();
        assert_eq!(cell.begin_close(), Err(ServerState::Closed));
    }
}
