//! Listener run-state

use std::sync::atomic::{AtomicU8, Ordering};

use usbmux_core::ListenerError;

/// Lifecycle of a listener
///
/// `Idle` moves to `Running` only through an explicit start. `Closing` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    Idle = 0,
    Running = 1,
    Closing = 2,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            _ => Self::Closing,
        }
    }
}

/// Atomic cell holding a [`RunState`]
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(RunState::Idle as u8))
    }

    pub(crate) fn load(&self) -> RunState {
        RunState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Single atomic transition from `Idle` to `Running`
    pub(crate) fn start(&self) -> Result<(), ListenerError> {
        self.0
            .compare_exchange(
                RunState::Idle as u8,
                RunState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|current| match RunState::from_u8(current) {
                RunState::Closing => ListenerError::Closed,
                _ => ListenerError::AlreadyRunning,
            })
    }

    /// Move to `Closing`, returning the previous state
    pub(crate) fn close(&self) -> RunState {
        RunState::from_u8(self.0.swap(RunState::Closing as u8, Ordering::AcqRel))
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.load() == RunState::Closing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_once() {
        let state = StateCell::new();
        assert_eq!(state.load(), RunState::Idle);
        assert!(state.start().is_ok());
        assert_eq!(state.load(), RunState::Running);
        assert_eq!(state.start(), Err(ListenerError::AlreadyRunning));
    }

    #[test]
    fn test_close_is_terminal() {
        let state = StateCell::new();
        state.start().unwrap();
        assert_eq!(state.close(), RunState::Running);
        assert!(state.is_closing());
        assert_eq!(state.start(), Err(ListenerError::Closed));
        assert_eq!(state.close(), RunState::Closing);
    }

    #[test]
    fn test_close_before_start() {
        let state = StateCell::new();
        state.close();
        assert_eq!(state.start(), Err(ListenerError::Closed));
    }
}
