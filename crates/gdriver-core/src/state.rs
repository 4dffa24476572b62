//! Driver lifecycle state.
//!
//! ```text
//! Uninitialized --init--> Initialized --run--> Running --drained--> Stopped
//!       |                      |                                       ^
//!       +----------------------+------------------fini-----------------+
//! ```
//!
//! `Running` is only entered from `Initialized`. `Stopped` is reachable
//! from every state and is terminal: one driver runs one sequence.

use core::fmt;

/// Lifecycle state of a driver instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DriverState {
    /// Nothing loaded, no workers.
    Uninitialized = 0,

    /// Module resolved, worker pool spawned and idle.
    Initialized = 1,

    /// Dispatch loop active.
    Running = 2,

    /// Drained and joined. Terminal.
    Stopped = 3,
}

impl DriverState {
    /// `init` is only legal before anything was loaded.
    #[inline]
    pub const fn can_init(&self) -> bool {
        matches!(self, DriverState::Uninitialized)
    }

    /// `run` is only legal from `Initialized`.
    #[inline]
    pub const fn can_run(&self) -> bool {
        matches!(self, DriverState::Initialized)
    }

    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, DriverState::Stopped)
    }

    /// Whether the transition `self -> next` is legal.
    pub const fn can_transition_to(&self, next: DriverState) -> bool {
        match (self, next) {
            (DriverState::Uninitialized, DriverState::Initialized) => true,
            (DriverState::Initialized, DriverState::Running) => true,
            (_, DriverState::Stopped) => true,
            _ => false,
        }
    }
}

impl From<u8> for DriverState {
    fn from(v: u8) -> Self {
        match v {
            0 => DriverState::Uninitialized,
            1 => DriverState::Initialized,
            2 => DriverState::Running,
            _ => DriverState::Stopped,
        }
    }
}

impl From<DriverState> for u8 {
    fn from(state: DriverState) -> u8 {
        state as u8
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverState::Uninitialized => write!(f, "uninitialized"),
            DriverState::Initialized => write!(f, "initialized"),
            DriverState::Running => write!(f, "running"),
            DriverState::Stopped => write!(f, "stopped"),
        }
    }
}
