//! Driver state machine.
//!
//! Tracks where the local driver is in the pit cycle. The machine is pure:
//! it knows nothing about telemetry or managers. The telemetry loop owns it,
//! feeds it edge-triggered events, and broadcasts the resulting transitions
//! to the attached managers.

use std::fmt;

use crate::errors::BoxwallError;

/// Possible states a driver for a team (or solo) might be in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DriverState {
    Disconnected,
    Idle,
    OnTrack,
    OnPitRoad,
    InPitBox,
    Finished,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverState::Disconnected => "disconnected",
            DriverState::Idle => "idle",
            DriverState::OnTrack => "on_track",
            DriverState::OnPitRoad => "on_pit_road",
            DriverState::InPitBox => "in_pit_box",
            DriverState::Finished => "finished",
        };
        write!(f, "{}", name)
    }
}

/// Events the telemetry loop derives from the polled sample stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DriverEvent {
    Connect,
    Reconnect,
    Disconnect,
    SessionStart,
    DriverSwapIn,
    DriverSwapOut,
    EnterPitRoad,
    ExitPitRoad,
    EnterPitBox,
    ExitPitBox,
    FinishSession,
}

impl fmt::Display for DriverEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverEvent::Connect => "connect",
            DriverEvent::Reconnect => "reconnect",
            DriverEvent::Disconnect => "disconnect",
            DriverEvent::SessionStart => "session_start",
            DriverEvent::DriverSwapIn => "driver_swap_in",
            DriverEvent::DriverSwapOut => "driver_swap_out",
            DriverEvent::EnterPitRoad => "enter_pit_road",
            DriverEvent::ExitPitRoad => "exit_pit_road",
            DriverEvent::EnterPitBox => "enter_pit_box",
            DriverEvent::ExitPitBox => "exit_pit_box",
            DriverEvent::FinishSession => "finish_session",
        };
        write!(f, "{}", name)
    }
}

/// Context object broadcast to managers alongside the event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub event: DriverEvent,
    pub source: DriverState,
    pub destination: DriverState,
}

/// The driver state machine. Starts disconnected.
///
/// A `disconnect` remembers the last non-disconnected state so a later
/// `reconnect` can resume a stint in progress instead of dropping back to
/// idle through a fresh `connect`.
#[derive(Debug)]
pub struct DriverFsm {
    state: DriverState,
    saved_state: Option<DriverState>,
}

impl Default for DriverFsm {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverFsm {
    pub fn new() -> Self {
        Self {
            state: DriverState::Disconnected,
            saved_state: None,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn saved_state(&self) -> Option<DriverState> {
        self.saved_state
    }

    /// Attempt a transition. On success the machine moves and the transition
    /// context is returned; an event fired from an invalid source state is
    /// rejected with `InvalidTransition` and leaves the state untouched.
    pub fn trigger(&mut self, event: DriverEvent) -> Result<Transition, BoxwallError> {
        use DriverEvent::*;
        use DriverState::*;

        let destination = match (event, self.state) {
            (Connect, Disconnected) => Idle,
            (Reconnect, Disconnected) => self.saved_state.unwrap_or(Idle),
            // disconnect is valid from anywhere; the previous state is saved
            // for a later reconnect
            (Disconnect, _) => {
                if self.state != Disconnected {
                    self.saved_state = Some(self.state);
                }
                Disconnected
            }
            (SessionStart, Idle) => OnTrack,
            (DriverSwapIn, Idle) => InPitBox,
            (DriverSwapOut, InPitBox) => Idle,
            (EnterPitRoad, OnTrack) => OnPitRoad,
            (ExitPitRoad, OnPitRoad) => OnTrack,
            (EnterPitBox, OnPitRoad) => InPitBox,
            (ExitPitBox, InPitBox) => OnPitRoad,
            (FinishSession, OnTrack | OnPitRoad | InPitBox | Idle) => Finished,
            _ => {
                return Err(BoxwallError::InvalidTransition {
                    event,
                    state: self.state,
                });
            }
        };

        let transition = Transition {
            event,
            source: self.state,
            destination,
        };
        self.state = destination;
        Ok(transition)
    }
}
