pub mod lap_manager;
pub mod pitstop_manager;
pub mod session_manager;
pub mod stint_manager;

pub use lap_manager::LapManager;
pub use pitstop_manager::PitstopManager;
pub use session_manager::SessionManager;
pub use stint_manager::StintManager;

use std::sync::mpsc::Sender;

use log::warn;

use crate::api::ApiTask;
use crate::fsm::{DriverState, Transition};
use crate::telemetry::TelemetrySnapshot;

/// A stateful observer of the driver state machine and the raw tick stream.
///
/// Managers never touch the network: they own their entity's lifecycle and
/// push tasks onto the outbound queue. `handle_event` fires synchronously on
/// every FSM transition, `on_tick` on every poll whether or not an edge
/// fired.
pub trait Manager: Send {
    fn name(&self) -> &'static str;

    /// Telemetry variables this manager needs in the per-tick snapshot.
    /// Consumed once at wiring time.
    fn required_fields(&self) -> &'static [&'static str] {
        &[]
    }

    fn handle_event(&mut self, _transition: &Transition, _snapshot: &TelemetrySnapshot) {}

    fn on_tick(&mut self, _snapshot: &TelemetrySnapshot, _state: DriverState) {}
}

/// Non-blocking enqueue; a closed queue is logged, never fatal.
pub(crate) fn enqueue(queue: &Sender<ApiTask>, manager: &str, task: ApiTask) {
    if let Err(e) = queue.send(task) {
        warn!("{}: could not enqueue task: {}", manager, e);
    }
}

/// Lap time for a freshly completed lap. The SDK-reported last-lap time
/// lags a freshly completed lap (it reads -1.0 until scoring catches up),
/// so fall back to elapsed session time since the lap started.
pub(crate) fn resolve_lap_time(
    reported: Option<f32>,
    lap_start: Option<f64>,
    session_time: Option<f64>,
) -> Option<f64> {
    match reported {
        Some(t) if t > 0.0 => Some(t as f64),
        _ => Some(session_time? - lap_start?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_lap_time_prefers_reported() {
        assert_eq!(
            resolve_lap_time(Some(91.2), Some(100.0), Some(200.0)),
            Some(91.2f32 as f64)
        );
    }

    #[test]
    fn test_resolve_lap_time_falls_back_to_elapsed() {
        let time = resolve_lap_time(Some(-1.0), Some(100.0), Some(185.3)).unwrap();
        assert!((time - 85.3).abs() < 1e-9);
    }

    #[test]
    fn test_resolve_lap_time_missing_inputs() {
        assert_eq!(resolve_lap_time(None, None, Some(185.3)), None);
        assert_eq!(resolve_lap_time(Some(0.0), Some(100.0), None), None);
    }
}
