pub mod worker;

pub use worker::ApiWorker;

use log::info;

use crate::models::{Lap, PitStop, Session, Stint};

/// Outbound task envelope. Managers enqueue these; the worker drains the
/// queue strictly FIFO so that a create always reaches the backend (and
/// yields an id) before any update or dependent record that needs it.
#[derive(Clone, Debug, PartialEq)]
pub enum ApiTask {
    Session(Session),
    StintCreate(Stint),
    StintUpdate(Stint),
    Lap(Lap),
    PitstopCreate(PitStop),
    PitstopUpdate(PitStop),
    /// Sentinel pushed after the stop flag so the worker wakes up promptly.
    Shutdown,
}

/// Backend client contract, consumed by the worker only.
///
/// Implementations swallow transport failures and report them as absence
/// values; the worker logs and moves on. Delivery is at-least-once,
/// fire-and-forget.
pub trait BackendClient: Send {
    /// Create a session record; returns the backend-assigned id.
    fn create_session(&mut self, session: &Session) -> Option<i64>;

    /// Number of the latest existing stint for the session, if any.
    fn latest_stint_number(&mut self, session_id: i64) -> Option<i32>;

    fn create_stint(&mut self, stint: &Stint) -> Option<i64>;

    fn update_stint(&mut self, stint_id: i64, stint: &Stint) -> bool;

    fn create_pitstop(&mut self, pitstop: &PitStop) -> Option<i64>;

    fn update_pitstop(&mut self, pitstop_id: i64, pitstop: &PitStop) -> bool;

    fn create_lap(&mut self, lap: &Lap) -> bool;
}

/// Backend stand-in that logs every record instead of shipping it and
/// assigns ids locally. Used by the binary when no endpoint is configured
/// and handy for shaking the full pipeline out without a server.
#[derive(Debug, Default)]
pub struct DryRunClient {
    next_id: i64,
    latest_stint: Option<i32>,
}

impl DryRunClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn assign_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl BackendClient for DryRunClient {
    fn create_session(&mut self, session: &Session) -> Option<i64> {
        let id = self.assign_id();
        info!(
            "session {}: {} / {} ({})",
            id, session.track, session.car, session.car_class
        );
        Some(id)
    }

    fn latest_stint_number(&mut self, _session_id: i64) -> Option<i32> {
        self.latest_stint
    }

    fn create_stint(&mut self, stint: &Stint) -> Option<i64> {
        let id = self.assign_id();
        self.latest_stint = stint.number;
        info!(
            "stint {} #{:?} for {} starting at {:.1}s",
            id, stint.number, stint.driver_name, stint.start_time_s
        );
        Some(id)
    }

    fn update_stint(&mut self, stint_id: i64, stint: &Stint) -> bool {
        info!(
            "stint {} update: laps={} complete={}",
            stint_id,
            stint.laps.len(),
            stint.is_complete
        );
        true
    }

    fn create_pitstop(&mut self, pitstop: &PitStop) -> Option<i64> {
        let id = self.assign_id();
        info!(
            "pitstop {} for stint {:?} entered road at {:?}",
            id, pitstop.stint_id, pitstop.road_enter_time_s
        );
        Some(id)
    }

    fn update_pitstop(&mut self, pitstop_id: i64, pitstop: &PitStop) -> bool {
        info!(
            "pitstop {} update: tires={} repairs={}",
            pitstop_id,
            pitstop.has_tire_change(),
            pitstop.has_repairs()
        );
        true
    }

    fn create_lap(&mut self, lap: &Lap) -> bool {
        info!(
            "lap {} for stint {:?}: {:.3}s",
            lap.number, lap.stint_id, lap.time_s
        );
        true
    }
}
