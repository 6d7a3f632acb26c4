//! Stint lifecycle detection.
//!
//! Mirrors the pit-cycle phases: no stint -> stint open -> pending close
//! (on pit road, not yet serviced) -> closed. A pit-road touch that never
//! reaches the box is a false alarm and keeps the original stint open.

use std::sync::mpsc::Sender;

use log::{debug, info, warn};

use crate::api::ApiTask;
use crate::context::SharedRaceContext;
use crate::fsm::{DriverEvent, DriverState, Transition};
use crate::models::{Lap, Stint};
use crate::telemetry::{fields, TelemetrySnapshot};

use super::{enqueue, resolve_lap_time, Manager};

pub struct StintManager {
    context: SharedRaceContext,
    queue: Sender<ApiTask>,
    current: Option<Stint>,
    pending_close: bool,
    last_lap_completed: i32,
    lap_start_time: Option<f64>,
}

impl StintManager {
    pub fn new(context: SharedRaceContext, queue: Sender<ApiTask>) -> Self {
        Self {
            context,
            queue,
            current: None,
            pending_close: false,
            last_lap_completed: 0,
            lap_start_time: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn current(&self) -> Option<&Stint> {
        self.current.as_ref()
    }

    fn start_stint(&mut self, snapshot: &TelemetrySnapshot) {
        // backend ids are filled in by the worker when the task is
        // processed, after the creates ahead of it in the queue
        let driver_name = self
            .context
            .lock()
            .expect("race context poisoned")
            .user_name
            .clone();
        let stint = Stint {
            driver_name,
            start_time_s: snapshot.session_time_s.unwrap_or(0.0),
            start_position: snapshot.class_position,
            start_incidents: snapshot.incident_count,
            start_fuel: snapshot.fuel_level,
            ..Stint::default()
        };
        info!("Opening stint at {:.1}s", stint.start_time_s);
        self.last_lap_completed = snapshot.lap_completed.unwrap_or(self.last_lap_completed);
        self.lap_start_time = snapshot.session_time_s;
        enqueue(&self.queue, self.name(), ApiTask::StintCreate(stint.clone()));
        self.current = Some(stint);
    }

    /// Refresh the running end-of-stint fields and push an incremental
    /// update. Spurious calls between stints are no-ops.
    fn update_stint(&mut self, snapshot: &TelemetrySnapshot) {
        let Some(stint) = self.current.as_mut() else {
            debug!("Stint update with no open stint, ignoring");
            return;
        };
        if stint.is_complete {
            return;
        }
        stint.end_time_s = snapshot.session_time_s;
        stint.end_position = snapshot.class_position;
        stint.end_incidents = snapshot.incident_count;
        stint.end_fuel = snapshot.fuel_level;
        enqueue(&self.queue, "stint", ApiTask::StintUpdate(stint.clone()));
    }

    fn end_stint(&mut self, snapshot: &TelemetrySnapshot) {
        let Some(mut stint) = self.current.take() else {
            warn!("Stint close with no open stint, ignoring");
            return;
        };
        stint.end_time_s = snapshot.session_time_s;
        stint.end_position = snapshot.class_position;
        stint.end_incidents = snapshot.incident_count;
        stint.end_fuel = snapshot.fuel_level;
        stint.is_complete = true;
        info!(
            "Closing stint: {} laps, duration {:?}",
            stint.laps.len(),
            stint.duration()
        );
        enqueue(&self.queue, self.name(), ApiTask::StintUpdate(stint));
        self.pending_close = false;
    }

    fn record_lap(&mut self, snapshot: &TelemetrySnapshot, lap_completed: i32) {
        if let Some(stint) = self.current.as_mut()
            && let Some(time_s) = resolve_lap_time(
                snapshot.last_lap_time_s,
                self.lap_start_time,
                snapshot.session_time_s,
            )
        {
            stint.laps.push(Lap {
                stint_id: stint.id,
                number: lap_completed,
                time_s,
            });
        }
        self.lap_start_time = snapshot.session_time_s;
    }
}

impl Manager for StintManager {
    fn name(&self) -> &'static str {
        "stint"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[
            fields::SESSION_TIME,
            fields::CLASS_POSITION,
            fields::INCIDENT_COUNT,
            fields::FUEL_LEVEL,
            fields::LAP_COMPLETED,
            fields::LAP_LAST_LAP_TIME,
        ]
    }

    fn handle_event(&mut self, transition: &Transition, snapshot: &TelemetrySnapshot) {
        match transition.event {
            DriverEvent::SessionStart => self.start_stint(snapshot),
            DriverEvent::EnterPitRoad => {
                self.update_stint(snapshot);
                self.pending_close = true;
            }
            DriverEvent::ExitPitRoad => {
                if self.pending_close {
                    // false alarm: touched pit road but never boxed
                    debug!("Pit road exit without service, stint continues");
                    self.pending_close = false;
                } else {
                    self.start_stint(snapshot);
                }
            }
            DriverEvent::EnterPitBox => self.end_stint(snapshot),
            // the final stint closes with no pit stop; its in-lap is just
            // its last recorded lap
            DriverEvent::FinishSession => {
                if self.current.is_some() {
                    self.end_stint(snapshot);
                }
            }
            _ => {}
        }
    }

    fn on_tick(&mut self, snapshot: &TelemetrySnapshot, _state: DriverState) {
        let Some(lap_completed) = snapshot.lap_completed else {
            return;
        };
        if lap_completed > self.last_lap_completed && !self.pending_close {
            self.record_lap(snapshot, lap_completed);
            self.update_stint(snapshot);
            self.last_lap_completed = lap_completed;
        }
    }
}
