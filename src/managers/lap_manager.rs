//! Per-lap timing records.

use std::sync::mpsc::Sender;

use log::{debug, info};

use crate::api::ApiTask;
use crate::fsm::DriverState;
use crate::models::Lap;
use crate::telemetry::{fields, TelemetrySnapshot};

use super::{enqueue, resolve_lap_time, Manager};

pub struct LapManager {
    queue: Sender<ApiTask>,
    last_lap_completed: Option<i32>,
    lap_start_time: Option<f64>,
}

impl LapManager {
    pub fn new(queue: Sender<ApiTask>) -> Self {
        Self {
            queue,
            last_lap_completed: None,
            lap_start_time: None,
        }
    }

    fn record_lap(&mut self, lap_completed: i32, snapshot: &TelemetrySnapshot) {
        let Some(time_s) = resolve_lap_time(
            snapshot.last_lap_time_s,
            self.lap_start_time,
            snapshot.session_time_s,
        ) else {
            debug!("Lap {} completed with no usable time, skipping", lap_completed);
            return;
        };
        // stint_id is resolved by the worker at processing time
        let lap = Lap {
            stint_id: None,
            number: lap_completed,
            time_s,
        };
        info!("Lap {} completed in {:.3}s", lap.number, lap.time_s);
        enqueue(&self.queue, self.name(), ApiTask::Lap(lap));
    }
}

impl Manager for LapManager {
    fn name(&self) -> &'static str {
        "lap"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[
            fields::SESSION_TIME,
            fields::LAP,
            fields::LAP_COMPLETED,
            fields::LAP_LAST_LAP_TIME,
        ]
    }

    fn on_tick(&mut self, snapshot: &TelemetrySnapshot, _state: DriverState) {
        let Some(lap_completed) = snapshot.lap_completed else {
            return;
        };

        // first tick of an opening lap seeds the fallback timer
        if self.lap_start_time.is_none()
            && snapshot.current_lap == Some(1)
            && lap_completed == 0
        {
            debug!("Opening lap started at {:?}", snapshot.session_time_s);
            self.lap_start_time = snapshot.session_time_s;
        }

        match self.last_lap_completed {
            None => self.last_lap_completed = Some(lap_completed),
            Some(last) if lap_completed > last => {
                self.record_lap(lap_completed, snapshot);
                self.last_lap_completed = Some(lap_completed);
                self.lap_start_time = snapshot.session_time_s;
            }
            _ => {}
        }
    }
}
