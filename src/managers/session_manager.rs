//! Session record creation.

use std::sync::mpsc::Sender;
use std::sync::Arc;

use log::{info, warn};
use time::OffsetDateTime;

use crate::api::ApiTask;
use crate::context::SharedRaceContext;
use crate::fsm::{DriverEvent, DriverState, Transition};
use crate::models::Session;
use crate::telemetry::{SessionMeta, TelemetrySnapshot};

use super::{enqueue, Manager};

pub struct SessionManager {
    context: SharedRaceContext,
    queue: Sender<ApiTask>,
    meta: Option<Arc<SessionMeta>>,
    session_sent: bool,
}

impl SessionManager {
    pub fn new(context: SharedRaceContext, queue: Sender<ApiTask>) -> Self {
        Self {
            context,
            queue,
            meta: None,
            session_sent: false,
        }
    }

    fn start_session(&mut self) {
        let Some(meta) = self.meta.as_ref() else {
            warn!("Session started before any metadata arrived, skipping record");
            return;
        };
        let Some(player) = meta.player_driver() else {
            warn!(
                "Player car {:?} not in driver roster, skipping record",
                meta.player_car_idx
            );
            return;
        };

        {
            let mut context = self.context.lock().expect("race context poisoned");
            context.session_id = meta.sub_session_id;
            context.car_id = meta.player_car_idx.map(i64::from);
        }

        let car_class = if player.car_class_name.is_empty() {
            player.car_name.clone()
        } else {
            player.car_class_name.clone()
        };
        let session = Session {
            id: None,
            track: meta.track_name.clone(),
            car: player.car_name.clone(),
            car_class,
            race_duration_s: meta.race_duration_s(),
            session_date: OffsetDateTime::now_utc().date(),
        };
        info!("Race session started at {} in a {}", session.track, session.car);
        enqueue(&self.queue, self.name(), ApiTask::Session(session));
        self.session_sent = true;
    }
}

impl Manager for SessionManager {
    fn name(&self) -> &'static str {
        "session"
    }

    fn handle_event(&mut self, transition: &Transition, _snapshot: &TelemetrySnapshot) {
        if transition.event == DriverEvent::SessionStart && !self.session_sent {
            self.start_session();
        }
    }

    fn on_tick(&mut self, snapshot: &TelemetrySnapshot, _state: DriverState) {
        if let Some(meta) = snapshot.meta.as_ref() {
            self.meta = Some(Arc::clone(meta));
        }
    }
}
