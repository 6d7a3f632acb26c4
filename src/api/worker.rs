//! Queue consumer that turns detection output into backend calls.
//!
//! Runs on its own thread, blocking on the task queue with a bounded wait
//! so the stop flag is observed even when nothing is racing. Backend
//! failures are logged and dropped; ordering within the FIFO queue is the
//! only delivery guarantee the detectors rely on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::context::SharedRaceContext;
use crate::models::{Lap, PitStop, Session, Stint};

use super::{ApiTask, BackendClient};

const QUEUE_WAIT_S: u64 = 1;

pub struct ApiWorker {
    context: SharedRaceContext,
    client: Box<dyn BackendClient>,
    queue: Receiver<ApiTask>,
    stop: Arc<AtomicBool>,
}

impl ApiWorker {
    pub fn new(
        context: SharedRaceContext,
        client: Box<dyn BackendClient>,
        queue: Receiver<ApiTask>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            context,
            client,
            queue,
            stop,
        }
    }

    pub fn run(mut self) {
        while !self.stop.load(Ordering::Relaxed) {
            match self.queue.recv_timeout(Duration::from_secs(QUEUE_WAIT_S)) {
                Ok(ApiTask::Shutdown) => break,
                Ok(task) => self.process(task),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!("API worker stopped");
    }

    fn process(&mut self, task: ApiTask) {
        match task {
            ApiTask::Session(session) => self.process_session(session),
            ApiTask::StintCreate(stint) => self.process_stint_create(stint),
            ApiTask::StintUpdate(stint) => self.process_stint_update(stint),
            ApiTask::Lap(lap) => self.process_lap(lap),
            ApiTask::PitstopCreate(pitstop) => self.process_pitstop_create(pitstop),
            ApiTask::PitstopUpdate(pitstop) => self.process_pitstop_update(pitstop),
            ApiTask::Shutdown => {}
        }
    }

    fn process_session(&mut self, session: Session) {
        info!("Posting new session for track {}", session.track);
        match self.client.create_session(&session) {
            Some(id) => {
                let mut ctx = self.context.lock().expect("race context poisoned");
                ctx.session_id = Some(id);
            }
            None => warn!("Failed to post session"),
        }
    }

    fn process_stint_create(&mut self, mut stint: Stint) {
        let session_id = stint.session_id.or_else(|| {
            self.context
                .lock()
                .expect("race context poisoned")
                .session_id
        });
        let Some(session_id) = session_id else {
            warn!("Cannot create stint without a session id");
            return;
        };
        stint.session_id = Some(session_id);

        // stint numbers are sequential per session, continuing from whatever
        // the backend already has (driver swaps, process restarts)
        let number = self
            .client
            .latest_stint_number(session_id)
            .map(|n| n + 1)
            .unwrap_or(1);
        stint.number = Some(number);

        match self.client.create_stint(&stint) {
            Some(id) => {
                let mut ctx = self.context.lock().expect("race context poisoned");
                ctx.stint_id = Some(id);
                ctx.stint_number = Some(number);
                info!("Created stint {} for session {}", number, session_id);
            }
            None => warn!("Failed to create stint {} for session {}", number, session_id),
        }
    }

    fn process_stint_update(&mut self, mut stint: Stint) {
        let stint_id = stint.id.or_else(|| {
            self.context.lock().expect("race context poisoned").stint_id
        });
        let Some(stint_id) = stint_id else {
            warn!("Cannot update stint without an id");
            return;
        };
        stint.id = Some(stint_id);
        if !self.client.update_stint(stint_id, &stint) {
            warn!("Failed to update stint {}", stint_id);
        }
    }

    fn process_lap(&mut self, mut lap: Lap) {
        let stint_id = lap.stint_id.or_else(|| {
            self.context.lock().expect("race context poisoned").stint_id
        });
        let Some(stint_id) = stint_id else {
            warn!("Cannot post lap {} without a stint id", lap.number);
            return;
        };
        lap.stint_id = Some(stint_id);
        if !self.client.create_lap(&lap) {
            warn!("Failed to post lap {} for stint {}", lap.number, stint_id);
        }
    }

    fn process_pitstop_create(&mut self, mut pitstop: PitStop) {
        let stint_id = pitstop.stint_id.or_else(|| {
            self.context.lock().expect("race context poisoned").stint_id
        });
        let Some(stint_id) = stint_id else {
            warn!("Cannot create pitstop without a stint id");
            return;
        };
        pitstop.stint_id = Some(stint_id);

        match self.client.create_pitstop(&pitstop) {
            Some(id) => {
                let mut ctx = self.context.lock().expect("race context poisoned");
                ctx.pitstop_id = Some(id);
            }
            None => warn!("Failed to create pitstop for stint {}", stint_id),
        }
    }

    fn process_pitstop_update(&mut self, mut pitstop: PitStop) {
        let pitstop_id = pitstop.id.or_else(|| {
            self.context
                .lock()
                .expect("race context poisoned")
                .pitstop_id
        });
        let Some(pitstop_id) = pitstop_id else {
            warn!("Cannot update pitstop without an id");
            return;
        };
        pitstop.id = Some(pitstop_id);
        if !self.client.update_pitstop(pitstop_id, &pitstop) {
            warn!("Failed to update pitstop {}", pitstop_id);
        }
    }
}
