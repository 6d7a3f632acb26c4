//! Wiring: one telemetry thread feeding one API worker thread over an
//! unbounded FIFO queue, sharing a [`RaceContext`](crate::context::RaceContext).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{info, warn};

use crate::api::worker::ApiWorker;
use crate::api::{ApiTask, BackendClient};
use crate::context::RaceContext;
use crate::managers::lap_manager::LapManager;
use crate::managers::pitstop_manager::PitstopManager;
use crate::managers::session_manager::SessionManager;
use crate::managers::stint_manager::StintManager;
use crate::telemetry::collector::TelemetryLoop;
use crate::telemetry::source::TelemetrySource;

pub struct Engine {
    queue: Sender<ApiTask>,
    stop: Arc<AtomicBool>,
    loop_handle: Option<JoinHandle<()>>,
    worker_handle: Option<JoinHandle<()>>,
}

impl Engine {
    /// Wire up and start both threads. The telemetry thread exits on its own
    /// when the session finishes; the worker drains the queue until told to
    /// shut down.
    pub fn start(
        source: Box<dyn TelemetrySource>,
        client: Box<dyn BackendClient>,
        user_name: &str,
        hz: u32,
    ) -> Self {
        let context = RaceContext::shared(user_name);
        let (queue, tasks) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));

        let mut telemetry_loop =
            TelemetryLoop::new(source, user_name, hz, Arc::clone(&stop));
        // creation order is dispatch order: the session manager must fill
        // the context ids before the stint manager reads them
        telemetry_loop.attach(Box::new(SessionManager::new(
            Arc::clone(&context),
            queue.clone(),
        )));
        telemetry_loop.attach(Box::new(StintManager::new(
            Arc::clone(&context),
            queue.clone(),
        )));
        telemetry_loop.attach(Box::new(PitstopManager::new(queue.clone())));
        telemetry_loop.attach(Box::new(LapManager::new(queue.clone())));

        let worker = ApiWorker::new(context, client, tasks, Arc::clone(&stop));

        info!("Starting telemetry and API worker threads");
        let loop_handle = std::thread::spawn(move || telemetry_loop.run());
        let worker_handle = std::thread::spawn(move || worker.run());

        Self {
            queue,
            stop,
            loop_handle: Some(loop_handle),
            worker_handle: Some(worker_handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.loop_handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Flag both threads down and wait for them. The worker gets a shutdown
    /// sentinel so it wakes immediately instead of riding out its poll
    /// timeout.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if self.queue.send(ApiTask::Shutdown).is_err() {
            // worker already gone, nothing left to wake
        }
        if let Some(handle) = self.loop_handle.take()
            && handle.join().is_err()
        {
            warn!("Telemetry thread panicked");
        }
        if let Some(handle) = self.worker_handle.take()
            && handle.join().is_err()
        {
            warn!("API worker thread panicked");
        }
        info!("Engine stopped");
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }
}
