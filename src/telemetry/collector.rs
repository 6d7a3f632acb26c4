//! The fixed-cadence polling loop that turns raw telemetry into driver
//! state transitions.
//!
//! Every edge detector here compares the current sample against the
//! previous tick, so a signal that is already high when the loop starts
//! never fires a spurious event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::fsm::{DriverEvent, DriverFsm, DriverState};
use crate::managers::Manager;
use crate::telemetry::source::TelemetrySource;
use crate::telemetry::{fields, FieldSet, TelemetrySnapshot};

/// `SessionState` value while the race itself is green.
const SESSION_STATE_RACING: i32 = 4;
/// Checkered-flag bit in `SessionFlags`.
const FLAG_CHECKERED: i32 = 0x1;

/// Fields the edge detectors themselves need, before any manager wiring.
const DETECTOR_FIELDS: &[&str] = &[
    fields::IS_ON_TRACK,
    fields::ON_PIT_ROAD,
    fields::PIT_SERVICE_ACTIVE,
    fields::TOW_TIME,
    fields::SESSION_STATE,
    fields::SESSION_FLAGS,
    fields::LAP,
    fields::LAP_COMPLETED,
    fields::CLASS_POSITION,
];

pub struct TelemetryLoop {
    source: Box<dyn TelemetrySource>,
    fsm: DriverFsm,
    managers: Vec<Box<dyn Manager>>,
    user_name: String,
    interval: Duration,
    stop: Arc<AtomicBool>,
    fields: FieldSet,
    tick_no: usize,

    session_started: bool,
    final_lap: Option<i32>,
    prev_pit_signal: bool,
    prev_service: bool,
    prev_driver: Option<String>,
}

impl TelemetryLoop {
    pub fn new(
        source: Box<dyn TelemetrySource>,
        user_name: &str,
        hz: u32,
        stop: Arc<AtomicBool>,
    ) -> Self {
        let hz = hz.max(1);
        Self {
            source,
            fsm: DriverFsm::new(),
            managers: Vec::new(),
            user_name: user_name.to_string(),
            interval: Duration::from_micros(1_000_000 / u64::from(hz)),
            stop,
            fields: DETECTOR_FIELDS.iter().copied().collect(),
            tick_no: 0,
            session_started: false,
            final_lap: None,
            prev_pit_signal: false,
            prev_service: false,
            prev_driver: None,
        }
    }

    /// Wire up a manager. Its required fields join the per-tick read set.
    pub fn attach(&mut self, manager: Box<dyn Manager>) {
        self.fields.extend(manager.required_fields());
        self.managers.push(manager);
    }

    /// Poll until the session finishes or the stop flag is raised.
    pub fn run(&mut self) {
        info!(
            "Telemetry loop polling every {} ms",
            self.interval.as_millis()
        );
        loop {
            if self.stop.load(Ordering::Relaxed) {
                info!("Telemetry loop stopping");
                break;
            }

            // the state machine, not the source, is the connection authority:
            // a source can read connected again before we have re-attached
            if self.fsm.state() == DriverState::Disconnected {
                if !self.source.connect() {
                    thread::sleep(self.interval);
                    continue;
                }
                let event = if self.fsm.saved_state().is_some() {
                    DriverEvent::Reconnect
                } else {
                    DriverEvent::Connect
                };
                self.dispatch(event, &TelemetrySnapshot::default());
            }

            self.source.update();
            if !self.source.is_connected() {
                warn!("Lost connection to the simulator");
                self.dispatch(DriverEvent::Disconnect, &TelemetrySnapshot::default());
                thread::sleep(self.interval);
                continue;
            }

            let snapshot = TelemetrySnapshot::read(self.source.as_ref(), &self.fields, self.tick_no);
            self.tick_no += 1;

            let finished = self.detect(&snapshot);
            let state = self.fsm.state();
            for manager in self.managers.iter_mut() {
                manager.on_tick(&snapshot, state);
            }
            if finished {
                info!("Session finished, telemetry loop exiting");
                break;
            }

            thread::sleep(self.interval);
        }
        self.source.disconnect();
    }

    /// Run the edge detectors against one sample. Returns true once the
    /// session-end condition has fired.
    fn detect(&mut self, snapshot: &TelemetrySnapshot) -> bool {
        if !self.session_started
            && snapshot.session_state == Some(SESSION_STATE_RACING)
            && snapshot.class_position.is_some_and(|p| p > 0)
        {
            self.session_started = true;
            self.dispatch(DriverEvent::SessionStart, snapshot);
        }

        // a tow reads as a pit-road visit: the car is headed for its box
        let pit_signal = snapshot.on_pit_road.unwrap_or(false)
            || snapshot.tow_time_s.unwrap_or(0.0) > 0.0;
        if pit_signal != self.prev_pit_signal {
            let event = if pit_signal {
                DriverEvent::EnterPitRoad
            } else {
                DriverEvent::ExitPitRoad
            };
            self.dispatch(event, snapshot);
            self.prev_pit_signal = pit_signal;
        }

        let service = snapshot.pit_service_active.unwrap_or(false);
        if service != self.prev_service {
            let event = if service {
                DriverEvent::EnterPitBox
            } else {
                DriverEvent::ExitPitBox
            };
            self.dispatch(event, snapshot);
            self.prev_service = service;
        }

        // the first named tick seeds the comparison, it is not a swap
        if let Some(name) = snapshot.driver_name.as_ref() {
            match self.prev_driver.as_deref() {
                None => self.prev_driver = Some(name.clone()),
                Some(prev) if prev != name => {
                    let event = if *name == self.user_name {
                        DriverEvent::DriverSwapIn
                    } else {
                        DriverEvent::DriverSwapOut
                    };
                    self.dispatch(event, snapshot);
                    self.prev_driver = Some(name.clone());
                }
                _ => {}
            }
        }

        // session end is two-phase: the checkered flag arms the detector
        // with the lap the flag flew on, crossing the line (or abandoning
        // the car) after that ends the session
        if self.final_lap.is_none()
            && snapshot
                .session_flags
                .is_some_and(|f| f & FLAG_CHECKERED != 0)
        {
            self.final_lap = snapshot.current_lap;
            info!("Checkered flag out on lap {:?}", self.final_lap);
        }
        if let Some(final_lap) = self.final_lap {
            let crossed = snapshot.lap_completed.is_some_and(|l| l >= final_lap);
            let abandoned = snapshot.is_on_track == Some(false)
                || snapshot.tow_time_s.unwrap_or(0.0) > 0.0;
            if crossed || abandoned {
                self.dispatch(DriverEvent::FinishSession, snapshot);
                return true;
            }
        }

        false
    }

    fn dispatch(&mut self, event: DriverEvent, snapshot: &TelemetrySnapshot) {
        match self.fsm.trigger(event) {
            Ok(transition) => {
                debug!(
                    "{} -> {} on {}",
                    transition.source, transition.destination, transition.event
                );
                for manager in self.managers.iter_mut() {
                    manager.handle_event(&transition, snapshot);
                }
            }
            Err(e) => warn!("Ignoring out-of-order telemetry event: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::source::{MockTelemetrySource, MockTick};
    use crate::telemetry::{RosterEntry, SessionMeta, TelemetryValue};
    use std::sync::Mutex;

    struct RecordingManager {
        events: Arc<Mutex<Vec<DriverEvent>>>,
    }

    impl Manager for RecordingManager {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn handle_event(&mut self, transition: &crate::fsm::Transition, _: &TelemetrySnapshot) {
            self.events.lock().unwrap().push(transition.event);
        }
    }

    fn run_script(ticks: Vec<MockTick>, user_name: &str) -> Vec<DriverEvent> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let source = Box::new(MockTelemetrySource::new(ticks));
        let stop = Arc::new(AtomicBool::new(false));
        let mut telemetry_loop = TelemetryLoop::new(source, user_name, 1000, stop);
        telemetry_loop.attach(Box::new(RecordingManager {
            events: Arc::clone(&events),
        }));
        telemetry_loop.run();
        let events = events.lock().unwrap();
        events.clone()
    }

    fn racing_tick() -> MockTick {
        MockTick::connected()
            .with(fields::SESSION_STATE, TelemetryValue::Int(4))
            .with(fields::CLASS_POSITION, TelemetryValue::Int(3))
            .with(fields::IS_ON_TRACK, TelemetryValue::Bool(true))
    }

    fn finish_tick(lap: i32) -> MockTick {
        MockTick::connected()
            .with(fields::SESSION_FLAGS, TelemetryValue::Int(FLAG_CHECKERED))
            .with(fields::LAP, TelemetryValue::Int(lap))
            .with(fields::LAP_COMPLETED, TelemetryValue::Int(lap))
            .with(fields::IS_ON_TRACK, TelemetryValue::Bool(true))
    }

    fn meta_named(user_name: &str) -> Arc<SessionMeta> {
        Arc::new(SessionMeta {
            track_name: "Okayama".to_string(),
            sub_session_id: Some(1),
            player_car_idx: Some(0),
            drivers: vec![RosterEntry {
                car_idx: 0,
                user_name: user_name.to_string(),
                car_name: "MX-5".to_string(),
                car_class_name: "MX-5 Cup".to_string(),
            }],
            sub_sessions: vec![],
        })
    }

    #[test]
    fn test_full_pit_cycle_event_order() {
        let ticks = vec![
            MockTick::connected(),
            racing_tick(),
            racing_tick().with(fields::ON_PIT_ROAD, TelemetryValue::Bool(true)),
            racing_tick()
                .with(fields::ON_PIT_ROAD, TelemetryValue::Bool(true))
                .with(fields::PIT_SERVICE_ACTIVE, TelemetryValue::Bool(true)),
            racing_tick().with(fields::ON_PIT_ROAD, TelemetryValue::Bool(true)),
            racing_tick(),
            finish_tick(5),
        ];
        assert_eq!(
            run_script(ticks, "Kam Ward"),
            vec![
                DriverEvent::Connect,
                DriverEvent::SessionStart,
                DriverEvent::EnterPitRoad,
                DriverEvent::EnterPitBox,
                DriverEvent::ExitPitBox,
                DriverEvent::ExitPitRoad,
                DriverEvent::FinishSession,
            ]
        );
    }

    #[test]
    fn test_outage_disconnects_and_reconnects() {
        let ticks = vec![
            racing_tick(),
            MockTick::disconnected(),
            racing_tick(),
            finish_tick(8),
        ];
        assert_eq!(
            run_script(ticks, "Kam Ward"),
            vec![
                DriverEvent::Connect,
                DriverEvent::SessionStart,
                DriverEvent::Disconnect,
                DriverEvent::Reconnect,
                DriverEvent::FinishSession,
            ]
        );
    }

    #[test]
    fn test_tow_counts_as_pit_road_entry() {
        let ticks = vec![
            racing_tick(),
            racing_tick().with(fields::TOW_TIME, TelemetryValue::Float(35.0)),
            MockTick::connected()
                .with(fields::TOW_TIME, TelemetryValue::Float(20.0))
                .with(fields::SESSION_FLAGS, TelemetryValue::Int(FLAG_CHECKERED))
                .with(fields::LAP, TelemetryValue::Int(4)),
        ];
        assert_eq!(
            run_script(ticks, "Kam Ward"),
            vec![
                DriverEvent::Connect,
                DriverEvent::SessionStart,
                DriverEvent::EnterPitRoad,
                DriverEvent::FinishSession,
            ]
        );
    }

    #[test]
    fn test_driver_swap_edges_from_roster_name() {
        let ticks = vec![
            MockTick::connected().with_meta(meta_named("Alexis Cruz")),
            MockTick::connected().with_meta(meta_named("Kam Ward")),
            MockTick::connected().with_meta(meta_named("Alexis Cruz")),
            finish_tick(3),
        ];
        assert_eq!(
            run_script(ticks, "Kam Ward"),
            vec![
                DriverEvent::Connect,
                DriverEvent::DriverSwapIn,
                DriverEvent::DriverSwapOut,
                DriverEvent::FinishSession,
            ]
        );
    }

    #[test]
    fn test_checkered_alone_does_not_finish() {
        // flag out but the line not yet crossed: the loop must keep polling
        let ticks = vec![
            racing_tick(),
            racing_tick()
                .with(fields::SESSION_FLAGS, TelemetryValue::Int(FLAG_CHECKERED))
                .with(fields::LAP, TelemetryValue::Int(6))
                .with(fields::LAP_COMPLETED, TelemetryValue::Int(5)),
            finish_tick(6),
        ];
        assert_eq!(
            run_script(ticks, "Kam Ward"),
            vec![
                DriverEvent::Connect,
                DriverEvent::SessionStart,
                DriverEvent::FinishSession,
            ]
        );
    }
}
