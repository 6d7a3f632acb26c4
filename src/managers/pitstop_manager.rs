//! Pit-stop lifecycle detection.
//!
//! One record per pit-road visit: created at road entry, service fields
//! folded in at box entry/exit, closed at road exit.

use std::sync::mpsc::Sender;

use log::{debug, info, warn};

use crate::api::ApiTask;
use crate::fsm::{DriverEvent, Transition};
use crate::models::{refuel_estimate, PitStop};
use crate::telemetry::{fields, TelemetrySnapshot};

use super::{enqueue, Manager};

pub struct PitstopManager {
    queue: Sender<ApiTask>,
    current: Option<PitStop>,
}

impl PitstopManager {
    pub fn new(queue: Sender<ApiTask>) -> Self {
        Self {
            queue,
            current: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn current(&self) -> Option<&PitStop> {
        self.current.as_ref()
    }

    fn road_enter(&mut self, snapshot: &TelemetrySnapshot) {
        // stint_id is resolved by the worker at processing time
        let pitstop = PitStop {
            road_enter_time_s: snapshot.session_time_s,
            ..PitStop::default()
        };
        info!("Pit road entry at {:?}", pitstop.road_enter_time_s);
        enqueue(
            &self.queue,
            self.name(),
            ApiTask::PitstopCreate(pitstop.clone()),
        );
        self.current = Some(pitstop);
    }

    fn service_start(&mut self, snapshot: &TelemetrySnapshot) {
        let Some(pitstop) = self.current.as_mut() else {
            warn!("Pit service started with no open pit stop, ignoring");
            return;
        };
        pitstop.service_start_time_s = snapshot.session_time_s;
        pitstop.required_repair_time_s = snapshot.pit_repair_left_s;
        pitstop.optional_repair_time_s = snapshot.pit_opt_repair_left_s;
        pitstop.fuel_start_amount = snapshot.fuel_level;
        pitstop.start_fast_repairs = snapshot.fast_repairs_used;
        pitstop.left_front = snapshot.lf_tire_change;
        pitstop.right_front = snapshot.rf_tire_change;
        pitstop.left_rear = snapshot.lr_tire_change;
        pitstop.right_rear = snapshot.rr_tire_change;
        pitstop.refuel_estimate = match (snapshot.fuel_level, snapshot.fuel_level_pct) {
            (Some(level), Some(pct)) => Some(refuel_estimate(
                snapshot.fuel_fill.unwrap_or(false),
                snapshot.fuel_add_amount.unwrap_or(0.0),
                level,
                pct,
            )),
            _ => None,
        };
    }

    fn service_end(&mut self, snapshot: &TelemetrySnapshot) {
        let Some(pitstop) = self.current.as_mut() else {
            warn!("Pit service ended with no open pit stop, ignoring");
            return;
        };
        pitstop.service_end_time_s = snapshot.session_time_s;
        pitstop.fuel_end_amount = snapshot.fuel_level;
        pitstop.end_fast_repairs = snapshot.fast_repairs_used;
        enqueue(&self.queue, "pitstop", ApiTask::PitstopUpdate(pitstop.clone()));
    }

    fn road_exit(&mut self, snapshot: &TelemetrySnapshot) {
        let Some(mut pitstop) = self.current.take() else {
            debug!("Pit road exit with no open pit stop, ignoring");
            return;
        };
        pitstop.road_exit_time_s = snapshot.session_time_s;
        info!(
            "Pit road exit, pit duration {:?}, box time {:?}",
            pitstop.pit_duration(),
            pitstop.box_time()
        );
        enqueue(&self.queue, self.name(), ApiTask::PitstopUpdate(pitstop));
    }
}

impl Manager for PitstopManager {
    fn name(&self) -> &'static str {
        "pitstop"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &[
            fields::SESSION_TIME,
            fields::PIT_REPAIR_LEFT,
            fields::PIT_OPT_REPAIR_LEFT,
            fields::FUEL_LEVEL,
            fields::FUEL_LEVEL_PCT,
            fields::FUEL_ADD_AMOUNT,
            fields::FUEL_FILL,
            fields::FAST_REPAIR_USED,
            fields::LF_TIRE_CHANGE,
            fields::RF_TIRE_CHANGE,
            fields::LR_TIRE_CHANGE,
            fields::RR_TIRE_CHANGE,
        ]
    }

    fn handle_event(&mut self, transition: &Transition, snapshot: &TelemetrySnapshot) {
        match transition.event {
            DriverEvent::EnterPitRoad => self.road_enter(snapshot),
            DriverEvent::EnterPitBox => self.service_start(snapshot),
            DriverEvent::ExitPitBox => self.service_end(snapshot),
            DriverEvent::ExitPitRoad => self.road_exit(snapshot),
            // final-stint policy: a session that ends mid pit visit gets no
            // closed pit-stop record
            DriverEvent::FinishSession => {
                if self.current.take().is_some() {
                    debug!("Session finished with an open pit stop, dropping it");
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::DriverState;
    use std::sync::mpsc;

    fn transition(event: DriverEvent) -> Transition {
        Transition {
            event,
            source: DriverState::OnTrack,
            destination: DriverState::OnTrack,
        }
    }

    fn manager() -> (PitstopManager, mpsc::Receiver<ApiTask>) {
        let (tx, rx) = mpsc::channel();
        (PitstopManager::new(tx), rx)
    }

    fn box_snapshot() -> TelemetrySnapshot {
        TelemetrySnapshot {
            session_time_s: Some(2010.0),
            pit_repair_left_s: Some(0.0),
            pit_opt_repair_left_s: Some(0.0),
            fuel_level: Some(20.0),
            fuel_level_pct: Some(0.4),
            fuel_add_amount: Some(40.0),
            fuel_fill: Some(true),
            fast_repairs_used: Some(2),
            lf_tire_change: Some(true),
            rf_tire_change: Some(true),
            lr_tire_change: Some(false),
            rr_tire_change: Some(false),
            ..TelemetrySnapshot::default()
        }
    }

    #[test]
    fn test_full_pit_cycle_record() {
        let (mut manager, rx) = manager();

        let enter = TelemetrySnapshot {
            session_time_s: Some(2000.0),
            ..TelemetrySnapshot::default()
        };
        manager.handle_event(&transition(DriverEvent::EnterPitRoad), &enter);
        match rx.try_recv().unwrap() {
            ApiTask::PitstopCreate(pitstop) => {
                assert_eq!(pitstop.stint_id, None);
                assert_eq!(pitstop.road_enter_time_s, Some(2000.0));
            }
            other => panic!("expected PitstopCreate, got {:?}", other),
        }

        manager.handle_event(&transition(DriverEvent::EnterPitBox), &box_snapshot());
        // service entry folds into the same record, no new task
        assert!(rx.try_recv().is_err());
        {
            let pitstop = manager.current().unwrap();
            assert_eq!(pitstop.service_start_time_s, Some(2010.0));
            assert!((pitstop.refuel_estimate.unwrap() - 30.0).abs() < 1e-6);
        }

        let exit_box = TelemetrySnapshot {
            session_time_s: Some(2038.0),
            fuel_level: Some(50.0),
            fast_repairs_used: Some(2),
            ..TelemetrySnapshot::default()
        };
        manager.handle_event(&transition(DriverEvent::ExitPitBox), &exit_box);
        match rx.try_recv().unwrap() {
            ApiTask::PitstopUpdate(pitstop) => {
                assert_eq!(pitstop.service_end_time_s, Some(2038.0));
                assert_eq!(pitstop.box_time(), Some(28.0));
            }
            other => panic!("expected PitstopUpdate, got {:?}", other),
        }

        let exit_road = TelemetrySnapshot {
            session_time_s: Some(2045.0),
            ..TelemetrySnapshot::default()
        };
        manager.handle_event(&transition(DriverEvent::ExitPitRoad), &exit_road);
        match rx.try_recv().unwrap() {
            ApiTask::PitstopUpdate(pitstop) => {
                assert_eq!(pitstop.pit_duration(), Some(45.0));
                assert!(pitstop.has_tire_change());
                assert!(!pitstop.has_repairs());
            }
            other => panic!("expected PitstopUpdate, got {:?}", other),
        }
        assert!(manager.current().is_none());
    }

    #[test]
    fn test_box_entry_without_road_entry_is_noop() {
        let (mut manager, rx) = manager();
        manager.handle_event(&transition(DriverEvent::EnterPitBox), &box_snapshot());
        assert!(rx.try_recv().is_err());
        assert!(manager.current().is_none());
    }

    #[test]
    fn test_finish_drops_open_record() {
        let (mut manager, rx) = manager();
        let enter = TelemetrySnapshot {
            session_time_s: Some(2000.0),
            ..TelemetrySnapshot::default()
        };
        manager.handle_event(&transition(DriverEvent::EnterPitRoad), &enter);
        rx.try_recv().unwrap();

        manager.handle_event(&transition(DriverEvent::FinishSession), &enter);
        assert!(manager.current().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_missing_fuel_fields_leave_estimate_unset() {
        let (mut manager, _rx) = manager();
        let enter = TelemetrySnapshot {
            session_time_s: Some(2000.0),
            ..TelemetrySnapshot::default()
        };
        manager.handle_event(&transition(DriverEvent::EnterPitRoad), &enter);
        manager.handle_event(
            &transition(DriverEvent::EnterPitBox),
            &TelemetrySnapshot {
                session_time_s: Some(2010.0),
                ..TelemetrySnapshot::default()
            },
        );
        assert_eq!(manager.current().unwrap().refuel_estimate, None);
    }
}
