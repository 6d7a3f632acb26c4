//! Domain records emitted to the backend: Session, Stint, PitStop, Lap.
//!
//! End-of-entity fields stay `None` until the entity is closed, and the
//! derived values (duration, deltas, repair/tire flags) are computed from
//! whatever has been filled in so far rather than stored.

use serde::{Deserialize, Serialize};

/// Session times wrap at midnight on long endurance races.
const SECONDS_PER_DAY: f64 = 86_400.0;

/// One race weekend session. Created once on the first green flag;
/// immutable afterwards except for the backend-assigned id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Option<i64>,
    pub track: String,
    pub car: String,
    pub car_class: String,
    pub race_duration_s: f64,
    pub session_date: time::Date,
}

/// One continuous on-track period between pit-box visits (or session
/// start/finish) for the local driver.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Stint {
    pub id: Option<i64>,
    pub session_id: Option<i64>,
    /// Sequential per session, assigned by the backend worker.
    pub number: Option<i32>,
    pub driver_name: String,
    pub start_time_s: f64,
    pub start_position: Option<i32>,
    pub start_incidents: Option<i32>,
    pub start_fuel: Option<f32>,
    pub end_time_s: Option<f64>,
    pub end_position: Option<i32>,
    pub end_incidents: Option<i32>,
    pub end_fuel: Option<f32>,
    pub is_complete: bool,
    pub laps: Vec<Lap>,
}

impl Stint {
    /// Wall-clock length of the stint, undefined until it closes.
    pub fn duration(&self) -> Option<f64> {
        let mut end = self.end_time_s?;
        if end < self.start_time_s {
            end += SECONDS_PER_DAY;
        }
        Some(end - self.start_time_s)
    }

    pub fn incidents_delta(&self) -> Option<i32> {
        Some(self.end_incidents? - self.start_incidents?)
    }

    pub fn fuel_used(&self) -> Option<f32> {
        Some(self.start_fuel? - self.end_fuel?)
    }

    pub fn average_lap(&self) -> Option<f64> {
        if self.laps.is_empty() {
            return None;
        }
        let total: f64 = self.laps.iter().map(|l| l.time_s).sum();
        Some(total / self.laps.len() as f64)
    }

    pub fn fastest_lap(&self) -> Option<f64> {
        self.laps
            .iter()
            .map(|l| l.time_s)
            .min_by(|a, b| a.total_cmp(b))
    }

    pub fn out_lap(&self) -> Option<f64> {
        self.laps.first().map(|l| l.time_s)
    }

    pub fn in_lap(&self) -> Option<f64> {
        self.laps.last().map(|l| l.time_s)
    }
}

/// One completed lap; never mutated after creation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Lap {
    pub stint_id: Option<i64>,
    pub number: i32,
    pub time_s: f64,
}

/// One pit-road visit nested under a stint. Road fields are stamped at
/// pit-road entry/exit, service fields at pit-box entry/exit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PitStop {
    pub id: Option<i64>,
    pub stint_id: Option<i64>,
    pub road_enter_time_s: Option<f64>,
    pub road_exit_time_s: Option<f64>,
    pub service_start_time_s: Option<f64>,
    pub service_end_time_s: Option<f64>,
    pub fuel_start_amount: Option<f32>,
    pub fuel_end_amount: Option<f32>,
    /// Fuel the crew was asked to add, clamped to tank capacity.
    pub refuel_estimate: Option<f32>,
    pub required_repair_time_s: Option<f32>,
    pub optional_repair_time_s: Option<f32>,
    pub start_fast_repairs: Option<i32>,
    pub end_fast_repairs: Option<i32>,
    pub left_front: Option<bool>,
    pub right_front: Option<bool>,
    pub left_rear: Option<bool>,
    pub right_rear: Option<bool>,
}

impl PitStop {
    /// True when time-based repairs were scheduled or a fast repair was
    /// consumed during the stop.
    pub fn has_repairs(&self) -> bool {
        if let (Some(start), Some(end)) = (self.start_fast_repairs, self.end_fast_repairs)
            && end > start
        {
            return true;
        }
        self.required_repair_time_s.unwrap_or(0.0) + self.optional_repair_time_s.unwrap_or(0.0)
            > 0.0
    }

    pub fn has_tire_change(&self) -> bool {
        [
            self.left_front,
            self.right_front,
            self.left_rear,
            self.right_rear,
        ]
        .iter()
        .any(|t| *t == Some(true))
    }

    /// Total time spent on pit road, undefined until road exit.
    pub fn pit_duration(&self) -> Option<f64> {
        Some(self.road_exit_time_s? - self.road_enter_time_s?)
    }

    /// Stationary service time, undefined until the box is cleared.
    pub fn box_time(&self) -> Option<f64> {
        Some(self.service_end_time_s? - self.service_start_time_s?)
    }
}

/// Bound the crew's requested fuel add to what the tank can physically
/// take. The raw dpFuelAddKg value can exceed tank capacity, so capacity is
/// estimated from the current level and fill fraction.
pub fn refuel_estimate(
    fuel_fill: bool,
    requested_add: f32,
    fuel_level: f32,
    fuel_fraction: f32,
) -> f32 {
    if !fuel_fill || fuel_fraction <= 0.0 {
        return 0.0;
    }
    let capacity = fuel_level / fuel_fraction;
    requested_add.min(capacity - fuel_level).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stint_duration_undefined_until_closed() {
        let stint = Stint {
            start_time_s: 100.0,
            ..Stint::default()
        };
        assert_eq!(stint.duration(), None);
    }

    #[test]
    fn test_stint_duration_and_deltas() {
        let stint = Stint {
            start_time_s: 100.0,
            end_time_s: Some(2500.0),
            start_incidents: Some(2),
            end_incidents: Some(6),
            start_fuel: Some(60.0),
            end_fuel: Some(12.5),
            ..Stint::default()
        };
        assert_eq!(stint.duration(), Some(2400.0));
        assert_eq!(stint.incidents_delta(), Some(4));
        assert_eq!(stint.fuel_used(), Some(47.5));
    }

    #[test]
    fn test_stint_duration_wraps_midnight() {
        let stint = Stint {
            start_time_s: 86_000.0,
            end_time_s: Some(1000.0),
            ..Stint::default()
        };
        assert_eq!(stint.duration(), Some(1400.0));
    }

    #[test]
    fn test_lap_aggregates_empty_stint() {
        let stint = Stint::default();
        assert_eq!(stint.average_lap(), None);
        assert_eq!(stint.fastest_lap(), None);
        assert_eq!(stint.out_lap(), None);
        assert_eq!(stint.in_lap(), None);
    }

    #[test]
    fn test_lap_aggregates() {
        let laps = [92.0, 90.5, 91.2]
            .iter()
            .enumerate()
            .map(|(i, t)| Lap {
                stint_id: None,
                number: i as i32 + 1,
                time_s: *t,
            })
            .collect();
        let stint = Stint {
            laps,
            ..Stint::default()
        };
        assert_eq!(stint.fastest_lap(), Some(90.5));
        assert_eq!(stint.out_lap(), Some(92.0));
        assert_eq!(stint.in_lap(), Some(91.2));
        let avg = stint.average_lap().unwrap();
        assert!((avg - 91.2333333).abs() < 1e-6);
    }

    #[test]
    fn test_has_repairs_from_fast_repair_consumption() {
        let pitstop = PitStop {
            required_repair_time_s: Some(0.0),
            optional_repair_time_s: Some(0.0),
            start_fast_repairs: Some(2),
            end_fast_repairs: Some(3),
            ..PitStop::default()
        };
        assert!(pitstop.has_repairs());
    }

    #[test]
    fn test_has_repairs_false_when_nothing_changed() {
        let pitstop = PitStop {
            required_repair_time_s: Some(0.0),
            optional_repair_time_s: Some(0.0),
            start_fast_repairs: Some(2),
            end_fast_repairs: Some(2),
            ..PitStop::default()
        };
        assert!(!pitstop.has_repairs());
    }

    #[test]
    fn test_has_repairs_from_repair_time() {
        let pitstop = PitStop {
            required_repair_time_s: Some(12.5),
            optional_repair_time_s: Some(0.0),
            ..PitStop::default()
        };
        assert!(pitstop.has_repairs());
    }

    #[test]
    fn test_has_tire_change() {
        let mut pitstop = PitStop::default();
        assert!(!pitstop.has_tire_change());
        pitstop.right_rear = Some(true);
        assert!(pitstop.has_tire_change());
    }

    #[test]
    fn test_pit_and_box_durations() {
        let pitstop = PitStop {
            road_enter_time_s: Some(1000.0),
            road_exit_time_s: Some(1045.0),
            service_start_time_s: Some(1010.0),
            service_end_time_s: Some(1038.0),
            ..PitStop::default()
        };
        assert_eq!(pitstop.pit_duration(), Some(45.0));
        assert_eq!(pitstop.box_time(), Some(28.0));

        let open = PitStop {
            road_enter_time_s: Some(1000.0),
            ..PitStop::default()
        };
        assert_eq!(open.pit_duration(), None);
        assert_eq!(open.box_time(), None);
    }

    #[test]
    fn test_refuel_estimate_bounded_by_capacity() {
        // 20 litres left of a 50 litre tank: only 30 more fit no matter the ask
        let estimate = refuel_estimate(true, 40.0, 20.0, 0.4);
        assert!((estimate - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_refuel_estimate_request_below_capacity() {
        let estimate = refuel_estimate(true, 10.0, 20.0, 0.4);
        assert!((estimate - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_refuel_estimate_zero_without_fill_flag() {
        assert_eq!(refuel_estimate(false, 40.0, 20.0, 0.4), 0.0);
    }

    #[test]
    fn test_refuel_estimate_zero_fraction_guard() {
        assert_eq!(refuel_estimate(true, 40.0, 0.0, 0.0), 0.0);
    }
}
