pub mod collector;
pub mod source;

use std::collections::HashSet;
use std::sync::Arc;

pub use collector::TelemetryLoop;
pub use source::{MockTelemetrySource, TelemetrySource};

/// iRacing variable names consumed by the loop and the managers. Managers
/// declare which of these they need; the union is read into the per-tick
/// snapshot and everything else is skipped.
pub mod fields {
    pub const IS_ON_TRACK: &str = "IsOnTrack";
    pub const ON_PIT_ROAD: &str = "OnPitRoad";
    pub const PIT_SERVICE_ACTIVE: &str = "PitstopActive";
    pub const TOW_TIME: &str = "PlayerCarTowTime";
    pub const SESSION_STATE: &str = "SessionState";
    pub const SESSION_FLAGS: &str = "SessionFlags";
    pub const SESSION_TIME: &str = "SessionTime";
    pub const LAP: &str = "Lap";
    pub const LAP_COMPLETED: &str = "LapCompleted";
    pub const LAP_DIST_PCT: &str = "LapDistPct";
    pub const LAP_LAST_LAP_TIME: &str = "LapLastLapTime";
    pub const CLASS_POSITION: &str = "PlayerCarClassPosition";
    pub const RACE_POSITION: &str = "PlayerCarPosition";
    pub const INCIDENT_COUNT: &str = "PlayerCarMyIncidentCount";
    pub const FUEL_LEVEL: &str = "FuelLevel";
    pub const FUEL_LEVEL_PCT: &str = "FuelLevelPct";
    pub const PIT_REPAIR_LEFT: &str = "PitRepairLeft";
    pub const PIT_OPT_REPAIR_LEFT: &str = "PitOptRepairLeft";
    pub const FAST_REPAIR_USED: &str = "FastRepairUsed";
    pub const LF_TIRE_CHANGE: &str = "dpLFTireChange";
    pub const RF_TIRE_CHANGE: &str = "dpRFTireChange";
    pub const LR_TIRE_CHANGE: &str = "dpLRTireChange";
    pub const RR_TIRE_CHANGE: &str = "dpRRTireChange";
    pub const FUEL_ADD_AMOUNT: &str = "dpFuelAddKg";
    pub const FUEL_FILL: &str = "dpFuelFill";
}

/// Set of variable names to read each tick, built once at wiring time.
pub type FieldSet = HashSet<&'static str>;

/// A single polled value from the telemetry source.
#[derive(Clone, Debug, PartialEq)]
pub enum TelemetryValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Double(f64),
    Text(String),
}

impl TelemetryValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TelemetryValue::Bool(v) => Some(*v),
            TelemetryValue::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            TelemetryValue::Int(v) => Some(*v),
            TelemetryValue::Bool(v) => Some(*v as i32),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            TelemetryValue::Float(v) => Some(*v),
            TelemetryValue::Double(v) => Some(*v as f32),
            TelemetryValue::Int(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TelemetryValue::Double(v) => Some(*v),
            TelemetryValue::Float(v) => Some(*v as f64),
            TelemetryValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

/// One entry of the driver roster, keyed by car index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RosterEntry {
    pub car_idx: u32,
    pub user_name: String,
    pub car_name: String,
    pub car_class_name: String,
}

/// One sub-session of the weekend (Practice, Qualify, Race, ...).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubSession {
    pub session_type: String,
    pub time_budget_s: f64,
}

/// Structured weekend/session metadata, the counterpart of the SDK's YAML
/// session-info block. Sources cache it internally and hand out an `Arc`
/// so that cloning it into every snapshot is cheap.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionMeta {
    pub track_name: String,
    pub sub_session_id: Option<i64>,
    pub player_car_idx: Option<u32>,
    pub drivers: Vec<RosterEntry>,
    pub sub_sessions: Vec<SubSession>,
}

impl SessionMeta {
    /// Roster entry for the local car, if the roster contains it.
    pub fn player_driver(&self) -> Option<&RosterEntry> {
        let idx = self.player_car_idx?;
        self.drivers.iter().find(|d| d.car_idx == idx)
    }

    /// Configured time budget of the Race sub-session, zero when the
    /// weekend has none.
    pub fn race_duration_s(&self) -> f64 {
        self.sub_sessions
            .iter()
            .find(|s| s.session_type == "Race")
            .map(|s| s.time_budget_s)
            .unwrap_or(0.0)
    }
}

/// The full telemetry sample for one tick. Every field the detector and
/// the managers consume, read once per poll; fields outside the wired
/// `FieldSet` stay `None`.
#[derive(Clone, Debug, Default)]
pub struct TelemetrySnapshot {
    pub tick_no: usize,

    pub is_on_track: Option<bool>,
    pub on_pit_road: Option<bool>,
    pub pit_service_active: Option<bool>,
    pub tow_time_s: Option<f32>,
    pub session_state: Option<i32>,
    pub session_flags: Option<i32>,
    pub session_time_s: Option<f64>,

    pub current_lap: Option<i32>,
    pub lap_completed: Option<i32>,
    pub lap_dist_pct: Option<f32>,
    pub last_lap_time_s: Option<f32>,

    pub class_position: Option<i32>,
    pub race_position: Option<i32>,
    pub incident_count: Option<i32>,

    pub fuel_level: Option<f32>,
    pub fuel_level_pct: Option<f32>,
    pub pit_repair_left_s: Option<f32>,
    pub pit_opt_repair_left_s: Option<f32>,
    pub fast_repairs_used: Option<i32>,
    pub lf_tire_change: Option<bool>,
    pub rf_tire_change: Option<bool>,
    pub lr_tire_change: Option<bool>,
    pub rr_tire_change: Option<bool>,
    pub fuel_add_amount: Option<f32>,
    pub fuel_fill: Option<bool>,

    /// Name of the driver currently in the local car, from the roster.
    pub driver_name: Option<String>,
    pub meta: Option<Arc<SessionMeta>>,
}

impl TelemetrySnapshot {
    /// Read the wired field set out of the source's current (frozen) sample.
    pub fn read(source: &dyn TelemetrySource, wanted: &FieldSet, tick_no: usize) -> Self {
        let bool_field = |name| {
            if wanted.contains(name) {
                source.get(name).and_then(|v| v.as_bool())
            } else {
                None
            }
        };
        let int_field = |name| {
            if wanted.contains(name) {
                source.get(name).and_then(|v| v.as_i32())
            } else {
                None
            }
        };
        let f32_field = |name| {
            if wanted.contains(name) {
                source.get(name).and_then(|v| v.as_f32())
            } else {
                None
            }
        };
        let f64_field = |name| {
            if wanted.contains(name) {
                source.get(name).and_then(|v| v.as_f64())
            } else {
                None
            }
        };

        let meta = source.session_meta();
        let driver_name = meta.as_ref().and_then(|m| {
            m.player_driver().map(|d| d.user_name.clone())
        });

        Self {
            tick_no,
            is_on_track: bool_field(fields::IS_ON_TRACK),
            on_pit_road: bool_field(fields::ON_PIT_ROAD),
            pit_service_active: bool_field(fields::PIT_SERVICE_ACTIVE),
            tow_time_s: f32_field(fields::TOW_TIME),
            session_state: int_field(fields::SESSION_STATE),
            session_flags: int_field(fields::SESSION_FLAGS),
            session_time_s: f64_field(fields::SESSION_TIME),
            current_lap: int_field(fields::LAP),
            lap_completed: int_field(fields::LAP_COMPLETED),
            lap_dist_pct: f32_field(fields::LAP_DIST_PCT),
            last_lap_time_s: f32_field(fields::LAP_LAST_LAP_TIME),
            class_position: int_field(fields::CLASS_POSITION),
            race_position: int_field(fields::RACE_POSITION),
            incident_count: int_field(fields::INCIDENT_COUNT),
            fuel_level: f32_field(fields::FUEL_LEVEL),
            fuel_level_pct: f32_field(fields::FUEL_LEVEL_PCT),
            pit_repair_left_s: f32_field(fields::PIT_REPAIR_LEFT),
            pit_opt_repair_left_s: f32_field(fields::PIT_OPT_REPAIR_LEFT),
            fast_repairs_used: int_field(fields::FAST_REPAIR_USED),
            lf_tire_change: bool_field(fields::LF_TIRE_CHANGE),
            rf_tire_change: bool_field(fields::RF_TIRE_CHANGE),
            lr_tire_change: bool_field(fields::LR_TIRE_CHANGE),
            rr_tire_change: bool_field(fields::RR_TIRE_CHANGE),
            fuel_add_amount: f32_field(fields::FUEL_ADD_AMOUNT),
            fuel_fill: bool_field(fields::FUEL_FILL),
            driver_name,
            meta,
        }
    }
}
