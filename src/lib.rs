// Library interface for boxwall
// This allows integration tests to access internal modules

pub mod api;
pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod fsm;
pub mod managers;
pub mod models;
pub mod telemetry;

// Re-export commonly used types
pub use api::{ApiTask, BackendClient, DryRunClient};
pub use context::{RaceContext, SharedRaceContext};
pub use engine::Engine;
pub use errors::BoxwallError;
pub use fsm::{DriverEvent, DriverFsm, DriverState, Transition};
pub use models::{Lap, PitStop, Session, Stint};
