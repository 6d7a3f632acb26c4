// Error types for boxwall

use crate::api::ApiTask;
use crate::fsm::{DriverEvent, DriverState};
use snafu::Snafu;
use std::{io, sync::mpsc::SendError};

#[derive(Debug, Snafu)]
pub enum BoxwallError {
    // Errors for the telemetry source
    #[snafu(display("Timeout waiting for iRacing session"))]
    IRacingConnectionTimeout,
    #[snafu(display("Telemetry source error: {description}"))]
    TelemetrySourceError { description: String },

    // Errors for the driver state machine
    #[snafu(display("Invalid transition {event} from state {state}"))]
    InvalidTransition {
        event: DriverEvent,
        state: DriverState,
    },

    // Errors while queueing outbound tasks
    #[snafu(display("Error submitting task to the outbound queue"))]
    TaskQueueError { source: Box<SendError<ApiTask>> },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },
}

impl From<SendError<ApiTask>> for BoxwallError {
    fn from(value: SendError<ApiTask>) -> Self {
        BoxwallError::TaskQueueError {
            source: Box::new(value),
        }
    }
}
