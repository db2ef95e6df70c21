//! # Sensor errors

/// Errors which can occur while reading a sensor.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    #[error("Could not access the GPIO peripheral: {0}")]
    Gpio(String),

    #[error("No echo received within {0} ms")]
    EchoTimeout(u64),

    #[error("Expected {expected} channels but read {actual}")]
    ChannelCount { expected: usize, actual: usize },

    #[error("Simulated sensor fault")]
    Simulated,
}
