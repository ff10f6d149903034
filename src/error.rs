//! Error taxonomy for the fan control core.
//!
//! None of these errors is fatal to the control loop: sensor and actuator
//! failures are transient and self-heal on the next cycle, configuration
//! errors are rejected synchronously at the configuration boundary.

use thiserror::Error;

/// Result type alias for core fan control operations.
pub type Result<T> = std::result::Result<T, FanError>;

#[derive(Error, Debug)]
pub enum FanError {
    /// The temperature source could not produce a reading.
    #[error("Failed to read temperature from {sensor}: {reason}")]
    SensorRead { sensor: String, reason: String },

    /// The hardware refused the requested duty cycle.
    #[error("Failed to apply PWM state to {device}: {reason}")]
    ActuatorApply { device: String, reason: String },

    /// A configuration package was rejected before touching any state.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl FanError {
    pub fn sensor(sensor: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::SensorRead {
            sensor: sensor.into(),
            reason: reason.to_string(),
        }
    }

    pub fn actuator(device: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ActuatorApply {
            device: device.into(),
            reason: reason.to_string(),
        }
    }
}
