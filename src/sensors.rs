use async_trait::async_trait;

use crate::error::Result;

/// Temperature source feeding the control loop.
///
/// Readings are in milli-degrees Celsius. A slow sensor simply blocks the
/// caller; no timeout is applied on top of the source's own behavior.
#[async_trait]
pub trait TemperatureSensor: Send + Sync {
    async fn read_temperature(&self) -> Result<i32>;

    fn sensor_name(&self) -> String {
        "unnamed".to_string()
    }
}
