use log::{error, info};
use zbus::{fdo, interface, object_server::SignalEmitter};

use crate::{
    configuration::ConfigurationInterface,
    control_loop::{ControllerStatus, SharedStatus},
    error::FanError,
    event::{Event, EventBus},
    fan_curve::{ConfigPackage, FanCurve, FanLevel},
};

pub const DBUS_NAME: &str = "io.github.fan_thermald";
pub const DBUS_PATH: &str = "/io/github/fan_thermald";

/// Reported for properties that have no value yet.
pub const UNKNOWN: i32 = -1;

pub struct DBusInterface {
    configuration: ConfigurationInterface,
    status: SharedStatus,
    event_bus: EventBus,
    version: String,
}

impl DBusInterface {
    pub fn new(
        configuration: ConfigurationInterface,
        status: SharedStatus,
        event_bus: EventBus,
        version: String,
    ) -> Self {
        Self {
            configuration,
            status,
            event_bus,
            version,
        }
    }

    async fn current_status(&self) -> ControllerStatus {
        self.status.read().await.clone()
    }
}

/// Signal arguments for a status snapshot: temperature, speed and level.
pub fn status_signal_args(status: &ControllerStatus) -> (i32, u32, i32) {
    (
        status.last_temp.unwrap_or(UNKNOWN),
        status.speed.map_or(0, u32::from),
        status.active_level.map_or(UNKNOWN, |level| level as i32),
    )
}

fn to_fdo(e: FanError) -> fdo::Error {
    match e {
        FanError::InvalidConfiguration(reason) => fdo::Error::InvalidArgs(reason),
        other => fdo::Error::Failed(other.to_string()),
    }
}

#[interface(name = "io.github.fan_thermald1")]
impl DBusInterface {
    #[zbus(signal)]
    async fn stopped(emitter: &SignalEmitter<'_>) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn status_changed(
        emitter: &SignalEmitter<'_>,
        temperature: i32,
        speed: u32,
        active_level: i32,
    ) -> zbus::Result<()>;

    async fn stop(&self, #[zbus(signal_emitter)] emitter: SignalEmitter<'_>) -> fdo::Result<()> {
        emitter.stopped().await?;
        self.event_bus
            .publish(Event::SystemShutdown)
            .map_err(|e| fdo::Error::Failed(e.to_string()))?;

        Ok(())
    }

    /// Installs a new curve (`a(iii)`: temp, hyst, speed) and poll interval.
    async fn set_config(&self, levels: Vec<FanLevel>, poll_interval_ms: u32) -> fdo::Result<()> {
        info!(
            "SetConfig over D-Bus: {} levels, {poll_interval_ms} ms",
            levels.len()
        );
        let package = ConfigPackage::new(FanCurve::from_levels_unchecked(levels), poll_interval_ms);
        self.configuration.set_config(package).await.map_err(|e| {
            error!("{e}");
            to_fdo(e)
        })
    }

    async fn get_config(&self) -> Vec<FanLevel> {
        self.configuration.get_config().await.levels().to_vec()
    }

    #[zbus(property)]
    async fn version(&self) -> String {
        self.version.clone()
    }

    /// Last reading in milli-degrees Celsius, -1 before the first one.
    #[zbus(property)]
    async fn temperature(&self) -> i32 {
        self.current_status().await.last_temp.unwrap_or(UNKNOWN)
    }

    /// Last commanded speed in percent, -1 before the first cycle.
    #[zbus(property)]
    async fn speed(&self) -> i32 {
        self.current_status()
            .await
            .speed
            .map_or(UNKNOWN, i32::from)
    }

    /// Index of the active level, -1 when none is active.
    #[zbus(property)]
    async fn active_level(&self) -> i32 {
        self.current_status()
            .await
            .active_level
            .map_or(UNKNOWN, |level| level as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config_store::ConfigStore, fan_curve::MAX_LEVELS};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn interface() -> DBusInterface {
        DBusInterface::new(
            ConfigurationInterface::new(Arc::new(ConfigStore::default())),
            SharedStatus::default(),
            EventBus::new(),
            "1.0.0".to_string(),
        )
    }

    #[tokio::test]
    async fn set_then_get_config() {
        let iface = interface();
        let levels = vec![FanLevel::new(40_000, 2_000, 35), FanLevel::new(70_000, 4_000, 90)];

        iface.set_config(levels.clone(), 1500).await.unwrap();

        assert_eq!(iface.get_config().await, levels);
    }

    #[tokio::test]
    async fn oversized_curve_maps_to_invalid_args() {
        let iface = interface();
        let levels = (0..=MAX_LEVELS as i32)
            .map(|i| FanLevel::new(i * 1_000, 0, 50))
            .collect();

        let err = iface.set_config(levels, 1000).await.unwrap_err();
        assert!(matches!(err, fdo::Error::InvalidArgs(_)));
    }

    #[tokio::test]
    async fn properties_report_unknown_before_first_cycle() {
        let iface = interface();
        assert_eq!(iface.temperature().await, UNKNOWN);
        assert_eq!(iface.speed().await, UNKNOWN);
        assert_eq!(iface.active_level().await, UNKNOWN);
        assert_eq!(iface.version().await, "1.0.0");
    }

    #[tokio::test]
    async fn properties_follow_status() {
        let iface = interface();
        {
            let mut status = iface.status.write().await;
            status.last_temp = Some(52_500);
            status.speed = Some(70);
            status.active_level = Some(1);
        }

        assert_eq!(iface.temperature().await, 52_500);
        assert_eq!(iface.speed().await, 70);
        assert_eq!(iface.active_level().await, 1);
    }

    #[test]
    fn signal_args_from_status() {
        let status = ControllerStatus {
            last_temp: Some(48_000),
            speed: Some(30),
            active_level: None,
            ..ControllerStatus::default()
        };
        assert_eq!(status_signal_args(&status), (48_000, 30, UNKNOWN));
    }
}
