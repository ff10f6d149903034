//! Application state and hardware discovery.

use std::sync::Arc;

use anyhow::Context;
use log::info;

use crate::{
    actuator::{FanActuator, PwmFanActuator},
    config::{ActuatorCfg, Config, ConfigManager, SensorCfg},
    config_store::ConfigStore,
    configuration::ConfigurationInterface,
    control_loop::SharedStatus,
    drivers::SysfsPwm,
    event::EventBus,
    sensors::TemperatureSensor,
    temperature_sensors::ThermalZoneSensor,
};

/// Shared application state containing all runtime data.
///
/// The store and status are the only pieces the services mutate. Sensor and
/// actuator are opened once at startup and never swapped.
pub struct AppState {
    /// Configuration manager for the on-disk file
    pub config_manager: Arc<ConfigManager>,
    /// Active curve and poll interval
    pub store: Arc<ConfigStore>,
    /// Validated write path into `store`
    pub configuration: ConfigurationInterface,
    pub sensor: Arc<dyn TemperatureSensor>,
    pub actuator: Arc<dyn FanActuator>,
    /// Status published by the control loop
    pub status: SharedStatus,
}

impl AppState {
    /// Opens the hardware named in the configuration.
    pub async fn new(config_manager: ConfigManager, event_bus: EventBus) -> anyhow::Result<Self> {
        let config = config_manager.clone_config().await;
        let sensor = open_sensor(&config)?;
        let actuator = open_actuator(&config).await?;
        Self::with_devices(config_manager, sensor, actuator, event_bus).await
    }

    /// Builds the state around already opened devices.
    pub async fn with_devices(
        config_manager: ConfigManager,
        sensor: Arc<dyn TemperatureSensor>,
        actuator: Arc<dyn FanActuator>,
        event_bus: EventBus,
    ) -> anyhow::Result<Self> {
        let package = config_manager.get().await.package();
        package
            .validate()
            .context("Initial fan curve is invalid")?;

        let store = Arc::new(ConfigStore::new(package));
        Ok(Self {
            configuration: ConfigurationInterface::new(store.clone()).with_event_bus(event_bus),
            store,
            sensor,
            actuator,
            status: SharedStatus::default(),
            config_manager: Arc::new(config_manager),
        })
    }

    pub async fn config(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config_manager.get().await
    }

    pub fn config_manager(&self) -> &Arc<ConfigManager> {
        &self.config_manager
    }
}

fn open_sensor(config: &Config) -> anyhow::Result<Arc<dyn TemperatureSensor>> {
    match &config.sensor {
        SensorCfg::ThermalZone { zone } => {
            let sensor = ThermalZoneSensor::discover(zone)
                .with_context(|| format!("Failed to open thermal zone '{zone}'"))?;
            info!("Using thermal zone sensor {}", sensor.sensor_name());
            Ok(Arc::new(sensor))
        }
    }
}

async fn open_actuator(config: &Config) -> anyhow::Result<Arc<dyn FanActuator>> {
    match &config.actuator {
        ActuatorCfg::SysfsPwm {
            chip,
            channel,
            period_ns,
        } => {
            let pwm = SysfsPwm::new(*chip, *channel);
            pwm.open(*period_ns)
                .await
                .with_context(|| format!("Failed to open pwmchip{chip}/pwm{channel}"))?;
            info!("Using PWM fan on pwmchip{chip}/pwm{channel}");
            Ok(Arc::new(PwmFanActuator::new(pwm)))
        }
    }
}
