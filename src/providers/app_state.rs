//! Application state provider for dependency injection.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    actuator::FanActuator, app_context::AppState, config::ConfigManager, event::EventBus,
    providers::traits::AsyncProvider, sensors::TemperatureSensor,
};

/// Devices supplied by the embedder instead of being discovered.
pub type Devices = (Arc<dyn TemperatureSensor>, Arc<dyn FanActuator>);

/// Provider for creating and initializing application state.
///
/// Opens the configured sensor and PWM channel unless devices were injected.
pub struct AppStateProvider {
    config_manager: ConfigManager,
    event_bus: EventBus,
    devices: Option<Devices>,
}

impl AppStateProvider {
    pub fn new(config_manager: ConfigManager, event_bus: EventBus) -> Self {
        Self {
            config_manager,
            event_bus,
            devices: None,
        }
    }

    pub fn with_devices(mut self, devices: Option<Devices>) -> Self {
        self.devices = devices;
        self
    }
}

#[async_trait]
impl AsyncProvider<Arc<AppState>> for AppStateProvider {
    async fn provide(&self) -> Result<Arc<AppState>> {
        let config_manager = self.config_manager.clone();
        let event_bus = self.event_bus.clone();

        let app_state = match &self.devices {
            Some((sensor, actuator)) => {
                AppState::with_devices(config_manager, sensor.clone(), actuator.clone(), event_bus)
                    .await?
            }
            None => AppState::new(config_manager, event_bus).await?,
        };
        Ok(Arc::new(app_state))
    }
}
