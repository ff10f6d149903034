//! Embeddable controller: one sensor, one fan, one running control loop.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    actuator::FanActuator,
    config_store::ConfigStore,
    configuration::ConfigurationInterface,
    control_loop::{ControlLoop, ControllerStatus, SharedStatus},
    error,
    fan_curve::{ConfigPackage, FanCurve},
    sensors::TemperatureSensor,
};

/// Handle to a running control loop.
///
/// Dropping the handle cancels the loop, which still parks the fan at 0%
/// before exiting. Use [`Controller::stop`] to wait for that to happen.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use fan_thermald::{
///     actuator::PwmFanActuator,
///     controller::Controller,
///     drivers::SysfsPwm,
///     fan_curve::{ConfigPackage, FanCurve, FanLevel},
///     temperature_sensors::ThermalZoneSensor,
/// };
///
/// # async fn run() -> anyhow::Result<()> {
/// let sensor = Arc::new(ThermalZoneSensor::discover("cpu-thermal")?);
/// let actuator = Arc::new(PwmFanActuator::new(SysfsPwm::new(0, 0)));
/// let curve = FanCurve::new(vec![FanLevel::new(60_000, 5_000, 100)])?;
///
/// let controller = Controller::start(sensor, actuator, ConfigPackage::new(curve, 1000))?;
/// controller.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct Controller {
    configuration: ConfigurationInterface,
    status: SharedStatus,
    cancel: CancellationToken,
    handle: Option<JoinHandle<error::Result<()>>>,
}

impl Controller {
    /// Validates `initial` and spawns the control loop on the current runtime.
    pub fn start(
        sensor: Arc<dyn TemperatureSensor>,
        actuator: Arc<dyn FanActuator>,
        initial: ConfigPackage,
    ) -> error::Result<Self> {
        initial.validate()?;

        let store = Arc::new(ConfigStore::new(initial));
        let status = SharedStatus::default();
        let cancel = CancellationToken::new();

        let control_loop = ControlLoop::new(sensor, actuator, store.clone(), status.clone());
        let handle = tokio::spawn(control_loop.run(cancel.clone()));

        Ok(Self {
            configuration: ConfigurationInterface::new(store),
            status,
            cancel,
            handle: Some(handle),
        })
    }

    pub async fn set_config(&self, package: ConfigPackage) -> error::Result<()> {
        self.configuration.set_config(package).await
    }

    pub async fn get_config(&self) -> FanCurve {
        self.configuration.get_config().await
    }

    pub async fn status(&self) -> ControllerStatus {
        self.status.read().await.clone()
    }

    pub fn configuration(&self) -> &ConfigurationInterface {
        &self.configuration
    }

    /// Stops the loop and waits until the fan has been commanded to 0%.
    pub async fn stop(mut self) -> Result<()> {
        self.cancel.cancel();
        match self.handle.take() {
            Some(handle) => Ok(handle.await.context("Control loop task panicked")??),
            None => Ok(()),
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
