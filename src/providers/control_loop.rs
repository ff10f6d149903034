use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    app_context::AppState, control_loop::ControlLoop, event::EventBus,
    providers::traits::ServiceProvider, task_manager::TaskManager,
};

/// Fan control service provider.
///
/// Runs the [`ControlLoop`] against the shared store. When the service is
/// cancelled the loop finishes its cycle and parks the fan at 0%.
///
/// # Priority and Criticality
///
/// - **Priority**: 10 (highest)
/// - **Critical**: Yes (system cannot function without it)
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use fan_thermald::providers::ControlLoopServiceProvider;
/// use fan_thermald::event::EventBus;
/// use fan_thermald::app_context::AppState;
///
/// # async fn example(state: Arc<AppState>) -> anyhow::Result<()> {
/// let event_bus = EventBus::new();
/// let provider = ControlLoopServiceProvider::new(state, event_bus);
/// # Ok(())
/// # }
/// ```
pub struct ControlLoopServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
}

impl ControlLoopServiceProvider {
    pub fn new(state: Arc<AppState>, event_bus: EventBus) -> Self {
        Self { state, event_bus }
    }
}

#[async_trait]
impl ServiceProvider for ControlLoopServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let control_loop = ControlLoop::new(
            self.state.sensor.clone(),
            self.state.actuator.clone(),
            self.state.store.clone(),
            self.state.status.clone(),
        )
        .with_event_bus(self.event_bus.clone());

        task_manager
            .spawn_task(self.name().to_string(), |cancel_token| async move {
                control_loop.run(cancel_token).await?;
                Ok(())
            })
            .await
    }

    fn name(&self) -> &'static str {
        "ControlLoopService"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn is_critical(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Config, ConfigManager},
        control_loop::LoopPhase,
        fan_curve::FanLevel,
        test_utils::{RecordingActuator, ScriptedSensor},
    };
    use std::{path::PathBuf, time::Duration};

    async fn state_with(actuator: Arc<RecordingActuator>) -> Arc<AppState> {
        let config = Config {
            poll_interval_ms: 10,
            levels: vec![FanLevel::new(40_000, 2_000, 65)],
            ..Config::default()
        };
        let config_manager = ConfigManager::new(config, PathBuf::from("/tmp/test.yml"));
        Arc::new(
            AppState::with_devices(
                config_manager,
                Arc::new(ScriptedSensor::new(&[45_000])),
                actuator,
                EventBus::new(),
            )
            .await
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn provider_metadata() {
        let state = state_with(Arc::new(RecordingActuator::default())).await;
        let provider = ControlLoopServiceProvider::new(state, EventBus::new());

        assert_eq!(provider.name(), "ControlLoopService");
        assert_eq!(provider.priority(), 10);
        assert!(provider.is_critical());
    }

    #[tokio::test]
    async fn service_drives_fan_and_parks_on_shutdown() {
        let actuator = Arc::new(RecordingActuator::default());
        let state = state_with(actuator.clone()).await;
        let provider = ControlLoopServiceProvider::new(state.clone(), EventBus::new());

        let mut task_manager = TaskManager::new();
        provider.start(&mut task_manager).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while !actuator.speeds().contains(&65) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        task_manager.shutdown_all().await.unwrap();

        assert_eq!(actuator.speeds().last(), Some(&0));
        assert_eq!(state.status.read().await.phase, LoopPhase::Stopped);
    }
}
