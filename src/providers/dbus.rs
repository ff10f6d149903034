//! D-Bus service provider for dependency injection.

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use zbus::Connection;

use crate::{
    app_context::AppState,
    config::BusKind,
    event::{Event, EventBus},
    interface::{DBUS_NAME, DBUS_PATH, DBusInterface, DBusInterfaceSignals, status_signal_args},
    providers::traits::ServiceProvider,
    task_manager::TaskManager,
};

/// D-Bus service provider for external control.
///
/// Exports [`DBusInterface`] so a trusted caller can read and replace the
/// fan curve, and forwards status broadcasts as `StatusChanged` signals.
///
/// # Priority and Criticality
///
/// - **Priority**: 8 (high)
/// - **Critical**: Yes (the only runtime reconfiguration path)
///
/// # Interface
///
/// - **Service Name**: `io.github.fan_thermald`
/// - **Object Path**: `/io/github/fan_thermald`
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use fan_thermald::providers::DBusServiceProvider;
/// use fan_thermald::event::EventBus;
/// use fan_thermald::app_context::AppState;
///
/// # async fn example(state: Arc<AppState>) -> anyhow::Result<()> {
/// let event_bus = EventBus::new();
/// // Fails if the configured bus is not reachable
/// let provider = DBusServiceProvider::new(state, event_bus).await?;
/// # Ok(())
/// # }
/// ```
pub struct DBusServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
    connection: Connection,
}

impl DBusServiceProvider {
    /// Connects to the bus selected in the configuration.
    pub async fn new(state: Arc<AppState>, event_bus: EventBus) -> Result<Self> {
        let bus = state.config().await.dbus_bus;
        let connection = match bus {
            BusKind::System => Connection::system().await?,
            BusKind::Session => Connection::session().await?,
        };
        Ok(Self {
            state,
            event_bus,
            connection,
        })
    }
}

#[async_trait]
impl ServiceProvider for DBusServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        let event_bus = self.event_bus.clone();
        let connection = self.connection.clone();

        task_manager
            .spawn_task(self.name().to_string(), |cancel_token| async move {
                run_dbus_service(state, event_bus, connection, cancel_token).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "DBusService"
    }

    fn priority(&self) -> i32 {
        8
    }

    fn is_critical(&self) -> bool {
        true
    }
}

async fn run_dbus_service(
    state: Arc<AppState>,
    event_bus: EventBus,
    connection: Connection,
    cancel_token: CancellationToken,
) -> Result<()> {
    let mut event_rx = event_bus.subscribe();
    let interface = DBusInterface::new(
        state.configuration.clone(),
        state.status.clone(),
        event_bus,
        env!("CARGO_PKG_VERSION").to_string(),
    );
    connection.object_server().at(DBUS_PATH, interface).await?;
    connection.request_name(DBUS_NAME).await?;
    info!("D-Bus interface exported as {DBUS_NAME} at {DBUS_PATH}");

    let iface_ref = connection
        .object_server()
        .interface::<_, DBusInterface>(DBUS_PATH)
        .await?;

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("D-Bus service cancelled");
                break;
            }
            event = event_rx.recv() => match event {
                Ok(Event::StatusBroadcast(status)) => {
                    let (temperature, speed, level) = status_signal_args(&status);
                    if let Err(e) = iface_ref
                        .signal_emitter()
                        .status_changed(temperature, speed, level)
                        .await
                    {
                        warn!("Failed to emit StatusChanged: {e}");
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => debug!("D-Bus service skipped {skipped} events"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    connection.release_name(DBUS_NAME).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Config, ConfigManager},
        test_utils::{RecordingActuator, ScriptedSensor},
    };

    async fn create_test_app_state() -> Arc<AppState> {
        let config = Config {
            dbus_bus: BusKind::Session,
            ..Config::default()
        };
        let config_manager = ConfigManager::new(config, std::path::PathBuf::from("/tmp/test.yml"));
        Arc::new(
            AppState::with_devices(
                config_manager,
                Arc::new(ScriptedSensor::new(&[40_000])),
                Arc::new(RecordingActuator::default()),
                EventBus::new(),
            )
            .await
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn dbus_service_provider_creation() {
        let state = create_test_app_state().await;

        // A session bus is usually absent in CI
        match DBusServiceProvider::new(state, EventBus::new()).await {
            Ok(provider) => {
                assert_eq!(provider.name(), "DBusService");
                assert_eq!(provider.priority(), 8);
                assert!(provider.is_critical());
            }
            Err(e) => assert!(!e.to_string().is_empty()),
        }
    }

    #[tokio::test]
    async fn dbus_service_responds_to_cancellation() {
        let state = create_test_app_state().await;
        let mut task_manager = TaskManager::new();

        let Ok(provider) = DBusServiceProvider::new(state, EventBus::new()).await else {
            return;
        };
        if provider.start(&mut task_manager).await.is_ok() {
            let _ = task_manager.shutdown_all().await;
            assert_eq!(task_manager.active_count(), 0);
        }
    }
}
