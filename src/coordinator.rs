//! System coordinator for managing service lifecycle and dependency injection.

use std::{ops::ControlFlow, sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info, warn};
use tokio::{
    signal::unix::{SignalKind, signal},
    sync::broadcast::error::RecvError,
};

use crate::{
    app_context::AppState,
    config::ConfigManager,
    control_loop::LoopPhase,
    event::{ConfigChangeType, Event, EventBus},
    providers::{
        AppStateProvider, AsyncProvider, BroadcastServiceProvider, ConfigWatcherServiceProvider,
        ControlLoopServiceProvider, DBusServiceProvider, ServiceProvider, app_state::Devices,
    },
    task_manager::TaskManager,
};

/// Owns the services and drives them from startup to shutdown.
///
/// Services start in descending priority and are stopped in reverse, so the
/// control loop is always the last one running and leaves the fan at 0%.
pub struct SystemCoordinator {
    task_manager: TaskManager,
    event_bus: EventBus,
    shared_state: Option<Arc<AppState>>,
    service_providers: Vec<Box<dyn ServiceProvider>>,
    enable_dbus: bool,
}

impl Default for SystemCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCoordinator {
    pub fn new() -> Self {
        Self {
            task_manager: TaskManager::new(),
            event_bus: EventBus::new(),
            shared_state: None,
            service_providers: Vec::new(),
            enable_dbus: true,
        }
    }

    /// Bounds how long each service gets to stop before it is aborted.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.task_manager = TaskManager::new().with_shutdown_timeout(timeout);
        self
    }

    /// Skips exporting the control interface.
    pub fn without_dbus(mut self) -> Self {
        self.enable_dbus = false;
        self
    }

    /// Opens the hardware, parks the fan and registers all services.
    pub async fn initialize(
        &mut self,
        config_manager: ConfigManager,
        devices: Option<Devices>,
    ) -> Result<()> {
        info!("Initializing SystemCoordinator...");

        let state = AppStateProvider::new(config_manager, self.event_bus.clone())
            .with_devices(devices)
            .provide()
            .await
            .context("Failed to initialize application state")?;

        // Start from a known state until the first cycle decides otherwise
        if let Err(e) = state.actuator.set_speed(0).await {
            warn!("Failed to turn fan off at startup: {e}");
        }

        self.register_service_providers(state.clone())
            .await
            .context("Failed to register service providers")?;
        self.shared_state = Some(state);

        info!("SystemCoordinator initialization completed");
        Ok(())
    }

    async fn register_service_providers(&mut self, state: Arc<AppState>) -> Result<()> {
        let mut providers: Vec<Box<dyn ServiceProvider>> = vec![
            Box::new(ControlLoopServiceProvider::new(
                state.clone(),
                self.event_bus.clone(),
            )),
            Box::new(ConfigWatcherServiceProvider::new(
                state.clone(),
                self.event_bus.clone(),
            )),
        ];

        if state.config().await.enable_broadcast {
            providers.push(Box::new(BroadcastServiceProvider::new(
                state.clone(),
                self.event_bus.clone(),
            )));
        }

        if self.enable_dbus {
            match DBusServiceProvider::new(state.clone(), self.event_bus.clone()).await {
                Ok(provider) => providers.push(Box::new(provider)),
                Err(e) => warn!("Failed to connect to D-Bus: {e}, skipping D-Bus service"),
            }
        }

        providers.sort_by_key(|b| std::cmp::Reverse(b.priority()));
        self.service_providers = providers;

        info!(
            "Registered {} service providers in priority order",
            self.service_providers.len()
        );
        Ok(())
    }

    /// Starts all registered services in priority order.
    ///
    /// Critical services must start successfully, while non-critical services
    /// can fail without stopping the system.
    pub async fn start_all_services(&mut self) -> Result<()> {
        info!(
            "Starting {} services in priority order...",
            self.service_providers.len()
        );

        for provider in &self.service_providers {
            let is_critical = provider.is_critical();

            match provider.start(&mut self.task_manager).await {
                Ok(()) => info!(
                    "Service '{}' started successfully (priority: {}, critical: {is_critical})",
                    provider.name(),
                    provider.priority(),
                ),
                Err(e) if is_critical => {
                    return Err(e).with_context(|| {
                        format!("Critical service '{}' failed to start", provider.name())
                    });
                }
                Err(e) => warn!(
                    "Non-critical service '{}' failed to start: {e}",
                    provider.name()
                ),
            }
        }

        info!("All critical services started successfully");
        Ok(())
    }

    /// Waits for SIGINT, SIGTERM or a shutdown request, then stops everything.
    pub async fn run_main_loop(&mut self) -> Result<()> {
        let mut event_rx = self.event_bus.subscribe();
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        info!("Starting main event loop");

        loop {
            let flow = tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for shutdown signal")?;
                    info!("Received Ctrl+C, initiating graceful shutdown...");
                    ControlFlow::Break(())
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown...");
                    ControlFlow::Break(())
                }
                event = event_rx.recv() => self.handle_event(event)?,
            };

            if flow.is_break() {
                break;
            }
        }

        self.shutdown().await;
        info!("Main event loop terminated");
        Ok(())
    }

    fn handle_event(&self, event_result: Result<Event, RecvError>) -> Result<ControlFlow<()>> {
        match event_result {
            Ok(Event::SystemShutdown) => {
                info!("Shutdown requested");
                return Ok(ControlFlow::Break(()));
            }
            Ok(Event::ConfigChangeDetected(ConfigChangeType::ColdRestart { changed_sections })) => {
                warn!("Restart the daemon to apply changes to {changed_sections:?}");
                info!("  sudo systemctl restart fan_thermald");
            }
            Ok(Event::ConfigInstalled {
                generation,
                levels,
                poll_interval_ms,
            }) => info!(
                "Configuration generation {generation} active: {levels} levels, {poll_interval_ms} ms"
            ),
            Ok(Event::SensorReadFailed(reason)) => debug!("Sensor read failed: {reason}"),
            Ok(_) => {}
            Err(RecvError::Closed) => bail!("Event bus channel closed unexpectedly"),
            Err(RecvError::Lagged(n)) => warn!("Event bus lagged by {n} messages"),
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Stops every service, newest first.
    ///
    /// If the control loop had to be aborted it never parked the fan, so
    /// that happens here instead.
    pub async fn shutdown(&mut self) {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.task_manager.shutdown_all().await {
            log::error!("Error during task shutdown: {e:#}");
        }

        if let Some(state) = &self.shared_state {
            if state.status.read().await.phase != LoopPhase::Stopped {
                warn!("Control loop did not stop in time, turning fan off");
                if let Err(e) = state.actuator.set_speed(0).await {
                    log::error!("Failed to turn fan off: {e}");
                }
            }
        }

        info!("Shutdown complete");
    }

    pub const fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn state(&self) -> Result<&Arc<AppState>> {
        self.shared_state
            .as_ref()
            .ok_or_else(|| anyhow!("System not properly initialized"))
    }

    pub fn running_services(&self) -> Vec<&'static str> {
        self.service_providers.iter().map(|p| p.name()).collect()
    }
}
