//! Periodic sample, evaluate and actuate cycle.

use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::{
    actuator::FanActuator,
    config_store::ConfigStore,
    error::Result,
    event::{Event, EventBus},
    policy::{self, EngineState, Evaluation, Transition, Trend},
    sensors::TemperatureSensor,
};

/// Lifecycle of a control loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum LoopPhase {
    Running,
    Stopping,
    #[default]
    Stopped,
}

/// Externally visible state of the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ControllerStatus {
    pub phase: LoopPhase,
    /// Last successful reading in milli-degrees Celsius.
    pub last_temp: Option<i32>,
    pub trend: Trend,
    pub active_level: Option<usize>,
    /// Last speed handed to the actuator.
    pub speed: Option<u8>,
    pub cycles: u64,
    pub sensor_failures: u64,
}

pub type SharedStatus = Arc<RwLock<ControllerStatus>>;

/// Owner of the engine state and sole caller of the actuator.
///
/// Each cycle reads the sensor, takes a snapshot of the active package,
/// evaluates the policy and finally commands the actuator. A failed reading
/// skips the cycle entirely, leaving both engine state and fan speed as they
/// were.
pub struct ControlLoop {
    sensor: Arc<dyn TemperatureSensor>,
    actuator: Arc<dyn FanActuator>,
    store: Arc<ConfigStore>,
    state: EngineState,
    seen_generation: u64,
    status: SharedStatus,
    event_bus: Option<EventBus>,
}

impl ControlLoop {
    pub fn new(
        sensor: Arc<dyn TemperatureSensor>,
        actuator: Arc<dyn FanActuator>,
        store: Arc<ConfigStore>,
        status: SharedStatus,
    ) -> Self {
        Self {
            sensor,
            actuator,
            store,
            state: EngineState::default(),
            seen_generation: 0,
            status,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn engine_state(&self) -> EngineState {
        self.state
    }

    /// Runs a single cycle.
    ///
    /// Returns `None` when the sensor could not be read.
    pub async fn run_cycle(&mut self) -> Option<Evaluation> {
        let temp = match self.sensor.read_temperature().await {
            Ok(temp) => temp,
            Err(e) => {
                error!("Failed to read temperature: {e}");
                self.status.write().await.sensor_failures += 1;
                if let Some(event_bus) = &self.event_bus {
                    event_bus.notify(Event::SensorReadFailed(e.to_string()));
                }
                return None;
            }
        };

        let installed = self.store.snapshot().await;
        if installed.generation != self.seen_generation {
            debug!(
                "Configuration generation {} -> {}, resetting active level",
                self.seen_generation, installed.generation
            );
            self.state.reset_level();
            self.seen_generation = installed.generation;
        }

        self.state.observe(temp);
        let evaluation = policy::evaluate(&installed.package.curve, self.state, temp);
        self.state = evaluation.state;
        log_transition(&evaluation, temp);

        let status = {
            let mut status = self.status.write().await;
            status.last_temp = Some(temp);
            status.trend = evaluation.state.trend;
            status.active_level = evaluation.state.active_level;
            status.speed = Some(evaluation.target_speed.clamp(0, 100) as u8);
            status.cycles += 1;
            status.clone()
        };
        if let Some(event_bus) = &self.event_bus {
            event_bus.notify(Event::CycleCompleted(status));
        }

        if let Err(e) = self.actuator.set_speed(evaluation.target_speed).await {
            warn!("Fan speed {}% not applied: {e}", evaluation.target_speed);
        }

        Some(evaluation)
    }

    /// Drives cycles until `cancel` fires, then parks the fan at 0%.
    ///
    /// The wait between cycles is re-read from the store every time and cut
    /// short by a configuration change. An in-flight cycle always completes.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        self.set_phase(LoopPhase::Running).await;
        info!(
            "Control loop started for sensor {}",
            self.sensor.sensor_name()
        );

        while !cancel.is_cancelled() {
            self.run_cycle().await;

            let interval = self.store.package().await.poll_interval();
            tokio::select! {
                () = cancel.cancelled() => break,
                () = self.store.changed_since(self.seen_generation) => {
                    debug!("Woken early by configuration change");
                }
                () = tokio::time::sleep(interval) => {}
            }
        }

        self.set_phase(LoopPhase::Stopping).await;
        info!("Control loop stopping, turning fan off");
        let parked = self.actuator.set_speed(0).await;

        let mut status = self.status.write().await;
        match &parked {
            Ok(()) => status.speed = Some(0),
            Err(e) => error!("Failed to turn fan off on shutdown: {e}"),
        }
        status.phase = LoopPhase::Stopped;
        parked
    }

    async fn set_phase(&self, phase: LoopPhase) {
        self.status.write().await.phase = phase;
    }
}

fn log_transition(evaluation: &Evaluation, temp: i32) {
    match evaluation.transition {
        Transition::Upgrade { from, to } => info!(
            "Upgrade: level {from:?} -> {to} at {temp} m°C, speed {}%",
            evaluation.target_speed
        ),
        Transition::Downgrade { from, to } => info!(
            "Downgrade: level {from} -> {to:?} at {temp} m°C, speed {}%",
            evaluation.target_speed
        ),
        Transition::Debouncing { count } => debug!(
            "Downgrade pending ({count}/{}) at {temp} m°C",
            policy::STABILIZATION_CYCLES_REQUIRED
        ),
        Transition::Hold => {}
    }
}
