//! Event-driven communication between the daemon's services.

use anyhow::Result;
use tokio::sync::broadcast;

use crate::control_loop::ControllerStatus;

/// Classification of an edited configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChangeType {
    /// Only the curve or intervals changed; applied through `set_config`.
    HotReload,
    /// Sensor, actuator or bus selection changed; needs a daemon restart.
    ColdRestart {
        /// Names of the hardware-related sections that differ
        changed_sections: Vec<String>,
    },
}

/// Application events for inter-service communication.
#[derive(Debug, Clone)]
pub enum Event {
    ConfigChangeDetected(ConfigChangeType),
    /// A configuration package was installed into the store.
    ConfigInstalled {
        generation: u64,
        levels: usize,
        poll_interval_ms: u32,
    },
    /// The control loop finished a cycle with a successful reading.
    CycleCompleted(ControllerStatus),
    SensorReadFailed(String),
    /// Periodic status snapshot for external listeners.
    StatusBroadcast(ControllerStatus),
    SystemShutdown,
}

/// Publish-subscribe bus shared by all services.
///
/// # Example
///
/// ```no_run
/// use fan_thermald::event::{Event, EventBus};
///
/// let event_bus = EventBus::new();
/// let mut subscriber = event_bus.subscribe();
/// event_bus.publish(Event::SystemShutdown).unwrap();
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns an error if there are no active subscribers.
    pub fn publish(&self, event: Event) -> Result<()> {
        self.sender.send(event)?;
        Ok(())
    }

    /// Publishes an event, ignoring the case where nobody listens.
    pub fn notify(&self, event: Event) {
        if self.sender.receiver_count() > 0 {
            let _ = self.sender.send(event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
