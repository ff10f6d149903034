use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::{StreamExt, wrappers::IntervalStream};
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState,
    control_loop::ControllerStatus,
    event::{Event, EventBus},
    providers::traits::ServiceProvider,
    task_manager::TaskManager,
};

/// Status broadcast service provider.
///
/// Publishes a [`Event::StatusBroadcast`] every `broadcast_interval` seconds
/// whenever the temperature, speed or active level moved since the last one.
/// The D-Bus service turns these into `StatusChanged` signals.
///
/// # Priority and Criticality
///
/// - **Priority**: 3 (low)
/// - **Critical**: No (optional service)
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use fan_thermald::providers::BroadcastServiceProvider;
/// use fan_thermald::event::EventBus;
/// use fan_thermald::app_context::AppState;
///
/// # async fn example(state: Arc<AppState>) -> anyhow::Result<()> {
/// let event_bus = EventBus::new();
/// let provider = BroadcastServiceProvider::new(state, event_bus);
/// # Ok(())
/// # }
/// ```
pub struct BroadcastServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
}

impl BroadcastServiceProvider {
    pub fn new(state: Arc<AppState>, event_bus: EventBus) -> Self {
        Self { state, event_bus }
    }
}

#[async_trait]
impl ServiceProvider for BroadcastServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        let event_bus = self.event_bus.clone();

        task_manager
            .spawn_task(self.name().to_string(), |cancel_token| async move {
                run_broadcast_service(state, event_bus, cancel_token).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "BroadcastService"
    }

    fn priority(&self) -> i32 {
        3
    }

    fn is_critical(&self) -> bool {
        false
    }
}

async fn run_broadcast_service(
    state: Arc<AppState>,
    event_bus: EventBus,
    cancel_token: CancellationToken,
) -> Result<()> {
    let seconds = state.config().await.broadcast_interval.max(1);
    let period = Duration::from_secs(u64::from(seconds));
    let mut ticks = IntervalStream::new(tokio::time::interval(period));
    let mut last_sent: Option<ControllerStatus> = None;

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Broadcast service cancelled");
                break;
            }
            Some(_instant) = ticks.next() => {
                let status = state.status.read().await.clone();
                if last_sent.as_ref().is_some_and(|sent| !differs(sent, &status)) {
                    continue;
                }
                debug!("Broadcasting status: {status:?}");
                event_bus.notify(Event::StatusBroadcast(status.clone()));
                last_sent = Some(status);
            }
        }
    }
    Ok(())
}

fn differs(previous: &ControllerStatus, current: &ControllerStatus) -> bool {
    previous.last_temp != current.last_temp
        || previous.speed != current.speed
        || previous.active_level != current.active_level
}
