use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use notify::{Event, EventHandler, RecursiveMode, Watcher, recommended_watcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState,
    event::{ConfigChangeType, Event as AppEvent, EventBus},
    providers::traits::ServiceProvider,
    task_manager::TaskManager,
};

/// Quiet period before an edited file is re-read.
const DEBOUNCE: Duration = Duration::from_millis(2000);

/// Configuration file monitoring service provider.
///
/// Watches the configuration file and, once edits settle, re-reads it.
/// Curve and poll interval edits are installed through the same validated
/// path as a D-Bus `SetConfig`. Edits to hardware sections are reported
/// and otherwise ignored until the daemon restarts.
///
/// # Priority and Criticality
///
/// - **Priority**: 6 (medium)
/// - **Critical**: No (optional service)
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use fan_thermald::providers::ConfigWatcherServiceProvider;
/// use fan_thermald::event::EventBus;
/// use fan_thermald::app_context::AppState;
///
/// # async fn example(state: Arc<AppState>) -> anyhow::Result<()> {
/// let event_bus = EventBus::new();
/// let provider = ConfigWatcherServiceProvider::new(state, event_bus);
/// # Ok(())
/// # }
/// ```
pub struct ConfigWatcherServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
}

impl ConfigWatcherServiceProvider {
    pub fn new(state: Arc<AppState>, event_bus: EventBus) -> Self {
        Self { state, event_bus }
    }
}

#[async_trait]
impl ServiceProvider for ConfigWatcherServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        let event_bus = self.event_bus.clone();

        task_manager
            .spawn_task(self.name().to_string(), |cancel_token| async move {
                run_config_watcher_service(state, event_bus, cancel_token).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "ConfigWatcherService"
    }

    fn priority(&self) -> i32 {
        6
    }

    fn is_critical(&self) -> bool {
        false
    }
}

/// Forwards `notify` callbacks into the async world.
#[derive(Debug)]
struct AsyncEventHandler {
    sender: mpsc::UnboundedSender<notify::Result<Event>>,
}

impl EventHandler for AsyncEventHandler {
    fn handle_event(&mut self, event: notify::Result<Event>) {
        if let Err(e) = self.sender.send(event) {
            error!("Failed to send filesystem event to async handler: {e}");
        }
    }
}

async fn run_config_watcher_service(
    state: Arc<AppState>,
    event_bus: EventBus,
    cancel_token: CancellationToken,
) -> Result<()> {
    let config_path = state.config_manager().path().to_path_buf();
    info!("Config watcher started for: {}", config_path.display());

    let (sender, mut event_rx) = mpsc::unbounded_channel();
    let mut watcher = recommended_watcher(AsyncEventHandler { sender })?;

    // Editors replace files by rename, so watch the directory
    let watch_path = config_path
        .parent()
        .map_or_else(|| config_path.clone(), |parent| parent.to_path_buf());
    watcher.watch(&watch_path, RecursiveMode::NonRecursive)?;
    debug!("Watching directory: {}", watch_path.display());

    let mut debounce_interval = tokio::time::interval(DEBOUNCE);
    debounce_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut has_pending_event = false;

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Config watcher service cancelled");
                break;
            }

            event_result = event_rx.recv() => match event_result {
                Some(Ok(event)) => {
                    let affects_config = event
                        .paths
                        .iter()
                        .any(|path| path.file_name() == config_path.file_name());
                    if affects_config && (event.kind.is_modify() || event.kind.is_create()) {
                        debug!("Config file touched ({:?}), reload pending", event.kind);
                        has_pending_event = true;
                    }
                }
                Some(Err(e)) => warn!("Filesystem watcher error: {e}"),
                None => {
                    warn!("Filesystem event channel closed, exiting");
                    break;
                }
            },

            _ = debounce_interval.tick(), if has_pending_event => {
                has_pending_event = false;
                if config_path.exists() {
                    apply_file_change(&state, &event_bus).await;
                } else {
                    warn!("Configuration file {} no longer exists", config_path.display());
                }
            }
        }
    }

    if let Err(e) = watcher.unwatch(&watch_path) {
        warn!("Failed to unwatch path during cleanup: {e}");
    }

    info!("Config watcher service stopped");
    Ok(())
}

async fn apply_file_change(state: &AppState, event_bus: &EventBus) {
    let change = match state.config_manager().reload().await {
        Ok(change) => change,
        Err(e) => {
            error!("Ignoring edited configuration: {e:#}");
            return;
        }
    };

    match &change {
        ConfigChangeType::HotReload => {
            let package = state.config().await.package();
            if let Err(e) = state.configuration.set_config(package).await {
                error!("Reloaded curve was not installed: {e}");
                return;
            }
        }
        ConfigChangeType::ColdRestart { changed_sections } => {
            warn!("Hardware configuration changed in {changed_sections:?}");
            warn!("These changes require a daemon restart to take effect");
        }
    }

    event_bus.notify(AppEvent::ConfigChangeDetected(change));
}
