//! Task management for async service lifecycle.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Grace period granted to each task after cancellation.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Manages async tasks with ordered, graceful shutdown.
///
/// Tasks are stopped one by one in the reverse of their start order, so the
/// first service started (the control loop) is the last to go and can park
/// the fan after everything feeding it has stopped.
pub struct TaskManager {
    tasks: Vec<TaskInfo>,
    pub global_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            global_token: CancellationToken::new(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Spawns and registers a task with the given name.
    ///
    /// The task receives a child of the global token and is expected to
    /// return once it is cancelled.
    pub async fn spawn_task<F, Fut>(&mut self, name: String, task_fn: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        if self.tasks.iter().any(|task| task.name == name) {
            return Err(anyhow!("Task '{name}' is already running"));
        }

        let task_token = self.global_token.child_token();
        let task_token_clone = task_token.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            info!("Starting task: {task_name}");
            task_fn(task_token_clone)
                .await
                .inspect(|_| info!("Task '{task_name}' completed successfully"))
                .inspect_err(|e| error!("Task '{task_name}' failed: {e}"))
        });

        self.tasks.push(TaskInfo {
            name: name.clone(),
            handle,
            cancel_token: task_token,
        });

        info!("Task '{name}' spawned");
        Ok(())
    }

    /// Shuts down all registered tasks, newest first.
    ///
    /// Each task is cancelled and awaited before the next one is touched.
    /// A task that outlives the shutdown timeout is aborted.
    /// Returns the first error encountered, if any.
    pub async fn shutdown_all(&mut self) -> Result<()> {
        info!("Stopping all {} tasks", self.tasks.len());

        let mut first_error = None;
        while let Some(mut task) = self.tasks.pop() {
            task.cancel_token.cancel();
            let outcome = match tokio::time::timeout(self.shutdown_timeout, &mut task.handle).await
            {
                Ok(Ok(Ok(()))) => Ok(()),
                Ok(Ok(Err(e))) => Err(e.context(format!("Task '{}' failed", task.name))),
                Ok(Err(e)) => Err(anyhow!("Task '{}' panicked: {e}", task.name)),
                Err(_) => {
                    task.handle.abort();
                    Err(anyhow!("Task '{}' shutdown timeout exceeded", task.name))
                }
            };

            if let Err(e) = outcome {
                warn!("{e:#}");
                first_error.get_or_insert(e);
            }
        }
        self.global_token.cancel();

        match first_error {
            Some(error) => Err(error).context("One or more tasks failed during shutdown"),
            None => {
                info!("All tasks stopped");
                Ok(())
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.tasks
            .iter()
            .any(|task| task.name == name && !task.handle.is_finished())
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

struct TaskInfo {
    name: String,
    handle: JoinHandle<Result<()>>,
    cancel_token: CancellationToken,
}
