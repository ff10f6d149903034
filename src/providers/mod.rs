//! Dependency injection providers for service management.
//!
//! This module contains all providers for creating and managing system components
//! using the Dependency Injection pattern for loose coupling and testability.

pub mod app_state;
pub mod broadcast;
pub mod config_watcher;
pub mod control_loop;
pub mod dbus;
pub mod traits;

// Re-export core types for convenience
pub use app_state::AppStateProvider;
pub use broadcast::BroadcastServiceProvider;
pub use config_watcher::ConfigWatcherServiceProvider;
pub use control_loop::ControlLoopServiceProvider;
pub use dbus::DBusServiceProvider;
pub use traits::{AsyncProvider, ServiceProvider};
