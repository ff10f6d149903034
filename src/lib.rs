//! # fan_thermald
//!
//! A Linux daemon that keeps a PWM fan at the speed a temperature curve asks for.
//!
//! ## Features
//!
//! - **Closed Loop**: Reads a thermal zone, picks a curve level, drives the fan
//! - **Hysteresis and Debounce**: Levels only change after three agreeing cycles
//! - **Event-Driven**: Modular services communicate via EventBus
//! - **D-Bus Interface**: Read and replace the curve at runtime
//! - **Hot Reload**: Curve edits in the config file apply without restart
//!
//! ## Architecture
//!
//! The daemon uses a provider-based dependency injection system with:
//! - [`SystemCoordinator`](coordinator::SystemCoordinator) - Main lifecycle manager
//! - [`ControlLoop`](control_loop::ControlLoop) - Sense, decide, actuate
//! - [`ConfigStore`](config_store::ConfigStore) - Single source of the active curve
//! - [`EventBus`](event::EventBus) - Inter-service communication
//! - [`AppState`](app_context::AppState) - Shared application state
//!
//! For embedding without the daemon machinery see [`Controller`](controller::Controller).
//!
//! ## Example
//!
//! ```no_run
//! use fan_thermald::{application::Application, config::ConfigManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config_manager = ConfigManager::load(None).await?;
//!     Application::builder()
//!         .with_config_manager(config_manager)
//!         .build()
//!         .await?
//!         .run()
//!         .await
//! }
//! ```

pub mod actuator;
pub mod app_context;
pub mod application;
pub mod config;
pub mod config_store;
pub mod configuration;
pub mod control_loop;
pub mod controller;
pub mod coordinator;
pub mod drivers;
pub mod error;
pub mod event;
pub mod fan_curve;
pub mod interface;
pub mod policy;
pub mod providers;
pub mod sensors;
pub mod task_manager;
pub mod temperature_sensors;

#[cfg(test)]
pub(crate) mod test_utils;
