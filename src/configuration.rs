//! Validation and installation of runtime configuration packages.

use std::sync::Arc;

use log::{info, warn};

use crate::{
    config_store::ConfigStore,
    error::Result,
    event::{Event, EventBus},
    fan_curve::{ConfigPackage, FanCurve},
};

/// The trusted caller's entry point for reconfiguring the controller.
///
/// Rejected packages never reach the store. Accepted packages replace the
/// active one atomically and wake the control loop, which then starts over
/// from "no active level".
#[derive(Debug, Clone)]
pub struct ConfigurationInterface {
    store: Arc<ConfigStore>,
    event_bus: Option<EventBus>,
}

impl ConfigurationInterface {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self {
            store,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Validates and installs `package`.
    ///
    /// Fails with [`FanError::InvalidConfiguration`](crate::error::FanError::InvalidConfiguration)
    /// when the curve holds more than [`MAX_LEVELS`](crate::fan_curve::MAX_LEVELS)
    /// levels, when thresholds are not strictly increasing, or when the poll
    /// interval is zero. Nothing is modified in that case.
    pub async fn set_config(&self, package: ConfigPackage) -> Result<()> {
        if let Err(e) = package.validate() {
            warn!("Rejected configuration: {e}");
            return Err(e);
        }

        let levels = package.curve.len();
        let poll_interval_ms = package.poll_interval_ms;
        let generation = self.store.replace(package).await;

        info!("New config loaded: {levels} levels, polling {poll_interval_ms} ms");

        if let Some(event_bus) = &self.event_bus {
            event_bus.notify(Event::ConfigInstalled {
                generation,
                levels,
                poll_interval_ms,
            });
        }
        Ok(())
    }

    /// Returns the active curve.
    ///
    /// The poll interval is deliberately not part of this read path.
    pub async fn get_config(&self) -> FanCurve {
        self.store.package().await.curve.clone()
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::FanError,
        fan_curve::{FanLevel, MAX_LEVELS},
    };
    use pretty_assertions::assert_eq;

    fn curve(levels: usize) -> FanCurve {
        FanCurve::from_levels_unchecked(
            (0..levels as i32)
                .map(|i| FanLevel::new(30_000 + i * 5_000, 2_000, (i * 10).min(100)))
                .collect(),
        )
    }

    fn interface() -> ConfigurationInterface {
        ConfigurationInterface::new(Arc::new(ConfigStore::default()))
    }

    #[tokio::test]
    async fn accepted_package_becomes_active() {
        let interface = interface();
        let package = ConfigPackage::new(curve(3), 750);

        interface.set_config(package.clone()).await.unwrap();

        assert_eq!(interface.get_config().await, package.curve);
        assert_eq!(*interface.store().package().await, package);
    }

    #[tokio::test]
    async fn eleven_levels_are_rejected_without_side_effects() {
        let interface = interface();
        interface
            .set_config(ConfigPackage::new(curve(2), 1000))
            .await
            .unwrap();
        let before = interface.store().snapshot().await;

        let err = interface
            .set_config(ConfigPackage::new(curve(MAX_LEVELS + 1), 500))
            .await
            .unwrap_err();

        assert!(matches!(err, FanError::InvalidConfiguration(_)));
        let after = interface.store().snapshot().await;
        assert_eq!(after.generation, before.generation);
        assert_eq!(*after.package, *before.package);
    }

    #[tokio::test]
    async fn rejected_package_does_not_wake_the_loop() {
        let interface = interface();
        let _ = interface.set_config(ConfigPackage::new(curve(1), 0)).await;

        let woke = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            interface.store().changed_since(0),
        )
        .await;
        assert!(woke.is_err());
    }

    // Behavior change: unsorted curves are refused instead of installed as-is
    #[tokio::test]
    async fn unsorted_curve_is_rejected() {
        let interface = interface();
        let unsorted = FanCurve::from_levels_unchecked(vec![
            FanLevel::new(70_000, 0, 90),
            FanLevel::new(50_000, 0, 40),
        ]);

        let result = interface.set_config(ConfigPackage::new(unsorted, 1000)).await;
        assert!(matches!(result, Err(FanError::InvalidConfiguration(_))));
        assert_eq!(interface.get_config().await, ConfigPackage::default().curve);
    }

    // Asymmetry kept on purpose: the read path returns only the curve
    #[tokio::test]
    async fn get_config_omits_poll_interval() {
        let interface = interface();
        interface
            .set_config(ConfigPackage::new(curve(2), 4321))
            .await
            .unwrap();

        let curve: FanCurve = interface.get_config().await;
        assert_eq!(curve.len(), 2);
        assert_eq!(interface.store().package().await.poll_interval_ms, 4321);
    }

    #[tokio::test]
    async fn install_is_published_on_the_bus() {
        let event_bus = EventBus::new();
        let mut receiver = event_bus.subscribe();
        let interface = interface().with_event_bus(event_bus);

        interface
            .set_config(ConfigPackage::new(curve(4), 250))
            .await
            .unwrap();

        match receiver.recv().await.unwrap() {
            Event::ConfigInstalled {
                generation,
                levels,
                poll_interval_ms,
            } => assert_eq!((generation, levels, poll_interval_ms), (1, 4, 250)),
            other => panic!("Expected ConfigInstalled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_curve_is_accepted() {
        let interface = interface();
        interface
            .set_config(ConfigPackage::new(FanCurve::default(), 1000))
            .await
            .unwrap();
        assert!(interface.get_config().await.is_empty());
    }
}
