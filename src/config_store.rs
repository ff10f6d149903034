//! Live configuration shared by the configuration interface and the control loop.

use std::sync::Arc;

use tokio::sync::{Notify, RwLock};

use crate::fan_curve::ConfigPackage;

/// An installed package tagged with the install it came from.
///
/// `generation` increases on every [`ConfigStore::replace`]; a reader that
/// sees a generation it has not seen before must drop any state derived from
/// the previous package.
#[derive(Debug, Clone)]
pub struct Installed {
    pub generation: u64,
    pub package: Arc<ConfigPackage>,
}

/// Holder of the active [`ConfigPackage`].
///
/// Packages are immutable once installed and swapped as a whole under a short
/// write lock, so a snapshot never mixes fields from two installs. Readers
/// clone the `Arc` out and work on it without holding the lock.
#[derive(Debug)]
pub struct ConfigStore {
    active: RwLock<Installed>,
    wake: Notify,
}

impl ConfigStore {
    pub fn new(initial: ConfigPackage) -> Self {
        Self {
            active: RwLock::new(Installed {
                generation: 0,
                package: Arc::new(initial),
            }),
            wake: Notify::new(),
        }
    }

    /// Installs `package` and wakes the control loop.
    ///
    /// The wake is issued after the swap, so the woken cycle observes the new
    /// package. If the loop is not waiting, the permit is kept for its next
    /// [`ConfigStore::changed_since`].
    pub async fn replace(&self, package: ConfigPackage) -> u64 {
        let generation = {
            let mut active = self.active.write().await;
            active.generation += 1;
            active.package = Arc::new(package);
            active.generation
        };
        self.wake.notify_one();
        generation
    }

    pub async fn snapshot(&self) -> Installed {
        self.active.read().await.clone()
    }

    pub async fn package(&self) -> Arc<ConfigPackage> {
        self.active.read().await.package.clone()
    }

    /// Completes once a generation newer than `seen` is installed.
    ///
    /// A pending wake for a package the caller has already picked up is
    /// consumed without returning. Every `replace` stores a permit, so an
    /// install racing with the generation check is never missed.
    pub async fn changed_since(&self, seen: u64) {
        loop {
            self.wake.notified().await;
            if self.active.read().await.generation != seen {
                return;
            }
        }
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(ConfigPackage::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fan_curve::{FanCurve, FanLevel};
    use std::time::Duration;
    use tokio::time::timeout;

    fn package(speed: i32, poll_interval_ms: u32) -> ConfigPackage {
        ConfigPackage::new(
            FanCurve::new(vec![FanLevel::new(40_000, 1_000, speed)]).unwrap(),
            poll_interval_ms,
        )
    }

    #[tokio::test]
    async fn replace_bumps_generation_and_swaps_package() {
        let store = ConfigStore::default();
        assert_eq!(store.snapshot().await.generation, 0);

        let generation = store.replace(package(55, 500)).await;
        let snapshot = store.snapshot().await;
        assert_eq!(generation, 1);
        assert_eq!(snapshot.generation, 1);
        assert_eq!(*snapshot.package, package(55, 500));
    }

    #[tokio::test]
    async fn snapshot_outlives_replacement() {
        let store = ConfigStore::new(package(10, 100));
        let before = store.package().await;
        store.replace(package(90, 900)).await;

        assert_eq!(before.poll_interval_ms, 100);
        assert_eq!(store.package().await.poll_interval_ms, 900);
    }

    #[tokio::test]
    async fn wake_issued_before_waiting_is_not_lost() {
        let store = ConfigStore::default();
        store.replace(package(20, 100)).await;
        assert!(
            timeout(Duration::from_millis(100), store.changed_since(0))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn waiter_is_woken_by_replace() {
        let store = Arc::new(ConfigStore::default());
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.changed_since(0).await })
        };
        tokio::task::yield_now().await;

        store.replace(package(20, 100)).await;
        assert!(timeout(Duration::from_secs(1), waiter).await.is_ok());
    }

    #[tokio::test]
    async fn no_wake_without_replace() {
        let store = ConfigStore::default();
        assert!(
            timeout(Duration::from_millis(50), store.changed_since(0))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn wake_for_an_already_seen_generation_is_dropped() {
        let store = ConfigStore::default();
        let generation = store.replace(package(20, 100)).await;

        // The caller already observed `generation`, so the pending permit is stale
        assert!(
            timeout(Duration::from_millis(50), store.changed_since(generation))
                .await
                .is_err()
        );

        store.replace(package(30, 100)).await;
        assert!(
            timeout(Duration::from_millis(100), store.changed_since(generation))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn concurrent_snapshots_never_tear() {
        let store = Arc::new(ConfigStore::new(package(1, 1)));
        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 1..=200u32 {
                    store.replace(package(i as i32 % 101, i)).await;
                }
            })
        };

        for _ in 0..200 {
            let snapshot = store.snapshot().await;
            // Every package was built with speed == interval % 101
            let speed = snapshot.package.curve.levels()[0].speed;
            assert_eq!(speed, (snapshot.package.poll_interval_ms % 101) as i32);
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
    }
}
