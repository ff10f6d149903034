//! Speed-to-duty mapping for active-low PWM fan drivers.
//!
//! The fan driver circuit is active-low: a high output turns the fan off.
//! 0% speed therefore maps to a full-period duty cycle and 100% to zero duty.

use async_trait::async_trait;
use log::{debug, error};

use crate::error::Result;

/// Period substituted when the PWM channel reports none (25 kHz).
pub const DEFAULT_PERIOD_NS: u64 = 40_000;

/// Snapshot of a PWM channel's configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PwmState {
    pub period_ns: u64,
    pub duty_cycle_ns: u64,
    pub enabled: bool,
}

/// Raw PWM hardware channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PwmDevice: Send + Sync {
    /// Reads the channel's current state.
    async fn read_state(&self) -> Result<PwmState>;

    /// Commits a complete state to the channel.
    async fn apply_state(&self, state: PwmState) -> Result<()>;

    /// Human-readable identifier for logs.
    fn name(&self) -> String;
}

/// Sink that turns a speed percentage into fan motion.
#[async_trait]
pub trait FanActuator: Send + Sync {
    /// Drives the fan at `percent`, clamped to 0..=100.
    async fn set_speed(&self, percent: i32) -> Result<()>;
}

/// Inverted duty cycle for `percent` of `period_ns`.
///
/// ```
/// use fan_thermald::actuator::inverted_duty_cycle;
///
/// assert_eq!(inverted_duty_cycle(40_000, 0), 40_000);
/// assert_eq!(inverted_duty_cycle(40_000, 100), 0);
/// assert_eq!(inverted_duty_cycle(40_000, 30), 28_000);
/// ```
pub fn inverted_duty_cycle(period_ns: u64, percent: u8) -> u64 {
    let percent = u64::from(percent.min(100));
    period_ns - period_ns.saturating_mul(percent) / 100
}

/// [`FanActuator`] on top of a [`PwmDevice`].
pub struct PwmFanActuator<D> {
    device: D,
}

impl<D: PwmDevice> PwmFanActuator<D> {
    pub fn new(device: D) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &D {
        &self.device
    }
}

#[async_trait]
impl<D: PwmDevice> FanActuator for PwmFanActuator<D> {
    async fn set_speed(&self, percent: i32) -> Result<()> {
        let percent = percent.clamp(0, 100) as u8;
        let mut state = self.device.read_state().await?;
        if state.period_ns == 0 {
            state.period_ns = DEFAULT_PERIOD_NS;
        }

        state.duty_cycle_ns = inverted_duty_cycle(state.period_ns, percent);
        state.enabled = true;

        debug!(
            "{}: {percent}% -> duty {}/{} ns",
            self.device.name(),
            state.duty_cycle_ns,
            state.period_ns
        );

        self.device.apply_state(state).await.inspect_err(|e| {
            error!("Failed to apply PWM state: {e}");
        })
    }
}
