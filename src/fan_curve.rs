//! Fan curve model for threshold-based speed control.
//!
//! A curve is a short ladder of levels ordered by activation temperature.
//! Each level carries its own hysteresis band, which the policy engine uses
//! to delay downgrades.

use serde::{Deserialize, Serialize};
use zvariant::Type;

use crate::error::{FanError, Result};

/// Maximum number of levels a curve may hold.
pub const MAX_LEVELS: usize = 10;

/// Default sampling interval, matching the hardware driver default.
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 2000;

/// One rung of the fan curve.
///
/// Temperatures are in milli-degrees Celsius, speed is a percentage.
///
/// # Example
///
/// ```
/// use fan_thermald::fan_curve::FanLevel;
///
/// // 60°C activates 70%, downgrade considered below 55°C
/// let level = FanLevel::new(60_000, 5_000, 70);
/// assert_eq!(level.release_temp(), 55_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
pub struct FanLevel {
    /// Temperature at which this level activates.
    pub temp: i32,
    /// How far the temperature must fall below `temp` before a downgrade is considered.
    #[serde(default)]
    pub hyst: i32,
    /// Speed commanded while this level is active.
    pub speed: i32,
}

impl FanLevel {
    pub const fn new(temp: i32, hyst: i32, speed: i32) -> Self {
        Self { temp, hyst, speed }
    }

    /// Temperature below which this level starts counting towards a downgrade.
    pub fn release_temp(&self) -> i32 {
        self.temp.saturating_sub(self.hyst)
    }
}

impl From<(i32, i32, i32)> for FanLevel {
    fn from((temp, hyst, speed): (i32, i32, i32)) -> Self {
        Self { temp, hyst, speed }
    }
}

/// Ordered sequence of fan levels.
///
/// Construction through [`FanCurve::new`] enforces the [`MAX_LEVELS`] bound,
/// per-level ranges and strictly increasing temperatures. `Deserialize` does not, so curves
/// coming from files or the bus are checked again by [`FanCurve::validate`]
/// before they are installed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FanCurve(Vec<FanLevel>);

impl FanCurve {
    pub fn new(levels: Vec<FanLevel>) -> Result<Self> {
        let curve = Self(levels);
        curve.validate()?;
        Ok(curve)
    }

    /// Builds a curve without any checks.
    ///
    /// Level selection on an unsorted curve picks the highest matching index,
    /// which is not necessarily the hottest level.
    pub fn from_levels_unchecked(levels: Vec<FanLevel>) -> Self {
        Self(levels)
    }

    pub fn validate(&self) -> Result<()> {
        if self.0.len() > MAX_LEVELS {
            return Err(FanError::InvalidConfiguration(format!(
                "curve has {} levels, at most {MAX_LEVELS} are supported",
                self.0.len()
            )));
        }

        if let Some((idx, level)) = self
            .0
            .iter()
            .enumerate()
            .find(|(_, level)| level.hyst < 0 || !(0..=100).contains(&level.speed))
        {
            return Err(FanError::InvalidConfiguration(format!(
                "level {idx} has hysteresis {} and speed {}%, expected hysteresis >= 0 and speed 0-100",
                level.hyst, level.speed
            )));
        }

        if let Some(idx) = self.0.windows(2).position(|w| w[1].temp <= w[0].temp) {
            return Err(FanError::InvalidConfiguration(format!(
                "level {} threshold {} is not above level {} threshold {}",
                idx + 1,
                self.0[idx + 1].temp,
                idx,
                self.0[idx].temp
            )));
        }

        Ok(())
    }

    /// Highest index whose threshold is at or below `temp`, scanning down from the top.
    pub fn select_level(&self, temp: i32) -> Option<usize> {
        self.0.iter().rposition(|level| temp >= level.temp)
    }

    pub fn get(&self, idx: usize) -> Option<&FanLevel> {
        self.0.get(idx)
    }

    /// Speed for a level index, `0` for no level.
    pub fn speed_for(&self, level: Option<usize>) -> i32 {
        level
            .and_then(|idx| self.0.get(idx))
            .map_or(0, |level| level.speed)
    }

    pub fn levels(&self) -> &[FanLevel] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything a caller can reconfigure at runtime, installed as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPackage {
    pub curve: FanCurve,
    pub poll_interval_ms: u32,
}

impl ConfigPackage {
    pub fn new(curve: FanCurve, poll_interval_ms: u32) -> Self {
        Self {
            curve,
            poll_interval_ms,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.curve.validate()?;
        if self.poll_interval_ms == 0 {
            return Err(FanError::InvalidConfiguration(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(u64::from(self.poll_interval_ms))
    }
}

impl Default for ConfigPackage {
    /// A single level that never triggers below 120°C, with the fan off.
    fn default() -> Self {
        Self {
            curve: FanCurve(vec![FanLevel::new(120_000, 0, 0)]),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}
