//! Temperature-to-speed policy with hysteresis and downgrade debounce.
//!
//! Upgrades take effect on the first reading that crosses a higher
//! threshold. Downgrades are only committed after the temperature has stayed
//! below the active level's hysteresis band for
//! [`STABILIZATION_CYCLES_REQUIRED`] consecutive non-rising cycles. This
//! keeps the fan from hunting when the temperature sits near a boundary.

use serde::{Deserialize, Serialize};

use crate::fan_curve::FanCurve;

/// Consecutive qualifying cycles needed before a downgrade is committed.
pub const STABILIZATION_CYCLES_REQUIRED: u32 = 3;

/// Direction of temperature change between the two most recent readings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    #[default]
    Stable,
    Rising,
    Falling,
}

impl Trend {
    pub fn between(previous: i32, current: i32) -> Self {
        match current.cmp(&previous) {
            std::cmp::Ordering::Greater => Self::Rising,
            std::cmp::Ordering::Less => Self::Falling,
            std::cmp::Ordering::Equal => Self::Stable,
        }
    }
}

/// History the engine carries between sampling cycles.
///
/// Owned by the control loop. `trend` and `last_temp` are maintained by the
/// caller through [`EngineState::observe`]; `active_level` and
/// `stabilization_count` only change inside [`evaluate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineState {
    /// Index into the active curve, `None` when no level is active.
    pub active_level: Option<usize>,
    pub stabilization_count: u32,
    pub last_temp: i32,
    pub trend: Trend,
}

impl EngineState {
    /// Records a new raw reading: computes the trend against the previous
    /// reading, then remembers this one.
    pub fn observe(&mut self, temp: i32) {
        self.trend = Trend::between(self.last_temp, temp);
        self.last_temp = temp;
    }

    /// Forgets level history after a new curve is installed.
    ///
    /// Level indices from the previous curve mean nothing in the new one.
    pub fn reset_level(&mut self) {
        self.active_level = None;
        self.stabilization_count = 0;
    }
}

/// What happened to the active level in one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Upgrade { from: Option<usize>, to: usize },
    Downgrade { from: usize, to: Option<usize> },
    /// A downgrade is pending; `count` qualifying cycles seen so far.
    Debouncing { count: u32 },
    Hold,
}

/// Result of one policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub state: EngineState,
    /// Speed the controller should be driving after this evaluation.
    pub target_speed: i32,
    pub transition: Transition,
}

/// Runs one policy step.
///
/// `state.trend` must already reflect `current_temp` (see
/// [`EngineState::observe`]). An `active_level` that does not exist in
/// `curve` is treated as no level.
pub fn evaluate(curve: &FanCurve, state: EngineState, current_temp: i32) -> Evaluation {
    let mut next = state;
    let active = state.active_level.filter(|&idx| idx < curve.len());
    next.active_level = active;

    let selected = curve.select_level(current_temp);

    // `None` orders below every `Some`, so "no level" sits under index 0.
    let transition = if selected > active {
        next.active_level = selected;
        next.stabilization_count = 0;
        match selected {
            Some(to) => Transition::Upgrade { from: active, to },
            None => Transition::Hold,
        }
    } else if selected < active {
        debounce_downgrade(curve, &mut next, selected, current_temp)
    } else {
        next.stabilization_count = 0;
        Transition::Hold
    };

    Evaluation {
        target_speed: curve.speed_for(next.active_level),
        state: next,
        transition,
    }
}

fn debounce_downgrade(
    curve: &FanCurve,
    state: &mut EngineState,
    selected: Option<usize>,
    current_temp: i32,
) -> Transition {
    let Some((from, active_entry)) = state
        .active_level
        .and_then(|idx| curve.get(idx).map(|level| (idx, level)))
    else {
        state.stabilization_count = 0;
        return Transition::Hold;
    };

    if current_temp >= active_entry.release_temp() {
        // Still inside the hysteresis band: hold the current level.
        state.stabilization_count = 0;
        return Transition::Hold;
    }

    if state.trend == Trend::Rising {
        state.stabilization_count = 0;
    } else {
        state.stabilization_count += 1;
    }

    if state.stabilization_count >= STABILIZATION_CYCLES_REQUIRED {
        state.active_level = selected;
        state.stabilization_count = 0;
        Transition::Downgrade { from, to: selected }
    } else {
        Transition::Debouncing {
            count: state.stabilization_count,
        }
    }
}
