use serde::{Deserialize, Serialize};

use crate::config::ChannelLimits;
use crate::data::units::nice_ceil;

/// Zero-based analog channel index. Displayed one-based (`CH1`, `CH2`, …).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub usize);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CH{}", self.0 + 1)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnalogChannel {
    pub id: ChannelId,
    pub enabled: bool,
    /// Hidden channels are still acquired but not drawn.
    pub visible: bool,
    /// Full-scale vertical range in volts.
    pub voltage_range: f64,
    pub voltage_offset: f64,
    pub probe_gain: f64,
}

impl AnalogChannel {
    pub fn new(id: ChannelId, voltage_range: f64) -> Self {
        Self {
            id,
            enabled: true,
            visible: true,
            voltage_range,
            voltage_offset: 0.0,
            probe_gain: 1.0,
        }
    }

    pub fn volts_per_division(&self, divisions: f64) -> f64 {
        self.voltage_range / divisions
    }

    /// Largest and smallest allowed full-scale range for this channel.
    pub fn range_bounds(&self, limits: &ChannelLimits, divisions: f64) -> (f64, f64) {
        (
            limits.min_per_division * self.probe_gain * divisions,
            limits.max_per_division * self.probe_gain * divisions,
        )
    }

    /// Store `range` clamped into the channel's bounds.
    pub fn set_voltage_range(&mut self, range: f64, limits: &ChannelLimits, divisions: f64) {
        let (lo, hi) = self.range_bounds(limits, divisions);
        if range.is_finite() {
            self.voltage_range = range.clamp(lo, hi);
        }
    }

    /// Round a requested full-scale range up to the next 1-2-5 volts/division
    /// value and clamp it into the channel's bounds.
    pub fn nice_range(&self, range: f64, limits: &ChannelLimits, divisions: f64) -> f64 {
        let per_div = nice_ceil(range / divisions).clamp(
            limits.min_per_division * self.probe_gain,
            limits.max_per_division * self.probe_gain,
        );
        per_div * divisions
    }
}
