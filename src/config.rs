//! Engine configuration: grid geometry, convergence constants and defaults
//! used when a session starts without persisted state.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PanoscopeError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Channel limits
// ─────────────────────────────────────────────────────────────────────────────

/// Vertical scale limits of an analog channel, before probe gain.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelLimits {
    /// Smallest selectable volts per division. Default: `0.02`.
    pub min_per_division: f64,
    /// Largest selectable volts per division. Default: `10.0`.
    pub max_per_division: f64,
}

impl Default for ChannelLimits {
    fn default() -> Self {
        Self {
            min_per_division: 0.02,
            max_per_division: 10.0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EngineConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level configuration for a [`Session`](crate::session::Session).
///
/// | Field group        | Purpose |
/// |--------------------|---------|
/// | grid               | `divisions`, `minimal_zoom_samples` |
/// | auto trigger       | `auto_trigger_frames` |
/// | auto arrange       | `periods_on_screen`, `viewfinder_ratio`, `fast_channel_ratio`, `flatline_acquisition_length`, `second_channel_nudge_divisions` |
/// | defaults           | `default_acquisition_length`, `default_sample_period`, `default_voltage_range` |
/// | queue              | `blocking_poll_ms` |
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // ── Grid ─────────────────────────────────────────────────────────────────
    /// Number of horizontal (and vertical) divisions on the main grid.
    pub divisions: f64,
    /// The viewport never shows fewer than this many samples.
    pub minimal_zoom_samples: f64,

    // ── Auto trigger ─────────────────────────────────────────────────────────
    /// Frames averaged before the auto trigger level is committed.
    pub auto_trigger_frames: usize,

    // ── Auto arrange ─────────────────────────────────────────────────────────
    pub periods_on_screen: f64,
    /// Fraction of the acquisition buffer shown by the viewport after arranging.
    pub viewfinder_ratio: f64,
    /// Above this fastest/slowest frequency ratio the length follows the fastest channel.
    pub fast_channel_ratio: f64,
    /// Acquisition length used when every channel is flat (seconds).
    pub flatline_acquisition_length: f64,
    /// Offset nudge applied to the second enabled channel, in divisions.
    pub second_channel_nudge_divisions: f64,
    pub channel_limits: ChannelLimits,

    // ── Defaults ─────────────────────────────────────────────────────────────
    pub default_acquisition_length: f64,
    pub default_sample_period: f64,
    /// Initial full-scale range of every analog channel (volts).
    pub default_voltage_range: f64,

    // ── Queue ────────────────────────────────────────────────────────────────
    /// Sleep between polls of a blocking enqueue.
    pub blocking_poll_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            divisions: 10.0,
            minimal_zoom_samples: 10.0,
            auto_trigger_frames: 10,
            periods_on_screen: 5.0,
            viewfinder_ratio: 0.5,
            fast_channel_ratio: 10.0,
            flatline_acquisition_length: 10e-3,
            second_channel_nudge_divisions: 3.0 / 8.0,
            channel_limits: ChannelLimits::default(),
            default_acquisition_length: 10e-3,
            default_sample_period: 10e-9,
            default_voltage_range: 10.0,
            blocking_poll_ms: 1,
        }
    }
}

impl EngineConfig {
    /// Parse a YAML document; missing keys fall back to their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let cfg: EngineConfig = serde_yaml::from_str(yaml)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_yaml(path: &Path) -> Result<Self> {
        let txt = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&txt)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Reject values that would break the model invariants.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("divisions", self.divisions),
            ("minimal_zoom_samples", self.minimal_zoom_samples),
            ("periods_on_screen", self.periods_on_screen),
            ("viewfinder_ratio", self.viewfinder_ratio),
            ("fast_channel_ratio", self.fast_channel_ratio),
            ("flatline_acquisition_length", self.flatline_acquisition_length),
            ("default_acquisition_length", self.default_acquisition_length),
            ("default_sample_period", self.default_sample_period),
            ("default_voltage_range", self.default_voltage_range),
            ("channel_limits.min_per_division", self.channel_limits.min_per_division),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(PanoscopeError::InvalidConfig(format!(
                    "{name} must be a positive finite number, got {value}"
                )));
            }
        }
        if self.channel_limits.max_per_division < self.channel_limits.min_per_division {
            return Err(PanoscopeError::InvalidConfig(
                "channel_limits.max_per_division is below min_per_division".to_string(),
            ));
        }
        if self.auto_trigger_frames == 0 {
            return Err(PanoscopeError::InvalidConfig(
                "auto_trigger_frames must be at least 1".to_string(),
            ));
        }
        if self.viewfinder_ratio > 1.0 {
            return Err(PanoscopeError::InvalidConfig(
                "viewfinder_ratio cannot exceed 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Smallest viewport timespan resolvable at `sample_period`.
    #[inline]
    pub fn minimal_timespan(&self, sample_period: f64) -> f64 {
        self.minimal_zoom_samples * sample_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg = EngineConfig::from_yaml_str("divisions: 12\nauto_trigger_frames: 4\n").unwrap();
        assert_eq!(cfg.divisions, 12.0);
        assert_eq!(cfg.auto_trigger_frames, 4);
        assert_eq!(cfg.periods_on_screen, 5.0);
    }

    #[test]
    fn rejects_zero_divisions() {
        let err = EngineConfig::from_yaml_str("divisions: 0\n").unwrap_err();
        assert!(matches!(err, PanoscopeError::InvalidConfig(_)));
    }

    #[test]
    fn yaml_round_trip() {
        let cfg = EngineConfig {
            fast_channel_ratio: 20.0,
            ..EngineConfig::default()
        };
        let txt = cfg.to_yaml_string().unwrap();
        assert_eq!(EngineConfig::from_yaml_str(&txt).unwrap(), cfg);
    }
}
