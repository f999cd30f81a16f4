use serde::{Deserialize, Serialize};

use crate::data::acquisition::AcquisitionBuffer;
use crate::data::channels::ChannelId;
use crate::data::units::{format_seconds, format_volts};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriggerEdge {
    #[default]
    Rising,
    Falling,
    Any,
}

/// Trigger definition; `holdoff` places the trigger event inside the buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Trigger {
    pub channel: ChannelId,
    pub level: f64,
    pub edge: TriggerEdge,
    /// Seconds from the buffer center. `|holdoff| ≤ length / 2`.
    pub holdoff: f64,
}

impl Default for Trigger {
    fn default() -> Self {
        Self {
            channel: ChannelId(0),
            level: 0.0,
            edge: TriggerEdge::Rising,
            holdoff: 0.0,
        }
    }
}

impl Trigger {
    /// Clamp `holdoff` into the buffer. Returns the clamped value and whether
    /// clamping was necessary.
    pub fn clamp_holdoff(holdoff: f64, acquisition: &AcquisitionBuffer) -> (f64, bool) {
        let half = acquisition.half_length();
        let clamped = holdoff.clamp(-half, half);
        (clamped, clamped != holdoff)
    }

    /// Short, user-facing description.
    /// Example: "CH1: rising @ 120 mV, holdoff 1.5 ms"
    pub fn describe(&self) -> String {
        let edge = match self.edge {
            TriggerEdge::Rising => "rising",
            TriggerEdge::Falling => "falling",
            TriggerEdge::Any => "any",
        };
        format!(
            "{}: {} @ {}, holdoff {}",
            self.channel,
            edge,
            format_volts(self.level),
            format_seconds(self.holdoff)
        )
    }

    /// Index of the first crossing of `level` in `samples`, honoring the edge.
    pub fn find_crossing(&self, samples: &[f64]) -> Option<usize> {
        samples.windows(2).position(|w| {
            let (v0, v1) = (w[0], w[1]);
            match self.edge {
                TriggerEdge::Rising => v0 < self.level && v1 >= self.level,
                TriggerEdge::Falling => v0 > self.level && v1 <= self.level,
                TriggerEdge::Any => {
                    (v0 < self.level && v1 >= self.level) || (v0 > self.level && v1 <= self.level)
                }
            }
        })
        .map(|i| i + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_reports_clipping() {
        let acq = AcquisitionBuffer::new(2e-3, 1e-8);
        assert_eq!(Trigger::clamp_holdoff(5e-4, &acq), (5e-4, false));
        assert_eq!(Trigger::clamp_holdoff(-1.0, &acq), (-1e-3, true));
    }

    #[test]
    fn finds_rising_and_falling_crossings() {
        let samples = [1.0, -1.0, 0.5, 2.0, 0.0];
        let mut t = Trigger { level: 0.0, ..Trigger::default() };
        assert_eq!(t.find_crossing(&samples), Some(2));
        t.edge = TriggerEdge::Falling;
        assert_eq!(t.find_crossing(&samples), Some(1));
    }

    #[test]
    fn describe_mentions_channel_and_edge() {
        let t = Trigger {
            channel: ChannelId(1),
            level: 0.12,
            edge: TriggerEdge::Rising,
            holdoff: 1.5e-3,
        };
        let s = t.describe();
        assert!(s.starts_with("CH2: rising"), "{s}");
        assert!(s.contains("ms"), "{s}");
    }
}
