//! Hardware abstraction consumed by the session, plus the probe thread that
//! connects a device in the background.

use std::collections::BTreeMap;
use std::thread::JoinHandle;

use log::{info, warn};

use crate::data::channels::ChannelId;
use crate::data::trigger::TriggerEdge;
use crate::error::Result;
use crate::queue::{Command, CommandSender};

pub mod handle;
pub mod simulated;

pub use handle::DeviceHandle;
pub use simulated::{SimWaveform, SimulatedDevice};

/// Measured shape of one channel's signal, as reported by the hardware or
/// computed from a frame.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct WaveProperties {
    /// DC offset, the midpoint between the extremes (volts).
    pub offset: f64,
    /// Peak-to-peak amplitude (volts).
    pub amplitude: f64,
    /// Fundamental frequency (Hz). `0` for flat signals.
    pub frequency: f64,
    pub is_flatline: bool,
    pub min_value: f64,
}

impl WaveProperties {
    pub fn max_value(&self) -> f64 {
        self.min_value + self.amplitude
    }

    /// Level halfway between the extremes.
    pub fn midpoint(&self) -> f64 {
        self.min_value + self.amplitude / 2.0
    }
}

/// One captured acquisition buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct DataFrame {
    pub acquisition_length: f64,
    pub sample_period: f64,
    pub channels: BTreeMap<ChannelId, Vec<f64>>,
}

impl DataFrame {
    pub fn new(acquisition_length: f64, sample_period: f64) -> Self {
        Self {
            acquisition_length,
            sample_period,
            channels: BTreeMap::new(),
        }
    }

    pub fn with_channel(mut self, channel: ChannelId, samples: Vec<f64>) -> Self {
        self.channels.insert(channel, samples);
        self
    }

    pub fn samples(&self, channel: ChannelId) -> Option<&[f64]> {
        self.channels.get(&channel).map(Vec::as_slice)
    }

    /// Minimum and maximum of `channel` inside the window starting `offset`
    /// seconds into the buffer and lasting `timespan`. An empty window falls
    /// back to the whole buffer.
    pub fn window_min_max(&self, channel: ChannelId, offset: f64, timespan: f64) -> Option<(f64, f64)> {
        let samples = self.samples(channel)?;
        if samples.is_empty() {
            return None;
        }
        let n = samples.len();
        let to_index = |t: f64| ((t / self.sample_period).round().max(0.0) as usize).min(n);
        let (start, end) = (to_index(offset), to_index(offset + timespan));
        let window = if start < end { &samples[start..end] } else { samples };
        let (lo, hi) = window
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        Some((lo, hi))
    }
}

/// The acquisition hardware (or a stand-in for it).
///
/// Setters stage values; `commit_settings` applies them as one
/// reconfiguration.
pub trait ScopeDevice: Send {
    fn name(&self) -> &str;

    fn acquisition_length(&self) -> f64;
    fn set_acquisition_length(&mut self, length: f64) -> Result<()>;
    fn sample_period(&self) -> f64;
    fn rolling(&self) -> bool;
    fn set_rolling(&mut self, rolling: bool) -> Result<()>;
    fn running(&self) -> bool;
    fn set_running(&mut self, running: bool) -> Result<()>;

    /// Window the device should prioritise when decimating for display.
    fn set_view_port(&mut self, offset: f64, timespan: f64) -> Result<()>;
    fn set_trigger_holdoff(&mut self, holdoff: f64) -> Result<()>;
    fn set_trigger(&mut self, channel: ChannelId, level: f64, edge: TriggerEdge) -> Result<()>;
    fn commit_settings(&mut self) -> Result<()>;

    fn max_acquisition_length(&self) -> f64;
    fn min_sample_period(&self) -> f64;
    fn enabled_channels(&self) -> Vec<ChannelId>;

    /// Measure a channel in hardware. May block for several acquisitions.
    fn characterize_wave(&mut self, channel: ChannelId) -> Result<WaveProperties>;

    /// Next captured frame, if one is ready.
    fn poll_frame(&mut self) -> Result<Option<DataFrame>>;
}

/// Connect a device on a background thread and hand it to the session.
pub fn spawn_device_probe<F>(sender: CommandSender, connect: F) -> std::io::Result<JoinHandle<()>>
where
    F: FnOnce() -> Result<Box<dyn ScopeDevice>> + Send + 'static,
{
    std::thread::Builder::new()
        .name("device-probe".into())
        .spawn(move || {
            let command = match connect() {
                Ok(device) => {
                    info!("device probe found {}", device.name());
                    Command::DeviceConnected(device)
                }
                Err(e) => {
                    warn!("device probe failed: {e}");
                    Command::DeviceFailed(e.to_string())
                }
            };
            let _ = sender.send(command);
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_min_max_respects_window() {
        let frame = DataFrame::new(1.0, 0.1)
            .with_channel(ChannelId(0), vec![5.0, 1.0, 2.0, 3.0, 4.0, -5.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(frame.window_min_max(ChannelId(0), 0.1, 0.4), Some((1.0, 4.0)));
        assert_eq!(frame.window_min_max(ChannelId(0), 0.0, 1.0), Some((-5.0, 5.0)));
        assert_eq!(frame.window_min_max(ChannelId(1), 0.0, 1.0), None);
    }

    #[test]
    fn empty_window_uses_whole_buffer() {
        let frame = DataFrame::new(0.3, 0.1).with_channel(ChannelId(0), vec![1.0, 2.0, 3.0]);
        assert_eq!(frame.window_min_max(ChannelId(0), 5.0, 1.0), Some((1.0, 3.0)));
    }

    #[test]
    fn wave_midpoint() {
        let w = WaveProperties {
            min_value: -1.0,
            amplitude: 4.0,
            ..WaveProperties::default()
        };
        assert_eq!(w.midpoint(), 1.0);
        assert_eq!(w.max_value(), 3.0);
    }
}
