//! Software device producing synthetic waveforms. Used by the demo binary and
//! as the hardware double in tests.

use std::f64::consts::PI;

use log::debug;

use crate::data::channels::ChannelId;
use crate::data::trigger::TriggerEdge;
use crate::device::{DataFrame, ScopeDevice, WaveProperties};
use crate::error::{PanoscopeError, Result};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SimWaveform {
    /// `amplitude` is peak-to-peak.
    Sine {
        frequency: f64,
        amplitude: f64,
        offset: f64,
    },
    Flat {
        level: f64,
    },
}

impl SimWaveform {
    fn value_at(&self, t: f64) -> f64 {
        match *self {
            SimWaveform::Sine {
                frequency,
                amplitude,
                offset,
            } => offset + amplitude / 2.0 * (2.0 * PI * frequency * t).sin(),
            SimWaveform::Flat { level } => level,
        }
    }

    fn properties(&self) -> WaveProperties {
        match *self {
            SimWaveform::Sine {
                frequency,
                amplitude,
                offset,
            } => WaveProperties {
                offset,
                amplitude,
                frequency,
                is_flatline: amplitude == 0.0 || frequency == 0.0,
                min_value: offset - amplitude / 2.0,
            },
            SimWaveform::Flat { level } => WaveProperties {
                offset: level,
                amplitude: 0.0,
                frequency: 0.0,
                is_flatline: true,
                min_value: level,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Settings {
    length: f64,
    rolling: bool,
    holdoff: f64,
    view_offset: f64,
    view_timespan: f64,
    trigger_channel: ChannelId,
    trigger_level: f64,
    trigger_edge: TriggerEdge,
}

pub struct SimulatedDevice {
    name: String,
    waveforms: Vec<SimWaveform>,
    pending: Settings,
    active: Settings,
    running: bool,
    max_length: f64,
    min_sample_period: f64,
    record_points: usize,
    clock: f64,
    commits: usize,
}

impl SimulatedDevice {
    /// Two channels: a 1 kHz, 2 Vpp sine around 0.5 V and a 10 kHz, 1 Vpp sine.
    pub fn new(name: impl Into<String>) -> Self {
        let settings = Settings {
            length: 10e-3,
            rolling: false,
            holdoff: 0.0,
            view_offset: 0.0,
            view_timespan: 10e-3,
            trigger_channel: ChannelId(0),
            trigger_level: 0.0,
            trigger_edge: TriggerEdge::Rising,
        };
        Self {
            name: name.into(),
            waveforms: vec![
                SimWaveform::Sine {
                    frequency: 1e3,
                    amplitude: 2.0,
                    offset: 0.5,
                },
                SimWaveform::Sine {
                    frequency: 10e3,
                    amplitude: 1.0,
                    offset: 0.0,
                },
            ],
            pending: settings,
            active: settings,
            running: false,
            max_length: 1.0,
            min_sample_period: 1e-9,
            record_points: 2000,
            clock: 0.0,
            commits: 0,
        }
    }

    pub fn with_waveforms(mut self, waveforms: Vec<SimWaveform>) -> Self {
        self.waveforms = waveforms;
        self
    }

    pub fn with_limits(mut self, max_length: f64, min_sample_period: f64) -> Self {
        self.max_length = max_length;
        self.min_sample_period = min_sample_period;
        self
    }

    pub fn with_record_points(mut self, record_points: usize) -> Self {
        self.record_points = record_points.max(2);
        self
    }

    /// Number of `commit_settings` calls so far.
    pub fn commits(&self) -> usize {
        self.commits
    }

    pub fn trigger_holdoff(&self) -> f64 {
        self.active.holdoff
    }

    pub fn view_port(&self) -> (f64, f64) {
        (self.active.view_offset, self.active.view_timespan)
    }

    /// Time shift that puts the trigger crossing at the holdoff position, or
    /// free-runs when the trigger level is never crossed.
    fn time_shift(&self) -> f64 {
        let free_run = self.clock;
        if self.active.rolling {
            return free_run;
        }
        let Some(SimWaveform::Sine {
            frequency,
            amplitude,
            offset,
        }) = self.waveforms.get(self.active.trigger_channel.0).copied()
        else {
            return free_run;
        };
        let half = amplitude / 2.0;
        if !(frequency > 0.0 && half > 0.0) || (self.active.trigger_level - offset).abs() >= half {
            return free_run;
        }
        let rising = ((self.active.trigger_level - offset) / half).asin();
        let phase = match self.active.trigger_edge {
            TriggerEdge::Falling => PI - rising,
            TriggerEdge::Rising | TriggerEdge::Any => rising,
        };
        let trigger_at = self.active.length / 2.0 + self.active.holdoff;
        phase / (2.0 * PI * frequency) - trigger_at
    }
}

impl ScopeDevice for SimulatedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquisition_length(&self) -> f64 {
        self.active.length
    }

    fn set_acquisition_length(&mut self, length: f64) -> Result<()> {
        if !(length.is_finite() && length > 0.0) {
            return Err(PanoscopeError::Device(format!("invalid acquisition length {length}")));
        }
        self.pending.length = length.min(self.max_length);
        Ok(())
    }

    fn sample_period(&self) -> f64 {
        (self.active.length / self.record_points as f64).max(self.min_sample_period)
    }

    fn rolling(&self) -> bool {
        self.active.rolling
    }

    fn set_rolling(&mut self, rolling: bool) -> Result<()> {
        self.pending.rolling = rolling;
        Ok(())
    }

    fn running(&self) -> bool {
        self.running
    }

    fn set_running(&mut self, running: bool) -> Result<()> {
        self.running = running;
        Ok(())
    }

    fn set_view_port(&mut self, offset: f64, timespan: f64) -> Result<()> {
        self.pending.view_offset = offset;
        self.pending.view_timespan = timespan;
        Ok(())
    }

    fn set_trigger_holdoff(&mut self, holdoff: f64) -> Result<()> {
        self.pending.holdoff = holdoff;
        Ok(())
    }

    fn set_trigger(&mut self, channel: ChannelId, level: f64, edge: TriggerEdge) -> Result<()> {
        self.pending.trigger_channel = channel;
        self.pending.trigger_level = level;
        self.pending.trigger_edge = edge;
        Ok(())
    }

    fn commit_settings(&mut self) -> Result<()> {
        self.active = self.pending;
        self.commits += 1;
        Ok(())
    }

    fn max_acquisition_length(&self) -> f64 {
        self.max_length
    }

    fn min_sample_period(&self) -> f64 {
        self.min_sample_period
    }

    fn enabled_channels(&self) -> Vec<ChannelId> {
        (0..self.waveforms.len()).map(ChannelId).collect()
    }

    fn characterize_wave(&mut self, channel: ChannelId) -> Result<WaveProperties> {
        self.waveforms
            .get(channel.0)
            .map(SimWaveform::properties)
            .ok_or_else(|| PanoscopeError::Device(format!("{channel} does not exist")))
    }

    fn poll_frame(&mut self) -> Result<Option<DataFrame>> {
        if !self.running {
            return Ok(None);
        }
        let length = self.active.length;
        let sample_period = self.sample_period();
        let n = ((length / sample_period).round() as usize).max(2);
        let shift = self.time_shift();
        let mut frame = DataFrame::new(length, sample_period);
        for (i, wave) in self.waveforms.iter().enumerate() {
            let samples = (0..n)
                .map(|k| wave.value_at(k as f64 * sample_period + shift))
                .collect();
            frame.channels.insert(ChannelId(i), samples);
        }
        self.clock += length;
        debug!("{}: frame of {n} samples", self.name);
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_apply_on_commit() {
        let mut dev = SimulatedDevice::new("sim");
        dev.set_acquisition_length(2e-3).unwrap();
        assert_eq!(dev.acquisition_length(), 10e-3);
        dev.commit_settings().unwrap();
        assert_eq!(dev.acquisition_length(), 2e-3);
        assert_eq!(dev.commits(), 1);
    }

    #[test]
    fn stopped_device_yields_no_frames() {
        let mut dev = SimulatedDevice::new("sim");
        assert!(dev.poll_frame().unwrap().is_none());
    }

    #[test]
    fn triggered_frame_crosses_level_at_holdoff() {
        let mut dev = SimulatedDevice::new("sim").with_record_points(1000);
        dev.set_trigger(ChannelId(0), 0.5, TriggerEdge::Rising).unwrap();
        dev.set_trigger_holdoff(1e-3).unwrap();
        dev.commit_settings().unwrap();
        dev.set_running(true).unwrap();
        let frame = dev.poll_frame().unwrap().unwrap();
        let samples = frame.samples(ChannelId(0)).unwrap();
        // trigger at 5 ms + 1 ms = sample 600; the signal is at its offset there, rising
        let at = samples[600];
        assert!((at - 0.5).abs() < 1e-9, "{at}");
        assert!(samples[601] > samples[599]);
    }

    #[test]
    fn characterize_reports_flatline() {
        let mut dev =
            SimulatedDevice::new("sim").with_waveforms(vec![SimWaveform::Flat { level: 0.2 }]);
        let w = dev.characterize_wave(ChannelId(0)).unwrap();
        assert!(w.is_flatline);
        assert_eq!(w.min_value, 0.2);
        assert!(dev.characterize_wave(ChannelId(3)).is_err());
    }
}
