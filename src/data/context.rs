//! The explicit session model: every coordinate entity the engine mutates,
//! bundled so operations take it by reference instead of reaching into a
//! process-wide settings object.

use crate::config::EngineConfig;
use crate::data::acquisition::AcquisitionBuffer;
use crate::data::channels::{AnalogChannel, ChannelId};
use crate::data::panorama::Panorama;
use crate::data::trigger::Trigger;
use crate::data::viewport::Viewport;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AcquisitionMode {
    #[default]
    Normal,
    Single,
    /// Free-runs when no trigger is found.
    Auto,
}

/// Numeric limits reported by the connected hardware.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HardwareLimits {
    pub max_acquisition_length: f64,
    pub min_sample_period: f64,
}

impl Default for HardwareLimits {
    fn default() -> Self {
        Self {
            max_acquisition_length: 10.0,
            min_sample_period: 10e-9,
        }
    }
}

/// FFT / XY state stashed while rolling mode forces them off.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuxViews {
    pub fft: bool,
    pub xy: bool,
    pub panorama: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Context {
    pub acquisition: AcquisitionBuffer,
    pub viewport: Viewport,
    pub trigger: Trigger,
    pub panorama: Panorama,
    pub channels: Vec<AnalogChannel>,
    pub hardware: HardwareLimits,
    pub acquisition_mode: AcquisitionMode,
    pub running: bool,
    pub fft_enabled: bool,
    pub xy_enabled: bool,
    pub(crate) stashed_aux: Option<AuxViews>,
    /// Length of the most recently received frame, if any.
    pub last_buffer_length: Option<f64>,
}

impl Context {
    pub fn new(config: &EngineConfig, channel_count: usize) -> Self {
        let acquisition =
            AcquisitionBuffer::new(config.default_acquisition_length, config.default_sample_period);
        let viewport = Viewport::full(&acquisition);
        let mut panorama = Panorama::default();
        panorama.update_cover(&viewport, &acquisition);
        Self {
            acquisition,
            viewport,
            trigger: Trigger::default(),
            panorama,
            channels: (0..channel_count)
                .map(|i| AnalogChannel::new(ChannelId(i), config.default_voltage_range))
                .collect(),
            hardware: HardwareLimits::default(),
            acquisition_mode: AcquisitionMode::default(),
            running: false,
            fft_enabled: false,
            xy_enabled: false,
            stashed_aux: None,
            last_buffer_length: None,
        }
    }

    /// Reset the buffer-related state for a freshly connected device. Channel
    /// scaling survives; coordinates restart from a whole-buffer view.
    pub fn reset_for_device(&mut self, limits: HardwareLimits, length: f64, sample_period: f64) {
        self.hardware = limits;
        let length = if length.is_finite() && length > 0.0 {
            length.min(limits.max_acquisition_length)
        } else {
            self.acquisition.length.min(limits.max_acquisition_length)
        };
        let sample_period = if sample_period.is_finite() && sample_period > 0.0 {
            sample_period
        } else {
            limits.min_sample_period
        };
        self.acquisition = AcquisitionBuffer::new(length, sample_period);
        self.viewport = Viewport::full(&self.acquisition);
        self.trigger.holdoff = 0.0;
        self.panorama.update_cover(&self.viewport, &self.acquisition);
        self.stashed_aux = None;
        self.last_buffer_length = None;
        self.running = false;
    }

    pub fn viewport_center(&self) -> f64 {
        self.viewport.center(&self.acquisition)
    }

    pub fn channel(&self, id: ChannelId) -> Option<&AnalogChannel> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> Option<&mut AnalogChannel> {
        self.channels.iter_mut().find(|c| c.id == id)
    }

    pub fn enabled_channels(&self) -> impl Iterator<Item = &AnalogChannel> {
        self.channels.iter().filter(|c| c.enabled)
    }

    pub fn set_enabled_visible(&mut self, visible: bool) {
        for ch in self.channels.iter_mut().filter(|c| c.enabled) {
            ch.visible = visible;
        }
    }

    /// Describe every violated model invariant; empty when consistent.
    pub fn invariant_violations(&self, config: &EngineConfig) -> Vec<String> {
        let mut out = Vec::new();
        let a = &self.acquisition;
        let v = &self.viewport;
        // relative slack for accumulated rounding
        let eps = a.length * 1e-12;
        if !(a.length > 0.0) {
            out.push(format!("length {} not positive", a.length));
        }
        if !(a.sample_period > 0.0) {
            out.push(format!("sample period {} not positive", a.sample_period));
        }
        if v.offset < -eps {
            out.push(format!("offset {} negative", v.offset));
        }
        if v.end() > a.length + eps {
            out.push(format!("viewport end {} beyond length {}", v.end(), a.length));
        }
        let minimal = config
            .minimal_timespan(a.sample_period)
            .min(self.hardware.max_acquisition_length);
        if a.length < minimal * (1.0 - 1e-12) {
            out.push(format!("length {} below minimal span {}", a.length, minimal));
        }
        if v.timespan < minimal * (1.0 - 1e-12) {
            out.push(format!("timespan {} below minimum {}", v.timespan, minimal));
        }
        if self.trigger.holdoff.abs() > a.half_length() + eps {
            out.push(format!("holdoff {} outside ±{}", self.trigger.holdoff, a.half_length()));
        }
        let p = &self.panorama;
        if !(0.0 <= p.cover_left && p.cover_left <= p.cover_right && p.cover_right <= 1.0) {
            out.push(format!("cover [{}, {}] invalid", p.cover_left, p.cover_right));
        }
        if [a.length, v.offset, v.timespan, self.trigger.holdoff]
            .iter()
            .any(|x| x.is_nan())
        {
            out.push("NaN in model".to_string());
        }
        out
    }
}
