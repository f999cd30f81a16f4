/// The hardware's most recently captured buffer, as seen by the engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AcquisitionBuffer {
    /// Buffer duration in seconds. Always `> 0`.
    pub length: f64,
    /// Seconds between two samples. Always `> 0`.
    pub sample_period: f64,
    /// Continuously sliding buffer instead of one capture per trigger.
    pub rolling: bool,
}

impl AcquisitionBuffer {
    pub fn new(length: f64, sample_period: f64) -> Self {
        Self {
            length,
            sample_period,
            rolling: false,
        }
    }

    pub fn half_length(&self) -> f64 {
        self.length / 2.0
    }

    pub fn sample_count(&self) -> usize {
        (self.length / self.sample_period).round().max(0.0) as usize
    }

    /// Buffer-relative fraction `[0, 1]` of a time measured from the buffer center.
    pub fn fraction_of(&self, time_from_center: f64) -> f64 {
        time_from_center / self.length + 0.5
    }

    /// Inverse of [`fraction_of`](Self::fraction_of).
    pub fn time_at_fraction(&self, fraction: f64) -> f64 {
        (fraction - 0.5) * self.length
    }
}
