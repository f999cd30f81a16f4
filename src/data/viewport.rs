use crate::data::acquisition::AcquisitionBuffer;

/// Zoomed window rendered on the main grid, relative to the start of the
/// acquisition buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub offset: f64,
    pub timespan: f64,
}

impl Viewport {
    pub fn new(offset: f64, timespan: f64) -> Self {
        Self { offset, timespan }
    }

    /// Whole-buffer viewport.
    pub fn full(acquisition: &AcquisitionBuffer) -> Self {
        Self::new(0.0, acquisition.length)
    }

    /// Center of the viewport measured from the center of the buffer.
    #[inline]
    pub fn center(&self, acquisition: &AcquisitionBuffer) -> f64 {
        self.offset + self.timespan / 2.0 - acquisition.length / 2.0
    }

    /// Offset that places the viewport center at `center` (from buffer center).
    #[inline]
    pub fn offset_for_center(center: f64, timespan: f64, acquisition: &AcquisitionBuffer) -> f64 {
        center + acquisition.length / 2.0 - timespan / 2.0
    }

    pub fn end(&self) -> f64 {
        self.offset + self.timespan
    }

    /// Grid coordinate in `[-0.5, 0.5]` of a time measured from the buffer center.
    pub fn grid_position(&self, time_from_center: f64, acquisition: &AcquisitionBuffer) -> f64 {
        (time_from_center - self.center(acquisition)) / self.timespan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_of_full_viewport_is_zero() {
        let acq = AcquisitionBuffer::new(2e-3, 1e-8);
        assert_eq!(Viewport::full(&acq).center(&acq), 0.0);
    }

    #[test]
    fn offset_for_center_inverts_center() {
        let acq = AcquisitionBuffer::new(1.0, 1e-6);
        let vp = Viewport::new(0.25, 0.5);
        let c = vp.center(&acq);
        assert!((Viewport::offset_for_center(c, vp.timespan, &acq) - vp.offset).abs() < 1e-15);
    }
}
