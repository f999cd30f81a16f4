use crate::data::acquisition::AcquisitionBuffer;
use crate::data::viewport::Viewport;

/// Overview strip showing the whole buffer with the viewport shaded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Panorama {
    pub visible: bool,
    /// Normalized left edge of the viewport cover, `0 ≤ cover_left ≤ cover_right`.
    pub cover_left: f64,
    /// Normalized right edge of the viewport cover, `≤ 1`.
    pub cover_right: f64,
}

impl Default for Panorama {
    fn default() -> Self {
        Self {
            visible: false,
            cover_left: 0.0,
            cover_right: 1.0,
        }
    }
}

impl Panorama {
    /// Recompute the cover rectangle from the viewport.
    pub fn update_cover(&mut self, viewport: &Viewport, acquisition: &AcquisitionBuffer) {
        let left = (viewport.offset / acquisition.length).clamp(0.0, 1.0);
        let right = (viewport.end() / acquisition.length).clamp(0.0, 1.0);
        self.cover_left = left;
        self.cover_right = right.max(left);
    }

    pub fn cover_width(&self) -> f64 {
        self.cover_right - self.cover_left
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_follows_viewport() {
        let acq = AcquisitionBuffer::new(4.0, 1e-3);
        let mut p = Panorama::default();
        p.update_cover(&Viewport::new(1.0, 2.0), &acq);
        assert_eq!((p.cover_left, p.cover_right), (0.25, 0.75));
        assert_eq!(p.cover_width(), 0.5);
    }
}
