//! Horizontal coordinate engine.
//!
//! Keeps the acquisition buffer, the zoomed viewport, the trigger holdoff and
//! the panorama cover consistent while gestures, explicit time/division
//! choices and hardware buffer changes arrive.
//!
//! Conventions:
//! * times such as the viewport center and the holdoff are measured from the
//!   center of the acquisition buffer;
//! * grid anchors are in `[-0.5, 0.5]` (fraction of the viewport from its center);
//! * panorama centers are in `[0, 1]` (fraction of the buffer);
//! * `zoom` multiplies the current span, values below 1 zoom in.
//!
//! Zoom gestures carry the anchor-to-holdoff distance
//! `anchor · timespan + viewport_center − holdoff` across the transform, so the
//! waveform feature under the finger stays under the finger.

use log::debug;

use crate::config::EngineConfig;
use crate::data::context::{AuxViews, Context};
use crate::data::trigger::Trigger;
use crate::data::units::format_seconds;
use crate::data::viewport::Viewport;
use crate::events::{EngineEvent, EventKind};

/// One transform pass over a [`Context`]. Collects the notifications raised
/// while clamping; the caller drains them with [`into_events`](Self::into_events).
pub struct Horizontal<'a> {
    ctx: &'a mut Context,
    config: &'a EngineConfig,
    events: Vec<EngineEvent>,
}

impl<'a> Horizontal<'a> {
    pub fn new(ctx: &'a mut Context, config: &'a EngineConfig) -> Self {
        Self {
            ctx,
            config,
            events: Vec::new(),
        }
    }

    pub fn context(&self) -> &Context {
        &*self.ctx
    }

    pub fn events(&self) -> &[EngineEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<EngineEvent> {
        self.events
    }

    // ─────────────────────────────────────────────────────────────────────
    // Gestures
    // ─────────────────────────────────────────────────────────────────────

    /// Zoom/pan the viewport inside the captured buffer, anchored on the grid.
    pub fn pan_zoom_viewport_from_grid_pinch(&mut self, zoom: f64, pan: f64, anchor: f64) {
        let target = self.ctx.viewport.timespan * sanitize_zoom(zoom);
        self.zoom_viewport_to(target, anchor, sanitize(pan), 0.0);
    }

    /// Reshape the live acquisition from a grid gesture: the buffer length is
    /// solved for and the viewport keeps its share of the buffer. Falls back
    /// to the viewport variant while the device is stopped.
    pub fn pan_zoom_panorama_from_grid_pinch(&mut self, zoom: f64, pan: f64, anchor: f64) {
        if !self.ctx.running {
            self.pan_zoom_viewport_from_grid_pinch(zoom, pan, anchor);
            return;
        }
        let anchor = self.resolve_grid_anchor(anchor);
        let length = self.ctx.acquisition.length;
        let ratio = self.ctx.viewport.timespan / length;
        let anchor_fraction =
            (anchor * self.ctx.viewport.timespan + self.ctx.viewport_center()) / length;
        self.zoom_acquisition_to(
            length * sanitize_zoom(zoom),
            anchor_fraction,
            sanitize(pan) * ratio,
        );
    }

    /// Zoom/pan the viewport from the panorama strip; `pan` moves the cover
    /// rectangle by that fraction of the buffer.
    pub fn pan_zoom_viewport_from_panorama(&mut self, zoom: f64, pan: f64, center: f64) {
        let center = self.resolve_panorama_center(center);
        let anchor_time = self.ctx.acquisition.time_at_fraction(center);
        let anchor = self
            .ctx
            .viewport
            .grid_position(anchor_time, &self.ctx.acquisition);
        let target = self.ctx.viewport.timespan * sanitize_zoom(zoom);
        let pan_time = sanitize(pan) * self.ctx.acquisition.length;
        self.zoom_viewport_to(target, anchor, 0.0, pan_time);
    }

    /// Reshape the live acquisition from the panorama strip; `pan` drags the
    /// waveform (and with it the trigger) by that fraction of the buffer.
    pub fn pan_zoom_panorama_from_panorama(&mut self, zoom: f64, pan: f64, center: f64) {
        if !self.ctx.running {
            self.pan_zoom_viewport_from_panorama(zoom, pan, center);
            return;
        }
        let center = self.resolve_panorama_center(center);
        let length = self.ctx.acquisition.length;
        self.zoom_acquisition_to(length * sanitize_zoom(zoom), center - 0.5, sanitize(pan));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Explicit settings
    // ─────────────────────────────────────────────────────────────────────

    /// Select an explicit time/division. Length and holdoff follow through the
    /// same anchor-preserving algebra as a gesture anchored on the trigger.
    pub fn set_tdiv_absolute(&mut self, seconds_per_division: f64) {
        if !(seconds_per_division.is_finite() && seconds_per_division > 0.0) {
            return;
        }
        let target = seconds_per_division * self.config.divisions;
        debug!("time/div -> {}", format_seconds(seconds_per_division));
        if self.ctx.running && !self.ctx.panorama.visible && !self.ctx.acquisition.rolling {
            let length = self.ctx.acquisition.length;
            let ratio = self.ctx.viewport.timespan / length;
            let anchor_fraction = self.ctx.trigger.holdoff / length;
            // past the hardware depth the viewport takes a larger share instead
            let max = self.ctx.hardware.max_acquisition_length;
            let new_length = (target / ratio).min(max).max(target);
            self.zoom_acquisition_to(new_length, anchor_fraction, 0.0);
            let length = self.ctx.acquisition.length;
            let timespan = target.min(length);
            if timespan != self.ctx.viewport.timespan {
                let center = self.ctx.viewport_center();
                self.apply_viewport(center, timespan, true);
            }
        } else {
            self.zoom_viewport_to(target, f64::NAN, 0.0, 0.0);
        }
    }

    /// Request a buffer length and rolling mode.
    pub fn set_acquisition_length(&mut self, time: f64, request_roll: bool) {
        let max = self.ctx.hardware.max_acquisition_length;
        let minimal = self.minimal_timespan().min(max);
        let mut time = if time.is_nan() {
            self.ctx.acquisition.length
        } else {
            time
        };
        if time > max {
            self.ram_depth_reached(max);
            time = max;
        }
        if time < minimal {
            time = minimal;
        }

        if request_roll != self.ctx.acquisition.rolling {
            self.set_rolling(request_roll);
        }

        if time != self.ctx.acquisition.length {
            let timespan = self.ctx.viewport.timespan.min(time);
            self.write_length(time, timespan);
        }
    }

    /// Terminal write path for the viewport. Every other operation ends here.
    pub fn set_viewport_center_and_timespan(&mut self, center: f64, timespan: f64) {
        self.apply_viewport(center, timespan, true);
    }

    /// Place the trigger inside the buffer. Clipping shows the panorama so the
    /// user can see why the holdoff stops.
    pub fn set_trigger_holdoff(&mut self, holdoff: f64) {
        if holdoff.is_nan() {
            return;
        }
        let (clamped, clipped) = Trigger::clamp_holdoff(holdoff, &self.ctx.acquisition);
        self.ctx.trigger.holdoff = clamped;
        if clipped {
            self.show_panorama();
            self.events.push(EngineEvent::notification(
                EventKind::HOLDOFF_AT_MAXIMUM,
                format!("Trigger holdoff at maximum ({})", format_seconds(clamped)),
            ));
        }
    }

    /// Shrink the buffer to the smallest one still holding the viewport and the
    /// trigger, or follow the live edge while rolling.
    pub fn minimize_acquisition_length_to_fit_viewport(&mut self, target_timespan: f64) {
        let target = if target_timespan.is_nan() {
            self.ctx.viewport.timespan
        } else {
            target_timespan
        };
        let minimal = self.minimal_timespan();
        if self.ctx.acquisition.rolling {
            let length = self.ctx.acquisition.length;
            let timespan = target.max(minimal.min(length)).min(length);
            self.apply_viewport(length / 2.0 - timespan / 2.0, timespan, true);
        } else if !self.ctx.panorama.visible {
            let timespan = target.max(minimal);
            let center = self.ctx.viewport_center();
            let needed = 2.0 * (center.abs() + timespan / 2.0).max(self.ctx.trigger.holdoff.abs());
            let max = self.ctx.hardware.max_acquisition_length;
            let length = needed.clamp(minimal.min(max), max);
            self.write_length(length, timespan);
        } else {
            let center = self.ctx.viewport_center();
            self.apply_viewport(center, target, true);
        }
    }

    /// Adopt the length and sample period the hardware actually delivered.
    pub fn apply_hardware_buffer(&mut self, length: f64, sample_period: f64) {
        if sample_period.is_finite() && sample_period > 0.0 {
            self.ctx.acquisition.sample_period = sample_period;
        }
        // a buffer shorter than the minimal span is widened on the next capture
        let minimal = self
            .minimal_timespan()
            .min(self.ctx.hardware.max_acquisition_length);
        let length = if length.is_finite() && length > 0.0 {
            let length = length.max(minimal);
            self.ctx.last_buffer_length = Some(length);
            length
        } else {
            self.ctx.acquisition.length.max(minimal)
        };
        if length != self.ctx.acquisition.length {
            let timespan = self.ctx.viewport.timespan.min(length);
            self.write_length(length, timespan);
            return;
        }
        // the minimal span may have moved with the sample period
        let center = self.ctx.viewport_center();
        let timespan = self.ctx.viewport.timespan;
        self.apply_viewport(center, timespan, false);
    }

    pub fn set_panorama_visible(&mut self, visible: bool) {
        if visible {
            self.show_panorama();
        } else if self.ctx.panorama.visible {
            self.ctx.panorama.visible = false;
            self.events.push(EngineEvent::new(EventKind::PANORAMA_HIDDEN));
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn minimal_timespan(&self) -> f64 {
        self.config.minimal_timespan(self.ctx.acquisition.sample_period)
    }

    /// NaN anchors zoom around the trigger, clamped onto the grid.
    fn resolve_grid_anchor(&self, anchor: f64) -> f64 {
        if anchor.is_nan() {
            let pos = self
                .ctx
                .viewport
                .grid_position(self.ctx.trigger.holdoff, &self.ctx.acquisition);
            if pos.is_nan() {
                0.0
            } else {
                pos.clamp(-0.5, 0.5)
            }
        } else if anchor.is_infinite() {
            anchor.clamp(-0.5, 0.5)
        } else {
            anchor
        }
    }

    /// NaN panorama centers keep the viewport's current position in the buffer.
    fn resolve_panorama_center(&self, center: f64) -> f64 {
        if center.is_nan() {
            self.ctx.acquisition.fraction_of(self.ctx.viewport_center())
        } else if center.is_infinite() {
            center.clamp(0.0, 1.0)
        } else {
            center
        }
    }

    /// Viewport zoom inside the buffer. `pan_grid` is in grid widths (positive
    /// shows earlier times), `pan_time` is a direct center shift in seconds.
    fn zoom_viewport_to(&mut self, target_timespan: f64, anchor: f64, pan_grid: f64, pan_time: f64) {
        let anchor = self.resolve_grid_anchor(anchor);
        let old_timespan = self.ctx.viewport.timespan;
        let old_center = self.ctx.viewport_center();

        let mut timespan = if target_timespan.is_nan() {
            old_timespan
        } else {
            target_timespan
        };
        let minimal = self.minimal_timespan();
        if timespan < minimal {
            self.max_zoom_reached(minimal);
            timespan = minimal;
        }

        if self.ctx.running {
            let max = self.ctx.hardware.max_acquisition_length;
            if timespan > max {
                self.ram_depth_reached(max);
                timespan = max;
            }
            if timespan > self.ctx.acquisition.length {
                self.write_length(timespan, old_timespan.min(timespan));
            }
        } else {
            // nothing new can be captured; stay within the last buffer
            let stopped = self
                .ctx
                .last_buffer_length
                .unwrap_or(self.ctx.acquisition.length);
            if stopped != self.ctx.acquisition.length {
                self.write_length(stopped, old_timespan.min(stopped));
            }
        }
        let timespan = timespan.min(self.ctx.acquisition.length);

        let center = old_center + anchor * (old_timespan - timespan) - pan_grid * timespan + pan_time;
        self.apply_viewport(center, timespan, true);
    }

    /// Acquisition zoom: solve for a new length around an anchor expressed as a
    /// fraction of the length (from the buffer center). The viewport keeps its
    /// share and position in the buffer; the holdoff is re-projected so the
    /// anchor-to-holdoff distance is unchanged.
    fn zoom_acquisition_to(&mut self, target_length: f64, anchor_fraction: f64, pan_fraction: f64) {
        let length = self.ctx.acquisition.length;
        let ratio = self.ctx.viewport.timespan / length;
        let position = self.ctx.viewport_center() / length;
        let distance = anchor_fraction * length - self.ctx.trigger.holdoff;

        let max = self.ctx.hardware.max_acquisition_length;
        let floor = (self.minimal_timespan() / ratio).min(max);
        let mut new_length = if target_length.is_nan() {
            length
        } else {
            target_length
        };
        if new_length > max {
            self.ram_depth_reached(max);
            new_length = max;
        }
        if new_length < floor {
            self.max_zoom_reached(floor * ratio);
            new_length = floor;
        }

        self.ctx.acquisition.length = new_length;
        self.apply_viewport(position * new_length, ratio * new_length, true);
        let holdoff = anchor_fraction * new_length - distance + pan_fraction * new_length;
        self.set_trigger_holdoff(holdoff);
    }

    /// Change the buffer length keeping the viewport center, then re-project
    /// the holdoff silently.
    fn write_length(&mut self, length: f64, timespan: f64) {
        let center = self.ctx.viewport_center();
        debug!(
            "acquisition length {} -> {}",
            format_seconds(self.ctx.acquisition.length),
            format_seconds(length)
        );
        self.ctx.acquisition.length = length;
        self.apply_viewport(center, timespan, true);
        self.reproject_holdoff();
    }

    fn reproject_holdoff(&mut self) {
        let (clamped, _) = Trigger::clamp_holdoff(self.ctx.trigger.holdoff, &self.ctx.acquisition);
        self.ctx.trigger.holdoff = clamped;
    }

    fn apply_viewport(&mut self, center: f64, timespan: f64, notify: bool) {
        let center = if center.is_nan() {
            self.ctx.viewport_center()
        } else {
            center
        };
        let mut timespan = if timespan.is_nan() {
            self.ctx.viewport.timespan
        } else {
            timespan
        };
        let length = self.ctx.acquisition.length;
        let minimal = self.minimal_timespan().min(length);
        if timespan < minimal {
            // tolerate rounding when the caller already clamped
            if notify && timespan < minimal * (1.0 - 1e-9) {
                self.max_zoom_reached(minimal);
            }
            timespan = minimal;
        }
        if timespan > length {
            timespan = length;
        }
        let offset = Viewport::offset_for_center(center, timespan, &self.ctx.acquisition)
            .clamp(0.0, length - timespan);
        self.ctx.viewport = Viewport::new(offset, timespan);
        self.ctx
            .panorama
            .update_cover(&self.ctx.viewport, &self.ctx.acquisition);
    }

    fn set_rolling(&mut self, rolling: bool) {
        self.ctx.acquisition.rolling = rolling;
        self.events.push(EngineEvent::new(EventKind::ROLLING_CHANGED));
        if rolling {
            self.ctx.stashed_aux = Some(AuxViews {
                fft: self.ctx.fft_enabled,
                xy: self.ctx.xy_enabled,
                panorama: self.ctx.panorama.visible,
            });
            // FFT and XY are undefined on a sliding buffer
            self.ctx.fft_enabled = false;
            self.ctx.xy_enabled = false;
            if self.ctx.running {
                self.set_panorama_visible(false);
            }
        } else if let Some(aux) = self.ctx.stashed_aux.take() {
            self.ctx.fft_enabled = aux.fft;
            self.ctx.xy_enabled = aux.xy;
            if aux.panorama {
                self.show_panorama();
            }
        }
    }

    fn show_panorama(&mut self) {
        if !self.ctx.panorama.visible {
            self.ctx.panorama.visible = true;
            self.events.push(EngineEvent::new(EventKind::PANORAMA_SHOWN));
        }
    }

    fn max_zoom_reached(&mut self, minimal: f64) {
        if self
            .events
            .iter()
            .any(|e| e.kinds.contains(EventKind::MAX_ZOOM_REACHED))
        {
            return;
        }
        self.events.push(EngineEvent::notification(
            EventKind::MAX_ZOOM_REACHED,
            format!("Maximum zoom reached ({})", format_seconds(minimal)),
        ));
    }

    fn ram_depth_reached(&mut self, max: f64) {
        if self
            .events
            .iter()
            .any(|e| e.kinds.contains(EventKind::INCREASE_RAM_DEPTH))
        {
            return;
        }
        self.events.push(EngineEvent::notification(
            EventKind::INCREASE_RAM_DEPTH,
            format!(
                "Acquisition depth limited to {}; increase RAM depth to zoom out further",
                format_seconds(max)
            ),
        ));
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn sanitize_zoom(zoom: f64) -> f64 {
    if zoom.is_finite() && zoom > 0.0 {
        zoom
    } else {
        1.0
    }
}
