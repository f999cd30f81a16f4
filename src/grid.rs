//! Interface to the component that draws the main grid.

use crate::data::channels::ChannelId;
use crate::data::context::Context;

/// Receives scale updates after every command that touched the models.
pub trait GridScalers {
    /// `horizontal_range` is the visible timespan; `horizontal_origin_offset`
    /// is the grid center's time relative to the trigger.
    fn update_scalers_offsets(
        &mut self,
        horizontal_range: f64,
        horizontal_origin_offset: f64,
        vertical_range: f64,
        vertical_offset: f64,
        reference_channel: ChannelId,
    );

    fn update_cursors(&mut self, holdoff: f64, viewport_center: f64);
}

/// Last values pushed to a grid. Handy for renderers that pull instead of
/// being pushed to, and for tests.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GridState {
    pub horizontal_range: f64,
    pub horizontal_origin_offset: f64,
    pub vertical_range: f64,
    pub vertical_offset: f64,
    pub reference_channel: ChannelId,
    pub holdoff: f64,
    pub viewport_center: f64,
    pub updates: usize,
}

impl GridScalers for GridState {
    fn update_scalers_offsets(
        &mut self,
        horizontal_range: f64,
        horizontal_origin_offset: f64,
        vertical_range: f64,
        vertical_offset: f64,
        reference_channel: ChannelId,
    ) {
        self.horizontal_range = horizontal_range;
        self.horizontal_origin_offset = horizontal_origin_offset;
        self.vertical_range = vertical_range;
        self.vertical_offset = vertical_offset;
        self.reference_channel = reference_channel;
        self.updates += 1;
    }

    fn update_cursors(&mut self, holdoff: f64, viewport_center: f64) {
        self.holdoff = holdoff;
        self.viewport_center = viewport_center;
    }
}

/// Push the current scales of `ctx` to `grid`. The trigger channel is the
/// vertical reference, falling back to the first enabled channel.
pub fn notify_grid(grid: &mut dyn GridScalers, ctx: &Context) {
    let reference = ctx
        .channel(ctx.trigger.channel)
        .filter(|c| c.enabled)
        .or_else(|| ctx.enabled_channels().next());
    let (vertical_range, vertical_offset, reference_channel) = match reference {
        Some(ch) => (ch.voltage_range, ch.voltage_offset, ch.id),
        None => (0.0, 0.0, ctx.trigger.channel),
    };
    let center = ctx.viewport_center();
    grid.update_scalers_offsets(
        ctx.viewport.timespan,
        center - ctx.trigger.holdoff,
        vertical_range,
        vertical_offset,
        reference_channel,
    );
    grid.update_cursors(ctx.trigger.holdoff, center);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn reference_falls_back_to_enabled_channel() {
        let cfg = EngineConfig::default();
        let mut ctx = Context::new(&cfg, 2);
        ctx.channels[0].enabled = false;
        ctx.channels[1].voltage_range = 4.0;
        let mut grid = GridState::default();
        notify_grid(&mut grid, &ctx);
        assert_eq!(grid.reference_channel, ChannelId(1));
        assert_eq!(grid.vertical_range, 4.0);
        assert_eq!(grid.horizontal_range, ctx.viewport.timespan);
        assert_eq!(grid.updates, 1);
    }
}
