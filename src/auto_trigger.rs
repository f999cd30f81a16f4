//! "Auto everything": sample the trigger channel for a few frames, settle the
//! trigger level on the mean midpoint and optionally hand over to arranging.

use log::{debug, info};

use crate::arrange::{local_wave_properties, ArrangeResult};
use crate::config::EngineConfig;
use crate::data::channels::ChannelId;
use crate::data::context::{AcquisitionMode, Context};
use crate::data::trigger::TriggerEdge;
use crate::data::units::format_volts;
use crate::device::DataFrame;

#[derive(Clone, Debug, PartialEq, Default)]
pub enum AutoTriggerState {
    #[default]
    Idle,
    Sampling {
        midpoints: Vec<f64>,
    },
    /// Level settled; the next frame is used to arrange.
    ArmedForArrange,
}

/// Result of feeding one frame.
#[derive(Clone, Debug, PartialEq)]
pub enum AutoTriggerStep {
    Ignored,
    Sampled { collected: usize },
    Converged { channel: ChannelId, level: f64 },
    Arrange(ArrangeResult),
}

#[derive(Debug, Default)]
pub struct AutoTrigger {
    state: AutoTriggerState,
    channel: ChannelId,
    also_arrange: bool,
}

impl AutoTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &AutoTriggerState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != AutoTriggerState::Idle
    }

    /// Hide the enabled channels, free-run the acquisition and start sampling.
    /// A run already in progress restarts.
    pub fn start(&mut self, ctx: &mut Context, channel: ChannelId, also_arrange: bool) {
        info!("auto trigger on {channel} (arrange: {also_arrange})");
        ctx.set_enabled_visible(false);
        ctx.acquisition_mode = AcquisitionMode::Auto;
        ctx.running = true;
        self.channel = channel;
        self.also_arrange = also_arrange;
        self.state = AutoTriggerState::Sampling {
            midpoints: Vec::new(),
        };
    }

    /// Abort and show the channels again.
    pub fn cancel(&mut self, ctx: &mut Context) {
        if self.is_active() {
            debug!("auto trigger cancelled");
            ctx.set_enabled_visible(true);
        }
        self.state = AutoTriggerState::Idle;
    }

    pub fn on_frame(&mut self, ctx: &mut Context, config: &EngineConfig, frame: &DataFrame) -> AutoTriggerStep {
        match &mut self.state {
            AutoTriggerState::Idle => AutoTriggerStep::Ignored,
            AutoTriggerState::Sampling { midpoints } => {
                let Some((lo, hi)) =
                    frame.window_min_max(self.channel, ctx.viewport.offset, ctx.viewport.timespan)
                else {
                    return AutoTriggerStep::Ignored;
                };
                midpoints.push((lo + hi) / 2.0);
                if midpoints.len() < config.auto_trigger_frames {
                    return AutoTriggerStep::Sampled {
                        collected: midpoints.len(),
                    };
                }
                let level = midpoints.iter().sum::<f64>() / midpoints.len() as f64;
                ctx.trigger.channel = self.channel;
                ctx.trigger.level = level;
                ctx.trigger.edge = TriggerEdge::Rising;
                info!("auto trigger converged: {} @ {}", self.channel, format_volts(level));
                if self.also_arrange {
                    self.state = AutoTriggerState::ArmedForArrange;
                } else {
                    ctx.set_enabled_visible(true);
                    self.state = AutoTriggerState::Idle;
                }
                AutoTriggerStep::Converged {
                    channel: self.channel,
                    level,
                }
            }
            AutoTriggerState::ArmedForArrange => {
                ctx.set_enabled_visible(true);
                self.state = AutoTriggerState::Idle;
                let waves = ctx
                    .enabled_channels()
                    .filter_map(|c| local_wave_properties(frame, c.id).map(|w| (c.id, w)))
                    .collect();
                AutoTriggerStep::Arrange(ArrangeResult { waves })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(channel: ChannelId, lo: f64, hi: f64) -> DataFrame {
        DataFrame::new(1e-3, 1e-4).with_channel(channel, vec![lo, hi, lo, hi, lo, hi, lo, hi, lo, hi])
    }

    #[test]
    fn start_hides_channels_and_runs() {
        let cfg = EngineConfig::default();
        let mut ctx = Context::new(&cfg, 2);
        let mut auto = AutoTrigger::new();
        auto.start(&mut ctx, ChannelId(1), false);
        assert!(ctx.running);
        assert_eq!(ctx.acquisition_mode, AcquisitionMode::Auto);
        assert!(ctx.channels.iter().all(|c| !c.visible));
        auto.cancel(&mut ctx);
        assert!(ctx.channels.iter().all(|c| c.visible));
        assert_eq!(auto.state(), &AutoTriggerState::Idle);
    }

    #[test]
    fn frames_without_channel_are_ignored() {
        let cfg = EngineConfig::default();
        let mut ctx = Context::new(&cfg, 2);
        let mut auto = AutoTrigger::new();
        auto.start(&mut ctx, ChannelId(0), false);
        let step = auto.on_frame(&mut ctx, &cfg, &frame(ChannelId(1), 0.0, 1.0));
        assert_eq!(step, AutoTriggerStep::Ignored);
        let step = auto.on_frame(&mut ctx, &cfg, &frame(ChannelId(0), 0.0, 1.0));
        assert_eq!(step, AutoTriggerStep::Sampled { collected: 1 });
    }

    #[test]
    fn armed_run_arranges_on_next_frame() {
        let cfg = EngineConfig {
            auto_trigger_frames: 1,
            ..EngineConfig::default()
        };
        let mut ctx = Context::new(&cfg, 1);
        ctx.acquisition.length = 1e-3;
        ctx.viewport.timespan = 1e-3;
        let mut auto = AutoTrigger::new();
        auto.start(&mut ctx, ChannelId(0), true);
        let f = frame(ChannelId(0), -1.0, 1.0);
        assert!(matches!(
            auto.on_frame(&mut ctx, &cfg, &f),
            AutoTriggerStep::Converged { .. }
        ));
        assert!(!ctx.channels[0].visible);
        match auto.on_frame(&mut ctx, &cfg, &f) {
            AutoTriggerStep::Arrange(result) => assert_eq!(result.waves.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
        assert!(ctx.channels[0].visible);
        assert!(!auto.is_active());
    }
}
