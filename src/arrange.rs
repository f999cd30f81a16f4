//! Auto-arrange: pick vertical scales and a timebase so every enabled channel
//! is fully visible.
//!
//! The hardware path measures each channel on a worker thread
//! ([`spawn_auto_arrange`]) and posts the result back as a command. The
//! software path ([`local_wave_properties`]) measures a captured frame and is
//! used when the auto trigger hands over to arranging.

use std::thread::JoinHandle;

use log::{debug, info, warn};

use crate::config::EngineConfig;
use crate::data::channels::ChannelId;
use crate::data::context::Context;
use crate::data::trigger::TriggerEdge;
use crate::data::units::{format_seconds, format_volts};
use crate::device::{DataFrame, DeviceHandle, WaveProperties};
use crate::events::EngineEvent;
use crate::horizontal::Horizontal;
use crate::queue::{Command, CommandSender};

/// Peak-to-peak swing below which a channel counts as flat (volts).
const FLATLINE_VOLTS: f64 = 1e-6;
/// Hysteresis of the crossing counter, as a fraction of the amplitude.
const CROSSING_HYSTERESIS: f64 = 0.1;

/// Measurements gathered by one arrange run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArrangeResult {
    pub waves: Vec<(ChannelId, WaveProperties)>,
}

/// Timebase chosen by [`arrange_horizontal`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HorizontalPlan {
    pub acquisition_length: f64,
    pub trigger_channel: Option<ChannelId>,
    pub trigger_level: f64,
}

/// Characterize every channel in hardware on a background thread.
///
/// Posts `ArrangeProgress` after each channel and one `ArrangeComplete` at the
/// end. Channels whose measurement fails are left out of the result.
pub fn spawn_auto_arrange(
    device: DeviceHandle,
    channels: Vec<ChannelId>,
    sender: CommandSender,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("auto-arrange".into())
        .spawn(move || {
            let total = channels.len().max(1) as f64;
            let mut result = ArrangeResult::default();
            for (i, channel) in channels.iter().enumerate() {
                match device.with(|d| d.characterize_wave(*channel)) {
                    Ok(wave) => {
                        debug!(
                            "{channel}: {} pp, {:.3} Hz, flat={}",
                            format_volts(wave.amplitude),
                            wave.frequency,
                            wave.is_flatline
                        );
                        result.waves.push((*channel, wave));
                    }
                    Err(e) => warn!("characterizing {channel} failed: {e}"),
                }
                if sender
                    .send(Command::ArrangeProgress((i + 1) as f64 / total))
                    .is_err()
                {
                    return;
                }
            }
            let _ = sender.send(Command::ArrangeComplete(result));
        })
}

/// Measure a channel from a captured frame.
pub fn local_wave_properties(frame: &DataFrame, channel: ChannelId) -> Option<WaveProperties> {
    let samples = frame.samples(channel)?;
    if samples.is_empty() {
        return None;
    }
    let (min, max) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let amplitude = max - min;
    let mid = min + amplitude / 2.0;
    if amplitude < FLATLINE_VOLTS {
        return Some(WaveProperties {
            offset: mid,
            amplitude,
            frequency: 0.0,
            is_flatline: true,
            min_value: min,
        });
    }

    // rising crossings of the midpoint, re-armed only below the hysteresis band
    let low = mid - amplitude * CROSSING_HYSTERESIS;
    let mut armed = false;
    let mut first = None;
    let mut last = 0;
    let mut crossings = 0usize;
    for (i, &v) in samples.iter().enumerate() {
        if v < low {
            armed = true;
        } else if armed && v >= mid {
            armed = false;
            crossings += 1;
            first.get_or_insert(i);
            last = i;
        }
    }
    let frequency = match first {
        Some(first) if crossings >= 2 && last > first => {
            (crossings - 1) as f64 / ((last - first) as f64 * frame.sample_period)
        }
        // at most one period in the buffer
        _ => 1.0 / frame.acquisition_length,
    };
    Some(WaveProperties {
        offset: mid,
        amplitude,
        frequency,
        is_flatline: false,
        min_value: min,
    })
}

/// Set range and offset of every measured channel.
pub fn arrange_vertical(ctx: &mut Context, config: &EngineConfig, waves: &[(ChannelId, WaveProperties)]) {
    let enabled: Vec<ChannelId> = ctx.enabled_channels().map(|c| c.id).collect();
    for (id, wave) in waves {
        let Some(rank) = enabled.iter().position(|c| c == id) else {
            continue;
        };
        let Some(channel) = ctx.channel_mut(*id) else {
            continue;
        };
        let (range, mut offset) = if wave.is_flatline {
            (config.divisions, 0.0)
        } else if wave.amplitude < wave.offset.abs() {
            (3.0 * wave.offset.abs(), 0.0)
        } else {
            (3.0 * wave.amplitude, -wave.min_value)
        };
        let range = channel.nice_range(range, &config.channel_limits, config.divisions);
        if rank == 1 {
            offset += config.second_channel_nudge_divisions * range / config.divisions;
        }
        channel.voltage_range = range;
        channel.voltage_offset = offset;
        debug!("{id}: range {}, offset {}", format_volts(range), format_volts(offset));
    }
}

/// Choose the acquisition length and trigger source.
pub fn arrange_horizontal(config: &EngineConfig, waves: &[(ChannelId, WaveProperties)]) -> HorizontalPlan {
    let live = || {
        waves
            .iter()
            .filter(|(_, w)| !w.is_flatline && w.frequency > 0.0)
    };
    let slowest = live().min_by(|a, b| a.1.frequency.total_cmp(&b.1.frequency));
    let fastest = live().max_by(|a, b| a.1.frequency.total_cmp(&b.1.frequency));
    match (slowest, fastest) {
        (Some((slow_id, slow)), Some((_, fast))) => {
            let frequency = if fast.frequency > config.fast_channel_ratio * slow.frequency {
                fast.frequency
            } else {
                slow.frequency
            };
            HorizontalPlan {
                acquisition_length: config.periods_on_screen / config.viewfinder_ratio / frequency,
                trigger_channel: Some(*slow_id),
                trigger_level: slow.midpoint(),
            }
        }
        _ => HorizontalPlan {
            acquisition_length: config.flatline_acquisition_length,
            trigger_channel: waves.first().map(|(id, _)| *id),
            trigger_level: waves.first().map(|(_, w)| w.midpoint()).unwrap_or(0.0),
        },
    }
}

/// Apply a finished arrange run to the model and mark the device for restart.
pub fn apply_arrange(ctx: &mut Context, config: &EngineConfig, result: &ArrangeResult) -> Vec<EngineEvent> {
    arrange_vertical(ctx, config, &result.waves);
    let plan = arrange_horizontal(config, &result.waves);
    info!(
        "auto arrange: length {}, trigger {:?} @ {}",
        format_seconds(plan.acquisition_length),
        plan.trigger_channel,
        format_volts(plan.trigger_level)
    );

    let rolling = ctx.acquisition.rolling;
    let mut h = Horizontal::new(ctx, config);
    h.set_acquisition_length(plan.acquisition_length, rolling);
    h.set_trigger_holdoff(0.0);
    let length = h.context().acquisition.length;
    h.set_viewport_center_and_timespan(0.0, length * config.viewfinder_ratio);
    let events = h.into_events();

    if let Some(channel) = plan.trigger_channel {
        ctx.trigger.channel = channel;
        ctx.trigger.level = plan.trigger_level;
        ctx.trigger.edge = TriggerEdge::Rising;
    }
    ctx.running = true;
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(frequency: f64, amplitude: f64, offset: f64) -> WaveProperties {
        WaveProperties {
            offset,
            amplitude,
            frequency,
            is_flatline: false,
            min_value: offset - amplitude / 2.0,
        }
    }

    #[test]
    fn large_offset_range_follows_offset() {
        let cfg = EngineConfig::default();
        let mut ctx = Context::new(&cfg, 1);
        arrange_vertical(&mut ctx, &cfg, &[(ChannelId(0), sine(1e3, 0.2, 2.0))]);
        let ch = &ctx.channels[0];
        // 3 × 2 V = 6 V -> 0.6 V/div -> 1 V/div
        assert!((ch.voltage_range - 10.0).abs() < 1e-12);
        assert_eq!(ch.voltage_offset, 0.0);
    }

    #[test]
    fn second_channel_is_nudged() {
        let cfg = EngineConfig::default();
        let mut ctx = Context::new(&cfg, 2);
        let waves = [(ChannelId(0), sine(1e3, 2.0, 0.0)), (ChannelId(1), sine(1e3, 2.0, 0.0))];
        arrange_vertical(&mut ctx, &cfg, &waves);
        // 3 × 2 V = 6 V -> 1 V/div; offset = -min = 1 V
        assert!((ctx.channels[0].voltage_offset - 1.0).abs() < 1e-12);
        assert!((ctx.channels[1].voltage_offset - 1.375).abs() < 1e-12);
    }

    #[test]
    fn fast_channel_sets_length() {
        let cfg = EngineConfig::default();
        let waves = [(ChannelId(0), sine(100.0, 1.0, 0.0)), (ChannelId(1), sine(10e3, 1.0, 0.0))];
        let plan = arrange_horizontal(&cfg, &waves);
        assert_eq!(plan.trigger_channel, Some(ChannelId(0)));
        assert!((plan.acquisition_length - 5.0 / 0.5 / 10e3).abs() < 1e-15);
    }

    #[test]
    fn comparable_channels_use_slowest() {
        let cfg = EngineConfig::default();
        let waves = [(ChannelId(0), sine(2e3, 1.0, 0.0)), (ChannelId(1), sine(1e3, 1.0, 0.5))];
        let plan = arrange_horizontal(&cfg, &waves);
        assert_eq!(plan.trigger_channel, Some(ChannelId(1)));
        assert!((plan.acquisition_length - 10e-3).abs() < 1e-15);
        assert!((plan.trigger_level - 0.5).abs() < 1e-12);
    }

    #[test]
    fn local_properties_of_sine() {
        let sp = 1e-6;
        let samples: Vec<f64> = (0..10_000)
            .map(|i| 0.25 + (2.0 * PI * 1e3 * i as f64 * sp).sin())
            .collect();
        let frame = DataFrame::new(10e-3, sp).with_channel(ChannelId(0), samples);
        let w = local_wave_properties(&frame, ChannelId(0)).unwrap();
        assert!(!w.is_flatline);
        assert!((w.frequency - 1e3).abs() < 5.0, "{}", w.frequency);
        assert!((w.amplitude - 2.0).abs() < 1e-3);
        assert!((w.min_value + 0.75).abs() < 1e-3);
    }

    #[test]
    fn local_properties_of_flat_channel() {
        let frame = DataFrame::new(1e-3, 1e-6).with_channel(ChannelId(0), vec![0.3; 1000]);
        let w = local_wave_properties(&frame, ChannelId(0)).unwrap();
        assert!(w.is_flatline);
        assert_eq!(w.frequency, 0.0);
    }
}
