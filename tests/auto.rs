use panoscope::arrange::apply_arrange;
use panoscope::auto_trigger::AutoTriggerStep;
use panoscope::{
    ArrangeResult, AutoTrigger, ChannelId, Context, DataFrame, EngineConfig, TriggerEdge, WaveProperties,
};

fn square_frame(lo: f64, hi: f64) -> DataFrame {
    let samples = (0..100).map(|i| if i % 20 < 10 { lo } else { hi }).collect();
    DataFrame::new(1e-3, 1e-5).with_channel(ChannelId(0), samples)
}

fn converge(lows: &[f64]) -> (Vec<AutoTriggerStep>, Context) {
    let cfg = EngineConfig::default();
    let mut ctx = Context::new(&cfg, 1);
    ctx.trigger.edge = TriggerEdge::Falling;
    let mut auto = AutoTrigger::new();
    auto.start(&mut ctx, ChannelId(0), false);
    let steps = lows
        .iter()
        .map(|&lo| auto.on_frame(&mut ctx, &cfg, &square_frame(lo, lo + 2.0)))
        .collect();
    (steps, ctx)
}

#[test]
fn converges_on_mean_midpoint_after_ten_frames() {
    let lows: Vec<f64> = (0..10).map(f64::from).collect();
    let (steps, ctx) = converge(&lows);
    for (i, step) in steps[..9].iter().enumerate() {
        assert_eq!(step, &AutoTriggerStep::Sampled { collected: i + 1 });
    }
    // midpoints 1..=10
    assert_eq!(
        steps[9],
        AutoTriggerStep::Converged {
            channel: ChannelId(0),
            level: 5.5
        }
    );
    assert_eq!(ctx.trigger.level, 5.5);
    assert_eq!(ctx.trigger.edge, TriggerEdge::Rising);
    assert!(ctx.channels[0].visible);
}

#[test]
fn convergence_is_deterministic() {
    let lows = [0.3, -1.2, 4.0, 0.0, 2.5, -0.7, 1.1, 9.0, -3.3, 0.4];
    let (_, a) = converge(&lows);
    let (_, b) = converge(&lows);
    assert_eq!(a.trigger.level, b.trigger.level);
}

#[test]
fn no_frames_means_no_convergence() {
    let (steps, ctx) = converge(&[1.0, 2.0]);
    assert!(steps.iter().all(|s| matches!(s, AutoTriggerStep::Sampled { .. })));
    assert!(!ctx.channels[0].visible);
}

#[test]
fn flatline_arrange_centers_at_one_volt_per_division() {
    let cfg = EngineConfig::default();
    let mut ctx = Context::new(&cfg, 1);
    ctx.trigger.holdoff = 2e-3;
    let flat = WaveProperties {
        offset: 0.7,
        amplitude: 0.0,
        frequency: 0.0,
        is_flatline: true,
        min_value: 0.7,
    };
    let result = ArrangeResult {
        waves: vec![(ChannelId(0), flat)],
    };
    apply_arrange(&mut ctx, &cfg, &result);

    let ch = &ctx.channels[0];
    assert_eq!(ch.voltage_offset, 0.0);
    assert!((ch.voltage_range - 1.0 * cfg.divisions).abs() < 1e-12);
    assert_eq!(ctx.acquisition.length, cfg.flatline_acquisition_length);
    assert_eq!(ctx.trigger.holdoff, 0.0);
    assert_eq!(ctx.viewport_center(), 0.0);
    assert!((ctx.viewport.timespan - ctx.acquisition.length / 2.0).abs() < 1e-15);
    assert!(ctx.running);
    assert!(ctx.invariant_violations(&cfg).is_empty());
}

#[test]
fn second_flat_channel_still_gets_nudged() {
    let cfg = EngineConfig::default();
    let mut ctx = Context::new(&cfg, 2);
    let flat = WaveProperties {
        is_flatline: true,
        ..WaveProperties::default()
    };
    let result = ArrangeResult {
        waves: vec![(ChannelId(0), flat), (ChannelId(1), flat)],
    };
    apply_arrange(&mut ctx, &cfg, &result);
    assert_eq!(ctx.channels[0].voltage_offset, 0.0);
    assert!((ctx.channels[1].voltage_offset - 0.375).abs() < 1e-12);
}
