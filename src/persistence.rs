//! Session persistence: save and restore the coordinate state to/from JSON.
//!
//! Only the persisted subset of [`Context`] is mirrored. Restoring runs the
//! values back through the horizontal engine so a stale or hand-edited file
//! cannot break the model invariants.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::data::channels::ChannelId;
use crate::data::context::Context;
use crate::data::trigger::TriggerEdge;
use crate::error::Result;
use crate::events::EngineEvent;
use crate::horizontal::Horizontal;

// ---------- Serializable mirror types ----------

/// Serializable analog channel scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStateSerde {
    pub index: usize,
    pub enabled: bool,
    pub voltage_range: f64,
    pub voltage_offset: f64,
    pub probe_gain: f64,
}

/// Serializable trigger definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerStateSerde {
    pub channel: usize,
    pub level: f64,
    pub edge: TriggerEdge,
    pub holdoff: f64,
}

/// Serializable session state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStateSerde {
    /// Local time of capture, RFC 3339.
    #[serde(default)]
    pub saved_at: Option<String>,
    pub acquisition_length: f64,
    #[serde(default)]
    pub rolling: bool,
    pub viewport_offset: f64,
    pub viewport_timespan: f64,
    pub trigger: TriggerStateSerde,
    #[serde(default)]
    pub panorama_visible: bool,
    #[serde(default)]
    pub channels: Vec<ChannelStateSerde>,
}

impl From<&Context> for SessionStateSerde {
    fn from(ctx: &Context) -> Self {
        Self {
            saved_at: Some(chrono::Local::now().to_rfc3339()),
            acquisition_length: ctx.acquisition.length,
            rolling: ctx.acquisition.rolling,
            viewport_offset: ctx.viewport.offset,
            viewport_timespan: ctx.viewport.timespan,
            trigger: TriggerStateSerde {
                channel: ctx.trigger.channel.0,
                level: ctx.trigger.level,
                edge: ctx.trigger.edge,
                holdoff: ctx.trigger.holdoff,
            },
            panorama_visible: ctx.panorama.visible,
            channels: ctx
                .channels
                .iter()
                .map(|c| ChannelStateSerde {
                    index: c.id.0,
                    enabled: c.enabled,
                    voltage_range: c.voltage_range,
                    voltage_offset: c.voltage_offset,
                    probe_gain: c.probe_gain,
                })
                .collect(),
        }
    }
}

impl SessionStateSerde {
    /// Apply stored state to a context. Values are clamped like user input;
    /// notifications raised while clamping are returned.
    pub fn apply_to(self, ctx: &mut Context, config: &EngineConfig) -> Vec<EngineEvent> {
        for stored in &self.channels {
            let Some(ch) = ctx.channel_mut(ChannelId(stored.index)) else {
                continue;
            };
            ch.enabled = stored.enabled;
            if stored.probe_gain.is_finite() && stored.probe_gain > 0.0 {
                ch.probe_gain = stored.probe_gain;
            }
            ch.set_voltage_range(stored.voltage_range, &config.channel_limits, config.divisions);
            if stored.voltage_offset.is_finite() {
                ch.voltage_offset = stored.voltage_offset;
            }
        }
        if ctx.channel(ChannelId(self.trigger.channel)).is_some() {
            ctx.trigger.channel = ChannelId(self.trigger.channel);
        }
        if self.trigger.level.is_finite() {
            ctx.trigger.level = self.trigger.level;
        }
        ctx.trigger.edge = self.trigger.edge;

        let mut h = Horizontal::new(ctx, config);
        h.set_acquisition_length(self.acquisition_length, self.rolling);
        let length = h.context().acquisition.length;
        let center = self.viewport_offset + self.viewport_timespan / 2.0 - length / 2.0;
        h.set_viewport_center_and_timespan(center, self.viewport_timespan);
        h.set_panorama_visible(self.panorama_visible);
        h.set_trigger_holdoff(self.trigger.holdoff);
        h.into_events()
    }
}

// ---------- Public API ----------

/// Serialize the session state as pretty JSON.
pub fn state_to_json(state: &SessionStateSerde) -> Result<String> {
    Ok(serde_json::to_string_pretty(state)?)
}

/// Deserialize session state from JSON.
pub fn state_from_json(json: &str) -> Result<SessionStateSerde> {
    Ok(serde_json::from_str(json)?)
}

/// Save the session state to a JSON file at the given path.
pub fn save_state_to_path(state: &SessionStateSerde, path: &Path) -> Result<()> {
    let txt = state_to_json(state)?;
    std::fs::write(path, txt)?;
    Ok(())
}

/// Load the session state from a JSON file at the given path.
pub fn load_state_from_path(path: &Path) -> Result<SessionStateSerde> {
    let txt = std::fs::read_to_string(path)?;
    state_from_json(&txt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_then_restore() {
        let cfg = EngineConfig::default();
        let mut ctx = Context::new(&cfg, 2);
        ctx.acquisition.sample_period = 1e-7;
        Horizontal::new(&mut ctx, &cfg).set_viewport_center_and_timespan(1e-3, 2e-3);
        ctx.trigger.holdoff = -2e-3;
        ctx.channels[1].voltage_offset = 0.25;
        let state = SessionStateSerde::from(&ctx);
        assert!(state.saved_at.is_some());

        let mut restored = Context::new(&cfg, 2);
        restored.acquisition.sample_period = 1e-7;
        let events = state.apply_to(&mut restored, &cfg);
        assert!(events.is_empty());
        assert!((restored.viewport_center() - 1e-3).abs() < 1e-15);
        assert!((restored.viewport.timespan - 2e-3).abs() < 1e-15);
        assert_eq!(restored.trigger.holdoff, -2e-3);
        assert_eq!(restored.channels[1].voltage_offset, 0.25);
        assert!(restored.invariant_violations(&cfg).is_empty());
    }

    #[test]
    fn out_of_range_holdoff_is_clamped() {
        let cfg = EngineConfig::default();
        let mut ctx = Context::new(&cfg, 1);
        let mut state = SessionStateSerde::from(&ctx);
        state.trigger.holdoff = 1.0;
        state.apply_to(&mut ctx, &cfg);
        assert_eq!(ctx.trigger.holdoff, ctx.acquisition.half_length());
        assert!(ctx.panorama.visible);
    }

    #[test]
    fn missing_optional_fields_default() {
        let json = r#"{
            "acquisition_length": 0.002,
            "viewport_offset": 0.0,
            "viewport_timespan": 0.002,
            "trigger": { "channel": 0, "level": 0.1, "edge": "Falling", "holdoff": 0.0 }
        }"#;
        let state = state_from_json(json).unwrap();
        assert!(!state.rolling);
        assert!(state.channels.is_empty());
        assert_eq!(state.trigger.edge, TriggerEdge::Falling);
    }
}
