//! Panoscope crate root: re-exports and module wiring.
//!
//! An oscilloscope coordinate engine. It keeps the acquisition buffer, the
//! zoomed viewport, the trigger holdoff and the panorama overview consistent
//! under gestures and hardware changes, and automates trigger and scale
//! selection:
//! - `horizontal`: the coordinate transforms
//! - `auto_trigger`: trigger level convergence over a few frames
//! - `arrange`: vertical/horizontal auto arrange, in hardware or from a frame
//! - `queue`: the command inbox drained once per tick
//! - `session`: the single owner of all model state
//! - `device`: the hardware abstraction and a simulated device

pub mod arrange;
pub mod auto_trigger;
pub mod config;
pub mod data;
pub mod device;
pub mod error;
pub mod events;
pub mod grid;
pub mod horizontal;
pub mod persistence;
pub mod queue;
pub mod session;

// Public re-exports for a compact external API
pub use arrange::{ArrangeResult, HorizontalPlan};
pub use auto_trigger::{AutoTrigger, AutoTriggerState};
pub use config::EngineConfig;
pub use data::channels::ChannelId;
pub use data::context::Context;
pub use data::trigger::TriggerEdge;
pub use device::{DataFrame, DeviceHandle, ScopeDevice, SimWaveform, SimulatedDevice, WaveProperties};
pub use error::{PanoscopeError, Result};
pub use events::{EngineEvent, EventController, EventFilter, EventKind};
pub use grid::{GridScalers, GridState};
pub use horizontal::Horizontal;
pub use queue::{Command, CommandQueue, CommandSender};
pub use session::Session;
