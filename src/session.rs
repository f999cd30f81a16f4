//! The session owns every coordinate model and is their only writer.
//!
//! Everything else talks to it through [`Command`]s. Once per frame the host
//! calls [`Session::tick`], which applies the pending batch, pushes the
//! resulting settings to the device, publishes events and refreshes the grid.

use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};

use crate::arrange::{apply_arrange, spawn_auto_arrange, ArrangeResult};
use crate::auto_trigger::{AutoTrigger, AutoTriggerStep};
use crate::config::EngineConfig;
use crate::data::channels::{AnalogChannel, ChannelId};
use crate::data::context::{Context, HardwareLimits};
use crate::data::trigger::TriggerEdge;
use crate::device::{DataFrame, DeviceHandle, ScopeDevice};
use crate::error::{PanoscopeError, Result};
use crate::events::{EngineEvent, EventController, EventKind, TriggerMeta, ViewMeta};
use crate::grid::{notify_grid, GridScalers};
use crate::horizontal::Horizontal;
use crate::persistence::{load_state_from_path, save_state_to_path, SessionStateSerde};
use crate::queue::{Command, CommandQueue, CommandSender};

/// What the device needs to know; compared before and after each command.
#[derive(Clone, Copy, Debug, PartialEq)]
struct DeviceView {
    length: f64,
    rolling: bool,
    offset: f64,
    timespan: f64,
    holdoff: f64,
    trigger_channel: ChannelId,
    trigger_level: f64,
    trigger_edge: TriggerEdge,
    running: bool,
}

impl DeviceView {
    fn of(ctx: &Context) -> Self {
        Self {
            length: ctx.acquisition.length,
            rolling: ctx.acquisition.rolling,
            offset: ctx.viewport.offset,
            timespan: ctx.viewport.timespan,
            holdoff: ctx.trigger.holdoff,
            trigger_channel: ctx.trigger.channel,
            trigger_level: ctx.trigger.level,
            trigger_edge: ctx.trigger.edge,
            running: ctx.running,
        }
    }

    fn meta(&self) -> ViewMeta {
        ViewMeta {
            acquisition_length: self.length,
            viewport_offset: self.offset,
            viewport_timespan: self.timespan,
            holdoff: self.holdoff,
        }
    }
}

struct Observed {
    view: DeviceView,
    channels: Vec<AnalogChannel>,
}

pub struct Session {
    ctx: Context,
    config: EngineConfig,
    device: DeviceHandle,
    grid: Option<Box<dyn GridScalers>>,
    queue: CommandQueue,
    events: EventController,
    auto_trigger: AutoTrigger,
    arranging: bool,
    /// Settings changed while the arrange worker owned the device.
    sync_deferred: bool,
    last_frame: Option<DataFrame>,
}

impl Session {
    pub fn new(config: EngineConfig, channel_count: usize) -> Self {
        let ctx = Context::new(&config, channel_count);
        let queue = CommandQueue::new(Duration::from_millis(config.blocking_poll_ms));
        Self {
            ctx,
            config,
            device: DeviceHandle::disconnected(),
            grid: None,
            queue,
            events: EventController::new(),
            auto_trigger: AutoTrigger::new(),
            arranging: false,
            sync_deferred: false,
            last_frame: None,
        }
    }

    pub fn set_grid(&mut self, grid: Box<dyn GridScalers>) {
        self.grid = Some(grid);
        self.refresh_grid();
    }

    pub fn sender(&self) -> CommandSender {
        self.queue.sender()
    }

    pub fn events(&self) -> &EventController {
        &self.events
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    pub fn auto_trigger(&self) -> &AutoTrigger {
        &self.auto_trigger
    }

    pub fn is_arranging(&self) -> bool {
        self.arranging
    }

    pub fn last_frame(&self) -> Option<&DataFrame> {
        self.last_frame.as_ref()
    }

    /// Install a device right away instead of going through the queue.
    pub fn connect(&mut self, device: Box<dyn ScopeDevice>) {
        self.apply(Command::DeviceConnected(device));
    }

    /// Apply every command pending at the start of the tick. Returns the
    /// number applied.
    pub fn tick(&mut self) -> usize {
        let batch = self.queue.take_pending();
        let count = batch.len();
        for item in batch {
            self.apply(item.command);
            self.queue.complete(item.ticket);
        }
        count
    }

    /// Apply one command synchronously.
    pub fn apply(&mut self, command: Command) {
        debug!("apply {}", command.label());
        let before = self.observe();
        self.dispatch(command);
        self.publish(before);
    }

    pub fn save_state(&self, path: &Path) -> Result<()> {
        save_state_to_path(&SessionStateSerde::from(&self.ctx), path)?;
        info!("session state saved to {}", path.display());
        Ok(())
    }

    pub fn restore_state(&mut self, path: &Path) -> Result<()> {
        let state = load_state_from_path(path)?;
        let before = self.observe();
        let events = state.apply_to(&mut self.ctx, &self.config);
        self.emit_all(events);
        self.publish(before);
        info!("session state restored from {}", path.display());
        Ok(())
    }

    fn dispatch(&mut self, command: Command) {
        match command {
            Command::ZoomViewportFromGrid { zoom, pan, anchor } => {
                self.horizontal(|h| h.pan_zoom_viewport_from_grid_pinch(zoom, pan, anchor))
            }
            Command::ZoomPanoramaFromGrid { zoom, pan, anchor } => {
                self.horizontal(|h| h.pan_zoom_panorama_from_grid_pinch(zoom, pan, anchor))
            }
            Command::ZoomViewportFromPanorama { zoom, pan, center } => {
                self.horizontal(|h| h.pan_zoom_viewport_from_panorama(zoom, pan, center))
            }
            Command::ZoomPanoramaFromPanorama { zoom, pan, center } => {
                self.horizontal(|h| h.pan_zoom_panorama_from_panorama(zoom, pan, center))
            }
            Command::SetTimePerDivision(spd) => self.horizontal(|h| h.set_tdiv_absolute(spd)),
            Command::SetAcquisitionLength { time, rolling } => {
                self.horizontal(|h| h.set_acquisition_length(time, rolling))
            }
            Command::SetViewport { center, timespan } => {
                self.horizontal(|h| h.set_viewport_center_and_timespan(center, timespan))
            }
            Command::SetHoldoff(holdoff) => self.horizontal(|h| h.set_trigger_holdoff(holdoff)),
            Command::MinimizeAcquisitionLength { timespan } => {
                self.horizontal(|h| h.minimize_acquisition_length_to_fit_viewport(timespan))
            }
            Command::SetPanoramaVisible(visible) => {
                self.horizontal(|h| h.set_panorama_visible(visible))
            }
            Command::SetRunning(running) => self.ctx.running = running,
            Command::AutoEverything {
                channel,
                also_arrange,
            } => self.auto_trigger.start(&mut self.ctx, channel, also_arrange),
            Command::CancelAutoTrigger => self.auto_trigger.cancel(&mut self.ctx),
            Command::StartAutoArrange => self.start_auto_arrange(),
            Command::ArrangeProgress(fraction) => {
                let mut evt = EngineEvent::new(EventKind::ARRANGE_PROGRESS);
                evt.progress = Some(fraction.clamp(0.0, 1.0));
                self.events.emit(evt);
            }
            Command::ArrangeComplete(result) => {
                self.arranging = false;
                self.finish_arrange(&result);
            }
            Command::NewData(frame) => self.on_new_data(frame),
            Command::DeviceConnected(device) => self.on_device_connected(device),
            Command::DeviceFailed(message) => {
                warn!("device error: {message}");
                self.events
                    .emit(EngineEvent::notification(EventKind::DEVICE_ERROR, message));
            }
        }
    }

    fn horizontal(&mut self, op: impl FnOnce(&mut Horizontal<'_>)) {
        let mut h = Horizontal::new(&mut self.ctx, &self.config);
        op(&mut h);
        let events = h.into_events();
        self.emit_all(events);
    }

    fn emit_all(&self, events: Vec<EngineEvent>) {
        for evt in events {
            if let Some(msg) = &evt.message {
                info!("{msg}");
            }
            self.events.emit(evt);
        }
    }

    fn on_new_data(&mut self, frame: DataFrame) {
        self.horizontal(|h| h.apply_hardware_buffer(frame.acquisition_length, frame.sample_period));
        match self.auto_trigger.on_frame(&mut self.ctx, &self.config, &frame) {
            AutoTriggerStep::Converged { channel, level } => {
                let mut evt = EngineEvent::new(EventKind::AUTO_TRIGGER_CONVERGED);
                evt.trigger = Some(TriggerMeta {
                    channel,
                    level,
                    edge: TriggerEdge::Rising,
                });
                self.events.emit(evt);
            }
            AutoTriggerStep::Arrange(result) => self.finish_arrange(&result),
            AutoTriggerStep::Ignored | AutoTriggerStep::Sampled { .. } => {}
        }
        self.last_frame = Some(frame);
    }

    fn start_auto_arrange(&mut self) {
        if !self.ctx.running {
            info!("auto arrange needs a running acquisition");
            return;
        }
        if self.arranging {
            debug!("auto arrange already in progress");
            return;
        }
        let channels: Vec<ChannelId> = self.ctx.enabled_channels().map(|c| c.id).collect();
        // measurements need the device to ourselves
        self.ctx.running = false;
        if let Err(e) = self.device.with(|d| d.set_running(false)) {
            warn!("stopping acquisition for auto arrange failed: {e}");
        }
        match spawn_auto_arrange(self.device.clone(), channels, self.queue.sender()) {
            Ok(_) => self.arranging = true,
            Err(e) => {
                warn!("spawning auto arrange worker failed: {e}");
                self.ctx.running = true;
            }
        }
    }

    fn finish_arrange(&mut self, result: &ArrangeResult) {
        let events = apply_arrange(&mut self.ctx, &self.config, result);
        self.emit_all(events);
        self.events.emit(EngineEvent::notification(
            EventKind::ARRANGE_COMPLETE,
            format!("Arranged {} channel(s)", result.waves.len()),
        ));
    }

    fn on_device_connected(&mut self, device: Box<dyn ScopeDevice>) {
        let limits = HardwareLimits {
            max_acquisition_length: device.max_acquisition_length(),
            min_sample_period: device.min_sample_period(),
        };
        let (length, sample_period) = (device.acquisition_length(), device.sample_period());
        let name = device.name().to_string();
        self.device.replace(device);
        self.auto_trigger.cancel(&mut self.ctx);
        self.arranging = false;
        self.last_frame = None;
        self.ctx.reset_for_device(limits, length, sample_period);
        self.horizontal(|h| h.apply_hardware_buffer(length, sample_period));
        info!("connected to {name}");
        self.events.emit(EngineEvent::notification(
            EventKind::DEVICE_CONNECTED,
            format!("Connected to {name}"),
        ));
    }

    fn observe(&self) -> Observed {
        Observed {
            view: DeviceView::of(&self.ctx),
            channels: self.ctx.channels.clone(),
        }
    }

    fn publish(&mut self, before: Observed) {
        let after = DeviceView::of(&self.ctx);
        let view_changed = after != before.view;
        if view_changed {
            let mut kinds = EventKind::VIEW_CHANGED;
            if after.length != before.view.length {
                kinds |= EventKind::ACQUISITION_LENGTH_CHANGED;
            }
            self.events.emit(EngineEvent::new(kinds).with_view(after.meta()));
        }
        if view_changed || self.sync_deferred {
            if self.arranging {
                // the worker holds the device lock for whole measurements
                debug!("device busy arranging, sync deferred");
                self.sync_deferred = true;
            } else {
                self.sync_deferred = false;
                self.sync_device(&after);
            }
        }
        if view_changed || self.ctx.channels != before.channels {
            self.refresh_grid();
        }
    }

    fn sync_device(&self, view: &DeviceView) {
        let result = self.device.with(|d| {
            d.set_acquisition_length(view.length)?;
            d.set_rolling(view.rolling)?;
            d.set_view_port(view.offset, view.timespan)?;
            d.set_trigger_holdoff(view.holdoff)?;
            d.set_trigger(view.trigger_channel, view.trigger_level, view.trigger_edge)?;
            d.commit_settings()?;
            if d.running() != view.running {
                d.set_running(view.running)?;
            }
            Ok(())
        });
        match result {
            Ok(()) => {}
            Err(PanoscopeError::DeviceDisconnected) => debug!("no device to sync"),
            Err(e) => {
                warn!("device sync failed: {e}");
                self.events.emit(EngineEvent::notification(
                    EventKind::DEVICE_ERROR,
                    e.to_string(),
                ));
            }
        }
    }

    fn refresh_grid(&mut self) {
        if let Some(grid) = self.grid.as_mut() {
            notify_grid(grid.as_mut(), &self.ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SimulatedDevice;

    #[test]
    fn device_connect_resets_context() {
        let mut session = Session::new(EngineConfig::default(), 2);
        let dev = SimulatedDevice::new("sim").with_limits(0.5, 1e-9);
        session.connect(Box::new(dev));
        assert!(session.device().is_connected());
        assert_eq!(session.context().hardware.max_acquisition_length, 0.5);
        assert_eq!(session.context().acquisition.length, 10e-3);
    }

    #[test]
    fn holdoff_change_publishes_view() {
        let mut session = Session::new(EngineConfig::default(), 2);
        session.connect(Box::new(SimulatedDevice::new("sim")));
        let rx = session.events().subscribe(crate::events::EventFilter::only(EventKind::VIEW_CHANGED));
        session.apply(Command::SetHoldoff(1e-3));
        let evt = rx.try_recv().unwrap();
        assert_eq!(evt.view.unwrap().holdoff, 1e-3);
        assert!(!evt.kinds.contains(EventKind::ACQUISITION_LENGTH_CHANGED));
        // unchanged state publishes nothing
        session.apply(Command::SetHoldoff(1e-3));
        assert!(rx.try_recv().is_err());
    }
}
