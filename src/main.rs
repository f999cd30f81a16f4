//! Demo: a simulated two-channel scope driven through the session.
//!
//! Usage: `panoscope-demo [config.yaml]`
//!
//! Mouse wheel over the main grid zooms around the pointer, dragging pans.
//! The panorama strip (when shown) zooms the viewport around the pointer.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use eframe::egui;
use egui_plot::{Line, Plot, VLine};
use log::{error, warn};

use panoscope::data::units::format_seconds;
use panoscope::device::spawn_device_probe;
use panoscope::{
    ChannelId, Command, CommandSender, DeviceHandle, EngineConfig, EngineEvent, EventFilter, EventKind,
    GridScalers, GridState, PanoscopeError, ScopeDevice, Session, SimulatedDevice,
};

const TIME_PER_DIVISION: [f64; 16] = [
    1e-6, 2e-6, 5e-6, 10e-6, 20e-6, 50e-6, 100e-6, 200e-6, 500e-6, 1e-3, 2e-3, 5e-3, 10e-3, 20e-3,
    50e-3, 100e-3,
];
const TOAST_SECS: f64 = 3.0;

/// Grid adapter the plot reads back each frame.
#[derive(Clone, Default)]
struct SharedGrid(Rc<RefCell<GridState>>);

impl GridScalers for SharedGrid {
    fn update_scalers_offsets(
        &mut self,
        horizontal_range: f64,
        horizontal_origin_offset: f64,
        vertical_range: f64,
        vertical_offset: f64,
        reference_channel: ChannelId,
    ) {
        self.0.borrow_mut().update_scalers_offsets(
            horizontal_range,
            horizontal_origin_offset,
            vertical_range,
            vertical_offset,
            reference_channel,
        );
    }

    fn update_cursors(&mut self, holdoff: f64, viewport_center: f64) {
        self.0.borrow_mut().update_cursors(holdoff, viewport_center);
    }
}

struct DemoApp {
    session: Session,
    sender: CommandSender,
    grid: SharedGrid,
    notifications: Receiver<EngineEvent>,
    toasts: VecDeque<(String, Instant)>,
}

impl DemoApp {
    fn new(mut session: Session) -> Self {
        let grid = SharedGrid::default();
        session.set_grid(Box::new(grid.clone()));
        let notifications = session.events().subscribe(EventFilter::only(
            EventKind::NOTIFICATIONS | EventKind::DEVICE_ERROR | EventKind::ARRANGE_COMPLETE,
        ));
        Self {
            sender: session.sender(),
            session,
            grid,
            notifications,
            toasts: VecDeque::new(),
        }
    }

    fn post(&self, command: Command) {
        if let Err(e) = self.sender.send(command) {
            warn!("dropping command: {e}");
        }
    }

    fn collect_toasts(&mut self) {
        while let Ok(evt) = self.notifications.try_recv() {
            if let Some(msg) = evt.message {
                self.toasts.push_back((msg, Instant::now()));
            }
        }
        while self
            .toasts
            .front()
            .is_some_and(|(_, t)| t.elapsed().as_secs_f64() > TOAST_SECS)
        {
            self.toasts.pop_front();
        }
    }

    fn controls(&mut self, ui: &mut egui::Ui) {
        let ctx = self.session.context();
        let running = ctx.running;
        let rolling = ctx.acquisition.rolling;
        let length = ctx.acquisition.length;
        let panorama = ctx.panorama.visible;
        let tdiv = ctx.viewport.timespan / self.session.config().divisions;

        ui.horizontal(|ui| {
            if ui.button(if running { "Stop" } else { "Run" }).clicked() {
                self.post(Command::SetRunning(!running));
            }
            if ui.button("Auto").clicked() {
                self.post(Command::AutoEverything {
                    channel: ChannelId(0),
                    also_arrange: true,
                });
            }
            if ui.button("Arrange").clicked() {
                self.post(Command::StartAutoArrange);
            }
            if ui.button("Fit").clicked() {
                self.post(Command::MinimizeAcquisitionLength { timespan: f64::NAN });
            }
            ui.separator();
            egui::ComboBox::from_label("time/div")
                .selected_text(format_seconds(tdiv))
                .show_ui(ui, |ui| {
                    for spd in TIME_PER_DIVISION {
                        if ui.selectable_label(false, format_seconds(spd)).clicked() {
                            self.post(Command::SetTimePerDivision(spd));
                        }
                    }
                });
            let mut roll = rolling;
            if ui.checkbox(&mut roll, "Roll").changed() {
                self.post(Command::SetAcquisitionLength {
                    time: length,
                    rolling: roll,
                });
            }
            let mut pano = panorama;
            if ui.checkbox(&mut pano, "Panorama").changed() {
                self.post(Command::SetPanoramaVisible(pano));
            }
            ui.separator();
            ui.label(format!(
                "length {}  |  {}",
                format_seconds(length),
                self.session.context().trigger.describe()
            ));
            if self.session.is_arranging() {
                ui.spinner();
            }
        });
    }

    /// Samples of every visible channel, in seconds from the trigger and
    /// volts scaled to grid divisions.
    fn traces(&self, whole_buffer: bool) -> Vec<(String, Vec<[f64; 2]>)> {
        let ctx = self.session.context();
        let divisions = self.session.config().divisions;
        let Some(frame) = self.session.last_frame() else {
            return Vec::new();
        };
        let (start, end) = if whole_buffer {
            (0.0, frame.acquisition_length)
        } else {
            (ctx.viewport.offset, ctx.viewport.end())
        };
        let origin = frame.acquisition_length / 2.0 + ctx.trigger.holdoff;
        ctx.channels
            .iter()
            .filter(|c| c.enabled && c.visible)
            .filter_map(|ch| {
                let samples = frame.samples(ch.id)?;
                let per_div = ch.volts_per_division(divisions);
                let pts = samples
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i as f64 * frame.sample_period, v))
                    .filter(|(t, _)| *t >= start && *t <= end)
                    .map(|(t, v)| [t - origin, (v + ch.voltage_offset) / per_div])
                    .collect();
                Some((ch.id.to_string(), pts))
            })
            .collect()
    }

    fn main_grid(&mut self, ui: &mut egui::Ui) {
        let grid = *self.grid.0.borrow();
        let ctx = self.session.context();
        let half_divs = self.session.config().divisions / 2.0;
        let running = ctx.running;
        let panorama_hidden = !ctx.panorama.visible;
        let center = grid.horizontal_origin_offset;
        let span = grid.horizontal_range;
        let traces = self.traces(false);

        let mut gesture = None;
        Plot::new("main_grid")
            .allow_drag(false)
            .allow_zoom(false)
            .allow_scroll(false)
            .allow_boxed_zoom(false)
            .x_axis_formatter(|x, _range| format_seconds(x.value))
            .show(ui, |plot_ui| {
                plot_ui.set_plot_bounds_x(center - span / 2.0..=center + span / 2.0);
                plot_ui.set_plot_bounds_y(-half_divs..=half_divs);
                for (name, pts) in traces {
                    plot_ui.line(Line::new(name, pts));
                }
                plot_ui.vline(VLine::new("trigger", 0.0));

                let resp = plot_ui.response();
                let width = resp.rect.width() as f64;
                let scroll = resp.ctx.input(|i| i.smooth_scroll_delta.y) as f64;
                let drag = resp.drag_delta().x as f64;
                let anchor = plot_ui
                    .pointer_coordinate()
                    .map(|p| (p.x - center) / span)
                    .unwrap_or(f64::NAN);
                if resp.hovered() && scroll != 0.0 {
                    gesture = Some((1.0 - scroll * 0.002, 0.0, anchor));
                } else if drag != 0.0 && width > 0.0 {
                    gesture = Some((1.0, drag / width, 0.0));
                }
            });

        if let Some((zoom, pan, anchor)) = gesture {
            if running && panorama_hidden {
                self.post(Command::ZoomPanoramaFromGrid { zoom, pan, anchor });
            } else {
                self.post(Command::ZoomViewportFromGrid { zoom, pan, anchor });
            }
        }
    }

    fn panorama_strip(&mut self, ui: &mut egui::Ui) {
        let ctx = self.session.context();
        let length = ctx.acquisition.length;
        let origin = length / 2.0 + ctx.trigger.holdoff;
        let (left, right) = (ctx.panorama.cover_left, ctx.panorama.cover_right);
        let half_divs = self.session.config().divisions / 2.0;
        let traces = self.traces(true);

        let mut gesture = None;
        Plot::new("panorama")
            .height(120.0)
            .allow_drag(false)
            .allow_zoom(false)
            .allow_scroll(false)
            .allow_boxed_zoom(false)
            .show_axes([false, false])
            .show(ui, |plot_ui| {
                plot_ui.set_plot_bounds_x(-origin..=length - origin);
                plot_ui.set_plot_bounds_y(-half_divs..=half_divs);
                for (name, pts) in traces {
                    plot_ui.line(Line::new(name, pts));
                }
                plot_ui.vline(VLine::new("cover", left * length - origin));
                plot_ui.vline(VLine::new("cover", right * length - origin));

                let resp = plot_ui.response();
                let scroll = resp.ctx.input(|i| i.smooth_scroll_delta.y) as f64;
                if resp.hovered() && scroll != 0.0 {
                    let center = plot_ui
                        .pointer_coordinate()
                        .map(|p| (p.x + origin) / length)
                        .unwrap_or(f64::NAN);
                    gesture = Some((1.0 - scroll * 0.002, center));
                }
            });

        if let Some((zoom, center)) = gesture {
            self.post(Command::ZoomViewportFromPanorama {
                zoom,
                pan: 0.0,
                center,
            });
        }
    }
}

impl eframe::App for DemoApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Non-UI work first
        self.session.tick();
        self.collect_toasts();

        egui::TopBottomPanel::top("controls").show(ctx, |ui| self.controls(ui));
        egui::TopBottomPanel::bottom("toasts").show(ctx, |ui| {
            for (msg, _) in &self.toasts {
                ui.label(msg);
            }
        });
        if self.session.context().panorama.visible {
            egui::TopBottomPanel::bottom("panorama").show(ctx, |ui| self.panorama_strip(ui));
        }
        egui::CentralPanel::default().show(ctx, |ui| self.main_grid(ui));
        ctx.request_repaint_after(Duration::from_millis(16));
    }
}

/// Poll the active device and forward frames to the session.
fn spawn_frame_pump(device: DeviceHandle, sender: CommandSender) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("frame-pump".into())
        .spawn(move || loop {
            std::thread::sleep(Duration::from_millis(30));
            match device.with(|d| d.poll_frame()) {
                Ok(Some(frame)) => {
                    if sender.send(Command::NewData(frame)).is_err() {
                        return;
                    }
                }
                Ok(None) | Err(PanoscopeError::DeviceDisconnected) => {}
                Err(e) => warn!("polling device failed: {e}"),
            }
        })?;
    Ok(())
}

fn main() -> eframe::Result<()> {
    env_logger::init();

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => EngineConfig::load_yaml(&path).unwrap_or_else(|e| {
            error!("{}: {e}; using defaults", path.display());
            EngineConfig::default()
        }),
        None => EngineConfig::default(),
    };

    let session = Session::new(config, 2);
    let sender = session.sender();
    let probe = || -> panoscope::Result<Box<dyn ScopeDevice>> {
        Ok(Box::new(SimulatedDevice::new("simulated")))
    };
    if let Err(e) = spawn_device_probe(sender.clone(), probe) {
        error!("device probe thread: {e}");
    }
    if let Err(e) = spawn_frame_pump(session.device().clone(), sender) {
        error!("frame pump thread: {e}");
    }

    let app = DemoApp::new(session);
    let opts = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size(egui::vec2(1200.0, 800.0)),
        ..Default::default()
    };
    eframe::run_native("Panoscope", opts, Box::new(|_cc| Ok(Box::new(app))))
}
