#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod config;
mod diag;
mod document;
mod error;
mod handlers;
mod layout;
mod render;
mod simconnect;
mod simvar;
mod viewer;

use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use egui::{Color32, RichText, Vec2};
#[cfg(debug_assertions)]
use egui_extras::{Column, TableBuilder};

use crate::config::ViewerConfig;
use crate::diag::LogBuffer;
use crate::document::Document;
use crate::layout::Viewport;
use crate::simconnect::{SimCmd, SimEvent, SimWorker};
use crate::simvar::{SimVarCache, ValueSource, TITLE};
use crate::viewer::{FrameScheduler, HostEvent, InputViewer};

const APP_TITLE: &str = "Input Viewer";

// -----------------------------
// Frame scheduling
// -----------------------------

/// Frame requests become egui repaints; the tick runs on the next update.
struct RepaintScheduler {
    ctx: egui::Context,
    requested: bool,
}

impl FrameScheduler for RepaintScheduler {
    fn request_frame(&mut self) {
        self.requested = true;
        self.ctx.request_repaint();
    }
}

// -----------------------------
// GUI state
// -----------------------------
#[derive(PartialEq, Eq, Clone, Copy)]
enum Tab {
    Main,
    #[cfg(debug_assertions)]
    Debug,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SimStatus {
    Disconnected,
    Connected,
    Live,
}

fn circle_indicator_colored(ui: &mut egui::Ui, color: Color32, filled: bool) {
    let h = ui.style().spacing.interact_size.y.max(14.0);
    let (rect, _) = ui.allocate_exact_size(Vec2::new(h, h), egui::Sense::hover());
    let center = rect.center();
    let r = (h * 0.36).max(5.0);
    let fill_color = if filled { color } else { Color32::TRANSPARENT };
    ui.painter().circle_filled(center, r, fill_color);
    ui.painter()
        .circle_stroke(center, r, egui::Stroke::new(1.4, color));
}

fn status_badge(ui: &mut egui::Ui, status: SimStatus) {
    let (text, color, filled) = match status {
        SimStatus::Disconnected => ("Disconnected", Color32::from_rgb(200, 60, 60), false),
        SimStatus::Connected => ("Connected", Color32::from_rgb(220, 180, 40), false),
        SimStatus::Live => ("Live", Color32::from_rgb(30, 180, 90), true),
    };
    ui.horizontal(|ui| {
        circle_indicator_colored(ui, color, filled);
        ui.colored_label(color, text);
    });
}

struct InputViewerApp {
    viewer: InputViewer,
    mount_error: Option<String>,
    scheduler: RepaintScheduler,
    cache: SimVarCache,

    connected: bool,
    aircraft_title: String,

    rx_sim: Receiver<SimEvent>,
    tx_sim: Sender<SimCmd>,
    worker: Option<thread::JoinHandle<()>>,

    last_viewport: Option<Viewport>,
    externalized: bool,
    toggle_created: bool,

    logs: LogBuffer,
    active_tab: Tab,
    #[cfg_attr(not(debug_assertions), allow(dead_code))]
    autoscroll: bool,
    #[cfg_attr(not(debug_assertions), allow(dead_code))]
    last_log_count: usize,
}

impl InputViewerApp {
    fn new(ctx: egui::Context, config: ViewerConfig, logs: LogBuffer) -> Self {
        let mut scheduler = RepaintScheduler {
            ctx: ctx.clone(),
            requested: false,
        };
        let vp = current_viewport(&ctx, false);

        let mut viewer = InputViewer::new(config.clone(), logs.clone());
        let mount_error = match viewer.attach(Document::input_viewer(), &vp, &mut scheduler) {
            Ok(()) => None,
            Err(e) => {
                logs.push(format!("attach failed: {e}"));
                Some(e.to_string())
            }
        };

        let cache = SimVarCache::default();
        let (tx_events, rx_sim) = unbounded::<SimEvent>();
        let (tx_sim, rx_cmds) = unbounded::<SimCmd>();
        let worker = SimWorker {
            vars: viewer.polled_vars(),
            cache: cache.clone(),
            events: tx_events,
            cmds: rx_cmds,
            logs: logs.clone(),
            client_name: config.client_name.clone(),
            reconnect_delay: config.reconnect_delay,
        }
        .spawn();

        Self {
            viewer,
            mount_error,
            scheduler,
            cache,
            connected: false,
            aircraft_title: String::new(),
            rx_sim,
            tx_sim,
            worker: Some(worker),
            last_viewport: None,
            externalized: false,
            toggle_created: false,
            logs,
            active_tab: Tab::Main,
            autoscroll: true,
            last_log_count: 0,
        }
    }

    fn status(&self) -> SimStatus {
        if !self.connected {
            SimStatus::Disconnected
        } else if self.cache.is_ready() {
            SimStatus::Live
        } else {
            SimStatus::Connected
        }
    }

    fn drain_sim_events(&mut self) {
        loop {
            match self.rx_sim.try_recv() {
                Ok(SimEvent::Connected) => self.connected = true,
                Ok(SimEvent::Disconnected) => self.connected = false,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    /// Host side of the resize and externalization notifications.
    fn track_viewport(&mut self, ctx: &egui::Context, now: Instant) {
        let vp = current_viewport(ctx, self.externalized);
        let resized = self.last_viewport.map_or(true, |last| {
            (last.width, last.height, last.screen_height) != (vp.width, vp.height, vp.screen_height)
        });
        self.last_viewport = Some(vp);
        if resized {
            self.viewer.handle_event(HostEvent::Resize(vp), now);
        }
        self.viewer.poll_resize(now, &vp);
    }

    fn set_externalized(&mut self, ctx: &egui::Context, on: bool) {
        self.externalized = on;
        let level = if on {
            egui::viewport::WindowLevel::AlwaysOnTop
        } else {
            egui::viewport::WindowLevel::Normal
        };
        ctx.send_viewport_cmd(egui::ViewportCommand::WindowLevel(level));
        self.viewer
            .handle_event(HostEvent::ToggleExternPanel, Instant::now());
        // make sure the delayed resize gets a frame to run in
        ctx.request_repaint_after(Duration::from_millis(1));
    }

    fn main_panel(&mut self, ui: &mut egui::Ui) {
        if let Some(err) = &self.mount_error {
            ui.colored_label(Color32::LIGHT_RED, format!("Panel failed to load: {err}"));
            return;
        }

        if self.externalized {
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Min), |ui| {
                if ui.small_button("Dock").clicked() {
                    self.set_externalized(ui.ctx(), false);
                }
            });
        }

        if !self.viewer.is_attached() {
            ui.label("Panel detached");
            return;
        }
        let Some(doc) = self.viewer.document() else {
            return;
        };
        let metrics = self.viewer.metrics();
        let rects = ui
            .vertical_centered(|ui| render::panel(ui, doc, metrics))
            .inner;

        let mut prop_mix = self.viewer.prop_mix_enabled();
        let toggle = ui
            .put(rects.toggle, egui::Checkbox::without_text(&mut prop_mix))
            .on_hover_text("Show propeller and mixture levers");
        if !self.toggle_created {
            self.toggle_created = true;
            self.viewer
                .handle_event(HostEvent::ToggleCreated, Instant::now());
        }
        if toggle.changed() {
            self.viewer
                .handle_event(HostEvent::ToggleValidate(prop_mix), Instant::now());
        }
    }

    #[cfg(debug_assertions)]
    fn debug_panel(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("Logs");
            ui.separator();
            ui.checkbox(&mut self.autoscroll, "Auto-scroll");
            ui.separator();
            ui.label(if self.viewer.is_attached() {
                "attached"
            } else {
                "detached"
            });
            ui.label(format!("ticks: {}", self.viewer.ticks()));
            if let Some(state) = self.viewer.engine_state() {
                ui.separator();
                ui.label(format!("engines: {}", state.engine_count));
            }
        });
        ui.separator();

        let logs = self.logs.snapshot();
        let row_height = 16.0;
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .stick_to_bottom(false)
            .show(ui, |ui| {
                TableBuilder::new(ui)
                    .striped(true)
                    .cell_layout(egui::Layout::left_to_right(egui::Align::Min))
                    .column(Column::remainder())
                    .body(|body| {
                        body.rows(row_height, logs.len(), |mut row| {
                            let i = row.index();
                            row.col(|ui| {
                                ui.label(RichText::new(&logs[i]).color(Color32::LIGHT_GRAY));
                            });
                        });
                    });

                if self.autoscroll && logs.len() > self.last_log_count {
                    let _ = ui.label("");
                    ui.scroll_to_cursor(Some(egui::Align::BOTTOM));
                }
                self.last_log_count = logs.len();
            });
    }
}

fn current_viewport(ctx: &egui::Context, externalized: bool) -> Viewport {
    let rect = ctx.screen_rect();
    let screen_height = ctx
        .input(|i| i.viewport().monitor_size)
        .map(|s| s.y as f64)
        .filter(|h| *h > 0.0)
        .unwrap_or(2160.0);
    Viewport {
        width: rect.width() as f64,
        height: rect.height() as f64,
        screen_height,
        externalized,
    }
}

impl eframe::App for InputViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        self.drain_sim_events();
        self.track_viewport(ctx, now);

        let snapshot = self.cache.snapshot();
        self.aircraft_title = snapshot.read_string(&TITLE).unwrap_or_default();
        if std::mem::take(&mut self.scheduler.requested) {
            self.viewer.tick(&snapshot, &mut self.scheduler);
        }

        if !self.externalized {
            egui::TopBottomPanel::top("top").show(ctx, |ui| {
                ui.horizontal_wrapped(|ui| {
                    status_badge(ui, self.status());

                    if !self.aircraft_title.is_empty() {
                        ui.separator();
                        ui.label(RichText::new(&self.aircraft_title).italics());
                    }

                    // Tabs (debug only)
                    #[cfg(debug_assertions)]
                    {
                        ui.separator();
                        ui.selectable_value(&mut self.active_tab, Tab::Main, "Main");
                        ui.selectable_value(&mut self.active_tab, Tab::Debug, "Debug");
                    }

                    ui.separator();
                    if ui.button("Pop out").clicked() {
                        self.set_externalized(ctx, true);
                    }
                });
            });
        }

        egui::CentralPanel::default().show(ctx, |ui| match self.active_tab {
            Tab::Main => self.main_panel(ui),
            #[cfg(debug_assertions)]
            Tab::Debug => self.debug_panel(ui),
        });
    }
}

impl Drop for InputViewerApp {
    fn drop(&mut self) {
        self.viewer.detach();
        let _ = self.tx_sim.send(SimCmd::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

// -----------------------------
// main
// -----------------------------
fn main() -> Result<()> {
    let config = ViewerConfig::default();
    let logs = LogBuffer::with_capacity(config.log_capacity);

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([420.0, 420.0])
            .with_min_inner_size([240.0, 240.0])
            .with_maximize_button(false),
        ..Default::default()
    };

    eframe::run_native(
        APP_TITLE,
        native_options,
        Box::new(move |cc| {
            Box::new(InputViewerApp::new(cc.egui_ctx.clone(), config, logs))
        }),
    )
    .map_err(|e| anyhow::anyhow!("eframe failed: {e}"))
}
