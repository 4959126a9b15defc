//! Widget instance: mounts the handlers, runs the per-frame loop and keeps
//! the container sized to the host viewport.

use std::time::Instant;

use crate::config::ViewerConfig;
use crate::diag::{safe_call, LogBuffer};
use crate::document::{
    Document, ElementId, CONTAINER, FRAME, MIXTURE_ICON, PROPELLER_ICON, TOGGLE_PROP_MIX,
};
use crate::error::{Result, ViewerError};
use crate::handlers::{polled_vars, EngineState, InputHandler};
use crate::layout::{LayoutMetrics, Viewport};
use crate::simvar::{SimVar, ValueSource};

/// Host primitive that runs one more tick before the next repaint.
pub trait FrameScheduler {
    fn request_frame(&mut self);
}

/// Notifications the host delivers between ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostEvent {
    /// Host viewport changed size.
    Resize(Viewport),
    /// Panel was popped out or docked. Geometry is not reliable yet.
    ToggleExternPanel,
    /// Prop/mix toggle finished building its markup.
    ToggleCreated,
    /// Prop/mix toggle was flipped by the user.
    ToggleValidate(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Detached: the loop ends here.
    Stopped,
    /// Sim not ready: nothing updated, next frame requested.
    Skipped,
    /// Handlers ran; `failed` of them errored.
    Updated { failed: usize },
}

struct Mounted {
    doc: Document,
    frame: ElementId,
    cont: ElementId,
    toggle: ElementId,
    handlers: Vec<InputHandler>,
}

pub struct InputViewer {
    config: ViewerConfig,
    logs: LogBuffer,
    mounted: Option<Mounted>,
    attached: bool,
    // a frame request is outstanding with the host
    frame_pending: bool,
    resize_due: Option<Instant>,
    metrics: Option<LayoutMetrics>,
    ticks: u64,
}

impl InputViewer {
    pub fn new(config: ViewerConfig, logs: LogBuffer) -> Self {
        Self {
            config,
            logs,
            mounted: None,
            attached: false,
            frame_pending: false,
            resize_due: None,
            metrics: None,
            ticks: 0,
        }
    }

    // -----------------------------
    // Lifecycle
    // -----------------------------

    /// Mounts `doc`, builds the handlers and starts the frame loop.
    ///
    /// A missing element is a markup defect: the viewer stays detached and
    /// the error goes back to the host.
    pub fn attach(
        &mut self,
        doc: Document,
        vp: &Viewport,
        sched: &mut dyn FrameScheduler,
    ) -> Result<()> {
        let mounted = Mounted {
            frame: doc.find(FRAME)?,
            cont: doc.find(CONTAINER)?,
            toggle: doc.find(TOGGLE_PROP_MIX)?,
            handlers: InputHandler::stock(&doc, &self.config.domains)?,
            doc,
        };
        self.logs.push(format!(
            "attached {} handlers to #{}",
            mounted.handlers.len(),
            mounted.doc.get(mounted.frame).id
        ));
        self.mounted = Some(mounted);
        self.attached = true;

        // a tick still pending from a previous attachment keeps the chain going
        if !self.frame_pending {
            self.frame_pending = true;
            sched.request_frame();
        }

        self.on_resize(vp);
        Ok(())
    }

    /// Ends the frame loop and drops the handlers. Later host events are ignored.
    pub fn detach(&mut self) {
        if !self.attached {
            return;
        }
        self.attached = false;
        self.mounted = None;
        self.resize_due = None;
        self.logs.push(format!("detached after {} ticks", self.ticks));
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    // -----------------------------
    // Frame loop
    // -----------------------------

    /// One frame. Called by the host once per granted frame request.
    pub fn tick(&mut self, src: &dyn ValueSource, sched: &mut dyn FrameScheduler) -> TickOutcome {
        self.frame_pending = false;
        if !self.attached {
            return TickOutcome::Stopped;
        }
        self.frame_pending = true;
        sched.request_frame();
        self.ticks += 1;

        if !src.is_ready() {
            return TickOutcome::Skipped;
        }
        let Some(m) = self.mounted.as_mut() else {
            return TickOutcome::Skipped;
        };

        let mut failed = 0;
        for h in m.handlers.iter_mut() {
            let what = format!("{}(#{})", h.kind(), m.doc.get(h.element()).id);
            if safe_call(&self.logs, &what, || h.update(src, &mut m.doc)).is_none() {
                failed += 1;
            }
        }
        TickOutcome::Updated { failed }
    }

    // -----------------------------
    // Host events
    // -----------------------------

    pub fn handle_event(&mut self, ev: HostEvent, now: Instant) {
        if !self.attached {
            self.logs.push(format!("ignored {ev:?} while detached"));
            return;
        }
        match ev {
            HostEvent::Resize(vp) => self.on_resize(&vp),
            HostEvent::ToggleExternPanel => self.queue_resize(now),
            HostEvent::ToggleCreated => self.create_toggle_icons(),
            HostEvent::ToggleValidate(on) => self.set_prop_mix_enabled(on),
        }
    }

    /// Re-measures after `resize_delay`. The host reports the new geometry
    /// only after it has announced the externalization change.
    pub fn queue_resize(&mut self, now: Instant) {
        self.resize_due = Some(now + self.config.resize_delay);
    }

    /// Runs a queued resize once it is due.
    pub fn poll_resize(&mut self, now: Instant, vp: &Viewport) {
        if matches!(self.resize_due, Some(due) if now >= due) {
            self.resize_due = None;
            self.on_resize(vp);
        }
    }

    pub fn on_resize(&mut self, vp: &Viewport) {
        let k = self.config.layout;
        let mounted = self.mounted.as_mut();
        let out = safe_call(&self.logs, "resize", || {
            let m = mounted.ok_or(ViewerError::NotAttached)?;
            let metrics = LayoutMetrics::compute(vp, &k);
            m.doc.style_mut(m.cont).layout = Some(metrics);
            Ok(metrics)
        });
        if out.is_some() {
            self.metrics = out;
        }
    }

    fn create_toggle_icons(&mut self) {
        let Some(m) = self.mounted.as_mut() else {
            return;
        };
        for (id, file) in [(MIXTURE_ICON, "mixture.svg"), (PROPELLER_ICON, "propeller.svg")] {
            m.doc.create_icon(m.toggle, id, &self.config.asset(file));
        }
    }

    fn set_prop_mix_enabled(&mut self, on: bool) {
        if let Some(engine) = self.engine_mut() {
            engine.is_prop_mix_enabled = on;
        }
    }

    // -----------------------------
    // Accessors
    // -----------------------------

    pub fn document(&self) -> Option<&Document> {
        self.mounted.as_ref().map(|m| &m.doc)
    }

    pub fn metrics(&self) -> Option<LayoutMetrics> {
        self.metrics
    }

    pub fn polled_vars(&self) -> Vec<SimVar> {
        self.mounted
            .as_ref()
            .map(|m| polled_vars(&m.handlers))
            .unwrap_or_default()
    }

    pub fn prop_mix_enabled(&self) -> bool {
        self.engine().is_some_and(|e| e.is_prop_mix_enabled)
    }

    pub fn engine_state(&self) -> Option<EngineState> {
        self.engine().map(|e| e.state())
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn engine(&self) -> Option<&crate::handlers::EngineHandler> {
        self.mounted.as_ref()?.handlers.iter().find_map(|h| match h {
            InputHandler::Engine(e) => Some(e),
            _ => None,
        })
    }

    fn engine_mut(&mut self) -> Option<&mut crate::handlers::EngineHandler> {
        self.mounted
            .as_mut()?
            .handlers
            .iter_mut()
            .find_map(|h| match h {
                InputHandler::Engine(e) => Some(e),
                _ => None,
            })
    }
}
