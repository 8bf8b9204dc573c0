use super::scheduler::FrameScheduler;
use super::stage::{ListenerId, Stage};
use crate::fractal_config::{ConfigStore, LiveUniforms};
use crate::kernels::{KernelDescriptor, UniformSet};
use crate::spectrum::{AudioLevels, SpectrumAnalyzer};
use log::{info, warn};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Nominal frame step in seconds; wall-clock frame timing is ignored.
pub const FRAME_STEP: f32 = 0.016;

/// Time, rotation and zoom state carried from frame to frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionAccumulator {
    pub time: f32,
    pub rotation: f32,
    pub zoom_phase: f32,
}

impl MotionAccumulator {
    /// One frame: scales `levels` by the configured strengths, steps the
    /// accumulators and writes the per-frame uniforms.
    pub fn advance(&mut self, levels: AudioLevels, u: &mut UniformSet) {
        let bass = levels.bass * u.bass_strength;
        let treble = levels.treble * u.treble_strength;

        self.time += FRAME_STEP;
        self.rotation += FRAME_STEP * u.rotation_speed * (0.2 + treble);
        self.zoom_phase += FRAME_STEP * (1.0 + 2.0 * bass);

        u.time = self.time;
        u.bass = bass;
        u.treble = treble;
        u.rotation = self.rotation;
        u.zoom = 1.0 + u.zoom_pulse * (0.5 * self.zoom_phase.sin() + 0.5 * bass);
    }
}

/// Live resources of one visualization. Dropped once the cleanup has run
/// and the last scheduled frame has fired.
pub(crate) struct RenderSession {
    pub(crate) container_id: String,
    pub(crate) label: String,
    pub(crate) kernel: Option<&'static KernelDescriptor>,
    pub(crate) stage: Rc<Stage>,
    pub(crate) scheduler: Rc<dyn FrameScheduler>,
    pub(crate) config: Rc<RefCell<ConfigStore>>,
    pub(crate) uniforms: LiveUniforms,
    pub(crate) analyzer: RefCell<Option<SpectrumAnalyzer>>,
    pub(crate) levels: Cell<AudioLevels>,
    pub(crate) motion: RefCell<MotionAccumulator>,
    pub(crate) resize_listener: Cell<Option<ListenerId>>,
    pub(crate) running: Cell<bool>,
    pub(crate) released: Cell<bool>,
    pub(crate) frames: Cell<u64>,
}

impl RenderSession {
    pub(crate) fn attach_resize_listener(self: &Rc<Self>) {
        let weak: Weak<Self> = Rc::downgrade(self);
        let id = self.stage.add_resize_listener(Rc::new(move || {
            if let Some(session) = weak.upgrade() {
                session.sync_size();
            }
        }));
        self.resize_listener.set(Some(id));
    }

    pub(crate) fn start(self: &Rc<Self>) {
        self.running.set(true);
        Self::schedule_next(self);
    }

    fn schedule_next(session: &Rc<Self>) {
        let s = Rc::clone(session);
        session.scheduler.request_frame(Box::new(move |_ts| {
            if !s.running.get() {
                return;
            }
            s.frame();
            if s.running.get() {
                Self::schedule_next(&s);
            }
        }));
    }

    fn frame(&self) {
        let Some(levels) = self.analyzer.borrow_mut().as_mut().map(SpectrumAnalyzer::sample) else {
            return;
        };
        self.levels.set(levels);
        let uniforms = {
            let mut u = self.uniforms.borrow_mut();
            self.motion.borrow_mut().advance(levels, &mut u);
            *u
        };
        self.stage
            .with_surface_mut(&self.container_id, |s| s.draw(self.kernel, &uniforms));
        self.frames.set(self.frames.get() + 1);
    }

    fn sync_size(&self) {
        if !self.running.get() {
            return;
        }
        let Some((w, h)) = self.stage.container_size(&self.container_id) else {
            return;
        };
        self.stage
            .with_surface_mut(&self.container_id, |s| s.resize(w, h));
        self.uniforms.borrow_mut().set_resolution(w, h);
    }

    /// Stops the loop and releases everything. Later calls do nothing.
    pub(crate) fn teardown(&self) {
        if self.released.replace(true) {
            return;
        }
        self.running.set(false);

        if let Some(id) = self.resize_listener.take() {
            self.stage.remove_resize_listener(id);
        }
        if let Err(err) = self.stage.dispose_surface(&self.container_id) {
            warn!("releasing surface of {:?}: {err}", self.container_id);
        }
        self.stage.clear_container(&self.container_id);
        self.config.borrow_mut().unbind(&self.uniforms);
        // Drops the analysis tap; the route itself stays connected.
        drop(self.analyzer.take());

        info!(
            "stopped {} visualizer in {:?} after {} frames",
            self.label,
            self.container_id,
            self.frames.get()
        );
    }
}

/// Stops the session it was returned for. Safe to run any number of times.
#[derive(Clone)]
pub struct Cleanup {
    session: Option<Rc<RenderSession>>,
}

impl Cleanup {
    pub(crate) fn for_session(session: Rc<RenderSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    /// The cleanup returned when no session could be started.
    pub fn noop() -> Self {
        Self { session: None }
    }

    pub fn run(&self) {
        if let Some(session) = &self.session {
            session.teardown();
        }
    }

    pub fn is_noop(&self) -> bool {
        self.session.is_none()
    }

    pub fn is_running(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.running.get())
    }

    pub fn is_released(&self) -> bool {
        self.session.as_ref().is_none_or(|s| s.released.get())
    }

    pub fn frames_rendered(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.frames.get())
    }

    pub fn container_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.container_id.as_str())
    }

    /// Whether the session still holds its analysis tap.
    pub fn has_analyser(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.analyzer.borrow().is_some())
    }

    pub fn kernel_name(&self) -> Option<&'static str> {
        self.session.as_ref().and_then(|s| s.kernel).map(|k| k.name)
    }

    pub fn levels(&self) -> AudioLevels {
        self.session.as_ref().map(|s| s.levels.get()).unwrap_or_default()
    }
}

impl std::fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cleanup")
            .field("container", &self.container_id())
            .field("released", &self.is_released())
            .finish()
    }
}
