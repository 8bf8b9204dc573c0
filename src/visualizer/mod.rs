//! Visualizer lifecycle: one `RenderSession` per container, created by
//! `Studio::init_visualizer` and ended only through the returned `Cleanup`.
//!
//! Callers must run the previous cleanup before starting another session in
//! the same container; this is not checked here.

mod scheduler;
mod session;
mod stage;

pub use scheduler::{FrameCallback, FrameScheduler, ManualScheduler, DISPLAY_REFRESH_MS};
pub use session::{Cleanup, MotionAccumulator, FRAME_STEP};
pub use stage::{ListenerId, Stage, Surface, SurfaceError};

use crate::audio::{AudioRoute, DEFAULT_FFT_SIZE};
use crate::fractal_config::{
    ConfigStore, FractalConfiguration, FractalType, PartialConfig,
};
use crate::kernels::{KernelRegistry, UniformSet};
use crate::spectrum::{AudioLevels, SpectrumAnalyzer};
use anyhow::Context;
use log::{info, warn};
use session::RenderSession;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub type AudioOpener = Box<dyn FnMut() -> anyhow::Result<Rc<dyn AudioRoute>>>;

/// Opens the audio route on first use and keeps it for every later session.
struct AudioSlot {
    opener: AudioOpener,
    route: Option<Rc<dyn AudioRoute>>,
}

impl AudioSlot {
    fn route(&mut self) -> anyhow::Result<Rc<dyn AudioRoute>> {
        if let Some(route) = &self.route {
            return Ok(Rc::clone(route));
        }
        let route = (self.opener)()?;
        info!("audio route opened: {}", route.describe());
        self.route = Some(Rc::clone(&route));
        Ok(route)
    }
}

pub struct Studio {
    stage: Rc<Stage>,
    scheduler: Rc<dyn FrameScheduler>,
    config: Rc<RefCell<ConfigStore>>,
    registry: KernelRegistry,
    audio: AudioSlot,
    fft_size: usize,
}

impl Studio {
    pub fn new(stage: Rc<Stage>, scheduler: Rc<dyn FrameScheduler>, opener: AudioOpener) -> Self {
        Self {
            stage,
            scheduler,
            config: Rc::new(RefCell::new(ConfigStore::new())),
            registry: KernelRegistry::builtin(),
            audio: AudioSlot {
                opener,
                route: None,
            },
            fft_size: DEFAULT_FFT_SIZE,
        }
    }

    pub fn with_config(self, config: FractalConfiguration) -> Self {
        *self.config.borrow_mut() = ConfigStore::with_config(config);
        self
    }

    pub fn with_registry(mut self, registry: KernelRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_fft_size(mut self, fft_size: usize) -> Self {
        self.fft_size = fft_size;
        self
    }

    pub fn stage(&self) -> &Rc<Stage> {
        &self.stage
    }

    pub fn registry(&self) -> &KernelRegistry {
        &self.registry
    }

    /// Starts a session in `container_id` and returns its cleanup.
    ///
    /// A missing container logs a warning and yields `Cleanup::noop()`. An
    /// unknown fractal type still starts a session, with no kernel selected.
    /// Failing to open or tap the audio route is returned as an error.
    pub fn init_visualizer(&mut self, fractal_type: &str, container_id: &str) -> anyhow::Result<Cleanup> {
        if !self.stage.has_container(container_id) {
            warn!("initVisualizer: no container {container_id:?}, nothing to do");
            return Ok(Cleanup::noop());
        }
        let route = self.audio.route().context("open audio graph")?;
        let tap = route
            .connect_analyser(self.fft_size)
            .context("connect analyser")?;
        self.stage.clear_container(container_id);

        let kernel = match fractal_type.parse::<FractalType>() {
            Ok(t) => {
                self.config
                    .borrow_mut()
                    .update(&PartialConfig::fractal_type(t));
                let kernel = self.registry.get(t);
                if kernel.is_none() {
                    warn!("no kernel registered for {t}");
                }
                kernel
            }
            Err(err) => {
                warn!("{err}; rendering without a kernel");
                None
            }
        };

        let (width, height) = self.stage.container_size(container_id).unwrap_or((0, 0));
        self.stage
            .attach_surface(container_id, Surface::new(width, height));

        let snapshot = self.config.borrow().snapshot();
        let uniforms = Rc::new(RefCell::new(UniformSet::from_config(&snapshot, width, height)));
        self.config.borrow_mut().bind(&uniforms);

        let session = Rc::new(RenderSession {
            container_id: container_id.to_string(),
            label: fractal_type.to_string(),
            kernel,
            stage: Rc::clone(&self.stage),
            scheduler: Rc::clone(&self.scheduler),
            config: Rc::clone(&self.config),
            uniforms,
            analyzer: RefCell::new(Some(SpectrumAnalyzer::new(tap))),
            levels: Cell::new(AudioLevels::default()),
            motion: RefCell::new(MotionAccumulator::default()),
            resize_listener: Cell::new(None),
            running: Cell::new(false),
            released: Cell::new(false),
            frames: Cell::new(0),
        });
        session.attach_resize_listener();
        session.start();

        info!("started {fractal_type} visualizer in {container_id:?} ({width}x{height})");
        Ok(Cleanup::for_session(session))
    }

    /// Merges `patch` into the configuration; a running session sees the
    /// change on its next frame.
    pub fn update_fractal_config(&self, patch: &PartialConfig) -> FractalConfiguration {
        self.config.borrow_mut().update(patch)
    }

    pub fn fractal_config_snapshot(&self) -> FractalConfiguration {
        self.config.borrow().snapshot()
    }

    pub fn fractal_type(&self) -> FractalType {
        self.config.borrow().fractal_type()
    }

    /// Current uniform values of the bound session, if one is running.
    pub fn live_uniforms(&self) -> Option<UniformSet> {
        let live = self.config.borrow().live_uniforms()?;
        let uniforms = *live.borrow();
        Some(uniforms)
    }

    pub fn audio_route(&self) -> Option<Rc<dyn AudioRoute>> {
        self.audio.route.as_ref().map(Rc::clone)
    }
}
