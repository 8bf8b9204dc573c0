use anyhow::anyhow;
use fractal_studio::audio::{AnalyserTap, AudioRoute, TapBus};
use fractal_studio::fractal_config::{FractalType, PartialConfig, PartialMotion, PartialQuality};
use fractal_studio::kernels::KernelRegistry;
use fractal_studio::spectrum::SpectrumSource;
use fractal_studio::visualizer::{
    AudioOpener, Cleanup, FrameScheduler, ManualScheduler, Stage, Studio, Surface,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

const CONTAINER: &str = "fractal-container";

/// Spectrum shared between the test and every tap of the route.
#[derive(Clone, Default)]
struct SharedBins(Rc<RefCell<Option<Vec<u8>>>>);

impl SharedBins {
    fn set(&self, bins: Vec<u8>) {
        *self.0.borrow_mut() = Some(bins);
    }
}

impl SpectrumSource for SharedBins {
    fn frequency_bin_count(&self) -> usize {
        64
    }

    fn byte_frequency_data(&mut self, out: &mut [u8]) -> bool {
        match &*self.0.borrow() {
            Some(bins) => {
                let n = out.len().min(bins.len());
                out[..n].copy_from_slice(&bins[..n]);
                true
            }
            None => false,
        }
    }
}

struct ScriptedRoute {
    bins: SharedBins,
    taps: Rc<Cell<usize>>,
}

impl AudioRoute for ScriptedRoute {
    fn connect_analyser(&self, _fft_size: usize) -> anyhow::Result<Box<dyn SpectrumSource>> {
        self.taps.set(self.taps.get() + 1);
        Ok(Box::new(self.bins.clone()))
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

struct Harness {
    stage: Rc<Stage>,
    scheduler: Rc<ManualScheduler>,
    studio: Studio,
    bins: SharedBins,
    opens: Rc<Cell<usize>>,
    taps: Rc<Cell<usize>>,
}

fn harness() -> Harness {
    let stage = Stage::new();
    stage.add_container(CONTAINER, 16, 12);
    let scheduler = ManualScheduler::new();
    let bins = SharedBins::default();
    let opens = Rc::new(Cell::new(0));
    let taps = Rc::new(Cell::new(0));

    let opener: AudioOpener = {
        let (bins, opens, taps) = (bins.clone(), Rc::clone(&opens), Rc::clone(&taps));
        Box::new(move || -> anyhow::Result<Rc<dyn AudioRoute>> {
            opens.set(opens.get() + 1);
            Ok(Rc::new(ScriptedRoute {
                bins: bins.clone(),
                taps: Rc::clone(&taps),
            }))
        })
    };
    let frames: Rc<dyn FrameScheduler> = scheduler.clone();
    let studio = Studio::new(Rc::clone(&stage), frames, opener);
    Harness {
        stage,
        scheduler,
        studio,
        bins,
        opens,
        taps,
    }
}

fn surface_pixels(stage: &Stage) -> Vec<u8> {
    stage
        .with_surface(CONTAINER, |s| s.pixels().to_vec())
        .expect("surface attached")
}

#[test]
fn missing_container_returns_noop_cleanup() {
    let mut h = harness();
    let cleanup = h.studio.init_visualizer("julia", "nowhere").expect("init");
    assert!(cleanup.is_noop());
    assert!(!cleanup.is_running());
    assert_eq!(h.opens.get(), 0, "audio is not opened for a missing container");
    assert_eq!(h.scheduler.pending(), 0);
    cleanup.run();
    cleanup.run();
}

#[test]
fn init_attaches_surface_and_runs_frames() {
    let mut h = harness();
    let cleanup = h.studio.init_visualizer("julia", CONTAINER).expect("init");
    assert!(cleanup.is_running());
    assert_eq!(cleanup.kernel_name(), Some("julia"));
    assert_eq!(cleanup.container_id(), Some(CONTAINER));
    assert!(!h.stage.is_container_empty(CONTAINER));
    assert_eq!(h.stage.resize_listener_count(), 1);
    assert_eq!(h.scheduler.pending(), 1);

    h.scheduler.run_frames(5);
    assert_eq!(cleanup.frames_rendered(), 5);
    assert_eq!(h.scheduler.pending(), 1, "each frame schedules exactly one more");

    let pixels = surface_pixels(&h.stage);
    assert_eq!(pixels.len(), 16 * 12 * 4);
    assert!(pixels.chunks_exact(4).all(|px| px[3] == 255));
    cleanup.run();
}

#[test]
fn cleanup_releases_everything_and_is_idempotent() {
    let mut h = harness();
    let cleanup = h.studio.init_visualizer("mandelbrot", CONTAINER).expect("init");
    h.scheduler.run_frames(3);

    cleanup.run();
    assert!(cleanup.is_released());
    assert!(!cleanup.is_running());
    assert!(h.stage.is_container_empty(CONTAINER));
    assert_eq!(h.stage.resize_listener_count(), 0);
    assert!(h.studio.live_uniforms().is_none());

    // The frame queued before cleanup fires once and does nothing.
    h.scheduler.run_frames(3);
    assert_eq!(cleanup.frames_rendered(), 3);
    assert_eq!(h.scheduler.pending(), 0);

    cleanup.run();
    assert!(h.stage.is_container_empty(CONTAINER));
    assert_eq!(h.stage.resize_listener_count(), 0);
}

#[test]
fn config_updates_reach_running_session_on_next_frame() {
    let mut h = harness();
    let cleanup = h.studio.init_visualizer("julia", CONTAINER).expect("init");
    h.scheduler.tick();

    let cfg = h.studio.update_fractal_config(&PartialConfig::quality(PartialQuality {
        iterations: Some(42),
        ray_steps: None,
    }));
    assert_eq!(cfg.quality.iterations, 42);
    let live = h.studio.live_uniforms().expect("session bound");
    assert_eq!(live.iterations, 42);

    h.scheduler.tick();
    assert_eq!(h.studio.live_uniforms().map(|u| u.iterations), Some(42));
    cleanup.run();
}

#[test]
fn updates_without_session_only_touch_the_store() {
    let h = harness();
    let cfg = h.studio.update_fractal_config(&PartialConfig::rainbow(true));
    assert!(cfg.color_mode.rainbow);
    assert!(h.studio.live_uniforms().is_none());
    assert!(h.studio.fractal_config_snapshot().color_mode.rainbow);
}

#[test]
fn new_session_starts_from_current_configuration() {
    let mut h = harness();
    h.studio.update_fractal_config(&PartialConfig::quality(PartialQuality {
        iterations: None,
        ray_steps: Some(33),
    }));
    let cleanup = h.studio.init_visualizer("mandelbulb", CONTAINER).expect("init");
    assert_eq!(h.studio.live_uniforms().map(|u| u.ray_steps), Some(33));
    cleanup.run();
}

#[test]
fn audio_levels_drive_uniforms() {
    let mut h = harness();
    h.studio.update_fractal_config(&PartialConfig::motion(PartialMotion {
        bass_strength: Some(2.0),
        treble_strength: Some(1.0),
        ..PartialMotion::default()
    }));
    let cleanup = h.studio.init_visualizer("julia", CONTAINER).expect("init");

    h.scheduler.tick();
    let quiet = h.studio.live_uniforms().expect("bound");
    assert_eq!(quiet.bass, 0.0, "no audio yet");
    assert!(quiet.time > 0.0);

    let mut bins = vec![0u8; 64];
    bins[..10].fill(255);
    h.bins.set(bins);
    h.scheduler.tick();

    let loud = h.studio.live_uniforms().expect("bound");
    assert!((loud.bass - 2.0).abs() < 1e-5, "bass scaled by strength");
    assert_eq!(loud.treble, 0.0);
    assert!(loud.time > quiet.time);
    assert!((cleanup.levels().bass - 1.0).abs() < 1e-6);
    cleanup.run();
}

#[test]
fn unknown_type_renders_black_and_keeps_store_type() {
    let mut h = harness();
    let before = h.studio.fractal_type();
    let cleanup = h.studio.init_visualizer("hilbert", CONTAINER).expect("init");
    assert!(!cleanup.is_noop());
    assert_eq!(cleanup.kernel_name(), None);
    assert_eq!(h.studio.fractal_type(), before);

    h.scheduler.run_frames(2);
    let pixels = surface_pixels(&h.stage);
    assert!(pixels.chunks_exact(4).all(|px| px == [0, 0, 0, 255]));
    cleanup.run();
}

#[test]
fn known_type_is_recorded_in_store() {
    let mut h = harness();
    let cleanup = h.studio.init_visualizer("mandelbulb", CONTAINER).expect("init");
    assert_eq!(h.studio.fractal_type(), FractalType::Mandelbulb);
    assert_eq!(
        h.studio.fractal_config_snapshot().fractal_type,
        FractalType::Mandelbulb
    );
    cleanup.run();
}

#[test]
fn empty_registry_still_starts_a_session() {
    let h = harness();
    let mut studio = h.studio.with_registry(KernelRegistry::empty());
    let cleanup = studio.init_visualizer("julia", CONTAINER).expect("init");
    assert_eq!(cleanup.kernel_name(), None);
    assert_eq!(studio.fractal_type(), FractalType::Julia);

    h.scheduler.tick();
    let pixels = surface_pixels(&h.stage);
    assert!(pixels.chunks_exact(4).all(|px| px == [0, 0, 0, 255]));
    cleanup.run();
}

#[test]
fn audio_open_failure_propagates() {
    let stage = Stage::new();
    stage.add_container(CONTAINER, 8, 8);
    let mut studio = Studio::new(
        Rc::clone(&stage),
        ManualScheduler::new(),
        Box::new(|| -> anyhow::Result<Rc<dyn AudioRoute>> {
            Err(anyhow!("no input device"))
        }),
    );
    let err = studio
        .init_visualizer("julia", CONTAINER)
        .expect_err("open fails");
    assert!(format!("{err:#}").contains("no input device"));
    assert_eq!(stage.resize_listener_count(), 0);
}

#[test]
fn audio_route_opens_once_across_restarts() {
    let mut h = harness();
    let mut active: Option<Cleanup> = None;
    for name in ["julia", "mandelbrot", "mandelbulb", "julia"] {
        if let Some(previous) = active.take() {
            previous.run();
        }
        active = Some(h.studio.init_visualizer(name, CONTAINER).expect("init"));
        h.scheduler.run_frames(2);
    }
    assert_eq!(h.opens.get(), 1);
    assert_eq!(h.taps.get(), 4);
    assert!(h.studio.audio_route().is_some());
    assert_eq!(h.stage.resize_listener_count(), 1);
    assert_eq!(h.scheduler.pending(), 1);

    if let Some(last) = active {
        last.run();
    }
    assert_eq!(h.scheduler.pending(), 1);
    h.scheduler.tick();
    assert_eq!(h.scheduler.pending(), 0);
}

#[test]
fn resize_event_resizes_surface_and_resolution() {
    let mut h = harness();
    let cleanup = h.studio.init_visualizer("julia", CONTAINER).expect("init");
    h.scheduler.tick();

    h.stage.set_container_size(CONTAINER, 30, 20);
    h.stage.dispatch_resize();
    let size = h
        .stage
        .with_surface(CONTAINER, |s| (s.width(), s.height()))
        .expect("surface");
    assert_eq!(size, (30, 20));
    let u = h.studio.live_uniforms().expect("bound");
    assert_eq!((u.resolution.x, u.resolution.y), (30.0, 20.0));

    h.scheduler.tick();
    assert_eq!(surface_pixels(&h.stage).len(), 30 * 20 * 4);

    cleanup.run();
    h.stage.set_container_size(CONTAINER, 10, 10);
    h.stage.dispatch_resize();
    assert!(h.stage.is_container_empty(CONTAINER));
}

#[test]
fn cleanup_clones_share_one_session() {
    let mut h = harness();
    let cleanup = h.studio.init_visualizer("julia", CONTAINER).expect("init");
    let copy = cleanup.clone();
    copy.run();
    assert!(cleanup.is_released());
    cleanup.run();
}

/// Route whose sessions tap a shared bus, like the real audio graph.
struct BusRoute {
    bus: Arc<TapBus>,
}

impl AudioRoute for BusRoute {
    fn connect_analyser(&self, fft_size: usize) -> anyhow::Result<Box<dyn SpectrumSource>> {
        Ok(Box::new(AnalyserTap::connect(&self.bus, fft_size)?))
    }

    fn describe(&self) -> String {
        "bus".to_string()
    }
}

fn bus_studio(stage: &Rc<Stage>, scheduler: &Rc<ManualScheduler>, bus: &Arc<TapBus>) -> Studio {
    let bus = Arc::clone(bus);
    let frames: Rc<dyn FrameScheduler> = scheduler.clone();
    Studio::new(
        Rc::clone(stage),
        frames,
        Box::new(move || -> anyhow::Result<Rc<dyn AudioRoute>> {
            Ok(Rc::new(BusRoute {
                bus: Arc::clone(&bus),
            }))
        }),
    )
    .with_fft_size(1024)
}

#[test]
fn cleanup_disconnects_the_analysis_tap_immediately() {
    let stage = Stage::new();
    stage.add_container(CONTAINER, 8, 8);
    let scheduler = ManualScheduler::new();
    let bus = TapBus::new();
    let mut studio = bus_studio(&stage, &scheduler, &bus);

    let cleanup = studio.init_visualizer("julia", CONTAINER).expect("init");
    assert_eq!(bus.tap_count(), 1);
    assert!(cleanup.has_analyser());
    scheduler.run_frames(2);

    cleanup.run();
    assert_eq!(bus.tap_count(), 0, "tap released while the cleanup is still held");
    assert!(!cleanup.has_analyser());
    assert_eq!(scheduler.pending(), 1, "queued frame not yet drained");

    scheduler.run_frames(3);
    assert_eq!(bus.tap_count(), 0);
    bus.push_block(&[0.25; 256]);
}

#[test]
fn restarts_keep_one_tap_on_the_route() {
    let stage = Stage::new();
    stage.add_container(CONTAINER, 8, 8);
    let scheduler = ManualScheduler::new();
    let bus = TapBus::new();
    let mut studio = bus_studio(&stage, &scheduler, &bus);

    let first = studio.init_visualizer("julia", CONTAINER).expect("init");
    first.run();
    let second = studio.init_visualizer("mandelbrot", CONTAINER).expect("init");
    assert_eq!(bus.tap_count(), 1);
    second.run();
    assert_eq!(bus.tap_count(), 0);
}

#[test]
fn cleanup_survives_a_removed_container() {
    let mut h = harness();
    let cleanup = h.studio.init_visualizer("julia", CONTAINER).expect("init");
    h.scheduler.tick();

    assert!(h.stage.remove_container(CONTAINER));
    cleanup.run();
    cleanup.run();
    assert!(cleanup.is_released());
    assert_eq!(h.stage.resize_listener_count(), 0);
    assert!(h.studio.live_uniforms().is_none());
    assert!(!cleanup.has_analyser());

    h.scheduler.run_frames(2);
    assert_eq!(h.scheduler.pending(), 0);
}

#[test]
fn cleanup_survives_an_already_disposed_surface() {
    let mut h = harness();
    let cleanup = h.studio.init_visualizer("mandelbrot", CONTAINER).expect("init");
    let disposed = h
        .stage
        .with_surface_mut(CONTAINER, |s| s.dispose())
        .expect("surface attached");
    assert!(disposed.is_ok());

    cleanup.run();
    cleanup.run();
    assert!(h.stage.is_container_empty(CONTAINER));
    assert_eq!(h.stage.resize_listener_count(), 0);
    assert!(h.studio.live_uniforms().is_none());
}

#[test]
fn failed_audio_open_leaves_store_and_container_untouched() {
    let stage = Stage::new();
    stage.add_container(CONTAINER, 8, 8);
    stage.attach_surface(CONTAINER, Surface::new(8, 8));
    let mut studio = Studio::new(
        Rc::clone(&stage),
        ManualScheduler::new(),
        Box::new(|| -> anyhow::Result<Rc<dyn AudioRoute>> { Err(anyhow!("device busy")) }),
    );

    assert!(studio.init_visualizer("mandelbulb", CONTAINER).is_err());
    assert_eq!(studio.fractal_type(), FractalType::Julia);
    assert_eq!(
        studio.fractal_config_snapshot().fractal_type,
        FractalType::Julia
    );
    assert!(!stage.is_container_empty(CONTAINER));
    assert!(studio.live_uniforms().is_none());
}
