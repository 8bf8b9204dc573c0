use crate::audio::{AudioGraph, AudioRoute, SilentRoute};
use crate::config::{AudioSource, Config};
use crate::fractal_config::{
    julia_presets, preset_name_for, FractalType, PartialColors, PartialConfig, PartialMotion,
    PartialQuality, Rgb,
};
use crate::kernels::{MAX_ITERATIONS, MAX_RAY_STEPS, MIN_ITERATIONS};
use crate::project::FractalProject;
use crate::render::{Frame, HalfBlockRenderer, Renderer};
use crate::terminal::TerminalGuard;
use crate::visualizer::{AudioOpener, Cleanup, FrameScheduler, ManualScheduler, Stage, Studio};
use anyhow::{anyhow, Context};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use log::{info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

const STRENGTH_STEP: f32 = 0.1;
const MAX_STRENGTH: f32 = 5.0;
const ITERATION_STEP: u32 = 16;
const RAY_STEP_STEP: u32 = 8;
const MIN_RAY_STEPS: u32 = 8;
const DEFAULT_PROJECT_TITLE: &str = "Untitled";

const COLOR_PAIRS: [(Rgb, Rgb); 4] = [
    ([0.15, 0.55, 1.0], [1.0, 0.3, 0.65]),
    ([1.0, 0.55, 0.1], [0.55, 0.1, 0.9]),
    ([0.1, 0.95, 0.6], [0.05, 0.35, 1.0]),
    ([0.95, 0.95, 1.0], [0.9, 0.15, 0.2]),
];

pub fn run(cfg: Config) -> anyhow::Result<()> {
    let project = match &cfg.settings {
        Some(path) => load_project(path)?,
        None => None,
    };

    let stage = Stage::new();
    let scheduler = ManualScheduler::new();
    let frames: Rc<dyn FrameScheduler> = scheduler.clone();
    let mut studio =
        Studio::new(Rc::clone(&stage), frames, audio_opener(&cfg)?).with_fft_size(cfg.fft_size);

    let first = match &project {
        Some(p) => {
            let patch = p.to_partial_config().context("read saved settings")?;
            studio.update_fractal_config(&patch);
            p.fractal_type.clone()
        }
        None => cfg.fractal.clone(),
    };

    let term = TerminalGuard::enter(cfg.sync_updates)?;
    let mut out = term.writer();
    let mut renderer = HalfBlockRenderer::new();

    let size = TerminalGuard::usable_size()?;
    let layout = Layout::for_size(size);
    stage.add_container(&cfg.container, layout.pixel_width(), layout.pixel_height());

    let mut host = Host {
        studio,
        stage,
        scheduler,
        container: cfg.container.clone(),
        fractal: first.clone(),
        cleanup: None,
        paused: false,
        show_help: false,
        layout,
        settings_path: cfg.settings.clone(),
        project_title: project
            .as_ref()
            .map_or_else(|| DEFAULT_PROJECT_TITLE.to_string(), |p| p.title.clone()),
        audio_path: cfg.audio.clone(),
        status: String::new(),
    };

    let result = host
        .start(&first)
        .and_then(|()| host.event_loop(&cfg, &mut renderer, &mut out));
    // Unload.
    host.stop();
    result
}

/// Cell layout: the visual area on top, HUD rows below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    cols: u16,
    rows: u16,
    hud_rows: u16,
}

impl Layout {
    fn for_size((cols, rows): (u16, u16)) -> Self {
        let hud_rows = if rows >= 6 { 2 } else { 0 };
        Self {
            cols,
            rows,
            hud_rows,
        }
    }

    fn visual_rows(self) -> u16 {
        self.rows.saturating_sub(self.hud_rows).max(1)
    }

    fn pixel_width(self) -> usize {
        self.cols as usize
    }

    fn pixel_height(self) -> usize {
        self.visual_rows() as usize * 2
    }
}

struct Host {
    studio: Studio,
    stage: Rc<Stage>,
    scheduler: Rc<ManualScheduler>,
    container: String,
    fractal: String,
    cleanup: Option<Cleanup>,
    paused: bool,
    show_help: bool,
    layout: Layout,
    settings_path: Option<PathBuf>,
    project_title: String,
    audio_path: Option<PathBuf>,
    status: String,
}

impl Host {
    /// Runs the previous cleanup, then starts `fractal` in the container.
    fn start(&mut self, fractal: &str) -> anyhow::Result<()> {
        self.stop();
        self.fractal = fractal.to_string();
        let cleanup = self.studio.init_visualizer(fractal, &self.container)?;
        self.cleanup = Some(cleanup);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup.run();
        }
    }

    fn event_loop(
        &mut self,
        cfg: &Config,
        renderer: &mut dyn Renderer,
        out: &mut dyn Write,
    ) -> anyhow::Result<()> {
        let mut fps = FpsCounter::new();
        let target = Duration::from_secs_f32(1.0 / cfg.fps.max(1) as f32);

        loop {
            let now = Instant::now();

            while event::poll(Duration::from_millis(0))? {
                match event::read()? {
                    Event::Key(k) if k.kind != KeyEventKind::Release => {
                        if self.handle_key(k.code, k.modifiers)? {
                            return Ok(());
                        }
                    }
                    Event::Resize(c, r) => self.resize((c, r)),
                    _ => {}
                }
            }

            // Resize events can be missed by some terminals.
            let size = TerminalGuard::size()?;
            if size != (self.layout.cols, self.layout.rows) {
                self.resize(size);
            }

            self.scheduler.tick();
            self.present(renderer, out, cfg.sync_updates, fps.fps())?;
            fps.tick();

            let elapsed = now.elapsed();
            if elapsed < target {
                std::thread::sleep(target - elapsed);
            }
        }
    }

    fn resize(&mut self, size: (u16, u16)) {
        self.layout = Layout::for_size(size);
        self.stage.set_container_size(
            &self.container,
            self.layout.pixel_width(),
            self.layout.pixel_height(),
        );
        self.stage.dispatch_resize();
    }

    fn present(
        &self,
        renderer: &mut dyn Renderer,
        out: &mut dyn Write,
        sync_updates: bool,
        fps: f32,
    ) -> anyhow::Result<()> {
        let hud = self.hud_text(fps);
        let overlay = self.show_help.then_some(HELP_TEXT);
        let layout = self.layout;
        let draw = |pixels: &[u8], w: usize, h: usize, renderer: &mut dyn Renderer, out: &mut dyn Write| {
            let frame = Frame {
                term_cols: layout.cols,
                term_rows: layout.rows,
                visual_rows: layout.visual_rows(),
                pixel_width: w,
                pixel_height: h,
                pixels_rgba: pixels,
                hud: &hud,
                hud_rows: layout.hud_rows,
                overlay,
                sync_updates,
            };
            renderer.render(&frame, out)
        };

        match self.stage.with_surface(&self.container, |s| {
            draw(s.pixels(), s.width(), s.height(), &mut *renderer, &mut *out)
        }) {
            Some(result) => result,
            None => draw(&[], 0, 0, renderer, out),
        }
    }

    fn hud_text(&self, fps: f32) -> String {
        let cfg = self.studio.fractal_config_snapshot();
        let levels = self
            .cleanup
            .as_ref()
            .map(Cleanup::levels)
            .unwrap_or_default();
        let kernel = self
            .cleanup
            .as_ref()
            .and_then(Cleanup::kernel_name)
            .unwrap_or("none");
        let preset = preset_name_for(cfg.julia).unwrap_or("custom");
        let audio = match self.studio.audio_route() {
            Some(route) if route.is_paused() => format!("{} (paused)", route.describe()),
            Some(route) => route.describe(),
            None => "no audio".to_string(),
        };

        let status = format!(
            "{} [{kernel}] | julia {preset} | bass {:.2}x{:.1} treble {:.2}x{:.1} | iter {} steps {}{} | {fps:.0} fps | {audio}",
            self.fractal,
            levels.bass,
            cfg.motion.bass_strength,
            levels.treble,
            cfg.motion.treble_strength,
            cfg.quality.iterations,
            cfg.quality.ray_steps,
            if cfg.color_mode.rainbow { " | rainbow" } else { "" },
        );
        let second = if self.status.is_empty() {
            "1/2/3 type  p preset  r rainbow  c colors  space pause  s save  ? help  q quit"
        } else {
            self.status.as_str()
        };
        format!("{status}\n{second}")
    }

    fn handle_key(&mut self, code: KeyCode, mods: KeyModifiers) -> anyhow::Result<bool> {
        if mods.contains(KeyModifiers::CONTROL) && matches!(code, KeyCode::Char('c')) {
            return Ok(true);
        }

        match code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(true),
            KeyCode::Char(d @ '1'..='3') => {
                let t = FractalType::all()[d as usize - '1' as usize];
                self.start(t.as_str())?;
                self.status = format!("switched to {}", t.label());
            }
            KeyCode::Char('p') => self.next_preset(),
            KeyCode::Char('r') => {
                let on = !self.studio.fractal_config_snapshot().color_mode.rainbow;
                self.studio.update_fractal_config(&PartialConfig::rainbow(on));
            }
            KeyCode::Char('[') => self.adjust_strength(-STRENGTH_STEP, 0.0),
            KeyCode::Char(']') => self.adjust_strength(STRENGTH_STEP, 0.0),
            KeyCode::Char('{') => self.adjust_strength(0.0, -STRENGTH_STEP),
            KeyCode::Char('}') => self.adjust_strength(0.0, STRENGTH_STEP),
            KeyCode::Char('-') => self.adjust_quality(-(ITERATION_STEP as i64), 0),
            KeyCode::Char('=') | KeyCode::Char('+') => self.adjust_quality(ITERATION_STEP as i64, 0),
            KeyCode::Char(',') => self.adjust_quality(0, -(RAY_STEP_STEP as i64)),
            KeyCode::Char('.') => self.adjust_quality(0, RAY_STEP_STEP as i64),
            KeyCode::Char('c') => self.next_colors(),
            KeyCode::Char(' ') => self.toggle_pause()?,
            KeyCode::Char('s') => self.save(),
            KeyCode::Char('?') | KeyCode::Char('h') | KeyCode::F(1) => {
                self.show_help = !self.show_help;
            }
            _ => {}
        }
        Ok(false)
    }

    fn next_preset(&mut self) {
        let presets = julia_presets();
        let current = preset_name_for(self.studio.fractal_config_snapshot().julia);
        let next = match current.and_then(|name| presets.iter().position(|p| p.name == name)) {
            Some(i) => (i + 1) % presets.len(),
            None => 0,
        };
        let preset = presets[next];
        self.studio.update_fractal_config(&PartialConfig::julia(preset));
        self.status = format!("julia preset {}", preset.name);
    }

    fn next_colors(&mut self) {
        let colors = self.studio.fractal_config_snapshot().colors;
        let next = COLOR_PAIRS
            .iter()
            .position(|&(p, s)| p == colors.primary && s == colors.secondary)
            .map_or(0, |i| (i + 1) % COLOR_PAIRS.len());
        let (primary, secondary) = COLOR_PAIRS[next];
        self.studio.update_fractal_config(&PartialConfig::colors(PartialColors {
            primary: Some(primary),
            secondary: Some(secondary),
        }));
    }

    fn adjust_strength(&mut self, bass: f32, treble: f32) {
        let motion = self.studio.fractal_config_snapshot().motion;
        let step = |value: f32, delta: f32| {
            (delta != 0.0).then(|| (value + delta).clamp(0.0, MAX_STRENGTH))
        };
        self.studio.update_fractal_config(&PartialConfig::motion(PartialMotion {
            bass_strength: step(motion.bass_strength, bass),
            treble_strength: step(motion.treble_strength, treble),
            ..PartialMotion::default()
        }));
    }

    fn adjust_quality(&mut self, iterations: i64, ray_steps: i64) {
        let quality = self.studio.fractal_config_snapshot().quality;
        let step = |value: u32, delta: i64, lo: u32, hi: u32| {
            (delta != 0).then(|| (i64::from(value) + delta).clamp(i64::from(lo), i64::from(hi)) as u32)
        };
        self.studio.update_fractal_config(&PartialConfig::quality(PartialQuality {
            iterations: step(quality.iterations, iterations, MIN_ITERATIONS, MAX_ITERATIONS),
            ray_steps: step(quality.ray_steps, ray_steps, MIN_RAY_STEPS, MAX_RAY_STEPS),
        }));
    }

    /// Pause silences the route; play restarts the session on it.
    fn toggle_pause(&mut self) -> anyhow::Result<()> {
        let Some(route) = self.studio.audio_route() else {
            return Ok(());
        };
        if self.paused {
            route.set_paused(false);
            self.paused = false;
            let fractal = self.fractal.clone();
            self.start(&fractal)?;
            self.status = "playing".to_string();
        } else {
            route.set_paused(true);
            self.paused = true;
            self.status = "paused".to_string();
        }
        Ok(())
    }

    fn save(&mut self) {
        let Some(path) = self.settings_path.clone() else {
            self.status = "no --settings file to save to".to_string();
            return;
        };
        let cfg = self.studio.fractal_config_snapshot();
        let saved = FractalProject::new(&self.project_title, &cfg, self.audio_path.as_deref())
            .and_then(|project| project.save(&path));
        match saved {
            Ok(()) => {
                info!("saved settings to {}", path.display());
                self.status = format!("saved {}", path.display());
            }
            Err(err) => {
                warn!("saving settings to {}: {err}", path.display());
                self.status = format!("save failed: {err}");
            }
        }
    }
}

fn load_project(path: &Path) -> anyhow::Result<Option<FractalProject>> {
    if !path.exists() {
        info!("{} does not exist yet; starting from defaults", path.display());
        return Ok(None);
    }
    let project =
        FractalProject::load(path).with_context(|| format!("load settings {}", path.display()))?;
    Ok(Some(project))
}

fn audio_opener(cfg: &Config) -> anyhow::Result<AudioOpener> {
    let device = cfg.device.clone();
    let opener: AudioOpener = match cfg.audio_source() {
        AudioSource::Mic => Box::new(move || -> anyhow::Result<Rc<dyn AudioRoute>> {
            let graph = AudioGraph::capture_input(device.as_deref())?;
            Ok(Rc::new(graph))
        }),
        AudioSource::File => {
            let path = cfg
                .audio
                .clone()
                .ok_or_else(|| anyhow!("--source file needs --audio <wav>"))?;
            let looping = cfg.loop_audio;
            Box::new(move || -> anyhow::Result<Rc<dyn AudioRoute>> {
                let graph = AudioGraph::play_file(&path, device.as_deref(), looping)?;
                Ok(Rc::new(graph))
            })
        }
        AudioSource::None => Box::new(|| -> anyhow::Result<Rc<dyn AudioRoute>> {
            Ok(Rc::new(SilentRoute))
        }),
    };
    Ok(opener)
}

const HELP_TEXT: &str = "Fractal Studio\n\
1/2/3  julia / mandelbrot / mandelbulb\n\
p  next julia preset\n\
r  toggle rainbow palette\n\
c  next color pair\n\
[ / ]  bass strength down / up\n\
{ / }  treble strength down / up\n\
- / =  iterations down / up\n\
, / .  ray steps down / up\n\
space  pause / play (play restarts the visualizer)\n\
s  save settings\n\
? or h  toggle this help\n\
q or esc  quit";

struct FpsCounter {
    last: Instant,
    frames: u32,
    fps: f32,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            last: Instant::now(),
            frames: 0,
            fps: 0.0,
        }
    }

    fn tick(&mut self) {
        self.frames += 1;
        let dt = self.last.elapsed().as_secs_f32();
        if dt >= 0.5 {
            self.fps = self.frames as f32 / dt;
            self.frames = 0;
            self.last = Instant::now();
        }
    }

    fn fps(&self) -> f32 {
        self.fps
    }
}
