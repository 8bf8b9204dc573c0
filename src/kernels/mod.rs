mod color;
mod julia;
mod mandelbrot;
mod mandelbulb;

use crate::fractal_config::{FractalConfiguration, FractalType};
use glam::{Vec2, Vec3, Vec4};

pub use color::{finish, hsv_to_rgb, rainbow};
pub use julia::JULIA;
pub use mandelbrot::{iteration_cap as mandelbrot_iteration_cap, MANDELBROT, MIN_ITERATIONS};
pub use mandelbulb::{
    bulb_power, distance_estimate, march, MarchResult, BAILOUT, DE_ITERATIONS, HIT_EPSILON,
    MANDELBULB, MAX_DISTANCE, MAX_RAY_STEPS,
};

/// Hard iteration ceiling for the 2D kernels. The configured count only lowers it.
pub const MAX_ITERATIONS: u32 = 1000;
/// Squared escape radius (|z| > 2) for the 2D kernels.
pub const ESCAPE_RADIUS_SQ: f32 = 4.0;

/// Values fed to a kernel for one frame. Audio levels are already scaled by
/// the configured strengths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformSet {
    pub time: f32,
    pub resolution: Vec2,
    pub bass: f32,
    pub treble: f32,
    pub rotation: f32,
    pub zoom: f32,
    pub bass_strength: f32,
    pub treble_strength: f32,
    pub rotation_speed: f32,
    pub zoom_pulse: f32,
    pub iterations: u32,
    pub ray_steps: u32,
    pub primary: Vec3,
    pub secondary: Vec3,
    pub rainbow: bool,
    pub julia_c: Vec2,
}

impl UniformSet {
    pub fn from_config(cfg: &FractalConfiguration, width: usize, height: usize) -> Self {
        let mut u = Self {
            time: 0.0,
            resolution: Vec2::new(width as f32, height as f32),
            bass: 0.0,
            treble: 0.0,
            rotation: 0.0,
            zoom: 1.0,
            bass_strength: 0.0,
            treble_strength: 0.0,
            rotation_speed: 0.0,
            zoom_pulse: 0.0,
            iterations: 1,
            ray_steps: 1,
            primary: Vec3::ZERO,
            secondary: Vec3::ZERO,
            rainbow: false,
            julia_c: Vec2::ZERO,
        };
        u.apply_config(cfg);
        u
    }

    /// Copies the configuration-driven uniforms; per-frame values are kept.
    pub fn apply_config(&mut self, cfg: &FractalConfiguration) {
        self.bass_strength = cfg.motion.bass_strength;
        self.treble_strength = cfg.motion.treble_strength;
        self.rotation_speed = cfg.motion.rotation_speed;
        self.zoom_pulse = cfg.motion.zoom_pulse;
        self.iterations = cfg.quality.iterations;
        self.ray_steps = cfg.quality.ray_steps;
        self.primary = Vec3::from_array(cfg.colors.primary);
        self.secondary = Vec3::from_array(cfg.colors.secondary);
        self.rainbow = cfg.color_mode.rainbow;
        self.julia_c = Vec2::new(cfg.julia.cx, cfg.julia.cy);
    }

    pub fn set_resolution(&mut self, width: usize, height: usize) {
        self.resolution = Vec2::new(width as f32, height as f32);
    }
}

pub type ShadeFn = fn(Vec2, &UniformSet) -> Vec4;

/// A fractal program: its pixel function plus the uniforms it reads.
pub struct KernelDescriptor {
    pub fractal_type: FractalType,
    pub name: &'static str,
    pub uniforms: &'static [&'static str],
    pub shade: ShadeFn,
}

impl KernelDescriptor {
    /// Shades one pixel; channels are clamped to [0, 1] and alpha is 1.
    pub fn shade(&self, uv: Vec2, uniforms: &UniformSet) -> Vec4 {
        finish((self.shade)(uv, uniforms))
    }
}

impl std::fmt::Debug for KernelDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelDescriptor")
            .field("fractal_type", &self.fractal_type)
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct KernelRegistry {
    entries: Vec<&'static KernelDescriptor>,
}

impl Default for KernelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl KernelRegistry {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut r = Self::empty();
        r.register(&JULIA);
        r.register(&MANDELBROT);
        r.register(&MANDELBULB);
        r
    }

    /// Adds or replaces the kernel for its fractal type.
    pub fn register(&mut self, kernel: &'static KernelDescriptor) {
        match self
            .entries
            .iter_mut()
            .find(|k| k.fractal_type == kernel.fractal_type)
        {
            Some(slot) => *slot = kernel,
            None => self.entries.push(kernel),
        }
    }

    pub fn get(&self, t: FractalType) -> Option<&'static KernelDescriptor> {
        self.entries.iter().copied().find(|k| k.fractal_type == t)
    }

    /// Looks a kernel up by its fractal type name; unknown names yield `None`.
    pub fn lookup(&self, name: &str) -> Option<&'static KernelDescriptor> {
        let t = name.parse::<FractalType>().ok()?;
        self.get(t)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static KernelDescriptor> + '_ {
        self.entries.iter().copied()
    }
}

/// Normalized coordinate of pixel (x, y) with y pointing up and the shorter
/// axis spanning [-1, 1].
pub fn pixel_uv(x: usize, y: usize, width: usize, height: usize) -> Vec2 {
    let res = Vec2::new(width as f32, height as f32);
    let frag = Vec2::new(x as f32 + 0.5, (height - 1 - y) as f32 + 0.5);
    (frag * 2.0 - res) / res.x.min(res.y).max(1.0)
}

/// Runs `kernel` over every pixel of an RGBA8 buffer. With no kernel the
/// buffer is filled with opaque black.
pub fn render_into(
    kernel: Option<&KernelDescriptor>,
    uniforms: &UniformSet,
    width: usize,
    height: usize,
    out: &mut [u8],
) {
    let need = width.saturating_mul(height).saturating_mul(4);
    if out.len() < need || width == 0 || height == 0 {
        return;
    }

    let Some(kernel) = kernel else {
        for px in out[..need].chunks_exact_mut(4) {
            px.copy_from_slice(&[0, 0, 0, 255]);
        }
        return;
    };

    for y in 0..height {
        for x in 0..width {
            let c = kernel.shade(pixel_uv(x, y, width, height), uniforms);
            let i = (y * width + x) * 4;
            out[i] = to_byte(c.x);
            out[i + 1] = to_byte(c.y);
            out[i + 2] = to_byte(c.z);
            out[i + 3] = to_byte(c.w);
        }
    }
}

fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

pub(crate) fn rotate(p: Vec2, angle: f32) -> Vec2 {
    let (s, c) = angle.sin_cos();
    Vec2::new(p.x * c - p.y * s, p.x * s + p.y * c)
}

pub(crate) fn effective_cap(configured: u32, hard: u32) -> u32 {
    configured.clamp(1, hard)
}

/// Zoom divisor kept finite and away from zero.
pub(crate) fn safe_zoom(zoom: f32) -> f32 {
    if zoom.is_finite() { zoom.max(1e-3) } else { 1.0 }
}
