//! Fractal configuration: the data model, the merge contract, Julia presets
//! and the store that keeps the live uniform set in sync.

use crate::kernels::UniformSet;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::str::FromStr;

pub type Rgb = [f32; 3];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FractalType {
    Julia,
    Mandelbrot,
    Mandelbulb,
}

impl FractalType {
    pub const fn all() -> [Self; 3] {
        [Self::Julia, Self::Mandelbrot, Self::Mandelbulb]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Julia => "julia",
            Self::Mandelbrot => "mandelbrot",
            Self::Mandelbulb => "mandelbulb",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Julia => "Julia",
            Self::Mandelbrot => "Mandelbrot",
            Self::Mandelbulb => "Mandelbulb",
        }
    }
}

impl Default for FractalType {
    fn default() -> Self {
        Self::Julia
    }
}

impl fmt::Display for FractalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFractalType(pub String);

impl fmt::Display for UnknownFractalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown fractal type: {:?}", self.0)
    }
}

impl std::error::Error for UnknownFractalType {}

impl FromStr for FractalType {
    type Err = UnknownFractalType;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "julia" => Ok(Self::Julia),
            "mandelbrot" => Ok(Self::Mandelbrot),
            "mandelbulb" => Ok(Self::Mandelbulb),
            _ => Err(UnknownFractalType(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Colors {
    pub primary: Rgb,
    pub secondary: Rgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Motion {
    pub bass_strength: f32,
    pub treble_strength: f32,
    pub rotation_speed: f32,
    pub zoom_pulse: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quality {
    pub iterations: u32,
    pub ray_steps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JuliaParams {
    pub cx: f32,
    pub cy: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorMode {
    pub rainbow: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FractalConfiguration {
    pub fractal_type: FractalType,
    pub colors: Colors,
    pub motion: Motion,
    pub quality: Quality,
    pub julia: JuliaParams,
    pub color_mode: ColorMode,
}

impl Default for FractalConfiguration {
    fn default() -> Self {
        Self {
            fractal_type: FractalType::Julia,
            colors: Colors {
                primary: [0.15, 0.55, 1.0],
                secondary: [1.0, 0.3, 0.65],
            },
            motion: Motion {
                bass_strength: 1.5,
                treble_strength: 1.0,
                rotation_speed: 0.5,
                zoom_pulse: 0.15,
            },
            quality: Quality {
                iterations: 200,
                ray_steps: 96,
            },
            julia: JuliaParams { cx: -0.4, cy: -0.59 },
            color_mode: ColorMode { rainbow: false },
        }
    }
}

// Partial updates. Every nested record is merged key by key; `fractal_type`
// is the only top-level scalar and is replaced outright.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartialConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fractal_type: Option<FractalType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colors: Option<PartialColors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motion: Option<PartialMotion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<PartialQuality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub julia: Option<PartialJulia>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_mode: Option<PartialColorMode>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialColors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<Rgb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<Rgb>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartialMotion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bass_strength: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treble_strength: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_speed: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom_pulse: Option<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartialQuality {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ray_steps: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialJulia {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cx: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cy: Option<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialColorMode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rainbow: Option<bool>,
}

impl PartialConfig {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn fractal_type(t: FractalType) -> Self {
        Self {
            fractal_type: Some(t),
            ..Self::default()
        }
    }

    pub fn julia(preset: JuliaPreset) -> Self {
        Self {
            julia: Some(preset.into()),
            ..Self::default()
        }
    }

    pub fn motion(motion: PartialMotion) -> Self {
        Self {
            motion: Some(motion),
            ..Self::default()
        }
    }

    pub fn quality(quality: PartialQuality) -> Self {
        Self {
            quality: Some(quality),
            ..Self::default()
        }
    }

    pub fn colors(colors: PartialColors) -> Self {
        Self {
            colors: Some(colors),
            ..Self::default()
        }
    }

    pub fn rainbow(on: bool) -> Self {
        Self {
            color_mode: Some(PartialColorMode { rainbow: Some(on) }),
            ..Self::default()
        }
    }
}

/// Key-by-key merge of a partial record into its full counterpart.
pub trait Merge {
    type Patch;

    fn merge(&mut self, patch: &Self::Patch);
}

fn assign<T: Copy>(dst: &mut T, src: Option<T>) {
    if let Some(v) = src {
        *dst = v;
    }
}

impl Merge for Colors {
    type Patch = PartialColors;

    fn merge(&mut self, patch: &PartialColors) {
        assign(&mut self.primary, patch.primary);
        assign(&mut self.secondary, patch.secondary);
    }
}

impl Merge for Motion {
    type Patch = PartialMotion;

    fn merge(&mut self, patch: &PartialMotion) {
        assign(&mut self.bass_strength, patch.bass_strength);
        assign(&mut self.treble_strength, patch.treble_strength);
        assign(&mut self.rotation_speed, patch.rotation_speed);
        assign(&mut self.zoom_pulse, patch.zoom_pulse);
    }
}

impl Merge for Quality {
    type Patch = PartialQuality;

    fn merge(&mut self, patch: &PartialQuality) {
        assign(&mut self.iterations, patch.iterations);
        assign(&mut self.ray_steps, patch.ray_steps);
    }
}

impl Merge for JuliaParams {
    type Patch = PartialJulia;

    fn merge(&mut self, patch: &PartialJulia) {
        assign(&mut self.cx, patch.cx);
        assign(&mut self.cy, patch.cy);
    }
}

impl Merge for ColorMode {
    type Patch = PartialColorMode;

    fn merge(&mut self, patch: &PartialColorMode) {
        assign(&mut self.rainbow, patch.rainbow);
    }
}

impl Merge for FractalConfiguration {
    type Patch = PartialConfig;

    fn merge(&mut self, patch: &PartialConfig) {
        assign(&mut self.fractal_type, patch.fractal_type);
        if let Some(p) = &patch.colors {
            self.colors.merge(p);
        }
        if let Some(p) = &patch.motion {
            self.motion.merge(p);
        }
        if let Some(p) = &patch.quality {
            self.quality.merge(p);
        }
        if let Some(p) = &patch.julia {
            self.julia.merge(p);
        }
        if let Some(p) = &patch.color_mode {
            self.color_mode.merge(p);
        }
    }
}

/// Returns `base` with `patch` merged in. `base` is left untouched.
pub fn merge_config(base: &FractalConfiguration, patch: &PartialConfig) -> FractalConfiguration {
    let mut out = base.clone();
    out.merge(patch);
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JuliaPreset {
    pub name: &'static str,
    pub cx: f32,
    pub cy: f32,
}

impl From<JuliaPreset> for JuliaParams {
    fn from(p: JuliaPreset) -> Self {
        Self { cx: p.cx, cy: p.cy }
    }
}

impl From<JuliaPreset> for PartialJulia {
    fn from(p: JuliaPreset) -> Self {
        Self {
            cx: Some(p.cx),
            cy: Some(p.cy),
        }
    }
}

pub const JULIA_PRESETS: [JuliaPreset; 6] = [
    JuliaPreset { name: "classic", cx: 0.0, cy: 0.8 },
    JuliaPreset { name: "dragon", cx: 0.37, cy: 0.1 },
    JuliaPreset { name: "snowflake", cx: 0.355, cy: 0.355 },
    JuliaPreset { name: "spiral", cx: 0.34, cy: -0.05 },
    JuliaPreset { name: "lotus", cx: -0.54, cy: 0.54 },
    JuliaPreset { name: "chaos", cx: -0.4, cy: -0.59 },
];

pub fn julia_presets() -> &'static [JuliaPreset] {
    &JULIA_PRESETS
}

pub fn julia_preset(name: &str) -> Option<JuliaPreset> {
    let want = name.trim();
    JULIA_PRESETS
        .iter()
        .copied()
        .find(|p| p.name.eq_ignore_ascii_case(want))
}

/// Name of the preset whose constant matches `julia`, if any.
pub fn preset_name_for(julia: JuliaParams) -> Option<&'static str> {
    JULIA_PRESETS
        .iter()
        .find(|p| (p.cx - julia.cx).abs() < 1e-4 && (p.cy - julia.cy).abs() < 1e-4)
        .map(|p| p.name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HexColorError {
    Length(usize),
    Digit(char),
}

impl fmt::Display for HexColorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Length(n) => write!(f, "expected 3 or 6 hex digits, got {n}"),
            Self::Digit(c) => write!(f, "invalid hex digit: {c:?}"),
        }
    }
}

impl std::error::Error for HexColorError {}

/// `#RRGGBB` (or `#RGB`, `#` optional) to a shader-ready triple in [0, 1].
pub fn hex_to_rgb01(hex: &str) -> Result<Rgb, HexColorError> {
    let digits = hex.trim().trim_start_matches('#');
    let mut nibbles = [0u8; 6];
    let count = digits.chars().count();
    match count {
        6 => {
            for (slot, ch) in nibbles.iter_mut().zip(digits.chars()) {
                *slot = nibble(ch)?;
            }
        }
        3 => {
            for (i, ch) in digits.chars().enumerate() {
                let v = nibble(ch)?;
                nibbles[i * 2] = v;
                nibbles[i * 2 + 1] = v;
            }
        }
        n => return Err(HexColorError::Length(n)),
    }
    let channel = |i: usize| f32::from(nibbles[i] * 16 + nibbles[i + 1]) / 255.0;
    Ok([channel(0), channel(2), channel(4)])
}

fn nibble(ch: char) -> Result<u8, HexColorError> {
    ch.to_digit(16)
        .map(|d| d as u8)
        .ok_or(HexColorError::Digit(ch))
}

pub fn rgb01_to_hex(rgb: Rgb) -> String {
    let byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    format!("#{:02x}{:02x}{:02x}", byte(rgb[0]), byte(rgb[1]), byte(rgb[2]))
}

pub type LiveUniforms = Rc<RefCell<UniformSet>>;

/// Holds the current configuration and, while a session runs, a weak link
/// to that session's uniform set so updates land on the next frame.
#[derive(Debug, Default)]
pub struct ConfigStore {
    current: FractalConfiguration,
    live: Weak<RefCell<UniformSet>>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FractalConfiguration) -> Self {
        Self {
            current: config,
            live: Weak::new(),
        }
    }

    pub fn snapshot(&self) -> FractalConfiguration {
        self.current.clone()
    }

    pub fn fractal_type(&self) -> FractalType {
        self.current.fractal_type
    }

    /// Merges `patch` and pushes the result into the bound uniform set.
    /// Never fails; out-of-range values are passed through.
    pub fn update(&mut self, patch: &PartialConfig) -> FractalConfiguration {
        self.current.merge(patch);
        if let Some(live) = self.live.upgrade() {
            live.borrow_mut().apply_config(&self.current);
        }
        self.current.clone()
    }

    pub fn bind(&mut self, uniforms: &LiveUniforms) {
        self.live = Rc::downgrade(uniforms);
    }

    /// Drops the live link if it still points at `uniforms`.
    pub fn unbind(&mut self, uniforms: &LiveUniforms) {
        if let Some(live) = self.live.upgrade() {
            if Rc::ptr_eq(&live, uniforms) {
                self.live = Weak::new();
            }
        }
    }

    pub fn live_uniforms(&self) -> Option<LiveUniforms> {
        self.live.upgrade()
    }
}
