//! Saved visualizer settings: the flat JSON a project stores next to its
//! audio file, and its conversion back into a partial configuration.

use crate::fractal_config::{
    hex_to_rgb01, julia_preset, preset_name_for, rgb01_to_hex, FractalConfiguration, FractalType,
    PartialColorMode, PartialColors, PartialConfig, PartialMotion, PartialQuality,
};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SavedSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fractal_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub julia_preset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub julia_cx: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub julia_cy: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ray_steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bass_strength: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treble_strength: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_speed: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom_pulse: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rainbow: Option<bool>,
}

impl SavedSettings {
    /// Captures `cfg`. The Julia constant is stored by preset name when it
    /// matches one, otherwise as raw `juliaCx`/`juliaCy`.
    pub fn from_config(cfg: &FractalConfiguration) -> Self {
        let preset = preset_name_for(cfg.julia);
        Self {
            fractal_type: Some(cfg.fractal_type.as_str().to_string()),
            julia_preset: preset.map(str::to_string),
            julia_cx: preset.is_none().then_some(cfg.julia.cx),
            julia_cy: preset.is_none().then_some(cfg.julia.cy),
            iterations: Some(cfg.quality.iterations),
            ray_steps: Some(cfg.quality.ray_steps),
            bass_strength: Some(cfg.motion.bass_strength),
            treble_strength: Some(cfg.motion.treble_strength),
            rotation_speed: Some(cfg.motion.rotation_speed),
            zoom_pulse: Some(cfg.motion.zoom_pulse),
            primary_color: Some(rgb01_to_hex(cfg.colors.primary)),
            secondary_color: Some(rgb01_to_hex(cfg.colors.secondary)),
            rainbow: Some(cfg.color_mode.rainbow),
        }
    }
}

/// Converts saved settings into a merge patch. Unknown fractal types or
/// preset names and unparsable colors are skipped with a warning.
pub fn saved_to_partial_config(saved: &SavedSettings) -> PartialConfig {
    let mut patch = PartialConfig::default();

    if let Some(raw) = &saved.fractal_type {
        match raw.parse::<FractalType>() {
            Ok(t) => patch.fractal_type = Some(t),
            Err(err) => warn!("saved settings: {err}"),
        }
    }

    if let Some(name) = &saved.julia_preset {
        match julia_preset(name) {
            Some(p) => patch.julia = Some(p.into()),
            None => warn!("saved settings: unknown julia preset {name:?}"),
        }
    }
    if saved.julia_cx.is_some() || saved.julia_cy.is_some() {
        let julia = patch.julia.get_or_insert_with(Default::default);
        if saved.julia_cx.is_some() {
            julia.cx = saved.julia_cx;
        }
        if saved.julia_cy.is_some() {
            julia.cy = saved.julia_cy;
        }
    }

    let quality = PartialQuality {
        iterations: saved.iterations,
        ray_steps: saved.ray_steps,
    };
    if quality != PartialQuality::default() {
        patch.quality = Some(quality);
    }

    let motion = PartialMotion {
        bass_strength: saved.bass_strength,
        treble_strength: saved.treble_strength,
        rotation_speed: saved.rotation_speed,
        zoom_pulse: saved.zoom_pulse,
    };
    if motion != PartialMotion::default() {
        patch.motion = Some(motion);
    }

    let colors = PartialColors {
        primary: saved.primary_color.as_deref().and_then(parse_color),
        secondary: saved.secondary_color.as_deref().and_then(parse_color),
    };
    if colors != PartialColors::default() {
        patch.colors = Some(colors);
    }

    if let Some(on) = saved.rainbow {
        patch.color_mode = Some(PartialColorMode { rainbow: Some(on) });
    }

    patch
}

fn parse_color(hex: &str) -> Option<[f32; 3]> {
    match hex_to_rgb01(hex) {
        Ok(rgb) => Some(rgb),
        Err(err) => {
            warn!("saved settings: color {hex:?}: {err}");
            None
        }
    }
}

#[derive(Debug)]
pub enum ProjectError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for ProjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Json(err) => write!(f, "invalid project JSON: {err}"),
        }
    }
}

impl std::error::Error for ProjectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for ProjectError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for ProjectError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

/// An audio/visualization pairing. `settings_json` holds a serialized
/// [`SavedSettings`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FractalProject {
    pub title: String,
    pub fractal_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<PathBuf>,
    pub settings_json: String,
}

impl FractalProject {
    pub fn new(
        title: &str,
        cfg: &FractalConfiguration,
        audio_path: Option<&Path>,
    ) -> Result<Self, ProjectError> {
        let settings = SavedSettings::from_config(cfg);
        Ok(Self {
            title: title.to_string(),
            fractal_type: cfg.fractal_type.as_str().to_string(),
            audio_path: audio_path.map(Path::to_path_buf),
            settings_json: serde_json::to_string(&settings)?,
        })
    }

    pub fn settings(&self) -> Result<SavedSettings, ProjectError> {
        Ok(serde_json::from_str(&self.settings_json)?)
    }

    /// Patch that restores this project's look; the project's own
    /// `fractal_type` wins over one embedded in the settings.
    pub fn to_partial_config(&self) -> Result<PartialConfig, ProjectError> {
        let mut saved = self.settings()?;
        saved.fractal_type = Some(self.fractal_type.clone());
        Ok(saved_to_partial_config(&saved))
    }

    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ProjectError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let body = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
