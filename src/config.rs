use crate::audio::DEFAULT_FFT_SIZE;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "fractal_studio", version, about = "Audio-reactive fractal visualizer for the terminal")]
pub struct Config {
    /// julia, mandelbrot or mandelbulb. Other names start a blank session.
    #[arg(long, default_value = "julia")]
    pub fractal: String,

    #[arg(long, default_value = "fractal-container")]
    pub container: String,

    #[arg(long, value_enum)]
    pub source: Option<AudioSource>,

    /// WAV file to play; implies `--source file`.
    #[arg(long)]
    pub audio: Option<PathBuf>,

    #[arg(long)]
    pub device: Option<String>,

    #[arg(long, default_value_t = false)]
    pub loop_audio: bool,

    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// Saved settings JSON, applied before the first session starts and
    /// written back by `s`.
    #[arg(long)]
    pub settings: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_FFT_SIZE)]
    pub fft_size: usize,

    #[arg(long, default_value_t = false)]
    pub list_devices: bool,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub sync_updates: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AudioSource {
    #[value(alias = "input")]
    Mic,
    File,
    #[value(alias = "silent")]
    None,
}

impl Config {
    /// `--source` when given, otherwise file if `--audio` is set, else mic.
    pub fn audio_source(&self) -> AudioSource {
        match (self.source, &self.audio) {
            (Some(source), _) => source,
            (None, Some(_)) => AudioSource::File,
            (None, None) => AudioSource::Mic,
        }
    }
}
