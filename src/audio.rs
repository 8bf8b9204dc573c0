//! Audio routing. An `AudioGraph` owns the source-to-output path (a WAV file
//! played on an output device, or a capture device); analysis taps attach to
//! and detach from it without touching that path.

use crate::spectrum::{FixedSpectrum, SpectrumSource};
use anyhow::{anyhow, bail, Context};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use log::{debug, info, warn};
use ringbuf::traits::{Consumer as _, Producer as _, Split as _};
use ringbuf::HeapRb;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const SMOOTHING_TIME_CONSTANT: f32 = 0.8;
pub const MIN_DECIBELS: f32 = -100.0;
pub const MAX_DECIBELS: f32 = -30.0;

/// Something an analysis tap can be attached to.
pub trait AudioRoute {
    fn connect_analyser(&self, fft_size: usize) -> anyhow::Result<Box<dyn SpectrumSource>>;

    fn describe(&self) -> String;

    fn set_paused(&self, _paused: bool) {}

    fn is_paused(&self) -> bool {
        false
    }
}

/// Fan-out point between the audio callback and the connected taps.
pub struct TapBus {
    taps: Mutex<Vec<(u64, ringbuf::HeapProd<f32>)>>,
    next_id: AtomicU64,
}

impl TapBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            taps: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Feeds mono samples to every connected tap. Full taps drop samples.
    pub fn push_block(&self, mono: &[f32]) {
        let Ok(mut taps) = self.taps.lock() else {
            return;
        };
        for (_, prod) in taps.iter_mut() {
            let _ = prod.push_slice(mono);
        }
    }

    pub fn tap_count(&self) -> usize {
        self.taps.lock().map(|t| t.len()).unwrap_or(0)
    }

    fn connect(&self, prod: ringbuf::HeapProd<f32>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut taps) = self.taps.lock() {
            taps.push((id, prod));
        }
        id
    }

    fn disconnect(&self, id: u64) {
        if let Ok(mut taps) = self.taps.lock() {
            taps.retain(|(tap_id, _)| *tap_id != id);
        }
    }
}

/// Frequency-domain analysis tap. Reports `fft_size / 2` byte bins mapped
/// over [`MIN_DECIBELS`, `MAX_DECIBELS`] with exponential time smoothing.
pub struct AnalyserTap {
    id: u64,
    bus: Arc<TapBus>,
    cons: ringbuf::HeapCons<f32>,
    window: Vec<f32>,
    write_pos: usize,
    received: bool,
    blackman: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    fft_buf: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl AnalyserTap {
    pub fn connect(bus: &Arc<TapBus>, fft_size: usize) -> anyhow::Result<Self> {
        if !fft_size.is_power_of_two() || !(32..=32_768).contains(&fft_size) {
            bail!("fft size must be a power of two in 32..=32768, got {fft_size}");
        }
        let rb = HeapRb::<f32>::new(fft_size.saturating_mul(8));
        let (prod, cons) = rb.split();
        let id = bus.connect(prod);

        let n = fft_size as f32;
        let blackman = (0..fft_size)
            .map(|i| {
                let x = i as f32 / n;
                0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
            })
            .collect();
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);

        debug!("analyser tap {id} connected (fft_size={fft_size})");
        Ok(Self {
            id,
            bus: Arc::clone(bus),
            cons,
            window: vec![0.0; fft_size],
            write_pos: 0,
            received: false,
            blackman,
            fft,
            fft_buf: vec![Complex { re: 0.0, im: 0.0 }; fft_size],
            smoothed: vec![0.0; fft_size / 2],
        })
    }

    pub fn fft_size(&self) -> usize {
        self.window.len()
    }

    fn drain(&mut self) {
        let n = self.window.len();
        while let Some(s) = self.cons.try_pop() {
            self.window[self.write_pos] = s;
            self.write_pos = (self.write_pos + 1) % n;
            self.received = true;
        }
    }
}

impl SpectrumSource for AnalyserTap {
    fn frequency_bin_count(&self) -> usize {
        self.smoothed.len()
    }

    fn byte_frequency_data(&mut self, out: &mut [u8]) -> bool {
        self.drain();
        if !self.received {
            return false;
        }

        let n = self.window.len();
        for i in 0..n {
            let s = self.window[(self.write_pos + i) % n];
            self.fft_buf[i] = Complex {
                re: s * self.blackman[i],
                im: 0.0,
            };
        }
        self.fft.process(&mut self.fft_buf);

        let scale = 1.0 / n as f32;
        let range = MAX_DECIBELS - MIN_DECIBELS;
        for (k, slot) in self.smoothed.iter_mut().enumerate() {
            let mag = self.fft_buf[k].norm() * scale;
            *slot = SMOOTHING_TIME_CONSTANT * *slot + (1.0 - SMOOTHING_TIME_CONSTANT) * mag;
            if let Some(dst) = out.get_mut(k) {
                *dst = if *slot > 0.0 {
                    let db = 20.0 * slot.log10();
                    (255.0 * (db - MIN_DECIBELS) / range).clamp(0.0, 255.0) as u8
                } else {
                    0
                };
            }
        }
        true
    }
}

impl Drop for AnalyserTap {
    fn drop(&mut self) {
        self.bus.disconnect(self.id);
        debug!("analyser tap {} disconnected", self.id);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteKind {
    File(PathBuf),
    Input(String),
}

/// Live audio route. Dropping it stops playback/capture.
pub struct AudioGraph {
    _stream: cpal::Stream,
    bus: Arc<TapBus>,
    paused: Arc<AtomicBool>,
    pub sample_rate_hz: u32,
    pub kind: RouteKind,
}

impl AudioGraph {
    /// Decodes `path` and plays it on the default (or matching) output device.
    pub fn play_file(path: &Path, device_query: Option<&str>, looping: bool) -> anyhow::Result<Self> {
        let host = cpal::default_host();
        let device = select_output_device(&host, device_query)?;
        let supported = device
            .default_output_config()
            .context("get default output config")?;
        let sample_rate_hz = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let config: cpal::StreamConfig = supported.clone().into();

        let clip = decode_wav(path).with_context(|| format!("decode {}", path.display()))?;
        let samples = Arc::new(resample_interleaved(
            &clip.samples,
            clip.channels,
            clip.sample_rate_hz,
            channels,
            sample_rate_hz,
        ));
        if samples.is_empty() {
            bail!("{} contains no audio", path.display());
        }

        let bus = TapBus::new();
        let paused = Arc::new(AtomicBool::new(false));
        let player = Player {
            samples,
            channels,
            pos: Arc::new(AtomicUsize::new(0)),
            looping,
            paused: Arc::clone(&paused),
            bus: Arc::clone(&bus),
        };

        let err_fn = |err| warn!("audio output stream error: {err}");
        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                device.build_output_stream(&config, move |data: &mut [f32], _| player.fill(data), err_fn, None)?
            }
            SampleFormat::I16 => {
                device.build_output_stream(&config, move |data: &mut [i16], _| player.fill(data), err_fn, None)?
            }
            SampleFormat::U16 => {
                device.build_output_stream(&config, move |data: &mut [u16], _| player.fill(data), err_fn, None)?
            }
            fmt => return Err(anyhow!("unsupported sample format: {fmt:?}")),
        };
        stream.play().context("start output stream")?;

        info!(
            "playing {} ({} Hz, {} ch) at {} Hz",
            path.display(),
            clip.sample_rate_hz,
            clip.channels,
            sample_rate_hz
        );
        Ok(Self {
            _stream: stream,
            bus,
            paused,
            sample_rate_hz,
            kind: RouteKind::File(path.to_path_buf()),
        })
    }

    /// Captures the default (or matching) input device.
    pub fn capture_input(device_query: Option<&str>) -> anyhow::Result<Self> {
        let host = cpal::default_host();
        let device = select_input_device(&host, device_query)?;
        let name = device.name().unwrap_or_else(|_| "<unknown>".to_string());
        let supported = device
            .default_input_config()
            .context("get default input config")?;
        let sample_rate_hz = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let config: cpal::StreamConfig = supported.clone().into();

        let bus = TapBus::new();
        let paused = Arc::new(AtomicBool::new(false));
        let err_fn = |err| warn!("audio input stream error: {err}");
        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                let (bus, paused) = (Arc::clone(&bus), Arc::clone(&paused));
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _| push_interleaved(data, channels, &bus, &paused),
                    err_fn,
                    None,
                )?
            }
            SampleFormat::I16 => {
                let (bus, paused) = (Arc::clone(&bus), Arc::clone(&paused));
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _| push_interleaved(data, channels, &bus, &paused),
                    err_fn,
                    None,
                )?
            }
            SampleFormat::U16 => {
                let (bus, paused) = (Arc::clone(&bus), Arc::clone(&paused));
                device.build_input_stream(
                    &config,
                    move |data: &[u16], _| push_interleaved(data, channels, &bus, &paused),
                    err_fn,
                    None,
                )?
            }
            fmt => return Err(anyhow!("unsupported sample format: {fmt:?}")),
        };
        stream.play().context("start input stream")?;

        info!("capturing {name} at {sample_rate_hz} Hz");
        Ok(Self {
            _stream: stream,
            bus,
            paused,
            sample_rate_hz,
            kind: RouteKind::Input(name),
        })
    }

    pub fn tap_count(&self) -> usize {
        self.bus.tap_count()
    }
}

impl AudioRoute for AudioGraph {
    fn connect_analyser(&self, fft_size: usize) -> anyhow::Result<Box<dyn SpectrumSource>> {
        Ok(Box::new(AnalyserTap::connect(&self.bus, fft_size)?))
    }

    fn describe(&self) -> String {
        match &self.kind {
            RouteKind::File(p) => format!("file {}", p.display()),
            RouteKind::Input(name) => format!("input {name}"),
        }
    }

    fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }
}

/// A route with no audio behind it; taps never report data.
#[derive(Debug, Default)]
pub struct SilentRoute;

impl AudioRoute for SilentRoute {
    fn connect_analyser(&self, fft_size: usize) -> anyhow::Result<Box<dyn SpectrumSource>> {
        Ok(Box::new(FixedSpectrum::silent(fft_size / 2)))
    }

    fn describe(&self) -> String {
        "silent".to_string()
    }
}

struct Player {
    samples: Arc<Vec<f32>>,
    channels: usize,
    pos: Arc<AtomicUsize>,
    looping: bool,
    paused: Arc<AtomicBool>,
    bus: Arc<TapBus>,
}

impl Player {
    fn fill<T: SizedSample + FromSample<f32>>(&self, data: &mut [T]) {
        if self.paused.load(Ordering::Relaxed) {
            data.fill(T::from_sample(0.0f32));
            return;
        }

        let Ok(mut taps) = self.bus.taps.lock() else {
            data.fill(T::from_sample(0.0f32));
            return;
        };
        let total = self.samples.len();
        let mut pos = self.pos.load(Ordering::Relaxed);
        for frame in data.chunks_mut(self.channels) {
            if pos >= total {
                if self.looping {
                    pos = 0;
                } else {
                    frame.fill(T::from_sample(0.0f32));
                    for (_, prod) in taps.iter_mut() {
                        let _ = prod.try_push(0.0);
                    }
                    continue;
                }
            }
            let mut acc = 0.0f32;
            for (c, out) in frame.iter_mut().enumerate() {
                let v = self.samples.get(pos + c).copied().unwrap_or(0.0);
                acc += v;
                *out = T::from_sample(v);
            }
            pos += self.channels;
            let mono = acc / self.channels.max(1) as f32;
            for (_, prod) in taps.iter_mut() {
                let _ = prod.try_push(mono);
            }
        }
        self.pos.store(pos, Ordering::Relaxed);
    }
}

fn push_interleaved<T: Sample<Float = f32> + Copy>(
    data: &[T],
    channels: usize,
    bus: &TapBus,
    paused: &AtomicBool,
) {
    if paused.load(Ordering::Relaxed) {
        return;
    }
    let Ok(mut taps) = bus.taps.lock() else {
        return;
    };
    for frame in data.chunks(channels.max(1)) {
        let mut acc = 0.0f32;
        for s in frame {
            acc += (*s).to_float_sample();
        }
        let mono = acc / frame.len().max(1) as f32;
        for (_, prod) in taps.iter_mut() {
            let _ = prod.try_push(mono);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClip {
    pub samples: Vec<f32>,
    pub channels: usize,
    pub sample_rate_hz: u32,
}

pub fn decode_wav(path: &Path) -> anyhow::Result<DecodedClip> {
    let mut reader = hound::WavReader::open(path).context("open wav")?;
    let spec = reader.spec();
    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .context("read float samples")?,
        hound::SampleFormat::Int => {
            let full_scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<Result<Vec<_>, _>>()
                .context("read integer samples")?
        }
    };
    Ok(DecodedClip {
        samples,
        channels: usize::from(spec.channels.max(1)),
        sample_rate_hz: spec.sample_rate,
    })
}

/// Linear resampling plus channel mapping. Extra output channels repeat the
/// last source channel; a mono output averages the source channels.
pub fn resample_interleaved(
    src: &[f32],
    src_channels: usize,
    src_rate: u32,
    dst_channels: usize,
    dst_rate: u32,
) -> Vec<f32> {
    let src_channels = src_channels.max(1);
    let dst_channels = dst_channels.max(1);
    let frames_in = src.len() / src_channels;
    if frames_in == 0 || src_rate == 0 || dst_rate == 0 {
        return Vec::new();
    }
    let frames_out = (frames_in as u64 * u64::from(dst_rate) / u64::from(src_rate)) as usize;
    let step = f64::from(src_rate) / f64::from(dst_rate);

    let sample = |frame: usize, ch: usize| -> f32 {
        let frame = frame.min(frames_in - 1);
        if dst_channels == 1 && src_channels > 1 {
            let base = frame * src_channels;
            src[base..base + src_channels].iter().sum::<f32>() / src_channels as f32
        } else {
            src[frame * src_channels + ch.min(src_channels - 1)]
        }
    };

    let mut out = Vec::with_capacity(frames_out * dst_channels);
    for j in 0..frames_out {
        let p = j as f64 * step;
        let i0 = p.floor() as usize;
        let frac = (p - i0 as f64) as f32;
        for c in 0..dst_channels {
            let a = sample(i0, c);
            let b = sample(i0 + 1, c);
            out.push(a + (b - a) * frac);
        }
    }
    out
}

pub fn list_devices() -> anyhow::Result<()> {
    let host = cpal::default_host();
    let mut out = io::stdout();

    writeln!(out, "Output devices:")?;
    for dev in host.output_devices().context("enumerate output devices")? {
        let name = dev.name().unwrap_or_else(|_| "<unknown>".to_string());
        writeln!(out, "  - {name}")?;
    }
    writeln!(out, "Input devices:")?;
    for dev in host.input_devices().context("enumerate input devices")? {
        let name = dev.name().unwrap_or_else(|_| "<unknown>".to_string());
        writeln!(out, "  - {name}")?;
    }
    Ok(())
}

fn select_output_device(host: &cpal::Host, device_query: Option<&str>) -> anyhow::Result<cpal::Device> {
    if let Some(want) = device_query.map(str::to_lowercase) {
        let devices = host.output_devices().context("enumerate output devices")?;
        return find_named(devices, &want).ok_or_else(|| anyhow!("no output device matching: {want}"));
    }
    host.default_output_device()
        .ok_or_else(|| anyhow!("no default output device found"))
}

fn select_input_device(host: &cpal::Host, device_query: Option<&str>) -> anyhow::Result<cpal::Device> {
    if let Some(want) = device_query.map(str::to_lowercase) {
        let devices = host.input_devices().context("enumerate input devices")?;
        return find_named(devices, &want).ok_or_else(|| anyhow!("no input device matching: {want}"));
    }
    host.default_input_device()
        .ok_or_else(|| anyhow!("no default input device found"))
}

fn find_named(mut devices: impl Iterator<Item = cpal::Device>, want: &str) -> Option<cpal::Device> {
    devices.find(|d| {
        d.name()
            .map(|n| n.to_lowercase().contains(want))
            .unwrap_or(false)
    })
}
