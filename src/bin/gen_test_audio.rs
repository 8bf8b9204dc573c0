//! Writes a WAV fixture for manual runs: bass pulses, then a treble sweep,
//! then both together.

use std::f32::consts::PI;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "gen_test_audio", about = "Generate a bass/treble test WAV")]
struct Args {
    #[arg(long, default_value = "assets/test/fractal_fixture.wav")]
    out: PathBuf,

    #[arg(long, default_value_t = 44_100)]
    sample_rate: u32,

    /// Seed for the noise layer.
    #[arg(long, default_value_t = 7)]
    seed: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let sr = args.sample_rate.clamp(8_000, 192_000);

    if let Some(parent) = args.out.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
    }

    let mut rng = fastrand::Rng::with_seed(args.seed);
    let mut samples = Vec::<f32>::new();
    push_silence(&mut samples, sr, 1.0);
    push_bass_pulses(&mut samples, sr, &mut rng, 16, 120.0);
    push_treble_sweep(&mut samples, sr, 6.0, 2_000.0, 12_000.0);
    push_mixed(&mut samples, sr, &mut rng, 8.0);
    push_silence(&mut samples, sr, 1.0);

    write_wav(&args.out, sr, &samples).with_context(|| format!("write {}", args.out.display()))?;

    println!("generated: {}", args.out.display());
    println!(
        "sample_rate={}Hz duration={:.2}s samples={}",
        sr,
        samples.len() as f32 / sr as f32,
        samples.len()
    );
    Ok(())
}

fn push_silence(out: &mut Vec<f32>, sr: u32, seconds: f32) {
    let n = (seconds * sr as f32).round() as usize;
    out.resize(out.len() + n, 0.0);
}

/// Decaying low sine hits on a beat grid, with a little noise on the attack.
fn push_bass_pulses(out: &mut Vec<f32>, sr: u32, rng: &mut fastrand::Rng, beats: usize, bpm: f32) {
    let beat = (60.0 / bpm * sr as f32).round() as usize;
    for b in 0..beats {
        let freq = 45.0 + 5.0 * (b % 4) as f32;
        for i in 0..beat {
            let t = i as f32 / sr as f32;
            let env = (-t * 9.0).exp();
            let attack = if t < 0.01 { (rng.f32() * 2.0 - 1.0) * 0.1 } else { 0.0 };
            out.push((2.0 * PI * freq * t).sin() * 0.9 * env + attack);
        }
    }
}

/// Exponential sweep across the upper spectrum.
fn push_treble_sweep(out: &mut Vec<f32>, sr: u32, seconds: f32, f0: f32, f1: f32) {
    let n = (seconds * sr as f32).round() as usize;
    let mut phase = 0.0f32;
    for i in 0..n {
        let x = i as f32 / n.max(1) as f32;
        let f = f0 * (f1 / f0).powf(x);
        phase = (phase + 2.0 * PI * f / sr as f32) % (2.0 * PI);
        out.push(phase.sin() * 0.5);
    }
}

fn push_mixed(out: &mut Vec<f32>, sr: u32, rng: &mut fastrand::Rng, seconds: f32) {
    let n = (seconds * sr as f32).round() as usize;
    let beat_period = 60.0 / 128.0;
    for i in 0..n {
        let t = i as f32 / sr as f32;
        let beat_phase = (t / beat_period).fract();
        let kick = (2.0 * PI * 50.0 * t).sin() * (-beat_phase * 8.0).exp() * 0.7;
        let hat = (rng.f32() * 2.0 - 1.0) * if beat_phase > 0.5 { 0.15 } else { 0.03 };
        let lead = (2.0 * PI * 3_500.0 * t).sin() * 0.12 * (0.5 + 0.5 * (t * 0.7).sin());
        out.push(kick + hat + lead);
    }
}

fn write_wav(path: &PathBuf, sr: u32, samples: &[f32]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: sr,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}
