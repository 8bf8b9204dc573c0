use fractal_studio::audio::{resample_interleaved, AnalyserTap, TapBus, DEFAULT_FFT_SIZE};
use fractal_studio::spectrum::{
    levels_from_bins, AudioLevels, FixedSpectrum, SpectrumAnalyzer, SpectrumSource, BASS_BINS,
};
use std::f32::consts::PI;

fn sine(freq: f32, sample_rate: f32, n: usize, amp: f32) -> Vec<f32> {
    (0..n)
        .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin() * amp)
        .collect()
}

#[test]
fn levels_split_at_bass_bins() {
    let mut bins = vec![0u8; 1024];
    bins[..BASS_BINS].fill(255);
    let levels = levels_from_bins(&bins);
    assert_eq!(levels.bass, 1.0);
    assert_eq!(levels.treble, 0.0);

    let mut bins = vec![255u8; 1024];
    bins[..BASS_BINS].fill(0);
    let levels = levels_from_bins(&bins);
    assert_eq!(levels.bass, 0.0);
    assert_eq!(levels.treble, 1.0);
}

#[test]
fn levels_are_means_in_unit_range() {
    let bins: Vec<u8> = (0..64).map(|i| if i % 2 == 0 { 255 } else { 0 }).collect();
    let levels = levels_from_bins(&bins);
    assert!((levels.bass - 0.5).abs() < 1e-6);
    assert!((levels.treble - 0.5).abs() < 1e-6);
}

#[test]
fn short_or_empty_spectra_do_not_panic() {
    assert_eq!(levels_from_bins(&[]), AudioLevels::default());
    let levels = levels_from_bins(&[255, 255, 255]);
    assert_eq!(levels.bass, 1.0);
    assert_eq!(levels.treble, 0.0);
}

#[test]
fn analyzer_keeps_last_levels_while_source_is_silent() {
    let mut analyzer = SpectrumAnalyzer::new(Box::new(FixedSpectrum::silent(1024)));
    assert_eq!(analyzer.sample(), AudioLevels::default());
    assert_eq!(analyzer.bins().len(), 1024);

    let mut bins = vec![0u8; 1024];
    bins[..BASS_BINS].fill(204);
    let mut analyzer = SpectrumAnalyzer::new(Box::new(FixedSpectrum::new(bins)));
    let first = analyzer.sample();
    assert!((first.bass - 0.8).abs() < 1e-6);
    assert_eq!(analyzer.last_levels(), first);
}

struct Script {
    frames: Vec<Option<Vec<u8>>>,
}

impl SpectrumSource for Script {
    fn frequency_bin_count(&self) -> usize {
        16
    }

    fn byte_frequency_data(&mut self, out: &mut [u8]) -> bool {
        match self.frames.remove(0) {
            Some(bins) => {
                out.copy_from_slice(&bins);
                true
            }
            None => false,
        }
    }
}

#[test]
fn analyzer_reuses_previous_frame_on_gaps() {
    let loud = vec![255u8; 16];
    let mut analyzer = SpectrumAnalyzer::new(Box::new(Script {
        frames: vec![Some(loud), None, Some(vec![0u8; 16])],
    }));
    assert_eq!(analyzer.sample().bass, 1.0);
    assert_eq!(analyzer.sample().bass, 1.0, "gap keeps last known level");
    assert_eq!(analyzer.sample().bass, 0.0);
}

#[test]
fn tap_reports_no_data_before_audio() {
    let bus = TapBus::new();
    let mut tap = AnalyserTap::connect(&bus, DEFAULT_FFT_SIZE).expect("connect");
    assert_eq!(tap.frequency_bin_count(), DEFAULT_FFT_SIZE / 2);
    let mut out = vec![9u8; tap.frequency_bin_count()];
    assert!(!tap.byte_frequency_data(&mut out));
    assert!(out.iter().all(|&b| b == 9));
}

#[test]
fn low_tone_reads_as_bass() {
    let bus = TapBus::new();
    let tap = AnalyserTap::connect(&bus, DEFAULT_FFT_SIZE).expect("connect");
    let mut analyzer = SpectrumAnalyzer::new(Box::new(tap));

    bus.push_block(&sine(100.0, 44_100.0, DEFAULT_FFT_SIZE, 0.5));
    let levels = analyzer.sample();
    assert!(levels.bass > 0.3, "bass={}", levels.bass);
    assert!(levels.bass > levels.treble * 2.0, "{levels:?}");
}

#[test]
fn high_tone_reads_as_treble() {
    let bus = TapBus::new();
    let tap = AnalyserTap::connect(&bus, DEFAULT_FFT_SIZE).expect("connect");
    let mut analyzer = SpectrumAnalyzer::new(Box::new(tap));

    let mut white = fastrand::Rng::with_seed(3);
    let noise: Vec<f32> = (0..DEFAULT_FFT_SIZE)
        .map(|i| {
            let hiss = (white.f32() * 2.0 - 1.0) * 0.3;
            hiss + (2.0 * PI * 6_000.0 * i as f32 / 44_100.0).sin() * 0.3
        })
        .collect();
    bus.push_block(&noise);
    let levels = analyzer.sample();
    assert!(levels.treble > 0.3, "treble={}", levels.treble);
}

#[test]
fn dropping_a_tap_detaches_only_that_tap() {
    let bus = TapBus::new();
    let a = AnalyserTap::connect(&bus, 1024).expect("connect a");
    let b = AnalyserTap::connect(&bus, 1024).expect("connect b");
    assert_eq!(bus.tap_count(), 2);
    drop(a);
    assert_eq!(bus.tap_count(), 1);
    drop(b);
    assert_eq!(bus.tap_count(), 0);

    // The bus keeps accepting audio with nothing attached.
    bus.push_block(&[0.1; 64]);
}

#[test]
fn invalid_fft_sizes_are_rejected() {
    let bus = TapBus::new();
    assert!(AnalyserTap::connect(&bus, 1000).is_err());
    assert!(AnalyserTap::connect(&bus, 16).is_err());
    assert!(AnalyserTap::connect(&bus, 65_536).is_err());
    assert_eq!(bus.tap_count(), 0);
}

#[test]
fn resample_maps_channels_and_rate() {
    let stereo = vec![1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
    let mono = resample_interleaved(&stereo, 2, 48_000, 1, 48_000);
    assert_eq!(mono, vec![0.0; 4]);

    let up = resample_interleaved(&[0.0, 1.0], 1, 24_000, 2, 48_000);
    assert_eq!(up.len(), 8);
    assert_eq!(&up[..4], &[0.0, 0.0, 0.5, 0.5]);

    assert!(resample_interleaved(&[], 2, 44_100, 2, 48_000).is_empty());
    assert!(resample_interleaved(&[0.5; 4], 1, 0, 1, 48_000).is_empty());
}
