//! Per-frame band energy (bass / treble) from a byte frequency spectrum.

/// Number of low bins averaged into the bass level.
pub const BASS_BINS: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioLevels {
    pub bass: f32,
    pub treble: f32,
}

/// A frequency-domain tap with byte magnitudes (0..=255) per bin.
pub trait SpectrumSource {
    fn frequency_bin_count(&self) -> usize;

    /// Fills `out` with the current spectrum. Returns `false` when nothing
    /// has been captured yet; `out` is then left untouched.
    fn byte_frequency_data(&mut self, out: &mut [u8]) -> bool;
}

/// Mean of the first `BASS_BINS` bins and of the rest, each scaled to [0, 1].
pub fn levels_from_bins(bins: &[u8]) -> AudioLevels {
    if bins.is_empty() {
        return AudioLevels::default();
    }
    let split = BASS_BINS.min(bins.len());
    let (low, high) = bins.split_at(split);
    AudioLevels {
        bass: mean_unit(low),
        treble: mean_unit(high),
    }
}

fn mean_unit(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u32 = bins.iter().map(|&b| u32::from(b)).sum();
    sum as f32 / (bins.len() as f32 * 255.0)
}

pub struct SpectrumAnalyzer {
    source: Box<dyn SpectrumSource>,
    bins: Vec<u8>,
    last: AudioLevels,
}

impl SpectrumAnalyzer {
    pub fn new(source: Box<dyn SpectrumSource>) -> Self {
        let bins = vec![0u8; source.frequency_bin_count()];
        Self {
            source,
            bins,
            last: AudioLevels::default(),
        }
    }

    /// Reads the tap once. Before any audio arrives this returns the last
    /// known levels (zero at start).
    pub fn sample(&mut self) -> AudioLevels {
        if self.source.byte_frequency_data(&mut self.bins) {
            self.last = levels_from_bins(&self.bins);
        }
        self.last
    }

    pub fn last_levels(&self) -> AudioLevels {
        self.last
    }

    pub fn bins(&self) -> &[u8] {
        &self.bins
    }
}

/// A source with a fixed spectrum. `silent()` never reports data.
#[derive(Debug, Clone)]
pub struct FixedSpectrum {
    bins: Option<Vec<u8>>,
    len: usize,
}

impl FixedSpectrum {
    pub fn new(bins: Vec<u8>) -> Self {
        let len = bins.len();
        Self {
            bins: Some(bins),
            len,
        }
    }

    pub fn silent(len: usize) -> Self {
        Self { bins: None, len }
    }

    pub fn set(&mut self, bins: Vec<u8>) {
        self.len = bins.len();
        self.bins = Some(bins);
    }
}

impl SpectrumSource for FixedSpectrum {
    fn frequency_bin_count(&self) -> usize {
        self.len
    }

    fn byte_frequency_data(&mut self, out: &mut [u8]) -> bool {
        let Some(bins) = &self.bins else {
            return false;
        };
        let n = out.len().min(bins.len());
        out[..n].copy_from_slice(&bins[..n]);
        true
    }
}
