use std::sync::Arc;

use ringbuf::{
    traits::{Consumer as _, Observer as _, RingBuffer as _},
    HeapRb,
};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Window length in samples; power of two.
    pub fft_size: usize,
    /// Temporal smoothing of bin magnitudes, 0 = none.
    pub smoothing: f32,
    /// Level mapped to 0.0.
    pub min_db: f32,
    /// Level mapped to 1.0.
    pub max_db: f32,
    pub beat_threshold: f32,
    pub beat_refractory_ms: u64,
    /// Number of low-band readings in the running average.
    pub beat_history: usize,
    pub min_bpm: f32,
    pub max_bpm: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing: 0.8,
            min_db: -100.0,
            max_db: -30.0,
            beat_threshold: 1.3,
            beat_refractory_ms: 250,
            beat_history: 43,
            min_bpm: 60.0,
            max_bpm: 200.0,
        }
    }
}

impl AnalyzerConfig {
    pub fn normalized(mut self) -> Self {
        self.fft_size = self.fft_size.clamp(32, 32_768).next_power_of_two();
        self.smoothing = self.smoothing.clamp(0.0, 0.99);
        if self.max_db <= self.min_db {
            self.max_db = self.min_db + 1.0;
        }
        self.beat_history = self.beat_history.max(1);
        if self.max_bpm < self.min_bpm {
            std::mem::swap(&mut self.min_bpm, &mut self.max_bpm);
        }
        self
    }
}

/// Energy per frequency region, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectrumBands {
    /// 20–60 Hz
    pub sub: f32,
    /// 60–250 Hz
    pub low: f32,
    /// 250–2000 Hz
    pub mid: f32,
    /// 2000–8000 Hz
    pub high: f32,
    pub overall: f32,
}

const SUB_HZ: (f32, f32) = (20.0, 60.0);
const LOW_HZ: (f32, f32) = (60.0, 250.0);
const MID_HZ: (f32, f32) = (250.0, 2000.0);
const HIGH_HZ: (f32, f32) = (2000.0, 8000.0);

/// Rolling FFT over the mono downmix of the master bus.
pub struct SpectrumAnalyzer {
    sample_rate: f32,
    config: AnalyzerConfig,
    history: HeapRb<f32>,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new(sample_rate: f32, config: AnalyzerConfig) -> Self {
        let config = config.normalized();
        let n = config.fft_size;
        let fft = FftPlanner::<f32>::new().plan_fft_forward(n);
        // Hann
        let window = (0..n)
            .map(|i| 0.5 - 0.5 * (std::f32::consts::TAU * i as f32 / (n - 1) as f32).cos())
            .collect();

        Self {
            sample_rate,
            history: HeapRb::new(n),
            fft,
            window,
            scratch: vec![Complex::new(0.0, 0.0); n],
            smoothed: vec![0.0; n / 2],
            config,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Tap an interleaved stereo block; the oldest samples are overwritten.
    pub fn push_interleaved(&mut self, buf: &[f32]) {
        for frame in buf.chunks_exact(2) {
            self.history.push_overwrite(0.5 * (frame[0] + frame[1]));
        }
    }

    /// The last `fft_size` mono samples, oldest first, zero-padded at the
    /// front until the window has filled.
    pub fn time_domain(&self) -> Vec<f32> {
        let n = self.config.fft_size;
        let filled = self.history.occupied_len();
        let mut out = vec![0.0; n - filled];
        out.extend(self.history.iter().copied());
        out
    }

    /// Per-bin level in [0, 1] for bins `0..fft_size / 2`.
    pub fn frequency_domain(&mut self) -> Vec<f32> {
        let samples = self.time_domain();
        for ((slot, s), w) in self.scratch.iter_mut().zip(&samples).zip(&self.window) {
            *slot = Complex::new(s * w, 0.0);
        }
        self.fft.process(&mut self.scratch);

        let n = self.config.fft_size as f32;
        let k = self.config.smoothing;
        let (min_db, range) = (self.config.min_db, self.config.max_db - self.config.min_db);

        self.smoothed
            .iter_mut()
            .zip(&self.scratch)
            .map(|(prev, bin)| {
                let magnitude = bin.norm() / n;
                *prev = k * *prev + (1.0 - k) * magnitude;
                let db = if *prev > 1e-12 { 20.0 * prev.log10() } else { f32::NEG_INFINITY };
                ((db - min_db) / range).clamp(0.0, 1.0)
            })
            .collect()
    }

    pub fn bands(&mut self) -> SpectrumBands {
        let bins = self.frequency_domain();
        SpectrumBands {
            sub: self.band_average(&bins, SUB_HZ),
            low: self.band_average(&bins, LOW_HZ),
            mid: self.band_average(&bins, MID_HZ),
            high: self.band_average(&bins, HIGH_HZ),
            overall: self.band_average(&bins, (SUB_HZ.0, HIGH_HZ.1)),
        }
    }

    fn band_average(&self, bins: &[f32], (lo_hz, hi_hz): (f32, f32)) -> f32 {
        let hz_per_bin = self.sample_rate / self.config.fft_size as f32;
        let lo = ((lo_hz / hz_per_bin).floor() as usize).min(bins.len());
        let hi = ((hi_hz / hz_per_bin).ceil() as usize).clamp(lo, bins.len());
        let slice = &bins[lo..hi];
        if slice.is_empty() {
            return 0.0;
        }
        slice.iter().sum::<f32>() / slice.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_block(freq: f32, sample_rate: f32, frames: usize, amp: f32) -> Vec<f32> {
        let mut out = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let s = amp * (std::f32::consts::TAU * freq * i as f32 / sample_rate).sin();
            out.push(s);
            out.push(s);
        }
        out
    }

    #[test]
    fn silence_reads_zero() {
        let mut a = SpectrumAnalyzer::new(48_000.0, AnalyzerConfig::default());
        a.push_interleaved(&vec![0.0; 4096]);
        let b = a.bands();
        assert_eq!(b, SpectrumBands::default());
    }

    #[test]
    fn time_domain_keeps_latest_window() {
        let cfg = AnalyzerConfig { fft_size: 64, ..Default::default() };
        let mut a = SpectrumAnalyzer::new(48_000.0, cfg);
        a.push_interleaved(&[1.0, 1.0, 0.5, 0.5]);
        let td = a.time_domain();
        assert_eq!(td.len(), 64);
        assert_eq!(&td[62..], &[1.0, 0.5]);

        let ramp: Vec<f32> = (0..200).flat_map(|i| [i as f32, i as f32]).collect();
        a.push_interleaved(&ramp);
        let td = a.time_domain();
        assert_eq!(td.len(), 64);
        assert_eq!(td[0], 136.0);
        assert_eq!(td[63], 199.0);
    }

    #[test]
    fn bass_tone_lands_in_low_band() {
        let mut a = SpectrumAnalyzer::new(48_000.0, AnalyzerConfig::default());
        a.push_interleaved(&sine_block(100.0, 48_000.0, 2048, 0.5));
        let b = a.bands();
        assert!(b.low > b.mid, "low {} mid {}", b.low, b.mid);
        assert!(b.low > b.high);
        for v in [b.sub, b.low, b.mid, b.high, b.overall] {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn frequency_domain_has_half_window_bins() {
        let mut a = SpectrumAnalyzer::new(48_000.0, AnalyzerConfig::default());
        assert_eq!(a.frequency_domain().len(), 1024);
    }

    #[test]
    fn config_normalizes_fft_size() {
        let cfg = AnalyzerConfig { fft_size: 1000, ..Default::default() }.normalized();
        assert_eq!(cfg.fft_size, 1024);
    }
}
