//! Spectrum and beat analysis of the master bus, pulled on demand.
pub mod beat;
pub mod spectrum;

use std::time::{Duration, Instant};

pub use beat::{BeatDetector, BeatInfo};
pub use spectrum::{AnalyzerConfig, SpectrumAnalyzer, SpectrumBands};

/// Spectrum tap plus beat tracker fed from its low band.
pub struct Analyzer {
    spectrum: SpectrumAnalyzer,
    beat: BeatDetector,
}

impl Analyzer {
    pub fn new(sample_rate: f32, config: AnalyzerConfig) -> Self {
        let spectrum = SpectrumAnalyzer::new(sample_rate, config);
        let cfg = spectrum.config();
        let beat = BeatDetector::new(
            cfg.beat_threshold,
            Duration::from_millis(cfg.beat_refractory_ms),
            cfg.beat_history,
            cfg.min_bpm,
            cfg.max_bpm,
        );
        Self { spectrum, beat }
    }

    pub fn push_interleaved(&mut self, buf: &[f32]) {
        self.spectrum.push_interleaved(buf);
    }

    pub fn time_domain(&self) -> Vec<f32> {
        self.spectrum.time_domain()
    }

    pub fn frequency_domain(&mut self) -> Vec<f32> {
        self.spectrum.frequency_domain()
    }

    pub fn bands(&mut self) -> SpectrumBands {
        self.spectrum.bands()
    }

    /// Take a band reading and run it through the beat detector.
    pub fn detect_beat(&mut self, now: Instant) -> BeatInfo {
        let low = self.spectrum.bands().low;
        self.beat.process(low, now)
    }

    pub fn reset_beat(&mut self) {
        self.beat.reset();
    }
}
