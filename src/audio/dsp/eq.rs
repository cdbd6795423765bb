use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type, Q_BUTTERWORTH_F32};
use serde::{Deserialize, Serialize};

/// Warmth stage of the master chain: a single low-shelf boost.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BassShelfConfig {
    pub enabled: bool,
    /// Shelf corner frequency in Hz
    pub freq_hz: f32,
    /// Shelf gain in dB (positive = boost)
    pub gain_db: f32,
}

impl Default for BassShelfConfig {
    fn default() -> Self {
        Self { enabled: true, freq_hz: 120.0, gain_db: 3.0 }
    }
}

/// Stereo low-shelf filter over interleaved buffers.
pub struct BassShelf {
    sample_rate: f32,
    config: BassShelfConfig,
    left: DirectForm2Transposed<f32>,
    right: DirectForm2Transposed<f32>,
}

impl BassShelf {
    pub fn new(sample_rate: f32, config: BassShelfConfig) -> Self {
        let coeffs = shelf_coeffs(sample_rate, &config);
        Self {
            sample_rate,
            config,
            left: DirectForm2Transposed::<f32>::new(coeffs),
            right: DirectForm2Transposed::<f32>::new(coeffs),
        }
    }

    pub fn set_config(&mut self, config: BassShelfConfig) {
        let coeffs = shelf_coeffs(self.sample_rate, &config);
        self.left.update_coefficients(coeffs);
        self.right.update_coefficients(coeffs);
        self.config = config;
    }

    pub fn config(&self) -> &BassShelfConfig {
        &self.config
    }

    /// Process an interleaved stereo buffer (L R L R …) in-place.
    pub fn process_buffer(&mut self, buf: &mut [f32]) {
        if !self.config.enabled {
            return;
        }
        for frame in buf.chunks_exact_mut(2) {
            frame[0] = self.left.run(frame[0]);
            frame[1] = self.right.run(frame[1]);
        }
    }
}

fn shelf_coeffs(sample_rate: f32, cfg: &BassShelfConfig) -> Coefficients<f32> {
    Coefficients::<f32>::from_params(
        Type::LowShelf(cfg.gain_db),
        sample_rate.hz(),
        cfg.freq_hz.clamp(20.0, sample_rate / 2.0 - 1.0).hz(),
        Q_BUTTERWORTH_F32,
    )
    .unwrap_or(UNITY)
}

/// Coefficients that pass audio unmodified.
pub(crate) const UNITY: Coefficients<f32> = Coefficients { b0: 1.0, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0 };
