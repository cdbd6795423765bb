use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorConfig {
    pub enabled: bool,
    /// Compression threshold in dBFS
    pub threshold_db: f32,
    /// Compression ratio (e.g. 4.0 = 4:1)
    pub ratio: f32,
    /// Knee width in dB (0 = hard knee)
    pub knee_db: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    /// Make-up gain in dB
    pub makeup_db: f32,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_db: -24.0,
            ratio: 4.0,
            knee_db: 12.0,
            attack_ms: 3.0,
            release_ms: 250.0,
            makeup_db: 0.0,
        }
    }
}

/// Stereo-linked single-band peak compressor with soft knee, the glue
/// stage after the bass shelf.
pub struct Compressor {
    config: CompressorConfig,
    sample_rate: f32,
    /// Smoothed detector level (linear)
    detector: f32,
    attack_coeff: f32,
    release_coeff: f32,
    makeup_gain: f32,
}

impl Compressor {
    pub fn new(sample_rate: f32, config: CompressorConfig) -> Self {
        let mut c = Self {
            config: config.clone(),
            sample_rate,
            detector: 0.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            makeup_gain: 1.0,
        };
        c.set_config(config);
        c
    }

    pub fn set_config(&mut self, config: CompressorConfig) {
        self.attack_coeff = time_coeff(config.attack_ms, self.sample_rate);
        self.release_coeff = time_coeff(config.release_ms, self.sample_rate);
        self.makeup_gain = db_to_linear(config.makeup_db);
        self.config = config;
    }

    pub fn config(&self) -> &CompressorConfig {
        &self.config
    }

    /// Process an interleaved stereo buffer in-place. Both channels share
    /// one detector so the stereo image does not shift under compression.
    pub fn process_buffer(&mut self, buf: &mut [f32]) {
        if !self.config.enabled {
            return;
        }
        for frame in buf.chunks_exact_mut(2) {
            let peak = frame[0].abs().max(frame[1].abs());
            let coeff = if peak > self.detector { self.attack_coeff } else { self.release_coeff };
            self.detector = coeff * self.detector + (1.0 - coeff) * peak;

            let level_db = linear_to_db(self.detector.max(1e-10));
            let gain = db_to_linear(self.gain_db(level_db)) * self.makeup_gain;
            frame[0] *= gain;
            frame[1] *= gain;
        }
    }

    /// Static gain curve: dB of gain change for a detector level in dBFS.
    #[inline]
    pub fn gain_db(&self, level_db: f32) -> f32 {
        let t = self.config.threshold_db;
        let r = self.config.ratio.max(1.0);
        let w = self.config.knee_db.max(0.0);
        let excess = level_db - t;

        if w > 0.0 && excess.abs() <= w / 2.0 {
            let x = excess + w / 2.0;
            (1.0 / r - 1.0) * x * x / (2.0 * w)
        } else if excess > 0.0 {
            excess / r - excess
        } else {
            0.0
        }
    }
}

#[inline]
fn time_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    if time_ms <= 0.0 {
        return 0.0;
    }
    let samples = (time_ms / 1000.0) * sample_rate;
    (-1.0_f32 / samples.max(1.0)).exp()
}

#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear < 1e-10 {
        -96.0
    } else {
        20.0 * linear.log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_signal_untouched() {
        let mut comp = Compressor::new(48_000.0, CompressorConfig::default());
        let mut buf = vec![0.01_f32; 960];
        comp.process_buffer(&mut buf);
        assert!((buf[958] - 0.01).abs() < 1e-5);
    }

    #[test]
    fn reduces_loud_signal() {
        let cfg = CompressorConfig { knee_db: 0.0, attack_ms: 0.1, ..Default::default() };
        let mut comp = Compressor::new(48_000.0, cfg);
        let mut buf = vec![0.9_f32; 4_800];
        comp.process_buffer(&mut buf);
        let out = buf[buf.len() - 1];
        assert!(out < 0.9, "compressor should reduce loud signal: {out}");
    }

    #[test]
    fn knee_is_continuous() {
        let comp = Compressor::new(48_000.0, CompressorConfig::default());
        let t = comp.config().threshold_db;
        let half = comp.config().knee_db / 2.0;
        assert!(comp.gain_db(t - half).abs() < 1e-4);
        let above = comp.gain_db(t + half + 1e-3);
        let inside = comp.gain_db(t + half - 1e-3);
        assert!((above - inside).abs() < 1e-2);
    }

    #[test]
    fn disabled_passthrough() {
        let cfg = CompressorConfig { enabled: false, ..Default::default() };
        let mut comp = Compressor::new(48_000.0, cfg);
        let mut buf = [0.42_f32, -0.42];
        comp.process_buffer(&mut buf);
        assert_eq!(buf, [0.42, -0.42]);
    }
}
