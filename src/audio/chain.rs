use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::{
    analyzer::{Analyzer, AnalyzerConfig},
    deck::DeckPair,
    dsp::{
        compressor::{Compressor, CompressorConfig},
        eq::{BassShelf, BassShelfConfig},
    },
};

// ── GainParam ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
struct Ramp {
    from: f32,
    to: f32,
    start: Instant,
    end: Instant,
}

/// Automatable gain: a current value plus at most one scheduled linear ramp.
#[derive(Debug, Clone, PartialEq)]
pub struct GainParam {
    value: f32,
    ramp: Option<Ramp>,
}

impl GainParam {
    pub fn new(value: f32) -> Self {
        Self { value, ramp: None }
    }

    pub fn value_at(&self, now: Instant) -> f32 {
        match self.ramp {
            None => self.value,
            Some(r) if now >= r.end => r.to,
            Some(r) if now <= r.start => r.from,
            Some(r) => {
                let span = r.end.duration_since(r.start).as_secs_f32();
                let t = now.duration_since(r.start).as_secs_f32() / span;
                r.from + (r.to - r.from) * t
            }
        }
    }

    /// Jump to `value`, dropping any scheduled ramp.
    pub fn set_value(&mut self, value: f32) {
        self.value = value;
        self.ramp = None;
    }

    /// Freeze at the current value, dropping any scheduled ramp.
    pub fn cancel_scheduled(&mut self, now: Instant) {
        self.value = self.value_at(now);
        self.ramp = None;
    }

    /// Ramp linearly from the current value to `target`, reaching it `over`
    /// from `now`. Replaces any scheduled ramp.
    pub fn linear_ramp_to(&mut self, target: f32, now: Instant, over: Duration) {
        let from = self.value_at(now);
        if over.is_zero() {
            self.set_value(target);
            return;
        }
        self.value = target;
        self.ramp = Some(Ramp { from, to: target, start: now, end: now + over });
    }

    pub fn is_ramping(&self, now: Instant) -> bool {
        self.ramp.is_some_and(|r| now < r.end)
    }

    /// Value the param settles at once any ramp has finished.
    pub fn target(&self) -> f32 {
        self.ramp.map_or(self.value, |r| r.to)
    }
}

// ── SignalChain ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub bass: BassShelfConfig,
    pub compressor: CompressorConfig,
    pub analyzer: AnalyzerConfig,
}

/// deck gains → bass shelf → compressor → analyzer tap → master gain.
///
/// The master [`GainParam`] lives with the engine so narration can automate
/// it whether or not a chain exists; `render` receives its current value.
/// All buffers are interleaved stereo f32 (L R L R …).
pub struct SignalChain {
    sample_rate: u32,
    bass: BassShelf,
    compressor: Compressor,
    analyzer: Analyzer,
    deck_buf: Vec<f32>,
}

impl SignalChain {
    pub fn new(sample_rate: u32, config: ChainConfig) -> Self {
        let sr = sample_rate as f32;
        Self {
            sample_rate,
            bass: BassShelf::new(sr, config.bass),
            compressor: Compressor::new(sr, config.compressor),
            analyzer: Analyzer::new(sr, config.analyzer),
            deck_buf: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn analyzer_mut(&mut self) -> &mut Analyzer {
        &mut self.analyzer
    }

    /// Pull one block from both decks and run it through the chain.
    pub fn render(&mut self, decks: &mut DeckPair, master: f32, out: &mut [f32]) {
        out.fill(0.0);
        self.deck_buf.resize(out.len(), 0.0);

        for deck in decks.iter_mut() {
            let gain = deck.gain();
            if gain <= 0.0 || !deck.is_playing() {
                continue;
            }
            deck.read_into(&mut self.deck_buf);
            for (o, s) in out.iter_mut().zip(&self.deck_buf) {
                *o += s * gain;
            }
        }

        self.bass.process_buffer(out);
        self.compressor.process_buffer(out);
        self.analyzer.push_interleaved(out);

        if (master - 1.0).abs() > 1e-6 {
            for s in out.iter_mut() {
                *s *= master;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::deck::DeckId,
        clock::ManualClock,
        sim::SimulatedMedia,
    };

    #[test]
    fn ramp_interpolates_linearly() {
        let t0 = Instant::now();
        let mut g = GainParam::new(1.0);
        g.linear_ramp_to(0.0, t0, Duration::from_secs(2));
        assert!((g.value_at(t0) - 1.0).abs() < 1e-6);
        assert!((g.value_at(t0 + Duration::from_millis(500)) - 0.75).abs() < 1e-5);
        assert!(g.is_ramping(t0 + Duration::from_secs(1)));
        assert_eq!(g.value_at(t0 + Duration::from_secs(5)), 0.0);
        assert!(!g.is_ramping(t0 + Duration::from_secs(5)));
    }

    #[test]
    fn cancel_freezes_midway() {
        let t0 = Instant::now();
        let mut g = GainParam::new(1.0);
        g.linear_ramp_to(0.0, t0, Duration::from_secs(1));
        let mid = t0 + Duration::from_millis(500);
        g.cancel_scheduled(mid);
        assert!((g.value_at(t0 + Duration::from_secs(10)) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn new_ramp_starts_from_current_value() {
        let t0 = Instant::now();
        let mut g = GainParam::new(1.0);
        g.linear_ramp_to(0.0, t0, Duration::from_secs(1));
        let mid = t0 + Duration::from_millis(500);
        g.cancel_scheduled(mid);
        g.linear_ramp_to(1.0, mid, Duration::from_secs(1));
        assert!((g.value_at(mid) - 0.5).abs() < 1e-5);
        assert_eq!(g.target(), 1.0);
    }

    #[test]
    fn render_mixes_by_gain_and_master() {
        let clock = ManualClock::new();
        let a = SimulatedMedia::new(clock.clone());
        let b = SimulatedMedia::new(clock.clone());
        let mut decks = DeckPair::new(Box::new(a), Box::new(b));
        decks[DeckId::A].connect();
        decks[DeckId::B].connect();
        decks[DeckId::A].load("https://cdn.test/a.mp3");
        decks[DeckId::A].set_gain(1.0);
        decks[DeckId::A].play().unwrap();

        let cfg = ChainConfig {
            bass: BassShelfConfig { enabled: false, ..Default::default() },
            compressor: CompressorConfig { enabled: false, ..Default::default() },
            ..Default::default()
        };
        let mut chain = SignalChain::new(48_000, cfg);
        let mut out = vec![0.0; 512];
        chain.render(&mut decks, 0.5, &mut out);
        let peak = out.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.1 && peak <= 0.15 + 1e-4, "peak {peak}");

        chain.render(&mut decks, 0.0, &mut out);
        assert!(out.iter().all(|s| *s == 0.0));
    }
}
