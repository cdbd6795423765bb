use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use serde::Serialize;

/// Intervals kept for the tempo estimate.
const MAX_INTERVALS: usize = 16;
/// Readings below this never count as a beat, whatever the average.
const ENERGY_FLOOR: f32 = 0.05;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BeatInfo {
    pub is_beat: bool,
    /// Median-interval tempo estimate, once two beats have been seen.
    pub bpm: Option<f32>,
    /// Low-band energy of this reading.
    pub energy: f32,
}

/// Energy-flux onset detector over successive low-band readings.
pub struct BeatDetector {
    threshold: f32,
    refractory: Duration,
    history: VecDeque<f32>,
    history_len: usize,
    last_beat: Option<Instant>,
    intervals: VecDeque<f32>,
    min_bpm: f32,
    max_bpm: f32,
}

impl BeatDetector {
    pub fn new(threshold: f32, refractory: Duration, history_len: usize, min_bpm: f32, max_bpm: f32) -> Self {
        Self {
            threshold,
            refractory,
            history: VecDeque::with_capacity(history_len),
            history_len: history_len.max(1),
            last_beat: None,
            intervals: VecDeque::with_capacity(MAX_INTERVALS),
            min_bpm,
            max_bpm,
        }
    }

    /// Feed one low-band reading taken at `now`.
    pub fn process(&mut self, energy: f32, now: Instant) -> BeatInfo {
        let average = if self.history.is_empty() {
            0.0
        } else {
            self.history.iter().sum::<f32>() / self.history.len() as f32
        };

        let cooled = self
            .last_beat
            .map_or(true, |t| now.saturating_duration_since(t) >= self.refractory);
        let is_beat =
            cooled && energy > ENERGY_FLOOR && !self.history.is_empty() && energy > average * self.threshold;

        if is_beat {
            if let Some(prev) = self.last_beat {
                let secs = now.saturating_duration_since(prev).as_secs_f32();
                // Gaps longer than two beats at the slowest tempo are breaks, not beats.
                if secs <= 2.0 * 60.0 / self.min_bpm {
                    if self.intervals.len() == MAX_INTERVALS {
                        self.intervals.pop_front();
                    }
                    self.intervals.push_back(secs);
                }
            }
            self.last_beat = Some(now);
        }

        if self.history.len() == self.history_len {
            self.history.pop_front();
        }
        self.history.push_back(energy);

        BeatInfo { is_beat, bpm: self.bpm(), energy }
    }

    pub fn bpm(&self) -> Option<f32> {
        if self.intervals.is_empty() {
            return None;
        }
        let mut sorted: Vec<f32> = self.intervals.iter().copied().collect();
        sorted.sort_by(f32::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 { 0.5 * (sorted[mid - 1] + sorted[mid]) } else { sorted[mid] };
        if median <= 0.0 {
            return None;
        }
        Some((60.0 / median).clamp(self.min_bpm, self.max_bpm))
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.intervals.clear();
        self.last_beat = None;
    }
}
