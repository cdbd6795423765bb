/// Queue Builder
///
/// Turns the library (or one genre of it) into a play order that walks the
/// energy arc, then nudges neighbours together so tempo does not jump.
use std::sync::Arc;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;

use super::energy_arc::{EnergyPhase, QueueConfig};
use crate::library::{Energy, Filter, Library, Track};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueEntry {
    pub track: Arc<Track>,
    /// Phase this track was drawn for.
    pub phase: EnergyPhase,
}

// ── Builder ───────────────────────────────────────────────────────────────────

pub struct QueueBuilder {
    config: QueueConfig,
    rng: StdRng,
}

impl QueueBuilder {
    pub fn new(config: QueueConfig) -> Self {
        Self { config: config.normalized(), rng: StdRng::from_entropy() }
    }

    /// Deterministic draws for tests and reproducible simulations.
    pub fn with_seed(config: QueueConfig, seed: u64) -> Self {
        Self { config: config.normalized(), rng: StdRng::seed_from_u64(seed) }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Build a fresh queue for `filter`. A genre with no tracks falls back
    /// to the whole library; an empty library yields an empty queue.
    pub fn build(&mut self, library: &Library, filter: &Filter) -> Vec<QueueEntry> {
        let mut candidates = library.tracks_for(filter);
        if candidates.is_empty() {
            if library.is_empty() {
                log::warn!("Queue build for '{filter}' skipped: library is empty");
                return Vec::new();
            }
            log::info!("No tracks for '{filter}', falling back to the full library");
            candidates = library.all_tracks().to_vec();
        }

        let buckets = Buckets::partition(&candidates);
        let mut queue = Vec::with_capacity(self.config.cycles * self.config.cycle_len());

        for _ in 0..self.config.cycles {
            for phase in EnergyPhase::CYCLE {
                let plan = self.config.plan(phase);
                for _ in 0..plan.count {
                    let pool = plan
                        .prefer
                        .iter()
                        .map(|e| buckets.get(*e))
                        .find(|b| !b.is_empty())
                        .unwrap_or(&candidates);
                    let track = pool[self.rng.gen_range(0..pool.len())].clone();
                    queue.push(QueueEntry { track, phase });
                }
            }
        }

        smooth_bpm(&mut queue, self.config.bpm_tolerance);
        log::debug!("Built queue of {} entries from {} candidates ({filter})", queue.len(), candidates.len());
        queue
    }
}

struct Buckets {
    low: Vec<Arc<Track>>,
    mid: Vec<Arc<Track>>,
    high: Vec<Arc<Track>>,
}

impl Buckets {
    fn partition(tracks: &[Arc<Track>]) -> Self {
        let mut b = Buckets { low: Vec::new(), mid: Vec::new(), high: Vec::new() };
        for t in tracks {
            match t.energy {
                Energy::Low => b.low.push(t.clone()),
                Energy::Mid => b.mid.push(t.clone()),
                Energy::High => b.high.push(t.clone()),
            }
        }
        b
    }

    fn get(&self, energy: Energy) -> &Vec<Arc<Track>> {
        match energy {
            Energy::Low => &self.low,
            Energy::Mid => &self.mid,
            Energy::High => &self.high,
        }
    }
}

/// Single forward pass: when the step from `i` to `i + 1` exceeds
/// `tolerance`, the track of the first later entry within tolerance of `i`
/// is swapped into `i + 1`. Phase labels stay with their slots.
pub fn smooth_bpm(queue: &mut [QueueEntry], tolerance: u32) {
    let n = queue.len();
    for i in 0..n.saturating_sub(1) {
        let bpm = queue[i].track.bpm;
        if bpm.abs_diff(queue[i + 1].track.bpm) <= tolerance {
            continue;
        }
        if let Some(j) = (i + 2..n).find(|&j| bpm.abs_diff(queue[j].track.bpm) <= tolerance) {
            let (head, tail) = queue.split_at_mut(j);
            std::mem::swap(&mut head[i + 1].track, &mut tail[0].track);
        }
    }
}

// ── Play queue ────────────────────────────────────────────────────────────────

/// Built queue plus its cursor. `index < len` whenever the queue is non-empty.
#[derive(Debug, Clone, Default)]
pub struct PlayQueue {
    entries: Vec<QueueEntry>,
    index: usize,
    /// Lap drawn ahead of the wrap-around, if any.
    next_lap: Vec<QueueEntry>,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, entries: Vec<QueueEntry>) {
        self.entries = entries;
        self.index = 0;
        self.next_lap.clear();
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        self.entries.get(self.index)
    }

    /// Entry after the cursor. At the end this is the head of the staged
    /// next lap, or `None` when none has been drawn yet.
    pub fn peek_next(&self) -> Option<&QueueEntry> {
        self.entries.get(self.index + 1).or_else(|| self.next_lap.first())
    }

    /// True on the last entry while no next lap is staged.
    pub fn needs_next_lap(&self) -> bool {
        !self.entries.is_empty() && self.index + 1 == self.entries.len() && self.next_lap.is_empty()
    }

    pub fn stage_next_lap(&mut self, entries: Vec<QueueEntry>) {
        self.next_lap = entries;
    }

    pub fn take_next_lap(&mut self) -> Option<Vec<QueueEntry>> {
        if self.next_lap.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.next_lap))
        }
    }

    /// Move forward. Returns `false` at the end, leaving the cursor in place
    /// so the caller can rebuild.
    pub fn advance(&mut self) -> bool {
        if self.index + 1 < self.entries.len() {
            self.index += 1;
            true
        } else {
            false
        }
    }

    /// Move back one, wrapping to the last entry.
    pub fn retreat(&mut self) {
        let len = self.entries.len();
        if len > 0 {
            self.index = (self.index + len - 1) % len;
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Put the cursor back on `index`; out-of-range values are ignored.
    pub fn set_index(&mut self, index: usize) -> bool {
        if index < self.entries.len() {
            self.index = index;
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }
}
