/// Energy Arc
///
/// The build → peak → release → cooldown cycle that shapes queue order, and
/// the counter that walks through it as tracks complete.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::library::Energy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnergyPhase {
    #[default]
    Build,
    Peak,
    Release,
    Cooldown,
}

impl EnergyPhase {
    pub const CYCLE: [EnergyPhase; 4] =
        [EnergyPhase::Build, EnergyPhase::Peak, EnergyPhase::Release, EnergyPhase::Cooldown];

    pub fn next(self) -> Self {
        match self {
            EnergyPhase::Build => EnergyPhase::Peak,
            EnergyPhase::Peak => EnergyPhase::Release,
            EnergyPhase::Release => EnergyPhase::Cooldown,
            EnergyPhase::Cooldown => EnergyPhase::Build,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EnergyPhase::Build => "build",
            EnergyPhase::Peak => "peak",
            EnergyPhase::Release => "release",
            EnergyPhase::Cooldown => "cooldown",
        }
    }

    /// Listener-facing line announced when the phase begins.
    pub fn description(self) -> &'static str {
        match self {
            EnergyPhase::Build => "Building up the energy",
            EnergyPhase::Peak => "Peak time, full energy",
            EnergyPhase::Release => "Easing off the peak",
            EnergyPhase::Cooldown => "Cooling down",
        }
    }
}

impl fmt::Display for EnergyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Config ────────────────────────────────────────────────────────────────────

/// How many tracks a phase draws and which energy buckets it prefers, in
/// priority order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasePlan {
    pub count: usize,
    pub prefer: Vec<Energy>,
}

impl PhasePlan {
    fn new(count: usize, prefer: &[Energy]) -> Self {
        Self { count, prefer: prefer.to_vec() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Full arc cycles drawn per queue build.
    pub cycles: usize,
    pub build: PhasePlan,
    pub peak: PhasePlan,
    pub release: PhasePlan,
    pub cooldown: PhasePlan,
    /// Largest BPM jump left between neighbours when a closer match exists.
    pub bpm_tolerance: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            cycles: 3,
            build: PhasePlan::new(3, &[Energy::Low, Energy::Mid]),
            peak: PhasePlan::new(2, &[Energy::High, Energy::Mid]),
            release: PhasePlan::new(2, &[Energy::Mid, Energy::Low]),
            cooldown: PhasePlan::new(1, &[Energy::Low, Energy::Mid]),
            bpm_tolerance: 5,
        }
    }
}

impl QueueConfig {
    pub fn normalized(mut self) -> Self {
        self.cycles = self.cycles.max(1);
        for plan in [&mut self.build, &mut self.peak, &mut self.release, &mut self.cooldown] {
            plan.count = plan.count.max(1);
        }
        self
    }

    pub fn plan(&self, phase: EnergyPhase) -> &PhasePlan {
        match phase {
            EnergyPhase::Build => &self.build,
            EnergyPhase::Peak => &self.peak,
            EnergyPhase::Release => &self.release,
            EnergyPhase::Cooldown => &self.cooldown,
        }
    }

    /// Tracks in one full cycle.
    pub fn cycle_len(&self) -> usize {
        EnergyPhase::CYCLE.iter().map(|p| self.plan(*p).count).sum()
    }
}

// ── Arc state ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseChange {
    pub phase: EnergyPhase,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnergyArc {
    pub phase: EnergyPhase,
    pub tracks_played_in_phase: usize,
}

impl EnergyArc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Count one completed track. Returns the new phase when this track
    /// filled the current one.
    pub fn record_track(&mut self, config: &QueueConfig) -> Option<PhaseChange> {
        self.tracks_played_in_phase += 1;
        if self.tracks_played_in_phase < config.plan(self.phase).count {
            return None;
        }
        self.phase = self.phase.next();
        self.tracks_played_in_phase = 0;
        log::info!("Energy phase → {} ({})", self.phase, self.phase.description());
        Some(PhaseChange { phase: self.phase, description: self.phase.description().to_string() })
    }
}
