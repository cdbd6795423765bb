pub mod energy_arc;
pub mod queue_builder;

pub use energy_arc::{EnergyArc, EnergyPhase, PhaseChange, PhasePlan, QueueConfig};
pub use queue_builder::{smooth_bpm, PlayQueue, QueueBuilder, QueueEntry};
