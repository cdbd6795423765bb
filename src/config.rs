/// Engine configuration
///
/// One serde tree with a default for every field, so a config file only has
/// to name what it changes. Every section is passed through `normalized()`
/// before use.
use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    audio::{chain::ChainConfig, crossfade::CrossfadeConfig},
    error::{RadioError, Result},
    narration::NarrationConfig,
    scheduler::QueueConfig,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Master volume at startup, 0.0–1.0.
    pub initial_volume: f32,
    /// Start in track mode (queue) rather than live-stream mode.
    pub track_mode: bool,
    /// `previous()` restarts the current track when it is less than this far in.
    pub restart_threshold_secs: f64,
    /// Delay before skipping past a track that failed to play.
    pub error_skip_delay_secs: f64,
    /// Failures in a row, without a successful start, before giving up.
    pub max_consecutive_failures: u32,
    /// Fixed seed for queue draws; random when unset.
    pub queue_seed: Option<u64>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            initial_volume: 0.8,
            track_mode: true,
            restart_threshold_secs: 3.0,
            error_skip_delay_secs: 1.5,
            max_consecutive_failures: 8,
            queue_seed: None,
        }
    }
}

impl PlaybackConfig {
    pub fn normalized(mut self) -> Self {
        self.initial_volume = clamp_unit(self.initial_volume);
        if !self.restart_threshold_secs.is_finite() || self.restart_threshold_secs < 0.0 {
            self.restart_threshold_secs = 0.0;
        }
        if !self.error_skip_delay_secs.is_finite() || self.error_skip_delay_secs < 0.0 {
            self.error_skip_delay_secs = 0.0;
        }
        self.max_consecutive_failures = self.max_consecutive_failures.max(1);
        self
    }

    pub fn error_skip_delay(&self) -> Duration {
        Duration::from_secs_f64(self.error_skip_delay_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub crossfade: CrossfadeConfig,
    pub queue: QueueConfig,
    pub playback: PlaybackConfig,
    pub chain: ChainConfig,
    pub narration: NarrationConfig,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: EngineConfig = serde_json::from_str(json)?;
        Ok(cfg.normalized())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| RadioError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn normalized(mut self) -> Self {
        self.crossfade = self.crossfade.normalized();
        self.queue = self.queue.normalized();
        self.playback = self.playback.normalized();
        self.chain.analyzer = self.chain.analyzer.normalized();
        self.narration.script = self.narration.script.normalized();
        self.narration.voice = self.narration.voice.normalized();
        self.narration.duck = self.narration.duck.normalized();
        self
    }
}

/// Clamp to [0, 1]; NaN becomes 0.
pub fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}
