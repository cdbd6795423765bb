use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::{
    injector::{AudioInjector, DuckConfig, NarrationJob, NarrationState},
    script::{ScriptConfig, ScriptGenerator},
    voice::{SpeechBackend, VoiceConfig, VoiceSynthesizer},
};
use crate::{audio::chain::GainParam, library::Track, scheduler::EnergyPhase};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    pub enabled: bool,
    /// Fixed seed for script choices; random when unset.
    pub seed: Option<u64>,
    pub script: ScriptConfig,
    pub voice: VoiceConfig,
    pub duck: DuckConfig,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            seed: None,
            script: ScriptConfig::default(),
            voice: VoiceConfig::default(),
            duck: DuckConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PreparedTransition {
    track_url: String,
    text: String,
}

/// Sequences narration around track transitions: a script is prepared as
/// soon as the next track is known and spoken when the crossfade into it
/// starts.
pub struct StreamController {
    enabled: bool,
    script: ScriptGenerator,
    injector: AudioInjector,
    prepared: Option<PreparedTransition>,
    next_job_id: u64,
}

impl StreamController {
    pub fn new(config: NarrationConfig, now: Instant) -> Self {
        let script = match config.seed {
            Some(seed) => ScriptGenerator::with_seed(config.script, seed),
            None => ScriptGenerator::new(config.script),
        };
        Self {
            enabled: config.enabled,
            script,
            injector: AudioInjector::new(config.duck, VoiceSynthesizer::new(config.voice), now),
            prepared: None,
            next_job_id: 1,
        }
    }

    pub fn set_backend(&mut self, backend: Box<dyn SpeechBackend>) {
        self.injector.voice_mut().set_backend(backend);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    pub fn is_speaking(&self) -> bool {
        self.injector.is_speaking()
    }

    pub fn state(&self) -> NarrationState {
        self.injector.state()
    }

    pub fn current_job(&self) -> Option<&NarrationJob> {
        self.injector.current()
    }

    /// Write the script for the transition into `next`. A script already
    /// prepared for the same track is kept; one for a different track is
    /// replaced. Returns whether a new script was generated.
    pub fn prepare_transition(&mut self, next: &Track, phase: EnergyPhase) -> bool {
        if !self.enabled || !self.injector.voice_mut().is_available() {
            return false;
        }
        if self.prepared.as_ref().is_some_and(|p| p.track_url == next.url) {
            return false;
        }
        let text = self.script.generate_now(next, phase);
        log::debug!("Narration prepared for '{}': {text}", next.title);
        self.prepared = Some(PreparedTransition { track_url: next.url.clone(), text });
        true
    }

    /// Speak the script prepared for `track_url`, ducking the bed first.
    /// A script prepared for some other track is discarded.
    pub fn execute_transition(
        &mut self,
        track_url: &str,
        master: &mut GainParam,
        base: f32,
        now: Instant,
    ) -> Option<u64> {
        let prepared = self.prepared.take()?;
        if !self.enabled {
            return None;
        }
        if prepared.track_url != track_url {
            log::debug!("Dropping narration prepared for {}, now playing {track_url}", prepared.track_url);
            return None;
        }
        let id = self.next_job_id;
        self.next_job_id += 1;
        let job = NarrationJob { id, text: prepared.text, track_url: Some(prepared.track_url) };
        self.injector.inject(job, master, base, now);
        Some(id)
    }

    /// Queue an arbitrary line, e.g. a host-triggered announcement.
    pub fn announce(&mut self, text: &str, master: &mut GainParam, base: f32, now: Instant) -> Option<u64> {
        if !self.enabled || text.trim().is_empty() {
            return None;
        }
        let id = self.next_job_id;
        self.next_job_id += 1;
        self.injector.inject(NarrationJob { id, text: text.to_string(), track_url: None }, master, base, now);
        Some(id)
    }

    pub fn tick(&mut self, master: &mut GainParam, base: f32, now: Instant) {
        self.injector.tick(master, base, now);
    }

    pub fn speech_ended(&mut self, master: &mut GainParam, base: f32, now: Instant) {
        self.injector.speech_ended(master, base, now);
    }

    pub fn speech_failed(&mut self, reason: &str, master: &mut GainParam, base: f32, now: Instant) {
        self.injector.speech_failed(reason, master, base, now);
    }

    pub fn rebase(&mut self, master: &mut GainParam, base: f32, now: Instant) {
        self.injector.rebase(master, base, now);
    }

    /// Flip narration on or off. Turning it off silences the voice, drops
    /// everything queued or prepared and restores the bed.
    pub fn toggle(&mut self, master: &mut GainParam, base: f32, now: Instant) -> bool {
        self.set_enabled(!self.enabled, master, base, now);
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool, master: &mut GainParam, base: f32, now: Instant) {
        self.enabled = enabled;
        if !enabled {
            self.cancel(master, base, now);
        }
        log::info!("Narration {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn cancel(&mut self, master: &mut GainParam, base: f32, now: Instant) {
        self.prepared = None;
        self.injector.cancel_all(master, base, now);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        library::{Energy, GenreMeta},
        sim::SimulatedSpeech,
    };

    fn track(url: &str) -> Track {
        Track {
            title: "Glow".into(),
            artist: "Mira".into(),
            url: url.into(),
            duration_hint: None,
            genre_key: "house".into(),
            energy: Energy::High,
            bpm: 124,
            genre: GenreMeta { name: "House".into(), ..Default::default() },
        }
    }

    fn controller(speech: &SimulatedSpeech, t0: Instant) -> StreamController {
        let mut c = StreamController::new(NarrationConfig { seed: Some(9), ..Default::default() }, t0);
        c.set_backend(Box::new(speech.clone()));
        c
    }

    #[test]
    fn prepare_is_idempotent_per_track() {
        let t0 = Instant::now();
        let speech = SimulatedSpeech::new();
        let mut c = controller(&speech, t0);
        assert!(c.prepare_transition(&track("u1"), EnergyPhase::Build));
        assert!(!c.prepare_transition(&track("u1"), EnergyPhase::Build));
        assert!(c.is_prepared());
        assert!(c.prepare_transition(&track("u2"), EnergyPhase::Build));
    }

    #[test]
    fn execute_speaks_prepared_script_once() {
        let t0 = Instant::now();
        let speech = SimulatedSpeech::new();
        let mut c = controller(&speech, t0);
        let mut master = GainParam::new(1.0);

        c.prepare_transition(&track("u1"), EnergyPhase::Peak);
        assert_eq!(c.execute_transition("u1", &mut master, 1.0, t0), Some(1));
        assert!(!c.is_prepared());
        assert_eq!(c.execute_transition("u1", &mut master, 1.0, t0), None);

        c.tick(&mut master, 1.0, t0 + Duration::from_millis(400));
        let spoken = speech.spoken();
        assert_eq!(spoken.len(), 1);
        assert!(spoken[0].text.contains("Glow"));
    }

    #[test]
    fn mismatched_track_drops_script() {
        let t0 = Instant::now();
        let speech = SimulatedSpeech::new();
        let mut c = controller(&speech, t0);
        let mut master = GainParam::new(1.0);
        c.prepare_transition(&track("u1"), EnergyPhase::Build);
        assert_eq!(c.execute_transition("u9", &mut master, 1.0, t0), None);
        assert!(!c.is_speaking());
    }

    #[test]
    fn without_backend_nothing_is_prepared() {
        let mut c = StreamController::new(NarrationConfig::default(), Instant::now());
        assert!(!c.prepare_transition(&track("u1"), EnergyPhase::Build));
    }

    #[test]
    fn toggle_off_cancels_everything() {
        let t0 = Instant::now();
        let speech = SimulatedSpeech::new();
        let mut c = controller(&speech, t0);
        let mut master = GainParam::new(0.7);

        c.prepare_transition(&track("u1"), EnergyPhase::Build);
        c.execute_transition("u1", &mut master, 0.7, t0);
        c.prepare_transition(&track("u2"), EnergyPhase::Build);
        c.tick(&mut master, 0.7, t0 + Duration::from_millis(400));
        assert!(c.is_speaking());

        assert!(!c.toggle(&mut master, 0.7, t0 + Duration::from_secs(1)));
        assert!(!c.is_speaking());
        assert!(!c.is_prepared());
        assert_eq!(master.value_at(t0 + Duration::from_secs(1)), 0.7);
        assert_eq!(speech.cancels(), 1);
        assert!(!c.prepare_transition(&track("u3"), EnergyPhase::Build));

        assert!(c.toggle(&mut master, 0.7, t0 + Duration::from_secs(2)));
    }
}
