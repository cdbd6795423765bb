/// Audio injector
///
/// Speaks narration jobs over the music bed: duck the master gain, speak,
/// restore. One job at a time; anything arriving meanwhile waits in a FIFO.
use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use super::voice::VoiceSynthesizer;
use crate::audio::chain::GainParam;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuckConfig {
    /// Fraction of the pre-duck gain kept under speech.
    pub duck_level: f32,
    pub duck_secs: f64,
    pub unduck_secs: f64,
    /// Speech still running after this long is treated as finished.
    pub speech_timeout_secs: f64,
}

impl Default for DuckConfig {
    fn default() -> Self {
        Self { duck_level: 0.25, duck_secs: 0.4, unduck_secs: 0.8, speech_timeout_secs: 30.0 }
    }
}

impl DuckConfig {
    pub fn normalized(mut self) -> Self {
        self.duck_level = self.duck_level.clamp(0.0, 1.0);
        for secs in [&mut self.duck_secs, &mut self.unduck_secs] {
            if !secs.is_finite() || *secs < 0.0 {
                *secs = 0.0;
            }
        }
        if !self.speech_timeout_secs.is_finite() || self.speech_timeout_secs <= 0.0 {
            self.speech_timeout_secs = Self::default().speech_timeout_secs;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NarrationJob {
    pub id: u64,
    pub text: String,
    /// Url of the track this job introduces, if any.
    pub track_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationState {
    Idle,
    Ducking,
    Speaking,
    Unducking,
}

type CompletionFn = Box<dyn FnMut(&NarrationJob)>;

/// Gain and speech sequencing for narration.
///
/// `base` arguments are the master gain the bed should sit at when nobody is
/// speaking (user volume, or zero while muted).
pub struct AudioInjector {
    config: DuckConfig,
    voice: VoiceSynthesizer,
    state: NarrationState,
    current: Option<NarrationJob>,
    pending: VecDeque<NarrationJob>,
    /// End of the current duck/unduck ramp, or start of speech.
    since: Instant,
    deadline: Option<Instant>,
    on_complete: Option<CompletionFn>,
}

impl AudioInjector {
    pub fn new(config: DuckConfig, voice: VoiceSynthesizer, now: Instant) -> Self {
        Self {
            config: config.normalized(),
            voice,
            state: NarrationState::Idle,
            current: None,
            pending: VecDeque::new(),
            since: now,
            deadline: None,
            on_complete: None,
        }
    }

    pub fn config(&self) -> &DuckConfig {
        &self.config
    }

    pub fn voice_mut(&mut self) -> &mut VoiceSynthesizer {
        &mut self.voice
    }

    /// Called once per job when its speech ends, fails or times out.
    pub fn set_on_complete(&mut self, f: impl FnMut(&NarrationJob) + 'static) {
        self.on_complete = Some(Box::new(f));
    }

    pub fn state(&self) -> NarrationState {
        self.state
    }

    pub fn is_speaking(&self) -> bool {
        self.state != NarrationState::Idle
    }

    pub fn current(&self) -> Option<&NarrationJob> {
        self.current.as_ref()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Start `job` now, or queue it behind the one in progress.
    pub fn inject(&mut self, job: NarrationJob, master: &mut GainParam, base: f32, now: Instant) {
        if self.is_speaking() {
            log::debug!("Narration #{} queued behind #{:?}", job.id, self.current.as_ref().map(|j| j.id));
            self.pending.push_back(job);
            return;
        }
        self.start(job, master, base, now);
    }

    fn start(&mut self, job: NarrationJob, master: &mut GainParam, base: f32, now: Instant) {
        log::debug!("Narration #{} ducking", job.id);
        self.current = Some(job);
        self.state = NarrationState::Ducking;
        let over = Duration::from_secs_f64(self.config.duck_secs);
        master.cancel_scheduled(now);
        master.linear_ramp_to(base * self.config.duck_level, now, over);
        self.since = now;
        self.deadline = Some(now + over);
    }

    /// Advance ramps, start speech once ducked and enforce the speech timeout.
    pub fn tick(&mut self, master: &mut GainParam, base: f32, now: Instant) {
        match self.state {
            NarrationState::Idle => {}
            NarrationState::Ducking => {
                if self.deadline.is_some_and(|d| now >= d) {
                    self.begin_speech(master, base, now);
                }
            }
            NarrationState::Speaking => {
                let timeout = Duration::from_secs_f64(self.config.speech_timeout_secs);
                if now.saturating_duration_since(self.since) >= timeout {
                    log::warn!("Narration speech timed out after {timeout:?}");
                    self.voice.cancel();
                    self.finish_speech(master, base, now);
                }
            }
            NarrationState::Unducking => {
                if self.deadline.is_some_and(|d| now >= d) {
                    self.state = NarrationState::Idle;
                    self.deadline = None;
                    if let Some(next) = self.pending.pop_front() {
                        self.start(next, master, base, now);
                    }
                }
            }
        }
    }

    fn begin_speech(&mut self, master: &mut GainParam, base: f32, now: Instant) {
        let Some(job) = self.current.as_ref() else {
            self.state = NarrationState::Idle;
            return;
        };
        match self.voice.speak(job.id, &job.text) {
            Ok(()) => {
                log::info!("Narration #{}: \"{}\"", job.id, job.text);
                self.state = NarrationState::Speaking;
                self.since = now;
                self.deadline = None;
            }
            Err(e) => {
                log::warn!("Narration #{} skipped: {e}", job.id);
                self.finish_speech(master, base, now);
            }
        }
    }

    /// Host reports the utterance finished.
    pub fn speech_ended(&mut self, master: &mut GainParam, base: f32, now: Instant) {
        if self.state == NarrationState::Speaking {
            self.finish_speech(master, base, now);
        }
    }

    /// Host reports the utterance failed; treated as finished.
    pub fn speech_failed(&mut self, reason: &str, master: &mut GainParam, base: f32, now: Instant) {
        if matches!(self.state, NarrationState::Speaking | NarrationState::Ducking) {
            log::warn!("Narration speech failed: {reason}");
            self.finish_speech(master, base, now);
        }
    }

    fn finish_speech(&mut self, master: &mut GainParam, base: f32, now: Instant) {
        let over = Duration::from_secs_f64(self.config.unduck_secs);
        master.cancel_scheduled(now);
        master.linear_ramp_to(base, now, over);
        self.state = NarrationState::Unducking;
        self.since = now;
        self.deadline = Some(now + over);

        if let Some(job) = self.current.take() {
            if let Some(cb) = self.on_complete.as_mut() {
                cb(&job);
            }
        }
    }

    /// Stop speaking, drop queued jobs and put the bed back at `base`.
    pub fn cancel_all(&mut self, master: &mut GainParam, base: f32, now: Instant) {
        if self.is_speaking() || !self.pending.is_empty() {
            log::info!("Narration cancelled ({} pending dropped)", self.pending.len());
        }
        if self.state == NarrationState::Speaking {
            self.voice.cancel();
        }
        self.pending.clear();
        self.current = None;
        self.state = NarrationState::Idle;
        self.deadline = None;
        master.cancel_scheduled(now);
        master.set_value(base);
    }

    /// Re-aim the master gain after `base` changed (volume or mute).
    pub fn rebase(&mut self, master: &mut GainParam, base: f32, now: Instant) {
        match self.state {
            NarrationState::Idle => master.set_value(base),
            NarrationState::Ducking | NarrationState::Speaking => {
                master.cancel_scheduled(now);
                master.set_value(base * self.config.duck_level);
            }
            NarrationState::Unducking => {
                let left = self.deadline.map_or(Duration::ZERO, |d| d.saturating_duration_since(now));
                master.cancel_scheduled(now);
                master.linear_ramp_to(base, now, left);
            }
        }
    }
}
