//! Simulated host backends.
//!
//! Media elements that "play" against a [`Clock`], an output device and a
//! speech backend that records what it was asked to say. Used by the
//! `radio-sim` binary and by tests; a real host supplies its own.
use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    f32::consts::TAU,
    rc::Rc,
    time::Instant,
};

use crate::{
    audio::media::{AudioOutput, MediaElement},
    clock::Clock,
    narration::voice::{SpeechBackend, SpeechRequest, VoiceInfo},
};

const DEFAULT_DURATION_SECS: f64 = 180.0;
const SIM_SAMPLE_RATE: f32 = 48_000.0;

struct MediaState {
    source: Option<String>,
    paused: bool,
    /// Position accumulated before the current play run.
    offset: f64,
    started_at: Option<Instant>,
    volume: f32,
    phase: f32,
    durations: HashMap<String, f64>,
    live: HashSet<String>,
    failing: HashSet<String>,
    fail_all: bool,
    play_calls: usize,
}

/// In-memory media element; clones share state so tests can inspect a deck's
/// element after handing it to the engine.
#[derive(Clone)]
pub struct SimulatedMedia {
    clock: Rc<dyn Clock>,
    state: Rc<RefCell<MediaState>>,
}

impl SimulatedMedia {
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self::with_clock(Rc::new(clock))
    }

    pub fn with_clock(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Rc::new(RefCell::new(MediaState {
                source: None,
                paused: true,
                offset: 0.0,
                started_at: None,
                volume: 1.0,
                phase: 0.0,
                durations: HashMap::new(),
                live: HashSet::new(),
                failing: HashSet::new(),
                fail_all: false,
                play_calls: 0,
            })),
        }
    }

    pub fn set_duration(&self, url: &str, secs: f64) {
        self.state.borrow_mut().durations.insert(url.to_string(), secs);
    }

    /// Treat `url` as a live stream with no known duration.
    pub fn mark_live(&self, url: &str) {
        self.state.borrow_mut().live.insert(url.to_string());
    }

    pub fn fail_url(&self, url: &str) {
        self.state.borrow_mut().failing.insert(url.to_string());
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.state.borrow_mut().fail_all = fail;
    }

    pub fn source_url(&self) -> Option<String> {
        self.state.borrow().source.clone()
    }

    pub fn volume(&self) -> f32 {
        self.state.borrow().volume
    }

    pub fn play_calls(&self) -> usize {
        self.state.borrow().play_calls
    }

    /// True once a finite source has played to its end.
    pub fn has_ended(&self) -> bool {
        match self.duration() {
            Some(d) => !self.is_paused() && self.current_time() >= d,
            None => false,
        }
    }

    fn position(&self, st: &MediaState) -> f64 {
        let running = st
            .started_at
            .map(|t| self.clock.now().saturating_duration_since(t).as_secs_f64())
            .unwrap_or(0.0);
        let pos = st.offset + running;
        match self.duration_of(st) {
            Some(d) => pos.min(d),
            None => pos,
        }
    }

    fn duration_of(&self, st: &MediaState) -> Option<f64> {
        let src = st.source.as_ref()?;
        if st.live.contains(src) {
            return None;
        }
        Some(st.durations.get(src).copied().unwrap_or(DEFAULT_DURATION_SECS))
    }
}

impl MediaElement for SimulatedMedia {
    fn set_source(&mut self, url: &str) {
        let mut st = self.state.borrow_mut();
        st.source = Some(url.to_string());
        st.paused = true;
        st.offset = 0.0;
        st.started_at = None;
    }

    fn source(&self) -> Option<String> {
        self.state.borrow().source.clone()
    }

    fn play(&mut self) -> Result<(), String> {
        let now = self.clock.now();
        let mut st = self.state.borrow_mut();
        st.play_calls += 1;
        let src = st.source.clone().ok_or("no source")?;
        if st.fail_all || st.failing.contains(&src) {
            return Err(format!("cannot play {src}"));
        }
        if st.paused {
            st.paused = false;
            st.started_at = Some(now);
        }
        Ok(())
    }

    fn pause(&mut self) {
        let pos = {
            let st = self.state.borrow();
            self.position(&st)
        };
        let mut st = self.state.borrow_mut();
        st.offset = pos;
        st.started_at = None;
        st.paused = true;
    }

    fn is_paused(&self) -> bool {
        self.state.borrow().paused
    }

    fn current_time(&self) -> f64 {
        let st = self.state.borrow();
        self.position(&st)
    }

    fn seek(&mut self, secs: f64) {
        let now = self.clock.now();
        let mut st = self.state.borrow_mut();
        st.offset = secs.max(0.0);
        if !st.paused {
            st.started_at = Some(now);
        }
    }

    fn duration(&self) -> Option<f64> {
        let st = self.state.borrow();
        self.duration_of(&st)
    }

    fn set_volume(&mut self, volume: f32) {
        self.state.borrow_mut().volume = volume;
    }

    fn read_samples(&mut self, out: &mut [f32]) -> usize {
        let mut st = self.state.borrow_mut();
        let step = TAU * 220.0 / SIM_SAMPLE_RATE;
        for frame in out.chunks_exact_mut(2) {
            let s = st.phase.sin() * 0.3;
            frame[0] = s;
            frame[1] = s;
            st.phase = (st.phase + step) % TAU;
        }
        out.len() - out.len() % 2
    }
}

/// Output device that opens at a fixed rate, or refuses to open.
#[derive(Debug, Clone)]
pub struct SimulatedOutput {
    pub sample_rate: Option<u32>,
}

impl SimulatedOutput {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate: Some(sample_rate) }
    }

    pub fn unavailable() -> Self {
        Self { sample_rate: None }
    }
}

impl AudioOutput for SimulatedOutput {
    fn open(&mut self) -> Result<u32, String> {
        self.sample_rate.ok_or_else(|| "no audio output device".to_string())
    }
}

#[derive(Default)]
struct SpeechState {
    spoken: Vec<SpeechRequest>,
    cancels: usize,
    fail: bool,
    voices: Vec<VoiceInfo>,
}

/// Speech backend that records requests. The host (or a test) reports
/// start/end through the engine's speech event handler.
#[derive(Clone, Default)]
pub struct SimulatedSpeech {
    state: Rc<RefCell<SpeechState>>,
}

impl SimulatedSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voices(voices: Vec<VoiceInfo>) -> Self {
        let s = Self::new();
        s.state.borrow_mut().voices = voices;
        s
    }

    pub fn set_failing(&self, fail: bool) {
        self.state.borrow_mut().fail = fail;
    }

    pub fn spoken(&self) -> Vec<SpeechRequest> {
        self.state.borrow().spoken.clone()
    }

    pub fn cancels(&self) -> usize {
        self.state.borrow().cancels
    }
}

impl SpeechBackend for SimulatedSpeech {
    fn voices(&self) -> Vec<VoiceInfo> {
        self.state.borrow().voices.clone()
    }

    fn speak(&mut self, request: &SpeechRequest) -> Result<(), String> {
        let mut st = self.state.borrow_mut();
        if st.fail {
            return Err("speech synthesis unavailable".to_string());
        }
        st.spoken.push(request.clone());
        Ok(())
    }

    fn cancel(&mut self) {
        self.state.borrow_mut().cancels += 1;
    }
}
