#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use radio_engine::{
    sim::{SimulatedMedia, SimulatedOutput, SimulatedSpeech},
    Energy, EngineConfig, EngineEvent, ErrorKind, GenreRegistration, ManualClock, RadioEngine, TrackInput,
};

pub struct Rig {
    pub clock: ManualClock,
    pub a: SimulatedMedia,
    pub b: SimulatedMedia,
    pub speech: SimulatedSpeech,
    pub engine: RadioEngine,
    pub events: Rc<RefCell<Vec<EngineEvent>>>,
}

impl Rig {
    /// Advance simulated time in 100 ms frames, ticking the engine each frame.
    pub fn advance(&mut self, secs: f64) {
        let frames = (secs * 10.0).round() as usize;
        for _ in 0..frames {
            self.clock.advance_secs(0.1);
            self.engine.tick();
        }
    }

    pub fn event_names(&self) -> Vec<&'static str> {
        self.events.borrow().iter().map(EngineEvent::name).collect()
    }

    pub fn error_kinds(&self) -> Vec<ErrorKind> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Error { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.event_names().iter().filter(|n| **n == name).count()
    }
}

pub fn track(key: &str, title: &str, energy: Energy, bpm: u32) -> TrackInput {
    TrackInput {
        title: title.into(),
        artist: "Test Artist".into(),
        url: format!("https://cdn.test/{key}/{title}.mp3"),
        duration_hint: None,
        energy,
        bpm,
    }
}

pub fn genre(key: &str, tracks: Vec<TrackInput>, stream: Option<&str>) -> GenreRegistration {
    GenreRegistration {
        key: key.into(),
        name: key.to_uppercase(),
        color: "#123456".into(),
        icon: String::new(),
        stream: stream.map(str::to_string),
        tracks,
        description: String::new(),
        artwork: None,
    }
}

pub fn three_track_house() -> GenreRegistration {
    genre(
        "house",
        vec![
            track("house", "low", Energy::Low, 118),
            track("house", "mid", Energy::Mid, 121),
            track("house", "high", Energy::High, 124),
        ],
        Some("https://live.test/house"),
    )
}

pub fn seeded_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.playback.queue_seed = Some(42);
    config.narration.seed = Some(7);
    config
}

/// Engine on simulated decks. Every track is `track_secs` long on both decks.
pub fn rig_with(
    config: EngineConfig,
    output: Option<SimulatedOutput>,
    genres: Vec<GenreRegistration>,
    track_secs: f64,
) -> Rig {
    let clock = ManualClock::new();
    let a = SimulatedMedia::new(clock.clone());
    let b = SimulatedMedia::new(clock.clone());
    for reg in &genres {
        for t in &reg.tracks {
            a.set_duration(&t.url, track_secs);
            b.set_duration(&t.url, track_secs);
        }
        if let Some(s) = &reg.stream {
            a.mark_live(s);
            b.mark_live(s);
        }
    }
    let speech = SimulatedSpeech::new();

    let mut engine = RadioEngine::new(config, Box::new(a.clone()), Box::new(b.clone()), clock.clone())
        .with_speech(Box::new(speech.clone()));
    if let Some(out) = output {
        engine = engine.with_audio_output(Box::new(out));
    }
    for reg in genres {
        engine.register_genre(reg);
    }

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    engine.subscribe(move |e| sink.borrow_mut().push(e.clone()));

    Rig { clock, a, b, speech, engine, events }
}

pub fn rig() -> Rig {
    rig_with(seeded_config(), Some(SimulatedOutput::new(48_000)), vec![three_track_house()], 180.0)
}
