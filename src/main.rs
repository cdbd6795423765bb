//! radio-sim: drives the engine against simulated decks, output and speech.
//!
//! Usage: `radio-sim [LIBRARY_JSON] [CONFIG_JSON]`
//!
//! Simulated time runs faster than wall time; every step the host loop
//! ticks the engine, forwards deck and speech callbacks and renders one
//! block through the signal chain. `RUST_LOG` controls verbosity.
use std::time::Duration;

use radio_engine::{
    sim::{SimulatedMedia, SimulatedOutput, SimulatedSpeech},
    Clock, DeckId, EngineConfig, EngineEvent, GenreRegistration, ManualClock, MediaEvent, RadioEngine,
    Result, SpeechEvent,
};
use tokio::time::interval;

/// Simulated time per host step.
const SIM_STEP: Duration = Duration::from_millis(250);
/// Wall time per host step.
const REAL_STEP: Duration = Duration::from_millis(10);
const SIM_SECONDS: u64 = 600;
const BLOCK_FRAMES: usize = 512;
const REPORT_EVERY: u64 = 40;
/// Rough speaking rate used to decide when an utterance is over.
const WORDS_PER_SEC: f64 = 2.5;

const DEMO_LIBRARY: &str = r##"[
  {
    "genre": "house",
    "name": "Deep House",
    "color": "#1e88e5",
    "stream": "https://live.example/house",
    "tracks": [
      { "title": "Night Drive", "artist": "Lumen", "url": "https://cdn.example/house/night-drive.mp3", "duration": 62, "energy": "low", "bpm": 118 },
      { "title": "Warehouse", "artist": "Kilo", "url": "https://cdn.example/house/warehouse.mp3", "duration": 75, "energy": "high", "bpm": 124 },
      { "title": "Sunday Glow", "artist": "Mira", "url": "https://cdn.example/house/sunday-glow.mp3", "duration": 58, "energy": "mid", "bpm": 121 },
      { "title": "Pulse", "artist": "Kilo", "url": "https://cdn.example/house/pulse.mp3", "duration": 70, "energy": 0.9, "bpm": 126 }
    ]
  },
  {
    "genre": "lofi",
    "name": "Lo-Fi",
    "color": "#8e24aa",
    "tracks": [
      { "title": "Rain Tapes", "artist": "Oku", "url": "https://cdn.example/lofi/rain-tapes.mp3", "duration": 55, "energy": "low", "bpm": 82 },
      { "title": "Late Bus", "artist": "Oku", "url": "https://cdn.example/lofi/late-bus.mp3", "duration": 64, "energy": "mid", "bpm": 85 }
    ]
  }
]"##;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        log::error!("radio-sim failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let library_json = match args.next() {
        Some(path) => std::fs::read_to_string(path)?,
        None => DEMO_LIBRARY.to_string(),
    };
    let config = match args.next() {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let registrations: Vec<GenreRegistration> = serde_json::from_str(&library_json)?;

    let clock = ManualClock::new();
    let deck_a = SimulatedMedia::new(clock.clone());
    let deck_b = SimulatedMedia::new(clock.clone());
    for reg in &registrations {
        for media in [&deck_a, &deck_b] {
            for track in &reg.tracks {
                if let Some(secs) = track.duration_hint {
                    media.set_duration(&track.url, secs);
                }
            }
            if let Some(stream) = &reg.stream {
                media.mark_live(stream);
            }
        }
    }
    let speech = SimulatedSpeech::new();

    let mut engine = RadioEngine::new(config, Box::new(deck_a.clone()), Box::new(deck_b.clone()), clock.clone())
        .with_audio_output(Box::new(SimulatedOutput::new(48_000)))
        .with_speech(Box::new(speech.clone()));
    for reg in registrations {
        engine.register_genre(reg);
    }
    engine.subscribe(|event| match event {
        EngineEvent::TrackChanged { now_playing, deck } => println!("▶ {} [{deck}]", now_playing.title()),
        EngineEvent::EnergyPhaseChanged { phase, description } => println!("≈ {phase}: {description}"),
        EngineEvent::NarrationChanged { text: Some(text), .. } => println!("🎙 {text}"),
        EngineEvent::Error { message, .. } => println!("! {message}"),
        _ => {}
    });

    engine.play()?;

    let mut ticker = interval(REAL_STEP);
    let mut block = vec![0.0_f32; BLOCK_FRAMES * 2];
    let mut spoken = 0;
    let mut speech_ends = None;
    let steps = SIM_SECONDS * 1000 / SIM_STEP.as_millis() as u64;

    for step in 0..steps {
        ticker.tick().await;
        clock.advance(SIM_STEP);
        engine.tick();

        let active = engine.active_deck();
        engine.handle_media_event(active, MediaEvent::TimeUpdate);
        let active_media = match active {
            DeckId::A => &deck_a,
            DeckId::B => &deck_b,
        };
        if active_media.has_ended() {
            engine.handle_media_event(active, MediaEvent::Ended);
        }

        let requests = speech.spoken();
        if requests.len() > spoken {
            spoken = requests.len();
            let words = requests.last().map_or(0, |r| r.text.split_whitespace().count());
            speech_ends = Some(clock.now() + Duration::from_secs_f64(words as f64 / WORDS_PER_SEC));
            engine.handle_speech_event(SpeechEvent::Started);
        }
        if speech_ends.is_some_and(|at| clock.now() >= at) {
            speech_ends = None;
            engine.handle_speech_event(SpeechEvent::Ended);
        }

        engine.render(&mut block);
        if step % REPORT_EVERY == 0 {
            if let Some(bands) = engine.spectrum_bands() {
                log::debug!(
                    "bands sub {:.2} low {:.2} mid {:.2} high {:.2} | master {:.2}",
                    bands.sub,
                    bands.low,
                    bands.mid,
                    bands.high,
                    engine.master_gain()
                );
            }
        }
    }

    let snap = engine.snapshot();
    log::info!(
        "Simulated {SIM_SECONDS}s: queue position {}/{}, phase {}",
        snap.queue_index + 1,
        snap.queue_length,
        snap.energy_phase
    );
    engine.destroy();
    Ok(())
}
