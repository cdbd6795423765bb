//! Synthetic DJ: scripts, speech and ducking around track transitions.
pub mod controller;
pub mod injector;
pub mod script;
pub mod voice;

pub use controller::{NarrationConfig, StreamController};
pub use injector::{AudioInjector, DuckConfig, NarrationJob, NarrationState};
pub use script::{ScriptConfig, ScriptGenerator};
pub use voice::{SpeechBackend, SpeechEvent, SpeechRequest, VoiceConfig, VoiceInfo, VoiceSynthesizer};
