pub mod audio;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod library;
pub mod narration;
pub mod scheduler;
pub mod sim;
pub mod state;

pub use audio::{
    deck::DeckId,
    media::{AudioOutput, MediaElement, MediaEvent},
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::RadioEngine;
pub use error::{ErrorKind, RadioError, Result};
pub use events::{EngineEvent, SubscriptionId};
pub use library::{Energy, Filter, GenreRegistration, Library, Track, TrackInput};
pub use narration::{SpeechBackend, SpeechEvent};
pub use state::{NowPlaying, PlaybackState, PlayerSnapshot};
