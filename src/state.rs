use std::sync::Arc;

use serde::Serialize;

use crate::{
    audio::deck::DeckId,
    library::{Filter, GenreMeta, Track},
    scheduler::EnergyPhase,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// What the active deck is playing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NowPlaying {
    Track { track: Arc<Track> },
    Stream { genre_key: String, url: String, genre: GenreMeta },
}

impl NowPlaying {
    pub fn url(&self) -> &str {
        match self {
            NowPlaying::Track { track } => &track.url,
            NowPlaying::Stream { url, .. } => url,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            NowPlaying::Track { track } => &track.title,
            NowPlaying::Stream { genre, genre_key, .. } => {
                if genre.name.is_empty() {
                    genre_key
                } else {
                    &genre.name
                }
            }
        }
    }

    pub fn track(&self) -> Option<&Arc<Track>> {
        match self {
            NowPlaying::Track { track } => Some(track),
            NowPlaying::Stream { .. } => None,
        }
    }
}

/// Read-only view of the engine, handed to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub state: PlaybackState,
    pub is_playing: bool,
    pub is_muted: bool,
    pub is_crossfading: bool,
    pub is_track_mode: bool,
    pub is_speaking: bool,
    pub narration_enabled: bool,
    pub current_track: Option<NowPlaying>,
    pub active_filter: Option<Filter>,
    pub energy_phase: EnergyPhase,
    pub queue_index: usize,
    pub queue_length: usize,
    pub volume: f32,
    pub active_deck: DeckId,
    /// False while running on direct per-deck volume control.
    pub has_signal_chain: bool,
}
