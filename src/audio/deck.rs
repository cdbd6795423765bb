use std::{
    fmt,
    ops::{Index, IndexMut},
};

use serde::{Deserialize, Serialize};

use super::media::MediaElement;

/// One of the two interchangeable playback units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeckId {
    A,
    B,
}

impl DeckId {
    pub fn other(self) -> Self {
        match self {
            DeckId::A => DeckId::B,
            DeckId::B => DeckId::A,
        }
    }

    fn index(self) -> usize {
        match self {
            DeckId::A => 0,
            DeckId::B => 1,
        }
    }
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeckId::A => write!(f, "deck_a"),
            DeckId::B => write!(f, "deck_b"),
        }
    }
}

/// Whether the deck feeds the shared signal chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Unconnected,
    Connected,
}

/// A media handle plus its gain stage.
///
/// When connected, `gain` is applied by the signal chain while rendering and
/// the element itself stays at unity volume. When unconnected the gain is
/// pushed straight onto the element, scaled by the engine's master volume.
pub struct Deck {
    pub id: DeckId,
    media: Box<dyn MediaElement>,
    gain: f32,
    connection: ConnectionState,
    /// Master volume used for direct volume control.
    direct_master: f32,
}

impl Deck {
    pub fn new(id: DeckId, media: Box<dyn MediaElement>) -> Self {
        let mut deck = Self {
            id,
            media,
            gain: 0.0,
            connection: ConnectionState::Unconnected,
            direct_master: 1.0,
        };
        deck.apply_output();
        deck
    }

    /// Route the deck through the signal chain. Idempotent.
    pub fn connect(&mut self) {
        if self.connection == ConnectionState::Connected {
            return;
        }
        self.connection = ConnectionState::Connected;
        self.media.set_volume(1.0);
        log::debug!("{} connected to signal chain", self.id);
    }

    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Assign a new source; empty urls are ignored.
    pub fn load(&mut self, url: &str) {
        if url.trim().is_empty() {
            return;
        }
        self.media.set_source(url);
    }

    pub fn is_loaded(&self, url: &str) -> bool {
        self.media.source().as_deref() == Some(url)
    }

    pub fn source(&self) -> Option<String> {
        self.media.source()
    }

    pub fn play(&mut self) -> Result<(), String> {
        if self.media.source().is_none() {
            return Err("no source loaded".to_string());
        }
        self.media.play()
    }

    pub fn pause(&mut self) {
        self.media.pause();
    }

    /// Pause and rewind.
    pub fn stop(&mut self) {
        self.media.pause();
        self.media.seek(0.0);
    }

    pub fn seek(&mut self, secs: f64) {
        self.media.seek(secs.max(0.0));
    }

    pub fn is_playing(&self) -> bool {
        self.media.source().is_some() && !self.media.is_paused()
    }

    pub fn current_time(&self) -> f64 {
        self.media.current_time()
    }

    pub fn duration(&self) -> Option<f64> {
        self.media.duration().filter(|d| d.is_finite() && *d > 0.0)
    }

    /// Seconds left, if the duration is known.
    pub fn remaining(&self) -> Option<f64> {
        self.duration().map(|d| (d - self.current_time()).max(0.0))
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain.clamp(0.0, 1.0);
        self.apply_output();
    }

    pub fn set_direct_master(&mut self, master: f32) {
        self.direct_master = master.clamp(0.0, 1.0);
        self.apply_output();
    }

    /// Fill `out` with this deck's PCM, or silence when it is not playing.
    pub fn read_into(&mut self, out: &mut [f32]) {
        if !self.is_playing() {
            out.fill(0.0);
            return;
        }
        let n = self.media.read_samples(out).min(out.len());
        out[n..].fill(0.0);
    }

    fn apply_output(&mut self) {
        if self.connection == ConnectionState::Unconnected {
            self.media.set_volume(self.gain * self.direct_master);
        }
    }
}

/// Exactly two decks, addressed by [`DeckId`].
pub struct DeckPair {
    decks: [Deck; 2],
}

impl DeckPair {
    pub fn new(a: Box<dyn MediaElement>, b: Box<dyn MediaElement>) -> Self {
        Self { decks: [Deck::new(DeckId::A, a), Deck::new(DeckId::B, b)] }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Deck> {
        self.decks.iter_mut()
    }
}

impl Index<DeckId> for DeckPair {
    type Output = Deck;

    fn index(&self, id: DeckId) -> &Deck {
        &self.decks[id.index()]
    }
}

impl IndexMut<DeckId> for DeckPair {
    fn index_mut(&mut self, id: DeckId) -> &mut Deck {
        &mut self.decks[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, sim::SimulatedMedia};

    fn deck() -> (Deck, SimulatedMedia) {
        let media = SimulatedMedia::new(ManualClock::new());
        (Deck::new(DeckId::A, Box::new(media.clone())), media)
    }

    #[test]
    fn deck_id_other_flips() {
        assert_eq!(DeckId::A.other(), DeckId::B);
        assert_eq!(DeckId::B.other(), DeckId::A);
        assert_eq!(DeckId::A.to_string(), "deck_a");
    }

    #[test]
    fn load_ignores_empty_url() {
        let (mut d, media) = deck();
        d.load("  ");
        assert!(d.source().is_none());
        d.load("https://cdn.test/a.mp3");
        assert_eq!(media.source_url().as_deref(), Some("https://cdn.test/a.mp3"));
    }

    #[test]
    fn connect_is_idempotent_and_resets_element_volume() {
        let (mut d, media) = deck();
        d.set_gain(0.5);
        assert!((media.volume() - 0.5).abs() < 1e-6);
        d.connect();
        d.connect();
        assert!(d.is_connected());
        assert!((media.volume() - 1.0).abs() < 1e-6);
        d.set_gain(0.2);
        assert!((media.volume() - 1.0).abs() < 1e-6, "connected deck leaves element volume alone");
    }

    #[test]
    fn direct_volume_scales_by_master() {
        let (mut d, media) = deck();
        d.set_gain(1.0);
        d.set_direct_master(0.5);
        assert!((media.volume() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn play_without_source_fails() {
        let (mut d, _) = deck();
        assert!(d.play().is_err());
    }
}
