/// Engine events
///
/// Everything observers learn about playback arrives as an [`EngineEvent`]
/// through the [`EventBus`]. Handlers run synchronously, in subscription
/// order, after the state they describe has been committed.
use serde::Serialize;

use crate::{
    audio::deck::DeckId,
    error::{ErrorKind, RadioError},
    library::Filter,
    scheduler::EnergyPhase,
    state::{NowPlaying, PlayerSnapshot},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    TrackChanged { now_playing: NowPlaying, deck: DeckId },
    StateChanged { snapshot: Box<PlayerSnapshot> },
    ChannelChanged { filter: Filter },
    TimeUpdate { position: f64, duration: Option<f64> },
    Error { kind: ErrorKind, message: String },
    EnergyPhaseChanged { phase: EnergyPhase, description: String },
    NarrationChanged { speaking: bool, text: Option<String> },
}

impl EngineEvent {
    pub fn error(err: &RadioError) -> Self {
        EngineEvent::Error { kind: err.kind(), message: err.to_string() }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::TrackChanged { .. } => "track_changed",
            EngineEvent::StateChanged { .. } => "state_changed",
            EngineEvent::ChannelChanged { .. } => "channel_changed",
            EngineEvent::TimeUpdate { .. } => "time_update",
            EngineEvent::Error { .. } => "error",
            EngineEvent::EnergyPhaseChanged { .. } => "energy_phase_changed",
            EngineEvent::NarrationChanged { .. } => "narration_changed",
        }
    }

    fn log(&self) {
        match self {
            EngineEvent::Error { kind, message } => log::warn!("[event] error ({kind:?}): {message}"),
            EngineEvent::TrackChanged { now_playing, deck } => {
                log::info!("[event] track_changed: '{}' on {deck}", now_playing.title())
            }
            EngineEvent::TimeUpdate { .. } => log::trace!("[event] time_update"),
            other => log::debug!("[event] {}", other.name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&EngineEvent)>;

#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    handlers: Vec<(SubscriptionId, Handler)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, handler: impl FnMut(&EngineEvent) + 'static) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.handlers.push((id, Box::new(handler)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(h, _)| *h != id);
        self.handlers.len() != before
    }

    pub fn emit(&mut self, event: EngineEvent) {
        event.log();
        for (_, handler) in self.handlers.iter_mut() {
            handler(&event);
        }
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
