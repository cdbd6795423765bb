/// Radio Engine
///
/// Orchestrates the two decks, the queue, the crossfader and the narrator.
/// Everything runs on the host's thread: the host forwards media and speech
/// callbacks, calls [`RadioEngine::tick`] once per frame and, when it owns an
/// output device, [`RadioEngine::render`] once per audio block.
use std::time::Instant;

use crate::{
    audio::{
        analyzer::{BeatInfo, SpectrumBands},
        chain::{GainParam, SignalChain},
        crossfade::{CrossfadeComplete, CrossfadeEngine},
        deck::{DeckId, DeckPair},
        media::{AudioOutput, MediaElement, MediaEvent},
    },
    clock::Clock,
    config::{clamp_unit, EngineConfig},
    error::{RadioError, Result},
    events::{EngineEvent, EventBus, SubscriptionId},
    library::{Filter, GenreRegistration, Library},
    narration::{SpeechBackend, SpeechEvent, StreamController},
    scheduler::{EnergyArc, PlayQueue, QueueBuilder},
    state::{NowPlaying, PlaybackState, PlayerSnapshot},
};

/// Where the cursor sat before a transition moved it.
#[derive(Debug, Clone, PartialEq)]
enum Cursor {
    Queue(usize),
    Stream(Option<String>),
}

/// The source a running crossfade is bringing in.
#[derive(Debug, Clone)]
struct PendingSwap {
    entry: NowPlaying,
    /// `None` when the move rebuilt the queue.
    restore: Option<Cursor>,
    /// A forward queue step counts towards the energy arc once the fade lands.
    advances_arc: bool,
}

pub struct RadioEngine {
    config: EngineConfig,
    clock: Box<dyn Clock>,
    library: Library,

    decks: DeckPair,
    active: DeckId,
    crossfade: CrossfadeEngine,
    output: Option<Box<dyn AudioOutput>>,
    graph_attempted: bool,
    chain: Option<SignalChain>,
    /// Volume × mute × duck. Applied by the chain, or pushed onto the decks
    /// when running without one.
    master: GainParam,

    narration: StreamController,
    queue_builder: QueueBuilder,
    queue: PlayQueue,
    arc: EnergyArc,
    filter: Option<Filter>,
    stream_key: Option<String>,

    state: PlaybackState,
    track_mode: bool,
    volume: f32,
    muted: bool,
    now_playing: Option<NowPlaying>,
    pending: Option<PendingSwap>,
    preloaded: Option<String>,
    pending_skip: Option<Instant>,
    consecutive_failures: u32,

    events: EventBus,
    last_narration_job: Option<u64>,
    destroyed: bool,
}

impl RadioEngine {
    pub fn new(
        config: EngineConfig,
        media_a: Box<dyn MediaElement>,
        media_b: Box<dyn MediaElement>,
        clock: impl Clock + 'static,
    ) -> Self {
        let config = config.normalized();
        let now = clock.now();
        let queue_builder = match config.playback.queue_seed {
            Some(seed) => QueueBuilder::with_seed(config.queue.clone(), seed),
            None => QueueBuilder::new(config.queue.clone()),
        };
        let volume = config.playback.initial_volume;

        let mut decks = DeckPair::new(media_a, media_b);
        decks[DeckId::A].set_gain(1.0);
        decks[DeckId::B].set_gain(0.0);

        let mut engine = Self {
            crossfade: CrossfadeEngine::new(config.crossfade.clone()),
            narration: StreamController::new(config.narration.clone(), now),
            track_mode: config.playback.track_mode,
            clock: Box::new(clock),
            library: Library::new(),
            decks,
            active: DeckId::A,
            output: None,
            graph_attempted: false,
            chain: None,
            master: GainParam::new(volume),
            queue_builder,
            queue: PlayQueue::new(),
            arc: EnergyArc::new(),
            filter: None,
            stream_key: None,
            state: PlaybackState::Stopped,
            volume,
            muted: false,
            now_playing: None,
            pending: None,
            preloaded: None,
            pending_skip: None,
            consecutive_failures: 0,
            events: EventBus::new(),
            last_narration_job: None,
            destroyed: false,
            config,
        };
        engine.push_direct_master(now);
        engine
    }

    /// Output device opened on the first `play()`. Without one the engine
    /// runs on direct per-deck volume.
    pub fn with_audio_output(mut self, output: Box<dyn AudioOutput>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_speech(mut self, backend: Box<dyn SpeechBackend>) -> Self {
        self.narration.set_backend(backend);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Library ─────────────────────────────────────────────────────────────

    pub fn register_genre(&mut self, reg: GenreRegistration) {
        self.library.register(reg);
        if self.track_mode && self.filter.is_some() && self.queue.is_empty() {
            self.rebuild_queue();
        }
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn queue(&self) -> &PlayQueue {
        &self.queue
    }

    // ── Events ──────────────────────────────────────────────────────────────

    pub fn subscribe(&mut self, handler: impl FnMut(&EngineEvent) + 'static) -> SubscriptionId {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    // ── Transport ───────────────────────────────────────────────────────────

    /// Start or resume the current source. Returns `NoSourceAvailable` when
    /// the library has nothing to play in the current mode; a source that
    /// fails to start is reported as an event and skipped.
    pub fn play(&mut self) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        self.ensure_audio_graph();
        self.ensure_filter();
        if self.track_mode && self.queue.is_empty() {
            self.rebuild_queue();
        }
        let np = self.resolve_source().ok_or(RadioError::NoSourceAvailable)?;

        let active = self.active;
        if self.state == PlaybackState::Playing && self.decks[active].is_playing() {
            return Ok(());
        }

        let deck = &mut self.decks[active];
        if !deck.is_loaded(np.url()) {
            deck.load(np.url());
            deck.seek(0.0);
        }
        if !self.crossfade.is_crossfading() {
            deck.set_gain(1.0);
        }
        let started = deck.play();
        self.state = PlaybackState::Playing;

        match started {
            Ok(()) => {
                log::info!("Playing '{}' on {active}", np.title());
                self.consecutive_failures = 0;
                self.pending_skip = None;
                if !self.is_current(&np) {
                    self.set_now_playing(np);
                }
                self.emit_state();
                self.preload_next();
                self.prepare_narration();
            }
            Err(reason) => {
                let url = np.url().to_string();
                if !self.is_current(&np) {
                    self.set_now_playing(np);
                }
                self.emit_state();
                self.handle_source_failure(url, reason);
            }
        }
        Ok(())
    }

    /// Halt the active deck. An in-flight crossfade is abandoned first so
    /// the incoming deck does not keep sounding.
    pub fn pause(&mut self) {
        if self.destroyed || self.state != PlaybackState::Playing {
            return;
        }
        self.cancel_crossfade(true);
        self.decks[self.active].pause();
        self.state = PlaybackState::Paused;
        log::info!("Paused");
        self.emit_state();
    }

    pub fn stop(&mut self) {
        if self.destroyed {
            return;
        }
        let now = self.clock.now();
        self.cancel_crossfade(true);
        for deck in self.decks.iter_mut() {
            deck.stop();
        }
        self.pending_skip = None;
        let base = self.base_gain();
        self.narration.cancel(&mut self.master, base, now);
        self.sync_narration();
        self.push_direct_master(now);
        self.state = PlaybackState::Stopped;
        log::info!("Stopped");
        self.emit_state();
    }

    pub fn toggle_play(&mut self) -> Result<()> {
        if self.state == PlaybackState::Playing {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Advance to the next queue entry (or the next genre stream). Dropped
    /// while a crossfade is in flight.
    pub fn next(&mut self) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        if self.crossfade.is_crossfading() {
            log::debug!("next() ignored, crossfade in progress");
            return Ok(());
        }
        self.pending_skip = None;

        let (np, restore) = if self.track_mode {
            self.ensure_filter();
            if self.queue.is_empty() {
                self.rebuild_queue();
            }
            if self.queue.is_empty() {
                return Err(RadioError::NoSourceAvailable);
            }
            let before = self.queue.index();
            let restore = if self.queue.advance() {
                Some(Cursor::Queue(before))
            } else {
                self.start_next_lap();
                None
            };
            (self.queue_source(), restore)
        } else {
            let before = Cursor::Stream(self.stream_key.clone());
            (self.step_stream(true), Some(before))
        };

        let np = np.ok_or(RadioError::NoSourceAvailable)?;
        let advances_arc = self.track_mode;
        self.go_to(np, restore, advances_arc);
        Ok(())
    }

    /// Restart the current track when it is barely under way, otherwise step
    /// back one entry.
    pub fn previous(&mut self) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        if self.crossfade.is_crossfading() {
            log::debug!("previous() ignored, crossfade in progress");
            return Ok(());
        }
        self.pending_skip = None;

        let (np, restore) = if self.track_mode {
            let deck = &mut self.decks[self.active];
            if deck.source().is_some() && deck.current_time() < self.config.playback.restart_threshold_secs {
                log::debug!("previous() restarting current track");
                deck.seek(0.0);
                return Ok(());
            }
            if self.queue.is_empty() {
                return Err(RadioError::NoSourceAvailable);
            }
            let before = self.queue.index();
            self.queue.retreat();
            (self.queue_source(), Some(Cursor::Queue(before)))
        } else {
            let before = Cursor::Stream(self.stream_key.clone());
            (self.step_stream(false), Some(before))
        };

        let np = np.ok_or(RadioError::NoSourceAvailable)?;
        self.go_to(np, restore, false);
        Ok(())
    }

    /// Select a genre (or `"all"`): rebuild the queue, restart the energy arc
    /// and move to the head of the new queue.
    pub fn set_filter(&mut self, filter: impl Into<Filter>) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        self.cancel_crossfade(false);
        self.pending_skip = None;
        self.apply_filter(filter.into());
        let np = self.resolve_source().ok_or(RadioError::NoSourceAvailable)?;
        self.go_to(np, None, false);
        Ok(())
    }

    pub fn switch_channel(&mut self, filter: impl Into<Filter>) -> Result<()> {
        self.set_filter(filter)
    }

    /// Switch between the queue and genre live streams. Fails, leaving the
    /// mode unchanged, when the requested mode has nothing to play.
    pub fn set_track_mode(&mut self, track_mode: bool) -> Result<()> {
        if self.destroyed || self.track_mode == track_mode {
            return Ok(());
        }
        let previous = self.track_mode;
        self.track_mode = track_mode;
        self.ensure_filter();
        if track_mode && self.queue.is_empty() {
            self.rebuild_queue();
        }
        let Some(np) = self.resolve_source() else {
            self.track_mode = previous;
            log::warn!("Cannot switch to {} mode: nothing to play", mode_name(track_mode));
            return Err(RadioError::NoSourceAvailable);
        };

        self.cancel_crossfade(false);
        self.pending_skip = None;
        log::info!("Switched to {} mode", mode_name(track_mode));
        self.go_to(np, None, false);
        self.emit_state();
        Ok(())
    }

    pub fn set_volume(&mut self, volume: f32) {
        if self.destroyed {
            return;
        }
        self.volume = clamp_unit(volume);
        self.refresh_master();
        self.emit_state();
    }

    /// Returns the new mute state. The stored volume survives a mute.
    pub fn toggle_mute(&mut self) -> bool {
        if self.destroyed {
            return self.muted;
        }
        self.muted = !self.muted;
        self.refresh_master();
        self.emit_state();
        self.muted
    }

    /// Returns whether narration is now enabled.
    pub fn toggle_narration(&mut self) -> bool {
        if self.destroyed {
            return self.narration.is_enabled();
        }
        let now = self.clock.now();
        let base = self.base_gain();
        let enabled = self.narration.toggle(&mut self.master, base, now);
        self.sync_narration();
        self.push_direct_master(now);
        if enabled {
            self.prepare_narration();
        }
        self.emit_state();
        enabled
    }

    /// Speak `text` over the current track right away (queued behind any
    /// narration already running).
    pub fn announce(&mut self, text: &str) -> Option<u64> {
        if self.destroyed {
            return None;
        }
        let now = self.clock.now();
        let base = self.base_gain();
        let id = self.narration.announce(text, &mut self.master, base, now);
        self.sync_narration();
        id
    }

    /// Stop everything and drop all subscribers. Every later call is a no-op.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.stop();
        self.events.clear();
        self.destroyed = true;
        log::info!("Engine destroyed");
    }

    // ── Host callbacks ──────────────────────────────────────────────────────

    /// Per-frame update: crossfade ramp, narration sequencing, direct volume
    /// and the delayed skip after a failed source.
    pub fn tick(&mut self) {
        if self.destroyed {
            return;
        }
        let now = self.clock.now();

        if let Some(done) = self.crossfade.tick(&mut self.decks, now) {
            self.finish_crossfade(done);
        }

        let base = self.base_gain();
        self.narration.tick(&mut self.master, base, now);
        self.sync_narration();
        self.push_direct_master(now);

        let skip_due = self.pending_skip.is_some_and(|at| now >= at);
        if skip_due && !self.crossfade.is_crossfading() {
            self.pending_skip = None;
            log::info!("Skipping past failed source");
            if let Err(e) = self.next() {
                log::warn!("Auto-skip failed: {e}");
            }
        }
    }

    pub fn handle_media_event(&mut self, deck: DeckId, event: MediaEvent) {
        if self.destroyed {
            return;
        }
        match event {
            MediaEvent::TimeUpdate => self.on_time_update(deck),
            MediaEvent::Ended => self.on_ended(deck),
            MediaEvent::Error(reason) => self.on_media_error(deck, reason),
        }
    }

    pub fn handle_speech_event(&mut self, event: SpeechEvent) {
        if self.destroyed {
            return;
        }
        let now = self.clock.now();
        let base = self.base_gain();
        match event {
            SpeechEvent::Started => log::debug!("Speech started"),
            SpeechEvent::Ended => self.narration.speech_ended(&mut self.master, base, now),
            SpeechEvent::Error(reason) => self.narration.speech_failed(&reason, &mut self.master, base, now),
        }
        self.sync_narration();
        self.push_direct_master(now);
    }

    /// Render one interleaved stereo block through the signal chain.
    /// Silence when no chain exists.
    pub fn render(&mut self, out: &mut [f32]) {
        let master = self.master.value_at(self.clock.now());
        match self.chain.as_mut() {
            Some(chain) => chain.render(&mut self.decks, master, out),
            None => out.fill(0.0),
        }
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            state: self.state,
            is_playing: self.state == PlaybackState::Playing,
            is_muted: self.muted,
            is_crossfading: self.crossfade.is_crossfading(),
            is_track_mode: self.track_mode,
            is_speaking: self.narration.is_speaking(),
            narration_enabled: self.narration.is_enabled(),
            current_track: self.now_playing.clone(),
            active_filter: self.filter.clone(),
            energy_phase: self.arc.phase,
            queue_index: self.queue.index(),
            queue_length: self.queue.len(),
            volume: self.volume,
            active_deck: self.active,
            has_signal_chain: self.chain.is_some(),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn now_playing(&self) -> Option<&NowPlaying> {
        self.now_playing.as_ref()
    }

    pub fn active_deck(&self) -> DeckId {
        self.active
    }

    pub fn is_crossfading(&self) -> bool {
        self.crossfade.is_crossfading()
    }

    pub fn is_speaking(&self) -> bool {
        self.narration.is_speaking()
    }

    pub fn energy_arc(&self) -> &EnergyArc {
        &self.arc
    }

    /// Current master gain, including any duck in progress.
    pub fn master_gain(&self) -> f32 {
        self.master.value_at(self.clock.now())
    }

    pub fn deck_gain(&self, deck: DeckId) -> f32 {
        self.decks[deck].gain()
    }

    pub fn spectrum_bands(&mut self) -> Option<SpectrumBands> {
        self.chain.as_mut().map(|c| c.analyzer_mut().bands())
    }

    pub fn time_domain_data(&self) -> Option<Vec<f32>> {
        self.chain.as_ref().map(|c| c.analyzer().time_domain())
    }

    pub fn frequency_data(&mut self) -> Option<Vec<f32>> {
        self.chain.as_mut().map(|c| c.analyzer_mut().frequency_domain())
    }

    pub fn beat(&mut self) -> Option<BeatInfo> {
        let now = self.clock.now();
        self.chain.as_mut().map(|c| c.analyzer_mut().detect_beat(now))
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn base_gain(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }

    fn ensure_audio_graph(&mut self) {
        if self.graph_attempted {
            return;
        }
        self.graph_attempted = true;

        let Some(output) = self.output.as_mut() else {
            log::info!("No audio output attached, using direct volume control");
            return;
        };
        match output.open() {
            Ok(sample_rate) => {
                for deck in self.decks.iter_mut() {
                    deck.connect();
                }
                self.chain = Some(SignalChain::new(sample_rate, self.config.chain.clone()));
                log::info!("Signal chain ready at {sample_rate} Hz");
            }
            Err(reason) => {
                let err = RadioError::AudioGraphUnavailable(reason);
                log::warn!("{err}, falling back to direct volume control");
                self.events.emit(EngineEvent::error(&err));
            }
        }
    }

    /// Without a chain, decks carry the master gain themselves.
    fn push_direct_master(&mut self, now: Instant) {
        if self.chain.is_some() {
            return;
        }
        let master = self.master.value_at(now);
        for deck in self.decks.iter_mut() {
            deck.set_direct_master(master);
        }
    }

    fn refresh_master(&mut self) {
        let now = self.clock.now();
        let base = self.base_gain();
        self.narration.rebase(&mut self.master, base, now);
        self.push_direct_master(now);
    }

    fn ensure_filter(&mut self) {
        if self.filter.is_some() {
            return;
        }
        if let Some(key) = self.library.first_key().map(str::to_string) {
            self.apply_filter(Filter::Genre(key));
        }
    }

    fn apply_filter(&mut self, filter: Filter) {
        if let Some(key) = filter.genre_key() {
            if self.library.pool(key).is_some_and(|p| p.stream.is_some()) {
                self.stream_key = Some(key.to_string());
            }
        }
        log::info!("Channel → {filter}");
        self.filter = Some(filter.clone());
        self.rebuild_queue();

        let was = self.arc.phase;
        self.arc.reset();
        if was != self.arc.phase {
            self.events.emit(EngineEvent::EnergyPhaseChanged {
                phase: self.arc.phase,
                description: self.arc.phase.description().to_string(),
            });
        }
        self.events.emit(EngineEvent::ChannelChanged { filter });
    }

    /// Swap in the lap staged ahead of the wrap, or draw a fresh one.
    fn start_next_lap(&mut self) {
        log::info!("End of queue reached, starting the next lap");
        match self.queue.take_next_lap() {
            Some(lap) => self.queue.replace(lap),
            None => self.rebuild_queue(),
        }
    }

    /// On the last entry, draw the next lap early so its head can be
    /// preloaded and introduced like any other track.
    fn stage_next_lap(&mut self) {
        if !self.track_mode || !self.queue.needs_next_lap() {
            return;
        }
        let filter = self.filter.clone().unwrap_or(Filter::All);
        let lap = self.queue_builder.build(&self.library, &filter);
        self.queue.stage_next_lap(lap);
    }

    fn rebuild_queue(&mut self) {
        let filter = self.filter.clone().unwrap_or(Filter::All);
        let entries = self.queue_builder.build(&self.library, &filter);
        self.queue.replace(entries);
    }

    fn record_arc_step(&mut self) {
        if let Some(change) = self.arc.record_track(self.queue_builder.config()) {
            self.events.emit(EngineEvent::EnergyPhaseChanged {
                phase: change.phase,
                description: change.description,
            });
        }
    }

    fn queue_source(&self) -> Option<NowPlaying> {
        self.queue.current().map(|e| NowPlaying::Track { track: e.track.clone() })
    }

    fn stream_source(&self, key: &str) -> Option<NowPlaying> {
        let pool = self.library.pool(key)?;
        let url = pool.stream.clone()?;
        Some(NowPlaying::Stream { genre_key: pool.key.clone(), url, genre: pool.meta.clone() })
    }

    fn resolve_source(&mut self) -> Option<NowPlaying> {
        if self.track_mode {
            return self.queue_source();
        }
        let candidates = [
            self.stream_key.clone(),
            self.filter.as_ref().and_then(|f| f.genre_key()).map(str::to_string),
            self.library.stream_keys().first().map(|k| k.to_string()),
        ];
        for key in candidates.into_iter().flatten() {
            if let Some(np) = self.stream_source(&key) {
                self.stream_key = Some(key);
                return Some(np);
            }
        }
        None
    }

    /// Cycle through genres that have a live stream.
    fn step_stream(&mut self, forward: bool) -> Option<NowPlaying> {
        let keys: Vec<String> = self.library.stream_keys().into_iter().map(str::to_string).collect();
        if keys.is_empty() {
            return None;
        }
        let len = keys.len();
        let idx = match self.stream_key.as_ref().and_then(|k| keys.iter().position(|s| s == k)) {
            Some(i) if forward => (i + 1) % len,
            Some(i) => (i + len - 1) % len,
            None => 0,
        };
        let key = keys[idx].clone();
        let np = self.stream_source(&key);
        self.stream_key = Some(key);
        np
    }

    /// Move to `np`: crossfade while audible, cut when the active deck has
    /// stopped, plain load otherwise.
    /// `advances_arc` is honoured only once the move lands, so an abandoned
    /// crossfade or a failed source leaves the arc where it was.
    fn go_to(&mut self, np: NowPlaying, restore: Option<Cursor>, advances_arc: bool) {
        if self.state != PlaybackState::Playing {
            self.load_active(np, advances_arc);
        } else if self.decks[self.active].is_playing() {
            self.start_crossfade(np, restore, advances_arc);
        } else {
            self.cut_to(np, advances_arc);
        }
    }

    fn load_active(&mut self, np: NowPlaying, advances_arc: bool) {
        let deck = &mut self.decks[self.active];
        if !deck.is_loaded(np.url()) {
            deck.load(np.url());
        }
        deck.seek(0.0);
        deck.set_gain(1.0);
        if advances_arc {
            self.record_arc_step();
        }
        self.set_now_playing(np);
        self.preload_next();
        self.prepare_narration();
    }

    fn cut_to(&mut self, np: NowPlaying, advances_arc: bool) {
        let now = self.clock.now();
        let active = self.active;
        let deck = &mut self.decks[active];
        if !deck.is_loaded(np.url()) {
            deck.load(np.url());
        }
        deck.seek(0.0);
        deck.set_gain(1.0);
        let url = np.url().to_string();

        match deck.play() {
            Ok(()) => {
                log::info!("Cut to '{}' on {active}", np.title());
                self.consecutive_failures = 0;
                if advances_arc {
                    self.record_arc_step();
                }
                self.set_now_playing(np);
                self.emit_state();
                let base = self.base_gain();
                self.narration.execute_transition(&url, &mut self.master, base, now);
                self.sync_narration();
                self.preload_next();
                self.prepare_narration();
            }
            Err(reason) => {
                self.set_now_playing(np);
                self.handle_source_failure(url, reason);
            }
        }
    }

    fn start_crossfade(&mut self, np: NowPlaying, restore: Option<Cursor>, advances_arc: bool) {
        let now = self.clock.now();
        let url = np.url().to_string();
        match self.crossfade.crossfade_to(&mut self.decks, self.active, &url, now) {
            Ok(true) => {
                self.consecutive_failures = 0;
                self.pending = Some(PendingSwap { entry: np, restore, advances_arc });
                self.preloaded = None;
                let base = self.base_gain();
                self.narration.execute_transition(&url, &mut self.master, base, now);
                self.sync_narration();
                self.emit_state();
            }
            Ok(false) => log::debug!("Crossfade to {url} not started"),
            Err(RadioError::SourceLoadFailure { url, reason }) => self.handle_source_failure(url, reason),
            Err(e) => log::warn!("Crossfade failed: {e}"),
        }
    }

    fn finish_crossfade(&mut self, done: CrossfadeComplete) {
        self.active = done.new_active;
        if let Some(swap) = self.pending.take() {
            if swap.advances_arc {
                self.record_arc_step();
            }
            self.set_now_playing(swap.entry);
        }
        log::debug!("{} is now active, {} idle", done.new_active, done.old_active);
        self.emit_state();
        self.preload_next();
        self.prepare_narration();
    }

    /// Abandon a running crossfade. With `restore` the cursor goes back to
    /// the source still playing on the active deck.
    fn cancel_crossfade(&mut self, restore: bool) {
        if !self.crossfade.cancel(&mut self.decks) {
            return;
        }
        self.preloaded = None;
        let Some(swap) = self.pending.take() else {
            return;
        };
        if !restore {
            return;
        }
        match swap.restore {
            Some(Cursor::Queue(index)) => {
                self.queue.set_index(index);
            }
            Some(Cursor::Stream(key)) => self.stream_key = key,
            None => {}
        }
    }

    /// Load the upcoming queue entry into the idle deck.
    fn preload_next(&mut self) {
        if !self.track_mode || self.crossfade.is_crossfading() {
            return;
        }
        self.stage_next_lap();
        let Some(next) = self.queue.peek_next() else {
            return;
        };
        let url = next.track.url.clone();
        if self.preloaded.as_deref() == Some(url.as_str()) {
            return;
        }
        let idle = self.active.other();
        if !self.decks[idle].is_loaded(&url) {
            self.decks[idle].load(&url);
        }
        log::debug!("Preloaded {url} on {idle}");
        self.preloaded = Some(url);
    }

    fn prepare_narration(&mut self) {
        if !self.track_mode {
            return;
        }
        self.stage_next_lap();
        if let Some(next) = self.queue.peek_next() {
            let (track, phase) = (next.track.clone(), next.phase);
            self.narration.prepare_transition(&track, phase);
        }
    }

    fn on_time_update(&mut self, deck: DeckId) {
        if deck != self.active {
            return;
        }
        let d = &self.decks[deck];
        let (position, duration, remaining, playing) = (d.current_time(), d.duration(), d.remaining(), d.is_playing());
        self.events.emit(EngineEvent::TimeUpdate { position, duration });

        if !self.track_mode || self.state != PlaybackState::Playing || self.crossfade.is_crossfading() || !playing {
            return;
        }
        let window = self.crossfade.config().trigger_window_secs();
        if remaining.is_some_and(|r| r <= window) {
            log::debug!("{deck} has {:.2}s left, starting transition", remaining.unwrap_or_default());
            if let Err(e) = self.next() {
                log::warn!("Auto-advance failed: {e}");
            }
        }
    }

    fn on_ended(&mut self, deck: DeckId) {
        if deck != self.active || self.crossfade.is_crossfading() || self.state != PlaybackState::Playing {
            return;
        }
        self.decks[deck].pause();
        if self.track_mode {
            log::debug!("{deck} ended, cutting to next track");
            if let Err(e) = self.next() {
                log::warn!("Advance after end failed: {e}");
            }
        } else {
            let url = self.decks[deck].source().unwrap_or_default();
            self.handle_source_failure(url, "stream ended".to_string());
        }
    }

    fn on_media_error(&mut self, deck: DeckId, reason: String) {
        let url = self.decks[deck].source().unwrap_or_default();
        let incoming = self.crossfade.session().map(|s| s.incoming);

        if incoming == Some(deck) {
            log::warn!("Incoming {deck} failed mid-crossfade: {reason}");
            self.crossfade.cancel(&mut self.decks);
            self.pending = None;
            self.preloaded = None;
            self.emit_state();
            self.handle_source_failure(url, reason);
        } else if self.crossfade.session().is_some_and(|s| s.outgoing == deck) {
            // Fade continues onto the incoming deck.
            log::warn!("Outgoing {deck} failed mid-crossfade: {reason}");
            let err = RadioError::SourceLoadFailure { url, reason };
            self.events.emit(EngineEvent::error(&err));
        } else if deck == self.active {
            self.handle_source_failure(url, reason);
        } else {
            log::warn!("Preload on {deck} failed: {reason}");
            self.preloaded = None;
        }
    }

    fn handle_source_failure(&mut self, url: String, reason: String) {
        let err = RadioError::SourceLoadFailure { url, reason };
        self.events.emit(EngineEvent::error(&err));
        self.consecutive_failures += 1;

        let max = self.config.playback.max_consecutive_failures;
        if self.consecutive_failures >= max {
            log::error!("{max} sources failed in a row, stopping playback");
            self.consecutive_failures = 0;
            self.stop();
            self.events.emit(EngineEvent::error(&RadioError::NoSourceAvailable));
            return;
        }
        if self.track_mode {
            let delay = self.config.playback.error_skip_delay();
            self.pending_skip = Some(self.clock.now() + delay);
            log::debug!("Skipping in {delay:?} (failure {}/{max})", self.consecutive_failures);
        }
    }

    fn is_current(&self, np: &NowPlaying) -> bool {
        self.now_playing.as_ref().map(NowPlaying::url) == Some(np.url())
    }

    /// Every transition reports a track change, even when the queue repeats
    /// the same track.
    fn set_now_playing(&mut self, np: NowPlaying) {
        self.now_playing = Some(np.clone());
        self.events.emit(EngineEvent::TrackChanged { now_playing: np, deck: self.active });
    }

    fn emit_state(&mut self) {
        let snapshot = Box::new(self.snapshot());
        self.events.emit(EngineEvent::StateChanged { snapshot });
    }

    /// Emit `NarrationChanged` whenever the job being spoken changes.
    fn sync_narration(&mut self) {
        let job = self.narration.current_job().map(|j| (j.id, j.text.clone()));
        let id = job.as_ref().map(|(id, _)| *id);
        if id == self.last_narration_job {
            return;
        }
        self.last_narration_job = id;
        self.events.emit(EngineEvent::NarrationChanged { speaking: job.is_some(), text: job.map(|(_, t)| t) });
    }
}

fn mode_name(track_mode: bool) -> &'static str {
    if track_mode {
        "track"
    } else {
        "stream"
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{
        clock::ManualClock,
        library::{Energy, TrackInput},
        sim::{SimulatedMedia, SimulatedOutput, SimulatedSpeech},
    };

    struct Rig {
        clock: ManualClock,
        a: SimulatedMedia,
        b: SimulatedMedia,
        speech: SimulatedSpeech,
        engine: RadioEngine,
        events: Rc<RefCell<Vec<EngineEvent>>>,
    }

    fn genre(key: &str, n: usize, stream: Option<&str>) -> GenreRegistration {
        GenreRegistration {
            key: key.into(),
            name: key.to_uppercase(),
            color: String::new(),
            icon: String::new(),
            stream: stream.map(str::to_string),
            tracks: (0..n)
                .map(|i| TrackInput {
                    title: format!("{key}-{i}"),
                    artist: "Artist".into(),
                    url: format!("https://cdn.test/{key}/{i}.mp3"),
                    duration_hint: None,
                    energy: [Energy::Low, Energy::Mid, Energy::High][i % 3],
                    bpm: 120,
                })
                .collect(),
            description: String::new(),
            artwork: None,
        }
    }

    fn rig() -> Rig {
        let clock = ManualClock::new();
        let a = SimulatedMedia::new(clock.clone());
        let b = SimulatedMedia::new(clock.clone());
        let speech = SimulatedSpeech::new();
        let mut config = EngineConfig::default();
        config.playback.queue_seed = Some(11);
        config.narration.seed = Some(5);
        let mut engine = RadioEngine::new(config, Box::new(a.clone()), Box::new(b.clone()), clock.clone())
            .with_audio_output(Box::new(SimulatedOutput::new(48_000)))
            .with_speech(Box::new(speech.clone()));
        engine.register_genre(genre("house", 3, Some("https://live.test/house")));
        engine.register_genre(genre("jazz", 2, Some("https://live.test/jazz")));
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        engine.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        Rig { clock, a, b, speech, engine, events }
    }

    fn names(events: &Rc<RefCell<Vec<EngineEvent>>>) -> Vec<&'static str> {
        events.borrow().iter().map(EngineEvent::name).collect()
    }

    /// Tick through a whole crossfade.
    fn settle(r: &mut Rig) {
        for _ in 0..80 {
            r.clock.advance_secs(0.1);
            r.engine.tick();
        }
    }

    #[test]
    fn play_selects_first_genre_and_starts_deck_a() {
        let mut r = rig();
        r.engine.play().unwrap();
        let snap = r.engine.snapshot();
        assert!(snap.is_playing);
        assert!(snap.has_signal_chain);
        assert_eq!(snap.active_filter, Some(Filter::Genre("house".into())));
        assert_eq!(snap.queue_length, 24);
        assert_eq!(r.a.source_url().as_deref(), Some(snap.current_track.unwrap().url()));
        assert!(names(&r.events).starts_with(&["channel_changed", "track_changed", "state_changed"]));
    }

    #[test]
    fn play_preloads_the_next_entry() {
        let mut r = rig();
        r.engine.play().unwrap();
        let next = r.engine.queue().entries()[1].track.url.clone();
        assert_eq!(r.b.source_url(), Some(next));
    }

    #[test]
    fn empty_library_has_no_source() {
        let clock = ManualClock::new();
        let mut engine = RadioEngine::new(
            EngineConfig::default(),
            Box::new(SimulatedMedia::new(clock.clone())),
            Box::new(SimulatedMedia::new(clock.clone())),
            clock,
        );
        assert!(matches!(engine.play(), Err(RadioError::NoSourceAvailable)));
        assert_eq!(engine.state(), PlaybackState::Stopped);
    }

    #[test]
    fn next_while_playing_crossfades_and_swaps_decks() {
        let mut r = rig();
        r.engine.play().unwrap();
        r.engine.next().unwrap();
        assert!(r.engine.is_crossfading());
        assert_eq!(r.engine.active_deck(), DeckId::A);

        settle(&mut r);
        assert!(!r.engine.is_crossfading());
        assert_eq!(r.engine.active_deck(), DeckId::B);
        assert_eq!(r.engine.deck_gain(DeckId::B), 1.0);
        assert_eq!(r.engine.deck_gain(DeckId::A), 0.0);
        assert_eq!(r.engine.snapshot().queue_index, 1);
    }

    #[test]
    fn next_during_crossfade_is_dropped() {
        let mut r = rig();
        r.engine.play().unwrap();
        r.engine.next().unwrap();
        r.engine.next().unwrap();
        assert_eq!(r.engine.snapshot().queue_index, 1);
    }

    #[test]
    fn next_while_stopped_loads_without_playing() {
        let mut r = rig();
        r.engine.set_filter("house").unwrap();
        r.engine.next().unwrap();
        assert!(!r.engine.is_crossfading());
        assert_eq!(r.engine.state(), PlaybackState::Stopped);
        let url = r.engine.queue().entries()[1].track.url.clone();
        assert_eq!(r.a.source_url(), Some(url));
        assert_eq!(r.a.play_calls(), 0);
    }

    #[test]
    fn pause_cancels_crossfade_and_restores_cursor() {
        let mut r = rig();
        r.engine.play().unwrap();
        let first = r.engine.now_playing().unwrap().url().to_string();
        r.engine.next().unwrap();
        r.clock.advance_secs(1.0);
        r.engine.tick();

        r.engine.pause();
        assert!(!r.engine.is_crossfading());
        assert_eq!(r.engine.state(), PlaybackState::Paused);
        assert_eq!(r.engine.snapshot().queue_index, 0);
        assert!(r.b.volume() == 1.0 && r.engine.deck_gain(DeckId::B) == 0.0);
        assert_eq!(r.engine.deck_gain(DeckId::A), 1.0);

        r.engine.play().unwrap();
        assert_eq!(r.engine.now_playing().unwrap().url(), first);
        assert_eq!(r.engine.active_deck(), DeckId::A);
    }

    #[test]
    fn previous_restarts_early_and_steps_back_later() {
        let mut r = rig();
        r.engine.play().unwrap();

        r.clock.advance_secs(1.5);
        r.engine.previous().unwrap();
        assert!(!r.engine.is_crossfading());
        assert_eq!(r.engine.snapshot().queue_index, 0);
        assert_eq!(r.a.current_time(), 0.0);

        r.clock.advance_secs(5.0);
        r.engine.previous().unwrap();
        assert!(r.engine.is_crossfading());
        assert_eq!(r.engine.snapshot().queue_index, 23);
    }

    #[test]
    fn volume_is_clamped_and_survives_mute() {
        let mut r = rig();
        r.engine.set_volume(1.4);
        assert_eq!(r.engine.snapshot().volume, 1.0);
        r.engine.set_volume(-0.2);
        assert_eq!(r.engine.snapshot().volume, 0.0);

        r.engine.set_volume(0.6);
        assert!(r.engine.toggle_mute());
        assert_eq!(r.engine.master_gain(), 0.0);
        assert!(!r.engine.toggle_mute());
        assert!((r.engine.master_gain() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn set_filter_rebuilds_and_resets_arc() {
        let mut r = rig();
        r.engine.play().unwrap();
        for _ in 0..3 {
            r.engine.next().unwrap();
            settle(&mut r);
        }
        assert_eq!(r.engine.energy_arc().phase, crate::scheduler::EnergyPhase::Peak);

        r.engine.set_filter("jazz").unwrap();
        assert_eq!(r.engine.energy_arc().phase, crate::scheduler::EnergyPhase::Build);
        assert!(r.engine.is_crossfading());
        assert!(r.engine.queue().entries().iter().all(|e| e.track.genre_key == "jazz"));
        assert!(names(&r.events).contains(&"energy_phase_changed"));
    }

    #[test]
    fn stream_mode_cycles_genre_streams() {
        let mut r = rig();
        r.engine.set_track_mode(false).unwrap();
        r.engine.play().unwrap();
        assert_eq!(r.engine.now_playing().unwrap().url(), "https://live.test/house");
        r.engine.next().unwrap();
        settle(&mut r);
        assert_eq!(r.engine.now_playing().unwrap().url(), "https://live.test/jazz");
        r.engine.next().unwrap();
        settle(&mut r);
        assert_eq!(r.engine.now_playing().unwrap().url(), "https://live.test/house");
    }

    #[test]
    fn stream_mode_without_streams_is_refused() {
        let clock = ManualClock::new();
        let mut engine = RadioEngine::new(
            EngineConfig::default(),
            Box::new(SimulatedMedia::new(clock.clone())),
            Box::new(SimulatedMedia::new(clock.clone())),
            clock,
        );
        engine.register_genre(genre("ambient", 2, None));
        assert!(matches!(engine.set_track_mode(false), Err(RadioError::NoSourceAvailable)));
        assert!(engine.snapshot().is_track_mode);
    }

    #[test]
    fn crossfade_executes_prepared_narration() {
        let mut r = rig();
        r.engine.play().unwrap();
        r.engine.next().unwrap();
        assert!(r.engine.is_speaking());
        r.clock.advance_secs(0.5);
        r.engine.tick();
        assert_eq!(r.speech.spoken().len(), 1);
        assert!((r.engine.master_gain() - 0.8 * 0.25).abs() < 1e-5);

        r.engine.handle_speech_event(SpeechEvent::Ended);
        r.clock.advance_secs(1.0);
        r.engine.tick();
        assert!(!r.engine.is_speaking());
        assert!((r.engine.master_gain() - 0.8).abs() < 1e-5);
        assert!(names(&r.events).contains(&"narration_changed"));
    }

    #[test]
    fn destroy_is_terminal() {
        let mut r = rig();
        r.engine.play().unwrap();
        r.engine.destroy();
        let seen = r.events.borrow().len();
        assert_eq!(r.engine.state(), PlaybackState::Stopped);
        r.engine.play().unwrap();
        r.engine.next().unwrap();
        r.engine.tick();
        assert!(r.engine.toggle_narration());
        assert!(r.engine.snapshot().narration_enabled);
        assert_eq!(r.engine.state(), PlaybackState::Stopped);
        assert_eq!(r.events.borrow().len(), seen);
    }
}
