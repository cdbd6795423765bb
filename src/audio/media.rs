//! Host seams for media playback and audio output.
//!
//! Decoding and transport belong to the host platform. The engine only sees a
//! media handle per deck and, optionally, an output device it can render the
//! shared signal chain into.

/// One host media handle, owned exclusively by a deck.
pub trait MediaElement {
    /// Assign a new source and start buffering it. Does not start playback.
    fn set_source(&mut self, url: &str);

    fn source(&self) -> Option<String>;

    /// Start or resume playback of the current source.
    fn play(&mut self) -> Result<(), String>;

    fn pause(&mut self);

    fn is_paused(&self) -> bool;

    /// Playback position in seconds.
    fn current_time(&self) -> f64;

    fn seek(&mut self, secs: f64);

    /// Total duration in seconds; `None` while unknown or for live streams.
    fn duration(&self) -> Option<f64>;

    /// Element volume in [0, 1]. Only used when the signal chain is
    /// unavailable and the engine falls back to direct volume control.
    fn set_volume(&mut self, volume: f32);

    /// Pull decoded interleaved stereo PCM for the shared signal chain.
    /// Returns the number of samples written; the rest of `out` is zeroed.
    fn read_samples(&mut self, out: &mut [f32]) -> usize {
        out.fill(0.0);
        0
    }
}

/// Notifications the host forwards from a deck's media handle.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    TimeUpdate,
    Ended,
    Error(String),
}

/// The host audio subsystem. `open` is called lazily from the first `play()`
/// and returns the output sample rate.
pub trait AudioOutput {
    fn open(&mut self) -> Result<u32, String>;
}
