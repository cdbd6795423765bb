use std::{
    f32::consts::{FRAC_PI_2, PI},
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use super::deck::{DeckId, DeckPair};
use crate::error::RadioError;

// ── FadeCurve ─────────────────────────────────────────────────────────────────

/// Crossfade curve shape.
///
/// `t` is fade progress in [0.0, 1.0]; 0.0 is the start of the fade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    Linear,
    Exponential,
    SCurve,
    Logarithmic,
    /// cos/sin pair: `out² + in² = 1` at every point.
    #[default]
    EqualPower,
}

impl FadeCurve {
    /// Gain for the outgoing deck. `t = 0.0` → full volume; `t = 1.0` → silent.
    pub fn gain_out(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            FadeCurve::Linear => 1.0 - t,
            FadeCurve::Exponential => (1.0 - t).powi(2),
            FadeCurve::SCurve => 0.5 * (1.0 + (PI * t).cos()),
            FadeCurve::Logarithmic => (1.0 + 9.0 * (1.0 - t)).log10(),
            FadeCurve::EqualPower => (t * FRAC_PI_2).cos(),
        }
    }

    /// Gain for the incoming deck. `t = 0.0` → silent; `t = 1.0` → full volume.
    ///
    /// Mirrors `gain_out` except for `EqualPower`, which uses the sine
    /// component.
    pub fn gain_in(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            FadeCurve::EqualPower => (t * FRAC_PI_2).sin(),
            other => 1.0 - other.gain_out(t),
        }
    }
}

/// Loudness dip applied identically to both decks, deepest at the midpoint.
#[inline]
pub fn groove_dip(t: f32, depth: f32) -> f32 {
    1.0 - depth * (t.clamp(0.0, 1.0) * PI).sin()
}

// ── CrossfadeConfig ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossfadeConfig {
    /// Length of the overlap in seconds.
    pub duration_secs: f64,
    /// Extra lead before the end of the track at which the auto-crossfade
    /// fires: trigger when `remaining <= duration_secs + trigger_lead_secs`.
    pub trigger_lead_secs: f64,
    pub curve: FadeCurve,
    pub groove_dip: bool,
    pub groove_dip_depth: f32,
}

impl Default for CrossfadeConfig {
    fn default() -> Self {
        Self {
            duration_secs: 6.0,
            trigger_lead_secs: 0.75,
            curve: FadeCurve::EqualPower,
            groove_dip: true,
            groove_dip_depth: 0.05,
        }
    }
}

impl CrossfadeConfig {
    pub fn normalized(mut self) -> Self {
        if !self.duration_secs.is_finite() || self.duration_secs < 0.0 {
            self.duration_secs = 0.0;
        }
        if !self.trigger_lead_secs.is_finite() || self.trigger_lead_secs < 0.0 {
            self.trigger_lead_secs = 0.0;
        }
        self.groove_dip_depth = self.groove_dip_depth.clamp(0.0, 0.5);
        self
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs)
    }

    /// Remaining playback time (seconds) at which the next crossfade starts.
    pub fn trigger_window_secs(&self) -> f64 {
        self.duration_secs + self.trigger_lead_secs
    }

    /// `(outgoing, incoming)` gains at progress `t`.
    pub fn gains(&self, t: f32) -> (f32, f32) {
        let dip = if self.groove_dip { groove_dip(t, self.groove_dip_depth) } else { 1.0 };
        (self.curve.gain_out(t) * dip, self.curve.gain_in(t) * dip)
    }
}

// ── Session / engine ──────────────────────────────────────────────────────────

/// An in-flight crossfade.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossfadeSession {
    pub outgoing: DeckId,
    pub incoming: DeckId,
    pub started_at: Instant,
    pub duration: Duration,
}

impl CrossfadeSession {
    /// Progress θ in [0, 1] from elapsed wall-clock time.
    pub fn progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started_at).as_secs_f64();
        (elapsed / self.duration.as_secs_f64()).clamp(0.0, 1.0) as f32
    }
}

/// Outcome of a completed session. The caller flips its active-deck pointer
/// to `new_active` before notifying observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossfadeComplete {
    pub new_active: DeckId,
    pub old_active: DeckId,
}

/// Drives gain ramps between the two decks. At most one session exists at a
/// time; `is_crossfading()` is the gate.
#[derive(Debug, Default)]
pub struct CrossfadeEngine {
    config: CrossfadeConfig,
    session: Option<CrossfadeSession>,
}

impl CrossfadeEngine {
    pub fn new(config: CrossfadeConfig) -> Self {
        Self { config: config.normalized(), session: None }
    }

    pub fn config(&self) -> &CrossfadeConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: CrossfadeConfig) {
        self.config = config.normalized();
    }

    pub fn is_crossfading(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&CrossfadeSession> {
        self.session.as_ref()
    }

    /// Start fading from `active` to the other deck playing `url`.
    ///
    /// Returns `Ok(false)` without touching anything when `url` is empty or a
    /// session is already in flight. When the incoming deck refuses to play
    /// the session is aborted, the active deck keeps playing and the failure
    /// is returned.
    pub fn crossfade_to(
        &mut self,
        decks: &mut DeckPair,
        active: DeckId,
        url: &str,
        now: Instant,
    ) -> Result<bool, RadioError> {
        if url.trim().is_empty() || self.session.is_some() {
            return Ok(false);
        }

        let incoming = active.other();
        {
            let deck = &mut decks[incoming];
            if !deck.is_loaded(url) {
                deck.load(url);
            }
            deck.seek(0.0);
            deck.set_gain(0.0);
            if let Err(reason) = deck.play() {
                deck.stop();
                log::warn!("Crossfade aborted, {incoming} failed to start {url}: {reason}");
                return Err(RadioError::SourceLoadFailure { url: url.to_string(), reason });
            }
        }

        log::debug!(
            "Crossfade {active} → {incoming} over {:.2}s ({url})",
            self.config.duration_secs
        );
        self.session = Some(CrossfadeSession {
            outgoing: active,
            incoming,
            started_at: now,
            duration: self.config.duration(),
        });
        Ok(true)
    }

    /// Advance the ramp to `now`. Returns the completion once θ reaches 1,
    /// after the outgoing deck has been paused, rewound and silenced.
    pub fn tick(&mut self, decks: &mut DeckPair, now: Instant) -> Option<CrossfadeComplete> {
        let session = self.session.as_ref()?;
        let t = session.progress(now);
        let (outgoing, incoming) = (session.outgoing, session.incoming);

        if t >= 1.0 {
            decks[outgoing].stop();
            decks[outgoing].set_gain(0.0);
            decks[incoming].set_gain(1.0);
            self.session = None;
            return Some(CrossfadeComplete { new_active: incoming, old_active: outgoing });
        }

        let (g_out, g_in) = self.config.gains(t);
        decks[outgoing].set_gain(g_out);
        decks[incoming].set_gain(g_in);
        None
    }

    /// Abandon the in-flight session: the incoming deck is stopped and the
    /// outgoing deck is restored to full gain.
    pub fn cancel(&mut self, decks: &mut DeckPair) -> bool {
        match self.session.take() {
            Some(s) => {
                decks[s.incoming].stop();
                decks[s.incoming].set_gain(0.0);
                decks[s.outgoing].set_gain(1.0);
                log::debug!("Crossfade {} → {} cancelled", s.outgoing, s.incoming);
                true
            }
            None => false,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, clock::Clock, sim::SimulatedMedia};

    const ALL_CURVES: [FadeCurve; 5] = [
        FadeCurve::Linear,
        FadeCurve::Exponential,
        FadeCurve::SCurve,
        FadeCurve::Logarithmic,
        FadeCurve::EqualPower,
    ];

    fn decks(clock: &ManualClock) -> (DeckPair, SimulatedMedia, SimulatedMedia) {
        let a = SimulatedMedia::new(clock.clone());
        let b = SimulatedMedia::new(clock.clone());
        let mut pair = DeckPair::new(Box::new(a.clone()), Box::new(b.clone()));
        pair[DeckId::A].load("https://cdn.test/one.mp3");
        pair[DeckId::A].set_gain(1.0);
        pair[DeckId::A].play().unwrap();
        (pair, a, b)
    }

    fn plain_config(duration_secs: f64) -> CrossfadeConfig {
        CrossfadeConfig { duration_secs, groove_dip: false, ..Default::default() }
    }

    #[test]
    fn curve_boundaries() {
        for c in ALL_CURVES {
            assert!((c.gain_out(0.0) - 1.0).abs() < 1e-5, "{c:?} out t=0");
            assert!(c.gain_out(1.0).abs() < 1e-5, "{c:?} out t=1");
            assert!(c.gain_in(0.0).abs() < 1e-5, "{c:?} in t=0");
            assert!((c.gain_in(1.0) - 1.0).abs() < 1e-5, "{c:?} in t=1");
        }
    }

    #[test]
    fn equal_power_unity_sum() {
        let c = FadeCurve::EqualPower;
        for i in 0..=20 {
            let t = i as f32 / 20.0;
            let (o, n) = (c.gain_out(t), c.gain_in(t));
            assert!((o * o + n * n - 1.0).abs() < 1e-5, "out²+in² != 1 at t={t}");
        }
    }

    #[test]
    fn groove_dip_scales_both_sides_equally() {
        let cfg = CrossfadeConfig::default();
        let (o, n) = cfg.gains(0.5);
        let dip = 1.0 - 0.05;
        let expected = (0.5 * FRAC_PI_2).cos() * dip;
        assert!((o - expected).abs() < 1e-5);
        assert!((n - expected).abs() < 1e-5);
        assert!(((o * o + n * n) - dip * dip).abs() < 1e-5);

        let (o0, n0) = cfg.gains(0.0);
        assert!((o0 - 1.0).abs() < 1e-6 && n0.abs() < 1e-6, "no dip at the endpoints");
    }

    #[test]
    fn clamps_outside_range() {
        let c = FadeCurve::EqualPower;
        assert_eq!(c.gain_out(-1.0), c.gain_out(0.0));
        assert_eq!(c.gain_in(2.0), c.gain_in(1.0));
    }

    #[test]
    fn ramp_follows_wall_clock() {
        let clock = ManualClock::new();
        let (mut pair, _, b) = decks(&clock);
        let mut xf = CrossfadeEngine::new(plain_config(4.0));

        assert!(xf.crossfade_to(&mut pair, DeckId::A, "https://cdn.test/two.mp3", clock.now()).unwrap());
        assert_eq!(b.source_url().as_deref(), Some("https://cdn.test/two.mp3"));

        // One big jump equals many small ones: progress is elapsed/duration.
        clock.advance_secs(1.0);
        assert!(xf.tick(&mut pair, clock.now()).is_none());
        let t = 0.25_f32;
        assert!((pair[DeckId::A].gain() - (t * FRAC_PI_2).cos()).abs() < 1e-5);
        assert!((pair[DeckId::B].gain() - (t * FRAC_PI_2).sin()).abs() < 1e-5);

        clock.advance_secs(3.5);
        let done = xf.tick(&mut pair, clock.now()).expect("complete");
        assert_eq!(done.new_active, DeckId::B);
        assert!(!xf.is_crossfading());
        assert_eq!(pair[DeckId::A].gain(), 0.0);
        assert_eq!(pair[DeckId::B].gain(), 1.0);
        assert!(!pair[DeckId::A].is_playing());
        assert_eq!(pair[DeckId::A].current_time(), 0.0);
    }

    #[test]
    fn second_request_is_dropped_while_in_flight() {
        let clock = ManualClock::new();
        let (mut pair, _, b) = decks(&clock);
        let mut xf = CrossfadeEngine::new(plain_config(4.0));

        assert!(xf.crossfade_to(&mut pair, DeckId::A, "https://cdn.test/two.mp3", clock.now()).unwrap());
        let before = xf.session().cloned();
        assert!(!xf.crossfade_to(&mut pair, DeckId::A, "https://cdn.test/three.mp3", clock.now()).unwrap());
        assert_eq!(xf.session().cloned(), before);
        assert_eq!(b.source_url().as_deref(), Some("https://cdn.test/two.mp3"));
    }

    #[test]
    fn empty_url_is_a_no_op() {
        let clock = ManualClock::new();
        let (mut pair, _, _) = decks(&clock);
        let mut xf = CrossfadeEngine::new(plain_config(4.0));
        assert!(!xf.crossfade_to(&mut pair, DeckId::A, "", clock.now()).unwrap());
        assert!(!xf.is_crossfading());
    }

    #[test]
    fn failed_incoming_aborts_and_keeps_outgoing() {
        let clock = ManualClock::new();
        let (mut pair, _, b) = decks(&clock);
        b.fail_url("https://cdn.test/bad.mp3");
        let mut xf = CrossfadeEngine::new(plain_config(4.0));

        let err = xf.crossfade_to(&mut pair, DeckId::A, "https://cdn.test/bad.mp3", clock.now());
        assert!(matches!(err, Err(RadioError::SourceLoadFailure { .. })));
        assert!(!xf.is_crossfading());
        assert!(pair[DeckId::A].is_playing());
        assert_eq!(pair[DeckId::A].gain(), 1.0);
    }

    #[test]
    fn zero_duration_completes_on_next_tick() {
        let clock = ManualClock::new();
        let (mut pair, _, _) = decks(&clock);
        let mut xf = CrossfadeEngine::new(plain_config(0.0));
        xf.crossfade_to(&mut pair, DeckId::A, "https://cdn.test/two.mp3", clock.now()).unwrap();
        assert!(xf.tick(&mut pair, clock.now()).is_some());
    }

    #[test]
    fn cancel_restores_outgoing() {
        let clock = ManualClock::new();
        let (mut pair, _, _) = decks(&clock);
        let mut xf = CrossfadeEngine::new(plain_config(4.0));
        xf.crossfade_to(&mut pair, DeckId::A, "https://cdn.test/two.mp3", clock.now()).unwrap();
        clock.advance_secs(2.0);
        xf.tick(&mut pair, clock.now());
        assert!(xf.cancel(&mut pair));
        assert_eq!(pair[DeckId::A].gain(), 1.0);
        assert_eq!(pair[DeckId::B].gain(), 0.0);
        assert!(!pair[DeckId::B].is_playing());
    }
}
