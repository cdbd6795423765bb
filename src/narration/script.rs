/// DJ script generation
///
/// Builds the short spoken link played over the start of the next track:
/// an optional station ident with a time-of-day greeting, an intro line
/// whose tone follows the track's energy, an optional genre flavour line and
/// a hint when the set reaches its peak or cooldown.
use chrono::{Local, Timelike};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    library::{Energy, Track},
    scheduler::EnergyPhase,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    pub station_name: String,
    /// Chance of adding a genre flavour line, 0.0–1.0.
    pub flavor_probability: f32,
    /// Station ident on every Nth transition; 0 disables it.
    pub station_id_every: u32,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            station_name: "Radio Engine FM".to_string(),
            flavor_probability: 0.35,
            station_id_every: 4,
        }
    }
}

impl ScriptConfig {
    pub fn normalized(mut self) -> Self {
        self.flavor_probability = self.flavor_probability.clamp(0.0, 1.0);
        if self.station_name.trim().is_empty() {
            self.station_name = Self::default().station_name;
        }
        self
    }
}

const ENERGETIC: &[&str] = &[
    "Turn it up! Here's {title} by {artist}.",
    "No slowing down now, this is {artist} with {title}.",
    "Let's go! {title} from {artist}, right now.",
];

const NEUTRAL: &[&str] = &[
    "Up next, {title} by {artist}.",
    "Here's {artist} with {title}.",
    "Keeping it rolling with {title} from {artist}.",
];

const MELLOW: &[&str] = &[
    "Take a breath and settle in. This is {title} by {artist}.",
    "Something gentle now, {artist} with {title}.",
    "Easy does it. Here's {title} from {artist}.",
];

/// Flavour lines keyed by a fragment of the genre key or name.
const FLAVORS: &[(&str, &[&str])] = &[
    ("lofi", &["Perfect for studying, or just zoning out.", "Dusty beats and warm tape hiss."]),
    ("lo-fi", &["Perfect for studying, or just zoning out.", "Dusty beats and warm tape hiss."]),
    ("jazz", &["A little swing for your day.", "Smooth changes, late-night club feeling."]),
    ("house", &["Four on the floor, hands in the air.", "Keep that groove locked."]),
    ("techno", &["Deep in the machine room now.", "Pure pulse, no brakes."]),
    ("ambient", &["Let the room drift for a while.", "Wide open spaces ahead."]),
    ("hip", &["Heads nodding, let's get it.", "Straight from the crates."]),
    ("rock", &["Guitars up front, where they belong.", "Crank the amps."]),
    ("classical", &["A timeless one for you.", "Strings and silence, beautifully balanced."]),
];

const GENERIC_FLAVOR: &str = "More {genre}, coming right up.";

pub fn greeting(hour: u32) -> &'static str {
    match hour {
        5..=11 => "Good morning",
        12..=16 => "Good afternoon",
        17..=21 => "Good evening",
        _ => "Hey night owls",
    }
}

pub struct ScriptGenerator {
    config: ScriptConfig,
    rng: StdRng,
    transitions: u32,
}

impl ScriptGenerator {
    pub fn new(config: ScriptConfig) -> Self {
        Self { config: config.normalized(), rng: StdRng::from_entropy(), transitions: 0 }
    }

    pub fn with_seed(config: ScriptConfig, seed: u64) -> Self {
        Self { config: config.normalized(), rng: StdRng::seed_from_u64(seed), transitions: 0 }
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    /// Number of scripts generated so far.
    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    /// Script for `next`, greeting by the local wall-clock hour.
    pub fn generate_now(&mut self, next: &Track, phase: EnergyPhase) -> String {
        self.generate(next, phase, Local::now().hour())
    }

    pub fn generate(&mut self, next: &Track, phase: EnergyPhase, hour: u32) -> String {
        self.transitions += 1;
        let mut parts: Vec<String> = Vec::with_capacity(4);

        let every = self.config.station_id_every;
        if every > 0 && self.transitions % every == 0 {
            parts.push(format!(
                "{}, you're tuned in to {}.",
                greeting(hour),
                self.config.station_name
            ));
        }

        let templates = match next.energy {
            Energy::High => ENERGETIC,
            Energy::Mid => NEUTRAL,
            Energy::Low => MELLOW,
        };
        let intro = templates.choose(&mut self.rng).copied().unwrap_or(NEUTRAL[0]);
        parts.push(fill(intro, next));

        if self.rng.gen::<f32>() < self.config.flavor_probability {
            parts.push(self.flavor(next));
        }

        match phase {
            EnergyPhase::Peak => parts.push("We're hitting the peak of the set.".to_string()),
            EnergyPhase::Cooldown => parts.push("Time to bring it back down.".to_string()),
            EnergyPhase::Build | EnergyPhase::Release => {}
        }

        parts.join(" ")
    }

    fn flavor(&mut self, track: &Track) -> String {
        let key = track.genre_key.to_ascii_lowercase();
        let name = track.genre.name.to_ascii_lowercase();
        let lines = FLAVORS
            .iter()
            .find(|(frag, _)| key.contains(frag) || name.contains(frag))
            .map(|(_, lines)| *lines);

        match lines.and_then(|l| l.choose(&mut self.rng)) {
            Some(line) => line.to_string(),
            None => fill(GENERIC_FLAVOR, track),
        }
    }
}

fn fill(template: &str, track: &Track) -> String {
    let artist: &str = if track.artist.trim().is_empty() { "an unknown artist" } else { &track.artist };
    let genre: &str = if track.genre.name.is_empty() { &track.genre_key } else { &track.genre.name };
    template
        .replace("{title}", &track.title)
        .replace("{artist}", artist)
        .replace("{genre}", genre)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::GenreMeta;

    fn track(energy: Energy, genre: &str) -> Track {
        Track {
            title: "Night Drive".into(),
            artist: "Kavi".into(),
            url: "https://cdn.test/nd.mp3".into(),
            duration_hint: None,
            genre_key: genre.into(),
            energy,
            bpm: 120,
            genre: GenreMeta { name: genre.to_uppercase(), ..Default::default() },
        }
    }

    fn generator(flavor: f32, every: u32) -> ScriptGenerator {
        ScriptGenerator::with_seed(
            ScriptConfig { flavor_probability: flavor, station_id_every: every, ..Default::default() },
            42,
        )
    }

    #[test]
    fn tone_follows_energy() {
        let mut g = generator(0.0, 0);
        let high = g.generate(&track(Energy::High, "house"), EnergyPhase::Build, 10);
        assert!(ENERGETIC.iter().any(|t| high == fill(t, &track(Energy::High, "house"))), "{high}");
        let low = g.generate(&track(Energy::Low, "house"), EnergyPhase::Build, 10);
        assert!(MELLOW.iter().any(|t| low == fill(t, &track(Energy::Low, "house"))), "{low}");
    }

    #[test]
    fn station_id_every_fourth_transition() {
        let mut g = generator(0.0, 4);
        let t = track(Energy::Mid, "jazz");
        let idents: Vec<bool> = (0..8)
            .map(|_| g.generate(&t, EnergyPhase::Build, 20).contains("you're tuned in to"))
            .collect();
        assert_eq!(idents, vec![false, false, false, true, false, false, false, true]);
        assert_eq!(g.transitions(), 8);
    }

    #[test]
    fn greeting_uses_hour() {
        let mut g = generator(0.0, 1);
        let t = track(Energy::Mid, "jazz");
        assert!(g.generate(&t, EnergyPhase::Build, 8).starts_with("Good morning"));
        assert!(g.generate(&t, EnergyPhase::Build, 19).starts_with("Good evening"));
        assert!(g.generate(&t, EnergyPhase::Build, 2).starts_with("Hey night owls"));
    }

    #[test]
    fn flavor_probability_bounds() {
        let t = track(Energy::Mid, "jazz");
        let mut never = generator(0.0, 0);
        let mut always = generator(1.0, 0);
        for _ in 0..20 {
            let s = never.generate(&t, EnergyPhase::Build, 12);
            assert!(!FLAVORS[2].1.iter().any(|f| s.contains(f)));
            let s = always.generate(&t, EnergyPhase::Build, 12);
            assert!(FLAVORS[2].1.iter().any(|f| s.contains(f)), "{s}");
        }
    }

    #[test]
    fn unknown_genre_gets_generic_flavor() {
        let mut g = generator(1.0, 0);
        let s = g.generate(&track(Energy::Mid, "polka"), EnergyPhase::Build, 12);
        assert!(s.contains("More POLKA, coming right up."), "{s}");
    }

    #[test]
    fn peak_phase_adds_hint() {
        let mut g = generator(0.0, 0);
        let s = g.generate(&track(Energy::High, "techno"), EnergyPhase::Peak, 23);
        assert!(s.ends_with("We're hitting the peak of the set."));
    }
}
