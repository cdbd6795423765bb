/// Track library
///
/// Genre pools are registered once at startup by the host; the master library
/// is the concatenation of every pool's tracks in registration order.
use std::{fmt, path::Path, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::error::Result;

// ── Energy ────────────────────────────────────────────────────────────────────

/// Coarse energy tag used for queue bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "EnergyTag")]
pub enum Energy {
    Low,
    Mid,
    High,
}

impl Energy {
    /// Map a normalized 0.0–1.0 energy level onto a bucket.
    pub fn from_level(level: f32) -> Self {
        let level = level.clamp(0.0, 1.0);
        if level < 0.4 {
            Energy::Low
        } else if level < 0.7 {
            Energy::Mid
        } else {
            Energy::High
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Energy::Low => "low",
            Energy::Mid => "mid",
            Energy::High => "high",
        }
    }
}

/// Registration data may carry energy either as a name or as a number.
#[derive(Deserialize)]
#[serde(untagged)]
enum EnergyTag {
    Level(f32),
    Name(String),
}

impl From<EnergyTag> for Energy {
    fn from(tag: EnergyTag) -> Self {
        match tag {
            EnergyTag::Level(l) => Energy::from_level(l),
            EnergyTag::Name(n) => match n.trim().to_ascii_lowercase().as_str() {
                "low" => Energy::Low,
                "high" => Energy::High,
                _ => Energy::Mid,
            },
        }
    }
}

// ── Tracks and pools ──────────────────────────────────────────────────────────

/// Display metadata shared by every track of a genre pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenreMeta {
    pub name: String,
    pub color: String,
    pub icon: String,
    pub description: String,
    pub artwork: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub artist: String,
    pub url: String,
    /// Seconds; the deck's own duration wins once known.
    pub duration_hint: Option<f64>,
    pub genre_key: String,
    pub energy: Energy,
    pub bpm: u32,
    pub genre: GenreMeta,
}

/// Track as supplied in a registration call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackInput {
    pub title: String,
    #[serde(default)]
    pub artist: String,
    pub url: String,
    #[serde(default, alias = "duration")]
    pub duration_hint: Option<f64>,
    #[serde(default = "default_energy")]
    pub energy: Energy,
    #[serde(default = "default_bpm")]
    pub bpm: u32,
}

fn default_energy() -> Energy {
    Energy::Mid
}

fn default_bpm() -> u32 {
    120
}

/// Payload of a genre registration call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenreRegistration {
    #[serde(rename = "genre")]
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub tracks: Vec<TrackInput>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub artwork: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GenrePool {
    pub key: String,
    pub meta: GenreMeta,
    pub stream: Option<String>,
    pub tracks: Vec<Arc<Track>>,
}

impl GenrePool {
    fn from_registration(reg: GenreRegistration) -> Self {
        let meta = GenreMeta {
            name: reg.name,
            color: reg.color,
            icon: reg.icon,
            description: reg.description,
            artwork: reg.artwork,
        };
        let tracks = reg
            .tracks
            .into_iter()
            .filter(|t| !t.url.trim().is_empty())
            .map(|t| {
                Arc::new(Track {
                    title: t.title,
                    artist: t.artist,
                    url: t.url,
                    duration_hint: t.duration_hint.filter(|d| d.is_finite() && *d > 0.0),
                    genre_key: reg.key.clone(),
                    energy: t.energy,
                    bpm: t.bpm,
                    genre: meta.clone(),
                })
            })
            .collect();
        let stream = reg.stream.filter(|s| !s.trim().is_empty());

        Self { key: reg.key, meta, stream, tracks }
    }
}

// ── Filter ────────────────────────────────────────────────────────────────────

/// Which part of the library the queue is built from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Filter {
    All,
    Genre(String),
}

impl Filter {
    pub fn genre_key(&self) -> Option<&str> {
        match self {
            Filter::All => None,
            Filter::Genre(k) => Some(k),
        }
    }
}

impl From<&str> for Filter {
    fn from(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            Filter::All
        } else {
            Filter::Genre(s.to_string())
        }
    }
}

impl From<String> for Filter {
    fn from(s: String) -> Self {
        Filter::from(s.as_str())
    }
}

impl From<Filter> for String {
    fn from(f: Filter) -> Self {
        f.to_string()
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::All => write!(f, "all"),
            Filter::Genre(k) => write!(f, "{k}"),
        }
    }
}

// ── Library ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Library {
    pools: Vec<GenrePool>,
    master: Vec<Arc<Track>>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON array of registrations.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let regs: Vec<GenreRegistration> = serde_json::from_str(json)?;
        let mut lib = Self::new();
        for reg in regs {
            lib.register(reg);
        }
        Ok(lib)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Register (or re-register) a genre pool. A key that is already present
    /// is overwritten in place and keeps its position in the master order.
    pub fn register(&mut self, reg: GenreRegistration) -> &GenrePool {
        let pool = GenrePool::from_registration(reg);
        log::info!(
            "Registered genre '{}' ({} tracks, stream: {})",
            pool.key,
            pool.tracks.len(),
            pool.stream.is_some()
        );

        let idx = match self.pools.iter().position(|p| p.key == pool.key) {
            Some(i) => {
                self.pools[i] = pool;
                i
            }
            None => {
                self.pools.push(pool);
                self.pools.len() - 1
            }
        };
        self.master = self.pools.iter().flat_map(|p| p.tracks.iter().cloned()).collect();
        &self.pools[idx]
    }

    pub fn pools(&self) -> &[GenrePool] {
        &self.pools
    }

    pub fn pool(&self, key: &str) -> Option<&GenrePool> {
        self.pools.iter().find(|p| p.key == key)
    }

    pub fn first_key(&self) -> Option<&str> {
        self.pools.first().map(|p| p.key.as_str())
    }

    pub fn all_tracks(&self) -> &[Arc<Track>] {
        &self.master
    }

    pub fn is_empty(&self) -> bool {
        self.master.is_empty()
    }

    /// Candidate tracks for a filter, before any fallback.
    pub fn tracks_for(&self, filter: &Filter) -> Vec<Arc<Track>> {
        match filter {
            Filter::All => self.master.clone(),
            Filter::Genre(key) => self
                .master
                .iter()
                .filter(|t| &t.genre_key == key)
                .cloned()
                .collect(),
        }
    }

    /// Genre keys that have a live stream, in registration order.
    pub fn stream_keys(&self) -> Vec<&str> {
        self.pools
            .iter()
            .filter(|p| p.stream.is_some())
            .map(|p| p.key.as_str())
            .collect()
    }
}
