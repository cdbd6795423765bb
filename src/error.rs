use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the radio engine.
///
/// Playback-path failures are normally recovered inside the engine and only
/// reported through [`EngineEvent::Error`](crate::events::EngineEvent::Error);
/// `NoSourceAvailable` is the one variant a control call hands back.
#[derive(Debug, Error)]
pub enum RadioError {
    /// The processing graph could not be created. The engine keeps running
    /// with direct per-deck volume control and no spectrum data.
    #[error("audio graph unavailable: {0}")]
    AudioGraphUnavailable(String),

    #[error("source failed to play ({url}): {reason}")]
    SourceLoadFailure { url: String, reason: String },

    #[error("no track or stream is available")]
    NoSourceAvailable,

    /// Never crosses the narration boundary; kept for logging.
    #[error("narration failed: {0}")]
    NarrationFailure(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RadioError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RadioError::AudioGraphUnavailable(_) => ErrorKind::AudioGraphUnavailable,
            RadioError::SourceLoadFailure { .. } => ErrorKind::SourceLoadFailure,
            RadioError::NoSourceAvailable => ErrorKind::NoSourceAvailable,
            RadioError::NarrationFailure(_) => ErrorKind::NarrationFailure,
            RadioError::Config(_) | RadioError::Json(_) | RadioError::Io(_) => ErrorKind::Config,
        }
    }
}

/// Serializable error category carried by error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AudioGraphUnavailable,
    SourceLoadFailure,
    NoSourceAvailable,
    NarrationFailure,
    Config,
}

pub type Result<T, E = RadioError> = std::result::Result<T, E>;
