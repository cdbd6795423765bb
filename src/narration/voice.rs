//! Speech synthesis seam.
//!
//! The host owns the actual text-to-speech engine. The synthesizer picks a
//! voice, shapes each request and keeps backend failures from escaping.
use serde::{Deserialize, Serialize};

use crate::error::{RadioError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub name: String,
    /// BCP-47 tag, e.g. `en-GB`.
    pub lang: String,
    #[serde(default)]
    pub default: bool,
}

/// One utterance handed to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeechRequest {
    pub id: u64,
    pub text: String,
    pub voice: Option<String>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// Host text-to-speech engine. `speak` starts an utterance and returns;
/// start, end and failure are reported back as [`SpeechEvent`]s.
pub trait SpeechBackend {
    fn voices(&self) -> Vec<VoiceInfo>;
    fn speak(&mut self, request: &SpeechRequest) -> std::result::Result<(), String>;
    fn cancel(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpeechEvent {
    Started,
    Ended,
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Substring of a voice name to prefer, case-insensitive.
    pub preferred_voice: Option<String>,
    /// Language prefix used when no preferred voice matches.
    pub language: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self { preferred_voice: None, language: "en".to_string(), rate: 1.0, pitch: 1.0, volume: 1.0 }
    }
}

impl VoiceConfig {
    pub fn normalized(mut self) -> Self {
        self.rate = self.rate.clamp(0.1, 10.0);
        self.pitch = self.pitch.clamp(0.0, 2.0);
        self.volume = self.volume.clamp(0.0, 1.0);
        self
    }
}

/// Pick a voice: preferred name, then the language's default voice, then any
/// voice of the language, then the backend default, then the first one.
pub fn select_voice<'a>(voices: &'a [VoiceInfo], config: &VoiceConfig) -> Option<&'a VoiceInfo> {
    if let Some(pref) = config.preferred_voice.as_deref().map(str::to_ascii_lowercase) {
        if let Some(v) = voices.iter().find(|v| v.name.to_ascii_lowercase().contains(&pref)) {
            return Some(v);
        }
    }
    let lang = config.language.to_ascii_lowercase();
    let in_lang = |v: &&VoiceInfo| v.lang.to_ascii_lowercase().starts_with(&lang);
    voices
        .iter()
        .filter(in_lang)
        .find(|v| v.default)
        .or_else(|| voices.iter().find(in_lang))
        .or_else(|| voices.iter().find(|v| v.default))
        .or_else(|| voices.first())
}

pub struct VoiceSynthesizer {
    backend: Option<Box<dyn SpeechBackend>>,
    config: VoiceConfig,
    voice: Option<String>,
}

impl VoiceSynthesizer {
    pub fn new(config: VoiceConfig) -> Self {
        Self { backend: None, config: config.normalized(), voice: None }
    }

    pub fn with_backend(mut self, backend: Box<dyn SpeechBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn set_backend(&mut self, backend: Box<dyn SpeechBackend>) {
        self.backend = Some(backend);
        self.voice = None;
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn voice(&self) -> Option<&str> {
        self.voice.as_deref()
    }

    /// Start speaking `text`. Voices are resolved on first use since hosts
    /// often populate their voice list late.
    pub fn speak(&mut self, id: u64, text: &str) -> Result<()> {
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| RadioError::NarrationFailure("no speech backend".into()))?;

        if self.voice.is_none() {
            self.voice = select_voice(&backend.voices(), &self.config).map(|v| v.name.clone());
            if let Some(name) = &self.voice {
                log::info!("Narration voice: {name}");
            }
        }

        let request = SpeechRequest {
            id,
            text: text.to_string(),
            voice: self.voice.clone(),
            rate: self.config.rate,
            pitch: self.config.pitch,
            volume: self.config.volume,
        };
        backend.speak(&request).map_err(RadioError::NarrationFailure)
    }

    pub fn cancel(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            backend.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedSpeech;

    fn voice(name: &str, lang: &str, default: bool) -> VoiceInfo {
        VoiceInfo { name: name.into(), lang: lang.into(), default }
    }

    #[test]
    fn preferred_name_wins() {
        let voices = vec![voice("Alex", "en-US", true), voice("Daniel", "en-GB", false)];
        let cfg = VoiceConfig { preferred_voice: Some("daniel".into()), ..Default::default() };
        assert_eq!(select_voice(&voices, &cfg).unwrap().name, "Daniel");
    }

    #[test]
    fn falls_back_to_language_then_first() {
        let voices = vec![voice("Amelie", "fr-FR", true), voice("Karen", "en-AU", false)];
        let cfg = VoiceConfig::default();
        assert_eq!(select_voice(&voices, &cfg).unwrap().name, "Karen");

        let cfg = VoiceConfig { language: "de".into(), ..Default::default() };
        assert_eq!(select_voice(&voices, &cfg).unwrap().name, "Amelie");
        assert!(select_voice(&[], &cfg).is_none());
    }

    #[test]
    fn speak_shapes_request() {
        let speech = SimulatedSpeech::with_voices(vec![voice("Karen", "en-AU", false)]);
        let cfg = VoiceConfig { rate: 20.0, ..Default::default() };
        let mut synth = VoiceSynthesizer::new(cfg).with_backend(Box::new(speech.clone()));
        synth.speak(7, "hello").unwrap();

        let spoken = speech.spoken();
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0].id, 7);
        assert_eq!(spoken[0].voice.as_deref(), Some("Karen"));
        assert_eq!(spoken[0].rate, 10.0);
    }

    #[test]
    fn failures_are_narration_errors() {
        let mut synth = VoiceSynthesizer::new(VoiceConfig::default());
        assert!(matches!(synth.speak(1, "x"), Err(RadioError::NarrationFailure(_))));

        let speech = SimulatedSpeech::new();
        speech.set_failing(true);
        synth.set_backend(Box::new(speech));
        assert!(matches!(synth.speak(2, "x"), Err(RadioError::NarrationFailure(_))));
    }
}
