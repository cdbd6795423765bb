pub mod analyzer;
pub mod chain;
pub mod crossfade;
pub mod deck;
pub mod dsp;
pub mod media;
