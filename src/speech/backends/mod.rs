//! Concrete speech engines

// Native TTS backend using the tts crate (cross-platform)
pub mod native;

// espeak-ng command backend with its own playback queue
pub mod espeak;

pub use espeak::EspeakEngine;
pub use native::NativeEngine;
