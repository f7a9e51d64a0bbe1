//! speakctl - text to speech controller
//!
//! Holds the configuration of a single utterance, hands it to a speech
//! synthesis engine, and optionally blocks until the engine has finished
//! playing it.

pub mod config;
pub mod error;
pub mod speech;

pub use error::{Result, SpeakError};
pub use speech::{SpeechController, SynthEngine, Utterance};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "speakctl";
