//! Error types for speakctl

use std::io;
use thiserror::Error;

/// Main error type for speakctl
///
/// The controller itself never creates these; they are produced by the
/// engine bindings and the settings loader and passed through untouched.
#[derive(Error, Debug)]
pub enum SpeakError {
    #[error("Engine initialization failed: {0}")]
    Init(String),

    #[error("Speech engine is already claimed by another controller")]
    EngineInUse,

    #[error("Voice '{name}' rejected: {reason}")]
    Voice { name: String, reason: String },

    #[error("Speech synthesis error: {0}")]
    Synthesis(String),

    #[error("Waiting for speech to finish failed: {0}")]
    Wait(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("INI parse error: {0}")]
    IniParse(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for speakctl operations
pub type Result<T> = std::result::Result<T, SpeakError>;

impl From<String> for SpeakError {
    fn from(s: String) -> Self {
        SpeakError::Other(s)
    }
}

impl From<&str> for SpeakError {
    fn from(s: &str) -> Self {
        SpeakError::Other(s.to_string())
    }
}
