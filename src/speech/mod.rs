//! Speech synthesis system

pub mod backends;
pub mod controller;
pub mod engine;
pub mod utterance;

pub use controller::SpeechController;
pub use engine::{EngineClaim, InitParams, SynthEngine};
pub use utterance::{
    CharsetMode, OutputTarget, PositionType, UserData, Utterance, UtteranceToken, DEFAULT_VOICE,
};

use crate::{Result, SpeakError};
use backends::{EspeakEngine, NativeEngine};
use log::info;
use std::fmt;
use std::str::FromStr;

/// Which engine a controller should be built around
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Native platform TTS, falling back to espeak-ng
    #[default]
    Auto,
    Native,
    Espeak,
}

impl FromStr for Backend {
    type Err = SpeakError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Backend::Auto),
            "native" => Ok(Backend::Native),
            "espeak" | "espeak-ng" => Ok(Backend::Espeak),
            other => Err(SpeakError::Config(format!("Unknown backend '{}'", other))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Backend::Auto => "auto",
            Backend::Native => "native",
            Backend::Espeak => "espeak",
        };
        f.write_str(name)
    }
}

/// Boxed controller whose engine is picked at runtime
pub type DynController = SpeechController<Box<dyn SynthEngine>>;

/// Build a controller around the requested backend
///
/// With [`Backend::Auto`]:
/// 1. Native platform TTS (Speech Dispatcher, AVFoundation, SAPI)
/// 2. espeak-ng command (fallback if the native engine cannot start)
pub fn create_controller(backend: Backend, params: InitParams) -> Result<DynController> {
    match backend {
        Backend::Native => SpeechController::with_params(boxed(NativeEngine::new()), params),
        Backend::Espeak => SpeechController::with_params(boxed(EspeakEngine::new()), params),
        Backend::Auto => {
            info!("Trying native TTS backend...");
            match SpeechController::with_params(boxed(NativeEngine::new()), params.clone()) {
                Ok(controller) => {
                    info!("Using native TTS backend");
                    return Ok(controller);
                }
                Err(SpeakError::EngineInUse) => return Err(SpeakError::EngineInUse),
                Err(e) => info!("Native TTS backend unavailable: {}", e),
            }

            info!("Trying espeak-ng backend...");
            SpeechController::with_params(boxed(EspeakEngine::new()), params).map_err(|e| {
                SpeakError::Init(format!(
                    "No speech backend available. Tried:\n\
                     1. Native TTS (install: sudo apt install speech-dispatcher)\n\
                     2. espeak-ng (install: sudo apt install espeak-ng)\n\
                     Error: {}",
                    e
                ))
            })
        }
    }
}

fn boxed<E: SynthEngine + 'static>(engine: E) -> Box<dyn SynthEngine> {
    Box::new(engine)
}
