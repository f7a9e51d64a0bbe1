//! Speech engine abstraction
//!
//! The controller talks to speech synthesis only through [`SynthEngine`].
//! Real backends bind it to a platform engine; tests bind it to a fake.

use super::utterance::{OutputTarget, Utterance};
use crate::{Result, SpeakError};
use log::debug;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// Default engine buffer sizing hint, in milliseconds
pub const DEFAULT_BUFFER_LENGTH: u32 = 500;

/// Parameters handed to [`SynthEngine::initialize`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitParams {
    pub output: OutputTarget,

    /// Internal buffer sizing hint in milliseconds
    pub buffer_length: u32,

    /// Directory holding voice data, `None` for the engine default
    pub data_path: Option<PathBuf>,

    /// Engine specific option bits
    pub options: u32,
}

impl Default for InitParams {
    fn default() -> Self {
        Self {
            output: OutputTarget::Playback,
            buffer_length: DEFAULT_BUFFER_LENGTH,
            data_path: None,
            options: 0,
        }
    }
}

/// A speech synthesis engine
///
/// Every method reports the engine's own outcome. Callers forward these
/// results unchanged.
pub trait SynthEngine: Send {
    /// Short backend name for logging
    fn name(&self) -> &str;

    /// Start the engine. Called once, before anything else.
    fn initialize(&mut self, params: &InitParams) -> Result<()>;

    /// Select the voice used by the next synthesis
    fn select_voice(&mut self, name: &str) -> Result<()>;

    /// Queue an utterance for playback
    ///
    /// Returns once the engine has accepted it, not when it has been spoken.
    fn synthesize(&mut self, utterance: &Utterance) -> Result<()>;

    /// Block until everything queued so far has finished playing
    fn wait_until_idle(&mut self) -> Result<()>;

    /// Release the engine
    fn terminate(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<E: SynthEngine + ?Sized> SynthEngine for Box<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn initialize(&mut self, params: &InitParams) -> Result<()> {
        (**self).initialize(params)
    }

    fn select_voice(&mut self, name: &str) -> Result<()> {
        (**self).select_voice(name)
    }

    fn synthesize(&mut self, utterance: &Utterance) -> Result<()> {
        (**self).synthesize(utterance)
    }

    fn wait_until_idle(&mut self) -> Result<()> {
        (**self).wait_until_idle()
    }

    fn terminate(&mut self) -> Result<()> {
        (**self).terminate()
    }
}

/// Set while some backend owns the process audio engine
static ENGINE_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Exclusive claim on the process-wide speech engine
///
/// Real backends take one in `initialize` and hold it until they are
/// terminated or dropped, so only one controller can drive the engine.
#[derive(Debug)]
pub struct EngineClaim {
    _private: (),
}

impl EngineClaim {
    /// Take the claim, failing if another backend holds it
    pub fn acquire() -> Result<Self> {
        if ENGINE_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SpeakError::EngineInUse);
        }
        debug!("Speech engine claimed");
        Ok(Self { _private: () })
    }

    /// Whether any backend currently holds the claim
    pub fn is_held() -> bool {
        ENGINE_CLAIMED.load(Ordering::Acquire)
    }
}

impl Drop for EngineClaim {
    fn drop(&mut self) {
        debug!("Speech engine released");
        ENGINE_CLAIMED.store(false, Ordering::Release);
    }
}
