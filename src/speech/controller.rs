//! Speech controller
//!
//! Holds one [`Utterance`] and forwards it to a [`SynthEngine`]. The
//! controller adds no behavior of its own: every engine result, success or
//! failure, is handed back to the caller as-is.

use super::engine::{InitParams, SynthEngine};
use super::utterance::{CharsetMode, PositionType, UserData, Utterance, UtteranceToken};
use crate::Result;
use log::{debug, info};

/// Drives a speech engine with a single utterance configuration
///
/// Only one controller should exist per process. Real backends enforce this
/// through [`EngineClaim`](super::engine::EngineClaim).
pub struct SpeechController<E: SynthEngine> {
    engine: E,
    utterance: Utterance,
}

impl<E: SynthEngine> SpeechController<E> {
    /// Initialize `engine` for live playback and wrap it
    ///
    /// Fails if the engine cannot start; the engine is dropped in that case.
    pub fn new(engine: E) -> Result<Self> {
        Self::with_params(engine, InitParams::default())
    }

    /// Like [`new`](Self::new) with explicit initialization parameters
    pub fn with_params(mut engine: E, params: InitParams) -> Result<Self> {
        debug!("Initializing {} engine with {:?}", engine.name(), params);
        engine.initialize(&params)?;
        info!("Speech engine '{}' ready", engine.name());

        Ok(Self {
            engine,
            utterance: Utterance::new(),
        })
    }

    pub fn text(&self) -> &str {
        self.utterance.text()
    }

    /// Replace the text to speak; the size follows it
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.utterance.set_text(text);
    }

    pub fn voice(&self) -> &str {
        &self.utterance.voice
    }

    /// Set the voice name used by the next `play_audio`
    ///
    /// The name is not checked here. Unknown voices fail at synthesis time.
    pub fn set_voice(&mut self, voice: impl Into<String>) {
        self.utterance.voice = voice.into();
    }

    pub fn size(&self) -> usize {
        self.utterance.size()
    }

    pub fn set_size(&mut self, size: usize) {
        self.utterance.set_size(size);
    }

    pub fn synced(&self) -> bool {
        self.utterance.synchronous
    }

    pub fn set_synced(&mut self, synced: bool) {
        self.utterance.synchronous = synced;
    }

    pub fn position(&self) -> usize {
        self.utterance.start_position
    }

    pub fn position_type(&self) -> PositionType {
        self.utterance.position_type
    }

    pub fn flags(&self) -> CharsetMode {
        self.utterance.charset_mode
    }

    pub fn end_position(&self) -> usize {
        self.utterance.end_position
    }

    pub fn user_data(&self) -> Option<&UserData> {
        self.utterance.user_data.as_ref()
    }

    pub fn utterance_token(&self) -> Option<UtteranceToken> {
        self.utterance.utterance_token
    }

    /// The full configuration that the next `play_audio` will submit
    pub fn utterance(&self) -> &Utterance {
        &self.utterance
    }

    /// Change the pass-through fields of the configuration
    ///
    /// ```no_run
    /// # fn demo<E: speakctl::SynthEngine>(ctl: &mut speakctl::SpeechController<E>) {
    /// use speakctl::speech::UtteranceToken;
    /// ctl.configure(|u| u.utterance_token = Some(UtteranceToken(7)));
    /// # }
    /// ```
    pub fn configure<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Utterance),
    {
        f(&mut self.utterance);
    }

    /// Select the voice and queue the text without waiting for playback
    pub fn submit(&mut self) -> Result<()> {
        debug!("Selecting voice '{}'", self.utterance.voice);
        self.engine.select_voice(&self.utterance.voice)?;

        debug!(
            "Submitting {} bytes (size {}) to {}",
            self.utterance.text().len(),
            self.utterance.size(),
            self.engine.name()
        );
        self.engine.synthesize(&self.utterance)
    }

    /// Block until the engine has played everything queued so far
    pub fn wait(&mut self) -> Result<()> {
        debug!("Waiting for {} to finish speaking", self.engine.name());
        self.engine.wait_until_idle()
    }

    /// Speak the current text
    ///
    /// When synced, returns only after playback has finished. Otherwise
    /// returns as soon as the engine accepts the text.
    pub fn play_audio(&mut self) -> Result<()> {
        self.submit()?;
        if self.utterance.synchronous {
            self.wait()?;
        }
        Ok(())
    }

    /// Borrow the engine
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Shut the engine down and hand it back
    pub fn into_engine(mut self) -> Result<E> {
        debug!("Terminating {} engine", self.engine.name());
        self.engine.terminate()?;
        Ok(self.engine)
    }
}
