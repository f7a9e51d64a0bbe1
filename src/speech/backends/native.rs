//! Native TTS backend using the tts crate
//!
//! This backend uses the `tts` crate which provides a unified interface to:
//! - Speech Dispatcher on Linux (via native bindings)
//! - AVFoundation on macOS/iOS (via native bindings)
//! - SAPI / WinRT on Windows
//!
//! Where the platform reports utterance callbacks, `wait_until_idle` waits
//! for every submitted utterance to end. Otherwise it polls `is_speaking()`.

use crate::speech::engine::{EngineClaim, InitParams, SynthEngine};
use crate::speech::utterance::{Utterance, DEFAULT_VOICE};
use crate::{Result, SpeakError};
use log::{debug, error, warn};
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tts::{Tts as TtsCrate, UtteranceId, Voice};

/// How often `wait_until_idle` asks the platform whether it is still speaking
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long a poll-based wait gives freshly queued speech to start
const SPEECH_START_TIMEOUT: Duration = Duration::from_secs(1);

/// Utterances submitted but not yet reported finished by the platform
struct CompletionTracker<K> {
    state: Mutex<TrackerState<K>>,
    done: Condvar,
}

struct TrackerState<K> {
    outstanding: HashSet<K>,

    /// End callbacks that arrived before `speak` returned the id
    finished_early: HashSet<K>,
}

impl<K: Eq + Hash> CompletionTracker<K> {
    fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                outstanding: HashSet::new(),
                finished_early: HashSet::new(),
            }),
            done: Condvar::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState<K>> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// `speak` accepted an utterance under `id`
    fn started(&self, id: K) {
        let mut state = self.lock();
        if !state.finished_early.remove(&id) {
            state.outstanding.insert(id);
        }
    }

    /// The platform reported `id` as ended or stopped
    fn finished(&self, id: K) {
        let mut state = self.lock();
        if state.outstanding.remove(&id) {
            if state.outstanding.is_empty() {
                self.done.notify_all();
            }
        } else {
            state.finished_early.insert(id);
        }
    }

    /// Block until nothing is outstanding
    fn wait_all(&self) {
        let state = self.lock();
        let _state = match self.done.wait_while(state, |s| !s.outstanding.is_empty()) {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
    }
}

/// The platform's own voice, so that "default" can be selected again
struct VoiceMemory<V> {
    platform_default: Option<V>,

    /// A non-default voice has been set since the last restore
    changed: bool,
}

impl<V> VoiceMemory<V> {
    fn new(platform_default: Option<V>) -> Self {
        Self {
            platform_default,
            changed: false,
        }
    }

    /// Voice to set for "default", `Ok(None)` when already in place
    fn default_to_restore(&self) -> std::result::Result<Option<&V>, &'static str> {
        if !self.changed {
            return Ok(None);
        }
        self.platform_default
            .as_ref()
            .map(Some)
            .ok_or("platform cannot report its default voice")
    }
}

/// Native TTS backend using the tts crate
pub struct NativeEngine {
    /// The tts crate's TTS instance, present once initialized
    tts: Option<TtsCrate>,

    /// Held for as long as `tts` is alive
    claim: Option<EngineClaim>,

    voices: VoiceMemory<Voice>,

    completions: Arc<CompletionTracker<UtteranceId>>,

    /// Utterance end callbacks are registered with the platform
    use_callbacks: bool,

    /// Something was queued that the callbacks cannot account for
    needs_polling: bool,

    /// Something was queued since the last wait
    submitted: bool,
}

impl NativeEngine {
    /// Create an uninitialized native backend
    pub fn new() -> Self {
        Self {
            tts: None,
            claim: None,
            voices: VoiceMemory::new(None),
            completions: Arc::new(CompletionTracker::new()),
            use_callbacks: false,
            needs_polling: false,
            submitted: false,
        }
    }

    fn tts(&mut self) -> Result<&mut TtsCrate> {
        self.tts
            .as_mut()
            .ok_or_else(|| SpeakError::Init("native TTS engine not initialized".to_string()))
    }

    /// Does a platform voice answer to `wanted`?
    ///
    /// Matches the voice id, its display name or its language tag,
    /// ignoring case.
    fn voice_matches(wanted: &str, id: &str, name: &str, language: &str) -> bool {
        [id, name, language]
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(wanted))
    }

    /// Hook utterance end and stop callbacks up to the completion tracker
    fn register_callbacks(&self, tts: &TtsCrate) -> bool {
        let tracker = Arc::clone(&self.completions);
        let on_end = tts.on_utterance_end(Some(Box::new(move |id: UtteranceId| {
            tracker.finished(id)
        })));
        let tracker = Arc::clone(&self.completions);
        let on_stop = tts.on_utterance_stop(Some(Box::new(move |id: UtteranceId| {
            tracker.finished(id)
        })));

        match on_end.and(on_stop) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to register utterance callbacks: {}", e);
                false
            }
        }
    }

    fn is_speaking(tts: &TtsCrate) -> Result<bool> {
        tts.is_speaking()
            .map_err(|e| SpeakError::Wait(format!("is_speaking failed: {}", e)))
    }

    /// Wait for `is_speaking` to go quiet
    ///
    /// With fresh submissions, speech is first given a bounded time to
    /// start, since the platform may report it late.
    fn poll_until_quiet(tts: &TtsCrate, expect_start: bool) -> Result<()> {
        if !tts.supported_features().is_speaking {
            warn!("Platform cannot report speaking state; not waiting");
            return Ok(());
        }

        if expect_start {
            let deadline = Instant::now() + SPEECH_START_TIMEOUT;
            while !Self::is_speaking(tts)? {
                if Instant::now() >= deadline {
                    debug!("Speech never started within {:?}", SPEECH_START_TIMEOUT);
                    return Ok(());
                }
                thread::sleep(IDLE_POLL_INTERVAL);
            }
        }

        while Self::is_speaking(tts)? {
            thread::sleep(IDLE_POLL_INTERVAL);
        }
        Ok(())
    }
}

impl Default for NativeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthEngine for NativeEngine {
    fn name(&self) -> &str {
        "native"
    }

    fn initialize(&mut self, params: &InitParams) -> Result<()> {
        debug!("Creating native TTS backend");
        if params.data_path.is_some() || params.options != 0 {
            debug!("Native backend ignores data path and option flags");
        }

        let claim = EngineClaim::acquire()?;
        let tts = TtsCrate::default()
            .map_err(|e| SpeakError::Init(format!("Failed to initialize TTS: {}", e)))?;

        let features = tts.supported_features();
        let platform_default = if features.get_voice {
            tts.voice().unwrap_or_else(|e| {
                warn!("Failed to read the platform voice: {}", e);
                None
            })
        } else {
            None
        };
        debug!("Platform default voice: {:?}", platform_default);

        self.use_callbacks = features.utterance_callbacks && self.register_callbacks(&tts);
        debug!(
            "Native TTS backend created successfully (callbacks: {})",
            self.use_callbacks
        );

        self.voices = VoiceMemory::new(platform_default);
        self.tts = Some(tts);
        self.claim = Some(claim);
        Ok(())
    }

    fn select_voice(&mut self, name: &str) -> Result<()> {
        self.tts()?;

        if name == DEFAULT_VOICE {
            let restore = match self.voices.default_to_restore() {
                Ok(None) => return Ok(()),
                Ok(Some(voice)) => voice.clone(),
                Err(reason) => {
                    return Err(SpeakError::Voice {
                        name: name.to_string(),
                        reason: reason.to_string(),
                    })
                }
            };

            debug!("Restoring platform voice: {:?}", restore);
            self.tts()?
                .set_voice(&restore)
                .map_err(|e| SpeakError::Voice {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;
            self.voices.changed = false;
            return Ok(());
        }

        let tts = self.tts()?;
        if !tts.supported_features().voice {
            return Err(SpeakError::Voice {
                name: name.to_string(),
                reason: "voice selection not supported on this platform".to_string(),
            });
        }

        let voices = tts.voices().map_err(|e| SpeakError::Voice {
            name: name.to_string(),
            reason: format!("failed to list voices: {}", e),
        })?;

        let voice = voices
            .iter()
            .find(|v| {
                Self::voice_matches(name, &v.id(), &v.name(), &v.language().to_string())
            })
            .ok_or_else(|| SpeakError::Voice {
                name: name.to_string(),
                reason: format!("no such voice among {} installed", voices.len()),
            })?;

        debug!("Selecting voice: {:?}", voice);
        tts.set_voice(voice).map_err(|e| SpeakError::Voice {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        self.voices.changed = true;
        Ok(())
    }

    fn synthesize(&mut self, utterance: &Utterance) -> Result<()> {
        let text = utterance.spoken_text().to_string();
        let tts = self.tts()?;

        if text.is_empty() {
            debug!("Nothing to speak");
            return Ok(());
        }

        debug!("Speaking: {}", text);
        let id = tts.speak(text, false).map_err(|e| {
            error!("Failed to speak: {}", e);
            SpeakError::Synthesis(format!("Speak failed: {}", e))
        })?;

        if let Some(token) = utterance.utterance_token {
            debug!("Utterance {:?} queued as {:?}", token, id);
        }

        self.submitted = true;
        match id {
            Some(id) if self.use_callbacks => self.completions.started(id),
            _ => self.needs_polling = true,
        }
        Ok(())
    }

    fn wait_until_idle(&mut self) -> Result<()> {
        self.tts()?;

        if self.use_callbacks {
            self.completions.wait_all();
        }

        if !self.use_callbacks || self.needs_polling {
            let expect_start = self.submitted;
            let tts = self.tts()?;
            Self::poll_until_quiet(tts, expect_start)?;
        }

        self.submitted = false;
        self.needs_polling = false;
        Ok(())
    }

    fn terminate(&mut self) -> Result<()> {
        debug!("Shutting down native TTS backend");
        self.tts = None;
        self.claim = None;
        self.use_callbacks = false;
        Ok(())
    }
}
