//! espeak-ng backend
//!
//! Runs the `espeak-ng` command once per utterance. Utterances are queued
//! on a channel and played one after another by a worker thread, so
//! `synthesize` returns as soon as the text is queued.
//!
//! Dependencies:
//! - espeak-ng (install with: sudo apt install espeak-ng)

use crate::speech::engine::{EngineClaim, InitParams, SynthEngine};
use crate::speech::utterance::{CharsetMode, Utterance, DEFAULT_VOICE};
use crate::{Result, SpeakError};
use log::{debug, error, info, warn};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

/// One queued espeak-ng invocation
struct Job {
    args: Vec<String>,
    text: String,
}

/// State shared between the engine and its worker thread
#[derive(Default)]
struct Queue {
    /// Jobs queued or playing, plus failures not yet reported
    state: Mutex<QueueState>,
    idle: Condvar,
    shutting_down: AtomicBool,
}

#[derive(Default)]
struct QueueState {
    pending: usize,
    failures: Vec<String>,
}

/// espeak-ng backend
pub struct EspeakEngine {
    /// Path to espeak-ng, found during initialize
    espeak_path: Option<String>,

    /// Voice passed with `-v`
    voice: String,

    /// Voice names reported by `espeak-ng --voices`, empty if unknown
    known_voices: Vec<String>,

    /// Voice data directory passed with `--path`
    data_path: Option<PathBuf>,

    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    queue: Arc<Queue>,
    claim: Option<EngineClaim>,
}

impl EspeakEngine {
    /// Create an uninitialized espeak-ng backend
    pub fn new() -> Self {
        Self {
            espeak_path: None,
            voice: DEFAULT_VOICE.to_string(),
            known_voices: Vec::new(),
            data_path: None,
            sender: None,
            worker: None,
            queue: Arc::new(Queue::default()),
            claim: None,
        }
    }

    /// Find espeak-ng executable
    ///
    /// `ESPEAK_BIN` wins over the usual locations.
    fn find_espeak() -> Result<String> {
        let mut paths = vec!["espeak-ng".to_string(), "/usr/bin/espeak-ng".to_string()];
        if let Ok(bin) = std::env::var("ESPEAK_BIN") {
            paths.insert(0, bin);
        }

        for path in paths {
            if let Ok(status) = Command::new(&path)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
            {
                if status.success() {
                    return Ok(path);
                }
            }
        }

        Err(SpeakError::Init(
            "espeak-ng not found. Install with: sudo apt install espeak-ng".to_string(),
        ))
    }

    /// Ask espeak-ng which voices it has
    fn list_voices(espeak_path: &str, data_path: Option<&PathBuf>) -> Vec<String> {
        let mut cmd = Command::new(espeak_path);
        if let Some(path) = data_path {
            cmd.arg(format!("--path={}", path.display()));
        }
        match cmd.arg("--voices").stderr(Stdio::null()).output() {
            Ok(output) if output.status.success() => {
                Self::parse_voice_list(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => {
                warn!("espeak-ng --voices exited with {}", output.status);
                Vec::new()
            }
            Err(e) => {
                warn!("Failed to list espeak-ng voices: {}", e);
                Vec::new()
            }
        }
    }

    /// Parse `espeak-ng --voices` output into every name a voice answers to
    ///
    /// Columns are: Pty Language Age/Gender VoiceName File Other Languages.
    fn parse_voice_list(listing: &str) -> Vec<String> {
        let mut names = Vec::new();
        for line in listing.lines().skip(1) {
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() < 5 {
                continue;
            }
            names.push(columns[1].to_lowercase());
            names.push(columns[3].to_lowercase());
            names.push(columns[4].to_lowercase());
        }
        names
    }

    /// Check a voice name against the installed voices
    ///
    /// Variants (`en+f3`) are checked by their base voice. With no voice
    /// list available every name is let through to espeak-ng itself.
    fn is_known_voice(known: &[String], name: &str) -> bool {
        if name == DEFAULT_VOICE || known.is_empty() {
            return true;
        }
        let base = name.split('+').next().unwrap_or(name).to_lowercase();
        known.iter().any(|v| *v == base)
    }

    /// `-b` value for a charset mode, `None` to let espeak-ng detect it
    fn charset_arg(mode: CharsetMode) -> Option<&'static str> {
        match mode {
            CharsetMode::Auto => None,
            CharsetMode::Utf8 => Some("1"),
            CharsetMode::EightBit => Some("2"),
            CharsetMode::WideChar => Some("4"),
        }
    }

    /// Command line arguments for one utterance
    fn build_args(&self, utterance: &Utterance) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(path) = &self.data_path {
            args.push(format!("--path={}", path.display()));
        }
        args.push("-v".to_string());
        args.push(self.voice.clone());
        if let Some(b) = Self::charset_arg(utterance.charset_mode) {
            args.push("-b".to_string());
            args.push(b.to_string());
        }
        args.push("--stdin".to_string());
        args
    }

    /// Play queued jobs until the channel closes
    fn run_worker(espeak_path: String, jobs: mpsc::Receiver<Job>, queue: Arc<Queue>) {
        for job in jobs {
            let outcome = if queue.shutting_down.load(Ordering::Acquire) {
                debug!("Dropping queued utterance during shutdown");
                Ok(())
            } else {
                Self::play(&espeak_path, &job)
            };

            let mut state = match queue.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Err(e) = outcome {
                error!("espeak-ng playback failed: {}", e);
                state.failures.push(e);
            }
            state.pending -= 1;
            if state.pending == 0 {
                queue.idle.notify_all();
            }
        }
        debug!("espeak-ng worker exiting");
    }

    /// Run espeak-ng for one job and wait for it to finish
    fn play(espeak_path: &str, job: &Job) -> std::result::Result<(), String> {
        let mut child = Command::new(espeak_path)
            .args(&job.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("Failed to start espeak-ng: {}", e))?;

        // stdin drops after the write so espeak-ng sees EOF
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(job.text.as_bytes()),
            None => Ok(()),
        };

        if let Err(e) = written {
            // The child has to be reaped even though it never got the text
            if let Err(kill_err) = child.kill() {
                debug!("Failed to kill espeak-ng process: {}", kill_err);
            }
            if let Err(wait_err) = child.wait() {
                debug!("Failed to reap espeak-ng process: {}", wait_err);
            }
            return Err(format!("Failed to write text to espeak-ng: {}", e));
        }

        let status = child
            .wait()
            .map_err(|e| format!("Failed to wait for espeak-ng: {}", e))?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("espeak-ng exited with {}", status))
        }
    }

    /// Stop accepting work and join the worker
    ///
    /// The utterance currently playing finishes; anything still queued is
    /// dropped.
    fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            debug!("Shutting down espeak-ng backend");
            self.queue.shutting_down.store(true, Ordering::Release);
            self.sender = None;
            if worker.join().is_err() {
                error!("espeak-ng worker panicked");
            }
        }
        self.claim = None;
    }
}

impl Default for EspeakEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthEngine for EspeakEngine {
    fn name(&self) -> &str {
        "espeak-ng"
    }

    fn initialize(&mut self, params: &InitParams) -> Result<()> {
        debug!("Creating espeak-ng backend");
        let claim = EngineClaim::acquire()?;

        let espeak_path = Self::find_espeak()?;
        debug!("Found espeak-ng at: {}", espeak_path);

        if params.options != 0 {
            debug!("espeak-ng backend ignores option flags {:#x}", params.options);
        }
        self.data_path = params.data_path.clone();
        self.known_voices = Self::list_voices(&espeak_path, self.data_path.as_ref());
        info!("espeak-ng reports {} voice names", self.known_voices.len());

        self.queue.shutting_down.store(false, Ordering::Release);
        let (sender, receiver) = mpsc::channel();
        let queue = Arc::clone(&self.queue);
        let worker_path = espeak_path.clone();
        let worker = thread::Builder::new()
            .name("espeak-worker".to_string())
            .spawn(move || Self::run_worker(worker_path, receiver, queue))
            .map_err(|e| SpeakError::Init(format!("Failed to start espeak-ng worker: {}", e)))?;

        self.espeak_path = Some(espeak_path);
        self.sender = Some(sender);
        self.worker = Some(worker);
        self.claim = Some(claim);
        Ok(())
    }

    fn select_voice(&mut self, name: &str) -> Result<()> {
        if self.espeak_path.is_none() {
            return Err(SpeakError::Init("espeak-ng engine not initialized".to_string()));
        }
        if !Self::is_known_voice(&self.known_voices, name) {
            return Err(SpeakError::Voice {
                name: name.to_string(),
                reason: "espeak-ng has no such voice".to_string(),
            });
        }

        debug!("Setting voice to {}", name);
        self.voice = name.to_string();
        Ok(())
    }

    fn synthesize(&mut self, utterance: &Utterance) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| SpeakError::Init("espeak-ng engine not initialized".to_string()))?;

        let text = utterance.spoken_text();
        if text.is_empty() {
            debug!("Nothing to speak");
            return Ok(());
        }

        let job = Job {
            args: self.build_args(utterance),
            text: text.to_string(),
        };

        {
            let mut state = self
                .queue
                .state
                .lock()
                .map_err(|_| SpeakError::Synthesis("espeak-ng queue poisoned".to_string()))?;
            state.pending += 1;
        }

        if sender.send(job).is_err() {
            let mut state = match self.queue.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            state.pending -= 1;
            return Err(SpeakError::Synthesis(
                "espeak-ng worker is not running".to_string(),
            ));
        }

        match utterance.utterance_token {
            Some(token) => debug!("Queued utterance {:?}: {}", token, text),
            None => debug!("Queued: {}", text),
        }
        Ok(())
    }

    fn wait_until_idle(&mut self) -> Result<()> {
        let state = self
            .queue
            .state
            .lock()
            .map_err(|_| SpeakError::Wait("espeak-ng queue poisoned".to_string()))?;
        let mut state = self
            .queue
            .idle
            .wait_while(state, |s| s.pending > 0)
            .map_err(|_| SpeakError::Wait("espeak-ng queue poisoned".to_string()))?;

        if state.failures.is_empty() {
            Ok(())
        } else {
            let failures = std::mem::take(&mut state.failures);
            Err(SpeakError::Wait(failures.join("; ")))
        }
    }

    fn terminate(&mut self) -> Result<()> {
        self.shutdown();
        Ok(())
    }
}

impl Drop for EspeakEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
