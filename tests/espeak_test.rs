//! espeak-ng backend tests against a stand-in espeak-ng script
//!
//! `ESPEAK_BIN` points the backend at a shell script that answers
//! `--version` and `--voices` like espeak-ng and logs every utterance.
//! The backend claims the process-wide engine, so tests take turns.

#![cfg(unix)]

use speakctl::speech::backends::EspeakEngine;
use speakctl::speech::SpeechController;
use speakctl::SpeakError;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tempfile::TempDir;

static ONE_ENGINE_AT_A_TIME: Mutex<()> = Mutex::new(());

fn take_turn() -> MutexGuard<'static, ()> {
    match ONE_ENGINE_AT_A_TIME.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A fake espeak-ng that runs `body` for each utterance
struct FakeEspeak {
    _dir: TempDir,
    log: PathBuf,
}

impl FakeEspeak {
    fn new(body: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("utterances.log");
        let script = dir.path().join("espeak-ng");

        let contents = format!(
            "#!/bin/sh\n\
             case \"$1\" in\n\
               --version) exit 0 ;;\n\
               --voices)\n\
                 echo 'Pty Language Age/Gender VoiceName File Other Languages'\n\
                 echo ' 5  en-gb  --/M  English_(Great_Britain)  gmw/en'\n\
                 exit 0 ;;\n\
             esac\n\
             LOG='{}'\n\
             {}\n",
            log.display(),
            body
        );
        fs::write(&script, contents).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        std::env::set_var("ESPEAK_BIN", &script);
        Self { _dir: dir, log }
    }

    /// Plays for `secs` seconds and records the arguments and text
    fn playing_for(secs: &str) -> Self {
        Self::new(&format!(
            "echo \"args: $*\" >> \"$LOG\"\ncat >> \"$LOG\"\necho >> \"$LOG\"\nsleep {}",
            secs
        ))
    }

    fn log(&self) -> String {
        fs::read_to_string(&self.log).unwrap_or_default()
    }

    fn utterances(&self) -> usize {
        self.log().lines().filter(|l| l.starts_with("args:")).count()
    }
}

fn controller() -> SpeechController<EspeakEngine> {
    SpeechController::new(EspeakEngine::new()).expect("fake espeak-ng starts")
}

#[test]
fn test_synced_play_waits_for_playback() {
    let _turn = take_turn();
    let fake = FakeEspeak::playing_for("0.3");
    let mut controller = controller();

    controller.set_text("hello");
    controller.set_synced(true);
    let start = Instant::now();
    controller.play_audio().expect("play");

    assert!(start.elapsed() >= Duration::from_millis(250));
    let log = fake.log();
    assert!(log.contains("args: -v default --stdin"), "log was {:?}", log);
    assert!(log.contains("hello"));
}

#[test]
fn test_async_play_returns_before_playback_ends() {
    let _turn = take_turn();
    let fake = FakeEspeak::playing_for("0.3");
    let mut controller = controller();

    controller.set_text("hello");
    controller.set_synced(false);
    let start = Instant::now();
    controller.play_audio().expect("play");
    assert!(start.elapsed() < Duration::from_millis(200));

    controller.wait().expect("wait");
    assert!(start.elapsed() >= Duration::from_millis(250));
    assert_eq!(fake.utterances(), 1);
}

#[test]
fn test_queued_utterances_play_in_order() {
    let _turn = take_turn();
    let fake = FakeEspeak::playing_for("0");
    let mut controller = controller();
    controller.set_synced(false);

    for text in ["first", "second", "third"] {
        controller.set_text(text);
        controller.play_audio().expect("play");
    }
    controller.wait().expect("wait");

    let log = fake.log();
    let first = log.find("first").unwrap();
    let second = log.find("second").unwrap();
    let third = log.find("third").unwrap();
    assert!(first < second && second < third);
}

#[test]
fn test_selected_voice_is_passed_along() {
    let _turn = take_turn();
    let fake = FakeEspeak::playing_for("0");
    let mut controller = controller();

    controller.set_voice("en-gb");
    controller.set_text("cheerio");
    controller.play_audio().expect("play");
    assert!(fake.log().contains("args: -v en-gb --stdin"));

    controller.set_voice("klingon");
    assert!(matches!(
        controller.play_audio(),
        Err(SpeakError::Voice { ref name, .. }) if name == "klingon"
    ));
    assert_eq!(fake.utterances(), 1);
}

#[test]
fn test_failed_playback_reported_by_wait() {
    let _turn = take_turn();
    let _fake = FakeEspeak::new("cat > /dev/null\nexit 1");
    let mut controller = controller();
    controller.set_text("doomed");

    controller.set_synced(true);
    assert!(matches!(controller.play_audio(), Err(SpeakError::Wait(_))));

    controller.set_synced(false);
    controller.play_audio().expect("queueing still succeeds");
    assert!(matches!(controller.wait(), Err(SpeakError::Wait(_))));

    // The failure was reported once and is gone
    assert!(controller.wait().is_ok());
}

#[test]
fn test_into_engine_drops_queued_utterances() {
    let _turn = take_turn();
    let fake = FakeEspeak::playing_for("0.3");
    let mut controller = controller();
    controller.set_synced(false);

    for text in ["one", "two", "three"] {
        controller.set_text(text);
        controller.play_audio().expect("play");
    }
    controller.into_engine().expect("terminate");

    // At most the utterance already playing got through
    assert!(fake.utterances() <= 1, "log was {:?}", fake.log());
}

#[cfg(target_os = "linux")]
fn zombie_children() -> usize {
    let me = std::process::id().to_string();
    fs::read_dir("/proc")
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| fs::read_to_string(entry.path().join("stat")).ok())
        .filter(|stat| {
            // After "pid (comm)" come the state and the parent pid
            let rest = match stat.rfind(')') {
                Some(i) => &stat[i + 1..],
                None => return false,
            };
            let mut fields = rest.split_whitespace();
            fields.next() == Some("Z") && fields.next() == Some(me.as_str())
        })
        .count()
}

#[cfg(target_os = "linux")]
#[test]
fn test_rejected_text_leaves_no_zombies() {
    let _turn = take_turn();
    let _fake = FakeEspeak::new("exec 0<&-\nexit 1");
    let mut controller = controller();

    // Far more than a pipe buffer, so writing hits the closed stdin
    controller.set_text("a".repeat(4 * 1024 * 1024));
    for _ in 0..3 {
        assert!(matches!(controller.play_audio(), Err(SpeakError::Wait(_))));
    }

    assert_eq!(zombie_children(), 0);
    controller.into_engine().expect("terminate");
}
