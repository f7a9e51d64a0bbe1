//! speakctl main entry point
//!
//! Speaks its arguments, or each line of stdin when there are none.

use anyhow::{bail, Context};
use log::{debug, error, info};
use speakctl::config::Settings;
use speakctl::speech::{create_controller, Backend, DynController};
use std::io::{self, BufRead};
use std::process;

/// Command line options, layered over the settings file
#[derive(Debug, Default)]
struct Options {
    debug: bool,
    voice: Option<String>,
    asynchronous: bool,
    backend: Option<Backend>,
    words: Vec<String>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Options> {
    let mut options = Options::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--debug" | "-d" => options.debug = true,
            "--async" => options.asynchronous = true,
            "--voice" | "-v" => {
                let voice = args.next().context("--voice needs a voice name")?;
                options.voice = Some(voice);
            }
            "--backend" | "-b" => {
                let name = args.next().context("--backend needs a backend name")?;
                options.backend = Some(name.parse()?);
            }
            "--" => {
                options.words.extend(args.by_ref());
            }
            flag if flag.starts_with('-') && flag.len() > 1 => bail!("Unknown option {}", flag),
            _ => options.words.push(arg),
        }
    }

    Ok(options)
}

fn main() {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            eprintln!(
                "Usage: speakctl [--debug] [--voice NAME] [--async] [--backend auto|native|espeak] [TEXT...]"
            );
            process::exit(2);
        }
    };

    // Initialize logger
    if options.debug {
        // Debug mode: write to speakctl.log file
        use std::fs::OpenOptions;
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open("speakctl.log")
        {
            Ok(log_file) => {
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Debug)
                    .target(env_logger::Target::Pipe(Box::new(log_file)))
                    .init();
            }
            Err(e) => {
                eprintln!("Warning: Failed to open speakctl.log for debug logging: {}", e);
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Warn)
                    .init();
            }
        }

        info!(
            "speakctl version {} starting (debug mode, logging to speakctl.log)",
            speakctl::VERSION
        );
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Error)
            .init();
    }

    if let Err(e) = run(options) {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(options: Options) -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    debug!("Settings loaded from {:?}", settings.path());

    let backend = options.backend.unwrap_or_else(|| settings.backend());
    let mut controller = create_controller(backend, settings.init_params())
        .with_context(|| format!("starting the {} speech backend", backend))?;

    controller.set_voice(options.voice.unwrap_or_else(|| settings.voice()));
    controller.set_synced(settings.synchronous() && !options.asynchronous);

    if options.words.is_empty() {
        for line in io::stdin().lock().lines() {
            let line = line.context("reading stdin")?;
            speak(&mut controller, line)?;
        }
    } else {
        speak(&mut controller, options.words.join(" "))?;
    }

    // Asynchronous utterances still have to finish before the process exits
    if !controller.synced() {
        controller.wait().context("waiting for speech to finish")?;
    }

    controller.into_engine().context("shutting down the engine")?;
    Ok(())
}

fn speak(controller: &mut DynController, text: String) -> anyhow::Result<()> {
    controller.set_text(text);
    controller
        .play_audio()
        .with_context(|| format!("speaking {:?}", controller.text()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_plain_words() {
        let options = parse_args(args(&["hello", "world"])).unwrap();
        assert_eq!(options.words, vec!["hello", "world"]);
        assert!(!options.debug);
        assert!(!options.asynchronous);
    }

    #[test]
    fn test_parse_flags() {
        let options = parse_args(args(&[
            "-d", "--voice", "en-gb", "--async", "--backend", "espeak", "hi",
        ]))
        .unwrap();
        assert!(options.debug);
        assert!(options.asynchronous);
        assert_eq!(options.voice.as_deref(), Some("en-gb"));
        assert_eq!(options.backend, Some(Backend::Espeak));
        assert_eq!(options.words, vec!["hi"]);
    }

    #[test]
    fn test_parse_double_dash() {
        let options = parse_args(args(&["--", "-not-a-flag"])).unwrap();
        assert_eq!(options.words, vec!["-not-a-flag"]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(args(&["--voice"])).is_err());
        assert!(parse_args(args(&["--backend", "festival"])).is_err());
        assert!(parse_args(args(&["--loud"])).is_err());
    }
}
