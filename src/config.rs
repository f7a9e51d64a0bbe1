//! Configuration management

use crate::speech::engine::DEFAULT_BUFFER_LENGTH;
use crate::speech::{Backend, InitParams, DEFAULT_VOICE};
use crate::{Result, SpeakError};
use ini::Ini;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Persistent speech settings
///
/// Stored in `~/.speakctl.cfg`, section `[speech]`.
pub struct Settings {
    /// INI configuration storage
    ini: Ini,

    /// Config file path
    path: PathBuf,
}

impl Settings {
    /// Load settings from the default location, creating the file if needed
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path())
    }

    /// Load settings from `path`, creating it with defaults if missing
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        debug!("Loading config from {:?}", path);

        let ini = if path.exists() {
            Ini::load_from_file(&path)
                .map_err(|e| SpeakError::IniParse(format!("Failed to load config: {}", e)))?
        } else {
            info!("Config file not found, creating default");
            let default = Self::default_config();
            default
                .write_to_file(&path)
                .map_err(|e| SpeakError::IniParse(format!("Failed to write config: {}", e)))?;
            default
        };

        Ok(Self { ini, path })
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<()> {
        debug!("Saving config to {:?}", self.path);
        self.ini
            .write_to_file(&self.path)
            .map_err(|e| SpeakError::Config(format!("Failed to save config: {}", e)))
    }

    /// `~/.speakctl.cfg`, or the working directory if there is no home
    fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".speakctl.cfg")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn default_config() -> Ini {
        let mut ini = Ini::new();

        ini.with_section(Some("speech"))
            .set("voice", DEFAULT_VOICE)
            .set("synchronous", "true")
            .set("backend", "auto")
            .set("buffer_length", DEFAULT_BUFFER_LENGTH.to_string())
            .set("data_path", "");

        ini
    }

    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.ini
            .get_from(Some(section), key)
            .unwrap_or(default)
            .to_string()
    }

    /// Set a value in config
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.ini.with_section(Some(section)).set(key, value);
    }

    /// Voice name handed to the engine
    pub fn voice(&self) -> String {
        self.get_string("speech", "voice", DEFAULT_VOICE)
    }

    /// Should `play_audio` wait for playback to finish?
    pub fn synchronous(&self) -> bool {
        self.get_bool("speech", "synchronous", true)
    }

    /// Which engine to drive
    pub fn backend(&self) -> Backend {
        let raw = self.get_string("speech", "backend", "auto");
        raw.parse().unwrap_or_else(|e| {
            warn!("{}; using auto", e);
            Backend::Auto
        })
    }

    /// Engine buffer hint in milliseconds
    pub fn buffer_length(&self) -> u32 {
        self.ini
            .get_from(Some("speech"), "buffer_length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_BUFFER_LENGTH)
    }

    /// Voice data directory, `None` when unset
    pub fn data_path(&self) -> Option<PathBuf> {
        self.ini
            .get_from(Some("speech"), "data_path")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    /// Engine initialization parameters described by these settings
    pub fn init_params(&self) -> InitParams {
        InitParams {
            buffer_length: self.buffer_length(),
            data_path: self.data_path(),
            ..InitParams::default()
        }
    }
}
