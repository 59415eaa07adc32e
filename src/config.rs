//! Daemon configuration.
//!
//! Loading, saving and validating `config.json`. Settings edited through the
//! controller itself live in the key/value store; this file holds what the
//! daemon needs before the store is open.

use crate::error::ConfigError;
use crate::vcontroller::VControllerSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

const APP_DIR: &str = "vctrl";

pub const MAX_PLAYERS_LIMIT: u8 = 8;
pub const FRAME_INTERVAL_MAX: u8 = 4;
pub const DPI_RANGE: (f64, f64) = (50.0, 1000.0);

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub socket_path: PathBuf,
    /// Key/value store holding layouts, profiles and frame times
    pub store_path: PathBuf,
    pub max_players: u8,
    /// Display density used for millimetre sizes
    pub dpi: f64,
    /// Present every Nth frame; 0 presents every frame without skipping
    pub frame_interval: u8,
    /// Controller settings used until the store has its own
    pub vcontroller: VControllerSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            store_path: data_dir().join("store.json"),
            max_players: 2,
            dpi: 160.0,
            frame_interval: 0,
            vcontroller: VControllerSettings::default(),
        }
    }
}

impl Config {
    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_players == 0 || self.max_players > MAX_PLAYERS_LIMIT {
            return Err(ConfigError::ValidationError(format!(
                "max_players ({}) must be between 1 and {}",
                self.max_players, MAX_PLAYERS_LIMIT
            )));
        }

        if !(DPI_RANGE.0..=DPI_RANGE.1).contains(&self.dpi) {
            return Err(ConfigError::ValidationError(format!(
                "dpi ({}) must be between {} and {}",
                self.dpi, DPI_RANGE.0, DPI_RANGE.1
            )));
        }

        if self.frame_interval > FRAME_INTERVAL_MAX {
            return Err(ConfigError::ValidationError(format!(
                "frame_interval ({}) must not exceed {}",
                self.frame_interval, FRAME_INTERVAL_MAX
            )));
        }

        self.vcontroller
            .validate(self.max_players)
            .map_err(|e| ConfigError::ValidationError(format!("vcontroller: {}", e)))
    }

    pub fn frame_interval_label(&self) -> &'static str {
        match self.frame_interval {
            0 => "Full (No Skip)",
            1 => "Full",
            2 => "1/2",
            3 => "1/3",
            _ => "1/4",
        }
    }
}

/// Holds the live configuration and writes it back to `path`.
pub struct ConfigManager {
    config: RwLock<Config>,
    path: PathBuf,
}

impl ConfigManager {
    /// Read `path`, falling back to defaults when it does not exist yet.
    /// A present but malformed or out-of-range file is an error.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let config = match read_config(path)? {
            Some(config) => {
                config.validate()?;
                config
            }
            None => Config::default(),
        };

        Ok(Self {
            config: RwLock::new(config),
            path: path.to_path_buf(),
        })
    }

    /// Write the current configuration through a temp file and rename.
    pub fn save(&self) -> Result<(), ConfigError> {
        let snapshot = self.get();
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| ConfigError::ParseError(format!("cannot encode config: {}", e)))?;
        write_atomically(&self.path, &json)
    }

    pub fn get(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the configuration after validating it, then persist.
    pub fn update(&self, config: Config) -> Result<(), ConfigError> {
        config.validate()?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        self.save()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<config dir>/vctrl/config.json`
    pub fn default_path() -> PathBuf {
        config_dir().join("config.json")
    }
}

fn read_config(path: &Path) -> Result<Option<Config>, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(ConfigError::ParseError(format!(
                "cannot read {}: {}",
                path.display(),
                e
            )))
        }
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let staging = path.with_extension("json.tmp");
    let mut file = fs::File::create(&staging)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&staging, path)?;
    Ok(())
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| std::env::temp_dir().join(APP_DIR))
}

/// Platform data directory for the store and logs.
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| std::env::temp_dir().join(APP_DIR))
}

fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("vctrl.sock")
}
