//! Error types for the vctrl daemon.
//!
//! Each component gets its own error enum. None of them are fatal to the
//! process: callers turn them into user-facing messages.

use thiserror::Error;

/// Reasons a frame-rate detection session ends without an interval.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionError {
    #[error("Detected rate is too unstable to use ({frames_seen} frames sampled)")]
    Unstable { frames_seen: u32 },

    #[error("Detection cancelled")]
    Cancelled,

    #[error("Detected frame interval rounded to zero")]
    ZeroInterval,

    #[error("Refresh rate must be between 20 and 250 Hz")]
    RefreshRateOutOfRange,
}

/// Failure to read or write the configuration store.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to write store file '{path}': {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read store file '{path}': {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode value for key '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Stored value for key '{key}' is invalid: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store rejected write of '{0}'")]
    Rejected(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Errors from key-profile management.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Another profile is already using the name '{0}'")]
    NameCollision(String),

    #[error("Can't modify built-in profile '{0}'")]
    ReadOnlyProfile(String),

    #[error("Profile '{0}' not found")]
    NotFound(String),

    #[error("No saved settings for device '{0}'")]
    DeviceNotFound(String),

    #[error("Invalid profile name: {0}")]
    InvalidName(String),

    #[error("Player {0} is not supported")]
    InvalidPlayer(u8),

    #[error("Profile change not saved: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Errors from virtual controller editing and layout.
#[derive(Error, Debug)]
pub enum VControllerError {
    #[error("No element with id {0}")]
    ElementNotFound(u32),

    #[error("Element {element} has no button at index {index}")]
    ButtonNotFound { element: u32, index: usize },

    #[error("Element {element} is a {actual}, expected {expected}")]
    WrongElementKind {
        element: u32,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("{name} must be within {min}..={max}, got {value}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{name} rectangle {width}x{height} at ({x}, {y}) has a negative size or overflowing edge")]
    InvalidRect {
        name: &'static str,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },

    #[error("Unknown input component '{0}'")]
    UnknownComponent(String),

    #[error("Key {0} can't be assigned to this element")]
    KeyNotAssignable(u16),

    #[error("Layout change not saved: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Errors from output timing option changes.
#[derive(Error, Debug)]
pub enum TimingError {
    #[error("Frame rate {hz:.3}Hz is outside the usable range [{min}-{max}Hz]")]
    RateOutOfRange { hz: f64, min: f64, max: f64 },

    #[error("Invalid frame rate '{0}', expected a decimal or fraction")]
    InvalidRate(String),

    #[error("Detection failed: {0}")]
    Detection(#[from] DetectionError),

    #[error("Frame time not saved: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Errors related to IPC server operations.
#[derive(Error, Debug)]
pub enum IpcError {
    #[error("Failed to bind socket at '{path}': {source}")]
    SocketBindFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid command received: {0}")]
    InvalidCommand(String),

    #[error("Failed to serialize response: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors related to configuration management.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Failed to write configuration: {0}")]
    WriteError(#[from] std::io::Error),
}

/// Errors from setting up log output.
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to create log directory '{path}': {source}")]
    DirectoryCreationFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create log file appender: {0}")]
    AppenderCreationFailed(String),
}

/// Errors that stop the daemon from starting.
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] PersistenceError),
}
