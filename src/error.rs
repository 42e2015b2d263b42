//! Error types for the Pi5 fan controller.
//!
//! This module defines custom error enums for each component of the daemon,
//! providing descriptive error messages with context information.

use crate::core_logic::FanLevel;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading a temperature sensor.
///
/// These never leave the temperature module: a failed read becomes
/// `SensorReading::Unavailable` after being logged.
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Temperature sensor path does not exist: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to read temperature sensor '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Temperature sensor file is empty: {path}")]
    Empty { path: PathBuf },

    #[error("Invalid temperature value from '{path}': {value:?}")]
    Parse { path: PathBuf, value: String },

    #[error("Negative temperature read from '{path}': {millicelsius} m°C")]
    Negative { path: PathBuf, millicelsius: i64 },

    #[error("Unreasonable temperature read from '{path}': {celsius}°C")]
    OutOfRange { path: PathBuf, celsius: f64 },
}

/// Errors related to the fan cooling device.
#[derive(Error, Debug)]
pub enum FanError {
    #[error("Fan control file does not exist: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to open fan control file '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read fan control file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Fan control file is empty: {path}")]
    Empty { path: PathBuf },

    #[error("Invalid value in fan control file '{path}': {value:?}")]
    Parse { path: PathBuf, value: String },

    #[error("Invalid fan speed read from hardware: {value}")]
    OutOfRange { path: PathBuf, value: i64 },

    #[error("Failed to write fan speed to '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to sync fan control file '{path}': {source}")]
    Sync {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Fan speed write verification failed: wrote {expected}, read {actual}")]
    VerifyMismatch { expected: FanLevel, actual: FanLevel },
}

/// Errors related to configuration management.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at '{0}'")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Unrecoverable misconfiguration detected by `ControlLoop::initialize`.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("Fan control file does not exist: {0}")]
    FanPathMissing(PathBuf),

    #[error("No temperature sensor paths configured")]
    NoTemperatureSensors,

    #[error("Temperature thresholds rejected: {0}")]
    Thresholds(#[source] ConfigError),
}

/// Top-level daemon errors.
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to initialize fan controller: {0}")]
    Init(#[from] InitError),

    #[error("Logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),

    #[error("Runtime error: {0}")]
    Runtime(String),
}
