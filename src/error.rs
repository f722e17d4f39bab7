//! Error types for the alarm engine.
//!
//! Nothing in here is fatal to the process: every error is meant to be
//! handled (or logged) at the call site.

use std::path::PathBuf;

use thiserror::Error;

use crate::alarm::{AlarmId, AlarmState};
use crate::machine::Event;

/// Errors returned by the engine's public operations.
#[derive(Error, Debug)]
pub enum AlarmError {
    /// The alarm request was rejected before anything was changed.
    #[error("invalid alarm: {0}")]
    Validation(#[from] ValidationError),

    /// The id doesn't (or no longer) refer to an alarm.
    #[error("alarm {0} not found")]
    NotFound(AlarmId),

    /// The requested transition isn't legal from the alarm's current state.
    #[error("cannot {event} alarm {id} while it is {state}")]
    InvalidState {
        id: AlarmId,
        event: Event,
        state: AlarmState,
    },

    /// A background thread couldn't be started.
    #[error("couldn't spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Reasons an [`AlarmSpec`](crate::alarm::AlarmSpec) is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("malformed time {0:?}, expected HH:MM or h:MM AM/PM")]
    MalformedTime(String),

    #[error("snooze of {0} minutes is outside 1..=1439")]
    SnoozeOutOfRange(u32),

    #[error("message is empty")]
    EmptyMessage,
}

/// Failures of a [`PersistenceGateway`](crate::persistence::PersistenceGateway).
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("couldn't access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("couldn't parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("couldn't serialize alarms: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("unsupported alarm file version {0}")]
    UnsupportedVersion(u32),
}

/// Delivery failures of a [`Notifier`](crate::communication::Notifier).
#[derive(Error, Debug)]
pub enum NotifierError {
    /// The output device (or whatever backs the notifier) can't be used.
    #[error("notifier unavailable: {0}")]
    Unavailable(String),

    /// The receiving side has gone away.
    #[error("notifier receiver disconnected")]
    Disconnected,
}

/// Errors loading or saving the user configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("couldn't determine the config directory")]
    NoProjectDirs,

    #[error("couldn't read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("couldn't write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("couldn't parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("couldn't serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
